//! Save-point / wait-for-change correlation of commands with bot replies.
//!
//! The messenger has no event callback, so a reply is detected by polling
//! the transcript and diffing it against the snapshot taken right before the
//! command was sent. Only lines that appeared after the snapshot are
//! returned, minus the echo of the command itself.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::agent_engine::loop_control::StopCoordinator;
use crate::config::CorrelationConfig;
use crate::perception::chat_reader::ChatReader;
use crate::perception::filter::{classify, fresh_start, strip_speaker_prefix, Author};
use crate::ui::overlay::Overlay;

/// Baseline transcript captured immediately before a command is issued.
#[derive(Debug, Clone, Default)]
pub struct SavePoint {
    raw: String,
    echoes: Vec<String>,
}

impl SavePoint {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            echoes: Vec::new(),
        }
    }

    /// Registers the text about to be sent so its echo is not mistaken for
    /// a reply. Multi-line messages register each line and the joined form.
    pub fn with_echo(mut self, sent: &str) -> Self {
        let lines: Vec<&str> = sent.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if lines.len() > 1 {
            self.echoes.push(lines.join(" "));
        }
        self.echoes.extend(lines.into_iter().map(str::to_string));
        self
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    fn is_echo(&self, line: &str) -> bool {
        let body = strip_speaker_prefix(line);
        self.echoes.iter().any(|e| e == body)
    }
}

pub struct Correlator {
    reader: ChatReader,
    config: CorrelationConfig,
    stop: StopCoordinator,
    overlay: Arc<dyn Overlay>,
    last_raw: String,
    my_handle: String,
}

impl Correlator {
    pub fn new(
        reader: ChatReader,
        config: CorrelationConfig,
        stop: StopCoordinator,
        overlay: Arc<dyn Overlay>,
    ) -> Self {
        Self {
            reader,
            config,
            stop,
            overlay,
            last_raw: String::new(),
            my_handle: String::new(),
        }
    }

    /// Handle whose blocks count as ours. Empty disables filtering.
    pub fn bind_handle(&mut self, handle: &str) {
        self.my_handle = handle.to_string();
    }

    pub fn handle(&self) -> &str {
        &self.my_handle
    }

    pub fn last_raw(&self) -> &str {
        &self.last_raw
    }

    /// Reads the chat. The stored snapshot only moves when the text changed.
    pub async fn observe(&mut self) -> String {
        let raw = self.reader.read_raw().await;
        if !raw.is_empty() && raw != self.last_raw {
            self.last_raw = raw.clone();
        }
        raw
    }

    pub async fn save_point(&mut self) -> SavePoint {
        self.observe().await;
        SavePoint::new(self.last_raw.clone())
    }

    /// Next self-authored text after `point`, or "" on timeout or stop.
    pub async fn wait_for_change(&mut self, point: &SavePoint, max_wait: Duration) -> String {
        self.wait(point, max_wait, false).await
    }

    /// Like [`Self::wait_for_change`] but keeps other participants' lines.
    pub async fn wait_for_change_raw(&mut self, point: &SavePoint, max_wait: Duration) -> String {
        self.wait(point, max_wait, true).await
    }

    async fn wait(&mut self, point: &SavePoint, max_wait: Duration, raw_mode: bool) -> String {
        let started = Instant::now();
        if !self.pause(Duration::from_millis(self.config.initial_wait_ms)).await {
            return String::new();
        }

        while started.elapsed() < max_wait {
            if !self.stop.is_running() {
                return String::new();
            }
            self.overlay.pump();
            let current = self.observe().await;
            if !current.is_empty() && current != point.raw {
                if let Some(found) = self.fresh_text(point, &current, raw_mode) {
                    tracing::debug!(
                        raw_mode,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "response correlated"
                    );
                    return found;
                }
            }
            if !self.pause(Duration::from_millis(self.config.poll_interval_ms)).await {
                return String::new();
            }
        }

        tracing::debug!(raw_mode, max_wait_ms = max_wait.as_millis() as u64, "no response before timeout");
        String::new()
    }

    fn fresh_text(&self, point: &SavePoint, current: &str, raw_mode: bool) -> Option<String> {
        let baseline: Vec<&str> = point.raw.lines().collect();
        let lines = classify(current, &self.my_handle);
        let plain: Vec<&str> = lines.iter().map(|(line, _)| *line).collect();
        let start = fresh_start(&baseline, &plain);

        let fresh: Vec<&str> = lines[start..]
            .iter()
            .filter(|(_, author)| raw_mode || *author == Author::Me)
            .map(|(line, _)| *line)
            .filter(|line| !line.trim().is_empty() && !point.is_echo(line))
            .collect();
        if fresh.is_empty() {
            None
        } else {
            Some(fresh.join("\n"))
        }
    }

    /// Stop-aware sleep that keeps the overlay responsive.
    async fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let slice = Duration::from_millis(self.config.pump_interval_ms.max(1));
        loop {
            self.overlay.pump();
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            if !self.stop.sleep((deadline - now).min(slice)).await {
                return false;
            }
        }
    }
}
