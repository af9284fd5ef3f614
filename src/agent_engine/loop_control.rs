// Single authoritative stop flag for the control loop.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::executor::safety::Hotkey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Hotkey,
    Timer,
    Fatal(String),
    /// The mode finished on its own.
    Finished,
}

struct Inner {
    running: AtomicBool,
    reason: Mutex<Option<StopReason>>,
    hotkey: Arc<dyn Hotkey>,
    poll_chunk: Duration,
}

/// Cheap to clone; every clone observes the same flag.
#[derive(Clone)]
pub struct StopCoordinator {
    inner: Arc<Inner>,
}

impl StopCoordinator {
    pub fn new(hotkey: Arc<dyn Hotkey>, poll_chunk: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                running: AtomicBool::new(false),
                reason: Mutex::new(None),
                hotkey,
                poll_chunk: poll_chunk.max(Duration::from_millis(1)),
            }),
        }
    }

    /// Arms the flag for a new mode run, discarding hotkey presses that
    /// happened while the menu was shown.
    pub fn start(&self) {
        let _ = self.inner.hotkey.poll_stop();
        if let Ok(mut reason) = self.inner.reason.lock() {
            *reason = None;
        }
        self.inner.running.store(true, Ordering::SeqCst);
    }

    /// First reason wins; later calls only clear the flag.
    pub fn stop(&self, reason: StopReason) {
        if self.inner.running.swap(false, Ordering::SeqCst) {
            tracing::info!(?reason, "stop requested");
            if let Ok(mut slot) = self.inner.reason.lock() {
                slot.get_or_insert(reason);
            }
        }
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.inner.reason.lock().ok().and_then(|r| r.clone())
    }

    /// Polls the hotkey, then reports the flag.
    pub fn is_running(&self) -> bool {
        if self.inner.running.load(Ordering::SeqCst) && self.inner.hotkey.poll_stop() {
            self.stop(StopReason::Hotkey);
        }
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Sleeps in `poll_chunk` slices. Returns false as soon as a stop is
    /// observed, true when the full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if !self.is_running() {
            return false;
        }
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return true;
            }
            tokio::time::sleep((deadline - now).min(self.inner.poll_chunk)).await;
            if !self.is_running() {
                return false;
            }
        }
    }

    /// One-shot duration timer. `None` means unlimited. The timer is
    /// cancelled when the guard drops.
    pub fn arm_timer(&self, limit: Option<Duration>) -> TimerGuard {
        let handle = limit.map(|limit| {
            let stop = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                tracing::info!(secs = limit.as_secs(), "duration limit reached");
                stop.stop(StopReason::Timer);
            })
        });
        TimerGuard { handle }
    }
}

/// Backoff for empty or unparseable reads: `limit` short pauses in a row,
/// then one long pause that resets the counter.
#[derive(Debug, Clone)]
pub struct TransientBackoff {
    misses: u32,
    short: Duration,
    long: Duration,
    limit: u32,
}

impl Default for TransientBackoff {
    fn default() -> Self {
        Self {
            misses: 0,
            short: Duration::from_secs(1),
            long: Duration::from_secs(3),
            limit: 5,
        }
    }
}

impl TransientBackoff {
    pub fn reset(&mut self) {
        self.misses = 0;
    }

    pub fn misses(&self) -> u32 {
        self.misses
    }

    /// Records a miss and returns the pause to take before retrying.
    pub fn next_delay(&mut self) -> Duration {
        self.misses += 1;
        if self.misses > self.limit {
            self.misses = 0;
            self.long
        } else {
            self.short
        }
    }

    /// Records a miss and sleeps through `stop`. False when stopped.
    pub async fn wait(&mut self, stop: &StopCoordinator) -> bool {
        let delay = self.next_delay();
        tracing::debug!(misses = self.misses, delay_ms = delay.as_millis() as u64, "transient miss");
        stop.sleep(delay).await
    }
}

pub struct TimerGuard {
    handle: Option<JoinHandle<()>>,
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
