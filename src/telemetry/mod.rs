//! Fire-and-forget statistics hand-off.
//!
//! Mode loops call the bridge synchronously; a background task owns the sink
//! and performs all I/O, so the control loop never waits on the network.

pub mod http;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::errors::AgentResult;
use crate::game::types::{EnhanceOutcome, ItemType};
use crate::stats::CycleRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryEvent {
    SessionInit {
        start_gold: Option<u64>,
    },
    Enhance {
        sword: String,
        level: u8,
        result: EnhanceOutcome,
    },
    Farming {
        name: String,
        item_type: ItemType,
    },
    Battle {
        sword: String,
        my_level: u8,
        opponent_level: Option<u8>,
        won: bool,
        gold: u64,
    },
    Sale {
        sword: String,
        level: u8,
        gold: u64,
    },
    Cycle(CycleRecord),
    GoldChange {
        gold: u64,
    },
}

/// Destination for telemetry events. Called only from the bridge worker.
#[async_trait]
pub trait TelemetrySink: Send {
    async fn record(&mut self, event: TelemetryEvent) -> AgentResult<()>;
    async fn flush(&mut self) -> AgentResult<()>;
}

/// Discards everything. Used when telemetry is disabled.
pub struct NullSink;

#[async_trait]
impl TelemetrySink for NullSink {
    async fn record(&mut self, _event: TelemetryEvent) -> AgentResult<()> {
        Ok(())
    }

    async fn flush(&mut self) -> AgentResult<()> {
        Ok(())
    }
}

enum Command {
    Event(TelemetryEvent),
    Flush,
}

pub struct TelemetryBridge {
    tx: mpsc::UnboundedSender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
    dirty: AtomicBool,
}

impl TelemetryBridge {
    /// Spawns the worker on the current tokio runtime.
    pub fn spawn(mut sink: Box<dyn TelemetrySink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let worker = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                let result = match command {
                    Command::Event(event) => sink.record(event).await,
                    Command::Flush => sink.flush().await,
                };
                if let Err(e) = result {
                    tracing::warn!(error = %e, "telemetry sink error");
                }
            }
            tracing::debug!("telemetry worker exited");
        });
        Self {
            tx,
            worker: Mutex::new(Some(worker)),
            dirty: AtomicBool::new(false),
        }
    }

    fn send(&self, event: TelemetryEvent) {
        self.dirty.store(true, Ordering::SeqCst);
        if self.tx.send(Command::Event(event)).is_err() {
            tracing::debug!("telemetry worker gone; event dropped");
        }
    }

    pub fn init_session(&self, start_gold: Option<u64>) {
        self.send(TelemetryEvent::SessionInit { start_gold });
    }

    pub fn record_enhance(&self, sword: &str, level: u8, result: EnhanceOutcome) {
        self.send(TelemetryEvent::Enhance {
            sword: sword.to_string(),
            level,
            result,
        });
    }

    pub fn record_farming(&self, name: &str, item_type: ItemType) {
        self.send(TelemetryEvent::Farming {
            name: name.to_string(),
            item_type,
        });
    }

    pub fn record_battle(&self, sword: &str, my_level: u8, opponent_level: Option<u8>, won: bool, gold: u64) {
        self.send(TelemetryEvent::Battle {
            sword: sword.to_string(),
            my_level,
            opponent_level,
            won,
            gold,
        });
    }

    pub fn record_sale(&self, sword: &str, level: u8, gold: u64) {
        self.send(TelemetryEvent::Sale {
            sword: sword.to_string(),
            level,
            gold,
        });
    }

    pub fn record_cycle(&self, record: &CycleRecord) {
        self.send(TelemetryEvent::Cycle(record.clone()));
    }

    pub fn record_gold(&self, gold: u64) {
        self.send(TelemetryEvent::GoldChange { gold });
    }

    pub fn flush(&self) {
        self.dirty.store(false, Ordering::SeqCst);
        if self.tx.send(Command::Flush).is_err() {
            tracing::debug!("telemetry worker gone; flush skipped");
        }
    }

    /// Flushes only when events were recorded since the last flush.
    pub fn flush_if_pending(&self) {
        if self.dirty.load(Ordering::SeqCst) {
            self.flush();
        }
    }

    /// Flushes what is pending and waits for the worker to drain.
    pub async fn shutdown(self) {
        self.flush_if_pending();
        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        drop(self.tx);
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "telemetry worker panicked");
            }
        }
    }
}
