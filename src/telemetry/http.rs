use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::TelemetryConfig;
use crate::errors::{AgentError, AgentResult};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

/// Events kept for retry when the endpoint is unreachable.
const MAX_BUFFERED: usize = 500;

#[derive(Debug, Serialize)]
struct Batch<'a> {
    session_id: &'a str,
    app_version: &'static str,
    os_type: &'static str,
    sent_at: chrono::DateTime<chrono::Utc>,
    events: &'a [TelemetryEvent],
}

/// Posts events as JSON batches.
pub struct HttpTelemetrySink {
    client: reqwest::Client,
    endpoint: String,
    batch_size: usize,
    session_id: String,
    buffer: Vec<TelemetryEvent>,
}

impl HttpTelemetrySink {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            batch_size: config.batch_size.max(1),
            session_id: uuid::Uuid::new_v4().to_string(),
            buffer: Vec::new(),
        }
    }

    async fn post(&mut self) -> AgentResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = Batch {
            session_id: &self.session_id,
            app_version: env!("CARGO_PKG_VERSION"),
            os_type: std::env::consts::OS,
            sent_at: chrono::Utc::now(),
            events: &self.buffer,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .timeout(Duration::from_secs(10))
            .json(&batch)
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                tracing::debug!(events = self.buffer.len(), "telemetry batch sent");
                self.buffer.clear();
                Ok(())
            }
            Ok(r) => {
                self.trim();
                Err(AgentError::Telemetry(format!("endpoint returned {}", r.status())))
            }
            Err(e) => {
                self.trim();
                Err(e.into())
            }
        }
    }

    fn trim(&mut self) {
        if self.buffer.len() > MAX_BUFFERED {
            let excess = self.buffer.len() - MAX_BUFFERED;
            self.buffer.drain(..excess);
        }
    }
}

#[async_trait]
impl TelemetrySink for HttpTelemetrySink {
    async fn record(&mut self, event: TelemetryEvent) -> AgentResult<()> {
        self.buffer.push(event);
        if self.buffer.len() >= self.batch_size {
            self.post().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> AgentResult<()> {
        self.post().await
    }
}
