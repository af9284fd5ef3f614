pub mod agent_engine;
pub mod config;
pub mod errors;
pub mod executor;
pub mod game;
pub mod perception;
pub mod stats;
pub mod telemetry;
pub mod ui;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;
use std::time::Duration;

use crate::agent_engine::engine::{AgentEngine, Capabilities};
use crate::executor::input::{EnigoInput, InputDriver};
use crate::executor::safety::{AnyHotkey, CtrlCHotkey, FailsafeCorner, Hotkey};
use crate::executor::text_input::SystemClipboard;
use crate::game::data::{GameDataStore, HttpGameDataSource};
use crate::telemetry::http::HttpTelemetrySink;
use crate::telemetry::{NullSink, TelemetryBridge, TelemetrySink};
use crate::ui::console::StdConsole;
use crate::ui::overlay::StatusLine;

pub fn run() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "failed to start async runtime");
            return;
        }
    };
    runtime.block_on(run_agent());
}

async fn run_agent() {
    let config::StartupConfig { config, writable } = config::load_startup_config();

    let input: Arc<dyn InputDriver> = Arc::new(EnigoInput);
    let hotkey: Arc<dyn Hotkey> = Arc::new(AnyHotkey(vec![
        Arc::new(CtrlCHotkey::new()),
        Arc::new(FailsafeCorner::new(input.clone())),
    ]));
    let caps = Capabilities {
        input,
        clipboard: Arc::new(SystemClipboard),
        hotkey,
        overlay: Arc::new(StatusLine::new()),
        console: Arc::new(StdConsole::new()),
    };

    let sink: Box<dyn TelemetrySink> = if config.telemetry.enabled {
        Box::new(HttpTelemetrySink::new(&config.telemetry))
    } else {
        tracing::info!("telemetry disabled");
        Box::new(NullSink)
    };
    let telemetry = Arc::new(TelemetryBridge::spawn(sink));

    let game_data = Arc::new(GameDataStore::new(
        Arc::new(HttpGameDataSource::new(config.game_data.endpoint.clone())),
        Duration::from_secs(config.game_data.ttl_secs),
    ));
    game_data.refresh().await;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "sword agent starting");
    let mut engine = AgentEngine::new(config, caps, telemetry.clone(), game_data);
    if !writable {
        engine = engine.without_persistence();
    }
    engine.run_menu().await;
    drop(engine);

    match Arc::try_unwrap(telemetry) {
        Ok(bridge) => bridge.shutdown().await,
        Err(bridge) => bridge.flush_if_pending(),
    }
    tracing::info!("sword agent exited");
}
