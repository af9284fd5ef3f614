use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{AgentError, AgentResult};

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub coords: CoordsConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub stop: StopConfig,
    #[serde(default)]
    pub goldmine: GoldMineConfig,
    #[serde(default)]
    pub special: SpecialConfig,
    #[serde(default)]
    pub battle: BattleConfig,
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub game_data: GameDataConfig,
}

/// Screen coordinates of the messenger window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoordsConfig {
    /// Message input field.
    pub click_x: i32,
    pub click_y: i32,
    /// Distance from the input field up to a clickable point in the chat area.
    #[serde(default = "default_chat_offset_y")]
    pub chat_offset_y: i32,
    /// Reuse saved coordinates instead of asking at every mode start.
    #[serde(default)]
    pub lock_xy: bool,
}

impl Default for CoordsConfig {
    fn default() -> Self {
        Self {
            click_x: 0,
            click_y: 0,
            chat_offset_y: default_chat_offset_y(),
            lock_xy: false,
        }
    }
}

fn default_chat_offset_y() -> i32 {
    40
}

/// Post-command sleeps, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PacingConfig {
    pub trash_delay: f64,
    pub low_delay: f64,
    pub mid_delay: f64,
    pub high_delay: f64,
    pub slowdown_level: u8,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            trash_delay: 1.2,
            low_delay: 1.5,
            mid_delay: 2.5,
            high_delay: 3.5,
            slowdown_level: 9,
        }
    }
}

impl PacingConfig {
    /// Pacing curve: low below +5, mid up to the slowdown level, high beyond.
    pub fn delay_for_level(&self, level: u8) -> Duration {
        let secs = if level < 5 {
            self.low_delay
        } else if level < self.slowdown_level {
            self.mid_delay
        } else {
            self.high_delay
        };
        secs_to_duration(secs)
    }

    pub fn trash(&self) -> Duration {
        secs_to_duration(self.trash_delay)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorrelationConfig {
    pub initial_wait_ms: u64,
    pub poll_interval_ms: u64,
    pub pump_interval_ms: u64,
    pub response_timeout_ms: u64,
    /// Additional waits before an empty response is given up on.
    pub empty_retries: u32,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            initial_wait_ms: 1000,
            poll_interval_ms: 500,
            pump_interval_ms: 100,
            response_timeout_ms: 5000,
            empty_retries: 3,
        }
    }
}

impl CorrelationConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StopConfig {
    pub poll_chunk_ms: u64,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self { poll_chunk_ms: 200 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GoldMineConfig {
    pub target_level: u8,
}

impl Default for GoldMineConfig {
    fn default() -> Self {
        Self { target_level: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SpecialConfig {
    /// 0 keeps the special item as found.
    pub target_level: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BattleConfig {
    /// Opponents are picked from `my_level + 1 ..= my_level + level_diff`.
    pub level_diff: u8,
    pub cooldown: f64,
    pub min_gold: u64,
    /// Wait before rescanning the ranking when no candidate fits.
    pub retry_delay: f64,
    pub mention_delay_ms: u64,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            level_diff: 2,
            cooldown: 5.0,
            min_gold: 1000,
            retry_delay: 30.0,
            mention_delay_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AccountConfig {
    /// Overrides the handle read from `/프로필`, e.g. "@myname".
    #[serde(default)]
    pub handle: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub batch_size: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://sword-ai.stopdragon.kr/api/telemetry".into(),
            batch_size: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameDataConfig {
    pub endpoint: String,
    pub ttl_secs: u64,
}

impl Default for GameDataConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://sword-ai.stopdragon.kr/api/game-data".into(),
            ttl_secs: 300,
        }
    }
}

pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

/// Environment overrides loaded from `.env` or the process environment.
pub fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(url) = std::env::var("SWORD_AGENT_TELEMETRY_URL") {
        config.telemetry.endpoint = url;
    }
    if let Ok(url) = std::env::var("SWORD_AGENT_GAME_DATA_URL") {
        config.game_data.endpoint = url;
    }
}

fn resolve_config_path() -> AgentResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join(CONFIG_FILE);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
    }
    Ok(candidate)
}

/// Missing file yields defaults; an unreadable or malformed file is an error.
pub fn load_config_from(path: &std::path::Path) -> AgentResult<AppConfig> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no config file, using defaults");
        return Ok(AppConfig::default());
    }
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    validate(&config)?;
    tracing::info!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Startup configuration and whether settings may be written back.
#[derive(Debug)]
pub struct StartupConfig {
    pub config: AppConfig,
    pub writable: bool,
}

/// Falls back to defaults when the file cannot be loaded, and then keeps the
/// file read-only so a later save cannot clobber it.
pub fn load_startup_config() -> StartupConfig {
    match resolve_config_path() {
        Ok(path) => load_startup_config_from(&path),
        Err(e) => {
            tracing::error!(error = %e, "config location unavailable; starting with defaults");
            fallback_config()
        }
    }
}

pub fn load_startup_config_from(path: &std::path::Path) -> StartupConfig {
    match load_config_from(path) {
        Ok(mut config) => {
            apply_env_overrides(&mut config);
            StartupConfig { config, writable: true }
        }
        Err(e) => {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "failed to load config; starting with defaults, settings will not be saved"
            );
            fallback_config()
        }
    }
}

fn fallback_config() -> StartupConfig {
    let mut config = AppConfig::default();
    apply_env_overrides(&mut config);
    StartupConfig { config, writable: false }
}

pub fn save_config(config: &AppConfig) -> AgentResult<()> {
    let path = resolve_config_path()?;
    save_config_to(config, &path)
}

pub fn save_config_to(config: &AppConfig, path: &std::path::Path) -> AgentResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

fn validate(config: &AppConfig) -> AgentResult<()> {
    if !(1..=3).contains(&config.battle.level_diff) {
        return Err(AgentError::Config(format!(
            "battle.level_diff must be 1..=3, got {}",
            config.battle.level_diff
        )));
    }
    if config.goldmine.target_level > 20 || config.special.target_level > 20 {
        return Err(AgentError::Config("target levels must be within 0..=20".into()));
    }
    if config.stop.poll_chunk_ms == 0 || config.correlation.poll_interval_ms == 0 {
        return Err(AgentError::Config("poll intervals must be non-zero".into()));
    }
    Ok(())
}
