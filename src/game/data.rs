//! Reference tables for enhancement odds, sword prices and battle rewards.
//!
//! The tables are fetched from the game-data service and cached for a TTL.
//! When the service is unreachable the last good copy is kept; before any
//! successful fetch a built-in approximation is served.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{AgentError, AgentResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhanceRate {
    pub level: u8,
    pub success_rate: f64,
    pub keep_rate: f64,
    pub destroy_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwordPrice {
    pub level: u8,
    pub min_price: u64,
    pub max_price: u64,
    pub avg_price: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleReward {
    pub level_diff: u8,
    pub win_rate: f64,
    pub min_reward: u64,
    pub max_reward: u64,
    pub avg_reward: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GameData {
    pub enhance_rates: Vec<EnhanceRate>,
    pub sword_prices: Vec<SwordPrice>,
    pub battle_rewards: Vec<BattleReward>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl GameData {
    /// Approximate tables used until the service answers.
    pub fn builtin() -> Self {
        let enhance_rates = (0u8..20)
            .map(|level| {
                let l = level as f64;
                let success = (95.0 - l * 3.5).max(25.0);
                let destroy = if level < 3 { 0.0 } else { ((l - 2.0) * 2.0).min(35.0) };
                EnhanceRate {
                    level,
                    success_rate: success,
                    keep_rate: (100.0 - success - destroy).max(0.0),
                    destroy_rate: destroy,
                }
            })
            .collect();
        let sword_prices = (0u8..=20)
            .map(|level| {
                let avg = if level == 0 { 0 } else { (100.0 * 1.6f64.powi(level as i32)) as u64 };
                SwordPrice {
                    level,
                    min_price: avg * 8 / 10,
                    max_price: avg * 12 / 10,
                    avg_price: avg,
                }
            })
            .collect();
        let battle_rewards = [(1u8, 40.0, 500u64), (2, 30.0, 1_200), (3, 20.0, 2_500)]
            .into_iter()
            .map(|(level_diff, win_rate, avg)| BattleReward {
                level_diff,
                win_rate,
                min_reward: avg / 2,
                max_reward: avg * 2,
                avg_reward: avg,
            })
            .collect();
        Self {
            enhance_rates,
            sword_prices,
            battle_rewards,
            updated_at: None,
        }
    }
}

#[async_trait]
pub trait GameDataSource: Send + Sync {
    async fn fetch(&self) -> AgentResult<GameData>;
}

pub struct HttpGameDataSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpGameDataSource {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl GameDataSource for HttpGameDataSource {
    async fn fetch(&self) -> AgentResult<GameData> {
        let resp = self
            .client
            .get(&self.endpoint)
            .timeout(Duration::from_secs(5))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AgentError::GameData(format!(
                "game-data service returned {}",
                resp.status()
            )));
        }
        Ok(resp.json::<GameData>().await?)
    }
}

pub struct GameDataStore {
    source: Arc<dyn GameDataSource>,
    ttl: Duration,
    cache: RwLock<Option<(GameData, Instant)>>,
}

impl GameDataStore {
    pub fn new(source: Arc<dyn GameDataSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cache: RwLock::new(None),
        }
    }

    fn is_fresh(&self) -> bool {
        self.cache
            .read()
            .map(|c| c.as_ref().is_some_and(|(_, at)| at.elapsed() < self.ttl))
            .unwrap_or(false)
    }

    /// Fetches when the cache is stale. A failed fetch keeps the old copy.
    pub async fn refresh(&self) {
        if self.is_fresh() {
            return;
        }
        match self.source.fetch().await {
            Ok(data) => {
                tracing::info!(
                    rates = data.enhance_rates.len(),
                    prices = data.sword_prices.len(),
                    "game data refreshed"
                );
                if let Ok(mut cache) = self.cache.write() {
                    *cache = Some((data, Instant::now()));
                }
            }
            Err(e) => tracing::warn!(error = %e, "game data fetch failed; keeping previous tables"),
        }
    }

    pub fn data(&self) -> GameData {
        self.cache
            .read()
            .ok()
            .and_then(|c| c.as_ref().map(|(d, _)| d.clone()))
            .unwrap_or_else(GameData::builtin)
    }

    pub fn enhance_rates(&self) -> Vec<EnhanceRate> {
        self.data().enhance_rates
    }

    pub fn enhance_rate(&self, level: u8) -> Option<EnhanceRate> {
        self.data().enhance_rates.into_iter().find(|r| r.level == level)
    }

    pub fn sword_price(&self, level: u8) -> Option<SwordPrice> {
        self.data().sword_prices.into_iter().find(|p| p.level == level)
    }

    pub fn battle_reward(&self, level_diff: u8) -> Option<BattleReward> {
        self.data()
            .battle_rewards
            .into_iter()
            .find(|r| r.level_diff == level_diff)
    }

    /// Probability (percent) of reaching `to` from `from` without a destroy or hold.
    pub fn success_chance(&self, from: u8, to: u8) -> f64 {
        if from >= to {
            return 100.0;
        }
        let rates = self.enhance_rates();
        let chance: f64 = (from..to)
            .map(|lvl| {
                rates
                    .iter()
                    .find(|r| r.level == lvl)
                    .map(|r| r.success_rate / 100.0)
                    .unwrap_or(0.0)
            })
            .product();
        chance * 100.0
    }

    /// Expected number of `/강화` commands, ignoring destroys.
    pub fn expected_trials(&self, from: u8, to: u8) -> f64 {
        let rates = self.enhance_rates();
        (from..to)
            .filter_map(|lvl| rates.iter().find(|r| r.level == lvl))
            .filter(|r| r.success_rate > 0.0)
            .map(|r| 100.0 / r.success_rate)
            .sum()
    }

    /// `(expected value, win rate %, average reward)` of challenging an
    /// opponent `level_diff` levels above with `bet` gold at stake.
    pub fn upset_expected_value(&self, level_diff: u8, bet: u64) -> Option<(f64, f64, u64)> {
        let reward = self.battle_reward(level_diff)?;
        let win = reward.win_rate / 100.0;
        let ev = win * reward.avg_reward as f64 - (1.0 - win) * bet as f64;
        Some((ev, reward.win_rate, reward.avg_reward))
    }
}
