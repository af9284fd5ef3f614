use serde::{Deserialize, Serialize};

use crate::game::parser::determine_item_type;
use crate::game::types::{GoldShortage, Item, ItemType, Profile, MAX_GOLD};

/// The four automated loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Enhance,
    Special,
    GoldMine,
    Battle,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Enhance => "강화 목표 달성",
            Mode::Special => "특수 검 뽑기",
            Mode::GoldMine => "골드 채굴",
            Mode::Battle => "자동 배틀 (역배)",
        }
    }
}

/// How a mode run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeOutcome {
    TargetReached { level: u8 },
    /// A special item was found and kept.
    SpecialKept { item: Item },
    InsufficientGold(GoldShortage),
    DailyLimit,
    /// Gold fell under the configured battle floor.
    GoldFloor { gold: u64 },
    Stopped,
}

/// The agent's belief about itself for one mode run.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    profile: Option<Profile>,
    pub item: Item,
    pub gold: Option<u64>,
    pub target_level: u8,
    pub wins: u32,
    pub losses: u32,
    /// Level-0 replacement handed out by the last sale or destroy.
    pub pending_replacement: Option<Item>,
    pub cycles: u32,
}

impl SessionState {
    pub fn new(target_level: u8) -> Self {
        Self {
            target_level,
            ..Self::default()
        }
    }

    /// Binds the session profile. Only the first call takes effect: the
    /// profile decides which chat blocks are ours for the whole session.
    pub fn bind_profile(&mut self, profile: Profile) -> bool {
        if self.profile.is_some() {
            tracing::warn!(name = %profile.name, "session profile already bound; ignoring");
            return false;
        }
        let item_type = determine_item_type(&profile.sword_name);
        self.item = Item::new(
            profile.sword_name.clone(),
            profile.level.unwrap_or(0),
            if profile.sword_name.is_empty() { ItemType::None } else { item_type },
        );
        if let Some(gold) = profile.gold {
            self.gold = Some(gold);
        }
        self.wins = profile.wins;
        self.losses = profile.losses;
        self.profile = Some(profile);
        true
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    /// Our handle, empty when no profile could be read.
    pub fn handle(&self) -> &str {
        self.profile.as_ref().map(|p| p.name.as_str()).unwrap_or("")
    }

    pub fn observe_gold(&mut self, gold: Option<u64>) {
        if let Some(gold) = gold {
            self.gold = Some(gold);
        }
    }

    /// Applies a signed change, keeping gold inside `[0, MAX_GOLD]`. Returns
    /// false when the balance is unknown and the change was not applied.
    pub fn adjust_gold(&mut self, delta: i64) -> bool {
        match self.gold {
            Some(gold) => {
                let next = (gold as i64).saturating_add(delta).clamp(0, MAX_GOLD as i64);
                self.gold = Some(next as u64);
                true
            }
            None => {
                tracing::debug!(delta, "gold balance unknown; change not applied");
                false
            }
        }
    }

    pub fn replace_item(&mut self, item: Item) {
        tracing::info!(from = %self.item, to = %item, "item replaced");
        self.item = item;
    }
}
