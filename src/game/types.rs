use serde::{Deserialize, Serialize};

pub const MAX_LEVEL: u8 = 20;
pub const MAX_GOLD: u64 = 1_000_000_000;

/// Name given to the base-tier sword handed out after a destroy when the
/// bot's message does not name the replacement.
pub const FALLBACK_SWORD_NAME: &str = "낡은 검";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Trash,
    Normal,
    Special,
    Hidden,
    Unknown,
    #[default]
    None,
}

impl ItemType {
    /// Hidden drops are a kind of special item.
    pub fn is_special(self) -> bool {
        matches!(self, ItemType::Special | ItemType::Hidden)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Trash => "trash",
            ItemType::Normal => "normal",
            ItemType::Special => "special",
            ItemType::Hidden => "hidden",
            ItemType::Unknown => "unknown",
            ItemType::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhanceOutcome {
    Success,
    Hold,
    Destroy,
}

impl EnhanceOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            EnhanceOutcome::Success => "success",
            EnhanceOutcome::Hold => "hold",
            EnhanceOutcome::Destroy => "destroy",
        }
    }
}

/// Everything the generic parser could read from one chat response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameState {
    pub level: Option<u8>,
    /// Level printed on the line that carried the enhancement result.
    pub result_level: Option<u8>,
    pub gold: Option<u64>,
    pub item_type: ItemType,
    pub item_name: Option<String>,
    pub last_result: Option<EnhanceOutcome>,
}

/// The single item the agent holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub level: u8,
    pub item_type: ItemType,
}

impl Item {
    pub fn new(name: impl Into<String>, level: u8, item_type: ItemType) -> Self {
        Self {
            name: name.into(),
            level: level.min(MAX_LEVEL),
            item_type,
        }
    }

    pub fn fresh(name: impl Into<String>, item_type: ItemType) -> Self {
        Self::new(name, 0, item_type)
    }
}

impl Default for Item {
    fn default() -> Self {
        Item::fresh("", ItemType::None)
    }
}

impl std::fmt::Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "+{}", self.level)
        } else {
            write!(f, "[+{}] {}", self.level, self.name)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Handle including the leading "@".
    pub name: String,
    pub level: Option<u8>,
    pub sword_name: String,
    pub wins: u32,
    pub losses: u32,
    pub gold: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankingEntry {
    pub rank: u32,
    /// May be empty when the ranking line omits the handle.
    pub username: String,
    /// Present in the enhancement ranking, absent in the battle ranking.
    pub level: Option<u8>,
    pub wins: u32,
    pub losses: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BattleResult {
    pub winner: String,
    pub loser: String,
    pub winner_level: Option<u8>,
    pub loser_level: Option<u8>,
    /// The prize announced for the winner.
    pub gold_earned: u64,
    pub won: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GoldShortage {
    pub required: u64,
    pub remaining: u64,
}

impl GoldShortage {
    pub fn shortage(&self) -> u64 {
        self.required.saturating_sub(self.remaining)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaleResult {
    pub sale_gold: Option<u64>,
    pub current_gold: Option<u64>,
    pub new_sword_name: Option<String>,
    pub new_sword_level: u8,
}

/// Formats gold with thousands separators, keeping the sign.
pub fn format_gold(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
