//! Per-session accounting and the end-of-session report.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::agent_engine::state::Mode;
use crate::game::types::{format_gold, EnhanceOutcome, ItemType};

/// One closed unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub mode: Mode,
    pub item_name: String,
    pub final_level: u8,
    pub sale_gold: Option<u64>,
    pub enhance_cost: u64,
    pub net_profit: i64,
    pub duration_secs: f64,
    pub success: bool,
}

impl CycleRecord {
    pub fn new(mode: Mode, item_name: &str, final_level: u8, started: Instant) -> Self {
        Self {
            mode,
            item_name: item_name.to_string(),
            final_level,
            sale_gold: None,
            enhance_cost: 0,
            net_profit: 0,
            duration_secs: started.elapsed().as_secs_f64(),
            success: false,
        }
    }

    /// Closes a sold cycle. `net = sale - cost`.
    pub fn sold(mut self, sale_gold: u64, enhance_cost: u64) -> Self {
        self.sale_gold = Some(sale_gold);
        self.enhance_cost = enhance_cost;
        self.net_profit = sale_gold as i64 - enhance_cost as i64;
        self.success = true;
        self
    }

    /// Closes a cycle that ended without a sale.
    pub fn failed(mut self, enhance_cost: u64) -> Self {
        self.enhance_cost = enhance_cost;
        self.net_profit = -(enhance_cost as i64);
        self.success = false;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnhanceCounts {
    pub success: u32,
    pub hold: u32,
    pub destroy: u32,
    /// Successes keyed by the level the attempt started from.
    pub success_by_level: BTreeMap<u8, u32>,
}

impl EnhanceCounts {
    pub fn total(&self) -> u32 {
        self.success + self.hold + self.destroy
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BattleCounts {
    pub wins: u32,
    pub losses: u32,
    pub upset_attempts: u32,
    pub upset_wins: u32,
    /// Net gold moved by battles.
    pub gold: i64,
}

impl BattleCounts {
    pub fn win_rate(&self) -> f64 {
        let total = self.wins + self.losses;
        if total == 0 {
            0.0
        } else {
            self.wins as f64 / total as f64 * 100.0
        }
    }
}

pub struct SessionStats {
    started: Instant,
    pub start_gold: Option<u64>,
    pub end_gold: Option<u64>,
    pub trash_count: u32,
    pub special_count: u32,
    pub enhance: EnhanceCounts,
    pub battle: BattleCounts,
    pub sales_count: u32,
    pub sales_total: u64,
    pub cycles: Vec<CycleRecord>,
}

impl SessionStats {
    pub fn new(start_gold: Option<u64>) -> Self {
        Self {
            started: Instant::now(),
            start_gold,
            end_gold: start_gold,
            trash_count: 0,
            special_count: 0,
            enhance: EnhanceCounts::default(),
            battle: BattleCounts::default(),
            sales_count: 0,
            sales_total: 0,
            cycles: Vec::new(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn observe_gold(&mut self, gold: Option<u64>) {
        if let Some(gold) = gold {
            self.start_gold.get_or_insert(gold);
            self.end_gold = Some(gold);
        }
    }

    pub fn record_enhance(&mut self, outcome: EnhanceOutcome, from_level: u8) {
        match outcome {
            EnhanceOutcome::Success => {
                self.enhance.success += 1;
                *self.enhance.success_by_level.entry(from_level).or_default() += 1;
            }
            EnhanceOutcome::Hold => self.enhance.hold += 1,
            EnhanceOutcome::Destroy => self.enhance.destroy += 1,
        }
    }

    pub fn record_farm(&mut self, item_type: ItemType) {
        if item_type.is_special() {
            self.special_count += 1;
        } else {
            self.trash_count += 1;
        }
    }

    pub fn record_sale(&mut self, gold: u64) {
        self.sales_count += 1;
        self.sales_total += gold;
    }

    /// `gold` is the announced prize: credited on a win, debited on a loss.
    pub fn record_battle(&mut self, won: bool, upset: bool, gold: u64) {
        if upset {
            self.battle.upset_attempts += 1;
        }
        if won {
            self.battle.wins += 1;
            self.battle.gold += gold as i64;
            if upset {
                self.battle.upset_wins += 1;
            }
        } else {
            self.battle.losses += 1;
            self.battle.gold -= gold as i64;
        }
    }

    pub fn close_cycle(&mut self, record: CycleRecord) {
        tracing::info!(
            mode = ?record.mode,
            item = %record.item_name,
            level = record.final_level,
            net = record.net_profit,
            secs = format!("{:.1}", record.duration_secs),
            "cycle closed"
        );
        self.cycles.push(record);
    }

    pub fn cycle_net_total(&self) -> i64 {
        self.cycles.iter().map(|c| c.net_profit).sum()
    }

    /// Gold delta over the session. Falls back to the accumulated cycle and
    /// battle totals when either end of the balance is unknown.
    pub fn gold_delta(&self) -> i64 {
        match (self.start_gold, self.end_gold) {
            (Some(start), Some(end)) if start > 0 => end as i64 - start as i64,
            _ => self.cycle_net_total() + self.battle.gold,
        }
    }

    pub fn report(&self) -> String {
        let elapsed = self.elapsed();
        let secs = elapsed.as_secs_f64();
        let delta = self.gold_delta();
        let per_hour = if secs > 0.0 { (delta as f64 / secs * 3600.0) as i64 } else { 0 };
        let rule = "━".repeat(50);

        let mut out = String::new();
        let _ = writeln!(out);
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "  📊 세션 통계 ({})", format_duration(elapsed));
        let _ = writeln!(out, "{rule}");

        if self.trash_count > 0 || self.special_count > 0 {
            let _ = writeln!(out, "  🎣 트래시 처분: {}회", self.trash_count);
            let _ = writeln!(out, "  ⭐ 특수 발견:   {}회", self.special_count);
        }
        if self.enhance.total() > 0 {
            let _ = writeln!(out, "  ✅ 강화 성공:   {}회", self.enhance.success);
            let _ = writeln!(out, "  ⏸️  강화 유지:   {}회", self.enhance.hold);
            let _ = writeln!(out, "  💥 강화 파괴:   {}회", self.enhance.destroy);
        }
        if self.battle.wins + self.battle.losses > 0 {
            let _ = writeln!(
                out,
                "  ⚔️  배틀 전적:   {}승 {}패 ({:.1}%)",
                self.battle.wins,
                self.battle.losses,
                self.battle.win_rate()
            );
        }
        if self.sales_count > 0 {
            let _ = writeln!(
                out,
                "  💵 판매:        {}회 ({}G)",
                self.sales_count,
                format_gold(self.sales_total as i64)
            );
        }
        let _ = writeln!(out, "{rule}");

        match (self.start_gold, self.end_gold) {
            (Some(start), Some(end)) if start > 0 && end > 0 => {
                let _ = writeln!(
                    out,
                    "  💰 골드 변화:   {}G → {}G ({}G)",
                    format_gold(start as i64),
                    format_gold(end as i64),
                    signed_gold(delta)
                );
            }
            _ if delta != 0 => {
                let _ = writeln!(out, "  💰 총 수익:     {}G", signed_gold(delta));
            }
            _ => {}
        }
        let _ = writeln!(out, "  📈 시간당 골드: {}G/h", signed_gold(per_hour));

        if !self.cycles.is_empty() {
            let n = self.cycles.len();
            let avg_secs = self.cycles.iter().map(|c| c.duration_secs).sum::<f64>() / n as f64;
            let avg_gold = self.cycle_net_total() / n as i64;
            let _ = writeln!(
                out,
                "  🔄 완료 사이클: {}회 (평균 {:.0}초, {}G/사이클)",
                n,
                avg_secs,
                signed_gold(avg_gold)
            );
        }
        let _ = writeln!(out, "{rule}");
        out
    }
}

fn signed_gold(amount: i64) -> String {
    if amount >= 0 {
        format!("+{}", format_gold(amount))
    } else {
        format_gold(amount)
    }
}

pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    let (h, m, s) = (total / 3600, (total / 60) % 60, total % 60);
    if h > 0 {
        format!("{h}시간 {m}분 {s}초")
    } else if m > 0 {
        format!("{m}분 {s}초")
    } else {
        format!("{s}초")
    }
}
