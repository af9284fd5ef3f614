//! The automated loops. Each one borrows the shared [`ModeContext`] and
//! returns how it ended.

pub mod battle;
pub mod enhance;
pub mod goldmine;
pub mod profile;
pub mod special;

use crate::agent_engine::engine::ModeContext;
use crate::agent_engine::loop_control::StopReason;
use crate::agent_engine::state::ModeOutcome;
use crate::game::types::{format_gold, GoldShortage};

/// Terminal path for a refused enhancement: report, flush, stop.
pub(crate) async fn out_of_gold(ctx: &mut ModeContext, shortage: GoldShortage) -> ModeOutcome {
    tracing::warn!(
        required = shortage.required,
        remaining = shortage.remaining,
        shortage = shortage.shortage(),
        "insufficient gold"
    );
    ctx.session.observe_gold(Some(shortage.remaining));
    ctx.stats.observe_gold(Some(shortage.remaining));
    ctx.console
        .print(&format!(
            "\n💸 골드 부족으로 중단합니다.\n   필요 골드: {}G\n   보유 골드: {}G\n   부족 골드: {}G",
            format_gold(shortage.required as i64),
            format_gold(shortage.remaining as i64),
            format_gold(shortage.shortage() as i64)
        ))
        .await;
    ctx.telemetry.flush();
    ctx.stop.stop(StopReason::Fatal("insufficient gold".into()));
    ModeOutcome::InsufficientGold(shortage)
}
