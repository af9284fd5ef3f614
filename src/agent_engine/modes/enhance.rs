use crate::agent_engine::engine::{Exchange, ModeContext};
use crate::agent_engine::loop_control::TransientBackoff;
use crate::agent_engine::modes::out_of_gold;
use crate::agent_engine::state::ModeOutcome;
use crate::game::parser;
use crate::game::types::{EnhanceOutcome, GoldShortage, Item, FALLBACK_SWORD_NAME, MAX_LEVEL};

/// How an enhancement run against a target level ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnhanceRun {
    Reached,
    Destroyed,
    Stopped,
    InsufficientGold(GoldShortage),
}

/// Applies one `/강화` reply to the held item, counters and telemetry.
/// Returns the recognized outcome, if any.
pub fn apply_outcome(ctx: &mut ModeContext, text: &str) -> Option<EnhanceOutcome> {
    let state = parser::parse(text);
    ctx.observe_gold(text);
    let from = ctx.session.item.level;
    let sword = if ctx.session.item.name.is_empty() {
        state.item_name.clone().unwrap_or_default()
    } else {
        ctx.session.item.name.clone()
    };

    match state.last_result {
        Some(EnhanceOutcome::Destroy) => {
            let name = parser::extract_sale_result(text)
                .and_then(|sale| sale.new_sword_name)
                .unwrap_or_else(|| FALLBACK_SWORD_NAME.to_string());
            let item_type = parser::determine_item_type(&name);
            ctx.session.replace_item(Item::fresh(name, item_type));
        }
        Some(EnhanceOutcome::Success) => {
            ctx.session.item.level = match state.result_level {
                Some(level) if level > 0 => level,
                _ => from.saturating_add(1).min(MAX_LEVEL),
            };
            ctx.session.item.name = sword.clone();
        }
        Some(EnhanceOutcome::Hold) => {
            if let Some(level) = state.result_level.filter(|l| *l != from) {
                tracing::info!(from, to = level, "level resynced on hold");
                ctx.session.item.level = level;
            }
            ctx.session.item.name = sword.clone();
        }
        None => {
            if let Some(level) = state.result_level.or(state.level).filter(|l| *l > 0 && *l != from) {
                tracing::info!(from, to = level, "level resynced from unrecognized reply");
                ctx.session.item.level = level;
            }
            return None;
        }
    }

    let outcome = state.last_result?;
    tracing::info!(
        sword = %sword,
        from,
        to = ctx.session.item.level,
        result = outcome.as_str(),
        "enhance result"
    );
    ctx.stats.record_enhance(outcome, from);
    ctx.telemetry.record_enhance(&sword, from, outcome);
    Some(outcome)
}

/// Issues `/강화` until the held item reaches `target`, is destroyed, gold
/// runs out or a stop is requested.
pub async fn enhance_to_target(ctx: &mut ModeContext, target: u8) -> EnhanceRun {
    let mut backoff = TransientBackoff::default();
    loop {
        if ctx.session.item.level >= target {
            return EnhanceRun::Reached;
        }
        if !ctx.stop.is_running() {
            return EnhanceRun::Stopped;
        }
        let level = ctx.session.item.level;
        ctx.status(&format!("⚒️ 강화 중: {} → +{target}", ctx.session.item));
        let pacing = ctx.config.pacing.delay_for_level(level);

        let text = match ctx.exchange("/강화", pacing).await {
            Exchange::Reply(text) => text,
            Exchange::Empty => {
                if !backoff.wait(&ctx.stop).await {
                    return EnhanceRun::Stopped;
                }
                continue;
            }
            Exchange::Stopped => return EnhanceRun::Stopped,
        };

        if let Some(shortage) = parser::detect_insufficient_gold(&text) {
            return EnhanceRun::InsufficientGold(shortage);
        }
        match apply_outcome(ctx, &text) {
            Some(EnhanceOutcome::Destroy) => return EnhanceRun::Destroyed,
            Some(_) => backoff.reset(),
            None => {
                tracing::debug!(reply = %text, "no enhance result in reply");
                if !backoff.wait(&ctx.stop).await {
                    return EnhanceRun::Stopped;
                }
            }
        }
    }
}

/// Enhance mode: keep going through destroys until the target is reached.
pub async fn run(ctx: &mut ModeContext) -> ModeOutcome {
    let target = ctx.session.target_level;
    ctx.console
        .print(&format!("🎯 목표: +{target} (현재 {})", ctx.session.item))
        .await;
    loop {
        match enhance_to_target(ctx, target).await {
            EnhanceRun::Reached => {
                let level = ctx.session.item.level;
                tracing::info!(level, item = %ctx.session.item, "enhance target reached");
                return ModeOutcome::TargetReached { level };
            }
            EnhanceRun::Destroyed => {
                ctx.console
                    .print(&format!("💥 파괴! 새 검으로 다시 시작: {}", ctx.session.item))
                    .await;
            }
            EnhanceRun::Stopped => return ModeOutcome::Stopped,
            EnhanceRun::InsufficientGold(shortage) => return out_of_gold(ctx, shortage).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::agent_engine::engine::run_mode;
    use crate::agent_engine::state::Mode;
    use crate::telemetry::TelemetryEvent;
    use crate::test_support::Harness;

    #[tokio::test(start_paused = true)]
    async fn reaches_target_through_three_successes() {
        let h = Harness::new("@A");
        h.profile(7, "청룡검", 50_000);
        h.says("/강화", "『청룡검』 +8 강화 성공");
        h.fake.reply("/강화", "+9 강화 성공");
        h.fake.reply("/강화", "+10 강화 성공");

        let mut ctx = h.context(10);
        let outcome = run_mode(&mut ctx, Mode::Enhance, None).await;

        assert_eq!(outcome, ModeOutcome::TargetReached { level: 10 });
        assert_eq!(ctx.session.item.level, 10);
        assert_eq!(ctx.stats.enhance.success, 3);
        assert_eq!(ctx.stats.enhance.destroy, 0);
        assert_eq!(h.fake.count("/강화"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn destroy_resets_level_and_adopts_new_sword() {
        let h = Harness::new("@A");
        h.profile(9, "청룡검", 50_000);
        h.says("/강화", "+10 강화 성공");
        h.says("/강화", "강화 실패 유지 +10");
        h.says("/강화", "『청룡검』 파괴 … 새로운 검 『낡은 검』 획득");

        let mut ctx = h.context(12);
        let outcome = run_mode(&mut ctx, Mode::Enhance, Some(Duration::from_secs(60))).await;

        assert_eq!(outcome, ModeOutcome::Stopped);
        assert_eq!(ctx.stats.enhance.success, 1);
        assert_eq!(ctx.stats.enhance.hold, 1);
        assert_eq!(ctx.stats.enhance.destroy, 1);
        assert_eq!(ctx.session.item.name, "낡은 검");
        assert_eq!(ctx.session.item.level, 0);
        // The loop kept going after the destroy.
        assert!(h.fake.count("/강화") >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn insufficient_gold_reports_shortage_and_flushes_once() {
        let h = Harness::new("@A");
        h.profile(9, "청룡검", 12_300);
        h.says("/강화", "강화 비용 50,000G 부족 … 남은 골드 12,300G");

        let mut ctx = h.context(12);
        let outcome = run_mode(&mut ctx, Mode::Enhance, None).await;

        let expected = GoldShortage { required: 50_000, remaining: 12_300 };
        assert_eq!(outcome, ModeOutcome::InsufficientGold(expected));
        assert_eq!(expected.shortage(), 37_700);
        assert!(h.console.output().contains("부족 골드: 37,700G"));
        assert_eq!(h.fake.count("/강화"), 1);

        drop(ctx);
        let sink = h.shutdown().await;
        assert_eq!(sink.flushes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_further_commands() {
        let h = Harness::new("@A");
        h.profile(3, "목검", 50_000);
        let mut ctx = h.context(10);
        h.hotkey.press_after(Duration::from_secs(4));
        let outcome = run_mode(&mut ctx, Mode::Enhance, None).await;
        assert_eq!(outcome, ModeOutcome::Stopped);
        let sent = h.fake.count("/강화");
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.fake.count("/강화"), sent);
    }

    #[tokio::test(start_paused = true)]
    async fn success_without_level_counts_up() {
        let h = Harness::new("@A");
        let mut ctx = h.context(10);
        ctx.session.item = Item::new("청룡검", 4, crate::game::types::ItemType::Unknown);
        assert_eq!(apply_outcome(&mut ctx, "@A 강화 성공!"), Some(EnhanceOutcome::Success));
        assert_eq!(ctx.session.item.level, 5);
        assert_eq!(apply_outcome(&mut ctx, "@A 현재 +7"), None);
        assert_eq!(ctx.session.item.level, 7);
        assert_eq!(ctx.stats.enhance.total(), 1);

        drop(ctx);
        let sink = h.shutdown().await;
        assert!(sink.events().iter().any(|e| matches!(
            e,
            TelemetryEvent::Enhance { level: 4, result: EnhanceOutcome::Success, .. }
        )));
    }
}
