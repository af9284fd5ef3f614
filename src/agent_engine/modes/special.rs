use crate::agent_engine::engine::{Exchange, ModeContext};
use crate::agent_engine::loop_control::TransientBackoff;
use crate::agent_engine::modes::enhance::{apply_outcome, enhance_to_target, EnhanceRun};
use crate::agent_engine::modes::out_of_gold;
use crate::agent_engine::state::ModeOutcome;
use crate::game::parser;
use crate::game::types::{EnhanceOutcome, GoldShortage, Item, ItemType};

/// Outcome of identifying the held item with one `/강화`.
enum Sighting {
    Identified(ItemType),
    Destroyed(Item),
    Unreadable,
    Stopped,
    OutOfGold(GoldShortage),
}

/// Enhances the held item once so the bot prints its name, then classifies it.
async fn identify(ctx: &mut ModeContext) -> Sighting {
    let pacing = ctx.config.pacing.delay_for_level(ctx.session.item.level);
    let text = match ctx.exchange("/강화", pacing).await {
        Exchange::Reply(text) => text,
        Exchange::Empty => return Sighting::Unreadable,
        Exchange::Stopped => return Sighting::Stopped,
    };
    if let Some(shortage) = parser::detect_insufficient_gold(&text) {
        return Sighting::OutOfGold(shortage);
    }

    let state = parser::parse(&text);
    let held = ctx.session.item.clone();
    let outcome = apply_outcome(ctx, &text);
    if outcome == Some(EnhanceOutcome::Destroy) {
        return Sighting::Destroyed(held);
    }

    if let Some(name) = state.item_name.filter(|n| !n.is_empty()) {
        ctx.session.item.name = name;
    }
    if ctx.session.item.name.is_empty() && outcome.is_none() {
        return Sighting::Unreadable;
    }
    let item_type = match parser::determine_item_type(&ctx.session.item.name) {
        ItemType::Unknown if state.item_type != ItemType::None => state.item_type,
        t => t,
    };
    ctx.session.item.item_type = item_type;
    tracing::info!(item = %ctx.session.item, kind = item_type.as_str(), "item identified");
    Sighting::Identified(item_type)
}

/// Outcome of discarding the held item with `/판매`.
pub(crate) enum Discard {
    Sold,
    CannotSell,
    Unreadable,
    Stopped,
}

/// Sells the held item and takes the replacement the bot hands out.
pub(crate) async fn discard(ctx: &mut ModeContext) -> Discard {
    let sold = ctx.session.item.clone();
    let text = match ctx.exchange("/판매", ctx.config.pacing.trash()).await {
        Exchange::Reply(text) => text,
        Exchange::Empty => return Discard::Unreadable,
        Exchange::Stopped => return Discard::Stopped,
    };
    if parser::detect_cannot_sell(&text) {
        tracing::info!(item = %sold, "item cannot be sold");
        return Discard::CannotSell;
    }
    let Some(sale) = parser::extract_sale_result(&text) else {
        return Discard::Unreadable;
    };
    ctx.observe_gold(&text);
    let gold = sale.sale_gold.unwrap_or(0);
    ctx.stats.record_sale(gold);
    ctx.telemetry.record_sale(&sold.name, sold.level, gold);

    let name = sale.new_sword_name.unwrap_or_default();
    let item_type = parser::determine_item_type(&name);
    if item_type.is_special() {
        ctx.stats.record_farm(item_type);
        ctx.telemetry.record_farming(&name, item_type);
    }
    ctx.session
        .replace_item(Item::new(name, sale.new_sword_level, item_type));
    Discard::Sold
}

fn count_farm(ctx: &mut ModeContext, name: &str, item_type: ItemType) {
    ctx.stats.record_farm(item_type);
    ctx.telemetry.record_farming(name, item_type);
}

/// Special mode: discard ordinary drops until a special item turns up, then
/// keep it or enhance it to the configured target.
pub async fn run(ctx: &mut ModeContext) -> ModeOutcome {
    let target = ctx.session.target_level;
    let mut backoff = TransientBackoff::default();
    // Each held item is counted once, however often it is enhanced.
    let mut counted = false;

    loop {
        if !ctx.stop.is_running() {
            return ModeOutcome::Stopped;
        }

        if ctx.session.item.item_type.is_special() {
            if target == 0 {
                let item = ctx.session.item.clone();
                ctx.console.print(&format!("⭐ 특수 검 발견: {item}")).await;
                return ModeOutcome::SpecialKept { item };
            }
            match enhance_to_target(ctx, target).await {
                EnhanceRun::Reached => {
                    return ModeOutcome::TargetReached {
                        level: ctx.session.item.level,
                    }
                }
                EnhanceRun::Destroyed => {
                    ctx.console.print("💥 특수 검이 파괴되었습니다. 다시 뽑습니다.").await;
                    counted = false;
                    continue;
                }
                EnhanceRun::Stopped => return ModeOutcome::Stopped,
                EnhanceRun::InsufficientGold(shortage) => return out_of_gold(ctx, shortage).await,
            }
        }

        ctx.status(&format!("🎣 특수 검 찾는 중: {}", ctx.session.item));
        match identify(ctx).await {
            Sighting::Identified(item_type) => {
                backoff.reset();
                if !counted {
                    let name = ctx.session.item.name.clone();
                    count_farm(ctx, &name, item_type);
                    counted = true;
                }
                if item_type.is_special() {
                    continue;
                }
            }
            Sighting::Destroyed(held) => {
                backoff.reset();
                if !counted {
                    count_farm(ctx, &held.name, ItemType::Trash);
                }
                counted = false;
                continue;
            }
            Sighting::Unreadable => {
                if !backoff.wait(&ctx.stop).await {
                    return ModeOutcome::Stopped;
                }
                continue;
            }
            Sighting::Stopped => return ModeOutcome::Stopped,
            Sighting::OutOfGold(shortage) => return out_of_gold(ctx, shortage).await,
        }

        match discard(ctx).await {
            Discard::Sold => {
                counted = false;
                if !ctx.stop.sleep(ctx.config.pacing.trash()).await {
                    return ModeOutcome::Stopped;
                }
            }
            // Enhanced once more on the next pass, then sold.
            Discard::CannotSell => {}
            Discard::Unreadable => {
                if !backoff.wait(&ctx.stop).await {
                    return ModeOutcome::Stopped;
                }
            }
            Discard::Stopped => return ModeOutcome::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::engine::run_mode;
    use crate::agent_engine::state::Mode;
    use crate::test_support::Harness;

    #[tokio::test(start_paused = true)]
    async fn trash_is_sold_until_special_is_kept() {
        let h = Harness::new("@A");
        h.profile(0, "녹슨 검", 20_000);
        h.says("/강화", "『녹슨 검』 +1 강화 성공");
        h.says("/판매", "검을 판매하여 100G 획득! 현재 골드: 20,100G\n새로운 검 『전설의 검』 +0 지급");

        let mut ctx = h.context(0);
        let outcome = run_mode(&mut ctx, Mode::Special, None).await;

        match outcome {
            ModeOutcome::SpecialKept { item } => {
                assert_eq!(item.name, "전설의 검");
                assert_eq!(item.level, 0);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(ctx.stats.trash_count, 1);
        assert_eq!(ctx.stats.special_count, 1);
        assert_eq!(ctx.stats.sales_total, 100);
        assert_eq!(h.fake.count("/판매"), 1);
        assert_eq!(h.fake.count("/강화"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unsellable_item_is_enhanced_again() {
        let h = Harness::new("@A");
        h.profile(0, "부러진 검", 20_000);
        h.says("/강화", "『부러진 검』 +0 강화 실패 유지");
        h.says("/판매", "0강 검은 판매할 수 없습니다");
        h.says("/강화", "『부러진 검』 +1 강화 성공");
        h.says("/판매", "검을 판매하여 50G 획득!\n새로운 검 『히든 검』 +0 지급");

        let mut ctx = h.context(0);
        let outcome = run_mode(&mut ctx, Mode::Special, None).await;

        assert!(matches!(outcome, ModeOutcome::SpecialKept { .. }), "{outcome:?}");
        assert_eq!(ctx.session.item.item_type, ItemType::Hidden);
        let order: Vec<String> = h.fake.submitted().into_iter().skip(1).collect();
        assert_eq!(order, vec!["/강화", "/판매", "/강화", "/판매"]);
        assert_eq!(ctx.stats.trash_count, 1);
        assert_eq!(ctx.stats.special_count, 1);
    }
}
