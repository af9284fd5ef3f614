use std::time::Duration;

use tokio::time::Instant;

use crate::agent_engine::engine::{Exchange, ModeContext};
use crate::agent_engine::loop_control::TransientBackoff;
use crate::agent_engine::modes::enhance::{enhance_to_target, EnhanceRun};
use crate::agent_engine::modes::out_of_gold;
use crate::agent_engine::modes::special::{discard, Discard};
use crate::agent_engine::state::{Mode, ModeOutcome};
use crate::game::parser;
use crate::game::types::{format_gold, Item};
use crate::stats::CycleRecord;

enum Farm {
    Ready,
    Stopped,
}

/// Obtains a fresh level-0 item by selling the held one. An item the bot
/// refuses to buy is used as is.
async fn farm(ctx: &mut ModeContext, backoff: &mut TransientBackoff) -> Farm {
    loop {
        if !ctx.stop.is_running() {
            return Farm::Stopped;
        }
        ctx.status(&format!("🎣 새 검 뽑는 중: {}", ctx.session.item));
        match discard(ctx).await {
            Discard::Sold => {
                let item = &ctx.session.item;
                if !item.item_type.is_special() {
                    ctx.stats.record_farm(item.item_type);
                    ctx.telemetry.record_farming(&item.name, item.item_type);
                }
                return Farm::Ready;
            }
            Discard::CannotSell => return Farm::Ready,
            Discard::Unreadable => {
                if !backoff.wait(&ctx.stop).await {
                    return Farm::Stopped;
                }
            }
            Discard::Stopped => return Farm::Stopped,
        }
    }
}

fn spent(before: Option<u64>, after: Option<u64>) -> u64 {
    match (before, after) {
        (Some(before), Some(after)) => before.saturating_sub(after),
        _ => 0,
    }
}

fn gained(before: Option<u64>, after: Option<u64>) -> Option<u64> {
    match (before, after) {
        (Some(before), Some(after)) if after >= before => Some(after - before),
        _ => None,
    }
}

/// What the profile says about a `/판매` that got no reply.
enum SaleCheck {
    Sold { gold: Option<u64>, next: Item },
    Held,
    Unknown,
    Stopped,
}

async fn check_sale(ctx: &mut ModeContext, item: &Item) -> SaleCheck {
    let text = match ctx.exchange("/프로필", Duration::from_millis(500)).await {
        Exchange::Reply(text) => text,
        Exchange::Empty => return SaleCheck::Unknown,
        Exchange::Stopped => return SaleCheck::Stopped,
    };
    let handle = ctx.session.handle().to_string();
    let profile = if handle.is_empty() {
        parser::parse_profile(&text)
    } else {
        parser::parse_profile_for_user(&text, &handle)
    };
    let Some(profile) = profile else {
        return SaleCheck::Unknown;
    };
    let Some(level) = profile.level else {
        return SaleCheck::Unknown;
    };
    if level == item.level && profile.sword_name == item.name {
        return SaleCheck::Held;
    }
    let item_type = parser::determine_item_type(&profile.sword_name);
    SaleCheck::Sold {
        gold: profile.gold,
        next: Item::new(profile.sword_name, level, item_type),
    }
}

enum Sell {
    Sold { gold: u64, next: Option<Item> },
    CannotSell,
    /// Neither the sale nor the profile could be read.
    Lost,
    Stopped,
}

const SALE_CHECKS: u32 = 3;

/// Sells the held item. An unanswered `/판매` is settled from the profile:
/// a changed sword means the sale went through, the same sword means retry.
async fn sell(ctx: &mut ModeContext, item: &Item, backoff: &mut TransientBackoff) -> Sell {
    let gold_before = ctx.session.gold;
    let mut checks = 0;
    loop {
        ctx.status(&format!("💵 판매 중: {item}"));
        match ctx.exchange("/판매", ctx.config.pacing.trash()).await {
            Exchange::Reply(text) => {
                if parser::detect_cannot_sell(&text) {
                    return Sell::CannotSell;
                }
                let sale = parser::extract_sale_result(&text).unwrap_or_default();
                ctx.observe_gold(&text);
                let gold = sale
                    .sale_gold
                    .or_else(|| gained(gold_before, ctx.session.gold))
                    .unwrap_or(0);
                let next = sale.new_sword_name.map(|name| {
                    let item_type = parser::determine_item_type(&name);
                    Item::new(name, sale.new_sword_level, item_type)
                });
                return Sell::Sold { gold, next };
            }
            Exchange::Stopped => return Sell::Stopped,
            Exchange::Empty => tracing::warn!(item = %item, "no sale reply; checking profile"),
        }

        loop {
            match check_sale(ctx, item).await {
                SaleCheck::Sold { gold, next } => {
                    ctx.session.observe_gold(gold);
                    ctx.stats.observe_gold(gold);
                    if let Some(g) = gold {
                        ctx.telemetry.record_gold(g);
                    }
                    let gold = gained(gold_before, ctx.session.gold).unwrap_or(0);
                    tracing::info!(item = %item, gold, next = %next, "sale confirmed from profile");
                    return Sell::Sold { gold, next: Some(next) };
                }
                SaleCheck::Held => break,
                SaleCheck::Unknown => {
                    checks += 1;
                    if checks >= SALE_CHECKS {
                        return Sell::Lost;
                    }
                }
                SaleCheck::Stopped => return Sell::Stopped,
            }
            if !backoff.wait(&ctx.stop).await {
                return Sell::Stopped;
            }
        }
        if !backoff.wait(&ctx.stop).await {
            return Sell::Stopped;
        }
    }
}

async fn keep_special(ctx: &mut ModeContext) -> ModeOutcome {
    let item = ctx.session.item.clone();
    tracing::info!(item = %item, "special item kept");
    ctx.console
        .print(&format!("⭐ 특수 검 발견! 판매하지 않고 보관합니다: {item}"))
        .await;
    ModeOutcome::SpecialKept { item }
}

/// GoldMine mode: farm, enhance to the sell level, sell, repeat.
pub async fn run(ctx: &mut ModeContext) -> ModeOutcome {
    let target = ctx.session.target_level.max(1);
    let mut resume = ctx.session.item.level > 0;
    // Enhance spend on a sword whose sale could not be settled.
    let mut carried_cost: u64 = 0;
    let mut backoff = TransientBackoff::default();
    ctx.console
        .print(&format!("💰 골드 채굴: +{target} 달성 후 판매 반복"))
        .await;

    loop {
        if !ctx.stop.is_running() {
            return ModeOutcome::Stopped;
        }
        let started = Instant::now();

        // ── source ──
        if let Some(item) = ctx.session.pending_replacement.take() {
            tracing::debug!(item = %item, "using pending replacement");
            ctx.session.replace_item(item);
        } else if resume {
            resume = false;
            tracing::info!(item = %ctx.session.item, "resuming owned sword");
        } else if let Farm::Stopped = farm(ctx, &mut backoff).await {
            return ModeOutcome::Stopped;
        }
        if ctx.session.item.item_type.is_special() {
            return keep_special(ctx).await;
        }

        // ── enhance ──
        let cycle_item = ctx.session.item.clone();
        let carried = std::mem::take(&mut carried_cost);
        let enhance_cost = if cycle_item.level >= target {
            carried
        } else {
            let gold_before = ctx.session.gold;
            let run = enhance_to_target(ctx, target).await;
            let cost = carried + spent(gold_before, ctx.session.gold);
            match run {
                EnhanceRun::Reached => cost,
                EnhanceRun::Destroyed => {
                    let record = CycleRecord::new(Mode::GoldMine, &cycle_item.name, 0, started).failed(cost);
                    ctx.close_cycle(record);
                    ctx.session.pending_replacement = Some(ctx.session.item.clone());
                    continue;
                }
                EnhanceRun::Stopped => return ModeOutcome::Stopped,
                EnhanceRun::InsufficientGold(shortage) => return out_of_gold(ctx, shortage).await,
            }
        };

        // ── sell ──
        let item = ctx.session.item.clone();
        let (sale_gold, next) = match sell(ctx, &item, &mut backoff).await {
            Sell::Sold { gold, next } => (gold, next),
            Sell::CannotSell => {
                ctx.close_cycle(CycleRecord::new(Mode::GoldMine, &item.name, item.level, started).failed(enhance_cost));
                continue;
            }
            Sell::Lost => {
                tracing::warn!(item = %item, "sale unsettled; keeping sword for the next cycle");
                carried_cost = enhance_cost;
                resume = true;
                continue;
            }
            Sell::Stopped => return ModeOutcome::Stopped,
        };
        backoff.reset();
        ctx.stats.record_sale(sale_gold);
        ctx.telemetry.record_sale(&item.name, item.level, sale_gold);

        let record = CycleRecord::new(Mode::GoldMine, &item.name, item.level, started).sold(sale_gold, enhance_cost);
        let net = record.net_profit;
        ctx.close_cycle(record);
        ctx.console
            .print(&format!(
                "🔄 사이클 {}: {item} 판매 {}G - 강화비 {}G = {}G",
                ctx.session.cycles,
                format_gold(sale_gold as i64),
                format_gold(enhance_cost as i64),
                format_gold(net)
            ))
            .await;

        if let Some(next) = next {
            let item_type = next.item_type;
            if item_type.is_special() {
                ctx.stats.record_farm(item_type);
                ctx.telemetry.record_farming(&next.name, item_type);
                ctx.session.replace_item(next);
                return keep_special(ctx).await;
            }
            ctx.session.pending_replacement = Some(next);
        }

        if !ctx.stop.sleep(ctx.config.pacing.trash()).await {
            return ModeOutcome::Stopped;
        }
    }
}
