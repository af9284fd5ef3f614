use std::time::Duration;

use crate::agent_engine::engine::{Exchange, ModeContext};
use crate::agent_engine::loop_control::TransientBackoff;
use crate::agent_engine::state::ModeOutcome;
use crate::config::secs_to_duration;
use crate::game::parser;
use crate::game::types::{format_gold, RankingEntry};

/// An opponent inside the upset window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub level: u8,
}

/// Reads the ranking and resolves missing levels through `/프로필 @user`.
async fn discover(ctx: &mut ModeContext, my_level: u8) -> Option<Vec<Candidate>> {
    ctx.status("🔍 랭킹 확인 중...");
    let text = match ctx.exchange_raw("/랭킹", Duration::from_secs(1)).await {
        Exchange::Reply(text) => text,
        Exchange::Empty => return Some(Vec::new()),
        Exchange::Stopped => return None,
    };
    let me = ctx.session.handle().to_string();
    let mut entries: Vec<RankingEntry> = Vec::new();
    for mut entry in parser::parse_ranking(&text) {
        if entry.username.is_empty() || entry.username == me {
            continue;
        }
        if entry.level.is_none() {
            let cmd = format!("/프로필 {}", entry.username);
            match ctx.exchange_raw(&cmd, Duration::from_millis(500)).await {
                Exchange::Reply(reply) => {
                    entry.level = parser::parse_profile_for_user(&reply, &entry.username).and_then(|p| p.level);
                }
                Exchange::Empty => {}
                Exchange::Stopped => return None,
            }
        }
        entries.push(entry);
    }

    let candidates: Vec<Candidate> = parser::find_targets_in_ranking(&entries, my_level, ctx.config.battle.level_diff)
        .into_iter()
        .filter_map(|e| {
            Some(Candidate {
                level: e.level?,
                name: e.username,
            })
        })
        .collect();
    tracing::info!(
        ranked = entries.len(),
        candidates = candidates.len(),
        my_level,
        "battle candidates refreshed"
    );
    Some(candidates)
}

/// Index of the lowest-level candidate.
fn pick(candidates: &[Candidate]) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(_, c)| c.level)
        .map(|(i, _)| i)
}

fn tally(ctx: &ModeContext) -> String {
    let b = &ctx.stats.battle;
    format!(
        "📊 최종 전적: {}승 {}패 (승률 {:.1}%), 역배 {}/{}승, 골드 {}G",
        b.wins,
        b.losses,
        b.win_rate(),
        b.upset_wins,
        b.upset_attempts,
        format_gold(b.gold)
    )
}

/// Battle mode: challenge opponents one to `level_diff` levels above us.
pub async fn run(ctx: &mut ModeContext) -> ModeOutcome {
    let my_level = ctx.session.item.level;
    let sword = ctx.session.item.name.clone();
    let handle = ctx.session.handle().to_string();
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut backoff = TransientBackoff::default();
    ctx.console
        .print(&format!(
            "⚔️ 내 검: {} / 상대 범위: +{} ~ +{}",
            ctx.session.item,
            my_level.saturating_add(1),
            my_level.saturating_add(ctx.config.battle.level_diff)
        ))
        .await;

    loop {
        if !ctx.stop.is_running() {
            return ModeOutcome::Stopped;
        }
        if let Some(gold) = ctx.session.gold.filter(|g| *g < ctx.config.battle.min_gold) {
            ctx.console.print(&tally(ctx)).await;
            return ModeOutcome::GoldFloor { gold };
        }

        if candidates.is_empty() {
            match discover(ctx, my_level).await {
                Some(found) => candidates = found,
                None => return ModeOutcome::Stopped,
            }
            if candidates.is_empty() {
                ctx.status("😴 대결 상대 없음, 잠시 후 다시 확인");
                if !ctx.stop.sleep(secs_to_duration(ctx.config.battle.retry_delay)).await {
                    return ModeOutcome::Stopped;
                }
                continue;
            }
        }
        let Some(idx) = pick(&candidates) else {
            continue;
        };
        let opponent = candidates[idx].clone();
        ctx.status(&format!("⚔️ {} (+{}) 에게 도전", opponent.name, opponent.level));

        let text = match ctx.challenge(&opponent.name).await {
            Exchange::Reply(text) => text,
            Exchange::Empty => {
                if !backoff.wait(&ctx.stop).await {
                    return ModeOutcome::Stopped;
                }
                continue;
            }
            Exchange::Stopped => return ModeOutcome::Stopped,
        };

        if parser::detect_battle_daily_limit(&text) {
            tracing::info!("daily battle limit reached");
            ctx.console.print("\n📅 오늘 배틀 횟수를 모두 사용했습니다.").await;
            ctx.console.print(&tally(ctx)).await;
            ctx.console.wait_ack("엔터를 누르면 메뉴로 돌아갑니다...").await;
            return ModeOutcome::DailyLimit;
        }
        if parser::detect_battle_zero_level(&text) {
            tracing::info!(opponent = %opponent.name, "opponent at level 0; dropped");
            candidates.remove(idx);
            continue;
        }

        let mut result = parser::parse_battle_result(&text, &handle);
        if result.is_none() {
            tracing::debug!(reply = %text, "no result of ours yet; listening");
            result = match ctx.listen_raw().await {
                Exchange::Reply(more) => parser::parse_battle_result(&more, &handle),
                Exchange::Empty => None,
                Exchange::Stopped => return ModeOutcome::Stopped,
            };
        }
        match result {
            Some(result) => {
                backoff.reset();
                let upset = opponent.level > my_level;
                let prize = result.gold_earned;
                ctx.stats.record_battle(result.won, upset, prize);
                ctx.telemetry
                    .record_battle(&sword, my_level, Some(opponent.level), result.won, prize);
                if result.won {
                    ctx.session.wins += 1;
                    ctx.session.adjust_gold(prize as i64);
                } else {
                    ctx.session.losses += 1;
                    ctx.session.adjust_gold(-(prize as i64));
                }
                ctx.stats.observe_gold(ctx.session.gold);
                tracing::info!(
                    opponent = %opponent.name,
                    won = result.won,
                    upset,
                    prize,
                    "battle finished"
                );
                ctx.console
                    .print(&format!(
                        "{} vs {} (+{}): {} {}G",
                        if result.won { "🏆" } else { "💀" },
                        opponent.name,
                        opponent.level,
                        if result.won { "승리" } else { "패배" },
                        format_gold(prize as i64)
                    ))
                    .await;
            }
            None => {
                tracing::debug!(opponent = %opponent.name, "no battle result for us");
                if !backoff.wait(&ctx.stop).await {
                    return ModeOutcome::Stopped;
                }
                continue;
            }
        }

        if !ctx.stop.sleep(secs_to_duration(ctx.config.battle.cooldown)).await {
            return ModeOutcome::Stopped;
        }
    }
}
