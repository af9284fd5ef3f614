use std::fmt::Write as _;

use crate::agent_engine::engine::ModeContext;
use crate::game::types::{format_gold, Profile, MAX_LEVEL};

/// Levels whose reach probability is shown for a sword at `level`.
fn milestones(level: u8) -> Vec<u8> {
    let mut targets: Vec<u8> = [
        level.saturating_add(1),
        level.saturating_add(2),
        level.saturating_add(3),
        10,
        12,
        15,
    ]
    .into_iter()
    .filter(|t| *t > level && *t <= MAX_LEVEL)
    .collect();
    targets.sort_unstable();
    targets.dedup();
    targets
}

/// Reads our profile and renders it with odds, prices and upset value.
pub async fn inspect(ctx: &mut ModeContext) -> String {
    ctx.status("📋 프로필 확인 중...");
    match ctx.load_profile().await {
        Some(profile) => render(ctx, &profile),
        None => "❌ 프로필을 읽을 수 없습니다. 채팅창 위치를 확인하세요.".to_string(),
    }
}

fn render(ctx: &ModeContext, profile: &Profile) -> String {
    let data = &ctx.game_data;
    let level = profile.level.unwrap_or(0);
    let gold = profile.gold.unwrap_or(0);
    let mut out = String::new();

    let _ = writeln!(out, "\n👤 {}", profile.name);
    let _ = writeln!(out, "   전적: {}승 {}패", profile.wins, profile.losses);
    let _ = writeln!(out, "   골드: {}G", format_gold(gold as i64));
    let _ = writeln!(out, "   검:   [+{level}] {}", profile.sword_name);

    if let Some(price) = data.sword_price(level) {
        let _ = writeln!(
            out,
            "\n💰 예상 판매가: {}G ~ {}G (평균 {}G)",
            format_gold(price.min_price as i64),
            format_gold(price.max_price as i64),
            format_gold(price.avg_price as i64)
        );
    }

    let _ = writeln!(out, "\n📈 강화 확률표");
    for rate in data
        .enhance_rates()
        .iter()
        .filter(|r| r.level >= level && r.level < 15)
    {
        let _ = writeln!(
            out,
            "   +{:<2} → +{:<2}  성공 {:>5.1}%  유지 {:>5.1}%  파괴 {:>5.1}%",
            rate.level,
            rate.level + 1,
            rate.success_rate,
            rate.keep_rate,
            rate.destroy_rate
        );
    }

    let targets = milestones(level);
    if !targets.is_empty() {
        let _ = writeln!(out, "\n🎯 목표 도달 확률 (연속 성공 기준)");
        for target in targets {
            let _ = writeln!(
                out,
                "   +{target:<2}: {:>6.2}%  (예상 {:.1}회 시도)",
                data.success_chance(level, target),
                data.expected_trials(level, target)
            );
        }
    }

    let bet = (gold / 10).max(100);
    let _ = writeln!(out, "\n⚔️ 역배 기대값 (판돈 {}G 기준)", format_gold(bet as i64));
    for diff in 1..=3u8 {
        if let Some((ev, win_rate, avg_reward)) = data.upset_expected_value(diff, bet) {
            let _ = writeln!(
                out,
                "   +{diff} 차이: 승률 {win_rate:.0}%  평균 보상 {}G  기대값 {}G",
                format_gold(avg_reward as i64),
                format_gold(ev.round() as i64)
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;

    #[test]
    fn milestones_skip_reached_and_duplicate_levels() {
        assert_eq!(milestones(7), vec![8, 9, 10, 12, 15]);
        assert_eq!(milestones(14), vec![15, 16, 17]);
        assert_eq!(milestones(19), vec![20]);
        assert!(milestones(20).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn report_covers_profile_odds_and_upsets() {
        let h = Harness::new("@A");
        h.profile(7, "청룡검", 35_000);
        let mut ctx = h.context(0);
        ctx.stop.start();

        let report = inspect(&mut ctx).await;
        assert!(report.contains("@A"));
        assert!(report.contains("[+7] 청룡검"));
        assert!(report.contains("35,000G"));
        assert!(report.contains("+7  → +8"));
        assert!(report.contains("+10:"));
        assert!(report.contains("판돈 3,500G"));
        assert!(report.contains("+3 차이"));
    }
}
