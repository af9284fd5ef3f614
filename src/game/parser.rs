//! Rule-based extraction of game facts from bot replies.
//!
//! Every function here is pure: it takes chat text and returns a structured
//! record or `None`. Values outside the accepted ranges (level `0..=20`,
//! gold `0..=10^9`) are rejected rather than clamped.

use std::sync::OnceLock;

use regex::Regex;

use crate::game::types::{
    BattleResult, EnhanceOutcome, GameState, GoldShortage, ItemType, Profile, RankingEntry,
    SaleResult, MAX_GOLD, MAX_LEVEL,
};

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        fn $name() -> &'static Regex {
            static CELL: OnceLock<Regex> = OnceLock::new();
            CELL.get_or_init(|| Regex::new($re).expect("static pattern must compile"))
        }
    };
}

pattern!(level_re, r"\+(\d+)");
pattern!(gold_re, r"(?i)(\d[\d,]*)\s*(?:골드|gold|g)");
pattern!(success_re, r"(?:강화.*성공|레벨.*상승|업그레이드)");
pattern!(hold_re, r"(?:강화.*유지|레벨.*유지|실패.*유지)");
pattern!(destroy_re, r"(?:파괴|부서|사라)");
pattern!(hidden_re, r"(?i)(?:히든|hidden)");
pattern!(special_re, r"(?i)(?:레전더리|legendary|전설|유니크|unique)");
pattern!(trash_re, r"(?:일반|노말|커먼|쓰레기|낡은|녹슨|부러진)");
pattern!(farm_re, r"(?:획득|얻|드랍|뽑)");
pattern!(bracket_name_re, r"『([^』]+)』");
pattern!(farm_name_re, r"([^\s『』]+)\s*(?:획득|얻|드랍|뽑)");
pattern!(profile_form_re, r"\[\+?(\d+)\]\s*([^\n]+)");

pattern!(profile_name_re, r"이름:\s*(@\S+)");
pattern!(profile_wins_re, r"(\d+)승");
pattern!(profile_losses_re, r"(\d+)패");
pattern!(profile_gold_re, r"보유\s*골드:\s*(\d[\d,]*)\s*G");
pattern!(profile_sword_re, r"보유\s*검:\s*\[\+?(\d+)\]\s*([^\n]+)");

pattern!(ranking_level_re, r"(\d+)위:\s*(@\S+)?\s*\(\[?\+(\d+)\]?");
pattern!(ranking_battle_re, r"(\d+)위:\s*(@\S+)?\s*\((\d+)승\s*(\d+)패\)");

pattern!(battle_winner_re, r"결과.*?(@\S+).*승리");
pattern!(battle_gold_re, r"전리품\s*(\d[\d,]*)\s*G");
pattern!(battle_vs_re, r"(@\S+)\s*『\[([^\]]+)\]");

pattern!(required_gold_re, r"(?:필요|비용)[^\d\n]*(\d[\d,]*)\s*(?:G|골드)");
pattern!(current_gold_re, r"(?:남은|보유|현재)\s*골드[^\d\n]*(\d[\d,]*)");
pattern!(cannot_sell_re, r"(?:판매할\s*수\s*없|가치가\s*없|팔\s*수\s*없)");
pattern!(
    zero_level_re,
    r"(?:0강[^\n]*배틀[^\n]*(?:없|불가)|배틀[^\n]*0강[^\n]*(?:없|불가)|\+0[^\n]*배틀[^\n]*(?:없|불가))"
);
pattern!(
    daily_limit_re,
    r"(?:오늘\s*(?:의\s*)?배틀\s*횟수|일일\s*배틀\s*(?:횟수|제한)|배틀\s*횟수[^\n]*(?:초과|모두|소진))"
);
pattern!(sale_gold_re, r"판매[^\d\n]*(\d[\d,]*)\s*(?:G|골드)");
pattern!(earned_gold_re, r"(\d[\d,]*)\s*(?:G|골드)\s*(?:을|를)?\s*(?:획득|받|벌)");
pattern!(new_sword_re, r"새로운\s*검[^『\n]*『([^』]+)』");
pattern!(granted_sword_re, r"『([^』]+)』\s*(?:을|를)?\s*(?:획득|지급|받)");
pattern!(leading_level_re, r"^\s*\+(\d+)");

/// Parses a level digit string, rejecting anything outside `0..=20`.
fn accept_level(digits: &str) -> Option<u8> {
    let value: u32 = digits.parse().ok()?;
    (value <= MAX_LEVEL as u32).then_some(value as u8)
}

/// Parses a gold amount with thousands separators, rejecting values above 10^9.
fn accept_gold(digits: &str) -> Option<u64> {
    let cleaned: String = digits.chars().filter(|c| *c != ',').collect();
    let value: u64 = cleaned.parse().ok()?;
    (value <= MAX_GOLD).then_some(value)
}

/// All `+N` level tokens in `text`, skipping gold deltas such as "+2,400G".
fn level_tokens(text: &str) -> impl Iterator<Item = u8> + '_ {
    level_re().captures_iter(text).filter_map(move |caps| {
        let whole = caps.get(0)?;
        let next = text[whole.end()..].chars().next();
        if matches!(next, Some(',') | Some('G') | Some('g') | Some('골')) {
            return None;
        }
        accept_level(&caps[1])
    })
}

/// First valid `+N` level in the text.
pub fn extract_level(text: &str) -> Option<u8> {
    level_tokens(text).next()
}

/// First valid gold amount in the text.
pub fn extract_gold(text: &str) -> Option<u64> {
    gold_re()
        .captures_iter(text)
        .find_map(|caps| accept_gold(&caps[1]))
}

/// Gold balance announced after a transaction ("남은 골드: 12,300G").
pub fn extract_current_gold(text: &str) -> Option<u64> {
    current_gold_re()
        .captures_iter(text)
        .filter_map(|caps| accept_gold(&caps[1]))
        .last()
}

fn line_result(line: &str) -> Option<EnhanceOutcome> {
    if destroy_re().is_match(line) {
        Some(EnhanceOutcome::Destroy)
    } else if success_re().is_match(line) {
        Some(EnhanceOutcome::Success)
    } else if hold_re().is_match(line) {
        Some(EnhanceOutcome::Hold)
    } else {
        None
    }
}

/// Enhancement result of the last line that carries one.
pub fn detect_enhance_result(text: &str) -> Option<EnhanceOutcome> {
    text.lines().filter_map(line_result).last()
}

fn clean_name(raw: &str) -> Option<String> {
    let mut name = raw.trim();
    if name.starts_with('[') {
        if let Some(end) = name.find(']') {
            name = name[end + 1..].trim();
        }
    }
    let name = name
        .trim_end_matches(|c: char| c == '을' || c == '를')
        .trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Item name: bracketed token first, then the word before a farming verb,
/// then the `[+N] name` profile form.
pub fn extract_item_name(text: &str) -> Option<String> {
    if let Some(caps) = bracket_name_re().captures(text) {
        if let Some(name) = clean_name(&caps[1]) {
            return Some(name);
        }
    }
    if let Some(caps) = farm_name_re().captures(text) {
        if let Some(name) = clean_name(&caps[1]) {
            return Some(name);
        }
    }
    profile_form_re()
        .captures(text)
        .and_then(|caps| clean_name(&caps[2]))
}

/// Classifies an item by name alone.
pub fn determine_item_type(name: &str) -> ItemType {
    if hidden_re().is_match(name) {
        ItemType::Hidden
    } else if special_re().is_match(name) {
        ItemType::Special
    } else if trash_re().is_match(name) {
        ItemType::Trash
    } else {
        ItemType::Unknown
    }
}

/// Generic parse of an enhancement / farming response.
pub fn parse(text: &str) -> GameState {
    let mut state = GameState {
        level: extract_level(text),
        gold: extract_gold(text),
        ..GameState::default()
    };

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(result) = line_result(line) {
            state.last_result = Some(result);
            state.result_level = level_tokens(line).last();
        }
    }

    state.item_name = extract_item_name(text);
    state.item_type = match state.item_name.as_deref().map(determine_item_type) {
        Some(t) if t != ItemType::Unknown => t,
        _ if farm_re().is_match(text) => ItemType::Normal,
        _ => ItemType::None,
    };
    state
}

pub fn parse_profile(text: &str) -> Option<Profile> {
    let mut profile = Profile::default();

    if let Some(caps) = profile_name_re().captures_iter(text).last() {
        profile.name = caps[1].to_string();
    }
    if let Some(caps) = profile_wins_re().captures(text) {
        profile.wins = caps[1].parse().unwrap_or(0);
    }
    if let Some(caps) = profile_losses_re().captures(text) {
        profile.losses = caps[1].parse().unwrap_or(0);
    }
    if let Some(caps) = profile_gold_re().captures(text) {
        profile.gold = accept_gold(&caps[1]);
    }
    if let Some(caps) = profile_sword_re().captures(text) {
        profile.level = accept_level(&caps[1]);
        profile.sword_name = caps[2].trim().to_string();
    }
    if profile.level.is_none() {
        profile.level = extract_level(text);
    }

    if profile.name.is_empty() && profile.level.is_none() {
        return None;
    }
    Some(profile)
}

/// Parses only the profile block that belongs to `username`, ignoring other
/// profiles printed in the same window.
pub fn parse_profile_for_user(text: &str, username: &str) -> Option<Profile> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines
        .iter()
        .rposition(|l| l.contains("이름:") && l.contains(username))?;
    let end = lines[start + 1..]
        .iter()
        .position(|l| l.contains("이름:"))
        .map(|offset| start + 1 + offset)
        .unwrap_or(lines.len());
    let section = lines[start..end].join("\n");
    parse_profile(&section).filter(|p| p.name == username)
}

pub fn parse_ranking(text: &str) -> Vec<RankingEntry> {
    let mut entries = Vec::new();
    for line in text.lines() {
        if let Some(caps) = ranking_level_re().captures(line) {
            let level = accept_level(&caps[3]);
            if level.is_some_and(|l| l > 0) {
                entries.push(RankingEntry {
                    rank: caps[1].parse().unwrap_or(0),
                    username: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
                    level,
                    ..RankingEntry::default()
                });
            }
            continue;
        }
        if let Some(caps) = ranking_battle_re().captures(line) {
            entries.push(RankingEntry {
                rank: caps[1].parse().unwrap_or(0),
                username: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
                level: None,
                wins: caps[3].parse().unwrap_or(0),
                losses: caps[4].parse().unwrap_or(0),
            });
        }
    }
    entries
}

/// Result of the latest battle `my_handle` fought. The text is split into
/// blocks at each `vs` line; blocks of other pairs are skipped. A block
/// without a `vs` line counts only when we are the named winner.
pub fn parse_battle_result(text: &str, my_handle: &str) -> Option<BattleResult> {
    if my_handle.is_empty() {
        return None;
    }
    let mut blocks: Vec<Vec<&str>> = vec![Vec::new()];
    for line in text.lines() {
        if battle_vs_re().captures_iter(line).count() >= 2 {
            blocks.push(Vec::new());
        }
        if let Some(block) = blocks.last_mut() {
            block.push(line);
        }
    }
    blocks
        .iter()
        .rev()
        .find_map(|block| battle_in_block(&block.join("\n"), my_handle))
}

fn battle_in_block(block: &str, my_handle: &str) -> Option<BattleResult> {
    let caps = battle_winner_re().captures(block)?;
    let winner = caps[1].to_string();
    let sides: Vec<(String, Option<u8>)> = battle_vs_re()
        .captures_iter(block)
        .take(2)
        .map(|c| (c[1].to_string(), extract_level(&c[2]).or_else(|| accept_level(c[2].trim()))))
        .collect();
    let involved = if sides.is_empty() {
        winner == my_handle
    } else {
        sides.iter().any(|(user, _)| user == my_handle)
    };
    if !involved {
        return None;
    }

    let mut result = BattleResult {
        won: winner == my_handle,
        winner,
        ..BattleResult::default()
    };
    if let Some(caps) = battle_gold_re().captures(block) {
        result.gold_earned = accept_gold(&caps[1]).unwrap_or(0);
    }
    if let [(user1, level1), (user2, level2)] = sides.as_slice() {
        if result.winner == *user1 {
            result.winner_level = *level1;
            result.loser = user2.clone();
            result.loser_level = *level2;
        } else if result.winner == *user2 {
            result.winner_level = *level2;
            result.loser = user1.clone();
            result.loser_level = *level1;
        }
    }
    Some(result)
}

/// `Some` when the bot refused an action for lack of gold.
pub fn detect_insufficient_gold(text: &str) -> Option<GoldShortage> {
    if !text.contains("부족") {
        return None;
    }
    let required = required_gold_re()
        .captures(text)
        .and_then(|caps| accept_gold(&caps[1]))?;
    let remaining = extract_current_gold(text).unwrap_or(0);
    Some(GoldShortage { required, remaining })
}

pub fn detect_cannot_sell(text: &str) -> bool {
    cannot_sell_re().is_match(text)
}

pub fn detect_battle_zero_level(text: &str) -> bool {
    zero_level_re().is_match(text)
}

pub fn detect_battle_daily_limit(text: &str) -> bool {
    daily_limit_re().is_match(text)
}

/// Reads a sale (or destroy) announcement. `None` when neither a sale amount
/// nor a replacement sword is present.
pub fn extract_sale_result(text: &str) -> Option<SaleResult> {
    let sale_gold = sale_gold_re()
        .captures(text)
        .or_else(|| earned_gold_re().captures(text))
        .and_then(|caps| accept_gold(&caps[1]));

    let sword = new_sword_re()
        .captures(text)
        .or_else(|| granted_sword_re().captures(text));
    let (new_sword_name, new_sword_level) = match sword {
        Some(caps) => {
            let whole = caps.get(0).map(|m| m.end()).unwrap_or(0);
            let inner = caps.get(1).map(|m| m.end() + '』'.len_utf8()).unwrap_or(whole);
            let level = leading_level_re()
                .captures(&text[inner.min(text.len())..])
                .and_then(|c| accept_level(&c[1]))
                .unwrap_or(0);
            (clean_name(&caps[1]), level)
        }
        None => (None, 0),
    };

    if sale_gold.is_none() && new_sword_name.is_none() {
        return None;
    }
    Some(SaleResult {
        sale_gold,
        current_gold: extract_current_gold(text),
        new_sword_name,
        new_sword_level,
    })
}

/// Opponents one to `level_diff` levels above `my_level`, excluding entries
/// without a handle.
pub fn find_targets_in_ranking(
    entries: &[RankingEntry],
    my_level: u8,
    level_diff: u8,
) -> Vec<RankingEntry> {
    let min = my_level.saturating_add(1);
    let max = my_level.saturating_add(level_diff);
    entries
        .iter()
        .filter(|e| !e.username.is_empty())
        .filter(|e| e.level.is_some_and(|l| l >= min && l <= max))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_line_yields_level_and_name() {
        let state = parse("@A 『청룡검』 +8 강화 성공");
        assert_eq!(state.last_result, Some(EnhanceOutcome::Success));
        assert_eq!(state.result_level, Some(8));
        assert_eq!(state.level, Some(8));
        assert_eq!(state.item_name.as_deref(), Some("청룡검"));
    }

    #[test]
    fn hold_with_failure_wording() {
        let state = parse("강화 실패 유지 +10");
        assert_eq!(state.last_result, Some(EnhanceOutcome::Hold));
        assert_eq!(state.result_level, Some(10));
    }

    #[test]
    fn destroy_wins_over_other_words_on_its_line() {
        let state = parse("『청룡검』 파괴 … 새로운 검 『낡은 검』 획득");
        assert_eq!(state.last_result, Some(EnhanceOutcome::Destroy));
    }

    #[test]
    fn last_result_line_wins() {
        let text = "+9 강화 성공\n강화 실패 유지 +9";
        assert_eq!(detect_enhance_result(text), Some(EnhanceOutcome::Hold));
        assert_eq!(parse(text).last_result, Some(EnhanceOutcome::Hold));
    }

    #[test]
    fn out_of_range_level_is_rejected() {
        assert_eq!(extract_level("+21 강화 성공"), None);
        assert_eq!(extract_level("+99 then +7"), Some(7));
        let state = parse("+25 강화 성공");
        assert_eq!(state.result_level, None);
    }

    #[test]
    fn gold_delta_is_not_a_level() {
        assert_eq!(extract_level("+2,400G 획득"), None);
        assert_eq!(extract_level("+500G 보너스 +3 강화"), Some(3));
    }

    #[test]
    fn gold_respects_upper_bound() {
        assert_eq!(extract_gold("보유 12,300G"), Some(12_300));
        assert_eq!(extract_gold("1,000,000,001G"), None);
        assert_eq!(extract_gold("2400 골드"), Some(2400));
    }

    #[test]
    fn item_type_from_name() {
        assert_eq!(determine_item_type("히든 엑스칼리버"), ItemType::Hidden);
        assert_eq!(determine_item_type("전설의 검"), ItemType::Special);
        assert_eq!(determine_item_type("녹슨 검"), ItemType::Trash);
        assert_eq!(determine_item_type("청룡검"), ItemType::Unknown);
    }

    #[test]
    fn farming_verb_marks_normal_item() {
        let state = parse("청룡검 획득!");
        assert_eq!(state.item_name.as_deref(), Some("청룡검"));
        assert_eq!(state.item_type, ItemType::Normal);
        assert_eq!(parse("아무 일도 없음").item_type, ItemType::None);
    }

    #[test]
    fn profile_block() {
        let text = "● 이름: @A\n● 전적: 12승 5패\n● 보유 골드: 35,000 G\n● 보유 검: [+7] 청룡검";
        let profile = parse_profile(text).unwrap();
        assert_eq!(profile.name, "@A");
        assert_eq!(profile.wins, 12);
        assert_eq!(profile.losses, 5);
        assert_eq!(profile.gold, Some(35_000));
        assert_eq!(profile.level, Some(7));
        assert_eq!(profile.sword_name, "청룡검");
    }

    #[test]
    fn profile_for_user_skips_other_sections() {
        let text = "이름: @me\n보유 검: [+3] 목검\n이름: @rival\n3승 1패\n보유 검: [+6] 화염검\n이름: @third\n보유 검: [+9] 얼음검";
        let profile = parse_profile_for_user(text, "@rival").unwrap();
        assert_eq!(profile.level, Some(6));
        assert_eq!(profile.sword_name, "화염검");
        assert!(parse_profile_for_user(text, "@nobody").is_none());
    }

    #[test]
    fn ranking_both_forms() {
        let text = "1위: @top ([+15] 신검)\n2위: @second ([+9] 화염검)\n1위: @champ (2255승 838패)";
        let entries = parse_ranking(text);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].level, Some(15));
        assert_eq!(entries[1].username, "@second");
        assert_eq!(entries[2].level, None);
        assert_eq!(entries[2].wins, 2255);
    }

    #[test]
    fn targets_within_level_window() {
        let entries = vec![
            RankingEntry { username: "@a".into(), level: Some(8), ..Default::default() },
            RankingEntry { username: "@b".into(), level: Some(9), ..Default::default() },
            RankingEntry { username: "@c".into(), level: Some(11), ..Default::default() },
            RankingEntry { username: String::new(), level: Some(9), ..Default::default() },
        ];
        let targets = find_targets_in_ranking(&entries, 7, 2);
        let names: Vec<_> = targets.iter().map(|t| t.username.as_str()).collect();
        assert_eq!(names, vec!["@a", "@b"]);
    }

    #[test]
    fn battle_result_for_either_side() {
        let text = "@me 『[+7] 청룡검』 vs @rival 『[+9] 화염검』\n결과: @me 승리! 전리품 3,200 G";
        let won = parse_battle_result(text, "@me").unwrap();
        assert!(won.won);
        assert_eq!(won.gold_earned, 3200);
        assert_eq!(won.winner_level, Some(7));
        assert_eq!(won.loser, "@rival");
        assert_eq!(won.loser_level, Some(9));

        let lost = parse_battle_result(text, "@rival").unwrap();
        assert!(!lost.won);
        assert!(parse_battle_result("배틀 대기 중", "@me").is_none());
    }

    #[test]
    fn other_pairs_results_are_skipped() {
        let foreign = "@x 『[+3] 목검』 vs @y 『[+5] 단검』\n결과: @x 승리! 전리품 900 G";
        assert!(parse_battle_result(foreign, "@me").is_none());

        let mixed = format!("{foreign}\n@me 『[+7] 청룡검』 vs @rival 『[+9] 화염검』\n결과: @rival 승리! 전리품 1,500 G");
        let ours = parse_battle_result(&mixed, "@me").unwrap();
        assert!(!ours.won);
        assert_eq!(ours.winner, "@rival");
        assert_eq!(ours.gold_earned, 1500);

        let ours_first = format!("@me 『[+7] 청룡검』 vs @rival 『[+9] 화염검』\n결과: @me 승리! 전리품 3,200 G\n{foreign}");
        let ours = parse_battle_result(&ours_first, "@me").unwrap();
        assert!(ours.won);
        assert_eq!(ours.gold_earned, 3200);
    }

    #[test]
    fn headless_result_counts_only_as_our_win() {
        assert!(parse_battle_result("결과: @me 승리! 전리품 500 G", "@me").unwrap().won);
        assert!(parse_battle_result("결과: @x 승리! 전리품 500 G", "@me").is_none());
        assert!(parse_battle_result("결과: @x 승리!", "").is_none());
    }

    #[test]
    fn insufficient_gold_report() {
        let shortage = detect_insufficient_gold("강화 비용 50,000G 부족 … 남은 골드 12,300G").unwrap();
        assert_eq!(shortage.required, 50_000);
        assert_eq!(shortage.remaining, 12_300);
        assert_eq!(shortage.shortage(), 37_700);
        assert!(detect_insufficient_gold("강화 비용 500G 남은 골드 9,000G").is_none());
    }

    #[test]
    fn signal_fragments() {
        assert!(detect_cannot_sell("0강 검은 판매할 수 없습니다"));
        assert!(detect_cannot_sell("가치가 없는 검입니다"));
        assert!(!detect_cannot_sell("판매 완료"));
        assert!(detect_battle_daily_limit("오늘 배틀 횟수를 모두 사용했습니다"));
        assert!(!detect_battle_daily_limit("배틀 시작"));
        assert!(detect_battle_zero_level("상대가 0강이라 배틀할 수 없습니다"));
        assert!(!detect_battle_zero_level("배틀 결과: @a 승리"));
    }

    #[test]
    fn sale_result_with_replacement() {
        let text = "검을 판매하여 2,400G 획득! 현재 골드: 15,000G\n새로운 검 『녹슨 검』 +0 지급";
        let sale = extract_sale_result(text).unwrap();
        assert_eq!(sale.sale_gold, Some(2400));
        assert_eq!(sale.current_gold, Some(15_000));
        assert_eq!(sale.new_sword_name.as_deref(), Some("녹슨 검"));
        assert_eq!(sale.new_sword_level, 0);
    }

    #[test]
    fn destroy_message_names_replacement() {
        let sale = extract_sale_result("『청룡검』 파괴 … 새로운 검 『낡은 검』 획득").unwrap();
        assert_eq!(sale.sale_gold, None);
        assert_eq!(sale.new_sword_name.as_deref(), Some("낡은 검"));
        assert!(extract_sale_result("강화 성공 +3").is_none());
    }
}
