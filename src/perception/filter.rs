//! Separates the agent's own bot replies from other participants' chatter.
//!
//! A line naming our handle opens a self block. A line with any other `@`
//! mention opens a foreign block. Every other line belongs to the block above
//! it. Text before the first mention counts as ours.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Author {
    Me,
    Other,
}

/// Attributes every line of `text` to a block.
pub fn classify<'a>(text: &'a str, my_handle: &str) -> Vec<(&'a str, Author)> {
    let mut state = Author::Me;
    text.lines()
        .map(|line| {
            if my_handle.is_empty() || line.contains(my_handle) {
                state = Author::Me;
            } else if line.contains('@') {
                state = Author::Other;
            }
            (line, state)
        })
        .collect()
}

/// Drops every line that belongs to another participant's block.
pub fn filter_self(text: &str, my_handle: &str) -> String {
    if my_handle.is_empty() {
        return text.to_string();
    }
    classify(text, my_handle)
        .into_iter()
        .filter(|(_, author)| *author == Author::Me)
        .map(|(line, _)| line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Index of the first line of `current` that was not already visible in
/// `baseline`. The chat window scrolls, so the longest suffix of the
/// baseline that is also a prefix of `current` marks the overlap.
pub fn fresh_start(baseline: &[&str], current: &[&str]) -> usize {
    if baseline.is_empty() {
        return 0;
    }
    for skip in 0..baseline.len() {
        let tail = &baseline[skip..];
        if tail.len() <= current.len() && current[..tail.len()] == *tail {
            return tail.len();
        }
    }
    0
}

/// Strips leading `[speaker] [time]` groups the messenger prepends when
/// copying the transcript.
pub fn strip_speaker_prefix(line: &str) -> &str {
    let mut rest = line.trim_start();
    while let Some(stripped) = rest.strip_prefix('[') {
        match stripped.find(']') {
            Some(end) => rest = stripped[end + 1..].trim_start(),
            None => break,
        }
    }
    rest.trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOISY: &str = "\
@me 『청룡검』 +7 강화 성공
남은 골드 10,000G
@other1 @bot 강화
결과 +5 유지
@bot @me +6 강화 성공
축하합니다";

    #[test]
    fn foreign_block_is_removed_whole() {
        let out = filter_self(NOISY, "@me");
        assert!(out.contains("+7 강화 성공"));
        assert!(out.contains("남은 골드"));
        assert!(out.contains("+6 강화 성공"));
        assert!(out.contains("축하합니다"));
        assert!(!out.contains("+5 유지"));
        assert!(!out.contains("@other1"));
    }

    #[test]
    fn multi_line_self_section_survives_appended_hold() {
        let text = "@me +8 강화 성공\n+8 강화 유지";
        assert_eq!(filter_self(text, "@me"), text);
    }

    #[test]
    fn filtering_is_idempotent() {
        let samples = [
            NOISY,
            "",
            "no mentions at all\nsecond line",
            "@x hi\n@me yo\n@y hey\nplain\n@me again",
            "@a\n@b\n@c",
        ];
        for handle in ["@me", "@nobody", ""] {
            for text in samples {
                let once = filter_self(text, handle);
                assert_eq!(filter_self(&once, handle), once, "handle {handle:?} text {text:?}");
            }
        }
    }

    #[test]
    fn text_without_my_handle_keeps_no_foreign_headers() {
        let text = "preamble\n@x 안녕\n+3 강화 성공\n@y 뭐해";
        let out = filter_self(text, "@me");
        assert_eq!(out, "preamble");
        assert!(out.lines().all(|l| !l.contains('@')));
    }

    #[test]
    fn empty_handle_keeps_everything() {
        assert_eq!(filter_self(NOISY, ""), NOISY);
    }

    #[test]
    fn fresh_start_handles_scrolling() {
        let base = ["a", "b", "c"];
        assert_eq!(fresh_start(&base, &["a", "b", "c", "d"]), 3);
        assert_eq!(fresh_start(&base, &["b", "c", "d", "e"]), 2);
        assert_eq!(fresh_start(&base, &["c", "d"]), 1);
        assert_eq!(fresh_start(&base, &["x", "y"]), 0);
        assert_eq!(fresh_start(&[], &["x"]), 0);
    }

    #[test]
    fn speaker_prefix_is_stripped() {
        assert_eq!(strip_speaker_prefix("[me] [오후 3:21] /강화"), "/강화");
        assert_eq!(strip_speaker_prefix("/판매 "), "/판매");
        assert_eq!(strip_speaker_prefix("[broken /강화"), "[broken /강화");
    }
}
