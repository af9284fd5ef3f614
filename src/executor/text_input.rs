// Hangul commands cannot be typed key-by-key reliably, so all text goes
// through the clipboard and a paste chord.
use crate::errors::{AgentError, AgentResult};
use crate::executor::input::InputDriver;

/// Process-global clipboard. Only the chat reader reads it and only the
/// dispatcher writes it.
pub trait Clipboard: Send + Sync {
    fn read(&self) -> AgentResult<String>;
    fn write(&self, text: &str) -> AgentResult<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn read(&self) -> AgentResult<String> {
        let mut board = arboard::Clipboard::new().map_err(|e| AgentError::Clipboard(e.to_string()))?;
        board.get_text().map_err(|e| AgentError::Clipboard(e.to_string()))
    }

    fn write(&self, text: &str) -> AgentResult<()> {
        let mut board = arboard::Clipboard::new().map_err(|e| AgentError::Clipboard(e.to_string()))?;
        board
            .set_text(text.to_owned())
            .map_err(|e| AgentError::Clipboard(e.to_string()))
    }
}

/// Returns true if the text contains Hangul or CJK ideographs.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| {
        ('\u{ac00}'..='\u{d7a3}').contains(&c)
            || ('\u{1100}'..='\u{11ff}').contains(&c)
            || ('\u{3130}'..='\u{318f}').contains(&c)
            || ('\u{4e00}'..='\u{9fff}').contains(&c)
    })
}

/// Places `text` on the clipboard and pastes it into the focused field.
pub fn type_text(input: &dyn InputDriver, clipboard: &dyn Clipboard, text: &str) -> AgentResult<()> {
    clipboard.write(text)?;
    input.paste()?;
    tracing::trace!(chars = text.chars().count(), cjk = contains_cjk(text), "text pasted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hangul_is_detected() {
        assert!(contains_cjk("/강화"));
        assert!(contains_cjk("『청룡검』"));
        assert!(!contains_cjk("@user 123"));
    }
}
