// Reads the visible chat transcript through select-all + copy.
use std::sync::Arc;
use std::time::Duration;

use crate::errors::AgentResult;
use crate::executor::coordinator::ChatLayout;
use crate::executor::input::InputDriver;
use crate::executor::text_input::Clipboard;

pub struct ChatReader {
    input: Arc<dyn InputDriver>,
    clipboard: Arc<dyn Clipboard>,
    layout: ChatLayout,
    last_logged: String,
}

impl ChatReader {
    pub fn new(input: Arc<dyn InputDriver>, clipboard: Arc<dyn Clipboard>, layout: ChatLayout) -> Self {
        Self {
            input,
            clipboard,
            layout,
            last_logged: String::new(),
        }
    }

    async fn capture(&self) -> AgentResult<String> {
        let (cx, cy) = self.layout.chat;
        let (ix, iy) = self.layout.input;
        self.input.click(cx, cy)?;
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.input.select_all()?;
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.input.copy_selection()?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let text = self.clipboard.read();
        // Focus goes back to the input field even when the read failed.
        self.input.click(ix, iy)?;
        tokio::time::sleep(Duration::from_millis(20)).await;
        text
    }

    /// Current transcript, or an empty string when the read failed.
    pub async fn read_raw(&mut self) -> String {
        match self.capture().await {
            Ok(text) => {
                self.log_change(&text);
                text
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat read failed");
                String::new()
            }
        }
    }

    fn log_change(&mut self, text: &str) {
        if text == self.last_logged {
            return;
        }
        let common = text
            .char_indices()
            .zip(self.last_logged.chars())
            .take_while(|((_, a), b)| a == b)
            .last()
            .map(|((i, c), _)| i + c.len_utf8())
            .unwrap_or(0);
        tracing::debug!(added = %text[common..].trim(), "chat changed");
        self.last_logged = text.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeMessenger, InputEvent};

    #[tokio::test(start_paused = true)]
    async fn read_restores_focus_to_input() {
        let fake = Arc::new(FakeMessenger::new());
        fake.inject("@bot 안녕하세요");
        let mut reader = ChatReader::new(fake.clone(), fake.clone(), ChatLayout::new(100, 500, 40));
        let text = reader.read_raw().await;
        assert_eq!(text, "@bot 안녕하세요");
        let events = fake.events();
        assert_eq!(events.first(), Some(&InputEvent::Click(100, 460)));
        assert_eq!(events.last(), Some(&InputEvent::Click(100, 500)));
    }

    #[tokio::test(start_paused = true)]
    async fn clipboard_failure_reads_as_empty() {
        let fake = Arc::new(FakeMessenger::new());
        fake.inject("line");
        fake.fail_clipboard(true);
        let mut reader = ChatReader::new(fake.clone(), fake.clone(), ChatLayout::new(100, 500, 40));
        assert_eq!(reader.read_raw().await, "");
    }
}
