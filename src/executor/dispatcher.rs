// Slash-command dispatch into the messenger input field.
use std::sync::Arc;
use std::time::Duration;

use crate::errors::AgentResult;
use crate::executor::coordinator::ChatLayout;
use crate::executor::input::InputDriver;
use crate::executor::text_input::{type_text, Clipboard};

/// Pauses between input events. The messenger drops keystrokes that land
/// before it has repainted.
#[derive(Debug, Clone)]
pub struct StepDelays {
    pub after_focus: Duration,
    pub after_clear: Duration,
    pub after_paste: Duration,
    pub between_submits: Duration,
    pub after_submit: Duration,
}

impl Default for StepDelays {
    fn default() -> Self {
        Self {
            after_focus: Duration::from_millis(30),
            after_clear: Duration::from_millis(60),
            after_paste: Duration::from_millis(150),
            between_submits: Duration::from_millis(200),
            after_submit: Duration::from_millis(50),
        }
    }
}

pub struct Dispatcher {
    input: Arc<dyn InputDriver>,
    clipboard: Arc<dyn Clipboard>,
    layout: ChatLayout,
    delays: StepDelays,
}

impl Dispatcher {
    pub fn new(input: Arc<dyn InputDriver>, clipboard: Arc<dyn Clipboard>, layout: ChatLayout) -> Self {
        Self {
            input,
            clipboard,
            layout,
            delays: StepDelays::default(),
        }
    }

    pub fn with_delays(mut self, delays: StepDelays) -> Self {
        self.delays = delays;
        self
    }

    pub fn layout(&self) -> ChatLayout {
        self.layout
    }

    async fn focus_and_type(&self, text: &str) -> AgentResult<()> {
        let (x, y) = self.layout.input;
        self.input.click(x, y)?;
        tokio::time::sleep(self.delays.after_focus).await;
        self.input.clear_input()?;
        tokio::time::sleep(self.delays.after_clear).await;
        type_text(self.input.as_ref(), self.clipboard.as_ref(), text)?;
        tokio::time::sleep(self.delays.after_paste).await;
        Ok(())
    }

    async fn submit_twice(&self) -> AgentResult<()> {
        self.input.press_enter()?;
        tokio::time::sleep(self.delays.between_submits).await;
        self.input.press_enter()?;
        tokio::time::sleep(self.delays.after_submit).await;
        Ok(())
    }

    /// Focus, clear, paste and submit one command.
    pub async fn send(&self, cmd: &str) -> AgentResult<()> {
        tracing::info!(cmd, "sending command");
        self.focus_and_type(cmd).await?;
        self.submit_twice().await
    }

    /// Types `cmd` and presses enter once. The messenger keeps it in the
    /// input field as the first line of a multi-line message.
    pub async fn send_once(&self, cmd: &str) -> AgentResult<()> {
        tracing::info!(cmd, "staging command");
        self.focus_and_type(cmd).await?;
        self.input.press_enter()?;
        tokio::time::sleep(self.delays.after_submit).await;
        Ok(())
    }

    /// Appends to whatever is already in the input field, then submits.
    pub async fn append_and_send(&self, text: &str) -> AgentResult<()> {
        tracing::info!(text, "appending and sending");
        type_text(self.input.as_ref(), self.clipboard.as_ref(), text)?;
        tokio::time::sleep(self.delays.after_paste).await;
        self.submit_twice().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeMessenger, InputEvent};

    fn dispatcher(fake: &Arc<FakeMessenger>) -> Dispatcher {
        Dispatcher::new(fake.clone(), fake.clone(), ChatLayout::new(100, 500, 40))
    }

    #[tokio::test(start_paused = true)]
    async fn send_focuses_clears_pastes_and_submits() {
        let fake = Arc::new(FakeMessenger::new());
        dispatcher(&fake).send("/강화").await.unwrap();
        assert_eq!(
            fake.events(),
            vec![
                InputEvent::Click(100, 500),
                InputEvent::Clear,
                InputEvent::Paste("/강화".into()),
                InputEvent::Enter,
                InputEvent::Enter,
            ]
        );
        assert_eq!(fake.submitted(), vec!["/강화".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn battle_command_is_sent_as_two_lines() {
        let fake = Arc::new(FakeMessenger::new());
        let d = dispatcher(&fake);
        d.send_once("/배틀").await.unwrap();
        assert!(fake.submitted().is_empty());
        d.append_and_send("@rival").await.unwrap();
        assert_eq!(fake.submitted(), vec!["/배틀\n@rival".to_string()]);
    }
}
