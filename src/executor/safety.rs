// Stop triggers the user can fire while the agent owns mouse and keyboard.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::AgentResult;
use crate::executor::input::InputDriver;

/// Polled by the control loop. `poll_stop` consumes a pending press.
pub trait Hotkey: Send + Sync {
    fn start(&self) -> AgentResult<()>;
    fn poll_stop(&self) -> bool;
}

/// Ctrl+C in the console window. The signal is latched into a flag by a
/// background task and consumed on the next poll.
#[derive(Default)]
pub struct CtrlCHotkey {
    pressed: Arc<AtomicBool>,
    started: AtomicBool,
}

impl CtrlCHotkey {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Hotkey for CtrlCHotkey {
    fn start(&self) -> AgentResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let pressed = self.pressed.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "ctrl-c listener unavailable");
                    break;
                }
                tracing::info!("stop hotkey pressed");
                pressed.store(true, Ordering::SeqCst);
            }
        });
        Ok(())
    }

    fn poll_stop(&self) -> bool {
        self.pressed.swap(false, Ordering::SeqCst)
    }
}

/// Moving the cursor into the top-left corner of the primary screen stops
/// the agent, even when the console is not focused.
pub struct FailsafeCorner {
    input: Arc<dyn InputDriver>,
    margin: i32,
}

impl FailsafeCorner {
    pub fn new(input: Arc<dyn InputDriver>) -> Self {
        Self { input, margin: 5 }
    }
}

impl Hotkey for FailsafeCorner {
    fn start(&self) -> AgentResult<()> {
        Ok(())
    }

    fn poll_stop(&self) -> bool {
        match self.input.cursor_position() {
            Ok((x, y)) if x <= self.margin && y <= self.margin => {
                tracing::warn!(x, y, "failsafe corner reached");
                true
            }
            _ => false,
        }
    }
}

/// Fires when any inner trigger fires. Every trigger is polled so that
/// stale presses are consumed together.
pub struct AnyHotkey(pub Vec<Arc<dyn Hotkey>>);

impl Hotkey for AnyHotkey {
    fn start(&self) -> AgentResult<()> {
        for hotkey in &self.0 {
            hotkey.start()?;
        }
        Ok(())
    }

    fn poll_stop(&self) -> bool {
        self.0.iter().fold(false, |fired, h| h.poll_stop() || fired)
    }
}
