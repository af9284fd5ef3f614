// Physical input synthesis for the messenger window.
use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use crate::errors::{AgentError, AgentResult};

/// Mouse and keyboard primitives the core needs. Implementations are
/// synchronous; callers own the pauses between steps.
pub trait InputDriver: Send + Sync {
    fn click(&self, x: i32, y: i32) -> AgentResult<()>;
    fn select_all(&self) -> AgentResult<()>;
    fn copy_selection(&self) -> AgentResult<()>;
    fn paste(&self) -> AgentResult<()>;
    /// Empties the focused text field.
    fn clear_input(&self) -> AgentResult<()>;
    fn press_enter(&self) -> AgentResult<()>;
    fn cursor_position(&self) -> AgentResult<(i32, i32)>;
}

/// Desktop backend. A fresh `Enigo` is created per operation so the driver
/// stays `Send + Sync` on every platform.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnigoInput;

#[cfg(target_os = "macos")]
const MODIFIER: Key = Key::Meta;
#[cfg(not(target_os = "macos"))]
const MODIFIER: Key = Key::Control;

fn connect() -> AgentResult<Enigo> {
    Enigo::new(&Settings::default()).map_err(|e| AgentError::Input(e.to_string()))
}

fn input_err(e: enigo::InputError) -> AgentError {
    AgentError::Input(e.to_string())
}

fn chord(letter: char) -> AgentResult<()> {
    let mut enigo = connect()?;
    enigo.key(MODIFIER, Direction::Press).map_err(input_err)?;
    let pressed = enigo.key(Key::Unicode(letter), Direction::Click);
    enigo.key(MODIFIER, Direction::Release).map_err(input_err)?;
    pressed.map_err(input_err)
}

impl InputDriver for EnigoInput {
    fn click(&self, x: i32, y: i32) -> AgentResult<()> {
        let mut enigo = connect()?;
        enigo.move_mouse(x, y, Coordinate::Abs).map_err(input_err)?;
        enigo.button(Button::Left, Direction::Click).map_err(input_err)
    }

    fn select_all(&self) -> AgentResult<()> {
        chord('a')
    }

    fn copy_selection(&self) -> AgentResult<()> {
        chord('c')
    }

    fn paste(&self) -> AgentResult<()> {
        chord('v')
    }

    fn clear_input(&self) -> AgentResult<()> {
        chord('a')?;
        let mut enigo = connect()?;
        enigo.key(Key::Backspace, Direction::Click).map_err(input_err)
    }

    fn press_enter(&self) -> AgentResult<()> {
        let mut enigo = connect()?;
        enigo.key(Key::Return, Direction::Click).map_err(input_err)
    }

    fn cursor_position(&self) -> AgentResult<(i32, i32)> {
        connect()?.location().map_err(input_err)
    }
}
