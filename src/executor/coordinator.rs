// Maps the configured input-field position to the points the agent clicks.
use crate::config::CoordsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatLayout {
    /// Message input field.
    pub input: (i32, i32),
    /// A point inside the chat transcript, above the input field.
    pub chat: (i32, i32),
}

impl ChatLayout {
    pub fn from_coords(coords: &CoordsConfig) -> Self {
        Self::new(coords.click_x, coords.click_y, coords.chat_offset_y)
    }

    pub fn new(x: i32, y: i32, chat_offset_y: i32) -> Self {
        Self {
            input: (x, y),
            chat: (x, (y - chat_offset_y).max(0)),
        }
    }

    /// Both points unset means the user never captured a position.
    pub fn is_configured(&self) -> bool {
        self.input != (0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_point_sits_above_input() {
        let layout = ChatLayout::new(640, 900, 40);
        assert_eq!(layout.input, (640, 900));
        assert_eq!(layout.chat, (640, 860));
        assert!(layout.is_configured());
    }

    #[test]
    fn offset_never_leaves_screen() {
        assert_eq!(ChatLayout::new(10, 20, 40).chat, (10, 0));
        assert!(!ChatLayout::from_coords(&CoordsConfig::default()).is_configured());
    }
}
