use std::io::Write;
use std::sync::Mutex;

/// Status display shown while a mode runs.
pub trait Overlay: Send + Sync {
    fn show_status(&self, status: &str);
    fn hide_all(&self);
    /// Gives a windowed overlay a chance to process its events during long
    /// waits.
    fn pump(&self) {}
}

/// Renders the status on a single rewritten terminal line.
#[derive(Default)]
pub struct StatusLine {
    last: Mutex<String>,
}

impl StatusLine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Overlay for StatusLine {
    fn show_status(&self, status: &str) {
        let Ok(mut last) = self.last.lock() else {
            return;
        };
        if *last == status {
            return;
        }
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "\r\x1b[2K{status}");
        let _ = out.flush();
        *last = status.to_string();
    }

    fn hide_all(&self) {
        let Ok(mut last) = self.last.lock() else {
            return;
        };
        if !last.is_empty() {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "\r\x1b[2K");
            let _ = out.flush();
            last.clear();
        }
    }
}

/// Used when no status display is wanted.
pub struct NoOverlay;

impl Overlay for NoOverlay {
    fn show_status(&self, _status: &str) {}
    fn hide_all(&self) {}
}
