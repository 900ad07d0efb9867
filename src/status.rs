//! Optional status-display sink.

use std::cell::RefCell;

pub trait StatusSink {
    /// Best effort; an empty string clears the display.
    fn set_status_text(&self, text: &str);
}

/// Keeps the latest message for status queries and echoes changes to the log.
#[derive(Debug, Default)]
pub struct DisplayStatus {
    message: RefCell<String>,
}

impl DisplayStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(&self) -> String {
        self.message.borrow().clone()
    }
}

impl StatusSink for DisplayStatus {
    fn set_status_text(&self, text: &str) {
        let mut message = self.message.borrow_mut();
        if *message != text {
            if !text.is_empty() {
                tracing::info!("Display: {}", text);
            }
            *message = text.to_string();
        }
    }
}
