//! System clipboard backed by `arboard`

use tracing::{debug, warn};

use crate::core::host::Clipboard;

/// Clipboard of the desktop session. Without one (headless, no display) it
/// silently holds nothing.
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        let inner = match arboard::Clipboard::new() {
            Ok(clipboard) => Some(clipboard),
            Err(e) => {
                warn!(error = %e, "System clipboard unavailable");
                None
            }
        };
        Self { inner }
    }
}

impl Default for SystemClipboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Clipboard for SystemClipboard {
    fn write(&mut self, text: &str) {
        let Some(clipboard) = self.inner.as_mut() else {
            return;
        };
        match clipboard.set_text(text.to_string()) {
            Ok(()) => debug!(len = text.len(), "Copied selection"),
            Err(e) => warn!(error = %e, "Failed to copy selection"),
        }
    }

    fn read(&mut self) -> Option<String> {
        let clipboard = self.inner.as_mut()?;
        match clipboard.get_text() {
            Ok(text) => Some(text),
            Err(e) => {
                debug!(error = %e, "Nothing to paste");
                None
            }
        }
    }
}
