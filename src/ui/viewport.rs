//! Viewport backed by the host terminal's size

use crossterm::terminal;
use tracing::debug;

use crate::core::geometry::ViewportSize;
use crate::core::host::ViewportAdapter;

/// The host terminal minus the rows reserved above the screen.
///
/// Sizes are in cells, so it pairs with a unit cell size.
pub struct TerminalViewport {
    reserved_rows: u16,
}

impl TerminalViewport {
    pub fn new(reserved_rows: u16) -> Self {
        Self { reserved_rows }
    }
}

impl ViewportAdapter for TerminalViewport {
    fn size(&self) -> Option<ViewportSize> {
        match terminal::size() {
            Ok((cols, rows)) => available(cols, rows, self.reserved_rows),
            Err(e) => {
                debug!(error = %e, "Terminal size unavailable");
                None
            }
        }
    }
}

fn available(cols: u16, rows: u16, reserved_rows: u16) -> Option<ViewportSize> {
    let rows = rows.checked_sub(reserved_rows).filter(|rows| *rows > 0)?;
    if cols == 0 {
        return None;
    }
    Some(ViewportSize::new(f64::from(cols), f64::from(rows)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_rows_are_subtracted() {
        assert_eq!(available(80, 25, 1), Some(ViewportSize::new(80.0, 24.0)));
        assert_eq!(available(80, 25, 0), Some(ViewportSize::new(80.0, 25.0)));
    }

    #[test]
    fn test_too_small_terminal_has_no_size() {
        assert_eq!(available(80, 1, 1), None);
        assert_eq!(available(0, 10, 0), None);
    }
}
