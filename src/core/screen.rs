//! Terminal screen capability
//!
//! The controller drives a screen through [`TerminalScreen`] and never parses
//! escape sequences itself. Screens queue the events they produce; the
//! controller drains them with [`TerminalScreen::take_events`] once the call
//! that produced them has returned.

use thiserror::Error;

use super::geometry::{Geometry, ViewportSize};

#[derive(Error, Debug)]
pub enum ScreenError {
    #[error("Invalid screen size: {0}")]
    InvalidGeometry(Geometry),

    #[error("Screen has been destroyed")]
    Destroyed,

    #[error("Failed to create screen: {0}")]
    Create(String),
}

pub type Result<T> = std::result::Result<T, ScreenError>;

/// Events a screen reports upstream
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenEvent {
    /// Bytes the emulation wants to send to the child (terminal replies)
    Data(String),
    /// A title escape sequence was seen
    Title(String),
    /// A non-empty selection was completed
    Selection(String),
    Focus,
    Blur,
    /// The local input stream ended
    End,
}

/// Options a screen is created with
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenOptions {
    /// Palette overrides, as CSS-style color strings
    pub colors: Vec<String>,
    pub cursor_blink: bool,
    /// Lines of scrollback kept above the visible grid
    pub scrollback: usize,
    pub font_family: String,
    /// Font size in points, `None` for the host default
    pub font_size: Option<f32>,
}

impl Default for ScreenOptions {
    fn default() -> Self {
        Self {
            colors: Vec::new(),
            cursor_blink: false,
            scrollback: 1000,
            font_family: "monospace".to_string(),
            font_size: None,
        }
    }
}

/// Pointer input in grid coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Press { row: u16, col: u16 },
    Drag { row: u16, col: u16 },
    Release { row: u16, col: u16 },
}

/// Scrollback navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scroll {
    /// Positive moves towards newer output
    Lines(i32),
    Pages(i32),
    Top,
    Bottom,
}

/// Input-affecting modes the child has switched on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputModes {
    pub application_cursor: bool,
    pub bracketed_paste: bool,
    pub mouse_tracking: bool,
}

/// Rendered view of the visible grid
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenSnapshot {
    /// One entry per visible row, with SGR formatting
    pub rows: Vec<Vec<u8>>,
    /// Cursor (row, col)
    pub cursor: (u16, u16),
    pub cursor_visible: bool,
}

/// A terminal screen: grid, parser and renderer state
pub trait TerminalScreen {
    /// Feed decoded text into the emulation
    fn write(&mut self, text: &str);

    /// Current grid size
    fn geometry(&self) -> Geometry;

    /// Resize the grid
    fn resize(&mut self, geometry: Geometry) -> Result<()>;

    /// Best-fit grid for `viewport`. Does not resize.
    fn fit(&self, viewport: ViewportSize) -> Geometry;

    /// Take input focus
    fn focus(&mut self);

    /// Give up input focus
    fn blur(&mut self);

    /// Pointer input; selections are reported as [`ScreenEvent::Selection`]
    fn pointer(&mut self, event: PointerEvent);

    /// Move the scrollback viewport
    fn scroll(&mut self, scroll: Scroll);

    fn input_modes(&self) -> InputModes;

    fn snapshot(&self) -> ScreenSnapshot;

    /// Drain queued events, oldest first
    fn take_events(&mut self) -> Vec<ScreenEvent>;

    /// Release the screen. Called exactly once.
    fn destroy(&mut self);
}

/// Creates screens for new sessions
pub trait ScreenFactory {
    fn create(&self, options: &ScreenOptions) -> Result<Box<dyn TerminalScreen>>;
}
