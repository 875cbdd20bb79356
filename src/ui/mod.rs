//! Host-terminal front end.
//!
//! - **renderer**: title bar and screen snapshot drawing
//! - **keymapper**: key events to VT byte sequences and host commands
//! - **clipboard**: system clipboard collaborator
//! - **viewport**: host terminal size as the session viewport

pub mod clipboard;
pub mod keymapper;
pub mod renderer;
pub mod viewport;

pub use clipboard::SystemClipboard;
pub use keymapper::{KeyAction, KeyMapper};
pub use renderer::{Frame, Renderer};
pub use viewport::TerminalViewport;
