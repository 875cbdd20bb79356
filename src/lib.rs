//! termview - a terminal session controller
//!
//! [`SessionController`] owns one pseudo-terminal session: it spawns the
//! shell, feeds its output into a terminal screen, forwards keystrokes, keeps
//! the grid sized to the host viewport and derives a title. Screens, process
//! hosts and host services are traits, so the controller runs against a
//! native PTY and a `vt100` screen as readily as against test doubles.

pub mod config;
pub mod core;
pub mod ui;

pub use crate::config::{Config, ConfigError, SessionConfig};
pub use crate::core::event::{EventKind, SessionEvent, Subscription};
pub use crate::core::geometry::{CellSize, Geometry, ViewportSize};
pub use crate::core::session::{
    Collaborators, SessionController, SessionError, SessionMode, SessionState, WeakSession,
};
