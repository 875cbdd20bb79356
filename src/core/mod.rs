//! Core session components.
//!
//! - **session**: the controller that owns a screen and a child process
//! - **screen** / **process** / **host**: capabilities the controller drives
//! - **vt_screen**: `vt100`-backed screen
//! - **pty**: native PTY process host
//! - **event**, **geometry**, **title**, **utf8**: shared building blocks
//!
//! # Architecture
//!
//! ```text
//! SessionController
//! ├── TerminalScreen (VtScreen: grid, replies, title, selection)
//! ├── ProcessLink
//! │   └── ProcessHandle (PtyProcess: reader + writer threads)
//! ├── EventBus (typed subscriptions)
//! └── host collaborators (viewport, clipboard, project paths)
//! ```

pub mod event;
pub mod geometry;
pub mod host;
pub mod process;
pub mod pty;
pub mod screen;
pub mod session;
pub mod title;
pub mod utf8;
pub mod vt_screen;
