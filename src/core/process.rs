//! Child process capability
//!
//! A process host spawns a shell attached to a pseudo-terminal and talks to it
//! over a message channel. Payloads on that channel are base64 so arbitrary
//! bytes survive the trip in both directions.

use std::io;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::geometry::Geometry;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to open PTY: {0}")]
    PtyOpen(String),

    #[error("Failed to spawn {shell}: {message}")]
    Spawn { shell: String, message: String },

    #[error("Failed to write to PTY: {0}")]
    Write(#[source] io::Error),

    #[error("Failed to resize PTY: {0}")]
    Resize(String),

    #[error("Process channel closed")]
    ChannelClosed,

    #[error("Invalid payload encoding: {0}")]
    Decode(#[from] base64::DecodeError),
}

pub type Result<T> = std::result::Result<T, ProcessError>;

/// Instructions sent to the process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ProcessMessage {
    /// Base64 encoded bytes for the child's input
    Input { text: String },
    Resize { cols: u16, rows: u16 },
}

impl ProcessMessage {
    pub fn input(bytes: &[u8]) -> Self {
        ProcessMessage::Input {
            text: STANDARD.encode(bytes),
        }
    }

    pub fn resize(geometry: Geometry) -> Self {
        ProcessMessage::Resize {
            cols: geometry.cols,
            rows: geometry.rows,
        }
    }
}

/// Decode the payload of an [`ProcessMessage::Input`]
pub fn decode_input(text: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(text)?)
}

/// One read's worth of child output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    /// Base64 encoded bytes
    pub data: String,
}

impl OutputChunk {
    pub fn encode(bytes: &[u8]) -> Self {
        Self {
            data: STANDARD.encode(bytes),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        Ok(STANDARD.decode(&self.data)?)
    }
}

/// Events reported by a running process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output(OutputChunk),
    /// Child exited, with its exit code when known
    Exit(Option<u32>),
}

/// Everything needed to start a session's child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub cwd: PathBuf,
    /// Shell to run instead of the platform default
    pub shell: Option<String>,
    pub geometry: Geometry,
    pub args: Vec<String>,
}

/// A running child
pub trait ProcessHandle {
    /// Queue a message for the child. Does not block.
    fn send(&mut self, message: ProcessMessage) -> Result<()>;

    /// Next pending event, if any
    fn try_recv(&mut self) -> Option<ProcessEvent>;

    /// Kill the child. No grace period; pending output is dropped.
    fn terminate(&mut self);
}

/// Spawns children attached to pseudo-terminals
pub trait ProcessHost {
    fn spawn(&self, request: &SpawnRequest) -> Result<Box<dyn ProcessHandle>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_message_wire_format() {
        let message = ProcessMessage::input(b"ls\n");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json, serde_json::json!({"event": "input", "text": "bHMK"}));
    }

    #[test]
    fn test_resize_message_wire_format() {
        let message = ProcessMessage::resize(Geometry::new(132, 43));
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(json, r#"{"event":"resize","cols":132,"rows":43}"#);

        let back: ProcessMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn test_input_is_binary_safe() {
        let bytes = [0x00, 0x1b, 0xff, 0xfe, b'\r', 0x80];
        let ProcessMessage::Input { text } = ProcessMessage::input(&bytes) else {
            panic!("expected input message");
        };
        assert_eq!(decode_input(&text).unwrap(), bytes);
    }

    #[test]
    fn test_output_chunk_decode() {
        let chunk = OutputChunk::encode("ok\n".as_bytes());
        assert_eq!(chunk.decode().unwrap(), b"ok\n");

        let broken = OutputChunk {
            data: "not base64!".to_string(),
        };
        assert!(matches!(broken.decode(), Err(ProcessError::Decode(_))));
    }
}
