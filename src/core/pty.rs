//! Native pseudo-terminal process host
//!
//! Spawns the shell on a PTY via `portable-pty`. Each child is served by two
//! threads: a reader that turns PTY output into [`ProcessEvent`]s and a writer
//! that applies [`ProcessMessage`]s. The session side only touches channels,
//! so nothing it calls blocks.

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tracing::{debug, info, warn};

use super::geometry::Geometry;
use super::process::{
    decode_input, OutputChunk, ProcessError, ProcessEvent, ProcessHandle, ProcessHost,
    ProcessMessage, Result, SpawnRequest,
};

/// Bytes per PTY read
const READ_BUFFER_SIZE: usize = 4096;
/// How long the reader waits for an exit status after EOF
const EXIT_STATUS_ATTEMPTS: u32 = 50;
const EXIT_STATUS_INTERVAL: Duration = Duration::from_millis(10);

type SharedChild = Arc<Mutex<Box<dyn Child + Send + Sync>>>;

/// Shell used when no override is configured
pub fn default_shell() -> String {
    #[cfg(windows)]
    {
        std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string())
    }
    #[cfg(not(windows))]
    {
        std::env::var("SHELL")
            .ok()
            .filter(|shell| !shell.is_empty())
            .unwrap_or_else(|| "/bin/sh".to_string())
    }
}

fn pty_size(geometry: Geometry) -> PtySize {
    PtySize {
        rows: geometry.rows,
        cols: geometry.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Process host backed by the platform's native PTY
#[derive(Debug, Clone, Copy, Default)]
pub struct PtyProcessHost;

impl PtyProcessHost {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessHost for PtyProcessHost {
    fn spawn(&self, request: &SpawnRequest) -> Result<Box<dyn ProcessHandle>> {
        let shell = request
            .shell
            .clone()
            .filter(|shell| !shell.trim().is_empty())
            .unwrap_or_else(default_shell);

        let pair = native_pty_system()
            .openpty(pty_size(request.geometry))
            .map_err(|e| ProcessError::PtyOpen(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&shell);
        cmd.args(&request.args);
        cmd.cwd(&request.cwd);
        cmd.env("TERM", "xterm-256color");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| ProcessError::Spawn {
                shell: shell.clone(),
                message: e.to_string(),
            })?;
        // The child holds its own copy of the slave; keeping ours would stop
        // the master from ever seeing EOF.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| ProcessError::PtyOpen(format!("clone_reader: {}", e)))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| ProcessError::PtyOpen(format!("take_writer: {}", e)))?;

        info!(
            shell = %shell,
            cwd = %request.cwd.display(),
            cols = request.geometry.cols,
            rows = request.geometry.rows,
            "Spawned shell"
        );

        let process = PtyProcess::start(pair.master, child, reader, writer)?;
        Ok(Box::new(process))
    }
}

enum Command {
    Message(ProcessMessage),
    Terminate,
}

/// A shell running on a PTY
pub struct PtyProcess {
    commands: Sender<Command>,
    events: Receiver<ProcessEvent>,
    /// Cleared once the child's output reaches EOF or it is terminated
    running: Arc<AtomicBool>,
}

impl PtyProcess {
    fn start(
        master: Box<dyn MasterPty + Send>,
        child: Box<dyn Child + Send + Sync>,
        reader: Box<dyn Read + Send>,
        writer: Box<dyn Write + Send>,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let child: SharedChild = Arc::new(Mutex::new(child));
        let (event_tx, event_rx) = mpsc::channel();
        let (command_tx, command_rx) = mpsc::channel();

        {
            let running = running.clone();
            let child = child.clone();
            thread::Builder::new()
                .name("pty-reader".to_string())
                .spawn(move || read_loop(reader, event_tx, running, child))
                .map_err(|e| ProcessError::PtyOpen(format!("reader thread: {}", e)))?;
        }

        thread::Builder::new()
            .name("pty-writer".to_string())
            .spawn(move || write_loop(master, writer, command_rx, child))
            .map_err(|e| ProcessError::PtyOpen(format!("writer thread: {}", e)))?;

        Ok(Self {
            commands: command_tx,
            events: event_rx,
            running,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl ProcessHandle for PtyProcess {
    fn send(&mut self, message: ProcessMessage) -> Result<()> {
        if !self.is_running() {
            return Err(ProcessError::ChannelClosed);
        }
        self.commands
            .send(Command::Message(message))
            .map_err(|_| ProcessError::ChannelClosed)
    }

    fn try_recv(&mut self) -> Option<ProcessEvent> {
        self.events.try_recv().ok()
    }

    fn terminate(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // The writer may already be gone if the child exited first
        let _ = self.commands.send(Command::Terminate);
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        if self.is_running() {
            self.terminate();
        }
    }
}

fn read_loop(
    mut reader: Box<dyn Read + Send>,
    events: Sender<ProcessEvent>,
    running: Arc<AtomicBool>,
    child: SharedChild,
) {
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => {
                debug!("PTY reached EOF");
                break;
            }
            Ok(n) => {
                if events
                    .send(ProcessEvent::Output(OutputChunk::encode(&buffer[..n])))
                    .is_err()
                {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                // EIO is how Linux reports a closed slave
                debug!(error = %e, "PTY read ended");
                break;
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    let code = exit_code(&child);
    debug!(?code, "Shell exited");
    let _ = events.send(ProcessEvent::Exit(code));
}

fn exit_code(child: &SharedChild) -> Option<u32> {
    for _ in 0..EXIT_STATUS_ATTEMPTS {
        let status = match child.lock() {
            Ok(mut child) => child.try_wait().ok().flatten(),
            Err(_) => return None,
        };
        if let Some(status) = status {
            return Some(status.exit_code());
        }
        thread::sleep(EXIT_STATUS_INTERVAL);
    }
    None
}

fn write_loop(
    master: Box<dyn MasterPty + Send>,
    mut writer: Box<dyn Write + Send>,
    commands: Receiver<Command>,
    child: SharedChild,
) {
    for command in commands {
        match command {
            Command::Message(ProcessMessage::Input { text }) => {
                let bytes = match decode_input(&text) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(error = %e, "Dropping undecodable input");
                        continue;
                    }
                };
                if let Err(e) = writer.write_all(&bytes).and_then(|_| writer.flush()) {
                    warn!(error = %ProcessError::Write(e), "PTY input lost");
                }
            }
            Command::Message(ProcessMessage::Resize { cols, rows }) => {
                if let Err(e) = master.resize(pty_size(Geometry::new(cols, rows))) {
                    warn!(error = %ProcessError::Resize(e.to_string()), cols, rows, "PTY resize failed");
                }
            }
            Command::Terminate => break,
        }
    }

    if let Ok(mut child) = child.lock() {
        // Fails harmlessly when the child already exited
        let _ = child.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_default_shell_is_not_empty() {
        assert!(!default_shell().is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn test_spawn_runs_command_and_reports_exit() {
        let dir = tempfile::tempdir().unwrap();
        let request = SpawnRequest {
            cwd: dir.path().to_path_buf(),
            shell: Some("/bin/sh".to_string()),
            geometry: Geometry::new(80, 24),
            args: vec!["-c".to_string(), "printf termview-ok".to_string()],
        };
        let mut process = PtyProcessHost::new().spawn(&request).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut output = Vec::new();
        let mut exit = None;
        while Instant::now() < deadline && exit.is_none() {
            match process.try_recv() {
                Some(ProcessEvent::Output(chunk)) => output.extend(chunk.decode().unwrap()),
                Some(ProcessEvent::Exit(code)) => exit = Some(code),
                None => thread::sleep(Duration::from_millis(10)),
            }
        }

        assert!(String::from_utf8_lossy(&output).contains("termview-ok"));
        assert_eq!(exit, Some(Some(0)));
        assert!(matches!(
            process.send(ProcessMessage::input(b"late")),
            Err(ProcessError::ChannelClosed)
        ));
    }
}
