//! termview - one terminal session inside your terminal
//!
//! Runs a shell on a pseudo-terminal and draws it below a title bar. The
//! title follows the shell's title escape sequences, or a template from the
//! config file.
//!
//! # Quick Start
//!
//! ```text
//! termview                       # default shell in the current directory
//! termview -s /bin/zsh -a "-l"   # login zsh
//! termview -r "git status"       # submit a command once the shell is up
//! termview --local               # no shell, keystrokes echo locally
//! ```
//!
//! # Keybindings
//!
//! | Key | Action |
//! |-----|--------|
//! | Ctrl+Shift+V | Paste |
//! | Shift+PageUp/PageDown | Scroll a page |
//! | Shift+Up/Down | Scroll a line |
//! | Shift+Home/End | Scroll to top/bottom |
//! | Ctrl+Shift+Q | Close the session |
//!
//! Dragging with the left button copies the selection, unless the running
//! program has turned on mouse tracking.

use std::cell::Cell;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyEventKind, MouseButton, MouseEvent, MouseEventKind};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use termview::config::Config;
use termview::core::geometry::CellSize;
use termview::core::host::StaticProjects;
use termview::core::pty::PtyProcessHost;
use termview::core::screen::{PointerEvent, Scroll};
use termview::core::session::{Collaborators, SessionController, SessionState};
use termview::core::vt_screen::VtScreenFactory;
use termview::ui::{Frame, KeyAction, KeyMapper, Renderer, SystemClipboard, TerminalViewport};

const LOG_FILE: &str = "termview.log";
const LOG_ENV: &str = "TERMVIEW_LOG";
const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Lines moved per mouse wheel notch
const WHEEL_LINES: i32 = 3;

#[derive(Parser, Debug)]
#[command(name = "termview", version, about = "A terminal session in your terminal")]
struct Args {
    /// Shell to run instead of the default
    #[arg(short, long)]
    shell: Option<String>,

    /// Arguments for the shell, whitespace separated
    #[arg(short, long, allow_hyphen_values = true)]
    args: Option<String>,

    /// Command submitted once the shell starts
    #[arg(short, long)]
    run: Option<String>,

    /// Echo keystrokes locally instead of running a shell
    #[arg(long)]
    local: bool,

    /// Title template, e.g. "{{ bashName }}@{{ hostName }}"
    #[arg(long)]
    title: Option<String>,

    /// Working directory for the shell
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Config file to use instead of ~/.termview/config.toml
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load(),
        };

        let session = &mut config.session;
        if let Some(shell) = &self.shell {
            session.shell_override = Some(shell.clone());
        }
        if let Some(args) = &self.args {
            session.shell_arguments = args.clone();
        }
        if let Some(run) = &self.run {
            session.run_command = Some(run.clone());
        }
        if let Some(title) = &self.title {
            session.title_template = title.clone();
        }
        if self.local {
            session.fork_pty = false;
        }
        Ok(config)
    }

    fn project(&self) -> Option<PathBuf> {
        self.cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
    }
}

fn init_logging() {
    let log_path = Config::config_dir()
        .map(|dir| dir.join(LOG_FILE))
        .unwrap_or_else(|| PathBuf::from(LOG_FILE));
    if let Some(parent) = log_path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    // Raw mode owns the terminal, so logs only go to the file
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) else {
        return;
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();
    info!("termview {} starting", env!("CARGO_PKG_VERSION"));

    let config = args.load_config().context("Failed to load configuration")?;
    let show_title = config.title_bar.visible;
    let title_rows = Renderer::title_rows(show_title);

    let session = SessionController::new(
        config.session.clone(),
        Collaborators {
            screens: Box::new(VtScreenFactory::new(CellSize::unit())),
            processes: Box::new(PtyProcessHost::new()),
            viewport: Box::new(TerminalViewport::new(title_rows)),
            clipboard: Box::new(SystemClipboard::new()),
            projects: Box::new(StaticProjects(args.project().into_iter().collect())),
        },
    );

    let exit_code = Rc::new(Cell::new(None));
    {
        let exit_code = exit_code.clone();
        session.on_exit(move |code| exit_code.set(Some(code)));
    }

    let mut renderer = Renderer::new(config.title_bar.colors());
    renderer.init().context("Failed to set up the terminal")?;

    let result = session
        .attach()
        .context("Failed to start the session")
        .and_then(|()| run(&session, &mut renderer, show_title, title_rows));

    session.destroy();
    renderer.cleanup().context("Failed to restore the terminal")?;

    if let Err(e) = &result {
        error!(error = %e, "termview stopped");
    }
    if let Some(Some(code)) = exit_code.get() {
        info!(code, "Shell exited");
        if code != 0 {
            eprintln!("[process exited with code {}]", code);
        }
    }
    result
}

fn run(
    session: &SessionController,
    renderer: &mut Renderer,
    show_title: bool,
    title_rows: u16,
) -> Result<()> {
    loop {
        session.pump();
        if session.state() == SessionState::Destroyed {
            return Ok(());
        }

        renderer.render(Frame {
            title: show_title.then(|| session.get_title()),
            snapshot: session.snapshot(),
        })?;

        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        match event::read()? {
            Event::Key(key) if key.kind != KeyEventKind::Release => {
                match KeyMapper::action(&key, session.input_modes()) {
                    Some(KeyAction::Input(bytes)) => session.input(bytes),
                    Some(KeyAction::Paste) => session.paste(),
                    Some(KeyAction::Scroll(scroll)) => session.scroll(scroll),
                    Some(KeyAction::Quit) => session.destroy(),
                    None => {}
                }
            }
            Event::Paste(text) => session.input(text),
            Event::Resize(..) => {
                renderer.invalidate();
                session.resize_to_fit();
            }
            Event::FocusGained => session.focus(),
            Event::FocusLost => session.blur(),
            Event::Mouse(mouse) => handle_mouse(session, mouse, title_rows),
            _ => {}
        }
    }
}

fn handle_mouse(session: &SessionController, mouse: MouseEvent, title_rows: u16) {
    let Some(row) = mouse.row.checked_sub(title_rows) else {
        return;
    };
    let col = mouse.column;

    let pointer = match mouse.kind {
        MouseEventKind::ScrollUp => return session.scroll(Scroll::Lines(-WHEEL_LINES)),
        MouseEventKind::ScrollDown => return session.scroll(Scroll::Lines(WHEEL_LINES)),
        MouseEventKind::Down(MouseButton::Left) => PointerEvent::Press { row, col },
        MouseEventKind::Drag(MouseButton::Left) => PointerEvent::Drag { row, col },
        MouseEventKind::Up(MouseButton::Left) => PointerEvent::Release { row, col },
        _ => return,
    };
    session.pointer(pointer);
}
