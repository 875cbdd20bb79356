//! Session management
//!
//! A [`SessionController`] owns one terminal screen and, in forked mode, one
//! child process. It routes bytes between them, keeps their geometry in step
//! with the host viewport, derives the session title and reports everything
//! through typed subscriptions.
//!
//! The controller is single-threaded. It never holds an interior borrow while
//! calling a subscriber, so handlers may call back into `input`, `resize` or
//! `destroy`.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use super::event::{EventBus, EventKind, SessionEvent, Subscription};
use super::geometry::Geometry;
use super::host::{Clipboard, ProjectPathResolver, ViewportAdapter};
use super::process::{
    OutputChunk, ProcessError, ProcessEvent, ProcessHandle, ProcessHost, ProcessMessage,
    SpawnRequest,
};
use super::pty::default_shell;
use super::screen::{
    InputModes, PointerEvent, ScreenError, ScreenEvent, ScreenFactory, ScreenSnapshot, Scroll,
    TerminalScreen,
};
use super::title::{render_template, truncate_title, TitleVars};
use super::utf8::Utf8Decoder;
use crate::config::SessionConfig;

#[cfg(windows)]
const LINE_TERMINATOR: &str = "\r\n";
#[cfg(not(windows))]
const LINE_TERMINATOR: &str = "\n";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to create screen: {0}")]
    Screen(#[from] ScreenError),

    #[error("Failed to start shell: {0}")]
    Spawn(#[source] ProcessError),
}

/// Whether the session runs a child process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Keystrokes echo straight into the screen
    Local,
    Forked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Attached,
    /// Tearing down after the child exited or the host closed the session
    Exiting,
    Destroyed,
}

enum ProcessLink {
    Local,
    /// Forked session that has not spawned yet
    Pending,
    Forked(Box<dyn ProcessHandle>),
    /// Exited or terminated; never replaced
    Gone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    Focus,
}

/// Host-side collaborators a session is built with
pub struct Collaborators {
    pub screens: Box<dyn ScreenFactory>,
    pub processes: Box<dyn ProcessHost>,
    pub viewport: Box<dyn ViewportAdapter>,
    pub clipboard: Box<dyn Clipboard>,
    pub projects: Box<dyn ProjectPathResolver>,
}

struct Inner {
    config: SessionConfig,
    mode: SessionMode,
    state: Cell<SessionState>,
    screen: RefCell<Option<Box<dyn TerminalScreen>>>,
    link: RefCell<ProcessLink>,
    geometry: Cell<Geometry>,
    title_override: RefCell<Option<String>>,
    title_vars: RefCell<Option<TitleVars>>,
    decoder: RefCell<Utf8Decoder>,
    deferred: RefCell<VecDeque<Deferred>>,
    events: EventBus,
    screens: Box<dyn ScreenFactory>,
    processes: Box<dyn ProcessHost>,
    viewport: Box<dyn ViewportAdapter>,
    clipboard: RefCell<Box<dyn Clipboard>>,
    projects: Box<dyn ProjectPathResolver>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Only reached when the session was never torn down
        if let ProcessLink::Forked(handle) = self.link.get_mut() {
            handle.terminate();
        }
        if let Some(screen) = self.screen.get_mut() {
            screen.destroy();
        }
    }
}

/// A terminal session. Clones share the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Rc<Inner>,
}

/// Non-owning handle, for subscribers that call back into their session
#[derive(Clone)]
pub struct WeakSession {
    inner: Weak<Inner>,
}

impl WeakSession {
    pub fn upgrade(&self) -> Option<SessionController> {
        self.inner.upgrade().map(|inner| SessionController { inner })
    }
}

impl SessionController {
    pub fn new(config: SessionConfig, collaborators: Collaborators) -> Self {
        let mode = if config.fork_pty {
            SessionMode::Forked
        } else {
            SessionMode::Local
        };
        let link = match mode {
            SessionMode::Local => ProcessLink::Local,
            SessionMode::Forked => ProcessLink::Pending,
        };

        Self {
            inner: Rc::new(Inner {
                config,
                mode,
                state: Cell::new(SessionState::Uninitialized),
                screen: RefCell::new(None),
                link: RefCell::new(link),
                geometry: Cell::new(Geometry::default()),
                title_override: RefCell::new(None),
                title_vars: RefCell::new(None),
                decoder: RefCell::new(Utf8Decoder::new()),
                deferred: RefCell::new(VecDeque::new()),
                events: EventBus::new(),
                screens: collaborators.screens,
                processes: collaborators.processes,
                viewport: collaborators.viewport,
                clipboard: RefCell::new(collaborators.clipboard),
                projects: collaborators.projects,
            }),
        }
    }

    pub fn downgrade(&self) -> WeakSession {
        WeakSession {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.inner.mode
    }

    pub fn is_forked(&self) -> bool {
        self.inner.mode == SessionMode::Forked
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.get()
    }

    /// Last geometry applied to both screen and process
    pub fn geometry(&self) -> Geometry {
        self.inner.geometry.get()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    fn is_attached(&self) -> bool {
        self.state() == SessionState::Attached
    }

    fn has_process(&self) -> bool {
        matches!(*self.inner.link.borrow(), ProcessLink::Forked(_))
    }

    fn with_screen<R>(&self, f: impl FnOnce(&mut dyn TerminalScreen) -> R) -> Option<R> {
        let mut screen = self.inner.screen.borrow_mut();
        screen.as_mut().map(|screen| f(screen.as_mut()))
    }

    fn send(&self, message: ProcessMessage) -> Option<Result<(), ProcessError>> {
        match &mut *self.inner.link.borrow_mut() {
            ProcessLink::Forked(handle) => Some(handle.send(message)),
            _ => None,
        }
    }

    fn emit(&self, event: SessionEvent) {
        self.inner.events.emit(&event);
    }

    fn shell(&self) -> String {
        self.inner
            .config
            .shell()
            .map(str::to_string)
            .unwrap_or_else(default_shell)
    }

    /// First open project, else the home directory
    fn working_directory(&self) -> PathBuf {
        self.inner
            .projects
            .project_paths()
            .first()
            .map(|path| absolute(&expand_home(path)))
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Create the screen and, in forked mode, spawn the shell.
    ///
    /// Runs once; later calls are ignored. On failure the session is left
    /// destroyed.
    pub fn attach(&self) -> Result<(), SessionError> {
        if self.state() != SessionState::Uninitialized {
            debug!(state = ?self.state(), "Session already attached");
            return Ok(());
        }

        let config = &self.inner.config;
        let mut screen = match self.inner.screens.create(&config.screen_options()) {
            Ok(screen) => screen,
            Err(e) => {
                error!(error = %e, "Failed to create screen");
                self.inner.state.set(SessionState::Destroyed);
                self.inner.events.clear();
                return Err(e.into());
            }
        };

        if let Some(size) = self.inner.viewport.size() {
            let fitted = screen.fit(size);
            if fitted != screen.geometry() {
                if let Err(e) = screen.resize(fitted) {
                    warn!(error = %e, "Initial fit failed");
                }
            }
        }
        let geometry = screen.geometry();
        self.inner.geometry.set(geometry);
        *self.inner.screen.borrow_mut() = Some(screen);

        let shell = self.shell();
        *self.inner.title_vars.borrow_mut() = Some(TitleVars::capture(&shell));

        if self.inner.mode == SessionMode::Forked {
            let request = SpawnRequest {
                cwd: self.working_directory(),
                shell: config.shell().map(str::to_string),
                geometry,
                args: config.shell_args(),
            };
            match self.inner.processes.spawn(&request) {
                Ok(handle) => *self.inner.link.borrow_mut() = ProcessLink::Forked(handle),
                Err(e) => {
                    error!(error = %e, shell = %shell, "Failed to spawn shell");
                    *self.inner.link.borrow_mut() = ProcessLink::Gone;
                    if let Some(mut screen) = self.inner.screen.borrow_mut().take() {
                        screen.destroy();
                    }
                    self.inner.state.set(SessionState::Destroyed);
                    self.inner.events.clear();
                    return Err(SessionError::Spawn(e));
                }
            }
        }

        self.inner.state.set(SessionState::Attached);
        info!(mode = ?self.inner.mode, %geometry, shell = %shell, "Session attached");

        if let Some(command) = config.run_command() {
            self.input(format!("{}{}", command, LINE_TERMINATOR));
        }
        self.resize_to_fit();
        self.with_screen(|screen| screen.focus());
        self.dispatch_screen_events();
        Ok(())
    }

    /// Close the session: kill the child, release the screen, drop every
    /// subscription. Safe to call more than once.
    pub fn destroy(&self) {
        if self.state() == SessionState::Uninitialized {
            self.inner.state.set(SessionState::Destroyed);
            self.inner.events.clear();
            return;
        }
        self.teardown(None);
    }

    fn teardown(&self, code: Option<u32>) {
        if self.state() != SessionState::Attached {
            return;
        }
        self.inner.state.set(SessionState::Exiting);

        let link = std::mem::replace(&mut *self.inner.link.borrow_mut(), ProcessLink::Gone);
        if let ProcessLink::Forked(mut handle) = link {
            debug!("Terminating shell");
            handle.terminate();
        }

        let screen = self.inner.screen.borrow_mut().take();
        let had_screen = screen.is_some();
        if let Some(mut screen) = screen {
            screen.destroy();
        }
        self.inner.deferred.borrow_mut().clear();

        info!(?code, "Session closed");
        if had_screen {
            self.emit(SessionEvent::Exit(code));
        }
        self.inner.state.set(SessionState::Destroyed);
        self.inner.events.clear();
    }

    /// Send keyboard or paste input.
    ///
    /// Forked sessions forward the bytes to the child; local sessions write
    /// them into the screen.
    pub fn input(&self, data: impl AsRef<[u8]>) {
        if !self.is_attached() {
            return;
        }
        let bytes = data.as_ref();

        match self.inner.mode {
            SessionMode::Forked => match self.send(ProcessMessage::input(bytes)) {
                Some(Ok(())) => self.emit(SessionEvent::Stdin(bytes.to_vec())),
                Some(Err(e)) => warn!(error = %e, len = bytes.len(), "Input dropped"),
                None => trace!("No process for input"),
            },
            SessionMode::Local => {
                let text = String::from_utf8_lossy(bytes);
                self.with_screen(|screen| screen.write(&text));
            }
        }

        self.resize_to_fit();
        self.with_screen(|screen| screen.focus());
        self.dispatch_screen_events();
    }

    /// Paste the clipboard contents as input
    pub fn paste(&self) {
        if !self.is_attached() {
            return;
        }
        let text = self.inner.clipboard.borrow_mut().read();
        match text {
            Some(text) if !text.is_empty() => self.input(text),
            _ => trace!("Clipboard empty"),
        }
    }

    /// Refit to the viewport. Only forked sessions follow the viewport.
    pub fn resize_to_fit(&self) {
        if !self.is_attached() || !self.has_process() {
            return;
        }
        let Some(size) = self.inner.viewport.size() else {
            trace!("Viewport has no size yet");
            return;
        };
        let Some(fitted) = self.with_screen(|screen| screen.fit(size)) else {
            return;
        };
        self.resize(fitted.cols, fitted.rows);
    }

    /// Resize screen and process to `cols` x `rows`.
    ///
    /// Non-finite, non-positive and out-of-range sizes are ignored; fractions
    /// are truncated. Every accepted call emits a resize event, even when
    /// nothing changed. If the process cannot be resized the screen is put
    /// back to its previous size and nothing is emitted.
    pub fn resize(&self, cols: impl Into<f64>, rows: impl Into<f64>) {
        if !self.is_attached() {
            return;
        }
        let (cols, rows) = (cols.into(), rows.into());
        let Some(geometry) = Geometry::from_dimensions(cols, rows) else {
            debug!(cols, rows, "Ignoring invalid size");
            return;
        };

        let applied = self.with_screen(|screen| {
            let previous = screen.geometry();
            if previous == geometry {
                Ok(None)
            } else {
                screen.resize(geometry).map(|()| Some(previous))
            }
        });
        let previous = match applied {
            Some(Ok(previous)) => previous,
            Some(Err(e)) => {
                warn!(error = %e, %geometry, "Screen resize failed");
                return;
            }
            None => return,
        };

        if let Some(Err(e)) = self.send(ProcessMessage::resize(geometry)) {
            warn!(error = %e, %geometry, "Process resize failed");
            if let Some(previous) = previous {
                if let Some(Err(e)) = self.with_screen(|screen| screen.resize(previous)) {
                    warn!(error = %e, %previous, "Screen rollback failed");
                }
            }
            return;
        }

        self.inner.geometry.set(geometry);
        debug!(%geometry, "Session resized");
        self.emit(SessionEvent::Resize(geometry));
    }

    /// Refit, focus the screen, and focus it again on the next pump
    pub fn focus(&self) {
        if !self.is_attached() {
            return;
        }
        self.resize_to_fit();
        self.with_screen(|screen| screen.focus());
        {
            let mut deferred = self.inner.deferred.borrow_mut();
            if !deferred.contains(&Deferred::Focus) {
                deferred.push_back(Deferred::Focus);
            }
        }
        self.dispatch_screen_events();
    }

    pub fn blur(&self) {
        if !self.is_attached() {
            return;
        }
        self.with_screen(|screen| screen.blur());
        self.dispatch_screen_events();
    }

    pub fn scroll(&self, scroll: Scroll) {
        if !self.is_attached() {
            return;
        }
        self.with_screen(|screen| screen.scroll(scroll));
        self.dispatch_screen_events();
    }

    pub fn pointer(&self, event: PointerEvent) {
        if !self.is_attached() {
            return;
        }
        self.with_screen(|screen| screen.pointer(event));
        self.dispatch_screen_events();
    }

    pub fn snapshot(&self) -> Option<ScreenSnapshot> {
        self.inner
            .screen
            .borrow()
            .as_ref()
            .map(|screen| screen.snapshot())
    }

    pub fn input_modes(&self) -> InputModes {
        self.inner
            .screen
            .borrow()
            .as_ref()
            .map(|screen| screen.input_modes())
            .unwrap_or_default()
    }

    /// Run one turn of the session: deferred work, then every pending
    /// process event in arrival order, then queued screen events.
    ///
    /// Returns `true` when anything happened.
    pub fn pump(&self) -> bool {
        if !self.is_attached() {
            return false;
        }
        let mut active = false;

        let deferred: Vec<Deferred> = self.inner.deferred.borrow_mut().drain(..).collect();
        for task in deferred {
            active = true;
            match task {
                Deferred::Focus => {
                    self.with_screen(|screen| screen.focus());
                }
            }
        }

        while self.is_attached() {
            let event = match &mut *self.inner.link.borrow_mut() {
                ProcessLink::Forked(handle) => handle.try_recv(),
                _ => None,
            };
            let Some(event) = event else {
                break;
            };
            active = true;
            match event {
                ProcessEvent::Output(chunk) => self.handle_output(&chunk),
                ProcessEvent::Exit(code) => self.handle_exit(code),
            }
        }

        self.dispatch_screen_events() || active
    }

    fn handle_output(&self, chunk: &OutputChunk) {
        let bytes = match chunk.decode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable output");
                return;
            }
        };
        let text = self.inner.decoder.borrow_mut().decode(&bytes);
        if text.is_empty() {
            return;
        }

        self.with_screen(|screen| screen.write(&text));
        self.emit(SessionEvent::Stdout(text));
        self.dispatch_screen_events();
    }

    fn handle_exit(&self, code: Option<u32>) {
        info!(?code, "Shell exited");
        let tail = self.inner.decoder.borrow_mut().finish();
        if !tail.is_empty() {
            debug!("Flushing incomplete character at exit");
            self.with_screen(|screen| screen.write(&tail));
            self.emit(SessionEvent::Stdout(tail));
        }
        // The child is already gone; nothing to terminate
        *self.inner.link.borrow_mut() = ProcessLink::Gone;
        self.teardown(code);
    }

    fn dispatch_screen_events(&self) -> bool {
        let events = self
            .with_screen(|screen| screen.take_events())
            .unwrap_or_default();
        let dispatched = !events.is_empty();

        for event in events {
            if !self.is_attached() {
                break;
            }
            self.handle_screen_event(event);
        }
        dispatched
    }

    fn handle_screen_event(&self, event: ScreenEvent) {
        match event {
            ScreenEvent::Data(data) => {
                if self.has_process() {
                    self.emit(SessionEvent::Data(data.clone()));
                    self.input(data);
                } else {
                    trace!(len = data.len(), "Dropping screen reply without a process");
                }
            }
            ScreenEvent::Title(title) => {
                let short = truncate_title(&title);
                debug!(title = %short, "Title changed");
                // An empty title hands the bar back to the template
                *self.inner.title_override.borrow_mut() = (!short.is_empty()).then_some(short);
                self.emit(SessionEvent::TitleChanged(title));
            }
            ScreenEvent::Selection(text) => {
                if !text.is_empty() {
                    self.inner.clipboard.borrow_mut().write(&text);
                }
            }
            ScreenEvent::Focus => self.emit(SessionEvent::Focus),
            ScreenEvent::Blur => self.emit(SessionEvent::Blur),
            ScreenEvent::End => {
                if self.inner.mode == SessionMode::Local {
                    debug!("Local input ended");
                    self.teardown(None);
                }
            }
        }
    }

    /// Title from the last title escape sequence, else the rendered template
    pub fn get_title(&self) -> String {
        if let Some(title) = self.inner.title_override.borrow().as_ref() {
            return title.clone();
        }
        let vars = self
            .inner
            .title_vars
            .borrow()
            .clone()
            .unwrap_or_else(|| TitleVars::capture(&self.shell()));
        render_template(self.inner.config.title_template(), &vars)
    }

    /// Screen replies forwarded to the child
    pub fn on_data(&self, handler: impl Fn(&str) + 'static) -> Subscription {
        self.inner.events.subscribe(EventKind::Data, move |event| {
            if let SessionEvent::Data(data) = event {
                handler(data);
            }
        })
    }

    pub fn on_exit(&self, handler: impl Fn(Option<u32>) + 'static) -> Subscription {
        self.inner.events.subscribe(EventKind::Exit, move |event| {
            if let SessionEvent::Exit(code) = event {
                handler(*code);
            }
        })
    }

    pub fn on_resize(&self, handler: impl Fn(Geometry) + 'static) -> Subscription {
        self.inner.events.subscribe(EventKind::Resize, move |event| {
            if let SessionEvent::Resize(geometry) = event {
                handler(*geometry);
            }
        })
    }

    pub fn on_stdin(&self, handler: impl Fn(&[u8]) + 'static) -> Subscription {
        self.inner.events.subscribe(EventKind::Stdin, move |event| {
            if let SessionEvent::Stdin(bytes) = event {
                handler(bytes);
            }
        })
    }

    pub fn on_stdout(&self, handler: impl Fn(&str) + 'static) -> Subscription {
        self.inner.events.subscribe(EventKind::Stdout, move |event| {
            if let SessionEvent::Stdout(text) = event {
                handler(text);
            }
        })
    }

    pub fn on_focus(&self, handler: impl Fn() + 'static) -> Subscription {
        self.inner
            .events
            .subscribe(EventKind::Focus, move |_| handler())
    }

    pub fn on_blur(&self, handler: impl Fn() + 'static) -> Subscription {
        self.inner
            .events
            .subscribe(EventKind::Blur, move |_| handler())
    }

    /// Called with the untruncated title
    pub fn on_did_change_title(&self, handler: impl Fn(&str) + 'static) -> Subscription {
        self.inner.events.subscribe(EventKind::TitleChanged, move |event| {
            if let SessionEvent::TitleChanged(title) = event {
                handler(title);
            }
        })
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
