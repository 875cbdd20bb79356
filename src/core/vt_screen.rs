//! Terminal screen backed by the `vt100` crate
//!
//! Adds what the parser does not do on its own: title change notifications,
//! replies to status queries, pointer selection and focus tracking.

use vt100::{MouseProtocolMode, Parser};

use super::geometry::{CellSize, Geometry, ViewportSize};
use super::screen::{
    InputModes, PointerEvent, Result, ScreenError, ScreenEvent, ScreenFactory, ScreenOptions,
    ScreenSnapshot, Scroll, TerminalScreen,
};

/// End of transmission: closes a local echo session
const EOT: char = '\u{4}';
/// Longest CSI parameter string the query scanner keeps
const MAX_QUERY_PARAMS: usize = 16;
/// OSC prefixes that set the window title
const TITLE_PREFIXES: [&[u8]; 2] = [b"0;", b"2;"];

/// Status queries a child may send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Query {
    /// `CSI 6 n`
    CursorPosition,
    /// `CSI 5 n`
    DeviceStatus,
    /// `CSI c` / `CSI 0 c`
    PrimaryAttributes,
}

/// Sequences the scanner reports once the parser has consumed them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scanned {
    Query(Query),
    /// `OSC 0` or `OSC 2`, terminated by BEL or ESC
    Title,
}

#[derive(Debug, Default)]
enum ScanState {
    #[default]
    Ground,
    Escape,
    Csi(Vec<u8>),
    /// Keeps only the first bytes, enough to tell the OSC number
    Osc(Vec<u8>),
}

/// Spots status queries and title changes in the output stream, across
/// write boundaries
#[derive(Debug, Default)]
struct QueryScanner {
    state: ScanState,
}

impl QueryScanner {
    fn feed(&mut self, byte: u8) -> Option<Scanned> {
        match std::mem::take(&mut self.state) {
            ScanState::Ground => {
                if byte == 0x1B {
                    self.state = ScanState::Escape;
                }
                None
            }
            ScanState::Escape => {
                self.state = match byte {
                    b'[' => ScanState::Csi(Vec::new()),
                    b']' => ScanState::Osc(Vec::new()),
                    0x1B => ScanState::Escape,
                    _ => ScanState::Ground,
                };
                None
            }
            ScanState::Csi(mut params) => match byte {
                0x20..=0x3F => {
                    if params.len() < MAX_QUERY_PARAMS {
                        params.push(byte);
                        self.state = ScanState::Csi(params);
                    }
                    None
                }
                b'n' if params == b"6" => Some(Scanned::Query(Query::CursorPosition)),
                b'n' if params == b"5" => Some(Scanned::Query(Query::DeviceStatus)),
                b'c' if params.is_empty() || params == b"0" => {
                    Some(Scanned::Query(Query::PrimaryAttributes))
                }
                0x1B => {
                    self.state = ScanState::Escape;
                    None
                }
                _ => None,
            },
            ScanState::Osc(mut prefix) => match byte {
                // BEL, CAN and SUB end the string. ESC ends it too, whether
                // or not a backslash follows.
                0x07 | 0x18 | 0x1A | 0x1B => {
                    if byte == 0x1B {
                        self.state = ScanState::Escape;
                    }
                    TITLE_PREFIXES
                        .contains(&prefix.as_slice())
                        .then_some(Scanned::Title)
                }
                _ => {
                    if prefix.len() < 2 {
                        prefix.push(byte);
                    }
                    self.state = ScanState::Osc(prefix);
                    None
                }
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Selection {
    anchor: (u16, u16),
    head: (u16, u16),
    dragged: bool,
}

impl Selection {
    /// (start, end) in reading order
    fn ordered(&self) -> ((u16, u16), (u16, u16)) {
        if self.anchor <= self.head {
            (self.anchor, self.head)
        } else {
            (self.head, self.anchor)
        }
    }
}

/// A `vt100` parser wearing the [`TerminalScreen`] interface
pub struct VtScreen {
    parser: Parser,
    options: ScreenOptions,
    cell: CellSize,
    events: Vec<ScreenEvent>,
    scanner: QueryScanner,
    focused: bool,
    selection: Option<Selection>,
    destroyed: bool,
}

impl VtScreen {
    pub fn new(options: ScreenOptions, cell: CellSize, geometry: Geometry) -> Self {
        Self {
            parser: Parser::new(geometry.rows, geometry.cols, options.scrollback),
            options,
            cell,
            events: Vec::new(),
            scanner: QueryScanner::default(),
            focused: false,
            selection: None,
            destroyed: false,
        }
    }

    pub fn options(&self) -> &ScreenOptions {
        &self.options
    }

    /// Visible text without formatting
    pub fn contents(&self) -> String {
        self.parser.screen().contents()
    }

    fn process(&mut self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.parser.process(bytes);
        }
    }

    fn reply(&self, query: Query) -> String {
        match query {
            Query::CursorPosition => {
                let (row, col) = self.parser.screen().cursor_position();
                format!("\x1b[{};{}R", row + 1, col + 1)
            }
            Query::DeviceStatus => "\x1b[0n".to_string(),
            Query::PrimaryAttributes => "\x1b[?1;2c".to_string(),
        }
    }


    fn finish_selection(&mut self, selection: Selection) {
        if !selection.dragged {
            return;
        }
        if self.parser.screen().mouse_protocol_mode() != MouseProtocolMode::None {
            return;
        }

        let ((start_row, start_col), (end_row, end_col)) = selection.ordered();
        let text = self.parser.screen().contents_between(
            start_row,
            start_col,
            end_row,
            end_col.saturating_add(1),
        );
        if !text.is_empty() {
            self.events.push(ScreenEvent::Selection(text));
        }
    }

    fn page_rows(&self) -> i64 {
        i64::from(self.geometry().rows)
    }
}

impl TerminalScreen for VtScreen {
    fn write(&mut self, text: &str) {
        if self.destroyed {
            return;
        }

        let bytes = text.as_bytes();
        let mut start = 0;
        for (i, &byte) in bytes.iter().enumerate() {
            let Some(scanned) = self.scanner.feed(byte) else {
                continue;
            };
            self.process(&bytes[start..=i]);
            start = i + 1;
            let event = match scanned {
                Scanned::Query(query) => ScreenEvent::Data(self.reply(query)),
                Scanned::Title => ScreenEvent::Title(self.parser.screen().title().to_string()),
            };
            self.events.push(event);
        }
        self.process(&bytes[start..]);

        if text.contains(EOT) {
            self.events.push(ScreenEvent::End);
        }
    }

    fn geometry(&self) -> Geometry {
        let (rows, cols) = self.parser.screen().size();
        Geometry::new(cols, rows)
    }

    fn resize(&mut self, geometry: Geometry) -> Result<()> {
        if self.destroyed {
            return Err(ScreenError::Destroyed);
        }
        if geometry.cols == 0 || geometry.rows == 0 {
            return Err(ScreenError::InvalidGeometry(geometry));
        }
        // The scrollback offset may not exceed the new row count
        self.parser.set_scrollback(0);
        self.parser.set_size(geometry.rows, geometry.cols);
        self.selection = None;
        Ok(())
    }

    fn fit(&self, viewport: ViewportSize) -> Geometry {
        self.cell.fit(viewport)
    }

    fn focus(&mut self) {
        if !self.destroyed && !self.focused {
            self.focused = true;
            self.events.push(ScreenEvent::Focus);
        }
    }

    fn blur(&mut self) {
        if !self.destroyed && self.focused {
            self.focused = false;
            self.events.push(ScreenEvent::Blur);
        }
    }

    fn pointer(&mut self, event: PointerEvent) {
        if self.destroyed {
            return;
        }
        match event {
            PointerEvent::Press { row, col } => {
                self.selection = Some(Selection {
                    anchor: (row, col),
                    head: (row, col),
                    dragged: false,
                });
            }
            PointerEvent::Drag { row, col } => {
                if let Some(selection) = self.selection.as_mut() {
                    selection.head = (row, col);
                    selection.dragged = true;
                }
            }
            PointerEvent::Release { row, col } => {
                if let Some(mut selection) = self.selection.take() {
                    if selection.head != (row, col) {
                        selection.head = (row, col);
                        selection.dragged = true;
                    }
                    self.finish_selection(selection);
                }
            }
        }
    }

    fn scroll(&mut self, scroll: Scroll) {
        if self.destroyed {
            return;
        }
        let current = self.parser.screen().scrollback() as i64;
        let target = match scroll {
            Scroll::Lines(n) => current - i64::from(n),
            Scroll::Pages(n) => current - i64::from(n) * self.page_rows(),
            Scroll::Top => self.options.scrollback as i64,
            Scroll::Bottom => 0,
        };
        // vt100 shows at most one screen of history at a time
        let limit = self.options.scrollback.min(usize::from(self.geometry().rows));
        let target = target.clamp(0, limit as i64) as usize;
        self.parser.set_scrollback(target);
    }

    fn input_modes(&self) -> InputModes {
        let screen = self.parser.screen();
        InputModes {
            application_cursor: screen.application_cursor(),
            bracketed_paste: screen.bracketed_paste(),
            mouse_tracking: screen.mouse_protocol_mode() != MouseProtocolMode::None,
        }
    }

    fn snapshot(&self) -> ScreenSnapshot {
        let screen = self.parser.screen();
        let (_, cols) = screen.size();
        ScreenSnapshot {
            rows: screen.rows_formatted(0, cols).collect(),
            cursor: screen.cursor_position(),
            cursor_visible: !screen.hide_cursor() && screen.scrollback() == 0,
        }
    }

    fn take_events(&mut self) -> Vec<ScreenEvent> {
        std::mem::take(&mut self.events)
    }

    fn destroy(&mut self) {
        self.destroyed = true;
        self.events.clear();
        self.selection = None;
    }
}

/// Creates [`VtScreen`]s with a fixed cell size
#[derive(Debug, Clone, Copy)]
pub struct VtScreenFactory {
    cell: CellSize,
}

impl VtScreenFactory {
    pub fn new(cell: CellSize) -> Self {
        Self { cell }
    }
}

impl ScreenFactory for VtScreenFactory {
    fn create(&self, options: &ScreenOptions) -> Result<Box<dyn TerminalScreen>> {
        Ok(Box::new(VtScreen::new(
            options.clone(),
            self.cell,
            Geometry::default(),
        )))
    }
}
