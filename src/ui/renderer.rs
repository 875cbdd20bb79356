//! Terminal renderer using crossterm
//!
//! Draws the session's title bar and the screen snapshot into the host
//! terminal.

use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture},
    execute, queue,
    style::{Attribute, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use unicode_width::UnicodeWidthChar;

use crate::config::TitleBarColors;
use crate::core::screen::ScreenSnapshot;

/// One frame's worth of content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// `None` when the title bar is hidden
    pub title: Option<String>,
    pub snapshot: Option<ScreenSnapshot>,
}

/// Terminal renderer
pub struct Renderer {
    colors: TitleBarColors,
    initialized: bool,
    last_frame: Option<Frame>,
}

impl Renderer {
    pub fn new(colors: TitleBarColors) -> Self {
        Self {
            colors,
            initialized: false,
            last_frame: None,
        }
    }

    /// Rows taken by the title bar above the screen
    pub fn title_rows(visible: bool) -> u16 {
        u16::from(visible)
    }

    /// Switch the host terminal to raw mode on the alternate screen
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        execute!(
            io::stdout(),
            EnterAlternateScreen,
            EnableMouseCapture,
            EnableFocusChange,
            DisableLineWrap,
            Clear(ClearType::All),
            MoveTo(0, 0)
        )?;
        self.initialized = true;
        Ok(())
    }

    /// Restore the host terminal
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let mut stdout = io::stdout();
        // Keep going on errors; raw mode must be left regardless
        let _ = execute!(
            stdout,
            ResetColor,
            SetAttribute(Attribute::Reset),
            Show,
            EnableLineWrap,
            DisableFocusChange,
            DisableMouseCapture,
            LeaveAlternateScreen
        );
        terminal::disable_raw_mode()
    }

    /// Forget the last frame so the next render redraws everything
    pub fn invalidate(&mut self) {
        self.last_frame = None;
    }

    pub fn render(&mut self, frame: Frame) -> io::Result<()> {
        if self.last_frame.as_ref() == Some(&frame) {
            return Ok(());
        }
        let (width, height) = terminal::size()?;

        let stdout = io::stdout();
        let mut out = io::BufWriter::with_capacity(64 * 1024, stdout.lock());

        // Synchronized update
        write!(out, "\x1b[?2026h")?;
        queue!(out, Hide)?;

        let offset = match &frame.title {
            Some(title) => {
                queue!(
                    out,
                    MoveTo(0, 0),
                    SetBackgroundColor(self.colors.bg.to_crossterm()),
                    SetForegroundColor(self.colors.fg.to_crossterm()),
                    Print(title_bar(title, width)),
                    ResetColor
                )?;
                1
            }
            None => 0,
        };

        if let Some(snapshot) = &frame.snapshot {
            for (index, row) in snapshot.rows.iter().enumerate() {
                let y = offset + index as u16;
                if y >= height {
                    break;
                }
                queue!(out, MoveTo(0, y))?;
                // Each row carries its own SGR state; start it from scratch
                write!(out, "\x1b[m")?;
                out.write_all(row)?;
                write!(out, "\x1b[m")?;
                queue!(out, Clear(ClearType::UntilNewLine))?;
            }
            let drawn = offset + snapshot.rows.len() as u16;
            if drawn < height {
                queue!(out, MoveTo(0, drawn), Clear(ClearType::FromCursorDown))?;
            }

            if snapshot.cursor_visible {
                let (row, col) = snapshot.cursor;
                queue!(out, MoveTo(col, offset + row), Show)?;
            }
        }

        write!(out, "\x1b[?2026l")?;
        out.flush()?;

        self.last_frame = Some(frame);
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

/// Title bar text padded or cut to exactly `width` columns
pub fn title_bar(title: &str, width: u16) -> String {
    fit_width(&format!(" {}", title), width as usize)
}

fn fit_width(text: &str, width: usize) -> String {
    let mut out = String::with_capacity(width);
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.extend(std::iter::repeat(' ').take(width - used));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use unicode_width::UnicodeWidthStr;

    #[test]
    fn test_title_bar_pads_to_width() {
        let bar = title_bar("(bash)", 12);
        assert_eq!(bar, " (bash)     ");
    }

    #[test]
    fn test_title_bar_cuts_wide_chars() {
        // Each CJK char is two columns; the third would overflow
        let bar = title_bar("日本語", 6);
        assert_eq!(bar, " 日本 ");
        assert_eq!(bar.width(), 6);
    }

    #[test]
    fn test_title_bar_empty_width() {
        assert_eq!(title_bar("zsh", 0), "");
    }

    #[test]
    fn test_title_rows() {
        assert_eq!(Renderer::title_rows(true), 1);
        assert_eq!(Renderer::title_rows(false), 0);
    }
}
