//! Key mapping for terminal input
//!
//! Turns crossterm key events into either bytes for the session or a host
//! command (paste, scrollback, quit).

use bitflags::bitflags;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::core::screen::{InputModes, Scroll};

bitflags! {
    /// Modifier keys, laid out so that `bits + 1` is the xterm parameter
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b001;
        const ALT   = 0b010;
        const CTRL  = 0b100;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        result.set(Modifiers::SHIFT, mods.contains(KeyModifiers::SHIFT));
        result.set(Modifiers::ALT, mods.contains(KeyModifiers::ALT));
        result.set(Modifiers::CTRL, mods.contains(KeyModifiers::CONTROL));
        result
    }
}

impl Modifiers {
    fn xterm_param(self) -> u8 {
        self.bits() + 1
    }
}

/// What a key press should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    /// Bytes for the session
    Input(Vec<u8>),
    Paste,
    Scroll(Scroll),
    Quit,
}

/// Key mapper for converting key events to actions
pub struct KeyMapper;

impl KeyMapper {
    /// Host bindings first, then the VT encoding of the key
    pub fn action(event: &KeyEvent, modes: InputModes) -> Option<KeyAction> {
        let mods = Modifiers::from(event.modifiers);
        Self::host_binding(event.code, mods).or_else(|| Self::map(event, modes).map(KeyAction::Input))
    }

    fn host_binding(code: KeyCode, mods: Modifiers) -> Option<KeyAction> {
        if mods == Modifiers::CTRL | Modifiers::SHIFT {
            return match code {
                KeyCode::Char('v' | 'V') => Some(KeyAction::Paste),
                KeyCode::Char('q' | 'Q') => Some(KeyAction::Quit),
                _ => None,
            };
        }
        if mods != Modifiers::SHIFT {
            return None;
        }
        let scroll = match code {
            KeyCode::PageUp => Scroll::Pages(-1),
            KeyCode::PageDown => Scroll::Pages(1),
            KeyCode::Up => Scroll::Lines(-1),
            KeyCode::Down => Scroll::Lines(1),
            KeyCode::Home => Scroll::Top,
            KeyCode::End => Scroll::Bottom,
            _ => return None,
        };
        Some(KeyAction::Scroll(scroll))
    }

    /// VT byte sequence for a key, `None` for keys with no encoding
    pub fn map(event: &KeyEvent, modes: InputModes) -> Option<Vec<u8>> {
        let mods = Modifiers::from(event.modifiers);

        let bytes = match event.code {
            KeyCode::Char(ch) => Self::char_bytes(ch, mods),
            KeyCode::Enter => Self::alt_prefixed(b"\r", mods),
            KeyCode::Backspace => Self::alt_prefixed(b"\x7f", mods),
            KeyCode::Tab if mods.contains(Modifiers::SHIFT) => b"\x1b[Z".to_vec(),
            KeyCode::Tab => b"\t".to_vec(),
            KeyCode::BackTab => b"\x1b[Z".to_vec(),
            KeyCode::Esc => b"\x1b".to_vec(),

            KeyCode::Up => Self::cursor_key(b'A', mods, modes),
            KeyCode::Down => Self::cursor_key(b'B', mods, modes),
            KeyCode::Right => Self::cursor_key(b'C', mods, modes),
            KeyCode::Left => Self::cursor_key(b'D', mods, modes),
            KeyCode::Home => Self::cursor_key(b'H', mods, modes),
            KeyCode::End => Self::cursor_key(b'F', mods, modes),

            KeyCode::Insert => Self::tilde_key(2, mods),
            KeyCode::Delete => Self::tilde_key(3, mods),
            KeyCode::PageUp => Self::tilde_key(5, mods),
            KeyCode::PageDown => Self::tilde_key(6, mods),

            KeyCode::F(n @ 1..=4) => Self::ss3_key(b'P' + (n - 1), mods),
            KeyCode::F(n) => Self::tilde_key(Self::function_code(n)?, mods),

            _ => return None,
        };
        Some(bytes)
    }

    fn char_bytes(ch: char, mods: Modifiers) -> Vec<u8> {
        if mods.contains(Modifiers::CTRL) {
            if let Some(byte) = Self::control_byte(ch) {
                return Self::alt_prefixed(&[byte], mods);
            }
        }
        let mut buf = [0u8; 4];
        Self::alt_prefixed(ch.encode_utf8(&mut buf).as_bytes(), mods)
    }

    /// C0 byte produced by Ctrl+`ch`
    fn control_byte(ch: char) -> Option<u8> {
        match ch {
            'a'..='z' => Some(ch as u8 - b'a' + 1),
            'A'..='Z' => Some(ch as u8 - b'A' + 1),
            '@' | ' ' | '2' => Some(0x00),
            '[' | '3' => Some(0x1b),
            '\\' | '4' => Some(0x1c),
            ']' | '5' => Some(0x1d),
            '^' | '6' => Some(0x1e),
            '_' | '/' | '7' => Some(0x1f),
            _ => None,
        }
    }

    fn alt_prefixed(bytes: &[u8], mods: Modifiers) -> Vec<u8> {
        let mut out = Vec::with_capacity(bytes.len() + 1);
        if mods.contains(Modifiers::ALT) {
            out.push(0x1b);
        }
        out.extend_from_slice(bytes);
        out
    }

    fn cursor_key(final_byte: u8, mods: Modifiers, modes: InputModes) -> Vec<u8> {
        if !mods.is_empty() {
            format!("\x1b[1;{}{}", mods.xterm_param(), final_byte as char).into_bytes()
        } else if modes.application_cursor {
            vec![0x1b, b'O', final_byte]
        } else {
            vec![0x1b, b'[', final_byte]
        }
    }

    fn ss3_key(final_byte: u8, mods: Modifiers) -> Vec<u8> {
        if mods.is_empty() {
            vec![0x1b, b'O', final_byte]
        } else {
            format!("\x1b[1;{}{}", mods.xterm_param(), final_byte as char).into_bytes()
        }
    }

    fn tilde_key(code: u8, mods: Modifiers) -> Vec<u8> {
        if mods.is_empty() {
            format!("\x1b[{}~", code).into_bytes()
        } else {
            format!("\x1b[{};{}~", code, mods.xterm_param()).into_bytes()
        }
    }

    /// `CSI n ~` code for F5..F12
    fn function_code(n: u8) -> Option<u8> {
        match n {
            5 => Some(15),
            6..=10 => Some(n + 11),
            11 | 12 => Some(n + 12),
            _ => None,
        }
    }
}
