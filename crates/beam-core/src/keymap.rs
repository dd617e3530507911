//! Terminal-independent key input.
//!
//! The state machines consume [`KeyInput`] instead of a terminal library's
//! event type so they can be driven from tests. Action shortcuts (`key` on
//! an action, e.g. `ctrl+y`) parse into the same type.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Enter,
    Esc,
    Tab,
    BackTab,
    Backspace,
    Delete,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        ctrl: false,
        alt: false,
        shift: false,
    };
    pub const CTRL: Self = Self {
        ctrl: true,
        alt: false,
        shift: false,
    };
}

/// One key press with modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyInput {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyInput {
    #[must_use]
    pub const fn new(key: Key, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }

    #[must_use]
    pub const fn plain(key: Key) -> Self {
        Self::new(key, Modifiers::NONE)
    }

    #[must_use]
    pub const fn char(c: char) -> Self {
        Self::plain(Key::Char(c))
    }

    #[must_use]
    pub const fn ctrl(c: char) -> Self {
        Self::new(Key::Char(c), Modifiers::CTRL)
    }

    /// Printable character typed without ctrl/alt.
    #[must_use]
    pub fn text(&self) -> Option<char> {
        match self.key {
            Key::Char(c) if !self.modifiers.ctrl && !self.modifiers.alt && !c.is_control() => {
                Some(c)
            }
            _ => None,
        }
    }

    /// Compare ignoring shift on characters, which terminals report
    /// inconsistently for uppercase letters.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        match (self.key, other.key) {
            (Key::Char(a), Key::Char(b)) => {
                a == b
                    && self.modifiers.ctrl == other.modifiers.ctrl
                    && self.modifiers.alt == other.modifiers.alt
            }
            _ => self == other,
        }
    }
}

/// Error from parsing a shortcut string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid key `{0}`")]
pub struct ParseKeyError(pub String);

impl FromStr for KeyInput {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseKeyError(s.to_string());
        let mut modifiers = Modifiers::NONE;
        let mut parts: Vec<&str> = s.split('+').collect();
        // `ctrl++` names the plus key.
        if s.ends_with("++") {
            parts.truncate(parts.len() - 2);
            parts.push("+");
        }
        let (last, mods) = parts.split_last().ok_or_else(invalid)?;
        for part in mods {
            match part.to_ascii_lowercase().as_str() {
                "ctrl" | "control" | "c" => modifiers.ctrl = true,
                "alt" | "meta" | "opt" | "option" => modifiers.alt = true,
                "shift" => modifiers.shift = true,
                _ => return Err(invalid()),
            }
        }
        let lower = last.to_ascii_lowercase();
        let key = match lower.as_str() {
            "enter" | "return" => Key::Enter,
            "esc" | "escape" => Key::Esc,
            "tab" if modifiers.shift => {
                modifiers.shift = false;
                Key::BackTab
            }
            "tab" => Key::Tab,
            "backtab" => Key::BackTab,
            "backspace" => Key::Backspace,
            "delete" | "del" => Key::Delete,
            "up" => Key::Up,
            "down" => Key::Down,
            "left" => Key::Left,
            "right" => Key::Right,
            "home" => Key::Home,
            "end" => Key::End,
            "pageup" | "pgup" => Key::PageUp,
            "pagedown" | "pgdn" => Key::PageDown,
            "space" => Key::Char(' '),
            f if f.len() > 1 && f.starts_with('f') => {
                let n: u8 = f[1..].parse().map_err(|_| invalid())?;
                if !(1..=24).contains(&n) {
                    return Err(invalid());
                }
                Key::F(n)
            }
            _ => {
                let mut chars = last.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Char(if modifiers.ctrl { c.to_ascii_lowercase() } else { c }),
                    _ => return Err(invalid()),
                }
            }
        };
        Ok(Self { key, modifiers })
    }
}

impl fmt::Display for KeyInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.ctrl {
            f.write_str("ctrl+")?;
        }
        if self.modifiers.alt {
            f.write_str("alt+")?;
        }
        if self.modifiers.shift {
            f.write_str("shift+")?;
        }
        match self.key {
            Key::Char(' ') => f.write_str("space"),
            Key::Char(c) => write!(f, "{c}"),
            Key::Enter => f.write_str("enter"),
            Key::Esc => f.write_str("esc"),
            Key::Tab => f.write_str("tab"),
            Key::BackTab => f.write_str("shift+tab"),
            Key::Backspace => f.write_str("backspace"),
            Key::Delete => f.write_str("delete"),
            Key::Up => f.write_str("up"),
            Key::Down => f.write_str("down"),
            Key::Left => f.write_str("left"),
            Key::Right => f.write_str("right"),
            Key::Home => f.write_str("home"),
            Key::End => f.write_str("end"),
            Key::PageUp => f.write_str("pageup"),
            Key::PageDown => f.write_str("pagedown"),
            Key::F(n) => write!(f, "f{n}"),
        }
    }
}

#[cfg(feature = "tui")]
impl KeyInput {
    /// Convert a crossterm key event. Returns `None` for keys the state
    /// machines never act on.
    #[must_use]
    pub fn from_crossterm(event: &crossterm::event::KeyEvent) -> Option<Self> {
        use crossterm::event::{KeyCode, KeyModifiers};

        let modifiers = Modifiers {
            ctrl: event.modifiers.contains(KeyModifiers::CONTROL),
            alt: event.modifiers.contains(KeyModifiers::ALT),
            shift: event.modifiers.contains(KeyModifiers::SHIFT),
        };
        let key = match event.code {
            KeyCode::Char(c) => {
                // Shift is already reflected in the character itself.
                return Some(Self::new(
                    Key::Char(if modifiers.ctrl { c.to_ascii_lowercase() } else { c }),
                    Modifiers {
                        shift: false,
                        ..modifiers
                    },
                ));
            }
            KeyCode::Enter => Key::Enter,
            KeyCode::Esc => Key::Esc,
            KeyCode::Tab => Key::Tab,
            KeyCode::BackTab => {
                return Some(Self::new(
                    Key::BackTab,
                    Modifiers {
                        shift: false,
                        ..modifiers
                    },
                ));
            }
            KeyCode::Backspace => Key::Backspace,
            KeyCode::Delete => Key::Delete,
            KeyCode::Up => Key::Up,
            KeyCode::Down => Key::Down,
            KeyCode::Left => Key::Left,
            KeyCode::Right => Key::Right,
            KeyCode::Home => Key::Home,
            KeyCode::End => Key::End,
            KeyCode::PageUp => Key::PageUp,
            KeyCode::PageDown => Key::PageDown,
            KeyCode::F(n) => Key::F(n),
            _ => return None,
        };
        Some(Self::new(key, modifiers))
    }
}
