//! Accelerator strings for native registration.
//!
//! An accelerator is one or more modifiers followed by a single terminal key,
//! joined with `+`, e.g. `Control+Shift+R`. Modifiers are always emitted in
//! the order Control, Shift, Alt, Super, so two accelerators naming the same
//! combination compare equal as strings.

use crate::error::{Error, Result};
use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Modifier order used when rendering an accelerator.
const MODIFIER_ORDER: [(Modifiers, &str); 4] = [
    (Modifiers::CONTROL, "Control"),
    (Modifiers::SHIFT, "Shift"),
    (Modifiers::ALT, "Alt"),
    (Modifiers::SUPER, "Super"),
];

/// A normalized modifier-plus-key combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Accelerator {
    modifiers: Modifiers,
    key: String,
}

/// A raw key press as reported by a key-capture surface.
///
/// `key` follows the DOM `KeyboardEvent.key` naming (`"r"`, `" "`,
/// `"ArrowUp"`, `"F5"`, `"Shift"`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEvent {
    pub key: String,
    #[serde(default)]
    pub ctrl_key: bool,
    #[serde(default)]
    pub shift_key: bool,
    #[serde(default)]
    pub alt_key: bool,
    #[serde(default)]
    pub meta_key: bool,
}

impl KeyEvent {
    /// A key press with no modifiers held.
    pub fn new(key: impl Into<String>) -> Self {
        KeyEvent {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn ctrl(mut self) -> Self {
        self.ctrl_key = true;
        self
    }

    pub fn shift(mut self) -> Self {
        self.shift_key = true;
        self
    }

    pub fn alt(mut self) -> Self {
        self.alt_key = true;
        self
    }

    pub fn meta(mut self) -> Self {
        self.meta_key = true;
        self
    }

    fn modifiers(&self) -> Modifiers {
        let mut mods = Modifiers::empty();
        if self.ctrl_key {
            mods |= Modifiers::CONTROL;
        }
        if self.shift_key {
            mods |= Modifiers::SHIFT;
        }
        if self.alt_key {
            mods |= Modifiers::ALT;
        }
        // Meta is Super on Linux desktops
        if self.meta_key {
            mods |= Modifiers::SUPER;
        }
        mods
    }
}

/// Convert a captured key press into an accelerator.
///
/// Returns `None` when no modifier is held (global shortcuts never bind bare
/// keys), when only a modifier key was pressed, or when the key is not one we
/// know how to name.
pub fn key_event_to_accelerator(event: &KeyEvent) -> Option<Accelerator> {
    let modifiers = event.modifiers();
    if modifiers.is_empty() {
        return None;
    }

    let key = match event_key_name(&event.key) {
        Some(key) => key,
        None => {
            tracing::trace!("Ignoring key {:?} while capturing accelerator", event.key);
            return None;
        }
    };

    Some(Accelerator { modifiers, key })
}

/// Names a terminal key from a key event, or `None` for modifiers and
/// unknown multi-character keys.
fn event_key_name(key: &str) -> Option<String> {
    let mapped = match key {
        " " => "Space",
        "+" => "Plus",
        "ArrowUp" => "Up",
        "ArrowDown" => "Down",
        "ArrowLeft" => "Left",
        "ArrowRight" => "Right",
        "Escape" => "Escape",
        "Enter" => "Enter",
        "Tab" => "Tab",
        "Backspace" => "Backspace",
        "Delete" => "Delete",
        "Home" => "Home",
        "End" => "End",
        "PageUp" => "PageUp",
        "PageDown" => "PageDown",
        _ => {
            if key.chars().count() == 1 {
                return single_char_key(key);
            }
            if is_function_key(key) {
                return Some(key.to_string());
            }
            // Bare modifiers land here too: wait for a real key
            return None;
        }
    };
    Some(mapped.to_string())
}

/// Upper-cases a one-character key. Characters whose upper case is longer
/// than one character (`ß` -> `SS`) have no single-key spelling.
fn single_char_key(key: &str) -> Option<String> {
    let upper = key.to_uppercase();
    (upper.chars().count() == 1).then_some(upper)
}

/// Matches `F` followed by one or more digits.
fn is_function_key(key: &str) -> bool {
    key.strip_prefix('F')
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

impl Accelerator {
    /// Parse an accelerator string.
    ///
    /// Accepts the normalized form produced by [`Accelerator::to_string`] as
    /// well as common aliases, case-insensitively:
    /// - "Control+Shift+R"
    /// - "ctrl+alt+delete"
    /// - "super+f5"
    /// - "cmd+space"
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('+').map(|p| p.trim()).collect();

        let Some((key_part, modifier_parts)) = parts.split_last() else {
            return Err(Error::InvalidAccelerator("Empty accelerator".to_string()));
        };
        if key_part.is_empty() {
            return Err(Error::InvalidAccelerator(format!("Missing key in {s:?}")));
        }

        let mut modifiers = Modifiers::empty();
        for part in modifier_parts {
            match part.to_lowercase().as_str() {
                "ctrl" | "control" => modifiers |= Modifiers::CONTROL,
                "shift" => modifiers |= Modifiers::SHIFT,
                "alt" | "option" => modifiers |= Modifiers::ALT,
                "super" | "meta" | "cmd" | "command" | "win" | "windows" => {
                    modifiers |= Modifiers::SUPER
                }
                _ => {
                    return Err(Error::InvalidAccelerator(format!(
                        "Unknown modifier: {part}"
                    )))
                }
            }
        }

        if modifiers.is_empty() {
            return Err(Error::InvalidAccelerator(format!(
                "{s:?} has no modifier; global shortcuts need at least one"
            )));
        }

        let key = canonical_key(key_part)?;
        Ok(Accelerator { modifiers, key })
    }

    /// Build from parts already known to be canonical.
    pub(crate) fn from_parts(modifiers: Modifiers, key: &str) -> Self {
        Accelerator {
            modifiers,
            key: key.to_string(),
        }
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// The terminal key in canonical spelling, e.g. `R`, `F5`, `PageUp`.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Convert this accelerator to a global_hotkey HotKey.
    pub fn to_hotkey(&self) -> Result<HotKey> {
        let code = parse_code(&self.key)?;
        Ok(HotKey::new(Some(self.modifiers), code))
    }
}

/// Canonical spelling of a key name from an accelerator string.
fn canonical_key(s: &str) -> Result<String> {
    let named = match s.to_lowercase().as_str() {
        "space" => "Space",
        "plus" => "Plus",
        "up" | "arrowup" => "Up",
        "down" | "arrowdown" => "Down",
        "left" | "arrowleft" => "Left",
        "right" | "arrowright" => "Right",
        "escape" | "esc" => "Escape",
        "enter" | "return" => "Enter",
        "tab" => "Tab",
        "backspace" => "Backspace",
        "delete" | "del" => "Delete",
        "insert" | "ins" => "Insert",
        "home" => "Home",
        "end" => "End",
        "pageup" | "page_up" | "pgup" => "PageUp",
        "pagedown" | "page_down" | "pgdn" => "PageDown",
        lower => {
            if s.chars().count() == 1 {
                return single_char_key(s)
                    .ok_or_else(|| Error::InvalidAccelerator(format!("Unknown key: {s}")));
            }
            if let Some(n) = lower.strip_prefix('f') {
                if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) {
                    return Ok(format!("F{n}"));
                }
            }
            return Err(Error::InvalidAccelerator(format!("Unknown key: {s}")));
        }
    };
    Ok(named.to_string())
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<&str> = MODIFIER_ORDER
            .iter()
            .filter(|(m, _)| self.modifiers.contains(*m))
            .map(|(_, name)| *name)
            .collect();
        parts.push(&self.key);
        write!(f, "{}", parts.join("+"))
    }
}

impl FromStr for Accelerator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Accelerator::parse(s)
    }
}

impl TryFrom<&str> for Accelerator {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Accelerator::parse(s)
    }
}

impl TryFrom<String> for Accelerator {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Accelerator::parse(&s)
    }
}

impl From<Accelerator> for String {
    fn from(accelerator: Accelerator) -> Self {
        accelerator.to_string()
    }
}

/// Map a canonical key name to a key code
fn parse_code(key: &str) -> Result<Code> {
    let code = match key {
        // Letters
        "A" => Code::KeyA,
        "B" => Code::KeyB,
        "C" => Code::KeyC,
        "D" => Code::KeyD,
        "E" => Code::KeyE,
        "F" => Code::KeyF,
        "G" => Code::KeyG,
        "H" => Code::KeyH,
        "I" => Code::KeyI,
        "J" => Code::KeyJ,
        "K" => Code::KeyK,
        "L" => Code::KeyL,
        "M" => Code::KeyM,
        "N" => Code::KeyN,
        "O" => Code::KeyO,
        "P" => Code::KeyP,
        "Q" => Code::KeyQ,
        "R" => Code::KeyR,
        "S" => Code::KeyS,
        "T" => Code::KeyT,
        "U" => Code::KeyU,
        "V" => Code::KeyV,
        "W" => Code::KeyW,
        "X" => Code::KeyX,
        "Y" => Code::KeyY,
        "Z" => Code::KeyZ,

        // Numbers
        "0" => Code::Digit0,
        "1" => Code::Digit1,
        "2" => Code::Digit2,
        "3" => Code::Digit3,
        "4" => Code::Digit4,
        "5" => Code::Digit5,
        "6" => Code::Digit6,
        "7" => Code::Digit7,
        "8" => Code::Digit8,
        "9" => Code::Digit9,

        // Function keys
        "F1" => Code::F1,
        "F2" => Code::F2,
        "F3" => Code::F3,
        "F4" => Code::F4,
        "F5" => Code::F5,
        "F6" => Code::F6,
        "F7" => Code::F7,
        "F8" => Code::F8,
        "F9" => Code::F9,
        "F10" => Code::F10,
        "F11" => Code::F11,
        "F12" => Code::F12,

        // Special keys
        "Escape" => Code::Escape,
        "Space" => Code::Space,
        "Enter" => Code::Enter,
        "Tab" => Code::Tab,
        "Backspace" => Code::Backspace,
        "Delete" => Code::Delete,
        "Insert" => Code::Insert,
        "Home" => Code::Home,
        "End" => Code::End,
        "PageUp" => Code::PageUp,
        "PageDown" => Code::PageDown,
        "Plus" => Code::NumpadAdd,

        // Arrow keys
        "Left" => Code::ArrowLeft,
        "Right" => Code::ArrowRight,
        "Up" => Code::ArrowUp,
        "Down" => Code::ArrowDown,

        // Punctuation and symbols
        "-" => Code::Minus,
        "=" => Code::Equal,
        "[" => Code::BracketLeft,
        "]" => Code::BracketRight,
        "\\" => Code::Backslash,
        ";" => Code::Semicolon,
        "'" => Code::Quote,
        "," => Code::Comma,
        "." => Code::Period,
        "/" => Code::Slash,
        "`" => Code::Backquote,

        _ => {
            return Err(Error::InvalidAccelerator(format!(
                "No native key code for {key}"
            )))
        }
    };
    Ok(code)
}
