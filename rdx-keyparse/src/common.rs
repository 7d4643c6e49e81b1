//! Contains common, primitive types shared across the crate.
//!
//! This module defines the identifier and key-code types used by the matchers,
//! the scheduler and the configuration layer. Using distinct types instead of
//! bare integers keeps arena handles and evdev codes from being mixed up.

use serde::Deserialize;
use slotmap::new_key_type;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigurationError;

new_key_type! {
    /// Uniquely and safely identifies a live matcher inside a generation.
    ///
    /// A suspended matcher keeps its id from one event to the next, so the id
    /// doubles as the stable reduce order of a cycle. That order is by slot,
    /// not by age: freed slots are reused, though never while the matcher
    /// they point to is alive.
    pub struct MatcherId;
}

/// An evdev key code, such as `KEY_CAPSLOCK` (58).
///
/// Parsed from and displayed as the kernel's symbolic name. The named
/// constants cover the keys the built-in layout and the tests talk about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub struct KeyCode(pub u16);

impl KeyCode {
    pub const ESC: KeyCode = KeyCode(1);
    pub const LEFTCTRL: KeyCode = KeyCode(29);
    pub const A: KeyCode = KeyCode(30);
    pub const H: KeyCode = KeyCode(35);
    pub const J: KeyCode = KeyCode(36);
    pub const K: KeyCode = KeyCode(37);
    pub const L: KeyCode = KeyCode(38);
    pub const B: KeyCode = KeyCode(48);
    pub const SPACE: KeyCode = KeyCode(57);
    pub const CAPSLOCK: KeyCode = KeyCode(58);
    pub const UP: KeyCode = KeyCode(103);
    pub const LEFT: KeyCode = KeyCode(105);
    pub const RIGHT: KeyCode = KeyCode(106);
    pub const DOWN: KeyCode = KeyCode(108);
    pub const LEFTMETA: KeyCode = KeyCode(125);

    /// Returns the raw evdev code.
    pub fn code(self) -> u16 {
        self.0
    }
}

impl FromStr for KeyCode {
    type Err = ConfigurationError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let upper = name.trim().to_uppercase();
        let upper = if upper.starts_with("KEY_") || upper.starts_with("BTN_") {
            upper
        } else {
            format!("KEY_{upper}")
        };
        evdev::Key::from_str(&upper)
            .map(|key| KeyCode(key.code()))
            .map_err(|_| ConfigurationError::UnknownKey(name.to_string()))
    }
}

impl TryFrom<String> for KeyCode {
    type Error = ConfigurationError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", evdev::Key::new(self.0))
    }
}

/// A key selector as written in configuration: a key name, or `ANY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct KeyMatch(pub Option<KeyCode>);

impl TryFrom<String> for KeyMatch {
    type Error = ConfigurationError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        match name.trim() {
            "ANY" | "any" | "*" => Ok(KeyMatch(None)),
            other => other.parse().map(|key| KeyMatch(Some(key))),
        }
    }
}
