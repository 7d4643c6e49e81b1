//! Finds the one input device to listen to.
//!
//! Selection is a regex search over device display names. Exactly one match
//! is required: none and several are distinct configuration errors, each
//! carrying enough names for the user to fix the pattern.

use crate::error::ConfigurationError;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stable symlinks to input devices, named by bus and serial.
pub const BY_ID_DIR: &str = "/dev/input/by-id";

/// An enumerated input device.
pub struct InputDevice {
    pub path: PathBuf,
    pub name: String,
    pub device: evdev::Device,
}

/// Every evdev device this process can open.
pub fn list_devices() -> Vec<InputDevice> {
    let mut devices: Vec<InputDevice> = evdev::enumerate()
        .map(|(path, device)| InputDevice {
            name: device.name().unwrap_or("<unnamed>").to_string(),
            path,
            device,
        })
        .collect();
    devices.sort_by(|a, b| a.path.cmp(&b.path));
    devices
}

/// Picks the single device whose name matches `pattern`.
pub fn select_device(pattern: &str) -> Result<InputDevice, ConfigurationError> {
    let regex = Regex::new(pattern)?;
    let selected = choose(pattern, &regex, list_devices(), |device| device.name.as_str())?;
    debug!(path = %selected.path.display(), "Selected device {:?}.", selected.name);
    Ok(selected)
}

/// The matching rule, separated from device IO.
pub(crate) fn choose<T>(
    pattern: &str,
    regex: &Regex,
    candidates: Vec<T>,
    name_of: impl Fn(&T) -> &str,
) -> Result<T, ConfigurationError> {
    let available: Vec<String> = candidates.iter().map(|c| name_of(c).to_string()).collect();
    let mut matched: Vec<T> = candidates
        .into_iter()
        .filter(|candidate| regex.is_match(name_of(candidate)))
        .collect();
    match matched.len() {
        0 => Err(ConfigurationError::NoDeviceMatched {
            pattern: pattern.to_string(),
            available,
        }),
        1 => Ok(matched.remove(0)),
        _ => Err(ConfigurationError::AmbiguousDevice {
            pattern: pattern.to_string(),
            candidates: matched.iter().map(|c| name_of(c).to_string()).collect(),
        }),
    }
}

/// Lines like `usb-Foo_Keyboard-event-kbd -> ../event3`, for diagnostics.
pub fn by_id_listing(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut lines: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            match fs::read_link(entry.path()) {
                Ok(target) => format!("{} -> {}", name, target.display()),
                Err(_) => name,
            }
        })
        .collect();
    lines.sort();
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<&'static str> {
        vec![
            "Power Button",
            "Logitech USB Keyboard-kbd",
            "Logitech USB Keyboard Consumer Control",
            "AT Translated Set 2 keyboard",
        ]
    }

    #[test]
    fn exactly_one_match_is_selected() {
        let regex = Regex::new(r"Keyboard.*-kbd$").unwrap();
        let chosen = choose("p", &regex, names(), |name| *name).unwrap();
        assert_eq!(chosen, "Logitech USB Keyboard-kbd");
    }

    #[test]
    fn no_match_lists_everything_available() {
        let regex = Regex::new("Nope").unwrap();
        match choose("Nope", &regex, names(), |name| *name) {
            Err(ConfigurationError::NoDeviceMatched { pattern, available }) => {
                assert_eq!(pattern, "Nope");
                assert_eq!(available.len(), 4);
            }
            other => panic!("expected NoDeviceMatched, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn several_matches_list_every_candidate() {
        let regex = Regex::new("(?i)keyboard").unwrap();
        match choose("(?i)keyboard", &regex, names(), |name| *name) {
            Err(ConfigurationError::AmbiguousDevice { candidates, .. }) => {
                assert_eq!(
                    candidates,
                    vec![
                        "Logitech USB Keyboard-kbd",
                        "Logitech USB Keyboard Consumer Control",
                        "AT Translated Set 2 keyboard",
                    ]
                );
            }
            other => panic!("expected AmbiguousDevice, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn missing_by_id_dir_gives_empty_listing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(by_id_listing(&dir.path().join("absent")).is_empty());
    }
}
