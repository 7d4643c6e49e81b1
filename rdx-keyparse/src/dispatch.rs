//! The boundary between matching and doing.
//!
//! A completed rule produces a [`Fired`] value. The scheduler hands it to a
//! [`Dispatcher`], which performs the effect. Matchers never see a dispatcher
//! and a dispatcher never sees a matcher.

use crate::common::KeyCode;
use crate::error::DispatchError;
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key};
use serde::Deserialize;
use std::fmt;
use tracing::{debug, info};

/// An effect bound to a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Synthesize a key-down followed by a key-up.
    Tap(KeyCode),
    /// Synthesize a key-down only.
    Press(KeyCode),
    /// Synthesize a key-up only.
    Release(KeyCode),
    /// Run a command through `sh -c`, without waiting for it.
    Shell(String),
    /// Write a line to the log.
    Log(String),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Tap(key) => write!(f, "tap {key}"),
            Action::Press(key) => write!(f, "press {key}"),
            Action::Release(key) => write!(f, "release {key}"),
            Action::Shell(command) => write!(f, "shell `{command}`"),
            Action::Log(message) => write!(f, "log {message:?}"),
        }
    }
}

/// The terminal value of a completed rule: which rule, and what to do.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fired {
    pub rule: String,
    pub action: Action,
}

impl Fired {
    pub fn new(rule: impl Into<String>, action: Action) -> Self {
        Self {
            rule: rule.into(),
            action,
        }
    }
}

/// Performs the effect of a completed match.
pub trait Dispatcher {
    fn dispatch(&mut self, fired: &Fired) -> Result<(), DispatchError>;
}

impl<D: Dispatcher + ?Sized> Dispatcher for Box<D> {
    fn dispatch(&mut self, fired: &Fired) -> Result<(), DispatchError> {
        (**self).dispatch(fired)
    }
}

/// Collects every `Fired` value it receives. Used by tests and the shell.
#[derive(Debug, Default, Clone)]
pub struct RecordingDispatcher {
    pub fired: Vec<Fired>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&mut self) -> Vec<Fired> {
        std::mem::take(&mut self.fired)
    }
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(&mut self, fired: &Fired) -> Result<(), DispatchError> {
        self.fired.push(fired.clone());
        Ok(())
    }
}

/// Only logs what would have happened.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

impl Dispatcher for LogDispatcher {
    fn dispatch(&mut self, fired: &Fired) -> Result<(), DispatchError> {
        info!(rule = %fired.rule, "would {}", fired.action);
        Ok(())
    }
}

/// Highest key code registered on the virtual keyboard (`KEY_MICMUTE`).
const LAST_KEY_CODE: u16 = 248;

/// Emits synthetic key events through a uinput virtual keyboard.
pub struct UinputDispatcher {
    device: VirtualDevice,
}

impl UinputDispatcher {
    /// Creates the virtual keyboard. Requires write access to `/dev/uinput`.
    pub fn new(name: &str) -> Result<Self, DispatchError> {
        let mut keys = AttributeSet::<Key>::new();
        for code in 1..=LAST_KEY_CODE {
            keys.insert(Key::new(code));
        }
        let device = VirtualDeviceBuilder::new()?
            .name(name)
            .with_keys(&keys)?
            .build()?;
        info!("Virtual keyboard {:?} created.", name);
        Ok(Self { device })
    }

    fn emit_key(&mut self, key: KeyCode, value: i32) -> Result<(), DispatchError> {
        self.device
            .emit(&[InputEvent::new(EventType::KEY, key.code(), value)])?;
        Ok(())
    }
}

impl Dispatcher for UinputDispatcher {
    fn dispatch(&mut self, fired: &Fired) -> Result<(), DispatchError> {
        debug!(rule = %fired.rule, "dispatching {}", fired.action);
        match &fired.action {
            Action::Tap(key) => {
                self.emit_key(*key, 1)?;
                self.emit_key(*key, 0)
            }
            Action::Press(key) => self.emit_key(*key, 1),
            Action::Release(key) => self.emit_key(*key, 0),
            Action::Shell(command) => {
                tokio::process::Command::new("sh")
                    .arg("-c")
                    .arg(command)
                    .spawn()
                    .map(drop)
                    .map_err(|source| DispatchError::Spawn {
                        command: command.clone(),
                        source,
                    })
            }
            Action::Log(message) => {
                info!(rule = %fired.rule, "{}", message);
                Ok(())
            }
        }
    }
}
