//! Defines all configuration structures for keyparse.
//!
//! These structs are deserialized with `serde` from layered sources: built-in
//! defaults, an optional TOML file, then `KEYPARSE_*` environment variables.
//! The layout itself (which patterns fire which effects) lives in the
//! `[[rules]]` array, so it can change without recompiling.

use crate::common::{KeyCode, KeyMatch};
use crate::components::combinators::{
    bind, combine, held_with, pressed, pushed, released, repeat, sequence, wait_pressed,
    wait_released, within, HoldOptions,
};
use crate::components::layout::{Layout, Rule};
use crate::components::matcher::Pattern;
use crate::dispatch::Action;
use crate::error::ConfigurationError;
use chrono::TimeDelta;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Name of the config file looked up in the working directory.
pub const DEFAULT_CONFIG_NAME: &str = "keyparse";

/// The top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyparseConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    /// The layout. Empty means the built-in `caps2esc` layout.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// Which physical device to read and what to call the virtual one.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Regular expression searched for in device names.
    #[serde(default = "default_device_pattern")]
    pub pattern: String,

    /// Name of the uinput keyboard that synthetic keys are written to.
    #[serde(default = "default_virtual_name")]
    pub virtual_name: String,
}

/// Scheduler and engine tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub reseed: ReseedPolicy,

    /// Drop suspended matchers identical to one already live.
    #[serde(default = "default_dedupe")]
    pub dedupe: bool,

    /// Capacity of the broadcast channel carrying `EngineEvent`s.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// When the scheduler seeds a fresh layout instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReseedPolicy {
    /// Before every event, whatever its kind.
    #[default]
    EveryEvent,
    /// Only before key-down events. Layouts whose rules all begin with a
    /// press behave the same, with fewer short-lived matchers.
    KeyDown,
}

/// One `[[rules]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub name: String,
    pub pattern: PatternConfig,
    pub action: Action,
    /// A rule seeded each time this one fires.
    #[serde(default)]
    pub then: Option<Box<RuleConfig>>,
}

/// A pattern as written in TOML, e.g. `{ pushed = "KEY_CAPSLOCK" }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternConfig {
    Pressed(KeyMatch),
    Released(KeyMatch),
    WaitPressed(KeyMatch),
    WaitReleased(KeyMatch),
    Pushed(KeyMatch),
    Sequence(Vec<PatternConfig>),
    Combine(Vec<PatternConfig>),
    Repeat {
        times: usize,
        body: Box<PatternConfig>,
    },
    Within {
        millis: u64,
        body: Box<PatternConfig>,
    },
    /// A named chord with its own action, e.g. inside a `held` layer.
    Bind {
        name: String,
        pattern: Box<PatternConfig>,
        action: Action,
    },
    Held {
        key: KeyCode,
        body: Box<PatternConfig>,
        #[serde(default)]
        on_release: Option<Action>,
        #[serde(default)]
        repeat: bool,
    },
}

impl PatternConfig {
    pub fn build(&self) -> Pattern {
        match self {
            PatternConfig::Pressed(key) => pressed(key.0),
            PatternConfig::Released(key) => released(key.0),
            PatternConfig::WaitPressed(key) => wait_pressed(key.0),
            PatternConfig::WaitReleased(key) => wait_released(key.0),
            PatternConfig::Pushed(key) => pushed(key.0),
            PatternConfig::Sequence(steps) => sequence(steps.iter().map(PatternConfig::build)),
            PatternConfig::Combine(children) => combine(children.iter().map(PatternConfig::build)),
            PatternConfig::Repeat { times, body } => repeat(*times, body.build()),
            PatternConfig::Bind {
                name,
                pattern,
                action,
            } => bind(name.clone(), pattern.build(), action.clone()),
            PatternConfig::Within { millis, body } => {
                let limit = i64::try_from(*millis)
                    .ok()
                    .and_then(TimeDelta::try_milliseconds)
                    .unwrap_or(TimeDelta::MAX);
                within(limit, body.build())
            }
            PatternConfig::Held {
                key,
                body,
                on_release,
                repeat,
            } => held_with(
                *key,
                body.build(),
                HoldOptions {
                    on_release: on_release.clone(),
                    repeat: *repeat,
                },
            ),
        }
    }
}

impl RuleConfig {
    pub fn build(&self) -> Result<Rule, ConfigurationError> {
        let pattern = self.pattern.build();
        if pattern.is_empty() {
            return Err(ConfigurationError::EmptyPattern(self.name.clone()));
        }
        match &self.then {
            Some(then) => Ok(Rule::with_follow_up(
                self.name.clone(),
                pattern,
                self.action.clone(),
                then.build()?.pattern().clone(),
            )),
            None => Ok(Rule::new(self.name.clone(), pattern, self.action.clone())),
        }
    }
}

impl KeyparseConfig {
    /// Loads defaults, then `path` (or `keyparse.toml` if present), then the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };
        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("KEYPARSE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Builds the layout; no configured rules means the default layout.
    pub fn layout(&self) -> Result<Layout, ConfigurationError> {
        if self.rules.is_empty() {
            return Ok(Layout::default());
        }
        let rules = self
            .rules
            .iter()
            .map(RuleConfig::build)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Layout::new(rules))
    }
}

// --- Default value functions for serde ---

fn default_device_pattern() -> String {
    r"Keyboard.*-kbd$".to_string()
}

fn default_virtual_name() -> String {
    "keyparse virtual keyboard".to_string()
}

fn default_dedupe() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            pattern: default_device_pattern(),
            virtual_name: default_virtual_name(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reseed: ReseedPolicy::default(),
            dedupe: default_dedupe(),
            channel_capacity: default_channel_capacity(),
        }
    }
}
