//! # Keyparse
//!
//! Composable, suspendable key-sequence matchers driven by a live input
//! event stream.
//!
//! Keyparse recognizes key sequences, chords and timed combos in an unbounded
//! stream of key events without blocking and without re-reading history.
//!
//! ## Core Concepts
//!
//! - **Matcher**: one attempt at a pattern. Resumed with one event at a time,
//!   it either stays suspended, completes, or fails.
//! - **Combinators**: `sequence`, `pushed`, `held`, `combine`, `within`,
//!   `repeat` and `bind` build patterns out of the `pressed`, `released`,
//!   `wait_pressed` and `wait_released` primitives.
//! - **Layout**: named rules, each a pattern bound to an effect, run together.
//! - **Scheduler**: owns the generation of live matchers and, for every event,
//!   seeds a fresh layout, resumes everything once and reduces the outcomes.
//! - **Dispatcher**: performs the effect of a fired rule.
//!
//! ## Example Usage
//!
//! ```rust
//! use keyparse::prelude::*;
//!
//! let mut scheduler = Scheduler::new(Layout::caps2esc(), RecordingDispatcher::new());
//! scheduler.deliver(&KeyEvent::down(KeyCode::CAPSLOCK));
//! scheduler.deliver(&KeyEvent::up(KeyCode::CAPSLOCK));
//!
//! assert_eq!(
//!     scheduler.dispatcher().fired,
//!     vec![Fired::new("caps2esc", Action::Tap(KeyCode::ESC))]
//! );
//! ```

pub const ENGINE_NAME: &str = "Keyparse Engine";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod common;
pub mod components;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod scheduler;
pub mod source;

/// A prelude module for easy importing of the most common Keyparse types.
pub mod prelude {
    pub use crate::common::{KeyCode, MatcherId};
    pub use crate::components::combinators::{
        bind, bind_then, combine, held, held_with, pressed, pushed, released, repeat, sequence,
        wait_pressed, wait_released, within, HoldOptions,
    };
    pub use crate::components::layout::{Layout, Rule};
    pub use crate::components::matcher::{Matcher, Outcome, Pattern, Value};
    pub use crate::config::{EngineConfig, KeyparseConfig, ReseedPolicy};
    pub use crate::dispatch::{Action, Dispatcher, Fired, LogDispatcher, RecordingDispatcher};
    pub use crate::engine::KeyparseEngine;
    pub use crate::error::{ConfigurationError, DispatchError, SourceFault};
    pub use crate::events::{Edge, EngineEvent, EventKind, KeyEvent};
    pub use crate::scheduler::{CycleReport, Generation, Scheduler};
    pub use crate::source::{ChannelSource, EventSource};
}
