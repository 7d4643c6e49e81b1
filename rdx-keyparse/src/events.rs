//! Defines the input events consumed by the matchers and the engine events
//! broadcast to observers.
//!
//! `KeyEvent` is what flows *into* the scheduler, one per physical
//! occurrence. `EngineEvent` is what flows *out* of the engine to anyone who
//! subscribed, such as the interactive shell.

use crate::common::KeyCode;
use crate::dispatch::Fired;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// The class of an input event, mirroring the evdev event types we care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `EV_KEY`: a key or button changed state.
    Key,
    /// `EV_SYN`: end of a batch of events from the device.
    Sync,
    /// `EV_MSC`: miscellaneous data, usually the scan code preceding a key.
    Misc,
    /// Any other evdev event type, by raw number.
    Other(u16),
}

/// Direction of a key change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Up,
    Down,
    /// Kernel autorepeat while a key is held. Neither a press nor a release.
    Repeat,
}

impl Edge {
    /// Maps an evdev key value (0, 1, 2) to an edge.
    pub fn from_value(value: i32) -> Option<Edge> {
        match value {
            0 => Some(Edge::Up),
            1 => Some(Edge::Down),
            2 => Some(Edge::Repeat),
            _ => None,
        }
    }

    /// The evdev value for this edge.
    pub fn value(self) -> i32 {
        match self {
            Edge::Up => 0,
            Edge::Down => 1,
            Edge::Repeat => 2,
        }
    }
}

/// One immutable input occurrence.
///
/// Matchers only ever see a `&KeyEvent` for the duration of one resume and
/// keep derived data (a code, a timestamp) rather than the event itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub kind: EventKind,
    pub code: u16,
    pub value: i32,
    pub timestamp: DateTime<Utc>,
}

impl KeyEvent {
    /// A key event with the given edge.
    pub fn key(code: KeyCode, edge: Edge, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Key,
            code: code.code(),
            value: edge.value(),
            timestamp,
        }
    }

    /// A key-down event stamped now.
    pub fn down(code: KeyCode) -> Self {
        Self::key(code, Edge::Down, Utc::now())
    }

    /// A key-up event stamped now.
    pub fn up(code: KeyCode) -> Self {
        Self::key(code, Edge::Up, Utc::now())
    }

    /// The edge of a key event; `None` for every other kind.
    pub fn edge(&self) -> Option<Edge> {
        match self.kind {
            EventKind::Key => Edge::from_value(self.value),
            _ => None,
        }
    }

    pub fn key_code(&self) -> KeyCode {
        KeyCode(self.code)
    }
}

impl From<evdev::InputEvent> for KeyEvent {
    fn from(event: evdev::InputEvent) -> Self {
        let kind = match event.event_type() {
            evdev::EventType::KEY => EventKind::Key,
            evdev::EventType::SYNCHRONIZATION => EventKind::Sync,
            evdev::EventType::MISC => EventKind::Misc,
            other => EventKind::Other(other.0),
        };
        Self {
            kind,
            code: event.code(),
            value: event.value(),
            timestamp: DateTime::<Utc>::from(event.timestamp()),
        }
    }
}

/// Events related to the lifecycle and activity of the engine itself.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Fired once when the engine's `run` loop begins.
    EngineStarted { timestamp: Instant },
    /// Fired for every rule that completed and was handed to the dispatcher.
    RuleFired { fired: Fired, at: DateTime<Utc> },
    /// Fired after every delivery cycle with the size of the new generation.
    CycleCompleted {
        live: usize,
        completed: usize,
        failed: usize,
    },
    /// Fired when the event source stops; the engine loop ends right after.
    SourceFaulted { reason: String },
    /// Fired once when the engine's `run` loop is about to exit.
    EngineShutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_key_events_have_an_edge() {
        let now = Utc::now();
        let sync = KeyEvent {
            kind: EventKind::Sync,
            code: 0,
            value: 0,
            timestamp: now,
        };
        assert_eq!(sync.edge(), None);
        assert_eq!(KeyEvent::key(KeyCode::A, Edge::Repeat, now).edge(), Some(Edge::Repeat));
    }

    #[test]
    fn converts_evdev_key_events() {
        let raw = evdev::InputEvent::new(evdev::EventType::KEY, KeyCode::CAPSLOCK.code(), 1);
        let event = KeyEvent::from(raw);
        assert_eq!(event.kind, EventKind::Key);
        assert_eq!(event.key_code(), KeyCode::CAPSLOCK);
        assert_eq!(event.edge(), Some(Edge::Down));
    }
}
