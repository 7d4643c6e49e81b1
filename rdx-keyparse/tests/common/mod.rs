//! Helpers shared by the scenario tests.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use keyparse::prelude::*;
use rand::Rng;

/// A timestamp `millis` after the epoch.
pub fn at(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap()
}

pub fn down(code: KeyCode, millis: i64) -> KeyEvent {
    KeyEvent::key(code, Edge::Down, at(millis))
}

pub fn up(code: KeyCode, millis: i64) -> KeyEvent {
    KeyEvent::key(code, Edge::Up, at(millis))
}

/// A scheduler recording everything it dispatches.
pub fn recording(layout: Layout) -> Scheduler<RecordingDispatcher> {
    Scheduler::new(layout, RecordingDispatcher::new())
}

/// Feeds every event and returns what was dispatched, in order.
pub fn feed(scheduler: &mut Scheduler<RecordingDispatcher>, events: &[KeyEvent]) -> Vec<Fired> {
    for event in events {
        scheduler.deliver(event);
    }
    scheduler.dispatcher_mut().take()
}

/// One random event from a keyboard that never touches `avoid`.
///
/// Mixes key downs, ups and autorepeats with the sync and scan-code events a
/// real keyboard interleaves.
pub fn noise_event(rng: &mut impl Rng, avoid: &[KeyCode], millis: i64) -> KeyEvent {
    match rng.gen_range(0..10) {
        0 => KeyEvent {
            kind: EventKind::Sync,
            code: 0,
            value: 0,
            timestamp: at(millis),
        },
        1 => KeyEvent {
            kind: EventKind::Misc,
            code: 4,
            value: rng.gen_range(0x70000..0x700ff),
            timestamp: at(millis),
        },
        _ => {
            let code = loop {
                let candidate = KeyCode(rng.gen_range(1..=248));
                if !avoid.contains(&candidate) {
                    break candidate;
                }
            };
            let edge = match rng.gen_range(0..3) {
                0 => Edge::Down,
                1 => Edge::Up,
                _ => Edge::Repeat,
            };
            KeyEvent::key(code, edge, at(millis))
        }
    }
}
