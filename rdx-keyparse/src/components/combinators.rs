//! Functions that build patterns out of smaller patterns.
//!
//! `combine` forks: each of its children becomes an independent matcher whose
//! outcome does not depend on its siblings. The other combinators distribute
//! over a fork, e.g. `sequence([a, combine([b, c])])` is stored as
//! `combine([sequence([a, b]), sequence([a, c])])`.

use super::matcher::{Bind, Branch, Guard, Hold, Pattern, Within};
use crate::common::KeyCode;
use crate::dispatch::Action;
use crate::events::Edge;
use chrono::TimeDelta;
use std::sync::Arc;

/// One-shot gate: the next event must be a key-down of `key` (any key if `None`).
pub fn pressed(key: Option<KeyCode>) -> Pattern {
    Pattern::single(Branch::Gate(Guard {
        key,
        edge: Edge::Down,
    }))
}

/// One-shot gate: the next event must be a key-up of `key` (any key if `None`).
pub fn released(key: Option<KeyCode>) -> Pattern {
    Pattern::single(Branch::Gate(Guard { key, edge: Edge::Up }))
}

/// Skips events until a key-down of `key` arrives.
pub fn wait_pressed(key: Option<KeyCode>) -> Pattern {
    Pattern::single(Branch::Wait(Guard {
        key,
        edge: Edge::Down,
    }))
}

/// Skips events until a key-up of `key` arrives.
pub fn wait_released(key: Option<KeyCode>) -> Pattern {
    Pattern::single(Branch::Wait(Guard { key, edge: Edge::Up }))
}

/// Press then, eventually, release of the same key. Other keys may come and
/// go in between.
pub fn pushed(key: Option<KeyCode>) -> Pattern {
    sequence([pressed(key), wait_released(key)])
}

/// Runs `steps` strictly in order. Step n+1 is only instantiated once step n
/// completes, and it first sees the event after that completion.
///
/// An empty list, or any empty step, gives a pattern that never matches.
pub fn sequence(steps: impl IntoIterator<Item = Pattern>) -> Pattern {
    let mut chains: Vec<Vec<Branch>> = vec![Vec::new()];
    for step in steps {
        if step.is_empty() {
            return Pattern::from_branches(Vec::new());
        }
        chains = chains
            .iter()
            .flat_map(|chain| {
                step.branches.iter().map(move |branch| {
                    let mut chain = chain.clone();
                    match branch {
                        Branch::Sequence(inner) => chain.extend(inner.iter().cloned()),
                        other => chain.push(other.clone()),
                    }
                    chain
                })
            })
            .collect();
    }
    let branches = chains
        .into_iter()
        .filter_map(|mut chain| match chain.len() {
            0 => None,
            1 => chain.pop(),
            _ => Some(Branch::Sequence(chain.into())),
        })
        .collect();
    Pattern::from_branches(branches)
}

/// `times` consecutive matches of `pattern`, e.g. a double tap.
pub fn repeat(times: usize, pattern: Pattern) -> Pattern {
    sequence(std::iter::repeat(pattern).take(times))
}

/// Runs every pattern against the same events, independently of each other.
pub fn combine(patterns: impl IntoIterator<Item = Pattern>) -> Pattern {
    Pattern::from_branches(
        patterns
            .into_iter()
            .flat_map(|pattern| pattern.branches)
            .collect(),
    )
}

/// Fails if an event arrives more than `limit` after the first event the
/// body saw. Only checked when events arrive.
pub fn within(limit: TimeDelta, body: Pattern) -> Pattern {
    map_branches(body, |body| {
        Branch::Within(Arc::new(Within { limit, body }))
    })
}

/// Options for [`held_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoldOptions {
    /// Effect produced when the key is released before anything fired
    /// inside the scope (the "tap" half of a dual-function key).
    pub on_release: Option<Action>,
    /// Keep the scope open after the body completes, so the body can match
    /// again until the key is released.
    pub repeat: bool,
}

/// Scoped hold: a key-down of `key` enters the scope, which watches for the
/// release of `key` while `body` runs. The watcher is torn down on every
/// exit path.
///
/// Unlike the other combinators, `held` does not distribute over `combine`.
/// A forked body is a layer: every chord runs in the same scope and they
/// share one `on_release`, which only fires if no chord did.
pub fn held(key: KeyCode, body: Pattern) -> Pattern {
    held_with(key, body, HoldOptions::default())
}

pub fn held_with(key: KeyCode, body: Pattern, options: HoldOptions) -> Pattern {
    if body.is_empty() {
        return body;
    }
    Pattern::single(Branch::Held(Arc::new(Hold {
        key,
        body,
        on_release: options.on_release,
        repeat: options.repeat,
    })))
}

/// Names a pattern and binds it to an effect.
pub fn bind(rule: impl Into<String>, pattern: Pattern, action: Action) -> Pattern {
    bind_inner(rule.into(), pattern, action, None)
}

/// Like [`bind`], and seeds `then` as soon as the rule fires.
pub fn bind_then(
    rule: impl Into<String>,
    pattern: Pattern,
    action: Action,
    then: Pattern,
) -> Pattern {
    bind_inner(rule.into(), pattern, action, Some(then))
}

fn bind_inner(rule: String, pattern: Pattern, action: Action, then: Option<Pattern>) -> Pattern {
    map_branches(pattern, |body| {
        Branch::Bind(Arc::new(Bind {
            rule: rule.clone(),
            body,
            action: action.clone(),
            then: then.clone(),
        }))
    })
}

fn map_branches(pattern: Pattern, f: impl Fn(Branch) -> Branch) -> Pattern {
    Pattern::from_branches(pattern.branches.into_iter().map(f).collect())
}
