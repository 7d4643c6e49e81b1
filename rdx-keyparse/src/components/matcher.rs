//! The suspendable matcher primitive.
//!
//! A [`Pattern`] is immutable combinator logic, shared through `Arc`s. A
//! [`Matcher`] is one live attempt at a pattern: a reference to the logic
//! plus the least progress data needed to continue. Resuming a matcher with
//! an event never mutates it; it returns an [`Outcome`] holding the next
//! state, so a generation can be inspected, compared and deduplicated.
//!
//! A pattern is stored as a set of independent branches. `combine` forks, and
//! the other combinators distribute over the fork, so instantiating a branch
//! always yields one matcher. A hold is the exception: its whole body, fork
//! included, runs inside one scope so that the chords of a layer share a
//! single release watcher.

use crate::common::KeyCode;
use crate::dispatch::{Action, Fired};
use crate::events::{Edge, EventKind, KeyEvent};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;

/// The event test shared by every primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guard {
    /// `None` accepts any code; the test is then only on kind and edge.
    pub key: Option<KeyCode>,
    pub edge: Edge,
}

impl Guard {
    pub fn accepts(&self, event: &KeyEvent) -> bool {
        event.kind == EventKind::Key
            && event.edge() == Some(self.edge)
            && self.key.map_or(true, |key| key.code() == event.code)
    }
}

/// Immutable combinator logic. Build one with the functions in
/// [`combinators`](super::combinators).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    pub(crate) branches: Vec<Branch>,
}

impl Pattern {
    pub(crate) fn from_branches(branches: Vec<Branch>) -> Self {
        Self { branches }
    }

    pub(crate) fn single(branch: Branch) -> Self {
        Self {
            branches: vec![branch],
        }
    }

    /// How many independent matchers one instantiation of this pattern yields.
    pub fn width(&self) -> usize {
        self.branches.len()
    }

    /// A pattern with no branches never matches anything.
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Branch {
    Gate(Guard),
    Wait(Guard),
    Sequence(Arc<[Branch]>),
    Held(Arc<Hold>),
    Within(Arc<Within>),
    Bind(Arc<Bind>),
}

#[derive(Debug, PartialEq, Eq, Hash)]
pub(crate) struct Hold {
    pub key: KeyCode,
    /// Every chord of the layer; never empty.
    pub body: Pattern,
    pub on_release: Option<Action>,
    pub repeat: bool,
}

#[derive(Debug, PartialEq, Eq, Hash)]
pub(crate) struct Within {
    pub limit: TimeDelta,
    pub body: Branch,
}

#[derive(Debug, PartialEq, Eq, Hash)]
pub(crate) struct Bind {
    pub rule: String,
    pub body: Branch,
    pub action: Action,
    pub then: Option<Pattern>,
}

/// What a completed matcher produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// The code accepted by the last primitive.
    Key(KeyCode),
    /// An effect chosen inside a pattern, e.g. a hold's tap action.
    Effect(Action),
    /// A bound rule completed; this is what the dispatcher receives.
    Fired(Fired),
}

/// The result of resuming a matcher with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Still waiting; this state replaces the old one.
    Suspended(Matcher),
    /// Done. `follow_ups` are seeded into the next generation.
    Completed {
        value: Value,
        follow_ups: Vec<Matcher>,
    },
    /// The event did not satisfy the pattern. The attempt is over.
    Failed,
}

impl Outcome {
    fn done(value: Value) -> Self {
        Outcome::Completed {
            value,
            follow_ups: Vec::new(),
        }
    }
}

/// One live attempt at matching a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Matcher(State);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum State {
    Gate(Guard),
    Wait(Guard),
    Sequence {
        steps: Arc<[Branch]>,
        index: usize,
        current: Box<Matcher>,
    },
    Hold {
        hold: Arc<Hold>,
        scope: Option<Scope>,
    },
    Within {
        within: Arc<Within>,
        started: Option<DateTime<Utc>>,
        body: Box<Matcher>,
    },
    Bind {
        bind: Arc<Bind>,
        body: Box<Matcher>,
    },
}

/// An entered hold: the armed release watcher and the chords running inside it.
///
/// `bodies` lines up with the branches of the hold's body. A `None` slot is a
/// chord that failed in a non-repeating hold. `fired` is shared by every
/// chord: once any of them fires, releasing the key is no longer a tap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Scope {
    watcher: Box<Matcher>,
    bodies: Vec<Option<Matcher>>,
    fired: bool,
}

impl Scope {
    fn enter(hold: &Hold, fired: bool) -> Self {
        Self::with_bodies(
            hold,
            Matcher::spawn(&hold.body).into_iter().map(Some).collect(),
            fired,
        )
    }

    fn with_bodies(hold: &Hold, bodies: Vec<Option<Matcher>>, fired: bool) -> Self {
        Self {
            watcher: Box::new(Matcher(State::Wait(Guard {
                key: Some(hold.key),
                edge: Edge::Up,
            }))),
            bodies,
            fired,
        }
    }
}

impl Matcher {
    /// Instantiates every branch of `pattern` as an independent matcher.
    pub fn spawn(pattern: &Pattern) -> Vec<Matcher> {
        pattern.branches.iter().map(Matcher::start).collect()
    }

    pub(crate) fn start(branch: &Branch) -> Matcher {
        let state = match branch {
            Branch::Gate(guard) => State::Gate(*guard),
            Branch::Wait(guard) => State::Wait(*guard),
            Branch::Sequence(steps) => State::Sequence {
                steps: Arc::clone(steps),
                index: 0,
                current: Box::new(Matcher::start(&steps[0])),
            },
            Branch::Held(hold) => State::Hold {
                hold: Arc::clone(hold),
                scope: None,
            },
            Branch::Within(within) => State::Within {
                within: Arc::clone(within),
                started: None,
                body: Box::new(Matcher::start(&within.body)),
            },
            Branch::Bind(bind) => State::Bind {
                bind: Arc::clone(bind),
                body: Box::new(Matcher::start(&bind.body)),
            },
        };
        Matcher(state)
    }

    /// Feeds one event to this attempt.
    pub fn resume(&self, event: &KeyEvent) -> Outcome {
        match &self.0 {
            State::Gate(guard) => {
                if guard.accepts(event) {
                    Outcome::done(Value::Key(event.key_code()))
                } else {
                    Outcome::Failed
                }
            }
            State::Wait(guard) => {
                if guard.accepts(event) {
                    Outcome::done(Value::Key(event.key_code()))
                } else {
                    Outcome::Suspended(self.clone())
                }
            }
            State::Sequence {
                steps,
                index,
                current,
            } => match current.resume(event) {
                Outcome::Suspended(next) => Outcome::Suspended(Matcher(State::Sequence {
                    steps: Arc::clone(steps),
                    index: *index,
                    current: Box::new(next),
                })),
                Outcome::Failed => Outcome::Failed,
                // A sequence consumes the first completion of each step; a
                // middle step's follow-ups are cancelled along with it.
                Outcome::Completed { value, follow_ups } => {
                    let next = index + 1;
                    if next == steps.len() {
                        Outcome::Completed { value, follow_ups }
                    } else {
                        Outcome::Suspended(Matcher(State::Sequence {
                            steps: Arc::clone(steps),
                            index: next,
                            current: Box::new(Matcher::start(&steps[next])),
                        }))
                    }
                }
            },
            State::Hold { hold, scope: None } => {
                let gate = Guard {
                    key: Some(hold.key),
                    edge: Edge::Down,
                };
                if gate.accepts(event) {
                    Outcome::Suspended(Matcher(State::Hold {
                        hold: Arc::clone(hold),
                        scope: Some(Scope::enter(hold, false)),
                    }))
                } else {
                    Outcome::Failed
                }
            }
            State::Hold {
                hold,
                scope: Some(scope),
            } => resume_scope(hold, scope, event),
            State::Within {
                within,
                started,
                body,
            } => {
                let started = started.unwrap_or(event.timestamp);
                if event.timestamp.signed_duration_since(started) > within.limit {
                    return Outcome::Failed;
                }
                let wrap = |body: Matcher| {
                    Matcher(State::Within {
                        within: Arc::clone(within),
                        started: Some(started),
                        body: Box::new(body),
                    })
                };
                match body.resume(event) {
                    Outcome::Suspended(next) => Outcome::Suspended(wrap(next)),
                    Outcome::Failed => Outcome::Failed,
                    Outcome::Completed { value, follow_ups } => Outcome::Completed {
                        value,
                        follow_ups: follow_ups.into_iter().map(wrap).collect(),
                    },
                }
            }
            State::Bind { bind, body } => {
                let wrap = |body: Matcher| {
                    Matcher(State::Bind {
                        bind: Arc::clone(bind),
                        body: Box::new(body),
                    })
                };
                match body.resume(event) {
                    Outcome::Suspended(next) => Outcome::Suspended(wrap(next)),
                    Outcome::Failed => Outcome::Failed,
                    Outcome::Completed { value, follow_ups } => {
                        let fired = match value {
                            Value::Fired(inner) => inner,
                            Value::Effect(action) => Fired::new(bind.rule.clone(), action),
                            Value::Key(_) => Fired::new(bind.rule.clone(), bind.action.clone()),
                        };
                        let mut follow_ups: Vec<Matcher> =
                            follow_ups.into_iter().map(wrap).collect();
                        if let Some(then) = &bind.then {
                            follow_ups.extend(Matcher::spawn(then));
                        }
                        Outcome::Completed {
                            value: Value::Fired(fired),
                            follow_ups,
                        }
                    }
                }
            }
        }
    }

    /// Keys whose release some hold scope inside this matcher is waiting for.
    pub fn watched_releases(&self) -> Vec<KeyCode> {
        let mut keys = Vec::new();
        self.collect_watched(&mut keys);
        keys
    }

    fn collect_watched(&self, keys: &mut Vec<KeyCode>) {
        match &self.0 {
            State::Gate(_) | State::Wait(_) => {}
            State::Sequence { current, .. } => current.collect_watched(keys),
            State::Hold { scope, .. } => {
                if let Some(scope) = scope {
                    if let State::Wait(Guard { key: Some(key), .. }) = &scope.watcher.0 {
                        keys.push(*key);
                    }
                    for body in scope.bodies.iter().flatten() {
                        body.collect_watched(keys);
                    }
                }
            }
            State::Within { body, .. } | State::Bind { body, .. } => body.collect_watched(keys),
        }
    }

    /// The name of the outermost rule this attempt belongs to, if any.
    pub fn rule(&self) -> Option<&str> {
        match &self.0 {
            State::Bind { bind, .. } => Some(&bind.rule),
            State::Sequence { current, .. } => current.rule(),
            State::Within { body, .. } => body.rule(),
            _ => None,
        }
    }
}

fn resume_scope(hold: &Arc<Hold>, scope: &Scope, event: &KeyEvent) -> Outcome {
    let in_scope = |bodies: Vec<Option<Matcher>>, fired: bool| {
        Matcher(State::Hold {
            hold: Arc::clone(hold),
            scope: Some(Scope::with_bodies(hold, bodies, fired)),
        })
    };

    // The release watcher sees the event first: a release ends the scope and
    // cancels whatever the chords were doing.
    if let Outcome::Completed { .. } = scope.watcher.resume(event) {
        return match (&hold.on_release, scope.fired) {
            (Some(action), false) => Outcome::done(Value::Effect(action.clone())),
            _ => Outcome::Failed,
        };
    }
    // Autorepeat of the held key belongs to the scope, not to the chords.
    if event.kind == EventKind::Key
        && event.code == hold.key.code()
        && event.edge() == Some(Edge::Repeat)
    {
        return Outcome::Suspended(in_scope(scope.bodies.clone(), scope.fired));
    }

    // One chord fires per event; on a tie the first chord of the body wins.
    let mut completion = None;
    let mut follow_ups = Vec::new();
    let mut bodies = Vec::with_capacity(scope.bodies.len());
    for (branch, body) in hold.body.branches.iter().zip(&scope.bodies) {
        let Some(body) = body else {
            bodies.push(None);
            continue;
        };
        match body.resume(event) {
            Outcome::Suspended(next) => bodies.push(Some(next)),
            Outcome::Failed if hold.repeat => bodies.push(Some(Matcher::start(branch))),
            Outcome::Failed => bodies.push(None),
            Outcome::Completed {
                value,
                follow_ups: spawned,
            } => {
                if completion.is_none() {
                    completion = Some(value);
                }
                follow_ups.extend(spawned);
                bodies.push(Some(Matcher::start(branch)));
            }
        }
    }

    match completion {
        Some(value) => {
            if hold.repeat {
                follow_ups.push(in_scope(bodies, true));
            }
            Outcome::Completed { value, follow_ups }
        }
        None if bodies.iter().all(Option::is_none) => Outcome::Failed,
        None => Outcome::Suspended(in_scope(bodies, scope.fired)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::combinators::{
        pressed, released, wait_pressed, wait_released,
    };
    use chrono::Utc;

    fn key(code: KeyCode, edge: Edge) -> KeyEvent {
        KeyEvent::key(code, edge, Utc::now())
    }

    fn only(pattern: &Pattern) -> Matcher {
        let mut matchers = Matcher::spawn(pattern);
        assert_eq!(matchers.len(), 1);
        matchers.remove(0)
    }

    #[test]
    fn pressed_fails_on_anything_else() {
        let matcher = only(&pressed(Some(KeyCode::A)));
        let noise = [
            key(KeyCode::A, Edge::Up),
            key(KeyCode::A, Edge::Repeat),
            key(KeyCode::B, Edge::Down),
            KeyEvent {
                kind: EventKind::Sync,
                code: 0,
                value: 0,
                timestamp: Utc::now(),
            },
        ];
        for event in noise {
            assert_eq!(matcher.resume(&event), Outcome::Failed, "{event:?}");
        }
    }

    #[test]
    fn pressed_any_accepts_any_code() {
        let matcher = only(&pressed(None));
        assert_eq!(
            matcher.resume(&key(KeyCode::B, Edge::Down)),
            Outcome::done(Value::Key(KeyCode::B))
        );
    }

    #[test]
    fn released_is_a_one_shot_gate() {
        let matcher = only(&released(Some(KeyCode::A)));
        assert_eq!(matcher.resume(&key(KeyCode::A, Edge::Down)), Outcome::Failed);
        assert!(matches!(
            matcher.resume(&key(KeyCode::A, Edge::Up)),
            Outcome::Completed { .. }
        ));
    }

    #[test]
    fn wait_pressed_never_times_out() {
        let mut matcher = only(&wait_pressed(Some(KeyCode::A)));
        for _ in 0..1_000 {
            matcher = match matcher.resume(&key(KeyCode::B, Edge::Down)) {
                Outcome::Suspended(next) => next,
                other => panic!("expected suspension, got {other:?}"),
            };
        }
        assert_eq!(
            matcher.resume(&key(KeyCode::A, Edge::Down)),
            Outcome::done(Value::Key(KeyCode::A))
        );
    }

    #[test]
    fn wait_released_ignores_presses() {
        let matcher = only(&wait_released(None));
        let next = match matcher.resume(&key(KeyCode::A, Edge::Down)) {
            Outcome::Suspended(next) => next,
            other => panic!("expected suspension, got {other:?}"),
        };
        assert_eq!(next, matcher);
        assert!(matches!(
            next.resume(&key(KeyCode::H, Edge::Up)),
            Outcome::Completed { .. }
        ));
    }
}
