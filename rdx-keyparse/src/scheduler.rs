//! Drives every live matcher against each incoming event.
//!
//! The scheduler is the sole owner of the [`Generation`]. One call to
//! [`Scheduler::deliver`] is one full cycle: seed a fresh layout instance,
//! resume every live matcher once with the event, then reduce the outcomes
//! into the next generation. Nothing else touches the arena in between, so
//! there is no locking.

use crate::common::{KeyCode, MatcherId};
use crate::components::layout::Layout;
use crate::components::matcher::{Matcher, Outcome, Value};
use crate::config::{EngineConfig, ReseedPolicy};
use crate::dispatch::{Dispatcher, Fired};
use crate::events::{Edge, KeyEvent};
use slotmap::SlotMap;
use std::collections::HashSet;
use tracing::{debug, trace, warn};

/// Rule name used when a pattern outside any rule produces an effect.
pub const UNBOUND_RULE: &str = "<unbound>";

/// The set of matchers suspended and waiting for the next event.
#[derive(Debug, Default)]
pub struct Generation {
    matchers: SlotMap<MatcherId, Matcher>,
}

impl Generation {
    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn get(&self, id: MatcherId) -> Option<&Matcher> {
        self.matchers.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MatcherId, &Matcher)> {
        self.matchers.iter()
    }

    /// Whether any live hold scope is waiting for `key` to be released.
    pub fn watches_release_of(&self, key: KeyCode) -> bool {
        self.matchers
            .values()
            .any(|matcher| matcher.watched_releases().contains(&key))
    }

    fn insert(&mut self, matcher: Matcher) -> MatcherId {
        self.matchers.insert(matcher)
    }

    /// Ids in reduce order: by slot, not by age.
    fn ordered_ids(&self) -> Vec<MatcherId> {
        let mut ids: Vec<MatcherId> = self.matchers.keys().collect();
        ids.sort();
        ids
    }
}

/// What happened during one delivery cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub seeded: usize,
    pub resumed: usize,
    pub suspended: usize,
    pub completed: usize,
    pub failed: usize,
    pub spawned: usize,
    pub deduplicated: usize,
    /// Every value handed to the dispatcher, in dispatch order.
    pub fired: Vec<Fired>,
    pub dispatch_errors: usize,
    /// Size of the generation after the cycle.
    pub live: usize,
}

/// Owns the layout, the live generation and the dispatcher.
pub struct Scheduler<D> {
    layout: Layout,
    reseed: ReseedPolicy,
    dedupe: bool,
    generation: Generation,
    dispatcher: D,
}

impl<D: Dispatcher> Scheduler<D> {
    /// Creates a scheduler with the default engine settings.
    pub fn new(layout: Layout, dispatcher: D) -> Self {
        Self::with_config(layout, dispatcher, &EngineConfig::default())
    }

    pub fn with_config(layout: Layout, dispatcher: D, config: &EngineConfig) -> Self {
        Self {
            layout,
            reseed: config.reseed,
            dedupe: config.dedupe,
            generation: Generation::default(),
            dispatcher,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut D {
        &mut self.dispatcher
    }

    /// Removes a live matcher without running any effect it would have had.
    pub fn cancel(&mut self, id: MatcherId) -> Option<Matcher> {
        let cancelled = self.generation.matchers.remove(id);
        if cancelled.is_some() {
            debug!(?id, "Matcher cancelled.");
        }
        cancelled
    }

    /// Drops every in-flight attempt.
    pub fn clear(&mut self) {
        self.generation.matchers.clear();
    }

    /// Runs one full cycle for `event`.
    pub fn deliver(&mut self, event: &KeyEvent) -> CycleReport {
        self.deliver_ordered(event, |_| {})
    }

    /// Like [`deliver`](Self::deliver), letting the caller permute the order
    /// in which matchers are resumed. The result must not depend on it.
    pub(crate) fn deliver_ordered(
        &mut self,
        event: &KeyEvent,
        arrange: impl FnOnce(&mut Vec<MatcherId>),
    ) -> CycleReport {
        let mut report = CycleReport::default();

        // 1. Seed.
        if self.should_seed(event) {
            for matcher in self.layout.instantiate() {
                if self.dedupe && self.generation.matchers.values().any(|live| *live == matcher) {
                    report.deduplicated += 1;
                    continue;
                }
                self.generation.insert(matcher);
                report.seeded += 1;
            }
        }

        // 2. Resume every live matcher exactly once.
        let mut ids: Vec<MatcherId> = self.generation.matchers.keys().collect();
        arrange(&mut ids);
        let mut outcomes: Vec<(MatcherId, Outcome)> = ids
            .into_iter()
            .filter_map(|id| {
                self.generation
                    .get(id)
                    .map(|matcher| (id, matcher.resume(event)))
            })
            .collect();
        report.resumed = outcomes.len();

        // 3. Reduce in id order, whatever order the resumes ran in.
        outcomes.sort_by_key(|(id, _)| *id);
        let mut follow_ups = Vec::new();
        for (id, outcome) in outcomes {
            match outcome {
                Outcome::Suspended(next) => {
                    if let Some(slot) = self.generation.matchers.get_mut(id) {
                        *slot = next;
                    }
                    report.suspended += 1;
                }
                Outcome::Completed {
                    value,
                    follow_ups: spawned,
                } => {
                    self.generation.matchers.remove(id);
                    report.completed += 1;
                    self.dispatch(value, &mut report);
                    follow_ups.extend(spawned);
                }
                Outcome::Failed => {
                    self.generation.matchers.remove(id);
                    report.failed += 1;
                }
            }
        }
        for matcher in follow_ups {
            self.generation.insert(matcher);
            report.spawned += 1;
        }

        // 4. Repetition guard.
        if self.dedupe {
            report.deduplicated += self.remove_duplicates();
        }

        report.live = self.generation.len();
        trace!(
            seeded = report.seeded,
            resumed = report.resumed,
            completed = report.completed,
            failed = report.failed,
            live = report.live,
            "Cycle complete."
        );
        report
    }

    fn should_seed(&self, event: &KeyEvent) -> bool {
        match self.reseed {
            ReseedPolicy::EveryEvent => true,
            ReseedPolicy::KeyDown => event.edge() == Some(Edge::Down),
        }
    }

    fn dispatch(&mut self, value: Value, report: &mut CycleReport) {
        let fired = match value {
            Value::Fired(fired) => fired,
            Value::Effect(action) => Fired::new(UNBOUND_RULE, action),
            Value::Key(key) => {
                trace!(%key, "Unbound pattern completed.");
                return;
            }
        };
        debug!(rule = %fired.rule, "Rule fired: {}", fired.action);
        if let Err(e) = self.dispatcher.dispatch(&fired) {
            warn!(rule = %fired.rule, "Dispatch failed: {}", e);
            report.dispatch_errors += 1;
        }
        report.fired.push(fired);
    }

    /// Identical states have identical futures; keep the lowest id of each.
    /// Slots are reused, so the lowest id is not necessarily the oldest.
    fn remove_duplicates(&mut self) -> usize {
        let ids = self.generation.ordered_ids();
        let mut seen = HashSet::with_capacity(ids.len());
        let duplicates: Vec<MatcherId> = ids
            .into_iter()
            .filter(|id| !seen.insert(&self.generation.matchers[*id]))
            .collect();
        drop(seen);
        for id in &duplicates {
            self.generation.matchers.remove(*id);
        }
        duplicates.len()
    }
}
