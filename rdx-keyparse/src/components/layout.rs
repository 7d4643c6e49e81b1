//! The user-facing policy layer: a fixed set of named rules, run together.

use super::combinators::{bind, bind_then, combine, pushed};
use super::matcher::{Matcher, Pattern};
use crate::common::KeyCode;
use crate::dispatch::Action;

/// A named pattern bound to an effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub action: Action,
    pattern: Pattern,
}

impl Rule {
    pub fn new(name: impl Into<String>, pattern: Pattern, action: Action) -> Self {
        let name = name.into();
        Self {
            pattern: bind(name.clone(), pattern, action.clone()),
            name,
            action,
        }
    }

    /// A rule that seeds `then` into the scheduler every time it fires.
    pub fn with_follow_up(
        name: impl Into<String>,
        pattern: Pattern,
        action: Action,
        then: Pattern,
    ) -> Self {
        let name = name.into();
        Self {
            pattern: bind_then(name.clone(), pattern, action.clone(), then),
            name,
            action,
        }
    }

    /// The bound pattern, completing with this rule's `Fired` value.
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }
}

/// A set of rules raced against the same event stream.
///
/// The scheduler re-seeds a fresh instance of the layout so that every rule
/// gets a new attempt; attempts already in flight are unaffected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    rules: Vec<Rule>,
    root: Pattern,
}

impl Layout {
    pub fn new(rules: Vec<Rule>) -> Self {
        let root = combine(rules.iter().map(|rule| rule.pattern().clone()));
        Self { rules, root }
    }

    /// Caps Lock pressed and released on its own emits Escape.
    pub fn caps2esc() -> Self {
        Self::new(vec![Rule::new(
            "caps2esc",
            pushed(Some(KeyCode::CAPSLOCK)),
            Action::Tap(KeyCode::ESC),
        )])
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn pattern(&self) -> &Pattern {
        &self.root
    }

    /// One fresh matcher per rule branch.
    pub fn instantiate(&self) -> Vec<Matcher> {
        Matcher::spawn(&self.root)
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::caps2esc()
    }
}
