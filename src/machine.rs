//! Transition tables and the small driver that evaluates them.
//!
//! A machine is a static table of rows `(event, source states, target state,
//! guard)` plus entry actions keyed by target state. Rows are tried in order;
//! the first row whose event matches, whose source set contains the current
//! state and whose guard passes wins. Entry actions are plain functions of the
//! record that return the side effects to schedule; the driver never performs
//! them itself.

use std::fmt::Display;

use crate::error::{Error, Result};

/// Guard predicate evaluated against the record before a row is taken.
pub type Guard<R> = fn(&R) -> bool;

/// One row of a transition table.
pub struct Transition<S: 'static, E, R> {
    pub event: E,
    pub from: &'static [S],
    pub to: S,
    pub guard: Option<Guard<R>>,
}

/// Work produced on entry to `state`.
pub struct EntryAction<S, R, A> {
    pub state: S,
    pub action: fn(&R) -> Vec<A>,
}

/// A transition table with its entry actions.
pub struct StateMachine<S: 'static, E: 'static, R: 'static, A: 'static> {
    pub name: &'static str,
    pub transitions: &'static [Transition<S, E, R>],
    pub entry_actions: &'static [EntryAction<S, R, A>],
}

/// A resolved transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired<S> {
    pub from: S,
    pub to: S,
}

impl<S: PartialEq> Fired<S> {
    /// False for self-loops such as a guarded `launch` that stays in `new`.
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

impl<S, E, R, A> StateMachine<S, E, R, A>
where
    S: Copy + PartialEq + Display,
    E: Copy + PartialEq + Display,
{
    /// Resolve `event` from `current`. Does not mutate anything.
    pub fn fire(&self, current: S, event: E, record: &R) -> Result<Fired<S>> {
        self.transitions
            .iter()
            .filter(|row| row.event == event && row.from.contains(&current))
            .find(|row| row.guard.is_none_or(|guard| guard(record)))
            .map(|row| Fired {
                from: current,
                to: row.to,
            })
            .ok_or_else(|| Error::NoTransitionFound {
                machine: self.name,
                event: event.to_string(),
                state: current.to_string(),
            })
    }

    /// Side effects for entering `fired.to`. Empty when the state did not change.
    pub fn entry_actions(&self, fired: &Fired<S>, record: &R) -> Vec<A> {
        if !fired.changed() {
            return Vec::new();
        }
        self.entry_actions
            .iter()
            .filter(|entry| entry.state == fired.to)
            .flat_map(|entry| (entry.action)(record))
            .collect()
    }

    /// Events that have at least one row leaving `state`, in table order.
    pub fn events_from(&self, state: S) -> Vec<E> {
        let mut events: Vec<E> = Vec::new();
        for row in self.transitions {
            if row.from.contains(&state) && !events.contains(&row.event) {
                events.push(row.event);
            }
        }
        events
    }
}
