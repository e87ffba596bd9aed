//! Assignment event dispatch.
//!
//! A job type holds an ordered list of handlers per event type. Dispatch runs
//! them in registration order and stops at the first failure, which is
//! returned to the caller as [`Error::Hook`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, HookError, Result};
use crate::model::{Assignment, AssignmentState, Job};

/// Handler invoked with the owning job and the assignment that changed.
pub type AssignmentHandler =
    Arc<dyn Fn(&Job, &Assignment) -> std::result::Result<(), HookError> + Send + Sync>;

/// Handler invoked once a job has finished.
pub type JobHandler = Arc<dyn Fn(&Job) -> std::result::Result<(), HookError> + Send + Sync>;

/// Assignment events handlers can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentEventType {
    Submitted,
    Approved,
    Rejected,
}

impl AssignmentEventType {
    /// The event announced when an assignment enters `state`, if any.
    pub fn for_state(state: AssignmentState) -> Option<Self> {
        match state {
            AssignmentState::Submitted => Some(Self::Submitted),
            AssignmentState::Approved => Some(Self::Approved),
            AssignmentState::Rejected => Some(Self::Rejected),
            AssignmentState::Error => None,
        }
    }
}

impl std::fmt::Display for AssignmentEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Default)]
pub struct AssignmentHooks {
    handlers: HashMap<AssignmentEventType, Vec<AssignmentHandler>>,
}

impl AssignmentHooks {
    /// Append a handler. Earlier registrations run first.
    pub fn register(&mut self, event: AssignmentEventType, handler: AssignmentHandler) {
        self.handlers.entry(event).or_default().push(handler);
    }

    pub fn handler_count(&self, event: AssignmentEventType) -> usize {
        self.handlers.get(&event).map_or(0, Vec::len)
    }

    /// Run every handler for `event`, in order. The first failure aborts.
    pub fn dispatch(
        &self,
        event: AssignmentEventType,
        job: &Job,
        assignment: &Assignment,
    ) -> Result<()> {
        let Some(handlers) = self.handlers.get(&event) else {
            return Ok(());
        };
        for handler in handlers {
            handler(job, assignment).map_err(|source| Error::Hook {
                event: event.to_string(),
                source,
            })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for AssignmentHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut counts: Vec<(AssignmentEventType, usize)> = self
            .handlers
            .iter()
            .map(|(event, handlers)| (*event, handlers.len()))
            .collect();
        counts.sort_by_key(|(event, _)| event.to_string());
        f.debug_struct("AssignmentHooks")
            .field("handlers", &counts)
            .finish()
    }
}
