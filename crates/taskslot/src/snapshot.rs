/*
[INPUT]:  Holder lifecycle updates (start, completion, cancellation)
[OUTPUT]: Snapshot-friendly slot state for observers and view selection
[POS]:    Shared observable state between the holder, its operations and readers
[UPDATE]: When adding/removing observable slot fields
*/

use std::fmt;

use crate::config::Priority;
use crate::state::TaskState;

/// Launch counter of a holder; every start begins a new generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub const ZERO: Generation = Generation(0);

    pub fn get(self) -> u64 {
        self.0
    }

    pub(crate) fn next(self) -> Generation {
        Generation(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result slot: at most one of value or error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<V, E> {
    Empty,
    Value(V),
    Error(E),
}

impl<V, E> Default for Outcome<V, E> {
    fn default() -> Self {
        Outcome::Empty
    }
}

impl<V, E> Outcome<V, E> {
    pub fn value(&self) -> Option<&V> {
        match self {
            Outcome::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Outcome::Error(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Outcome::Empty)
    }
}

/// How the latest generation ended.
///
/// Distinguishes a failure that could not be mapped (no error recorded) from
/// a cancellation, which look the same through `value`/`error` alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ending {
    Succeeded,
    Failed,
    Cancelled,
}

/// What a presentation layer should show for a snapshot.
#[derive(Debug, PartialEq, Eq)]
pub enum Presentation<'a, V, E> {
    Idle,
    Loading,
    Value(&'a V),
    Error(&'a E),
}

/// Point-in-time view of a holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot<V, E> {
    pub(crate) state: TaskState,
    pub(crate) outcome: Outcome<V, E>,
    pub(crate) generation: Generation,
    pub(crate) ending: Option<Ending>,
    pub(crate) priority: Priority,
}

impl<V, E> Default for TaskSnapshot<V, E> {
    fn default() -> Self {
        Self {
            state: TaskState::Idle,
            outcome: Outcome::Empty,
            generation: Generation::ZERO,
            ending: None,
            priority: Priority::default(),
        }
    }
}

impl<V, E> TaskSnapshot<V, E> {
    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TaskState::Active
    }

    pub fn outcome(&self) -> &Outcome<V, E> {
        &self.outcome
    }

    pub fn value(&self) -> Option<&V> {
        self.outcome.value()
    }

    pub fn error(&self) -> Option<&E> {
        self.outcome.error()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn ending(&self) -> Option<Ending> {
        self.ending
    }

    /// Priority of the latest generation
    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn presentation(&self) -> Presentation<'_, V, E> {
        if self.is_active() {
            return Presentation::Loading;
        }
        match &self.outcome {
            Outcome::Empty => Presentation::Idle,
            Outcome::Value(value) => Presentation::Value(value),
            Outcome::Error(error) => Presentation::Error(error),
        }
    }
}
