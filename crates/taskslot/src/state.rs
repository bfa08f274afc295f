/*
[INPUT]:  TaskState, TaskEvent
[OUTPUT]: Validated lifecycle transitions for a task slot
[POS]:    Lifecycle logic - Idle/Active state machine shared by holder and completions
[UPDATE]: When lifecycle states or accepted events change
*/

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a task slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Idle,
    Active,
}

/// Events that drive a slot between states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    Start,
    Succeed,
    Fail,
    Cancel,
}

/// Errors occurring during state transitions
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("Invalid transition: {from:?} -> {event:?}")]
    InvalidTransition { from: TaskState, event: TaskEvent },
}

/// State machine for a single slot.
///
/// Transitions:
/// - Idle/Active -> Active (on start; an active generation is superseded)
/// - Active -> Idle (on succeed, fail or cancel)
/// - Idle -> Idle (on cancel)
///
/// Completions are only accepted while Active, so an operation finishing after
/// its slot was cancelled is rejected here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStateMachine {
    current_state: TaskState,
}

impl TaskStateMachine {
    pub fn new(initial: TaskState) -> Self {
        Self {
            current_state: initial,
        }
    }

    /// Check if the event is accepted in the current state
    pub fn can_transition(&self, event: &TaskEvent) -> bool {
        match (self.current_state, event) {
            (_, TaskEvent::Start) => true,
            (_, TaskEvent::Cancel) => true,
            (TaskState::Active, TaskEvent::Succeed) => true,
            (TaskState::Active, TaskEvent::Fail) => true,
            (TaskState::Idle, TaskEvent::Succeed | TaskEvent::Fail) => false,
        }
    }

    /// Perform a transition and return the new state
    pub fn transition(&mut self, event: TaskEvent) -> Result<TaskState, StateError> {
        if !self.can_transition(&event) {
            return Err(StateError::InvalidTransition {
                from: self.current_state,
                event,
            });
        }

        self.current_state = match event {
            TaskEvent::Start => TaskState::Active,
            TaskEvent::Succeed | TaskEvent::Fail | TaskEvent::Cancel => TaskState::Idle,
        };
        Ok(self.current_state)
    }

    pub fn state(&self) -> TaskState {
        self.current_state
    }
}
