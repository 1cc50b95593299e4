//! Execution events and the unit-level output contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::StateDelta;

/// One event emitted by a unit during invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitEvent {
    pub text: String,
    #[serde(default, skip_serializing_if = "StateDelta::is_empty")]
    pub state_delta: StateDelta,
    /// Signals an enclosing loop that its work is done.
    #[serde(default)]
    pub escalate: bool,
}

impl UnitEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_state(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.state_delta.insert(key.into(), value.into());
        self
    }

    pub fn escalate(mut self) -> Self {
        self.escalate = true;
        self
    }
}

/// Failure reported by the unit-execution layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvokeError {
    #[error("Unit invocation failed: {0}")]
    Failed(String),

    #[error("Unit unavailable: {0}")]
    Unavailable(String),
}

impl InvokeError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Payload of an [`ExecutionEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Output produced by a unit.
    Output {
        text: String,
        #[serde(default, skip_serializing_if = "StateDelta::is_empty")]
        state_delta: StateDelta,
        #[serde(default)]
        escalate: bool,
    },
    /// A parallel branch failed and the pipeline continued without it.
    BranchFailed { member: String, message: String },
    /// A loop finished one iteration.
    IterationCompleted { iteration: u32, exit: bool },
    /// Informational message not produced by any unit.
    Notice { text: String },
}

/// An event in the ordered stream of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    /// Position in the run's stream, starting at 0, strictly increasing.
    pub seq: u64,
    /// Unit name (or pipeline name for structural events).
    pub producer: String,
    /// Name of the innermost pipeline the event was produced in.
    pub pipeline: String,
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionEvent {
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Output { text, .. } | EventPayload::Notice { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_escalation(&self) -> bool {
        matches!(self.payload, EventPayload::Output { escalate: true, .. })
    }
}
