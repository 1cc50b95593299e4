//! Shared types for the Ensemble pipeline engine.
//!
//! Everything here is plain data: identifiers, capability descriptors,
//! declarative pipeline definitions, per-invocation session state and the
//! events a run produces. Behaviour lives in `ensemble-pipeline`.

pub mod capability;
pub mod composition;
pub mod event;
pub mod ids;
pub mod state;

pub use capability::CapabilityDescriptor;
pub use composition::{
    CompositionKind, ExitCondition, FailurePolicy, MemberDefinition, PipelineDefinition,
    StageDefinition,
};
pub use event::{EventPayload, ExecutionEvent, InvokeError, UnitEvent};
pub use ids::{PipelineId, UnitInstanceId};
pub use state::{SessionState, StateDelta, Turn};
