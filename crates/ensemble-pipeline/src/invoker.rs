//! The unit-execution seam.
//!
//! The engine never decides what a unit computes. It hands each unit and its
//! input to a [`UnitInvoker`] supplied by the model/tool layer and consumes
//! the ordered stream of events that comes back.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use ensemble_types::{InvokeError, SessionState, UnitEvent};
use futures::Stream;

use crate::unit::CapabilityUnit;

/// Ordered output of one unit invocation. An `Err` item ends the invocation
/// as a failure.
pub type UnitEventStream = Pin<Box<dyn Stream<Item = Result<UnitEvent, InvokeError>> + Send>>;

/// Input handed to a unit.
#[derive(Debug, Clone)]
pub struct UnitInput {
    /// Request that started the run.
    pub request: String,
    /// Read-only view of the accumulated state.
    pub state: SessionState,
    /// Iteration number when running inside a loop.
    pub iteration: Option<u32>,
}

/// Invokes a capability unit.
#[async_trait]
pub trait UnitInvoker: Send + Sync {
    async fn invoke(
        &self,
        unit: &CapabilityUnit,
        input: UnitInput,
    ) -> Result<UnitEventStream, InvokeError>;
}

/// Shared invoker type for use across crates.
pub type SharedUnitInvoker = Arc<dyn UnitInvoker>;

/// Offline invoker that answers for every unit without a model backend.
///
/// Each invocation yields one event naming the unit, its capability and the
/// request, so compositions can be exercised end to end.
#[derive(Debug, Clone, Default)]
pub struct DryRunInvoker;

#[async_trait]
impl UnitInvoker for DryRunInvoker {
    async fn invoke(
        &self,
        unit: &CapabilityUnit,
        input: UnitInput,
    ) -> Result<UnitEventStream, InvokeError> {
        let mut text = format!("[{}] {}: {}", unit.name(), unit.capability(), input.request);
        if let Some(iteration) = input.iteration {
            text.push_str(&format!(" (iteration {iteration})"));
        }
        let tools = unit.descriptor().tools.len();
        let event = UnitEvent::text(text).with_state(
            format!("{}_tools", unit.capability()),
            serde_json::Value::from(tools),
        );
        Ok(Box::pin(futures::stream::iter(vec![Ok(event)])))
    }
}
