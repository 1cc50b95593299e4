//! Dynamic dispatch: classify a free-text request, assemble an ad hoc
//! pipeline from fresh units and run it.
//!
//! ```text
//! request ──▶ IntentTable ──▶ Classification ──▶ CapabilityCatalog::create_unit
//!                                                     │ (unknown ids skipped)
//!                                                     ▼
//!                              ExecutionEngine ◀── PipelineBuilder
//! ```

use std::sync::Arc;

use ensemble_pipeline::{CapabilityCatalog, CapabilityUnit, Execution, ExecutionEngine, Pipeline};
use ensemble_types::{CompositionKind, SessionState};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::intent::{Classification, IntentTable};

/// Producer name used for dispatcher notices.
const DISPATCHER: &str = "dynamic_dispatcher";

/// State key under which the chosen members, pattern and request are recorded.
pub const DISPATCH_STATE_KEY: &str = "dynamic_pipeline";

#[derive(Clone)]
pub struct DynamicDispatcher {
    catalog: Arc<CapabilityCatalog>,
    engine: ExecutionEngine,
    intents: Arc<IntentTable>,
    name_suffix: String,
}

impl DynamicDispatcher {
    pub fn new(
        catalog: Arc<CapabilityCatalog>,
        engine: ExecutionEngine,
        intents: IntentTable,
        name_suffix: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            engine,
            intents: Arc::new(intents),
            name_suffix: name_suffix.into(),
        }
    }

    pub fn classify(&self, request: &str) -> Classification {
        self.intents.classify(request)
    }

    /// Parallel when the request names a parallel trigger, sequential otherwise.
    pub fn determine_pattern(&self, request: &str) -> CompositionKind {
        self.intents.pattern(request)
    }

    /// The request to dispatch: the explicit one if non-empty, otherwise the
    /// most recent non-empty turn in the session history.
    pub fn resolve_request(&self, request: Option<&str>, state: &SessionState) -> Option<String> {
        request
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .or_else(|| state.latest_turn_text())
            .map(str::to_string)
    }

    /// Classify `request`, build an ad hoc pipeline and run it.
    ///
    /// Never fails: when there is nothing to dispatch, or none of the chosen
    /// capabilities can be constructed, the execution carries a single notice
    /// instead.
    pub fn run_dynamic(&self, request: &str, mut state: SessionState) -> Execution {
        let Some(request) = self.resolve_request(Some(request), &state) else {
            return self.engine.notice(
                DISPATCHER,
                "No request to dispatch: the request is empty and the session has no history.",
                state,
            );
        };

        let classification = self.classify(&request);
        info!(
            members = ?classification.members,
            pattern = %classification.pattern,
            fallback = classification.fallback,
            "Classified request"
        );

        let units = self.build_units(&classification.members);
        if units.is_empty() {
            let available = self.catalog.ids().join(", ");
            warn!(members = ?classification.members, "No requested capability could be built");
            return self.engine.notice(
                DISPATCHER,
                format!(
                    "No matching capabilities are available. Available capabilities: {available}"
                ),
                state,
            );
        }

        let members: Vec<&str> = units.iter().map(|u| u.capability()).collect();
        let name = format!("dynamic-{}-{}", classification.pattern, units.len());
        state.set(
            DISPATCH_STATE_KEY,
            json!({
                "members": members,
                "pattern": classification.pattern,
                "request": request,
            }),
        );

        match Pipeline::builder(&name)
            .description(format!("Ad hoc pipeline for: {request}"))
            .kind(classification.pattern)
            .members(units)
            .build()
        {
            Ok(pipeline) => self.engine.run(pipeline, request, state),
            Err(err) => {
                warn!(pipeline = %name, error = %err, "Failed to assemble ad hoc pipeline");
                self.engine
                    .notice(DISPATCHER, format!("Could not assemble a pipeline: {err}"), state)
            }
        }
    }

    /// Fresh units for each id, skipping ids the catalog cannot construct.
    fn build_units(&self, ids: &[String]) -> Vec<CapabilityUnit> {
        ids.iter()
            .filter_map(|id| match self.catalog.create_unit(id, Some(&self.name_suffix)) {
                Ok(unit) => {
                    debug!(capability = %id, unit = %unit.name(), "Built unit for dispatch");
                    Some(unit)
                }
                Err(err) => {
                    warn!(capability = %id, error = %err, "Skipping capability");
                    None
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for DynamicDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicDispatcher")
            .field("intents", &self.intents)
            .field("name_suffix", &self.name_suffix)
            .finish_non_exhaustive()
    }
}
