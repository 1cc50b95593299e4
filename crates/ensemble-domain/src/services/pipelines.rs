//! Catalog pipeline service.

use std::sync::Arc;

use ensemble_pipeline::{
    DefinitionCompiler, Execution, ExecutionEngine, Pipeline, PipelineError, PipelineFactory,
    PipelineMetadata, PipelineRegistry, StatusReport,
};
use ensemble_types::{PipelineDefinition, SessionState};
use tracing::{debug, info};

use crate::error::Result;

/// Category assigned to user-defined pipelines that don't name one.
pub const CUSTOM_CATEGORY: &str = "Custom";

/// Builds, registers, lists and runs catalog pipelines.
#[derive(Clone)]
pub struct PipelineService {
    registry: Arc<PipelineRegistry>,
    compiler: DefinitionCompiler,
    engine: ExecutionEngine,
}

impl PipelineService {
    pub fn new(
        registry: Arc<PipelineRegistry>,
        compiler: DefinitionCompiler,
        engine: ExecutionEngine,
    ) -> Self {
        Self {
            registry,
            compiler,
            engine,
        }
    }

    /// A new instance of a catalog pipeline with fresh units.
    pub fn build_pipeline(&self, name: &str) -> Result<Pipeline> {
        Ok(self.registry.build(name)?)
    }

    /// Register a factory under `name`. Replaces any existing entry.
    pub fn register_pipeline(
        &self,
        name: impl Into<String>,
        factory: PipelineFactory,
        metadata: PipelineMetadata,
    ) {
        let name = name.into();
        debug!(pipeline = %name, category = %metadata.category, "Registering pipeline");
        self.registry.register(name, factory, metadata);
    }

    /// Validate a declarative definition and register it.
    ///
    /// Definitions without a category land in [`CUSTOM_CATEGORY`].
    pub fn register_definition(&self, def: PipelineDefinition) -> Result<PipelineMetadata> {
        let entry = self.compiler.entry(def, CUSTOM_CATEGORY)?;
        let metadata = entry.metadata.clone();
        info!(
            pipeline = %entry.name,
            category = %metadata.category,
            "Registered pipeline definition"
        );
        self.registry.register_entry(entry);
        Ok(metadata)
    }

    pub fn unregister_pipeline(&self, name: &str) -> bool {
        self.registry.unregister(name)
    }

    /// All catalog names, sorted.
    pub fn list_pipelines(&self) -> Vec<String> {
        self.registry.list_all()
    }

    pub fn list_by_category(&self, category: &str) -> Vec<String> {
        self.registry.list_by_category(category)
    }

    pub fn list_by_member(&self, capability: &str) -> Vec<String> {
        self.registry.list_by_member(capability)
    }

    pub fn pipeline_metadata(&self, name: &str) -> Result<PipelineMetadata> {
        self.registry
            .metadata(name)
            .ok_or_else(|| PipelineError::PipelineNotFound(name.to_string()).into())
    }

    pub fn status_report(&self) -> StatusReport {
        self.registry.status_report()
    }

    /// Build a fresh instance of `name` and start running it.
    pub fn run_pipeline(
        &self,
        name: &str,
        request: impl Into<String>,
        state: SessionState,
    ) -> Result<Execution> {
        let pipeline = self.build_pipeline(name)?;
        Ok(self.engine.run(pipeline, request, state))
    }

    pub fn registry(&self) -> &Arc<PipelineRegistry> {
        &self.registry
    }
}

impl std::fmt::Debug for PipelineService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineService")
            .field("pipelines", &self.registry.len())
            .finish_non_exhaustive()
    }
}
