//! Domain services.
//!
//! [`DomainServices`] owns the capability catalog, the pipeline registry
//! and the execution engine, and hands them to the pipeline service and the
//! dynamic dispatcher by injection.

pub mod dispatch;
pub mod pipelines;

use std::sync::Arc;

use ensemble_config::{DispatcherConfig, EngineConfig, EnsembleConfig};
use ensemble_pipeline::{
    BootstrapReport, CapabilityCatalog, CategoryRegistrar, DefinitionCompiler, ExecutionEngine,
    PipelineRegistry, SharedUnitInvoker,
};
use ensemble_types::PipelineDefinition;
use tracing::{info, warn};

use crate::error::Result;
use crate::intent::IntentTable;
use dispatch::DynamicDispatcher;
use pipelines::PipelineService;

/// Settings for the domain layer.
#[derive(Debug, Clone, Default)]
pub struct DomainConfig {
    pub engine: EngineConfig,
    pub dispatcher: DispatcherConfig,
}

impl From<&EnsembleConfig> for DomainConfig {
    fn from(config: &EnsembleConfig) -> Self {
        Self {
            engine: config.engine(),
            dispatcher: config.dispatcher(),
        }
    }
}

/// Domain services facade.
#[derive(Clone)]
pub struct DomainServices {
    catalog: Arc<CapabilityCatalog>,
    pipelines: PipelineService,
    dispatcher: DynamicDispatcher,
    report: Arc<BootstrapReport>,
}

impl DomainServices {
    /// Wire services around an existing catalog, registering the given
    /// category routines. Routines that fail are skipped and reported.
    pub fn new(
        catalog: Arc<CapabilityCatalog>,
        invoker: SharedUnitInvoker,
        registrars: &[Box<dyn CategoryRegistrar>],
        config: &DomainConfig,
    ) -> Self {
        info!(capabilities = catalog.len(), "Initializing domain services");

        let compiler = DefinitionCompiler::new(Arc::clone(&catalog), config.engine.clone());
        let (registry, report) = PipelineRegistry::bootstrap(registrars);
        for (category, reason) in &report.failed {
            warn!(category = %category, reason = %reason, "Skipped pipeline category");
        }

        let engine = ExecutionEngine::new(invoker);
        let pipelines = PipelineService::new(Arc::new(registry), compiler, engine.clone());
        let dispatcher = DynamicDispatcher::new(
            Arc::clone(&catalog),
            engine,
            IntentTable::from(&config.dispatcher),
            config.dispatcher.name_suffix.clone(),
        );

        Self {
            catalog,
            pipelines,
            dispatcher,
            report: Arc::new(report),
        }
    }

    /// Build everything from loaded configuration: the capability catalog,
    /// the built-in categories and any `[[pipeline]]` definitions.
    pub fn from_config(config: &EnsembleConfig, invoker: SharedUnitInvoker) -> Result<Self> {
        let domain_config = DomainConfig::from(config);
        let catalog = Arc::new(CapabilityCatalog::from_descriptors(config.capabilities()?));
        let compiler = DefinitionCompiler::new(Arc::clone(&catalog), domain_config.engine.clone());
        let registrars = ensemble_workflows::builtin_registrars(&compiler);

        let mut services = Self::new(catalog, invoker, &registrars, &domain_config);
        services.register_definitions(config.pipeline.iter().cloned());
        info!(pipelines = services.pipelines.registry().len(), "Domain services ready");
        Ok(services)
    }

    /// Register user definitions one at a time; failures are reported, not fatal.
    fn register_definitions(&mut self, definitions: impl IntoIterator<Item = PipelineDefinition>) {
        let mut report = (*self.report).clone();
        let mut custom = 0usize;
        for def in definitions {
            let name = def.name.clone();
            match self.pipelines.register_definition(def) {
                Ok(_) => custom += 1,
                Err(err) => {
                    warn!(pipeline = %name, error = %err, "Skipped user pipeline");
                    report.failed.push((name, err.to_string()));
                }
            }
        }
        if custom > 0 {
            report
                .registered
                .push((pipelines::CUSTOM_CATEGORY.to_string(), custom));
        }
        self.report = Arc::new(report);
    }

    pub fn catalog(&self) -> &Arc<CapabilityCatalog> {
        &self.catalog
    }

    pub fn pipelines(&self) -> &PipelineService {
        &self.pipelines
    }

    pub fn dispatcher(&self) -> &DynamicDispatcher {
        &self.dispatcher
    }

    /// What registered at startup and what was skipped.
    pub fn bootstrap_report(&self) -> &BootstrapReport {
        &self.report
    }
}

impl std::fmt::Debug for DomainServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainServices")
            .field("catalog", &self.catalog)
            .field("pipelines", &self.pipelines)
            .finish_non_exhaustive()
    }
}
