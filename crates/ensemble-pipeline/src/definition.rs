//! Declarative pipeline definitions.
//!
//! Compiles [`PipelineDefinition`]s (from config or from embedded category
//! files) into pipelines. Each build asks the catalog for fresh units, so a
//! compiled factory can be invoked any number of times, concurrently.
//!
//! A category file looks like:
//!
//! ```toml
//! [category]
//! name = "Sales"
//!
//! [[pipeline]]
//! name = "Lead Nurturing"
//! pipeline_name = "LeadNurturingPipeline"
//! kind = "loop"
//! max_iterations = 10
//! members = ["content", "sales", "data"]
//! ```

use std::sync::Arc;

use ensemble_config::EngineConfig;
use ensemble_types::{CompositionKind, MemberDefinition, PipelineDefinition, StageDefinition};
use serde::Deserialize;

use crate::catalog::CapabilityCatalog;
use crate::error::{PipelineError, Result};
use crate::pipeline::{ExitPredicate, Pipeline};
use crate::registry::{CategoryRegistrar, PipelineFactory, RegistryEntry};

/// Turns definitions into pipelines using a catalog.
#[derive(Clone)]
pub struct DefinitionCompiler {
    catalog: Arc<CapabilityCatalog>,
    defaults: EngineConfig,
}

impl DefinitionCompiler {
    pub fn new(catalog: Arc<CapabilityCatalog>, defaults: EngineConfig) -> Self {
        Self { catalog, defaults }
    }

    pub fn catalog(&self) -> &Arc<CapabilityCatalog> {
        &self.catalog
    }

    /// Check a definition without building it.
    pub fn validate(&self, def: &PipelineDefinition) -> Result<()> {
        if def.name.trim().is_empty() {
            return Err(PipelineError::definition(&def.name, "name cannot be empty"));
        }
        self.validate_stage(&def.name, &def.root_stage())
    }

    fn validate_stage(&self, name: &str, stage: &StageDefinition) -> Result<()> {
        if stage.members.is_empty() {
            return Err(PipelineError::definition(
                name,
                format!("stage '{}' has no members", stage.name),
            ));
        }

        match stage.kind {
            CompositionKind::Loop => {
                if stage.body == Some(CompositionKind::Loop) {
                    return Err(PipelineError::definition(
                        name,
                        format!("loop '{}' cannot have a loop body", stage.name),
                    ));
                }
                if self.max_iterations(stage) == 0 {
                    return Err(PipelineError::definition(
                        name,
                        format!("loop '{}' needs max_iterations of at least 1", stage.name),
                    ));
                }
            }
            kind => {
                if stage.body.is_some() {
                    return Err(PipelineError::definition(
                        name,
                        format!("'body' is only valid on loops, '{}' is {}", stage.name, kind),
                    ));
                }
            }
        }

        for member in &stage.members {
            match member {
                MemberDefinition::Capability(id) => {
                    if !self.catalog.contains(id) {
                        return Err(PipelineError::definition(
                            name,
                            format!("unknown capability '{}'", id),
                        ));
                    }
                }
                MemberDefinition::Stage(nested) => self.validate_stage(name, nested)?,
            }
        }
        Ok(())
    }

    fn max_iterations(&self, stage: &StageDefinition) -> u32 {
        stage
            .max_iterations
            .unwrap_or(self.defaults.default_max_iterations)
    }

    /// Build a pipeline from a definition with fresh units.
    pub fn build(&self, def: &PipelineDefinition) -> Result<Pipeline> {
        let stage = def.root_stage();
        let mut builder = self.stage_builder(&stage)?;
        if !def.description.is_empty() {
            builder = builder.description(def.description.clone());
        }
        builder.build()
    }

    fn build_stage(&self, stage: &StageDefinition) -> Result<Pipeline> {
        self.stage_builder(stage)?.build()
    }

    fn stage_builder(&self, stage: &StageDefinition) -> Result<crate::PipelineBuilder> {
        let mut builder = Pipeline::builder(stage.name.clone())
            .kind(stage.kind)
            .failure_policy(stage.failure_policy.unwrap_or(self.defaults.failure_policy));

        if stage.kind == CompositionKind::Loop {
            builder = builder
                .max_iterations(self.max_iterations(stage))
                .body(stage.body.unwrap_or(CompositionKind::Sequential))
                .exit_when(ExitPredicate::from(&stage.exit_when));
        } else if let Some(body) = stage.body {
            builder = builder.body(body);
        }

        for member in &stage.members {
            builder = match member {
                MemberDefinition::Capability(id) => {
                    builder.member(self.catalog.create_unit(id, None)?)
                }
                MemberDefinition::Stage(nested) => builder.member(self.build_stage(nested)?),
            };
        }
        Ok(builder)
    }

    /// A factory that builds `def` on every call.
    pub fn factory(&self, def: PipelineDefinition) -> PipelineFactory {
        let compiler = self.clone();
        Arc::new(move || compiler.build(&def))
    }

    /// Validate a definition and turn it into a registry entry.
    ///
    /// The definition's own category wins over `default_category`.
    pub fn entry(&self, def: PipelineDefinition, default_category: &str) -> Result<RegistryEntry> {
        self.validate(&def)?;
        let category = def
            .category
            .clone()
            .unwrap_or_else(|| default_category.to_string());
        let name = def.name.clone();
        RegistryEntry::probe(name, category, self.factory(def))
    }
}

impl std::fmt::Debug for DefinitionCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionCompiler")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Category files
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct CategoryHeader {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CategoryFile {
    category: CategoryHeader,
    #[serde(default)]
    pipeline: Vec<PipelineDefinition>,
}

/// A category registrar over a list of definitions.
#[derive(Debug, Clone)]
pub struct DefinitionCategory {
    name: String,
    definitions: Vec<PipelineDefinition>,
    compiler: DefinitionCompiler,
}

impl DefinitionCategory {
    pub fn new(
        name: impl Into<String>,
        definitions: Vec<PipelineDefinition>,
        compiler: DefinitionCompiler,
    ) -> Self {
        Self {
            name: name.into(),
            definitions,
            compiler,
        }
    }

    /// Parse a category file.
    pub fn from_toml(source: &str, compiler: DefinitionCompiler) -> Result<Self> {
        let file: CategoryFile =
            toml::from_str(source).map_err(|e| PipelineError::Parse(e.to_string()))?;
        Ok(Self::new(file.category.name, file.pipeline, compiler))
    }

    pub fn definitions(&self) -> &[PipelineDefinition] {
        &self.definitions
    }
}

impl CategoryRegistrar for DefinitionCategory {
    fn category(&self) -> &str {
        &self.name
    }

    fn entries(&self) -> Result<Vec<RegistryEntry>> {
        self.definitions
            .iter()
            .cloned()
            .map(|def| self.compiler.entry(def, &self.name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Composition;
    use ensemble_types::{CapabilityDescriptor, FailurePolicy};

    fn compiler() -> DefinitionCompiler {
        let catalog = CapabilityCatalog::from_descriptors(
            ["strategic", "data", "financial", "compliance", "content"]
                .iter()
                .map(|id| CapabilityDescriptor::new(*id, format!("{id}Agent"))),
        );
        DefinitionCompiler::new(Arc::new(catalog), EngineConfig::default())
    }

    const CATEGORY: &str = r#"
[category]
name = "Financial"

[[pipeline]]
name = "Financial Model Creation"
pipeline_name = "FinancialModelCreationPipeline"
description = "Research, build and document a financial model"
members = [
    { name = "FinancialModelResearch", kind = "parallel", members = ["data", "strategic"] },
    { name = "FinancialModelConstruction", members = ["financial", "compliance"] },
    "content",
]

[[pipeline]]
name = "Cost Optimization"
kind = "loop"
members = ["financial", "data"]
"#;

    #[test]
    fn test_category_from_toml() {
        let category = DefinitionCategory::from_toml(CATEGORY, compiler()).unwrap();
        assert_eq!(category.category(), "Financial");
        let entries = category.entries().unwrap();
        assert_eq!(entries.len(), 2);

        let model = &entries[0];
        assert_eq!(model.metadata.category, "Financial");
        assert_eq!(model.metadata.pattern, "parallel + sequential");
        assert_eq!(
            model.metadata.members,
            vec!["data", "strategic", "financial", "compliance", "content"]
        );

        let built = (model.factory)().unwrap();
        assert_eq!(built.name(), "FinancialModelCreationPipeline");
        assert_eq!(built.members().len(), 3);
        assert_eq!(built.units().len(), 5);
    }

    #[test]
    fn test_loop_uses_default_bound() {
        let category = DefinitionCategory::from_toml(CATEGORY, compiler()).unwrap();
        let entries = category.entries().unwrap();
        let cost = (entries[1].factory)().unwrap();
        match cost.composition() {
            Composition::Loop { max_iterations, body, .. } => {
                assert_eq!(max_iterations.get(), 3);
                assert_eq!(*body, CompositionKind::Sequential);
            }
            other => panic!("expected loop, got {other:?}"),
        }
        assert_eq!(entries[1].metadata.pattern, "loop");
    }

    #[test]
    fn test_factory_builds_fresh_units() {
        let category = DefinitionCategory::from_toml(CATEGORY, compiler()).unwrap();
        let entries = category.entries().unwrap();
        let a = (entries[0].factory)().unwrap();
        let b = (entries[0].factory)().unwrap();
        for id in a.unit_instances() {
            assert!(!b.unit_instances().contains(&id));
        }
    }

    #[test]
    fn test_unknown_capability_rejected() {
        let def: PipelineDefinition = toml::from_str(
            r#"
name = "Horoscope"
members = ["astrology"]
"#,
        )
        .unwrap();
        let err = compiler().entry(def, "Custom").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidDefinition { ref name, .. } if name == "Horoscope"
        ));
    }

    #[test]
    fn test_invalid_shapes_rejected() {
        let compiler = compiler();
        let empty: PipelineDefinition = toml::from_str("name = \"Empty\"\nmembers = []").unwrap();
        assert!(compiler.validate(&empty).is_err());

        let zero: PipelineDefinition = toml::from_str(
            "name = \"Zero\"\nkind = \"loop\"\nmax_iterations = 0\nmembers = [\"data\"]",
        )
        .unwrap();
        assert!(compiler.validate(&zero).is_err());

        let body: PipelineDefinition =
            toml::from_str("name = \"Body\"\nbody = \"parallel\"\nmembers = [\"data\"]").unwrap();
        assert!(compiler.validate(&body).is_err());
    }

    #[test]
    fn test_category_and_policy_overrides() {
        let def: PipelineDefinition = toml::from_str(
            r#"
name = "Tolerant"
category = "Custom Ops"
kind = "parallel"
failure_policy = "continue"
members = ["data", "financial"]
"#,
        )
        .unwrap();
        let entry = compiler().entry(def, "Custom").unwrap();
        assert_eq!(entry.metadata.category, "Custom Ops");
        let built = (entry.factory)().unwrap();
        assert_eq!(built.failure_policy(), FailurePolicy::Continue);
    }

    #[test]
    fn test_bad_category_file() {
        let err = DefinitionCategory::from_toml("not toml {{", compiler()).unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }
}
