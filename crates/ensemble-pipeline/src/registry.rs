//! Pipeline registry.
//!
//! Maps catalog names to factories and metadata. The registry is built once
//! at startup from category registration routines and shared by reference
//! with everything that builds pipelines; user-defined pipelines can be
//! registered at any time afterwards.
//!
//! Callers obtain a factory with [`PipelineRegistry::get`] and invoke it
//! immediately (or call [`PipelineRegistry::build`]). Built pipelines are
//! never cached: each build attaches its own fresh units.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use ensemble_types::CompositionKind;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result, panic_message};
use crate::pipeline::Pipeline;

/// Produces a new pipeline with fresh units on every call.
pub type PipelineFactory = Arc<dyn Fn() -> Result<Pipeline> + Send + Sync>;

/// Descriptive data kept alongside a factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineMetadata {
    pub category: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Capability ids used by the pipeline, first appearance first.
    pub members: Vec<String>,
    pub kind: CompositionKind,
    pub pattern: String,
}

impl PipelineMetadata {
    /// Derive metadata from a built pipeline.
    pub fn from_pipeline(category: impl Into<String>, pipeline: &Pipeline) -> Self {
        Self {
            category: category.into(),
            description: pipeline.description().to_string(),
            members: pipeline.capability_ids(),
            kind: pipeline.kind(),
            pattern: pipeline.pattern(),
        }
    }
}

/// One registered catalog pipeline.
#[derive(Clone)]
pub struct RegistryEntry {
    pub name: String,
    pub factory: PipelineFactory,
    pub metadata: PipelineMetadata,
}

impl RegistryEntry {
    pub fn new(
        name: impl Into<String>,
        factory: PipelineFactory,
        metadata: PipelineMetadata,
    ) -> Self {
        Self {
            name: name.into(),
            factory,
            metadata,
        }
    }

    /// Build the factory once to validate it and derive its metadata.
    pub fn probe(
        name: impl Into<String>,
        category: impl Into<String>,
        factory: PipelineFactory,
    ) -> Result<Self> {
        let category = category.into();
        let built = std::panic::catch_unwind(AssertUnwindSafe(|| factory())).map_err(|payload| {
            PipelineError::Registration {
                category: category.clone(),
                message: panic_message(payload.as_ref()),
            }
        })??;
        let metadata = PipelineMetadata::from_pipeline(category, &built);
        Ok(Self::new(name, factory, metadata))
    }
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("name", &self.name)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// A category registration routine.
pub trait CategoryRegistrar: Send + Sync {
    /// Label used in logs and reports.
    fn category(&self) -> &str;

    /// Produce the category's entries. An error skips the whole category.
    fn entries(&self) -> Result<Vec<RegistryEntry>>;
}

/// A registrar backed by a closure.
pub struct FnRegistrar<F> {
    category: String,
    entries: F,
}

impl<F> FnRegistrar<F>
where
    F: Fn() -> Result<Vec<RegistryEntry>> + Send + Sync,
{
    pub fn new(category: impl Into<String>, entries: F) -> Self {
        Self {
            category: category.into(),
            entries,
        }
    }
}

impl<F> CategoryRegistrar for FnRegistrar<F>
where
    F: Fn() -> Result<Vec<RegistryEntry>> + Send + Sync,
{
    fn category(&self) -> &str {
        &self.category
    }

    fn entries(&self) -> Result<Vec<RegistryEntry>> {
        (self.entries)()
    }
}

/// Counts of registered pipelines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub total: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_pattern: BTreeMap<String, usize>,
    pub names: Vec<String>,
}

/// Outcome of registering a set of categories.
#[derive(Debug, Clone, Default)]
pub struct BootstrapReport {
    /// Categories that registered, with their entry counts.
    pub registered: Vec<(String, usize)>,
    /// Categories that were skipped, with the reason.
    pub failed: Vec<(String, String)>,
}

/// Catalog-name → (factory, metadata) store.
#[derive(Default)]
pub struct PipelineRegistry {
    entries: RwLock<BTreeMap<String, RegistryEntry>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from category registration routines, skipping any
    /// that fail.
    pub fn bootstrap(registrars: &[Box<dyn CategoryRegistrar>]) -> (Self, BootstrapReport) {
        let registry = Self::new();
        let report = registry.register_categories(registrars);
        (registry, report)
    }

    /// Register or overwrite a pipeline.
    pub fn register(
        &self,
        name: impl Into<String>,
        factory: PipelineFactory,
        metadata: PipelineMetadata,
    ) {
        self.register_entry(RegistryEntry::new(name, factory, metadata));
    }

    pub fn register_entry(&self, entry: RegistryEntry) {
        let name = entry.name.clone();
        if self.entries.write().insert(name.clone(), entry).is_some() {
            debug!(pipeline = %name, "Replaced registered pipeline");
        } else {
            debug!(pipeline = %name, "Registered pipeline");
        }
    }

    /// Register every entry of one category, or none of them.
    ///
    /// A registrar that panics is treated like one that returned an error.
    pub fn register_category(&self, registrar: &dyn CategoryRegistrar) -> Result<usize> {
        let registration = |message: String| PipelineError::Registration {
            category: registrar.category().to_string(),
            message,
        };
        let entries = std::panic::catch_unwind(AssertUnwindSafe(|| registrar.entries()))
            .map_err(|payload| registration(panic_message(payload.as_ref())))?
            .map_err(|e| registration(e.to_string()))?;
        let count = entries.len();
        let mut map = self.entries.write();
        for entry in entries {
            map.insert(entry.name.clone(), entry);
        }
        Ok(count)
    }

    /// Register several categories. Failures are logged and skipped.
    pub fn register_categories(
        &self,
        registrars: &[Box<dyn CategoryRegistrar>],
    ) -> BootstrapReport {
        let mut report = BootstrapReport::default();
        for registrar in registrars {
            match self.register_category(registrar.as_ref()) {
                Ok(count) => {
                    debug!(category = registrar.category(), count, "Registered category");
                    report.registered.push((registrar.category().to_string(), count));
                }
                Err(err) => {
                    warn!(category = registrar.category(), error = %err, "Skipping category");
                    report
                        .failed
                        .push((registrar.category().to_string(), err.to_string()));
                }
            }
        }
        info!(
            total = self.len(),
            categories = report.registered.len(),
            failed = report.failed.len(),
            "Pipeline registry ready"
        );
        report
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.entries.write().remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<PipelineFactory> {
        self.entries.read().get(name).map(|e| Arc::clone(&e.factory))
    }

    /// Look up a factory and build a fresh pipeline from it.
    pub fn build(&self, name: &str) -> Result<Pipeline> {
        let factory = self
            .get(name)
            .ok_or_else(|| PipelineError::PipelineNotFound(name.to_string()))?;
        factory()
    }

    pub fn metadata(&self, name: &str) -> Option<PipelineMetadata> {
        self.entries.read().get(name).map(|e| e.metadata.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// All registered names, sorted.
    pub fn list_all(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn list_by_category(&self, category: &str) -> Vec<String> {
        self.filter_names(|m| m.category == category)
    }

    /// Names of pipelines that use the given capability.
    pub fn list_by_member(&self, capability: &str) -> Vec<String> {
        self.filter_names(|m| m.members.iter().any(|id| id == capability))
    }

    fn filter_names(&self, keep: impl Fn(&PipelineMetadata) -> bool) -> Vec<String> {
        self.entries
            .read()
            .values()
            .filter(|e| keep(&e.metadata))
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn status_report(&self) -> StatusReport {
        let entries = self.entries.read();
        let mut report = StatusReport {
            total: entries.len(),
            ..Default::default()
        };
        for entry in entries.values() {
            *report
                .by_category
                .entry(entry.metadata.category.clone())
                .or_default() += 1;
            *report
                .by_pattern
                .entry(entry.metadata.pattern.clone())
                .or_default() += 1;
            report.names.push(entry.name.clone());
        }
        report
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl std::fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRegistry")
            .field("names", &self.list_all())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::CapabilityUnit;
    use ensemble_types::CapabilityDescriptor;

    fn factory(name: &'static str, ids: &'static [&'static str]) -> PipelineFactory {
        Arc::new(move || {
            let mut builder = Pipeline::builder(name);
            for id in ids {
                builder = builder.member(CapabilityUnit::new(
                    Arc::new(CapabilityDescriptor::new(*id, *id)),
                    None,
                ));
            }
            builder.build()
        })
    }

    fn register(registry: &PipelineRegistry, name: &str, category: &str, f: PipelineFactory) {
        registry.register_entry(RegistryEntry::probe(name, category, f).unwrap());
    }

    #[test]
    fn test_register_and_get() {
        let registry = PipelineRegistry::new();
        let entry = RegistryEntry::probe(
            "Deal Qualification",
            "Sales",
            factory("DealQ", &["sales", "financial"]),
        )
        .unwrap();
        registry.register_entry(entry);

        assert!(registry.contains("Deal Qualification"));
        let meta = registry.metadata("Deal Qualification").unwrap();
        assert_eq!(meta.members, vec!["sales", "financial"]);
        assert_eq!(meta.kind, CompositionKind::Sequential);
        assert_eq!(meta.pattern, "sequential");

        let built = registry.build("Deal Qualification").unwrap();
        assert_eq!(built.name(), "DealQ");
    }

    #[test]
    fn test_register_overwrites() {
        let registry = PipelineRegistry::new();
        register(&registry, "X", "A", factory("X1", &["a"]));
        register(&registry, "X", "B", factory("X2", &["b"]));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.metadata("X").unwrap().category, "B");
        assert_eq!(registry.build("X").unwrap().name(), "X2");
    }

    #[test]
    fn test_not_found() {
        let registry = PipelineRegistry::new();
        assert!(registry.get("missing").is_none());
        assert!(registry.metadata("missing").is_none());
        let err = registry.build("missing").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_list_filters() {
        let registry = PipelineRegistry::new();
        register(&registry, "A", "Sales", factory("A", &["sales", "data"]));
        register(&registry, "B", "Sales", factory("B", &["sales"]));
        register(&registry, "C", "HR", factory("C", &["hr", "data"]));

        assert_eq!(registry.list_all(), vec!["A", "B", "C"]);
        assert_eq!(registry.list_by_category("Sales"), vec!["A", "B"]);
        assert_eq!(registry.list_by_member("data"), vec!["A", "C"]);
        assert!(registry.list_by_member("support").is_empty());
        assert!(registry.unregister("A"));
        assert!(!registry.unregister("A"));
        assert_eq!(registry.list_by_member("data"), vec!["C"]);
    }

    #[test]
    fn test_status_report() {
        let registry = PipelineRegistry::new();
        register(&registry, "A", "Sales", factory("A", &["sales"]));
        register(&registry, "B", "HR", factory("B", &["hr"]));

        let report = registry.status_report();
        assert_eq!(report.total, 2);
        assert_eq!(report.by_category["Sales"], 1);
        assert_eq!(report.by_pattern["sequential"], 2);
        assert_eq!(report.names, vec!["A", "B"]);
    }

    #[test]
    fn test_category_is_all_or_nothing() {
        let registry = PipelineRegistry::new();
        let registrar = FnRegistrar::new("broken", || {
            let good = RegistryEntry::probe("Good", "Broken", factory("Good", &["a"]))?;
            let bad = RegistryEntry::probe("Bad", "Broken", factory("Bad", &[]))?;
            Ok(vec![good, bad])
        });
        let err = registry.register_category(&registrar).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Registration { ref category, .. } if category == "broken"
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_panicking_registrar_is_a_registration_error() {
        let registry = PipelineRegistry::new();
        let registrar = FnRegistrar::new("panicky", || -> Result<Vec<RegistryEntry>> {
            panic!("registrar blew up")
        });
        let err = registry.register_category(&registrar).unwrap_err();
        match err {
            PipelineError::Registration { category, message } => {
                assert_eq!(category, "panicky");
                assert!(message.contains("registrar blew up"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_panicking_factory_is_a_registration_error() {
        let boom: PipelineFactory = Arc::new(|| -> Result<Pipeline> { panic!("factory blew up") });
        let err = RegistryEntry::probe("Boom", "Broken", boom).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Registration { ref category, ref message }
                if category == "Broken" && message.contains("factory blew up")
        ));
    }

    #[test]
    fn test_panicking_category_is_skipped() {
        let registry = PipelineRegistry::new();
        let registrars: Vec<Box<dyn CategoryRegistrar>> = vec![
            Box::new(FnRegistrar::new("panicky", || -> Result<Vec<RegistryEntry>> {
                panic!("registrar blew up")
            })),
            Box::new(FnRegistrar::new("good", || {
                Ok(vec![RegistryEntry::probe("Good", "Good", factory("Good", &["a"]))?])
            })),
        ];
        let report = registry.register_categories(&registrars);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "panicky");
        assert_eq!(report.registered, vec![("good".to_string(), 1)]);
        assert!(registry.contains("Good"));
    }
}
