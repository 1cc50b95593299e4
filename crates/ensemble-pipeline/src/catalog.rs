//! Capability catalog.
//!
//! Holds, per capability identifier, the descriptor, a constructor that
//! always returns a fresh unattached unit, and a lazily built long-lived
//! shared instance. Call sites choose explicitly between the two producers:
//!
//! - [`CapabilityCatalog::create_unit`] for anything that may run
//!   concurrently with another pipeline using the same capability.
//! - [`CapabilityCatalog::shared_unit`] for the single process-lifetime
//!   instance. Once attached to a pipeline it can never join another.

use std::collections::BTreeMap;
use std::sync::Arc;

use ensemble_types::CapabilityDescriptor;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::unit::CapabilityUnit;

/// Builds one unit from a descriptor and an optional name suffix.
pub type UnitConstructor =
    Arc<dyn Fn(Arc<CapabilityDescriptor>, Option<&str>) -> Result<CapabilityUnit> + Send + Sync>;

/// The constructor used unless one is installed with
/// [`CapabilityCatalog::set_constructor`].
pub fn default_constructor() -> UnitConstructor {
    Arc::new(|descriptor: Arc<CapabilityDescriptor>, suffix: Option<&str>| {
        Ok(CapabilityUnit::new(descriptor, suffix))
    })
}

struct CatalogSlot {
    descriptor: Arc<CapabilityDescriptor>,
    constructor: UnitConstructor,
    shared: Mutex<Option<Arc<CapabilityUnit>>>,
}

/// Catalog of capability descriptors and their unit producers.
#[derive(Default)]
pub struct CapabilityCatalog {
    slots: BTreeMap<String, CatalogSlot>,
}

impl CapabilityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from descriptors. Later duplicates replace earlier ones.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = CapabilityDescriptor>) -> Self {
        let mut catalog = Self::new();
        for descriptor in descriptors {
            catalog.insert(descriptor);
        }
        catalog
    }

    /// Add or replace a descriptor with the default constructor.
    pub fn insert(&mut self, descriptor: CapabilityDescriptor) {
        let id = descriptor.id.clone();
        self.slots.insert(
            id,
            CatalogSlot {
                descriptor: Arc::new(descriptor),
                constructor: default_constructor(),
                shared: Mutex::new(None),
            },
        );
    }

    /// Replace the constructor of an existing capability.
    pub fn set_constructor(&mut self, id: &str, constructor: UnitConstructor) -> Result<()> {
        let slot = self
            .slots
            .get_mut(id)
            .ok_or_else(|| PipelineError::CapabilityNotFound(id.to_string()))?;
        slot.constructor = constructor;
        Ok(())
    }

    /// Create a new, unattached unit.
    ///
    /// Every call returns a distinct instance. A failing constructor yields
    /// [`PipelineError::Construction`]; callers treat it as "no unit available".
    pub fn create_unit(&self, id: &str, name_suffix: Option<&str>) -> Result<CapabilityUnit> {
        let slot = self
            .slots
            .get(id)
            .ok_or_else(|| PipelineError::CapabilityNotFound(id.to_string()))?;
        let unit = construct(id, slot, name_suffix)?;
        debug!(capability = id, instance = %unit.instance(), name = unit.name(), "Created unit");
        Ok(unit)
    }

    /// The shared process-lifetime instance, built on first use.
    pub fn shared_unit(&self, id: &str) -> Result<Arc<CapabilityUnit>> {
        let slot = self
            .slots
            .get(id)
            .ok_or_else(|| PipelineError::CapabilityNotFound(id.to_string()))?;

        let mut shared = slot.shared.lock();
        if let Some(unit) = shared.as_ref() {
            return Ok(Arc::clone(unit));
        }
        let unit = Arc::new(construct(id, slot, None)?);
        debug!(capability = id, instance = %unit.instance(), "Created shared unit");
        *shared = Some(Arc::clone(&unit));
        Ok(unit)
    }

    pub fn descriptor(&self, id: &str) -> Option<&CapabilityDescriptor> {
        self.slots.get(id).map(|s| s.descriptor.as_ref())
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &CapabilityDescriptor> {
        self.slots.values().map(|s| s.descriptor.as_ref())
    }

    /// Capability identifiers, sorted.
    pub fn ids(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn construct(id: &str, slot: &CatalogSlot, name_suffix: Option<&str>) -> Result<CapabilityUnit> {
    match (slot.constructor)(Arc::clone(&slot.descriptor), name_suffix) {
        Ok(unit) => Ok(unit),
        Err(err) => {
            warn!(capability = id, error = %err, "Unit construction failed");
            Err(match err {
                PipelineError::Construction { .. } => err,
                other => PipelineError::construction(id, other.to_string()),
            })
        }
    }
}

impl std::fmt::Debug for CapabilityCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityCatalog")
            .field("ids", &self.ids())
            .finish()
    }
}
