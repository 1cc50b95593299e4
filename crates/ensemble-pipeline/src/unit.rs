//! Capability units and their one-shot ownership field.

use std::fmt;
use std::sync::Arc;

use ensemble_types::{CapabilityDescriptor, PipelineId, UnitInstanceId};
use parking_lot::Mutex;

use crate::error::{PipelineError, Result};

/// One invocable instance of a capability.
///
/// Units built from the same descriptor are configured identically and differ
/// only in their instance id and ownership. The owner is set once, when the
/// unit is attached to a pipeline, and never changes afterwards.
pub struct CapabilityUnit {
    instance: UnitInstanceId,
    name: String,
    descriptor: Arc<CapabilityDescriptor>,
    owner: Mutex<Option<PipelineId>>,
}

impl CapabilityUnit {
    /// Create an unattached unit. The unit name is the descriptor name plus
    /// the optional suffix.
    pub fn new(descriptor: Arc<CapabilityDescriptor>, name_suffix: Option<&str>) -> Self {
        let name = match name_suffix {
            Some(suffix) => format!("{}{}", descriptor.name, suffix),
            None => descriptor.name.clone(),
        };
        Self {
            instance: UnitInstanceId::new(),
            name,
            descriptor,
            owner: Mutex::new(None),
        }
    }

    pub fn instance(&self) -> UnitInstanceId {
        self.instance
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capability identifier this unit was built from.
    pub fn capability(&self) -> &str {
        &self.descriptor.id
    }

    pub fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    pub fn owner(&self) -> Option<PipelineId> {
        *self.owner.lock()
    }

    pub fn is_owned(&self) -> bool {
        self.owner.lock().is_some()
    }
}

impl fmt::Debug for CapabilityUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityUnit")
            .field("instance", &self.instance)
            .field("name", &self.name)
            .field("capability", &self.descriptor.id)
            .field("owner", &self.owner())
            .finish()
    }
}

/// Attach every unit to `pipeline` in one step.
///
/// All owner locks are taken in instance-id order and held together, so
/// concurrent builds contending for the same unit cannot interleave. Either
/// every unit is assigned or none is.
pub(crate) fn assign_owner(units: &[&Arc<CapabilityUnit>], pipeline: PipelineId) -> Result<()> {
    let mut sorted: Vec<&Arc<CapabilityUnit>> = units.to_vec();
    sorted.sort_by_key(|u| u.instance);

    if let Some(pair) = sorted.windows(2).find(|w| w[0].instance == w[1].instance) {
        return Err(PipelineError::invalid(format!(
            "unit '{}' ({}) is listed more than once",
            pair[0].name, pair[0].instance
        )));
    }

    let mut guards: Vec<_> = sorted.iter().map(|u| u.owner.lock()).collect();

    for (unit, guard) in sorted.iter().zip(guards.iter()) {
        if let Some(owner) = **guard {
            return Err(PipelineError::OwnershipConflict {
                unit: unit.name.clone(),
                instance: unit.instance,
                owner,
            });
        }
    }

    for guard in guards.iter_mut() {
        **guard = Some(pipeline);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: &str) -> Arc<CapabilityUnit> {
        Arc::new(CapabilityUnit::new(
            Arc::new(CapabilityDescriptor::new(id, format!("{id}Agent"))),
            None,
        ))
    }

    #[test]
    fn test_name_suffix() {
        let desc = Arc::new(CapabilityDescriptor::new("data", "DataAnalysisAgent"));
        let u = CapabilityUnit::new(desc.clone(), Some("_dynamic"));
        assert_eq!(u.name(), "DataAnalysisAgent_dynamic");
        assert_eq!(u.capability(), "data");
        assert!(!u.is_owned());

        let plain = CapabilityUnit::new(desc, None);
        assert_eq!(plain.name(), "DataAnalysisAgent");
        assert_ne!(plain.instance(), u.instance());
    }

    #[test]
    fn test_assign_owner_sets_all() {
        let a = unit("a");
        let b = unit("b");
        let pid = PipelineId::new();
        assign_owner(&[&a, &b], pid).unwrap();
        assert_eq!(a.owner(), Some(pid));
        assert_eq!(b.owner(), Some(pid));
    }

    #[test]
    fn test_assign_owner_all_or_nothing() {
        let owned = unit("owned");
        let fresh = unit("fresh");
        let first = PipelineId::new();
        assign_owner(&[&owned], first).unwrap();

        let err = assign_owner(&[&fresh, &owned], PipelineId::new()).unwrap_err();
        match err {
            PipelineError::OwnershipConflict { owner, instance, .. } => {
                assert_eq!(owner, first);
                assert_eq!(instance, owned.instance());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!fresh.is_owned(), "no partial assignment");
        assert_eq!(owned.owner(), Some(first));
    }

    #[test]
    fn test_assign_owner_rejects_duplicates() {
        let a = unit("a");
        let err = assign_owner(&[&a, &a], PipelineId::new()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPipeline(_)));
        assert!(!a.is_owned());
    }
}
