//! Embedded default capability catalog.

use ensemble_types::CapabilityDescriptor;
use serde::Deserialize;

use crate::{ConfigError, Result};

const DEFAULT_CAPABILITIES: &str = include_str!("../defaults/capabilities.toml");

#[derive(Deserialize)]
struct CatalogFile {
    capability: Vec<CapabilityDescriptor>,
}

/// The ten built-in specialist descriptors.
pub fn default_capabilities() -> Result<Vec<CapabilityDescriptor>> {
    let file: CatalogFile = toml::from_str(DEFAULT_CAPABILITIES)
        .map_err(|e| ConfigError::Defaults(e.to_string()))?;
    Ok(file.capability)
}
