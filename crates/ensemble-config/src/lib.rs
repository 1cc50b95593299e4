//! Configuration system for the Ensemble pipeline engine.
//!
//! Provides TOML-based configuration with:
//! - Engine defaults (`[engine]`): loop bound fallback, parallel failure policy
//! - The dispatcher's intent table (`[dispatcher]`, `[[dispatcher.rules]]`)
//! - The capability descriptor catalog (`[[capability]]`)
//! - User-defined catalog pipelines (`[[pipeline]]`)
//! - Config file layering (XDG user config + project-local overrides)
//!
//! When no `[[capability]]` entries are configured, the embedded default
//! catalog of ten specialists is used.

pub mod defaults;
pub mod discovery;
pub mod error;
pub mod types;

pub use defaults::default_capabilities;
pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, save_config,
    xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
