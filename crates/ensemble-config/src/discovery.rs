//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/ensemble/config.toml` (XDG user config, or `$ENSEMBLE_CONFIG_DIR`)
//! 2. `./ensemble.toml` (project-local)
//! 3. CLI arguments (handled externally)

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::{ConfigError, EnsembleConfig, Result};

/// Default config filename for project-local config.
pub const PROJECT_CONFIG_FILE: &str = "ensemble.toml";

/// Default config filename within XDG config directory.
pub const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for XDG directory resolution.
pub const APP_NAME: &str = "ensemble";

/// Environment variable to override the config directory.
pub const CONFIG_DIR_ENV: &str = "ENSEMBLE_CONFIG_DIR";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: EnsembleConfig,
    /// Sources that were checked, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Warnings generated during loading (malformed layers, dangling ids).
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Get paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Load configuration by discovering and merging all config layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Load configuration with explicit control over the user config directory.
///
/// `config_dir` overrides both `ENSEMBLE_CONFIG_DIR` and the platform default.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = EnsembleConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path, &mut warnings));
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings));

    check_references(&config, &mut warnings);

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<EnsembleConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    EnsembleConfig::from_toml(&contents)
}

/// Save configuration to a file, creating parent directories.
pub fn save_config(config: &EnsembleConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// Path of the user config file.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// The user config directory.
///
/// Checks `ENSEMBLE_CONFIG_DIR` first, then falls back to the platform default.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Try to load a config file and merge it into the existing config.
///
/// A missing file is skipped silently; a malformed one is skipped with a warning.
fn load_layer(
    config: &mut EnsembleConfig,
    path: &Path,
    warnings: &mut Vec<String>,
) -> ConfigSource {
    if !path.is_file() {
        return ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        };
    }

    match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            }
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            ConfigSource {
                path: path.to_path_buf(),
                loaded: false,
            }
        }
    }
}

/// Warn about dispatcher and pipeline references to unknown capabilities.
fn check_references(config: &EnsembleConfig, warnings: &mut Vec<String>) {
    let known: HashSet<String> = match config.capabilities() {
        Ok(caps) => caps.into_iter().map(|c| c.id).collect(),
        Err(e) => {
            warnings.push(e.to_string());
            return;
        }
    };

    let dispatcher = config.dispatcher();
    for rule in &dispatcher.rules {
        if !known.contains(&rule.capability) {
            warnings.push(format!(
                "[[dispatcher.rules]] references unknown capability '{}'",
                rule.capability
            ));
        }
    }
    for id in &dispatcher.fallback {
        if !known.contains(id) {
            warnings.push(format!("dispatcher fallback references unknown capability '{}'", id));
        }
    }

    for def in &config.pipeline {
        for id in def.capability_ids() {
            if !known.contains(&id) {
                warnings.push(format!(
                    "pipeline '{}' references unknown capability '{}'",
                    def.name, id
                ));
            }
        }
        if def.members.is_empty() {
            warnings.push(format!("pipeline '{}' has no members", def.name));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_xdg_config_path_shape() {
        if let Some(p) = xdg_config_path() {
            assert!(p.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_no_files() {
        let dir = TempDir::new().unwrap();
        let empty_config_dir = TempDir::new().unwrap();
        let loaded =
            load_config_with_options(Some(dir.path()), Some(empty_config_dir.path())).unwrap();
        assert!(loaded.config.engine.is_none());
        assert!(loaded.loaded_from().is_empty());
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn test_load_config_layered_merge() {
        let user_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();

        fs::write(
            user_dir.path().join("config.toml"),
            r#"
[engine]
default_max_iterations = 4

[dispatcher]
fallback = ["data"]
"#,
        )
        .unwrap();

        fs::write(
            project_dir.path().join("ensemble.toml"),
            r#"
[engine]
default_max_iterations = 9

[[pipeline]]
name = "Project Review"
members = ["operations", "data"]
"#,
        )
        .unwrap();

        let loaded =
            load_config_with_options(Some(project_dir.path()), Some(user_dir.path())).unwrap();
        assert_eq!(loaded.loaded_from().len(), 2);
        assert_eq!(loaded.config.engine().default_max_iterations, 9);
        assert_eq!(loaded.config.dispatcher().fallback, vec!["data"]);
        assert_eq!(loaded.config.pipeline.len(), 1);
        assert!(loaded.warnings.is_empty(), "{:?}", loaded.warnings);
    }

    #[test]
    fn test_malformed_layer_warns_but_continues() {
        let project_dir = TempDir::new().unwrap();
        let user_dir = TempDir::new().unwrap();
        fs::write(project_dir.path().join("ensemble.toml"), "not valid {{{{").unwrap();

        let loaded =
            load_config_with_options(Some(project_dir.path()), Some(user_dir.path())).unwrap();
        assert!(loaded.loaded_from().is_empty());
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("Failed to load"));
    }

    #[test]
    fn test_unknown_capability_reference_warns() {
        let project_dir = TempDir::new().unwrap();
        let user_dir = TempDir::new().unwrap();
        fs::write(
            project_dir.path().join("ensemble.toml"),
            r#"
[[pipeline]]
name = "Broken"
members = ["astrology"]
"#,
        )
        .unwrap();

        let loaded =
            load_config_with_options(Some(project_dir.path()), Some(user_dir.path())).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("astrology"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = EnsembleConfig::from_toml(
            r#"
[engine]
default_max_iterations = 6
"#,
        )
        .unwrap();

        save_config(&config, &path).unwrap();
        let reloaded = load_config_file(&path).unwrap();
        assert_eq!(reloaded, config);
    }
}
