//! Runtime configuration loading.
//!
//! Reads `config.toml` from the app root (or the path in `VITALS_HUD_CONFIG`).
//! A missing file yields defaults; a malformed one is reported so callers can
//! log it and fall back.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, VitalsError};
use crate::storage::StoragePaths;

pub const CONFIG_ENV_VAR: &str = "VITALS_HUD_CONFIG";

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 3;
pub const DEFAULT_MAINTENANCE_INTERVAL_MS: u64 = 500;
pub const DEFAULT_STALE_AFTER_SECS: f64 = 10.0;
pub const DEFAULT_HISTORY_LIMIT: usize = 100;
pub const DEFAULT_COMMAND_PREFIX: &str = "/";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VitalsConfig {
    /// Characters tracked by the dashboard and agents.
    #[serde(default)]
    pub characters: Vec<String>,
    /// Overrides the platform default data roots when non-empty.
    #[serde(default)]
    pub data_roots: Vec<PathBuf>,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_maintenance_interval_ms")]
    pub maintenance_interval_ms: u64,
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: f64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
}

fn default_refresh_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

fn default_maintenance_interval_ms() -> u64 {
    DEFAULT_MAINTENANCE_INTERVAL_MS
}

fn default_stale_after_secs() -> f64 {
    DEFAULT_STALE_AFTER_SECS
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_command_prefix() -> String {
    DEFAULT_COMMAND_PREFIX.to_string()
}

impl Default for VitalsConfig {
    fn default() -> Self {
        Self {
            characters: Vec::new(),
            data_roots: Vec::new(),
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            maintenance_interval_ms: DEFAULT_MAINTENANCE_INTERVAL_MS,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
        }
    }
}

impl VitalsConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms.max(50))
    }

    /// Storage paths with this config's data-root override applied.
    pub fn apply_to(&self, storage: StoragePaths) -> StoragePaths {
        storage.with_data_roots(self.data_roots.clone())
    }

    /// Character names with blanks dropped and whitespace trimmed.
    pub fn tracked_characters(&self) -> Vec<String> {
        self.characters
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Resolves the config path: explicit path, then env override, then app root.
pub fn resolve_config_path(explicit: Option<PathBuf>, storage: &StoragePaths) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
        .unwrap_or_else(|| storage.config_file())
}

/// Loads the config at `path`, returning defaults if the file doesn't exist.
pub fn load_config(path: &Path) -> Result<VitalsConfig> {
    if !path.exists() {
        return Ok(VitalsConfig::default());
    }

    let content = fs_err::read_to_string(path).map_err(|source| VitalsError::Io {
        context: format!("reading config {}", path.display()),
        source,
    })?;
    toml::from_str::<VitalsConfig>(&content).map_err(|err| VitalsError::ConfigMalformed {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_config_defaults_when_file_missing() {
        let temp = tempdir().unwrap();
        let config = load_config(&temp.path().join("missing.toml")).unwrap();
        assert_eq!(config, VitalsConfig::default());
        assert_eq!(config.refresh_interval(), Duration::from_secs(3));
        assert_eq!(config.maintenance_interval(), Duration::from_millis(500));
    }

    #[test]
    fn load_config_parses_partial_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");
        fs_err::write(
            &path,
            r#"
characters = ["Wondolio", "  ", "Sintaroh "]
data_roots = ["/games/healthcheck"]
stale_after_secs = 15.0
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.tracked_characters(), vec!["Wondolio", "Sintaroh"]);
        assert_eq!(config.data_roots, vec![PathBuf::from("/games/healthcheck")]);
        assert_eq!(config.stale_after_secs, 15.0);
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(config.command_prefix, "/");
    }

    #[test]
    fn load_config_reports_malformed_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");
        fs_err::write(&path, "characters = [").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, VitalsError::ConfigMalformed { .. }));
    }

    #[test]
    fn explicit_path_wins() {
        let storage = StoragePaths::with_root(PathBuf::from("/tmp/vitals"));
        let path = resolve_config_path(Some(PathBuf::from("/etc/vitals.toml")), &storage);
        assert_eq!(path, PathBuf::from("/etc/vitals.toml"));
    }

    #[test]
    fn data_root_override_applies_to_storage() {
        let config = VitalsConfig {
            data_roots: vec![PathBuf::from("/data")],
            ..VitalsConfig::default()
        };
        let storage = config.apply_to(StoragePaths::with_root(PathBuf::from("/tmp/vitals")));
        assert_eq!(storage.data_roots(), &[PathBuf::from("/data")]);
    }
}
