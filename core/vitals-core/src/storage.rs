//! Storage configuration and path management for Vitals HUD.
//!
//! `StoragePaths` centralizes every path decision: where our own files live
//! (`~/.vitals-hud/`) and which directories are searched for the addon's
//! health data files. Tests inject temp directories through
//! [`StoragePaths::with_root`] and [`StoragePaths::with_data_roots`].

use std::path::{Path, PathBuf};

use crate::error::{Result, VitalsError};

const APP_DIR_NAME: &str = ".vitals-hud";

/// Central configuration for all Vitals HUD paths.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    /// Root directory for our own data (default: ~/.vitals-hud)
    root: PathBuf,
    /// Ordered candidate directories holding addon data files. First match wins.
    data_roots: Vec<PathBuf>,
}

impl StoragePaths {
    /// Paths rooted at the user's home directory, searching the default roots.
    pub fn from_home() -> Result<Self> {
        let home = dirs::home_dir().ok_or(VitalsError::HomeDirNotFound)?;
        Ok(Self {
            root: home.join(APP_DIR_NAME),
            data_roots: default_data_roots(),
        })
    }

    /// Custom root directory, default data roots.
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            root,
            data_roots: default_data_roots(),
        }
    }

    /// Replaces the candidate data roots. An empty list keeps the current roots.
    pub fn with_data_roots(mut self, data_roots: Vec<PathBuf>) -> Self {
        if !data_roots.is_empty() {
            self.data_roots = data_roots;
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_roots(&self) -> &[PathBuf] {
        &self.data_roots
    }

    /// Path to config.toml.
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Path to the rolling log directory.
    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Candidate roots that currently exist on disk.
    pub fn existing_data_roots(&self) -> Vec<PathBuf> {
        self.data_roots
            .iter()
            .filter(|root| root.is_dir())
            .cloned()
            .collect()
    }
}

/// Platform install locations of the HealthCheck addon's data directory.
pub fn default_data_roots() -> Vec<PathBuf> {
    let mut roots = vec![
        PathBuf::from(r"C:\Program Files (x86)\Windower\addons\HealthCheck\data"),
        PathBuf::from(r"C:\Program Files\Windower\addons\HealthCheck\data"),
        PathBuf::from(r"C:\Windower\addons\HealthCheck\data"),
    ];
    if let Some(home) = dirs::home_dir() {
        roots.push(
            home.join("Documents")
                .join("Windower")
                .join("addons")
                .join("HealthCheck")
                .join("data"),
        );
    }
    roots
}
