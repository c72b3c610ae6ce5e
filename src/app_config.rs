//! Daemon configuration, loaded from a YAML file or the legacy flag set.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use remotefs::error::FsError;
use remotefs::model::{TierFeatures, TierRole};
use remotefs::tier::{LocalTier, LocalTierConfig, Tier};

pub const DEFAULT_SERVER_ADDR: &str = ":8080";

/// Top-level daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// FUSE mount point.
    pub mount: PathBuf,

    /// HTTP bind address (host:port, or `:port` for every interface).
    #[serde(default = "default_server_addr")]
    pub server_addr: String,

    /// Tiers in chain order; index 0 is consulted first.
    pub filesystems: Vec<TierSpec>,
}

fn default_server_addr() -> String {
    DEFAULT_SERVER_ADDR.to_owned()
}

/// One tier of the chain.
#[derive(Debug, Clone, Deserialize)]
pub struct TierSpec {
    #[serde(rename = "type", default)]
    pub kind: TierKind,
    pub role: TierRole,
    pub path: PathBuf,
    /// Byte budget, required for cache-role tiers.
    #[serde(default)]
    pub max_size: u64,
    #[serde(default)]
    pub can_update: bool,
    #[serde(default)]
    pub can_delete: bool,
    #[serde(default)]
    pub can_lock: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    #[default]
    Local,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("error reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("error parsing config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("configuration is invalid:\n{}", .0.join("\n"))]
    Validation(Vec<String>),
}

impl Config {
    /// Load and validate a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "loading configuration file");
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    /// Build the configuration the legacy flag set describes: a single tier
    /// with every capability enabled.
    pub fn legacy(
        master: PathBuf,
        mount: PathBuf,
        server_addr: String,
        role: TierRole,
        cache_size: u64,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            mount,
            server_addr,
            filesystems: vec![TierSpec {
                kind: TierKind::Local,
                role,
                path: master,
                max_size: cache_size,
                can_update: true,
                can_delete: true,
                can_lock: true,
            }],
        };
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    /// Check the chain-level rules, collecting every violation.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.mount.as_os_str().is_empty() {
            errors.push("mount point is required".to_owned());
        }
        if self.filesystems.is_empty() {
            errors.push("at least one filesystem is required".to_owned());
        }

        for (i, spec) in self.filesystems.iter().enumerate() {
            if spec.can_lock && i > 0 {
                errors.push(
                    "only the first filesystem in the chain can support locking".to_owned(),
                );
            }
            if spec.role == TierRole::Cache && spec.max_size == 0 {
                errors.push(format!(
                    "cache filesystem '{}' requires a positive max_size",
                    spec.path.display()
                ));
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Instantiate the configured tiers, in chain order.
pub fn build_tiers(config: &Config) -> Result<Vec<Box<dyn Tier>>, FsError> {
    let mut tiers: Vec<Box<dyn Tier>> = Vec::with_capacity(config.filesystems.len());
    for spec in &config.filesystems {
        match spec.kind {
            TierKind::Local => {
                let tier = LocalTier::open(LocalTierConfig {
                    root: spec.path.clone(),
                    role: spec.role,
                    features: TierFeatures {
                        can_update: spec.can_update,
                        can_delete: spec.can_delete,
                        can_lock: spec.can_lock,
                    },
                    max_size: spec.max_size,
                })?;
                tiers.push(Box::new(tier));
            }
        }
    }
    Ok(tiers)
}
