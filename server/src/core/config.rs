//! Application configuration
//!
//! Layered the way the reference configuration module is layered, just over a
//! much smaller surface: compiled-in defaults, overridden by environment
//! variables, overridden by explicit CLI flags. There is no config-file layer
//! here — the surface is small enough that CLI+env+defaults is sufficient.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};

use super::cli::CliConfig;
use super::constants::{
    DEFAULT_DISCOVERY_TTL_SECS, DEFAULT_GC_BACKUP_INTERVAL_SECS, DEFAULT_GC_CLEAN_INTERVAL_SECS,
    DEFAULT_GC_TICK_BUDGET_MS,
};

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// In-memory map; no persistence across restarts. Default for local development.
    #[default]
    Memory,
    /// On-disk log-structured store; survives restarts.
    Rocksdb,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Rocksdb => write!(f, "rocksdb"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "rocksdb" => Ok(Self::Rocksdb),
            other => Err(format!(
                "invalid storage backend '{other}'. Valid options: memory, rocksdb"
            )),
        }
    }
}

/// Garbage-collection tuning, one set shared by every non-persistent topic's
/// background worker.
#[derive(Debug, Clone, Copy)]
pub struct GcConfig {
    pub backup_interval: Duration,
    pub clean_interval: Duration,
    pub tick_budget: Duration,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            backup_interval: Duration::from_secs(DEFAULT_GC_BACKUP_INTERVAL_SECS),
            clean_interval: Duration::from_secs(DEFAULT_GC_CLEAN_INTERVAL_SECS),
            tick_budget: Duration::from_millis(DEFAULT_GC_TICK_BUDGET_MS),
        }
    }
}

/// Service-discovery configuration. Absent (`endpoints.is_empty()`) means the
/// queue manager runs with a no-op discovery client.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryConfig {
    pub endpoints: Vec<String>,
    pub namespace: String,
    pub ttl: Duration,
    pub self_addr: String,
}

impl DiscoveryConfig {
    pub fn enabled(&self) -> bool {
        !self.endpoints.is_empty()
    }
}

/// Final, validated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: Option<PathBuf>,
    pub storage_backend: StorageBackend,
    pub gc: GcConfig,
    pub discovery: DiscoveryConfig,
}

impl AppConfig {
    /// Build the final configuration from parsed CLI flags (env vars were
    /// already folded into `CliConfig` by clap's `env = ...` bindings).
    pub fn load(cli: &CliConfig) -> Result<Self> {
        let gc = GcConfig {
            backup_interval: Duration::from_secs(
                cli.gc_backup_interval_secs
                    .unwrap_or(DEFAULT_GC_BACKUP_INTERVAL_SECS),
            ),
            clean_interval: Duration::from_secs(
                cli.gc_clean_interval_secs
                    .unwrap_or(DEFAULT_GC_CLEAN_INTERVAL_SECS),
            ),
            tick_budget: Duration::from_millis(
                cli.gc_tick_budget_ms.unwrap_or(DEFAULT_GC_TICK_BUDGET_MS),
            ),
        };

        let endpoints = cli
            .discovery_endpoints
            .as_deref()
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let discovery = DiscoveryConfig {
            endpoints,
            namespace: cli.discovery_namespace.clone().unwrap_or_default(),
            ttl: Duration::from_secs(
                cli.discovery_ttl_secs.unwrap_or(DEFAULT_DISCOVERY_TTL_SECS),
            ),
            self_addr: cli.self_addr.clone().unwrap_or_else(|| "local".to_string()),
        };

        let config = Self {
            data_dir: cli.data_dir.clone(),
            storage_backend: cli.storage_backend.unwrap_or_default(),
            gc,
            discovery,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.discovery.enabled() && self.discovery.namespace.is_empty() {
            bail!("discovery namespace must be set when discovery endpoints are configured");
        }
        if self.gc.clean_interval.is_zero() {
            bail!("GC clean interval must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!(
            "memory".parse::<StorageBackend>().unwrap(),
            StorageBackend::Memory
        );
        assert_eq!(
            "ROCKSDB".parse::<StorageBackend>().unwrap(),
            StorageBackend::Rocksdb
        );
        assert!("bogus".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_load_defaults() {
        let cli = CliConfig::default();
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.gc.clean_interval, Duration::from_secs(20));
    }

    #[test]
    fn test_validate_rejects_discovery_without_namespace() {
        let mut cli = CliConfig::default();
        cli.discovery_endpoints = Some("http://localhost:2379".to_string());
        assert!(AppConfig::load(&cli).is_err());
    }
}
