use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::config::StorageBackend;
use super::constants::{
    ENV_DATA_DIR, ENV_DISCOVERY_ENDPOINTS, ENV_DISCOVERY_NAMESPACE, ENV_DISCOVERY_TTL_SECS,
    ENV_GC_BACKUP_INTERVAL_SECS, ENV_GC_CLEAN_INTERVAL_SECS, ENV_GC_TICK_BUDGET_MS,
    ENV_SELF_ADDR, ENV_STORAGE_BACKEND,
};

#[derive(Parser)]
#[command(name = "uqueue")]
#[command(version, about = "Persistent multi-protocol message-queue broker core", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory where persisted queue state lives
    #[arg(long, global = true, env = ENV_DATA_DIR)]
    pub data_dir: Option<PathBuf>,

    /// Storage backend (memory or rocksdb)
    #[arg(long, global = true, env = ENV_STORAGE_BACKEND, value_parser = parse_storage_backend)]
    pub storage_backend: Option<StorageBackend>,

    /// GC backup-tick interval in seconds (persists line/topic metadata)
    #[arg(long, global = true, env = ENV_GC_BACKUP_INTERVAL_SECS)]
    pub gc_backup_interval_secs: Option<u64>,

    /// GC clean-tick interval in seconds (reclaims acknowledged prefixes)
    #[arg(long, global = true, env = ENV_GC_CLEAN_INTERVAL_SECS)]
    pub gc_clean_interval_secs: Option<u64>,

    /// Per-tick wall-clock budget for the clean tick, in milliseconds
    #[arg(long, global = true, env = ENV_GC_TICK_BUDGET_MS)]
    pub gc_tick_budget_ms: Option<u64>,

    /// Comma-separated list of service-discovery endpoints
    #[arg(long, global = true, env = ENV_DISCOVERY_ENDPOINTS)]
    pub discovery_endpoints: Option<String>,

    /// Service-discovery namespace prefix
    #[arg(long, global = true, env = ENV_DISCOVERY_NAMESPACE)]
    pub discovery_namespace: Option<String>,

    /// Service-discovery registration TTL in seconds
    #[arg(long, global = true, env = ENV_DISCOVERY_TTL_SECS)]
    pub discovery_ttl_secs: Option<u64>,

    /// Self-address advertised to service discovery
    #[arg(long, global = true, env = ENV_SELF_ADDR)]
    pub self_addr: Option<String>,
}

/// Parse storage backend from CLI/env string
fn parse_storage_backend(s: &str) -> Result<StorageBackend, String> {
    s.parse()
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the broker (default command)
    Start,
    /// System maintenance commands
    System {
        #[command(subcommand)]
        command: SystemCommands,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum SystemCommands {
    /// Delete the local data directory (all topics, lines, and messages). Requires confirmation.
    Prune {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub data_dir: Option<PathBuf>,
    pub storage_backend: Option<StorageBackend>,
    pub gc_backup_interval_secs: Option<u64>,
    pub gc_clean_interval_secs: Option<u64>,
    pub gc_tick_budget_ms: Option<u64>,
    pub discovery_endpoints: Option<String>,
    pub discovery_namespace: Option<String>,
    pub discovery_ttl_secs: Option<u64>,
    pub self_addr: Option<String>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        data_dir: cli.data_dir,
        storage_backend: cli.storage_backend,
        gc_backup_interval_secs: cli.gc_backup_interval_secs,
        gc_clean_interval_secs: cli.gc_clean_interval_secs,
        gc_tick_budget_ms: cli.gc_tick_budget_ms,
        discovery_endpoints: cli.discovery_endpoints,
        discovery_namespace: cli.discovery_namespace,
        discovery_ttl_secs: cli.discovery_ttl_secs,
        self_addr: cli.self_addr,
    };
    (config, cli.command)
}
