// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display and platform directories)
pub const APP_NAME: &str = "UQueue";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "uqueue";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".uqueue";

// =============================================================================
// Environment Variables - General
// =============================================================================

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "UQ_LOG";

/// Environment variable to override data directory
pub const ENV_DATA_DIR: &str = "UQ_DATA_DIR";

/// Environment variable for the self-address advertised to service discovery
pub const ENV_SELF_ADDR: &str = "UQ_SELF_ADDR";

// =============================================================================
// Storage Backend
// =============================================================================

/// Environment variable for the storage backend (memory or rocksdb)
pub const ENV_STORAGE_BACKEND: &str = "UQ_STORAGE_BACKEND";

/// RocksDB data subdirectory name
pub const ROCKSDB_DIR_NAME: &str = "rocksdb";

// =============================================================================
// Garbage Collection
// =============================================================================

/// Environment variable for the GC backup-tick interval (seconds)
pub const ENV_GC_BACKUP_INTERVAL_SECS: &str = "UQ_GC_BACKUP_INTERVAL_SECS";

/// Environment variable for the GC clean-tick interval (seconds)
pub const ENV_GC_CLEAN_INTERVAL_SECS: &str = "UQ_GC_CLEAN_INTERVAL_SECS";

/// Environment variable for the GC per-tick delete budget (milliseconds)
pub const ENV_GC_TICK_BUDGET_MS: &str = "UQ_GC_TICK_BUDGET_MS";

/// Default backup-tick interval: how often line/topic metadata is re-persisted
pub const DEFAULT_GC_BACKUP_INTERVAL_SECS: u64 = 10;

/// Default clean-tick interval: how often acknowledged prefixes are reclaimed
pub const DEFAULT_GC_CLEAN_INTERVAL_SECS: u64 = 20;

/// Default wall-clock budget for a single clean tick before yielding
pub const DEFAULT_GC_TICK_BUDGET_MS: u64 = 5_000;

// =============================================================================
// Service Discovery
// =============================================================================

/// Environment variable for a comma-separated list of discovery endpoints
pub const ENV_DISCOVERY_ENDPOINTS: &str = "UQ_DISCOVERY_ENDPOINTS";

/// Environment variable for the discovery namespace prefix
pub const ENV_DISCOVERY_NAMESPACE: &str = "UQ_DISCOVERY_NAMESPACE";

/// Environment variable for the discovery registration TTL (seconds)
pub const ENV_DISCOVERY_TTL_SECS: &str = "UQ_DISCOVERY_TTL_SECS";

/// Default discovery TTL for the self-registration entry
pub const DEFAULT_DISCOVERY_TTL_SECS: u64 = 30;

/// How often the discovery watch loop re-pulls the topic/line listing.
pub const DISCOVERY_WATCH_INTERVAL_SECS: u64 = 5;

/// Upper bound on the backoff delay between retries after a failed
/// discovery watch pull. Disconnects are treated as transient.
pub const DISCOVERY_WATCH_MAX_BACKOFF_SECS: u64 = 60;

// =============================================================================
// Shutdown
// =============================================================================

/// Graceful shutdown timeout in seconds
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Persisted key layout
// =============================================================================

/// Top-level directory key: the list of topic names
pub const TOPLEVEL_DIRECTORY_KEY: &str = "UnitedQueueKey";
