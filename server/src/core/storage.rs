//! Platform-aware data storage directory management
//!
//! ## Platform Paths
//!
//! | Type | Windows | macOS | Linux |
//! |------|---------|-------|-------|
//! | Data | `%APPDATA%\UQueue\` | `~/Library/Application Support/UQueue/` | `$XDG_DATA_HOME/uqueue/` |

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;

use super::constants::{APP_DOT_FOLDER, APP_NAME, ENV_DATA_DIR, ROCKSDB_DIR_NAME};
use crate::utils::file::expand_path;

/// Application storage manager: resolves and creates the on-disk data directory.
#[derive(Debug, Clone)]
pub struct AppStorage {
    data_dir: PathBuf,
}

impl AppStorage {
    /// Initialize storage with a platform-appropriate data directory, or an
    /// explicit override when `data_dir` is given (e.g. from `--data-dir`).
    pub async fn init(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.unwrap_or_else(Self::resolve_data_dir);
        Self::ensure_directories(&data_dir).await?;
        let data_dir = data_dir.canonicalize().unwrap_or(data_dir);
        tracing::debug!(data_dir = %data_dir.display(), "storage directory initialized");
        Ok(Self { data_dir })
    }

    /// Resolve data directory from env var or platform default.
    pub fn resolve_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            return expand_path(&dir);
        }
        if let Some(proj_dirs) = ProjectDirs::from("", "", APP_NAME) {
            return proj_dirs.data_dir().to_path_buf();
        }
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        cwd.join(APP_DOT_FOLDER)
    }

    async fn ensure_directories(data_dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
        let rocksdb_path = data_dir.join(ROCKSDB_DIR_NAME);
        tokio::fs::create_dir_all(&rocksdb_path)
            .await
            .with_context(|| {
                format!(
                    "failed to create rocksdb directory: {}",
                    rocksdb_path.display()
                )
            })?;
        Ok(())
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the path to the RocksDB data subdirectory.
    pub fn rocksdb_path(&self) -> PathBuf {
        self.data_dir.join(ROCKSDB_DIR_NAME)
    }

    /// Create `AppStorage` for testing with a specific data directory.
    #[cfg(test)]
    pub fn init_for_test(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_data_dir_fallback() {
        // SAFETY: test runs single-threaded, no concurrent access to env var
        unsafe { std::env::remove_var(ENV_DATA_DIR) };
        let path = AppStorage::resolve_data_dir();
        assert!(!path.as_os_str().is_empty());
    }

    #[test]
    fn test_rocksdb_path() {
        let storage = AppStorage::init_for_test(PathBuf::from("/tmp/uqueue-test"));
        assert_eq!(
            storage.rocksdb_path(),
            PathBuf::from("/tmp/uqueue-test/rocksdb")
        );
    }
}
