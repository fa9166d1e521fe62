//! Startup banner

use super::config::{AppConfig, StorageBackend};
use super::constants::APP_NAME;

/// Print the startup banner summarizing how the broker is configured.
pub fn print_banner(config: &AppConfig, data_dir: &str) {
    println!();
    println!(
        "  \x1b[1m\x1b[36m{}\x1b[0m \x1b[90mv{}\x1b[0m",
        APP_NAME,
        env!("CARGO_PKG_VERSION")
    );
    println!();

    const W: usize = 18;
    let backend = match config.storage_backend {
        StorageBackend::Memory => "memory (not persisted)",
        StorageBackend::Rocksdb => "rocksdb",
    };
    println!("  \x1b[32m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m {}", "Storage:", backend);
    println!("  \x1b[90m➜  {:<W$} {}\x1b[0m", "Data:", data_dir);

    if config.discovery.enabled() {
        println!(
            "  \x1b[33m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m {} (ns={})",
            "Discovery:",
            config.discovery.endpoints.join(","),
            config.discovery.namespace
        );
    } else {
        println!("  \x1b[90m➜  {:<W$} disabled\x1b[0m", "Discovery:");
    }

    println!();
}
