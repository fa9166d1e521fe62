//! Core application: aggregates configuration, storage, the queue manager,
//! and graceful shutdown, and owns the process entry point.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::core::banner;
use crate::core::cli::{self, CliConfig, Commands, SystemCommands};
use crate::core::config::AppConfig;
use crate::core::constants::{
    APP_NAME_LOWER, DISCOVERY_WATCH_INTERVAL_SECS, DISCOVERY_WATCH_MAX_BACKOFF_SECS, ENV_LOG,
};
use crate::core::shutdown::ShutdownService;
use crate::core::storage::AppStorage;
use crate::discovery::{DiscoveryClient, HttpDiscoveryClient, NoopDiscoveryClient};
use crate::queue::QueueManager;
use crate::store::StorageService;

pub struct CoreApp {
    pub config: AppConfig,
    pub storage: AppStorage,
    pub queue: Arc<QueueManager>,
    pub shutdown: ShutdownService,
}

impl CoreApp {
    /// Run the application with CLI argument parsing.
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "parsed command");

        match command {
            Some(Commands::System { command: system_cmd }) => {
                return Self::handle_system_command(system_cmd);
            }
            Some(Commands::Start) | None => {}
        }

        let app = Self::init(&cli_config).await?;
        Self::run_until_shutdown(app).await
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli).context("failed to load configuration")?;
        let storage = AppStorage::init(config.data_dir.clone())
            .await
            .context("failed to initialize storage directory")?;

        let storage_service = StorageService::init(config.storage_backend, &storage.rocksdb_path())
            .context("failed to initialize storage backend")?;
        let storage_service: Arc<dyn crate::store::Storage> = Arc::new(storage_service);

        let discovery: Arc<dyn DiscoveryClient> = if config.discovery.enabled() {
            Arc::new(HttpDiscoveryClient::new(
                config.discovery.endpoints[0].clone(),
                config.discovery.namespace.clone(),
            ))
        } else {
            Arc::new(NoopDiscoveryClient)
        };

        let queue = Arc::new(
            QueueManager::new(storage_service, config.discovery.self_addr.clone())
                .with_discovery(discovery)
                .with_gc_config(config.gc),
        );
        queue.load().await.context("failed to load persisted queue state")?;

        let shutdown = ShutdownService::new(queue.clone());

        Ok(Self {
            config,
            storage,
            queue,
            shutdown,
        })
    }

    fn handle_system_command(cmd: SystemCommands) -> Result<()> {
        match cmd {
            SystemCommands::Prune { yes } => Self::prune_data(yes),
        }
    }

    fn prune_data(skip_confirm: bool) -> Result<()> {
        let data_dir = AppStorage::resolve_data_dir();

        if !data_dir.exists() {
            println!(
                "Nothing to prune. Data directory does not exist: {}",
                data_dir.display()
            );
            return Ok(());
        }

        let data_dir = data_dir.canonicalize().unwrap_or(data_dir);

        println!("This will permanently delete the local data directory:");
        println!("  {}", data_dir.display());
        println!();
        println!(
            "Make sure the broker is not running. \
             Deleting data while it is running will cause data corruption."
        );

        if !skip_confirm {
            print!("\nContinue? [y/N] ");
            std::io::Write::flush(&mut std::io::stdout())?;

            let mut input = String::new();
            std::io::stdin().read_line(&mut input)?;

            if !matches!(input.trim().to_lowercase().as_str(), "y" | "yes") {
                println!("Aborted.");
                return Ok(());
            }
        }

        std::fs::remove_dir_all(&data_dir)
            .with_context(|| format!("failed to delete data directory: {}", data_dir.display()))?;
        println!("Pruned: {}", data_dir.display());
        Ok(())
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn run_until_shutdown(app: Self) -> Result<()> {
        app.shutdown.install_signal_handlers();
        app.start_background_tasks().await?;

        banner::print_banner(&app.config, &app.storage.data_dir().display().to_string());

        app.shutdown.wait().await;
        app.shutdown.shutdown().await;

        Ok(())
    }

    /// Spawn the discovery self-registration refresh loop and the discovery
    /// watch-equivalent sync loop, if discovery is configured.
    pub async fn start_background_tasks(&self) -> Result<()> {
        if self.config.discovery.enabled() {
            self.queue.register_self(self.config.discovery.ttl).await;

            let queue = self.queue.clone();
            let ttl = self.config.discovery.ttl;
            let mut shutdown_rx = self.shutdown.subscribe();
            let handle = tokio::spawn(async move {
                let mut interval = tokio::time::interval(ttl / 2);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            queue.refresh_self(ttl).await;
                        }
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            });
            self.shutdown.register(handle).await;

            let queue = self.queue.clone();
            let mut shutdown_rx = self.shutdown.subscribe();
            let handle = tokio::spawn(async move {
                let base_delay = std::time::Duration::from_secs(DISCOVERY_WATCH_INTERVAL_SECS);
                let max_backoff = std::time::Duration::from_secs(DISCOVERY_WATCH_MAX_BACKOFF_SECS);
                let mut backoff = base_delay;
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {
                            match queue.sync_discovery().await {
                                Ok(()) => backoff = base_delay,
                                Err(e) => {
                                    tracing::debug!(error = %e, "discovery watch pull failed, retrying with backoff");
                                    backoff = (backoff * 2).min(max_backoff);
                                }
                            }
                        }
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            });
            self.shutdown.register(handle).await;
        }

        tracing::debug!("background tasks started");
        Ok(())
    }
}
