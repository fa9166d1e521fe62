//! Optional service-discovery capability: advertises this node's
//! topics/lines to an external registry and pulls existing entries back in
//! on startup. Behind a trait so the core never depends on a concrete
//! discovery backend; failures here are always logged and non-fatal.

pub mod error;
pub mod http;
pub mod noop;

use std::time::Duration;

use async_trait::async_trait;

pub use error::DiscoveryError;
pub use http::HttpDiscoveryClient;
pub use noop::NoopDiscoveryClient;

/// A topic or line entry pulled from the discovery registry on startup.
#[derive(Debug, Clone)]
pub struct DiscoveredEntity {
    pub topic: String,
    pub line: Option<String>,
    /// Recycle string for lines; empty for topics.
    pub recycle: String,
}

#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Register this node's address under `<ns>/servers/<self-addr>` with a TTL.
    async fn register_self(&self, self_addr: &str, ttl: Duration) -> Result<(), DiscoveryError>;

    /// Refresh the self-registration TTL. Called on every tick (~TTL/2).
    async fn refresh_self(&self, self_addr: &str, ttl: Duration) -> Result<(), DiscoveryError>;

    /// Remove this node's self-registration. Called on shutdown.
    async fn deregister_self(&self, self_addr: &str) -> Result<(), DiscoveryError>;

    /// Create `<ns>/topics/<topic>` on local topic creation.
    async fn create_topic(&self, topic: &str) -> Result<(), DiscoveryError>;

    /// Set `<ns>/topics/<topic>/<line>` to the recycle string on local line creation.
    async fn create_line(&self, topic: &str, line: &str, recycle: &str) -> Result<(), DiscoveryError>;

    /// Delete the corresponding topic or line entry.
    async fn remove_topic(&self, topic: &str) -> Result<(), DiscoveryError>;
    async fn remove_line(&self, topic: &str, line: &str) -> Result<(), DiscoveryError>;

    /// Pull every existing `<ns>/topics/...` entry, used at startup to
    /// re-create topics/lines this node is missing locally.
    async fn pull_existing(&self) -> Result<Vec<DiscoveredEntity>, DiscoveryError>;
}
