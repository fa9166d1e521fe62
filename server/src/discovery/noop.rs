//! No-op discovery client used when no endpoints are configured.

use std::time::Duration;

use async_trait::async_trait;

use super::{DiscoveredEntity, DiscoveryClient, DiscoveryError};

#[derive(Debug, Default)]
pub struct NoopDiscoveryClient;

#[async_trait]
impl DiscoveryClient for NoopDiscoveryClient {
    async fn register_self(&self, _self_addr: &str, _ttl: Duration) -> Result<(), DiscoveryError> {
        Ok(())
    }

    async fn refresh_self(&self, _self_addr: &str, _ttl: Duration) -> Result<(), DiscoveryError> {
        Ok(())
    }

    async fn deregister_self(&self, _self_addr: &str) -> Result<(), DiscoveryError> {
        Ok(())
    }

    async fn create_topic(&self, _topic: &str) -> Result<(), DiscoveryError> {
        Ok(())
    }

    async fn create_line(&self, _topic: &str, _line: &str, _recycle: &str) -> Result<(), DiscoveryError> {
        Ok(())
    }

    async fn remove_topic(&self, _topic: &str) -> Result<(), DiscoveryError> {
        Ok(())
    }

    async fn remove_line(&self, _topic: &str, _line: &str) -> Result<(), DiscoveryError> {
        Ok(())
    }

    async fn pull_existing(&self) -> Result<Vec<DiscoveredEntity>, DiscoveryError> {
        Ok(Vec::new())
    }
}
