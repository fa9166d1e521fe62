use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("discovery request failed: {0}")]
    Request(String),

    #[error("discovery entry not found: {0}")]
    NotFound(String),
}
