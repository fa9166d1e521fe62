//! Minimal HTTP reference discovery client. Treats the configured endpoint
//! as a flat key/value registry: `PUT <endpoint>/<key>` sets a value (with
//! an optional `?ttl=<secs>`), `GET <endpoint>/<ns>/topics` lists entries
//! under the topics prefix, `DELETE <endpoint>/<key>` removes one. The
//! external registry's own wire protocol is out of scope here; this client
//! only needs to speak whatever subset of it the interactions in use.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{DiscoveredEntity, DiscoveryClient, DiscoveryError};

pub struct HttpDiscoveryClient {
    client: Client,
    endpoint: String,
    namespace: String,
}

impl HttpDiscoveryClient {
    pub fn new(endpoint: String, namespace: String) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            namespace,
        }
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.namespace, key)
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), DiscoveryError> {
        let mut req = self.client.put(self.url(key)).body(value.to_string());
        if let Some(ttl) = ttl {
            req = req.query(&[("ttl", ttl.as_secs().to_string())]);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| DiscoveryError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(DiscoveryError::Request(format!(
                "PUT {} returned {}",
                key,
                resp.status()
            )));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), DiscoveryError> {
        let resp = self
            .client
            .delete(self.url(key))
            .send()
            .await
            .map_err(|e| DiscoveryError::Request(e.to_string()))?;
        if !resp.status().is_success() && resp.status().as_u16() != 404 {
            return Err(DiscoveryError::Request(format!(
                "DELETE {} returned {}",
                key,
                resp.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DiscoveryClient for HttpDiscoveryClient {
    async fn register_self(&self, self_addr: &str, ttl: Duration) -> Result<(), DiscoveryError> {
        self.put(&format!("servers/{self_addr}"), "", Some(ttl)).await
    }

    async fn refresh_self(&self, self_addr: &str, ttl: Duration) -> Result<(), DiscoveryError> {
        self.register_self(self_addr, ttl).await
    }

    async fn deregister_self(&self, self_addr: &str) -> Result<(), DiscoveryError> {
        self.delete(&format!("servers/{self_addr}")).await
    }

    async fn create_topic(&self, topic: &str) -> Result<(), DiscoveryError> {
        self.put(&format!("topics/{topic}"), "", None).await
    }

    async fn create_line(&self, topic: &str, line: &str, recycle: &str) -> Result<(), DiscoveryError> {
        self.put(&format!("topics/{topic}/{line}"), recycle, None).await
    }

    async fn remove_topic(&self, topic: &str) -> Result<(), DiscoveryError> {
        self.delete(&format!("topics/{topic}")).await
    }

    async fn remove_line(&self, topic: &str, line: &str) -> Result<(), DiscoveryError> {
        self.delete(&format!("topics/{topic}/{line}")).await
    }

    async fn pull_existing(&self) -> Result<Vec<DiscoveredEntity>, DiscoveryError> {
        let resp = self
            .client
            .get(format!("{}/{}/topics", self.endpoint, self.namespace))
            .send()
            .await
            .map_err(|e| DiscoveryError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(DiscoveryError::Request(format!(
                "GET topics returned {}",
                resp.status()
            )));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| DiscoveryError::Request(e.to_string()))?;
        Ok(parse_topic_listing(&body))
    }
}

/// Parse a `topic[/line]=recycle` per-line listing into entities. The exact
/// registry wire format is out of scope; this is the shape a
/// line-delimited reference registry would return.
fn parse_topic_listing(body: &str) -> Vec<DiscoveredEntity> {
    body.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let (path, recycle) = line.split_once('=').unwrap_or((line, ""));
            let mut segments = path.trim().splitn(2, '/');
            let topic = segments.next()?.to_string();
            let line_name = segments.next().map(str::to_string);
            Some(DiscoveredEntity {
                topic,
                line: line_name,
                recycle: recycle.trim().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_topic_listing() {
        let body = "foo=\nfoo/x=10s\nbar=\n";
        let entities = parse_topic_listing(body);
        assert_eq!(entities.len(), 3);
        assert_eq!(entities[0].topic, "foo");
        assert_eq!(entities[0].line, None);
        assert_eq!(entities[1].topic, "foo");
        assert_eq!(entities[1].line.as_deref(), Some("x"));
        assert_eq!(entities[1].recycle, "10s");
    }
}
