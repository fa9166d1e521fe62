//! The queue engine: topic/line registry, key dispatch, and the public
//! push/pop/confirm protocol.

pub mod duration;
pub mod error;
pub mod key;
pub mod line;
pub mod topic;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

pub use error::QueueError;
use key::Key;
pub use line::{Line, LineStat};
pub use topic::{Topic, TopicStat};

use crate::core::config::GcConfig;
use crate::core::constants::TOPLEVEL_DIRECTORY_KEY;
use crate::discovery::{DiscoveredEntity, DiscoveryClient, NoopDiscoveryClient};
use crate::store::codec;
use crate::store::Storage;

/// Top-level registry of topics; owns `Storage` and the discovery client,
/// and dispatches every public operation to the right topic/line by parsing
/// a path-like key.
pub struct QueueManager {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    storage: Arc<dyn Storage>,
    discovery: Arc<dyn DiscoveryClient>,
    self_addr: String,
    gc_config: GcConfig,
    /// Keys (`"topic"` or `"topic/line"`) of entities this node created
    /// because discovery told it to, not because a client called `create`.
    /// Bounds how far the periodic discovery sync is allowed to propagate a
    /// removal: only entities this node itself pulled in are ever torn down
    /// when they vanish from the registry.
    discovery_tracked: RwLock<HashSet<String>>,
}

/// Either a topic snapshot (with its line names) or a single line snapshot,
/// depending on how many segments `stat`'s key had.
pub enum Stat {
    Topic(TopicStat),
    Line(LineStat),
}

impl QueueManager {
    pub fn new(storage: Arc<dyn Storage>, self_addr: String) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            storage,
            discovery: Arc::new(NoopDiscoveryClient),
            self_addr,
            gc_config: GcConfig::default(),
            discovery_tracked: RwLock::new(HashSet::new()),
        }
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn DiscoveryClient>) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_gc_config(mut self, gc_config: GcConfig) -> Self {
        self.gc_config = gc_config;
        self
    }

    /// Rehydrate every persisted topic/line from storage, then (if
    /// discovery is configured) pull and re-create any entities this node
    /// is missing locally, and register this node's self-address.
    pub async fn load(self: &Arc<Self>) -> Result<(), QueueError> {
        let names = match self.storage.get(TOPLEVEL_DIRECTORY_KEY).await? {
            Some(bytes) => codec::decode_topic_directory(&bytes)?,
            None => Vec::new(),
        };

        for name in names {
            self.load_topic(&name).await?;
        }

        if let Ok(entities) = self.discovery.pull_existing().await {
            self.reconcile_discovered(&entities).await;
        }

        Ok(())
    }

    async fn load_topic(self: &Arc<Self>, name: &str) -> Result<(), QueueError> {
        let dir_bytes = self.storage.get(name).await?;
        let Some(dir_bytes) = dir_bytes else {
            return Ok(());
        };
        let dir = codec::decode_topic(&dir_bytes)?;

        let head = match self.storage.get(&format!("{name}:head")).await? {
            Some(b) => codec::decode_u64(&b)?,
            None => 0,
        };
        let tail = match self.storage.get(&format!("{name}:tail")).await? {
            Some(b) => codec::decode_u64(&b)?,
            None => 0,
        };

        let topic = Topic::from_persisted(
            name.to_string(),
            dir.persist,
            head,
            tail,
            self.storage.clone(),
            self.discovery.clone(),
            self.gc_config,
        );
        topic.attach_queue(Arc::downgrade(self)).await;

        for line_name in &dir.lines {
            let recycle_str = self
                .storage
                .get(&format!("{name}/{line_name}:recycle"))
                .await?
                .map(|b| String::from_utf8_lossy(&b).into_owned())
                .unwrap_or_default();
            let recycle = duration::parse_recycle(&recycle_str).unwrap_or_default();
            let line_head = match self.storage.get(&format!("{name}/{line_name}:head")).await? {
                Some(b) => codec::decode_u64(&b)?,
                None => 0,
            };
            let state = match self.storage.get(&format!("{name}/{line_name}")).await? {
                Some(b) => codec::decode_line(&b)?,
                None => codec::LineState { inflight: Vec::new(), ihead: line_head },
            };
            let line = Arc::new(Line::from_persisted(
                line_name.clone(),
                name.to_string(),
                recycle,
                line_head,
                state,
                self.storage.clone(),
                self.discovery.clone(),
                Arc::downgrade(&topic),
            ));
            topic.insert_line(line).await;
        }

        self.topics.write().await.insert(name.to_string(), topic);
        Ok(())
    }

    /// Discovery key for an entity: `"topic"` or `"topic/line"`.
    fn discovery_key(entity: &DiscoveredEntity) -> String {
        match &entity.line {
            Some(line) => format!("{}/{}", entity.topic, line),
            None => entity.topic.clone(),
        }
    }

    /// Re-create any topic/line this node is missing locally from a
    /// discovery listing, without echoing the creation back to discovery
    /// — entity creation is recorded as discovery-originated.
    async fn reconcile_discovered(self: &Arc<Self>, entities: &[DiscoveredEntity]) {
        for entity in entities {
            let key = Self::discovery_key(entity);
            if self.topics.read().await.contains_key(&entity.topic) {
                if let Some(line_name) = &entity.line {
                    if let Some(topic) = self.topics.read().await.get(&entity.topic).cloned() {
                        if topic.line(line_name).await.is_none() {
                            if topic.create_line_from_discovery(line_name, &entity.recycle).await.is_ok() {
                                self.discovery_tracked.write().await.insert(key);
                            }
                        }
                    }
                }
                continue;
            }
            let topic = Topic::new_with_gc(
                entity.topic.clone(),
                false,
                self.storage.clone(),
                self.discovery.clone(),
                self.gc_config,
            );
            topic.attach_queue(Arc::downgrade(self)).await;
            self.topics.write().await.insert(entity.topic.clone(), topic.clone());
            self.discovery_tracked.write().await.insert(entity.topic.clone());
            if let Some(line_name) = &entity.line {
                if topic.create_line_from_discovery(line_name, &entity.recycle).await.is_ok() {
                    self.discovery_tracked.write().await.insert(key);
                }
            }
        }
    }

    /// One iteration of the discovery long-poll equivalent:
    /// pull the current registry listing, reconcile in anything new, then
    /// tear down any entity this node adopted from discovery earlier that
    /// has since vanished from the listing. Entities created locally (never
    /// tracked as discovery-originated) are never touched by the removal
    /// side, even if the listing temporarily omits them.
    pub async fn sync_discovery(self: &Arc<Self>) -> Result<(), QueueError> {
        let entities = self
            .discovery
            .pull_existing()
            .await
            .map_err(|e| QueueError::Internal(e.to_string()))?;

        self.reconcile_discovered(&entities).await;

        let current: HashSet<String> = entities.iter().map(Self::discovery_key).collect();
        let vanished: Vec<String> = {
            let tracked = self.discovery_tracked.read().await;
            tracked.difference(&current).cloned().collect()
        };

        for vanished_key in vanished {
            match key::parse(&vanished_key) {
                Ok(Key::Topic(name)) => {
                    if let Some(topic) = self.topics.write().await.remove(&name) {
                        let _ = topic.remove_from_discovery().await;
                    }
                }
                Ok(Key::Line(topic_name, line_name)) => {
                    if let Some(topic) = self.topics.read().await.get(&topic_name).cloned() {
                        let _ = topic.remove_line_from_discovery(&line_name).await;
                    }
                }
                _ => {}
            }
            self.discovery_tracked.write().await.remove(&vanished_key);
        }

        Ok(())
    }

    async fn persist_topic_directory(&self) -> Result<(), QueueError> {
        let names: Vec<String> = self.topics.read().await.keys().cloned().collect();
        self.storage
            .set(TOPLEVEL_DIRECTORY_KEY, codec::encode_topic_directory(&names))
            .await?;
        Ok(())
    }

    /// `create(key, arg)`: one segment creates a topic, two create a
    /// line on an existing topic.
    pub async fn create(self: &Arc<Self>, key: &str, arg: &str) -> Result<(), QueueError> {
        match key::parse(key)? {
            Key::Topic(name) => {
                let mut topics = self.topics.write().await;
                if topics.contains_key(&name) {
                    return Err(QueueError::TopicExisted(name));
                }
                let persist = arg == "persist";
                let topic = Topic::new_with_gc(
                    name.clone(),
                    persist,
                    self.storage.clone(),
                    self.discovery.clone(),
                    self.gc_config,
                );
                topic.attach_queue(Arc::downgrade(self)).await;
                topics.insert(name.clone(), topic);
                drop(topics);
                self.persist_topic_directory().await?;
                if let Err(e) = self.discovery.create_topic(&name).await {
                    tracing::warn!(error = %e, topic = %name, "discovery create_topic failed");
                }
                Ok(())
            }
            Key::Line(topic_name, line_name) => {
                let topic = self.topic(&topic_name).await?;
                topic.create_line(&line_name, arg).await
            }
            Key::Message(..) => Err(QueueError::BadKey(key.to_string())),
        }
    }

    async fn topic(&self, name: &str) -> Result<Arc<Topic>, QueueError> {
        self.topics
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| QueueError::TopicNotExisted(name.to_string()))
    }

    async fn line_of(&self, topic_name: &str, line_name: &str) -> Result<Arc<Line>, QueueError> {
        let topic = self.topic(topic_name).await?;
        topic
            .line(line_name)
            .await
            .ok_or_else(|| QueueError::LineNotExisted(format!("{topic_name}/{line_name}")))
    }

    pub async fn push(&self, topic_name: &str, data: Vec<u8>) -> Result<u64, QueueError> {
        self.topic(topic_name).await?.push(data).await
    }

    pub async fn m_push(&self, topic_name: &str, items: Vec<Vec<u8>>) -> Result<(u64, u64), QueueError> {
        self.topic(topic_name).await?.m_push(items).await
    }

    pub async fn pop(&self, key: &str) -> Result<(String, Vec<u8>), QueueError> {
        match key::parse(key)? {
            Key::Line(topic_name, line_name) => self.line_of(&topic_name, &line_name).await?.pop().await,
            _ => Err(QueueError::BadKey(key.to_string())),
        }
    }

    pub async fn m_pop(&self, key: &str, n: usize) -> Result<(Vec<String>, Vec<Vec<u8>>), QueueError> {
        match key::parse(key)? {
            Key::Line(topic_name, line_name) => self.line_of(&topic_name, &line_name).await?.m_pop(n).await,
            _ => Err(QueueError::BadKey(key.to_string())),
        }
    }

    pub async fn confirm(&self, key: &str) -> Result<(), QueueError> {
        match key::parse(key)? {
            Key::Message(topic_name, line_name, id) => {
                self.line_of(&topic_name, &line_name).await?.confirm(id).await
            }
            _ => Err(QueueError::BadKey(key.to_string())),
        }
    }

    /// `mConfirm`: per-item errors, never fails as a whole.
    pub async fn m_confirm(&self, keys: &[String]) -> Vec<Result<(), QueueError>> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.confirm(key).await);
        }
        results
    }

    pub async fn stat(&self, key: &str) -> Result<Stat, QueueError> {
        match key::parse(key)? {
            Key::Topic(name) => Ok(Stat::Topic(self.topic(&name).await?.stat().await)),
            Key::Line(topic_name, line_name) => {
                Ok(Stat::Line(self.line_of(&topic_name, &line_name).await?.stat().await?))
            }
            Key::Message(..) => Err(QueueError::BadKey(key.to_string())),
        }
    }

    /// `empty(key)`: a line clears its own backlog; a topic empties
    /// every line then advances `head` to `tail`.
    pub async fn empty(&self, key: &str) -> Result<(), QueueError> {
        match key::parse(key)? {
            Key::Topic(name) => self.topic(&name).await?.empty().await,
            Key::Line(topic_name, line_name) => self.line_of(&topic_name, &line_name).await?.empty().await,
            Key::Message(..) => Err(QueueError::BadKey(key.to_string())),
        }
    }

    /// `remove(key)`: a line removes itself and its state; a topic
    /// removes all its lines, cursors, and message payloads.
    pub async fn remove(&self, key: &str) -> Result<(), QueueError> {
        match key::parse(key)? {
            Key::Topic(name) => {
                let topic = self
                    .topics
                    .write()
                    .await
                    .remove(&name)
                    .ok_or_else(|| QueueError::TopicNotExisted(name.clone()))?;
                topic.remove().await?;
                self.persist_topic_directory().await?;
                Ok(())
            }
            Key::Line(topic_name, line_name) => self.topic(&topic_name).await?.remove_line(&line_name).await,
            Key::Message(..) => Err(QueueError::BadKey(key.to_string())),
        }
    }

    /// Register this node's self-address with discovery, non-fatal on
    /// failure.
    pub async fn register_self(&self, ttl: std::time::Duration) {
        if let Err(e) = self.discovery.register_self(&self.self_addr, ttl).await {
            tracing::warn!(error = %e, self_addr = %self.self_addr, "discovery register_self failed");
        }
    }

    /// Refresh this node's self-registration TTL with discovery, non-fatal
    /// on failure. Called on every tick of the TTL refresh loop.
    pub async fn refresh_self(&self, ttl: std::time::Duration) {
        if let Err(e) = self.discovery.refresh_self(&self.self_addr, ttl).await {
            tracing::warn!(error = %e, self_addr = %self.self_addr, "discovery refresh_self failed");
        }
    }

    /// Flush every topic, deregister from discovery, and close the storage
    /// handle. Called once, during shutdown.
    pub async fn close(&self) -> Result<(), QueueError> {
        let topics: Vec<Arc<Topic>> = self.topics.read().await.values().cloned().collect();
        for topic in &topics {
            topic.close().await?;
        }
        if let Err(e) = self.discovery.deregister_self(&self.self_addr).await {
            tracing::warn!(error = %e, "discovery deregister_self failed");
        }
        self.storage.close().await?;
        Ok(())
    }
}


impl Stat {
    #[cfg(test)]
    fn is_topic(&self) -> bool {
        matches!(self, Stat::Topic(_))
    }
}
