//! Append-only topic log plus its background GC worker.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;

use super::duration::{format_recycle, parse_recycle};
use super::error::QueueError;
use super::line::{Line, LineStat};
use crate::core::config::GcConfig;
use crate::discovery::DiscoveryClient;
use crate::queue::QueueManager;
use crate::store::codec::{self, TopicDirectory};
use crate::store::Storage;

pub struct Topic {
    name: String,
    persist: bool,
    lines: RwLock<HashMap<String, Arc<Line>>>,
    head: RwLock<u64>,
    tail: RwLock<u64>,
    storage: Arc<dyn Storage>,
    discovery: Arc<dyn DiscoveryClient>,
    gc_config: GcConfig,
    gc_shutdown: watch::Sender<bool>,
    gc_handle: Mutex<Option<JoinHandle<()>>>,
    queue: RwLock<Weak<QueueManager>>,
}

#[derive(Debug, Clone)]
pub struct TopicStat {
    pub head: u64,
    pub tail: u64,
    pub persist: bool,
    pub lines: Vec<String>,
}

impl Topic {
    fn directory_key(name: &str) -> String {
        name.to_string()
    }

    fn head_key(name: &str) -> String {
        format!("{name}:head")
    }

    fn tail_key(name: &str) -> String {
        format!("{name}:tail")
    }

    fn message_key(name: &str, id: u64) -> String {
        format!("{name}:{id}")
    }

    fn new_inner(
        name: String,
        persist: bool,
        head: u64,
        tail: u64,
        storage: Arc<dyn Storage>,
        discovery: Arc<dyn DiscoveryClient>,
        gc_config: GcConfig,
    ) -> Arc<Self> {
        let (gc_shutdown, _) = watch::channel(false);
        let topic = Arc::new(Self {
            name,
            persist,
            lines: RwLock::new(HashMap::new()),
            head: RwLock::new(head),
            tail: RwLock::new(tail),
            storage,
            discovery,
            gc_config,
            gc_shutdown,
            gc_handle: Mutex::new(None),
            queue: RwLock::new(Weak::new()),
        });
        Topic::spawn_gc(&topic);
        topic
    }

    /// Create a brand-new, empty topic and start its GC worker.
    pub fn new(
        name: String,
        persist: bool,
        storage: Arc<dyn Storage>,
        discovery: Arc<dyn DiscoveryClient>,
    ) -> Arc<Self> {
        Self::new_inner(name, persist, 0, 0, storage, discovery, GcConfig::default())
    }

    /// Create a brand-new topic using the configured GC tuning.
    pub fn new_with_gc(
        name: String,
        persist: bool,
        storage: Arc<dyn Storage>,
        discovery: Arc<dyn DiscoveryClient>,
        gc_config: GcConfig,
    ) -> Arc<Self> {
        Self::new_inner(name, persist, 0, 0, storage, discovery, gc_config)
    }

    /// Rehydrate a topic (head/tail only — lines are attached afterward via
    /// [`Topic::insert_line`] by the queue manager's load routine).
    pub fn from_persisted(
        name: String,
        persist: bool,
        head: u64,
        tail: u64,
        storage: Arc<dyn Storage>,
        discovery: Arc<dyn DiscoveryClient>,
        gc_config: GcConfig,
    ) -> Arc<Self> {
        Self::new_inner(name, persist, head, tail, storage, discovery, gc_config)
    }

    pub(crate) async fn attach_queue(&self, queue: Weak<QueueManager>) {
        *self.queue.write().await = queue;
    }

    pub(crate) async fn insert_line(&self, line: Arc<Line>) {
        self.lines.write().await.insert(line.name().to_string(), line);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn persist(&self) -> bool {
        self.persist
    }

    pub async fn head(&self) -> u64 {
        *self.head.read().await
    }

    pub async fn tail(&self) -> u64 {
        *self.tail.read().await
    }

    pub async fn line(&self, name: &str) -> Option<Arc<Line>> {
        self.lines.read().await.get(name).cloned()
    }

    async fn persist_directory(&self) -> Result<(), QueueError> {
        let lines: Vec<String> = self.lines.read().await.keys().cloned().collect();
        let dir = TopicDirectory {
            lines,
            persist: self.persist,
        };
        self.storage
            .set(&Self::directory_key(&self.name), codec::encode_topic(&dir))
            .await?;
        Ok(())
    }

    /// Append one payload.
    pub async fn push(self: &Arc<Self>, data: Vec<u8>) -> Result<u64, QueueError> {
        if data.is_empty() {
            return Err(QueueError::BadRequest("payload must be non-empty".to_string()));
        }
        let mut tail = self.tail.write().await;
        let id = *tail;
        self.storage.set(&Self::message_key(&self.name, id), data).await?;

        let new_tail = id + 1;
        if let Err(e) = self
            .storage
            .set(&Self::tail_key(&self.name), codec::encode_u64(new_tail))
            .await
        {
            // Tail is rolled back; the message stays written but is beyond
            // the (unmoved) tail and is invisible until a retried push
            // reuses this slot.
            return Err(e.into());
        }
        *tail = new_tail;
        Ok(id)
    }

    /// Append N payloads as one contiguous block (`mPush`).
    pub async fn m_push(self: &Arc<Self>, items: Vec<Vec<u8>>) -> Result<(u64, u64), QueueError> {
        if items.is_empty() {
            return Err(QueueError::BadRequest("batch must be non-empty".to_string()));
        }
        if items.iter().any(|d| d.is_empty()) {
            return Err(QueueError::BadRequest("payloads must be non-empty".to_string()));
        }

        let mut tail = self.tail.write().await;
        let start = *tail;
        let mut cursor = start;
        for item in items {
            if let Err(e) = self.storage.set(&Self::message_key(&self.name, cursor), item).await {
                // roll back: tail untouched, already-written payloads beyond
                // the old tail remain unreachable.
                return Err(e.into());
            }
            cursor += 1;
        }

        if let Err(e) = self
            .storage
            .set(&Self::tail_key(&self.name), codec::encode_u64(cursor))
            .await
        {
            return Err(e.into());
        }
        *tail = cursor;
        Ok((start, cursor))
    }

    /// Create a line on this topic (`create`, new-line-start rule).
    ///
    /// Announces the creation to service discovery. Use [`Topic::create_line_from_discovery`]
    /// when the creation itself originated from discovery, to avoid echoing it back.
    pub async fn create_line(self: &Arc<Self>, name: &str, recycle_arg: &str) -> Result<(), QueueError> {
        self.create_line_inner(name, recycle_arg, true).await
    }

    /// Create a line reconciled in from service discovery (pull/watch); does not
    /// re-announce it back to discovery.
    pub async fn create_line_from_discovery(
        self: &Arc<Self>,
        name: &str,
        recycle_arg: &str,
    ) -> Result<(), QueueError> {
        self.create_line_inner(name, recycle_arg, false).await
    }

    async fn create_line_inner(
        self: &Arc<Self>,
        name: &str,
        recycle_arg: &str,
        announce: bool,
    ) -> Result<(), QueueError> {
        let recycle = parse_recycle(recycle_arg).map_err(QueueError::BadRequest)?;

        let mut lines = self.lines.write().await;
        if lines.contains_key(name) {
            return Err(QueueError::LineExisted(format!("{}/{}", self.name, name)));
        }

        let start_head = if self.persist { 0 } else { self.head().await };
        let line = Arc::new(Line::new(
            name.to_string(),
            self.name.clone(),
            recycle,
            start_head,
            self.storage.clone(),
            self.discovery.clone(),
            Arc::downgrade(self),
        ));

        self.storage
            .set(
                &format!("{}/{}:head", self.name, name),
                codec::encode_u64(start_head),
            )
            .await?;
        self.storage
            .set(
                &format!("{}/{}:recycle", self.name, name),
                format_recycle(recycle).into_bytes(),
            )
            .await?;
        lines.insert(name.to_string(), line);
        drop(lines);

        self.persist_directory().await?;
        if announce {
            if let Err(e) = self.discovery.create_line(&self.name, name, recycle_arg).await {
                tracing::warn!(error = %e, topic = %self.name, line = name, "discovery create_line failed");
            }
        }
        Ok(())
    }

    /// Remove a line and its persisted state (`remove`), notifying discovery.
    pub async fn remove_line(&self, name: &str) -> Result<(), QueueError> {
        self.remove_line_inner(name, true).await
    }

    /// Remove a line whose disappearance was itself observed via discovery (watch);
    /// does not re-announce the removal back to discovery.
    pub async fn remove_line_from_discovery(&self, name: &str) -> Result<(), QueueError> {
        self.remove_line_inner(name, false).await
    }

    async fn remove_line_inner(&self, name: &str, notify: bool) -> Result<(), QueueError> {
        let mut lines = self.lines.write().await;
        let line = lines
            .remove(name)
            .ok_or_else(|| QueueError::LineNotExisted(format!("{}/{}", self.name, name)))?;
        drop(lines);
        line.remove(notify).await?;
        self.persist_directory().await?;
        Ok(())
    }

    pub async fn stat(&self) -> TopicStat {
        let lines: Vec<String> = self.lines.read().await.keys().cloned().collect();
        TopicStat {
            head: self.head().await,
            tail: self.tail().await,
            persist: self.persist,
            lines,
        }
    }

    /// Discard all undelivered backlog on every line, then advance `topic.head`
    /// to `tail` (`empty` for a topic key).
    pub async fn empty(&self) -> Result<(), QueueError> {
        let lines = self.lines.read().await;
        for line in lines.values() {
            line.empty().await?;
        }
        drop(lines);

        let tail = self.tail().await;
        let mut head = self.head.write().await;
        self.storage
            .set(&Self::head_key(&self.name), codec::encode_u64(tail))
            .await?;
        *head = tail;
        Ok(())
    }

    /// Stop the GC worker, delete every line, then delete all persisted
    /// state including message payloads in `[head, tail)`. Notifies discovery.
    pub async fn remove(self: &Arc<Self>) -> Result<(), QueueError> {
        self.remove_inner(true).await
    }

    /// Remove a topic whose disappearance was itself observed via discovery (watch);
    /// does not re-announce the removal back to discovery.
    pub async fn remove_from_discovery(self: &Arc<Self>) -> Result<(), QueueError> {
        self.remove_inner(false).await
    }

    async fn remove_inner(self: &Arc<Self>, notify: bool) -> Result<(), QueueError> {
        self.stop_gc().await;

        let mut lines = self.lines.write().await;
        let names: Vec<String> = lines.keys().cloned().collect();
        for name in names {
            if let Some(line) = lines.remove(&name) {
                // the topic-level discovery entry covers its lines; never echo per-line.
                line.remove(false).await?;
            }
        }
        drop(lines);

        let head = self.head().await;
        let tail = self.tail().await;
        for id in head..tail {
            self.storage.del(&Self::message_key(&self.name, id)).await?;
        }
        self.storage.del(&Self::head_key(&self.name)).await?;
        self.storage.del(&Self::tail_key(&self.name)).await?;
        self.storage.del(&Self::directory_key(&self.name)).await?;

        if notify {
            if let Err(e) = self.discovery.remove_topic(&self.name).await {
                tracing::warn!(error = %e, topic = %self.name, "discovery remove_topic failed");
            }
        }
        Ok(())
    }

    /// Flush head/tail and every line's in-flight state to storage; called
    /// by the backup tick and by `close()`.
    pub async fn backup(&self) -> Result<(), QueueError> {
        self.storage
            .set(&Self::head_key(&self.name), codec::encode_u64(self.head().await))
            .await?;
        self.storage
            .set(&Self::tail_key(&self.name), codec::encode_u64(self.tail().await))
            .await?;
        self.persist_directory().await?;
        for line in self.lines.read().await.values() {
            line.persist_state().await?;
        }
        Ok(())
    }

    async fn stop_gc(&self) {
        let _ = self.gc_shutdown.send(true);
        if let Some(handle) = self.gc_handle.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// Flush final state and stop the GC worker; called from
    /// `QueueManager::close()`.
    pub async fn close(self: &Arc<Self>) -> Result<(), QueueError> {
        self.stop_gc().await;
        self.backup().await
    }

    /// Reclaim the acknowledged prefix of a non-persistent topic (clean
    /// tick): `end = min(tail, min over lines of commitment bound)`.
    async fn clean_tick(&self, budget: Duration) {
        if self.persist {
            return;
        }
        let tail = self.tail().await;
        let mut end = tail;
        for line in self.lines.read().await.values() {
            end = end.min(line.commitment_bound().await);
        }

        let started = tokio::time::Instant::now();
        loop {
            let mut head = self.head.write().await;
            if *head >= end || started.elapsed() >= budget || *self.gc_shutdown.borrow() {
                break;
            }
            let id = *head;
            if let Err(e) = self.storage.del(&Self::message_key(&self.name, id)).await {
                tracing::debug!(error = %e, topic = %self.name, id, "GC delete failed, retrying next tick");
                break;
            }
            let new_head = id + 1;
            if let Err(e) = self
                .storage
                .set(&Self::head_key(&self.name), codec::encode_u64(new_head))
                .await
            {
                tracing::debug!(error = %e, topic = %self.name, "GC head persist failed, retrying next tick");
                break;
            }
            *head = new_head;
        }
    }

    fn spawn_gc(topic: &Arc<Self>) {
        let task_topic = topic.clone();
        let mut shutdown_rx = topic.gc_shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let topic = task_topic;
            let mut backup_tick = tokio::time::interval(topic.gc_config.backup_interval);
            let mut clean_tick = tokio::time::interval(topic.gc_config.clean_interval);
            loop {
                tokio::select! {
                    _ = backup_tick.tick() => {
                        if let Err(e) = topic.backup().await {
                            tracing::debug!(error = %e, topic = %topic.name, "backup tick failed");
                        }
                    }
                    _ = clean_tick.tick() => {
                        topic.clean_tick(topic.gc_config.tick_budget).await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
        // spawn_gc runs before the Arc is returned to the caller, so the
        // handle slot is always free here.
        if let Ok(mut guard) = topic.gc_handle.try_lock() {
            *guard = Some(handle);
        }
    }

    pub async fn line_stat(&self, name: &str) -> Result<LineStat, QueueError> {
        let line = self
            .line(name)
            .await
            .ok_or_else(|| QueueError::LineNotExisted(format!("{}/{}", self.name, name)))?;
        line.stat().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::NoopDiscoveryClient;
    use crate::store::memory::MemoryStorage;

    fn deps() -> (Arc<dyn Storage>, Arc<dyn DiscoveryClient>) {
        (Arc::new(MemoryStorage::new()), Arc::new(NoopDiscoveryClient))
    }

    #[tokio::test]
    async fn test_push_advances_tail() {
        let (storage, discovery) = deps();
        let topic = Topic::new("foo".to_string(), false, storage, discovery);
        let id = topic.push(b"hello".to_vec()).await.unwrap();
        assert_eq!(id, 0);
        assert_eq!(topic.tail().await, 1);
    }

    #[tokio::test]
    async fn test_push_rejects_empty_payload() {
        let (storage, discovery) = deps();
        let topic = Topic::new("foo".to_string(), false, storage, discovery);
        assert!(matches!(topic.push(vec![]).await, Err(QueueError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_create_line_duplicate_fails() {
        let (storage, discovery) = deps();
        let topic = Topic::new("foo".to_string(), false, storage, discovery);
        topic.create_line("x", "").await.unwrap();
        assert!(matches!(
            topic.create_line("x", "").await,
            Err(QueueError::LineExisted(_))
        ));
    }

    #[tokio::test]
    async fn test_transient_topic_new_line_starts_at_head() {
        let (storage, discovery) = deps();
        let topic = Topic::new("foo".to_string(), false, storage, discovery);
        topic.push(b"1".to_vec()).await.unwrap();
        topic.push(b"2".to_vec()).await.unwrap();
        // simulate GC having advanced head to 1
        *topic.head.write().await = 1;
        topic.create_line("late", "").await.unwrap();
        let stat = topic.line_stat("late").await.unwrap();
        assert_eq!(stat.head, 1);
    }

    #[tokio::test]
    async fn test_persistent_topic_new_line_starts_at_zero() {
        let (storage, discovery) = deps();
        let topic = Topic::new("foo".to_string(), true, storage, discovery);
        topic.push(b"1".to_vec()).await.unwrap();
        *topic.head.write().await = 0;
        topic.create_line("late", "").await.unwrap();
        let stat = topic.line_stat("late").await.unwrap();
        assert_eq!(stat.head, 0);
    }

    #[tokio::test]
    async fn test_m_push_appends_contiguous_block() {
        let (storage, discovery) = deps();
        let topic = Topic::new("foo".to_string(), false, storage, discovery);
        let (start, end) = topic
            .m_push(vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()])
            .await
            .unwrap();
        assert_eq!((start, end), (0, 3));
        assert_eq!(topic.tail().await, 3);

        topic.create_line("x", "").await.unwrap();
        let line = topic.line("x").await.unwrap();
        for expected in [b"1".to_vec(), b"2".to_vec(), b"3".to_vec()] {
            let (_, data) = line.pop().await.unwrap();
            assert_eq!(data, expected);
        }
    }

    #[tokio::test]
    async fn test_m_push_rejects_empty_batch() {
        let (storage, discovery) = deps();
        let topic = Topic::new("foo".to_string(), false, storage, discovery);
        assert!(matches!(topic.m_push(vec![]).await, Err(QueueError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_m_push_rejects_empty_payload_in_batch() {
        let (storage, discovery) = deps();
        let topic = Topic::new("foo".to_string(), false, storage, discovery);
        assert!(matches!(
            topic.m_push(vec![b"1".to_vec(), vec![]]).await,
            Err(QueueError::BadRequest(_))
        ));
        // the batch was rejected before any write; tail is untouched.
        assert_eq!(topic.tail().await, 0);
    }
}
