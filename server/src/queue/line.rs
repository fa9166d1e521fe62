//! Per-consumer cursor with at-least-once in-flight tracking.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Weak;
use std::time::{Duration, SystemTime};

use tokio::sync::RwLock;

use super::duration::format_recycle;
use super::error::QueueError;
use super::topic::Topic;
use crate::discovery::DiscoveryClient;
use crate::store::codec::{self, InflightRecord, LineState};
use crate::store::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InflightEntry {
    pub id: u64,
    pub deadline: SystemTime,
}

/// Everything guarded by the line's inflight lock (level 3): the ordered
/// in-flight list, the membership map, and `ihead` (their advancement is
/// always driven together by confirm/pop).
struct InflightState {
    list: VecDeque<InflightEntry>,
    membership: HashMap<u64, bool>,
    ihead: u64,
}

pub struct Line {
    name: String,
    topic_name: String,
    recycle: Duration,
    inflight: RwLock<InflightState>,
    head: RwLock<u64>,
    storage: Arc<dyn Storage>,
    discovery: Arc<dyn DiscoveryClient>,
    topic: Weak<Topic>,
}

/// Snapshot returned by `stat`.
#[derive(Debug, Clone)]
pub struct LineStat {
    pub recycle: Duration,
    pub head: u64,
    pub ihead: u64,
    pub tail: u64,
    pub count: u64,
}

impl Line {
    fn head_key(topic: &str, line: &str) -> String {
        format!("{topic}/{line}:head")
    }

    fn recycle_key(topic: &str, line: &str) -> String {
        format!("{topic}/{line}:recycle")
    }

    fn state_key(topic: &str, line: &str) -> String {
        format!("{topic}/{line}")
    }

    /// Construct a brand new line starting at `start_head` (0 for a
    /// persistent topic's history, or the topic's current head for a
    /// transient one — resolved new-line-start-position rule).
    pub fn new(
        name: String,
        topic_name: String,
        recycle: Duration,
        start_head: u64,
        storage: Arc<dyn Storage>,
        discovery: Arc<dyn DiscoveryClient>,
        topic: Weak<Topic>,
    ) -> Self {
        Self {
            name,
            topic_name,
            recycle,
            inflight: RwLock::new(InflightState {
                list: VecDeque::new(),
                membership: HashMap::new(),
                ihead: start_head,
            }),
            head: RwLock::new(start_head),
            storage,
            discovery,
            topic,
        }
    }

    /// Rehydrate a line from its persisted state blob and head cursor.
    pub fn from_persisted(
        name: String,
        topic_name: String,
        recycle: Duration,
        head: u64,
        state: LineState,
        storage: Arc<dyn Storage>,
        discovery: Arc<dyn DiscoveryClient>,
        topic: Weak<Topic>,
    ) -> Self {
        let mut membership = HashMap::new();
        let mut list = VecDeque::new();
        for entry in state.inflight {
            membership.insert(entry.id, true);
            list.push_back(InflightEntry {
                id: entry.id,
                deadline: SystemTime::UNIX_EPOCH + Duration::from_nanos(entry.deadline_ns),
            });
        }
        Self {
            name,
            topic_name,
            recycle,
            inflight: RwLock::new(InflightState {
                list,
                membership,
                ihead: state.ihead,
            }),
            head: RwLock::new(head),
            storage,
            discovery,
            topic,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn recycle(&self) -> Duration {
        self.recycle
    }

    async fn topic_tail(&self) -> Result<u64, QueueError> {
        let topic = self
            .topic
            .upgrade()
            .ok_or_else(|| QueueError::Internal("topic dropped".to_string()))?;
        Ok(topic.tail().await)
    }

    async fn persist_head(&self, head: u64) -> Result<(), QueueError> {
        self.storage
            .set(&Self::head_key(&self.topic_name, &self.name), codec::encode_u64(head))
            .await?;
        Ok(())
    }

    async fn read_payload(&self, id: u64) -> Result<Vec<u8>, QueueError> {
        let key = format!("{}:{}", self.topic_name, id);
        self.storage
            .get(&key)
            .await?
            .ok_or_else(|| QueueError::Internal(format!("missing payload for {key}")))
    }

    fn id_key(&self, id: u64) -> String {
        format!("{}/{}/{}", self.topic_name, self.name, id)
    }

    /// Single pop. Drains one expired in-flight entry if present,
    /// otherwise advances `head` and (if `recycle > 0`) tracks it in flight.
    pub async fn pop(&self) -> Result<(String, Vec<u8>), QueueError> {
        let mut inflight = self.inflight.write().await;

        if !self.recycle.is_zero() {
            if let Some(front) = inflight.list.front().copied() {
                if front.deadline <= SystemTime::now() {
                    let refreshed = InflightEntry {
                        id: front.id,
                        deadline: SystemTime::now() + self.recycle,
                    };
                    inflight.list.pop_front();
                    inflight.list.push_back(refreshed);
                    let payload = self.read_payload(front.id).await?;
                    return Ok((self.id_key(front.id), payload));
                }
            }
        }

        let mut head = self.head.write().await;
        let tail = self.topic_tail().await?;
        if *head == tail {
            return Err(QueueError::NoMessage);
        }

        let id = *head;
        let new_head = id + 1;
        let payload = self.read_payload(id).await?;

        self.persist_head(new_head).await?;
        *head = new_head;

        if !self.recycle.is_zero() {
            inflight.list.push_back(InflightEntry {
                id,
                deadline: SystemTime::now() + self.recycle,
            });
            inflight.membership.insert(id, true);
        }

        Ok((self.id_key(id), payload))
    }

    /// Pop up to `n` entries: drains the expired in-flight prefix
    /// first, then pops fresh ids.
    pub async fn m_pop(&self, n: usize) -> Result<(Vec<String>, Vec<Vec<u8>>), QueueError> {
        if n == 0 {
            return Err(QueueError::BadRequest("n must be positive".to_string()));
        }

        let mut ids = Vec::with_capacity(n);
        let mut payloads = Vec::with_capacity(n);
        let mut inflight = self.inflight.write().await;

        if !self.recycle.is_zero() {
            while ids.len() < n {
                let Some(front) = inflight.list.front().copied() else {
                    break;
                };
                if front.deadline > SystemTime::now() {
                    break;
                }
                let payload = self.read_payload(front.id).await?;
                let refreshed = InflightEntry {
                    id: front.id,
                    deadline: SystemTime::now() + self.recycle,
                };
                inflight.list.pop_front();
                inflight.list.push_back(refreshed);
                ids.push(front.id);
                payloads.push(payload);
            }
        }

        if ids.len() < n {
            let mut head = self.head.write().await;
            let tail = self.topic_tail().await?;
            let mut cursor = *head;
            let mut fresh = Vec::new();
            while ids.len() + fresh.len() < n && cursor < tail {
                fresh.push(cursor);
                cursor += 1;
            }
            if !fresh.is_empty() {
                let mut fresh_payloads = Vec::with_capacity(fresh.len());
                for &id in &fresh {
                    fresh_payloads.push(self.read_payload(id).await?);
                }

                let new_head = cursor;
                self.persist_head(new_head).await?;
                *head = new_head;
                if !self.recycle.is_zero() {
                    for &id in &fresh {
                        inflight.list.push_back(InflightEntry {
                            id,
                            deadline: SystemTime::now() + self.recycle,
                        });
                        inflight.membership.insert(id, true);
                    }
                }
                ids.extend(fresh);
                payloads.extend(fresh_payloads);
            }
        }

        if ids.is_empty() {
            return Err(QueueError::NoMessage);
        }

        let keys = ids.iter().map(|&id| self.id_key(id)).collect();
        Ok((keys, payloads))
    }

    /// Acknowledge delivery of `id`.
    pub async fn confirm(&self, id: u64) -> Result<(), QueueError> {
        if self.recycle.is_zero() {
            return Err(QueueError::NotDelivered(self.id_key(id)));
        }

        let mut inflight = self.inflight.write().await;
        let head = *self.head.read().await;
        if !(inflight.ihead <= id && id < head) {
            return Err(QueueError::NotDelivered(self.id_key(id)));
        }

        let position = inflight.list.iter().position(|e| e.id == id);
        let Some(position) = position else {
            return Err(QueueError::NotDelivered(self.id_key(id)));
        };
        inflight.list.remove(position);
        inflight.membership.insert(id, false);

        while inflight.ihead < head {
            match inflight.membership.get(&inflight.ihead) {
                None => inflight.ihead += 1,
                Some(false) => {
                    let confirmed = inflight.ihead;
                    inflight.membership.remove(&confirmed);
                    inflight.ihead += 1;
                }
                Some(true) => break,
            }
        }
        Ok(())
    }

    /// Discard undelivered backlog (`empty`).
    pub async fn empty(&self) -> Result<(), QueueError> {
        let mut inflight = self.inflight.write().await;
        let mut head = self.head.write().await;
        let tail = self.topic_tail().await?;

        self.persist_head(tail).await?;
        *head = tail;
        inflight.ihead = tail;
        inflight.list.clear();
        inflight.membership.clear();
        Ok(())
    }

    pub async fn stat(&self) -> Result<LineStat, QueueError> {
        let inflight = self.inflight.read().await;
        let head = *self.head.read().await;
        let tail = self.topic_tail().await?;
        Ok(LineStat {
            recycle: self.recycle,
            head,
            ihead: inflight.ihead,
            tail,
            count: inflight.list.len() as u64 + (tail - head),
        })
    }

    /// Serialize in-flight list + `ihead` to storage (backup tick and
    /// explicit close()).
    pub async fn persist_state(&self) -> Result<(), QueueError> {
        let inflight = self.inflight.read().await;
        let state = LineState {
            inflight: inflight
                .list
                .iter()
                .map(|e| InflightRecord {
                    id: e.id,
                    deadline_ns: e
                        .deadline
                        .duration_since(SystemTime::UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_nanos() as u64,
                })
                .collect(),
            ihead: inflight.ihead,
        };
        self.storage
            .set(&Self::state_key(&self.topic_name, &self.name), codec::encode_line(&state))
            .await?;
        self.storage
            .set(
                &Self::recycle_key(&self.topic_name, &self.name),
                format_recycle(self.recycle).into_bytes(),
            )
            .await?;
        Ok(())
    }

    /// Delete the persisted line state, head, and recycle keys. `notify`
    /// controls whether discovery is told about the removal — it is
    /// suppressed when the removal itself was reconciled in from discovery,
    /// so the queue never echoes a change back to its source.
    pub async fn remove(&self, notify: bool) -> Result<(), QueueError> {
        self.storage.del(&Self::state_key(&self.topic_name, &self.name)).await?;
        self.storage.del(&Self::head_key(&self.topic_name, &self.name)).await?;
        self.storage.del(&Self::recycle_key(&self.topic_name, &self.name)).await?;
        if notify {
            if let Err(e) = self.discovery.remove_line(&self.topic_name, &self.name).await {
                tracing::warn!(error = %e, topic = %self.topic_name, line = %self.name, "discovery remove_line failed");
            }
        }
        Ok(())
    }

    /// The earliest id this line still depends on for GC purposes:
    /// `ihead` if redelivery is enabled, else `head`.
    pub async fn commitment_bound(&self) -> u64 {
        if self.recycle.is_zero() {
            *self.head.read().await
        } else {
            self.inflight.read().await.ihead
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::NoopDiscoveryClient;
    use crate::queue::topic::Topic;
    use crate::store::memory::MemoryStorage;

    fn test_deps() -> (Arc<dyn Storage>, Arc<dyn DiscoveryClient>) {
        (Arc::new(MemoryStorage::new()), Arc::new(NoopDiscoveryClient))
    }

    fn make_topic(storage: Arc<dyn Storage>, discovery: Arc<dyn DiscoveryClient>) -> Arc<Topic> {
        Topic::new("foo".to_string(), false, storage, discovery)
    }

    #[tokio::test]
    async fn test_pop_at_most_once() {
        let (storage, discovery) = test_deps();
        let topic = make_topic(storage.clone(), discovery.clone());
        for payload in [b"1".to_vec(), b"2".to_vec()] {
            topic.push(payload).await.unwrap();
        }
        let line = Arc::new(Line::new(
            "x".to_string(),
            "foo".to_string(),
            Duration::ZERO,
            0,
            storage,
            discovery,
            Arc::downgrade(&topic),
        ));
        let (key, data) = line.pop().await.unwrap();
        assert_eq!(key, "foo/x/0");
        assert_eq!(data, b"1");
        let (key, data) = line.pop().await.unwrap();
        assert_eq!(key, "foo/x/1");
        assert_eq!(data, b"2");
        assert!(matches!(line.pop().await, Err(QueueError::NoMessage)));
    }

    #[tokio::test]
    async fn test_confirm_requires_recycle() {
        let (storage, discovery) = test_deps();
        let topic = make_topic(storage.clone(), discovery.clone());
        topic.push(b"a".to_vec()).await.unwrap();
        let line = Arc::new(Line::new(
            "x".to_string(),
            "foo".to_string(),
            Duration::ZERO,
            0,
            storage,
            discovery,
            Arc::downgrade(&topic),
        ));
        line.pop().await.unwrap();
        assert!(matches!(line.confirm(0).await, Err(QueueError::NotDelivered(_))));
    }

    #[tokio::test]
    async fn test_out_of_order_confirm_advances_ihead_greedily() {
        let (storage, discovery) = test_deps();
        let topic = make_topic(storage.clone(), discovery.clone());
        for i in 0..5 {
            topic.push(format!("{i}").into_bytes()).await.unwrap();
        }
        let line = Arc::new(Line::new(
            "x".to_string(),
            "foo".to_string(),
            Duration::from_secs(10),
            0,
            storage,
            discovery,
            Arc::downgrade(&topic),
        ));
        for _ in 0..5 {
            line.pop().await.unwrap();
        }
        line.confirm(3).await.unwrap();
        line.confirm(1).await.unwrap();
        assert_eq!(line.stat().await.unwrap().ihead, 0);

        line.confirm(0).await.unwrap();
        assert_eq!(line.stat().await.unwrap().ihead, 2);

        line.confirm(2).await.unwrap();
        assert_eq!(line.stat().await.unwrap().ihead, 4);
    }

    #[tokio::test]
    async fn test_empty_sets_head_to_tail() {
        let (storage, discovery) = test_deps();
        let topic = make_topic(storage.clone(), discovery.clone());
        for i in 0..3 {
            topic.push(format!("{i}").into_bytes()).await.unwrap();
        }
        let line = Arc::new(Line::new(
            "x".to_string(),
            "foo".to_string(),
            Duration::ZERO,
            0,
            storage,
            discovery,
            Arc::downgrade(&topic),
        ));
        line.pop().await.unwrap();
        line.empty().await.unwrap();
        assert!(matches!(line.pop().await, Err(QueueError::NoMessage)));
    }

    #[tokio::test]
    async fn test_m_pop_drains_expired_prefix_first() {
        let (storage, discovery) = test_deps();
        let topic = make_topic(storage.clone(), discovery.clone());
        for i in 0..10 {
            topic.push(format!("{i}").into_bytes()).await.unwrap();
        }
        let line = Arc::new(Line::new(
            "x".to_string(),
            "foo".to_string(),
            Duration::from_millis(500),
            0,
            storage,
            discovery,
            Arc::downgrade(&topic),
        ));
        for _ in 0..5 {
            line.pop().await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(600)).await;

        let (keys, _) = line.m_pop(3).await.unwrap();
        assert_eq!(keys, vec!["foo/x/0", "foo/x/1", "foo/x/2"]);

        // deadlines were refreshed, not yet expired again.
        let (keys, _) = line.m_pop(2).await.unwrap();
        assert_eq!(keys, vec!["foo/x/3", "foo/x/4"]);
    }

    #[tokio::test]
    async fn test_m_pop_zero_is_bad_request() {
        let (storage, discovery) = test_deps();
        let topic = make_topic(storage.clone(), discovery.clone());
        topic.push(b"1".to_vec()).await.unwrap();
        let line = Arc::new(Line::new(
            "x".to_string(),
            "foo".to_string(),
            Duration::ZERO,
            0,
            storage,
            discovery,
            Arc::downgrade(&topic),
        ));
        assert!(matches!(line.m_pop(0).await, Err(QueueError::BadRequest(_))));
    }
}
