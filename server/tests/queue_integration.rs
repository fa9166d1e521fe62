//! End-to-end scenarios against the full `QueueManager`, exercising the
//! public push/pop/confirm protocol the way a protocol front-end would.

use std::sync::Arc;
use std::time::Duration;

use uqueue_server::discovery::NoopDiscoveryClient;
use uqueue_server::queue::{QueueError, QueueManager, Stat};
use uqueue_server::store::memory::MemoryStorage;
use uqueue_server::store::rocksdb::RocksdbStorage;
use uqueue_server::store::Storage;

fn manager_with(storage: Arc<dyn Storage>) -> Arc<QueueManager> {
    Arc::new(
        QueueManager::new(storage, "node-1".to_string()).with_discovery(Arc::new(NoopDiscoveryClient)),
    )
}

fn manager() -> Arc<QueueManager> {
    manager_with(Arc::new(MemoryStorage::new()))
}

/// S1: basic push/pop on an at-most-once line.
#[tokio::test]
async fn basic_push_pop() {
    let qm = manager();
    qm.create("foo", "").await.unwrap();
    qm.create("foo/x", "").await.unwrap();
    qm.push("foo", b"1".to_vec()).await.unwrap();
    qm.push("foo", b"2".to_vec()).await.unwrap();

    let (key, data) = qm.pop("foo/x").await.unwrap();
    assert_eq!((key.as_str(), data.as_slice()), ("foo/x/0", b"1".as_slice()));
    let (key, data) = qm.pop("foo/x").await.unwrap();
    assert_eq!((key.as_str(), data.as_slice()), ("foo/x/1", b"2".as_slice()));
    assert!(matches!(qm.pop("foo/x").await, Err(QueueError::NoMessage)));
}

/// S2: at-least-once redelivery after the recycle window elapses, then a
/// successful confirm makes the id permanently unavailable.
#[tokio::test]
async fn at_least_once_redelivery() {
    let qm = manager();
    qm.create("foo", "").await.unwrap();
    qm.create("foo/x", "1s").await.unwrap();
    qm.push("foo", b"a".to_vec()).await.unwrap();

    let (key, data) = qm.pop("foo/x").await.unwrap();
    assert_eq!((key.as_str(), data.as_slice()), ("foo/x/0", b"a".as_slice()));

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let (key, data) = qm.pop("foo/x").await.unwrap();
    assert_eq!((key.as_str(), data.as_slice()), ("foo/x/0", b"a".as_slice()));

    qm.confirm("foo/x/0").await.unwrap();
    assert!(matches!(qm.pop("foo/x").await, Err(QueueError::NoMessage)));
    assert!(matches!(
        qm.confirm("foo/x/0").await,
        Err(QueueError::NotDelivered(_))
    ));
}

/// S5: emptying a line discards its undelivered backlog; a later push is
/// visible again, but only to that line.
#[tokio::test]
async fn empty_discards_backlog_then_repush_is_visible() {
    let qm = manager();
    qm.create("foo", "").await.unwrap();
    qm.create("foo/x", "").await.unwrap();
    qm.push("foo", b"1".to_vec()).await.unwrap();
    qm.push("foo", b"2".to_vec()).await.unwrap();
    qm.push("foo", b"3".to_vec()).await.unwrap();

    qm.pop("foo/x").await.unwrap();
    qm.empty("foo/x").await.unwrap();
    assert!(matches!(qm.pop("foo/x").await, Err(QueueError::NoMessage)));

    qm.push("foo", b"4".to_vec()).await.unwrap();
    let (key, data) = qm.pop("foo/x").await.unwrap();
    assert_eq!((key.as_str(), data.as_slice()), ("foo/x/3", b"4".as_slice()));
}

/// S6: push 100, pop 40, confirm every even delivered id, close, reopen on
/// the same on-disk storage — cursors and in-flight state survive exactly.
#[tokio::test]
async fn persistence_restart_round_trips_state() {
    let dir = tempfile::tempdir().unwrap();

    {
        let storage: Arc<dyn Storage> = Arc::new(RocksdbStorage::open(dir.path()).unwrap());
        let qm = manager_with(storage);
        qm.create("foo", "").await.unwrap();
        qm.create("foo/x", "10s").await.unwrap();

        for i in 0..100u32 {
            qm.push("foo", i.to_string().into_bytes()).await.unwrap();
        }
        for _ in 0..40 {
            qm.pop("foo/x").await.unwrap();
        }
        for id in (0..40u64).step_by(2) {
            qm.confirm(&format!("foo/x/{id}")).await.unwrap();
        }

        qm.close().await.unwrap();
    }

    let storage: Arc<dyn Storage> = Arc::new(RocksdbStorage::open(dir.path()).unwrap());
    let qm = manager_with(storage);
    qm.load().await.unwrap();

    let Stat::Line(stat) = qm.stat("foo/x").await.unwrap() else {
        panic!("expected a line stat");
    };
    assert_eq!(stat.head, 40);
    assert_eq!(stat.ihead, 1);
    assert_eq!(stat.tail, 100);
    assert_eq!(stat.count, 80);
}

/// Invariant 6: creating an already-existing topic/line fails without
/// mutating state.
#[tokio::test]
async fn create_is_idempotent_on_failure() {
    let qm = manager();
    qm.create("foo", "").await.unwrap();
    assert!(matches!(qm.create("foo", "").await, Err(QueueError::TopicExisted(_))));

    qm.create("foo/x", "").await.unwrap();
    assert!(matches!(qm.create("foo/x", "").await, Err(QueueError::LineExisted(_))));

    let Stat::Topic(stat) = qm.stat("foo").await.unwrap() else {
        panic!("expected a topic stat");
    };
    assert_eq!(stat.lines, vec!["x".to_string()]);
}
