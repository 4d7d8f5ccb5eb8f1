//! Live tests against a real Redis. Ignored by default; run with
//! `PRICEWATCH_TEST_REDIS_URL=redis://127.0.0.1:6379 cargo test -p pricewatch-store -- --ignored`.

use std::sync::Arc;

use pricewatch_core::{Lane, ProxyRegion};
use pricewatch_store::{PriorityTaskQueue, ProxyEntry, ProxyPool, RedisStore, SharedStore};

fn redis_store() -> Arc<RedisStore> {
    let url = std::env::var("PRICEWATCH_TEST_REDIS_URL")
        .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    Arc::new(RedisStore::connect(&url).expect("redis pool"))
}

fn unique_namespace(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("pricewatch-test:{prefix}:{nanos}")
}

#[tokio::test]
#[ignore = "requires a live Redis"]
async fn queue_round_trip_against_redis() {
    let store = redis_store();
    let queue = PriorityTaskQueue::new(store.clone(), unique_namespace("queue"), 3);

    queue.enqueue(Lane::Hot, &[1, 2, 3]).await.unwrap();
    assert_eq!(queue.dequeue_batch(Lane::Hot, 2).await.unwrap(), vec![1, 2]);
    assert_eq!(queue.dequeue_batch(Lane::Hot, 2).await.unwrap(), vec![3]);
    assert!(queue.dequeue_batch(Lane::Hot, 2).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires a live Redis"]
async fn concurrent_pollers_never_share_an_entry() {
    let store = redis_store();
    let queue = PriorityTaskQueue::new(store, unique_namespace("race"), 3);
    let ids: Vec<i64> = (1..=200).collect();
    queue.enqueue(Lane::Common, &ids).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..5 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Ok(batch) = queue.dequeue_batch(Lane::Common, 7).await {
                if batch.is_empty() {
                    break;
                }
                seen.extend(batch);
            }
            seen
        }));
    }

    let mut all: Vec<i64> = futures::future::join_all(handles)
        .await
        .into_iter()
        .flat_map(Result::unwrap)
        .collect();
    all.sort_unstable();
    assert_eq!(all, ids);
}

#[tokio::test]
#[ignore = "requires a live Redis"]
async fn proxy_eviction_against_redis() {
    let store = redis_store();
    let pool = ProxyPool::new(store.clone(), unique_namespace("proxy"));
    let key = pool.region_key(ProxyRegion::International);
    store.hash_set(&key, "10.1.1.1:3128", "fresh").await.unwrap();

    let entry: ProxyEntry = pool.acquire(ProxyRegion::International).await.unwrap();
    assert_eq!(entry.address, "10.1.1.1:3128");
    assert!(pool.evict(&entry).await);
    assert!(!pool.evict(&entry).await);
    assert!(pool.acquire(ProxyRegion::International).await.is_none());
}
