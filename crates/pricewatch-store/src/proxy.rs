use std::sync::Arc;

use pricewatch_core::ProxyRegion;

use crate::SharedStore;

/// An outbound proxy endpoint handed out by [`ProxyPool::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEntry {
    /// `host:port`.
    pub address: String,
    pub region: ProxyRegion,
    /// Opaque value written by the proxy feed.
    pub freshness: String,
}

impl ProxyEntry {
    /// Proxy URL suitable for an HTTP client.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.address)
    }
}

/// Region-keyed proxy sets, one store hash per region (`address -> freshness`).
///
/// The pool only reads and evicts; entries are written by an external feed.
/// Store failures are logged and treated as an empty pool, since callers
/// fall back to a direct connection anyway.
#[derive(Clone)]
pub struct ProxyPool {
    store: Arc<dyn SharedStore>,
    namespace: String,
}

impl ProxyPool {
    pub fn new(store: Arc<dyn SharedStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    #[must_use]
    pub fn region_key(&self, region: ProxyRegion) -> String {
        format!("{}:proxy:{}", self.namespace, region.as_str())
    }

    /// A uniformly random entry of `region`, or `None` when the region is
    /// empty (use a direct connection).
    pub async fn acquire(&self, region: ProxyRegion) -> Option<ProxyEntry> {
        let entries = match self.store.hash_entries(&self.region_key(region)).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(region = %region, error = %e, "proxy pool read failed");
                return None;
            }
        };
        if entries.is_empty() {
            return None;
        }

        let index = rand::random_range(0..entries.len());
        let (address, freshness) = entries.into_iter().nth(index)?;
        Some(ProxyEntry {
            address,
            region,
            freshness,
        })
    }

    /// Removes `entry` from its region. Returns whether it was present;
    /// evicting an absent entry is a no-op.
    pub async fn evict(&self, entry: &ProxyEntry) -> bool {
        match self
            .store
            .hash_remove(&self.region_key(entry.region), &entry.address)
            .await
        {
            Ok(removed) => {
                if removed {
                    tracing::warn!(region = %entry.region, proxy = %entry.address, "evicted proxy");
                }
                removed
            }
            Err(e) => {
                tracing::warn!(
                    region = %entry.region,
                    proxy = %entry.address,
                    error = %e,
                    "proxy eviction failed"
                );
                false
            }
        }
    }

    /// Number of entries currently in `region`; `0` when the store is unreachable.
    pub async fn size(&self, region: ProxyRegion) -> usize {
        self.store
            .hash_entries(&self.region_key(region))
            .await
            .map_or(0, |entries| entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    async fn pool_with(entries: &[&str]) -> ProxyPool {
        let store = Arc::new(MemoryStore::new());
        for address in entries {
            store
                .hash_set("test:proxy:domestic", address, "1700000000")
                .await
                .unwrap();
        }
        ProxyPool::new(store, "test")
    }

    #[tokio::test]
    async fn acquire_on_empty_region_returns_none() {
        let pool = pool_with(&[]).await;
        assert!(pool.acquire(ProxyRegion::Domestic).await.is_none());
        assert!(pool.acquire(ProxyRegion::International).await.is_none());
    }

    #[tokio::test]
    async fn acquire_returns_a_member_of_the_region() {
        let pool = pool_with(&["10.0.0.1:8080", "10.0.0.2:8080"]).await;
        let entry = pool.acquire(ProxyRegion::Domestic).await.unwrap();
        assert!(["10.0.0.1:8080", "10.0.0.2:8080"].contains(&entry.address.as_str()));
        assert_eq!(entry.region, ProxyRegion::Domestic);
        assert_eq!(entry.url(), format!("http://{}", entry.address));
    }

    #[tokio::test]
    async fn evict_is_idempotent() {
        let pool = pool_with(&["10.0.0.1:8080", "10.0.0.2:8080"]).await;
        let entry = ProxyEntry {
            address: "10.0.0.1:8080".to_string(),
            region: ProxyRegion::Domestic,
            freshness: String::new(),
        };

        assert!(pool.evict(&entry).await);
        let after_once = pool.size(ProxyRegion::Domestic).await;
        assert!(!pool.evict(&entry).await);
        assert_eq!(pool.size(ProxyRegion::Domestic).await, after_once);
        assert_eq!(after_once, 1);
    }
}
