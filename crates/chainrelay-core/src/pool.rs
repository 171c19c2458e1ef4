//! Fingerprint-keyed ledger client pool.
//!
//! One client per distinct network configuration. Each key owns its own
//! `OnceCell`, so concurrent first use of one fingerprint runs a single
//! construction while unrelated fingerprints never wait on each other. The
//! map lock is only held to find or insert a cell, never across `connect`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;
use crate::fingerprint::{ConfigFingerprint, ConnectionFlags};
use crate::ledger::{ClientHandle, LedgerConnector};

struct PoolEntry {
    client: OnceCell<ClientHandle>,
    last_used: Mutex<Instant>,
}

impl PoolEntry {
    fn new() -> Self {
        Self { client: OnceCell::new(), last_used: Mutex::new(Instant::now()) }
    }

    fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used.lock().elapsed()
    }
}

/// Lazily-populated map from [`ConfigFingerprint`] to [`ClientHandle`].
pub struct ConnectionPool {
    connector: Arc<dyn LedgerConnector>,
    entries: RwLock<HashMap<ConfigFingerprint, Arc<PoolEntry>>>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn LedgerConnector>) -> Self {
        Self { connector, entries: RwLock::new(HashMap::new()) }
    }

    fn entry(&self, fingerprint: ConfigFingerprint) -> Arc<PoolEntry> {
        if let Some(e) = self.entries.read().get(&fingerprint) {
            return Arc::clone(e);
        }
        Arc::clone(
            self.entries
                .write()
                .entry(fingerprint)
                .or_insert_with(|| Arc::new(PoolEntry::new())),
        )
    }

    /// Return the cached client for `fingerprint`, building it from
    /// `raw_config` on first use.
    ///
    /// A failed construction leaves the slot empty; the next call retries.
    pub async fn get_or_create(
        &self,
        fingerprint: ConfigFingerprint,
        raw_config: &str,
        flags: ConnectionFlags,
    ) -> Result<ClientHandle, RelayError> {
        let entry = self.entry(fingerprint);
        entry.touch();
        let client = entry
            .client
            .get_or_try_init(|| async {
                tracing::info!(fingerprint = %fingerprint.short(), "building ledger client");
                self.connector.connect(raw_config, flags).await.map_err(|e| {
                    tracing::warn!(fingerprint = %fingerprint.short(), error = %e, "ledger client construction failed");
                    RelayError::from(e)
                })
            })
            .await?;
        Ok(Arc::clone(client))
    }

    /// Cached client, if one has been built.
    pub fn get(&self, fingerprint: &ConfigFingerprint) -> Option<ClientHandle> {
        let entries = self.entries.read();
        let entry = entries.get(fingerprint)?;
        let client = entry.client.get()?;
        entry.touch();
        Some(Arc::clone(client))
    }

    /// Remove a cached client. Outstanding handles stay valid.
    pub fn evict(&self, fingerprint: &ConfigFingerprint) -> Option<ClientHandle> {
        let entry = self.entries.write().remove(fingerprint)?;
        entry.client.get().cloned()
    }

    /// Drop every client that has been idle longer than `max_idle` and is
    /// referenced by nothing but the pool. Returns the evicted fingerprints.
    pub fn evict_idle(&self, max_idle: Duration) -> Vec<ConfigFingerprint> {
        let mut evicted = Vec::new();
        self.entries.write().retain(|fp, entry| {
            // Someone is mid-get_or_create on this entry.
            if Arc::strong_count(entry) > 1 {
                return true;
            }
            let unreferenced = entry.client.get().map_or(true, |c| Arc::strong_count(c) == 1);
            if unreferenced && entry.idle_for() > max_idle {
                evicted.push(*fp);
                false
            } else {
                true
            }
        });
        for fp in &evicted {
            tracing::info!(fingerprint = %fp.short(), "evicted idle ledger client");
        }
        evicted
    }

    /// Number of slots, including ones whose construction has not finished.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fingerprints(&self) -> Vec<ConfigFingerprint> {
        let mut fps: Vec<_> = self.entries.read().keys().copied().collect();
        fps.sort();
        fps
    }

    /// Run [`evict_idle`](Self::evict_idle) every `interval` until `token` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        max_idle: Duration,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = pool.evict_idle(max_idle);
                        tracing::debug!(evicted = evicted.len(), remaining = pool.len(), "pool sweep");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::LedgerError;
    use crate::test_support::StubLedger;

    #[derive(Default)]
    struct CountingConnector {
        builds: AtomicUsize,
        fail_first: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl LedgerConnector for CountingConnector {
        async fn connect(
            &self,
            _raw_config: &str,
            _flags: ConnectionFlags,
        ) -> Result<ClientHandle, LedgerError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_first.swap(false, Ordering::SeqCst) {
                return Err(LedgerError::Unreachable("peer0 down".into()));
            }
            Ok(StubLedger::empty(1))
        }
    }

    fn fp(raw: &str) -> ConfigFingerprint {
        ConfigFingerprint::compute(raw, ConnectionFlags::default())
    }

    #[tokio::test]
    async fn concurrent_first_use_builds_once() {
        let connector = Arc::new(CountingConnector::default());
        let pool = Arc::new(ConnectionPool::new(connector.clone()));
        let key = fp("profile-a");

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move {
                    pool.get_or_create(key, "profile-a", ConnectionFlags::default()).await
                })
            })
            .collect();
        let handles: Vec<ClientHandle> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert_eq!(connector.builds.load(Ordering::SeqCst), 1);
        assert_eq!(handles.len(), 50);
        for h in &handles {
            assert!(Arc::ptr_eq(h, &handles[0]));
        }
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn distinct_configs_get_distinct_clients() {
        let connector = Arc::new(CountingConnector::default());
        let pool = ConnectionPool::new(connector.clone());
        let a = pool.get_or_create(fp("a"), "a", ConnectionFlags::default()).await.unwrap();
        let b = pool.get_or_create(fp("b"), "b", ConnectionFlags::default()).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(connector.builds.load(Ordering::SeqCst), 2);
        assert_eq!(pool.fingerprints().len(), 2);
    }

    /// Holds construction of the `"slow"` profile until released.
    #[derive(Default)]
    struct GatedConnector {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl LedgerConnector for GatedConnector {
        async fn connect(&self, raw_config: &str, _flags: ConnectionFlags) -> Result<ClientHandle, LedgerError> {
            if raw_config == "slow" {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(StubLedger::empty(1))
        }
    }

    #[tokio::test]
    async fn unrelated_fingerprints_build_independently() {
        let connector = Arc::new(GatedConnector::default());
        let pool = Arc::new(ConnectionPool::new(connector.clone()));

        let slow = tokio::spawn({
            let pool = Arc::clone(&pool);
            async move { pool.get_or_create(fp("slow"), "slow", ConnectionFlags::default()).await }
        });
        connector.entered.notified().await;

        let fast = tokio::time::timeout(
            Duration::from_secs(1),
            pool.get_or_create(fp("fast"), "fast", ConnectionFlags::default()),
        )
        .await
        .expect("fast build waited on the slow one")
        .unwrap();
        assert!(!slow.is_finished());
        assert!(pool.get(&fp("slow")).is_none());

        connector.release.notify_one();
        let slow = slow.await.unwrap().unwrap();
        assert!(!Arc::ptr_eq(&slow, &fast));
        assert_eq!(pool.len(), 2);
    }

    #[tokio::test]
    async fn failed_construction_is_retried() {
        let connector = Arc::new(CountingConnector::default());
        connector.fail_first.store(true, Ordering::SeqCst);
        let pool = ConnectionPool::new(connector.clone());

        let err = pool.get_or_create(fp("a"), "a", ConnectionFlags::default()).await;
        assert!(matches!(err, Err(RelayError::Ledger(LedgerError::Unreachable(_)))));
        assert!(pool.get(&fp("a")).is_none());

        pool.get_or_create(fp("a"), "a", ConnectionFlags::default()).await.unwrap();
        assert_eq!(connector.builds.load(Ordering::SeqCst), 2);
        assert!(pool.get(&fp("a")).is_some());
    }

    #[tokio::test]
    async fn evict_idle_spares_referenced_clients() {
        let pool = ConnectionPool::new(Arc::new(CountingConnector::default()));
        let held = pool.get_or_create(fp("held"), "held", ConnectionFlags::default()).await.unwrap();
        let dropped = pool.get_or_create(fp("free"), "free", ConnectionFlags::default()).await.unwrap();
        drop(dropped);

        let evicted = pool.evict_idle(Duration::ZERO);
        assert_eq!(evicted, vec![fp("free")]);
        assert_eq!(pool.fingerprints(), vec![fp("held")]);
        drop(held);
    }

    #[tokio::test]
    async fn evict_idle_respects_ttl() {
        let pool = ConnectionPool::new(Arc::new(CountingConnector::default()));
        pool.get_or_create(fp("a"), "a", ConnectionFlags::default()).await.unwrap();
        assert!(pool.evict_idle(Duration::from_secs(3600)).is_empty());
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn explicit_evict_keeps_outstanding_handles() {
        let pool = ConnectionPool::new(Arc::new(CountingConnector::default()));
        let h = pool.get_or_create(fp("a"), "a", ConnectionFlags::default()).await.unwrap();
        let removed = pool.evict(&fp("a")).unwrap();
        assert!(Arc::ptr_eq(&h, &removed));
        assert!(pool.is_empty());
        assert_eq!(h.network_id(), "stub-net");
    }
}
