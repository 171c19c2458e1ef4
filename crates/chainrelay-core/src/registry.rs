//! Live subscription registry.
//!
//! A single `parking_lot::RwLock` guards the map: register, revoke and
//! drain take it exclusively, lookup and list share it. Guards are scoped,
//! so no code path can leave it held.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::filter::EventFilter;
use crate::forwarder::Route;
use crate::key::SubscriptionKey;
use crate::ledger::{ClientHandle, Registration};
use crate::replay::ReplayOutcome;
use crate::worker::{WorkerCounters, WorkerState, WorkerStats};

/// Everything needed to tear a subscription down.
pub struct SubscriptionRecord {
    pub key: SubscriptionKey,
    pub registration: Registration,
    pub token: CancellationToken,
    pub join: JoinHandle<()>,
    pub state: watch::Receiver<WorkerState>,
    pub stats: Arc<WorkerStats>,
    pub client: ClientHandle,
    pub filter: EventFilter,
    pub route: Route,
    pub replay: ReplayOutcome,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    pub fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            subscribe_id: self.key.clone(),
            channel_id: self.key.channel_id.clone(),
            chaincode_id: self.filter.chaincode_id.clone(),
            event_name: self.filter.event_name.clone(),
            path: self.route.path.clone(),
            chain_id: self.route.chain_id.clone(),
            state: *self.state.borrow(),
            counters: self.stats.snapshot(),
            replay: self.replay,
            created_at: self.created_at,
        }
    }
}

impl std::fmt::Debug for SubscriptionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRecord")
            .field("key", &self.key)
            .field("registration", &self.registration)
            .field("state", &*self.state.borrow())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Cloned view of a [`SubscriptionRecord`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    pub subscribe_id: SubscriptionKey,
    pub channel_id: String,
    pub chaincode_id: String,
    pub event_name: String,
    pub path: String,
    pub chain_id: String,
    pub state: WorkerState,
    pub counters: WorkerCounters,
    pub replay: ReplayOutcome,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    records: RwLock<HashMap<SubscriptionKey, SubscriptionRecord>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record` under `key`. Last write wins; the displaced record,
    /// if any, is handed back for the caller to stop.
    pub fn register(&self, key: SubscriptionKey, record: SubscriptionRecord) -> Option<SubscriptionRecord> {
        self.records.write().insert(key, record)
    }

    pub fn lookup(&self, key: &SubscriptionKey) -> Option<SubscriptionInfo> {
        self.records.read().get(key).map(SubscriptionRecord::info)
    }

    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.records.read().contains_key(key)
    }

    /// Remove and return the record for `key`.
    pub fn revoke(&self, key: &SubscriptionKey) -> Option<SubscriptionRecord> {
        self.records.write().remove(key)
    }

    /// Snapshots of every record, oldest first.
    pub fn list(&self) -> Vec<SubscriptionInfo> {
        let mut out: Vec<_> = self.records.read().values().map(SubscriptionRecord::info).collect();
        out.sort_by_key(|i| i.created_at);
        out
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every record.
    pub fn drain(&self) -> Vec<SubscriptionRecord> {
        self.records.write().drain().map(|(_, r)| r).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{ConfigFingerprint, ConnectionFlags};
    use crate::test_support::StubLedger;

    fn key(event: &str) -> SubscriptionKey {
        SubscriptionKey::new(
            ConfigFingerprint::compute("cfg", ConnectionFlags::default()),
            "mychannel",
            "escrow",
            event,
        )
    }

    fn record(key: &SubscriptionKey, reg_id: u64) -> SubscriptionRecord {
        let (_tx, state) = watch::channel(WorkerState::Listening);
        SubscriptionRecord {
            key: key.clone(),
            registration: Registration {
                id: reg_id,
                channel_id: key.channel_id.clone(),
                chaincode_id: key.chaincode_id.clone(),
                event_name: key.event_name.clone(),
            },
            token: CancellationToken::new(),
            join: tokio::spawn(async {}),
            state,
            stats: Arc::new(WorkerStats::default()),
            client: StubLedger::empty(1),
            filter: EventFilter::new(&key.chaincode_id, &key.event_name),
            route: Route { path: "p".into(), chain_id: "c".into() },
            replay: ReplayOutcome::none(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn register_lookup_revoke() {
        let reg = SubscriptionRegistry::new();
        let k = key("Created");
        assert!(reg.register(k.clone(), record(&k, 1)).is_none());

        let info = reg.lookup(&k).unwrap();
        assert_eq!(info.event_name, "Created");
        assert_eq!(info.state, WorkerState::Listening);

        let rec = reg.revoke(&k).unwrap();
        assert_eq!(rec.registration.id, 1);
        assert!(reg.lookup(&k).is_none());
        assert!(reg.revoke(&k).is_none());
    }

    #[tokio::test]
    async fn register_returns_displaced_record() {
        let reg = SubscriptionRegistry::new();
        let k = key("Created");
        reg.register(k.clone(), record(&k, 1));
        let old = reg.register(k.clone(), record(&k, 2)).unwrap();
        assert_eq!(old.registration.id, 1);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.revoke(&k).unwrap().registration.id, 2);
    }

    #[tokio::test]
    async fn list_and_drain() {
        let reg = SubscriptionRegistry::new();
        for (i, ev) in ["A", "B", "C"].iter().enumerate() {
            let k = key(ev);
            reg.register(k.clone(), record(&k, i as u64));
        }
        assert_eq!(reg.list().len(), 3);
        let drained = reg.drain();
        assert_eq!(drained.len(), 3);
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn info_serializes_token_id() {
        let reg = SubscriptionRegistry::new();
        let k = key("Created");
        reg.register(k.clone(), record(&k, 1));
        let json = serde_json::to_value(reg.lookup(&k).unwrap()).unwrap();
        assert_eq!(json["subscribeId"], k.token());
        assert_eq!(json["state"], "listening");
        assert_eq!(json["counters"]["forwarded"], 0);
    }
}
