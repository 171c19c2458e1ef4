//! Subscription bridge: ties the pool, replay, worker and registry together.
//!
//! Subscribe:
//!   fingerprint → pool client → register live events → replay → spawn worker → store record
//!
//! Live registration comes before replay so nothing committed during the
//! replay is missed; the worker discards the overlap using the replay
//! watermark. A replay failure unregisters and returns the error, and so
//! does a subscribe that finishes after shutdown has drained the registry.
//!
//! Unsubscribe:
//!   revoke → cancel → unregister → join (bounded)

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;
use crate::filter::EventFilter;
use crate::fingerprint::{ConfigFingerprint, ConnectionFlags};
use crate::forwarder::{EventForwarder, ForwardSink, Route};
use crate::key::SubscriptionKey;
use crate::ledger::ClientHandle;
use crate::pool::ConnectionPool;
use crate::registry::{SubscriptionInfo, SubscriptionRecord, SubscriptionRegistry};
use crate::replay::{ReplayEngine, ReplayOutcome};
use crate::worker::SubscriptionWorker;

/// A network configuration as supplied by a request or the chain catalog.
#[derive(Debug, Clone)]
pub struct NetworkSource {
    pub raw_config: String,
    pub flags: ConnectionFlags,
    /// Catalog name, when the source came from one.
    pub chain_name: Option<String>,
    /// Overrides the client's reported network id in envelopes.
    pub chain_id: Option<String>,
}

impl NetworkSource {
    pub fn inline(raw_config: impl Into<String>, flags: ConnectionFlags) -> Self {
        Self { raw_config: raw_config.into(), flags, chain_name: None, chain_id: None }
    }

    pub fn fingerprint(&self) -> ConfigFingerprint {
        ConfigFingerprint::compute(&self.raw_config, self.flags)
    }
}

#[derive(Debug, Clone)]
pub struct SubscribeRequest {
    pub source: NetworkSource,
    pub channel_id: String,
    pub chaincode_id: String,
    pub event_name: String,
    /// Replay from this height before going live. `None` means live only.
    pub from_block: Option<u64>,
    /// Routing label; defaults to `cross.<chain>.<chaincode>`.
    pub path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubscribeOutcome {
    pub key: SubscriptionKey,
    pub replay: ReplayOutcome,
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Upper bound on waiting for a cancelled worker to exit.
    pub join_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self { join_timeout: Duration::from_secs(5) }
    }
}

pub struct SubscriptionBridge {
    pool: Arc<ConnectionPool>,
    registry: SubscriptionRegistry,
    forwarder: Arc<EventForwarder>,
    replay: ReplayEngine,
    config: BridgeConfig,
    root: CancellationToken,
}

impl SubscriptionBridge {
    pub fn new(pool: Arc<ConnectionPool>, forwarder: EventForwarder, config: BridgeConfig) -> Self {
        Self {
            pool,
            registry: SubscriptionRegistry::new(),
            forwarder: Arc::new(forwarder),
            replay: ReplayEngine::new(),
            config,
            root: CancellationToken::new(),
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn forwarder(&self) -> &Arc<EventForwarder> {
        &self.forwarder
    }

    /// Pooled client for `source`, building it on first use.
    pub async fn client(&self, source: &NetworkSource) -> Result<ClientHandle, RelayError> {
        self.pool.get_or_create(source.fingerprint(), &source.raw_config, source.flags).await
    }

    /// The key a subscription on `source` would be stored under.
    pub fn key_for(
        source: &NetworkSource,
        channel_id: &str,
        chaincode_id: &str,
        event_name: &str,
    ) -> SubscriptionKey {
        SubscriptionKey::new(source.fingerprint(), channel_id, chaincode_id, event_name)
    }

    pub async fn subscribe(&self, req: SubscribeRequest) -> Result<SubscribeOutcome, RelayError> {
        if req.channel_id.is_empty() || req.chaincode_id.is_empty() || req.event_name.is_empty() {
            return Err(RelayError::InvalidRequest(
                "channelId, chaincodeId and eventName are required".into(),
            ));
        }
        if self.root.is_cancelled() {
            return Err(RelayError::InvalidRequest("relay is shutting down".into()));
        }

        let client = self.client(&req.source).await?;
        let key = Self::key_for(&req.source, &req.channel_id, &req.chaincode_id, &req.event_name);
        let filter = EventFilter::new(&req.chaincode_id, &req.event_name);
        let chain_id = req.source.chain_id.clone().unwrap_or_else(|| client.network_id().to_string());
        let route = Route {
            path: req.path.clone().unwrap_or_else(|| {
                let chain = req.source.chain_name.as_deref().unwrap_or(&chain_id);
                Route::default_path(chain, &req.chaincode_id)
            }),
            chain_id,
        };
        let sink = Arc::new(ForwardSink::new(Arc::clone(&self.forwarder), route.clone()));

        let (registration, events) = client
            .register_event(&req.channel_id, &req.chaincode_id, &req.event_name)
            .await?;

        let replay = match req.from_block {
            None => ReplayOutcome::none(),
            Some(from) => {
                match self
                    .replay
                    .replay(client.as_ref(), &req.channel_id, from, &filter, sink.as_ref())
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(subscription = %key, from, error = %e, "replay failed, subscription not activated");
                        if let Err(ue) = client.unregister(&registration).await {
                            tracing::warn!(subscription = %key, error = %ue, "unregister after failed replay");
                        }
                        return Err(e);
                    }
                }
            }
        };

        let token = self.root.child_token();
        let worker = SubscriptionWorker::new(key.clone(), filter.clone(), sink, replay.next_height, token.clone());
        let handle = worker.spawn(events);

        let record = SubscriptionRecord {
            key: key.clone(),
            registration,
            token,
            join: handle.join,
            state: handle.state,
            stats: handle.stats,
            client,
            filter,
            route,
            replay,
            created_at: Utc::now(),
        };

        if let Some(displaced) = self.registry.register(key.clone(), record) {
            tracing::info!(subscription = %key, "replacing existing subscription");
            self.retire(displaced).await;
        }

        // shutdown cancels before it drains, so a record registered after the
        // drain is caught here.
        if self.root.is_cancelled() {
            if let Some(late) = self.registry.revoke(&key) {
                self.retire(late).await;
            }
            tracing::warn!(subscription = %key, "relay shut down during subscribe");
            return Err(RelayError::InvalidRequest("relay is shutting down".into()));
        }

        tracing::info!(
            subscription = %key,
            replayed = replay.events_forwarded,
            next_block = replay.next_height,
            "subscribed"
        );
        Ok(SubscribeOutcome { key, replay })
    }

    /// Stop and remove a subscription. Returns its final snapshot.
    pub async fn unsubscribe(&self, key: &SubscriptionKey) -> Result<SubscriptionInfo, RelayError> {
        let record = self.registry.revoke(key).ok_or(RelayError::SubscriptionNotFound)?;
        let info = self.retire(record).await;
        tracing::info!(subscription = %key, forwarded = info.counters.forwarded, "unsubscribed");
        Ok(info)
    }

    pub fn lookup(&self, key: &SubscriptionKey) -> Option<SubscriptionInfo> {
        self.registry.lookup(key)
    }

    pub fn list(&self) -> Vec<SubscriptionInfo> {
        self.registry.list()
    }

    /// Cancel and join every worker. Later subscribes are refused.
    pub async fn shutdown(&self) {
        self.root.cancel();
        let records = self.registry.drain();
        let count = records.len();
        for record in records {
            self.retire(record).await;
        }
        tracing::info!(subscriptions = count, "subscription bridge stopped");
    }

    /// Cancel the worker, unregister, then join with a timeout.
    async fn retire(&self, record: SubscriptionRecord) -> SubscriptionInfo {
        let mut info = record.info();
        record.token.cancel();
        if let Err(e) = record.client.unregister(&record.registration).await {
            tracing::warn!(subscription = %record.key, error = %e, "unregister failed");
        }

        let abort = record.join.abort_handle();
        match tokio::time::timeout(self.config.join_timeout, record.join).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(subscription = %record.key, error = %e, "worker task failed"),
            Err(_) => {
                tracing::warn!(subscription = %record.key, "worker did not stop in time, aborting");
                abort.abort();
            }
        }

        info.state = *record.state.borrow();
        info.counters = record.stats.snapshot();
        info
    }
}
