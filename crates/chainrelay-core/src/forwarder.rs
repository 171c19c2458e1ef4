//! Projects ledger events into broker envelopes and publishes them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::broker::BrokerHandle;
use crate::error::RelayError;
use crate::types::{BrokerEnvelope, EnvelopeBody, LedgerEvent};

/// Per-subscription envelope fields that do not come from the event itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Routing label written to `path`.
    pub path: String,
    /// Network identity written to `chainId`.
    pub chain_id: String,
}

impl Route {
    /// `cross.<chain>.<chaincode>`, the label used when the caller gives none.
    pub fn default_path(chain: &str, chaincode_id: &str) -> String {
        format!("cross.{chain}.{chaincode_id}")
    }
}

/// Where matching events are handed, both during replay and live delivery.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: &LedgerEvent) -> Result<(), RelayError>;
}

/// Publishes each event to a single broker topic, at most once.
pub struct EventForwarder {
    broker: BrokerHandle,
    topic: String,
}

impl EventForwarder {
    pub fn new(broker: BrokerHandle, topic: impl Into<String>) -> Self {
        Self { broker, topic: topic.into() }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn broker(&self) -> &BrokerHandle {
        &self.broker
    }

    pub fn envelope(&self, event: &LedgerEvent, route: &Route) -> Result<BrokerEnvelope, RelayError> {
        let body = EnvelopeBody {
            path: route.path.clone(),
            event_data: event.payload_json(),
            tx_id: event.tx_id.clone(),
            chaincode_name: event.chaincode_id.clone(),
            block_height: event.block_number,
            chain_id: route.chain_id.clone(),
            channel_id: event.channel_id.clone(),
            topic: event.event_name.clone(),
        };
        Ok(BrokerEnvelope { topic: self.topic.clone(), body: serde_json::to_vec(&body)? })
    }

    /// Build the envelope and publish it once. Failures are logged and returned.
    pub async fn forward(&self, event: &LedgerEvent, route: &Route) -> Result<(), RelayError> {
        let envelope = self.envelope(event, route)?;
        match self.broker.publish(&envelope.topic, &envelope.body).await {
            Ok(()) => {
                tracing::debug!(
                    topic = %envelope.topic,
                    block = event.block_number,
                    tx_id = %event.tx_id,
                    "forwarded event"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    topic = %envelope.topic,
                    block = event.block_number,
                    tx_id = %event.tx_id,
                    error = %e,
                    "publish failed, event dropped"
                );
                Err(e.into())
            }
        }
    }
}

/// An [`EventForwarder`] bound to one subscription's [`Route`].
pub struct ForwardSink {
    forwarder: Arc<EventForwarder>,
    route: Route,
}

impl ForwardSink {
    pub fn new(forwarder: Arc<EventForwarder>, route: Route) -> Self {
        Self { forwarder, route }
    }

    pub fn route(&self) -> &Route {
        &self.route
    }
}

#[async_trait]
impl EventSink for ForwardSink {
    async fn deliver(&self, event: &LedgerEvent) -> Result<(), RelayError> {
        self.forwarder.forward(event, &self.route).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::test_support::{live_event, RecordingBroker};

    fn route() -> Route {
        Route { path: Route::default_path("fabric-main", "escrow"), chain_id: "net-1".into() }
    }

    #[tokio::test]
    async fn envelope_carries_event_fields() {
        let broker = Arc::new(RecordingBroker::default());
        let fwd = EventForwarder::new(broker.clone(), "relay-events");
        let ev = live_event("escrow", "Created", 13);

        fwd.forward(&ev, &route()).await.unwrap();

        let published = broker.published.lock().clone();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "relay-events");
        let body: serde_json::Value = serde_json::from_slice(&published[0].1).unwrap();
        assert_eq!(body["path"], "cross.fabric-main.escrow");
        assert_eq!(body["eventData"]["live"], true);
        assert_eq!(body["txId"], "tx-13");
        assert_eq!(body["chaincodeName"], "escrow");
        assert_eq!(body["blockHeight"], 13);
        assert_eq!(body["chainId"], "net-1");
        assert_eq!(body["channelId"], "mychannel");
        assert_eq!(body["topic"], "Created");
    }

    #[tokio::test]
    async fn publish_failure_is_returned_once() {
        let broker = Arc::new(RecordingBroker::default());
        broker.fail.store(true, Ordering::SeqCst);
        let sink = ForwardSink::new(Arc::new(EventForwarder::new(broker.clone(), "t")), route());

        let err = sink.deliver(&live_event("escrow", "Created", 1)).await.unwrap_err();
        assert!(matches!(err, RelayError::Broker(_)));
        assert_eq!(broker.count(), 0);
    }
}
