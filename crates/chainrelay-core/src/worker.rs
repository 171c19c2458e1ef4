//! Live delivery task, one per subscription.
//!
//! State machine, published on a `watch` channel:
//!
//! ```text
//! Starting ──▶ Listening ──▶ Stopped(Cancelled | ChannelClosed)
//! ```
//!
//! The loop selects over the cancellation token and the live receiver with
//! the token polled first, so once cancellation is observed no further
//! event is delivered. Buffered events are not drained on stop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::filter::EventFilter;
use crate::forwarder::EventSink;
use crate::key::SubscriptionKey;
use crate::ledger::LiveEvents;
use crate::types::LedgerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    Cancelled,
    ChannelClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkerState {
    Starting,
    Listening,
    Stopped(StopReason),
}

impl WorkerState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Listening => write!(f, "listening"),
            Self::Stopped(StopReason::Cancelled) => write!(f, "stopped (cancelled)"),
            Self::Stopped(StopReason::ChannelClosed) => write!(f, "stopped (channel closed)"),
        }
    }
}

/// Per-worker counters.
#[derive(Debug, Default)]
pub struct WorkerStats {
    forwarded: AtomicU64,
    filtered: AtomicU64,
    deduplicated: AtomicU64,
    publish_failures: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerCounters {
    pub forwarded: u64,
    pub filtered: u64,
    pub deduplicated: u64,
    pub publish_failures: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerCounters {
        WorkerCounters {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}

/// What the owner keeps after spawning a worker.
pub struct WorkerHandle {
    pub join: JoinHandle<()>,
    pub state: watch::Receiver<WorkerState>,
    pub stats: Arc<WorkerStats>,
}

pub struct SubscriptionWorker {
    key: SubscriptionKey,
    filter: EventFilter,
    sink: Arc<dyn EventSink>,
    /// Live events below this height were already covered by replay.
    watermark: u64,
    token: CancellationToken,
    stats: Arc<WorkerStats>,
}

impl SubscriptionWorker {
    pub fn new(
        key: SubscriptionKey,
        filter: EventFilter,
        sink: Arc<dyn EventSink>,
        watermark: u64,
        token: CancellationToken,
    ) -> Self {
        Self { key, filter, sink, watermark, token, stats: Arc::new(WorkerStats::default()) }
    }

    /// Spawn the delivery loop on the current runtime.
    pub fn spawn(self, events: LiveEvents) -> WorkerHandle {
        let (state_tx, state_rx) = watch::channel(WorkerState::Starting);
        let stats = Arc::clone(&self.stats);
        let join = tokio::spawn(self.run(events, state_tx));
        WorkerHandle { join, state: state_rx, stats }
    }

    async fn run(self, mut events: LiveEvents, state: watch::Sender<WorkerState>) {
        state.send_replace(WorkerState::Listening);
        tracing::debug!(subscription = %self.key, watermark = self.watermark, "worker listening");

        let reason = loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break StopReason::Cancelled,
                msg = events.recv() => match msg {
                    Some(event) => self.handle(event).await,
                    None => {
                        tracing::warn!(subscription = %self.key, "live event channel closed");
                        break StopReason::ChannelClosed;
                    }
                },
            }
        };

        state.send_replace(WorkerState::Stopped(reason));
        tracing::debug!(subscription = %self.key, ?reason, "worker stopped");
    }

    async fn handle(&self, event: LedgerEvent) {
        if event.block_number < self.watermark {
            self.stats.deduplicated.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(subscription = %self.key, block = event.block_number, "dropping replayed event");
            return;
        }
        if !self.filter.matches(&event) {
            self.stats.filtered.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match self.sink.deliver(&event).await {
            Ok(()) => {
                self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.stats.publish_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::fingerprint::{ConfigFingerprint, ConnectionFlags};
    use crate::forwarder::{EventForwarder, ForwardSink, Route};
    use crate::test_support::{live_event, RecordingBroker};

    fn setup(watermark: u64) -> (Arc<RecordingBroker>, mpsc::Sender<LedgerEvent>, CancellationToken, WorkerHandle) {
        let broker = Arc::new(RecordingBroker::default());
        let sink = Arc::new(ForwardSink::new(
            Arc::new(EventForwarder::new(broker.clone(), "t")),
            Route { path: "p".into(), chain_id: "c".into() },
        ));
        let key = SubscriptionKey::new(
            ConfigFingerprint::compute("x", ConnectionFlags::default()),
            "mychannel",
            "escrow",
            "Created",
        );
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(16);
        let worker = SubscriptionWorker::new(key, EventFilter::new("escrow", "Created"), sink, watermark, token.clone());
        (broker, tx, token, worker.spawn(rx))
    }

    async fn wait_for(state: &mut watch::Receiver<WorkerState>, pred: impl Fn(&WorkerState) -> bool) -> WorkerState {
        tokio::time::timeout(Duration::from_secs(2), state.wait_for(|s| pred(s)))
            .await
            .expect("state not reached in time")
            .map(|s| *s)
            .unwrap()
    }

    #[tokio::test]
    async fn forwards_matches_and_counts_misses() {
        let (broker, tx, token, mut handle) = setup(0);
        wait_for(&mut handle.state, |s| *s == WorkerState::Listening).await;

        tx.send(live_event("escrow", "Created", 1)).await.unwrap();
        tx.send(live_event("escrow", "Released", 2)).await.unwrap();
        tx.send(live_event("other", "Created", 3)).await.unwrap();
        tx.send(live_event("escrow", "Created", 4)).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while handle.stats.snapshot().forwarded < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let counters = handle.stats.snapshot();
        assert_eq!(counters.filtered, 2);
        assert_eq!(broker.count(), 2);
        token.cancel();
        handle.join.await.unwrap();
    }

    #[tokio::test]
    async fn drops_events_below_watermark() {
        let (broker, tx, token, handle) = setup(12);
        tx.send(live_event("escrow", "Created", 11)).await.unwrap();
        tx.send(live_event("escrow", "Created", 12)).await.unwrap();
        drop(tx);
        handle.join.await.unwrap();

        assert_eq!(handle.stats.snapshot().deduplicated, 1);
        let bodies = broker.bodies();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["blockHeight"], 12);
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn cancellation_stops_delivery() {
        let (broker, tx, token, mut handle) = setup(0);
        wait_for(&mut handle.state, |s| *s == WorkerState::Listening).await;

        token.cancel();
        let state = wait_for(&mut handle.state, WorkerState::is_stopped).await;
        assert_eq!(state, WorkerState::Stopped(StopReason::Cancelled));

        // Receiver is gone once the task exits.
        let _ = tx.send(live_event("escrow", "Created", 5)).await;
        handle.join.await.unwrap();
        assert_eq!(broker.count(), 0);
    }

    #[tokio::test]
    async fn closed_channel_is_visible_in_state() {
        let (_broker, tx, _token, mut handle) = setup(0);
        drop(tx);
        let state = wait_for(&mut handle.state, WorkerState::is_stopped).await;
        assert_eq!(state, WorkerState::Stopped(StopReason::ChannelClosed));
        assert_eq!(state.to_string(), "stopped (channel closed)");
    }
}
