//! Broker that keeps published envelopes in memory.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use chainrelay_core::{BrokerClient, BrokerEnvelope, BrokerError};

#[derive(Default)]
pub struct MemoryBroker {
    running: AtomicBool,
    failing: AtomicBool,
    published: Mutex<Vec<BrokerEnvelope>>,
    notify: Notify,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<BrokerEnvelope> {
        self.published.lock().clone()
    }

    /// Published bodies parsed as JSON.
    pub fn bodies(&self) -> Vec<serde_json::Value> {
        self.published
            .lock()
            .iter()
            .filter_map(|e| serde_json::from_slice(&e.body).ok())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.published.lock().len()
    }

    /// Wait until at least `n` envelopes have been published. Returns
    /// `false` on timeout.
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.count() >= n {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl BrokerClient for MemoryBroker {
    fn name(&self) -> &str {
        "memory"
    }

    async fn start(&self) -> Result<(), BrokerError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, topic: &str, body: &[u8]) -> Result<(), BrokerError> {
        if !self.is_running() {
            return Err(BrokerError::NotStarted);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(BrokerError::Publish { topic: topic.into(), reason: "broker refused message".into() });
        }
        self.published.lock().push(BrokerEnvelope { topic: topic.into(), body: body.to_vec() });
        self.notify.notify_waiters();
        Ok(())
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}
