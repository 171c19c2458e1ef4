//! Producer that writes each message to the log instead of a broker.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;

use chainrelay_core::{BrokerClient, BrokerError};

#[derive(Debug, Default)]
pub struct LogBroker {
    running: AtomicBool,
    published: AtomicU64,
}

impl LogBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BrokerClient for LogBroker {
    fn name(&self) -> &str {
        "log"
    }

    async fn start(&self) -> Result<(), BrokerError> {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("log broker started; messages are written to the log only");
        Ok(())
    }

    async fn publish(&self, topic: &str, body: &[u8]) -> Result<(), BrokerError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(BrokerError::NotStarted);
        }
        self.published.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            target: "chainrelay::broker",
            topic,
            body = %String::from_utf8_lossy(body),
            "publish"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_publishes_while_running() {
        let b = LogBroker::new();
        assert!(b.publish("t", b"{}").await.is_err());
        b.start().await.unwrap();
        b.publish("t", b"{}").await.unwrap();
        b.publish("t", b"{}").await.unwrap();
        b.stop().await.unwrap();
        assert_eq!(b.published(), 2);
    }
}
