//! The `BrokerClient` trait: where forwarded events go.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BrokerError;

/// A message-broker producer.
///
/// `start` is called once before the first publish and `stop` once at
/// shutdown. Delivery guarantees past a successful `publish` are the
/// broker's business.
#[async_trait]
pub trait BrokerClient: Send + Sync + 'static {
    /// Human-readable name for logs (`http`, `log`, ...).
    fn name(&self) -> &str;

    async fn start(&self) -> Result<(), BrokerError>;

    async fn publish(&self, topic: &str, body: &[u8]) -> Result<(), BrokerError>;

    async fn stop(&self) -> Result<(), BrokerError>;
}

pub type BrokerHandle = Arc<dyn BrokerClient>;
