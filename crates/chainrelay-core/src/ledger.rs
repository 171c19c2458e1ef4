//! The `LedgerClient` trait: the relay's only view of a blockchain network.
//!
//! A concrete client wraps a ledger SDK (endorsement, gossip, MSP and TLS all
//! live behind it). The relay asks it for blocks, heights, proposals and a
//! per-registration stream of chaincode events.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::LedgerError;
use crate::fingerprint::ConnectionFlags;
use crate::types::{Block, ContractInfo, LedgerEvent, TransactionInfo};

/// Live chaincode events for one registration.
pub type LiveEvents = mpsc::Receiver<LedgerEvent>;

/// Shared, read-only handle to a ledger client.
pub type ClientHandle = Arc<dyn LedgerClient>;

/// Handle to a chaincode-event registration, owned by the client that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: u64,
    pub channel_id: String,
    pub chaincode_id: String,
    pub event_name: String,
}

/// Ledger operations consumed by the relay.
///
/// Object-safe; stored as [`ClientHandle`].
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    /// Network identity reported in forwarded envelopes (`chainId`).
    fn network_id(&self) -> &str;

    /// Channels this client has joined.
    async fn channels(&self) -> Result<Vec<String>, LedgerError>;

    /// Register for chaincode events. Events are delivered on the returned
    /// receiver until [`unregister`](Self::unregister) is called or the
    /// client goes away.
    async fn register_event(
        &self,
        channel_id: &str,
        chaincode_id: &str,
        event_name: &str,
    ) -> Result<(Registration, LiveEvents), LedgerError>;

    /// Drop a registration. Unknown registrations are not an error.
    async fn unregister(&self, registration: &Registration) -> Result<(), LedgerError>;

    /// Number of blocks on the channel; the next block to be committed has this number.
    async fn ledger_height(&self, channel_id: &str) -> Result<u64, LedgerError>;

    /// Fetch a committed block by number.
    async fn block(&self, channel_id: &str, number: u64) -> Result<Block, LedgerError>;

    /// Submit a transaction and wait for commit. Returns the chaincode response payload.
    async fn invoke(
        &self,
        channel_id: &str,
        chaincode_id: &str,
        method: &str,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError>;

    /// Evaluate a read-only proposal.
    async fn query(
        &self,
        channel_id: &str,
        chaincode_id: &str,
        method: &str,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError>;

    /// Look up a processed transaction.
    async fn transaction(&self, channel_id: &str, tx_id: &str)
        -> Result<TransactionInfo, LedgerError>;

    /// Chaincodes committed on the channel.
    async fn contracts(&self, channel_id: &str) -> Result<Vec<ContractInfo>, LedgerError>;

    /// Chaincode metadata (as the chaincode reports it).
    async fn contract_metadata(
        &self,
        channel_id: &str,
        chaincode_id: &str,
    ) -> Result<serde_json::Value, LedgerError>;
}

/// Builds ledger clients from raw network configuration.
#[async_trait]
pub trait LedgerConnector: Send + Sync + 'static {
    async fn connect(
        &self,
        raw_config: &str,
        flags: ConnectionFlags,
    ) -> Result<ClientHandle, LedgerError>;
}
