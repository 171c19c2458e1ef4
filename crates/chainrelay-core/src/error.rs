//! Error types for the relay pipeline.

use thiserror::Error;

/// Errors raised by a [`LedgerClient`](crate::ledger::LedgerClient) or
/// [`LedgerConnector`](crate::ledger::LedgerConnector).
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The network configuration could not be used to build a client.
    #[error("Invalid network configuration: {0}")]
    InvalidConfig(String),

    /// The peer or orderer could not be reached.
    #[error("Ledger unreachable: {0}")]
    Unreachable(String),

    /// The channel is not known to this client.
    #[error("Unknown channel: {channel}")]
    UnknownChannel { channel: String },

    /// The requested block does not exist (yet).
    #[error("Block {number} not found on channel {channel}")]
    BlockNotFound { channel: String, number: u64 },

    /// The requested transaction does not exist.
    #[error("Transaction {tx_id} not found")]
    TransactionNotFound { tx_id: String },

    /// The chaincode rejected the proposal.
    #[error("Chaincode '{chaincode}' failed: {reason}")]
    Chaincode { chaincode: String, reason: String },

    /// Event (un)registration failed.
    #[error("Event registration failed: {0}")]
    Registration(String),

    #[error("{0}")]
    Other(String),
}

/// Errors raised by a [`BrokerClient`](crate::broker::BrokerClient).
#[derive(Debug, Error)]
pub enum BrokerError {
    /// `publish` was called before `start` (or after `stop`).
    #[error("Broker client is not running")]
    NotStarted,

    /// The broker could not be reached or refused the message.
    #[error("Publish to topic '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    /// Start-up handshake failed.
    #[error("Broker connection failed: {0}")]
    Connection(String),
}

/// Top-level error for every relay operation.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed or unusable network configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request itself is malformed (missing fields, bad token, ...).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A chain name that is not in the catalog.
    #[error("Unknown chain: {0}")]
    UnknownChain(String),

    /// Unsubscribe of a key that has no live subscription.
    #[error("subscription not found")]
    SubscriptionNotFound,

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A block payload could not be decoded.
    #[error("Decode error in block {block}: {reason}")]
    Decode { block: u64, reason: String },

    /// Historical replay aborted; the subscription was not activated.
    #[error("Replay from block {from} aborted: {source}")]
    ReplayFailed {
        from: u64,
        #[source]
        source: Box<RelayError>,
    },

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RelayError {
    /// Returns `true` if the caller is at fault (maps to a 4xx response).
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Config(_)
            | Self::InvalidRequest(_)
            | Self::UnknownChain(_)
            | Self::SubscriptionNotFound => true,
            Self::Ledger(LedgerError::InvalidConfig(_)) => true,
            _ => false,
        }
    }

    /// Returns `true` for "not found" style errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SubscriptionNotFound
                | Self::Ledger(LedgerError::BlockNotFound { .. })
                | Self::Ledger(LedgerError::TransactionNotFound { .. })
        )
    }
}
