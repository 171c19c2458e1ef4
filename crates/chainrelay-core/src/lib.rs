//! chainrelay-core: chaincode event subscription, replay and forwarding.
//!
//! # Architecture
//!
//! ```text
//! SubscriptionBridge
//!     ├── ConnectionPool        (fingerprint → LedgerClient, single-flight)
//!     ├── ReplayEngine          (historical blocks, in order)
//!     ├── SubscriptionWorker    (one task per subscription, live events)
//!     ├── SubscriptionRegistry  (SubscriptionKey → record)
//!     └── EventForwarder        (LedgerEvent → BrokerEnvelope → BrokerClient)
//! ```

pub mod bridge;
pub mod broker;
pub mod error;
pub mod filter;
pub mod fingerprint;
pub mod forwarder;
pub mod key;
pub mod ledger;
pub mod pool;
pub mod profile;
pub mod registry;
pub mod replay;
pub mod types;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use bridge::{BridgeConfig, NetworkSource, SubscribeOutcome, SubscribeRequest, SubscriptionBridge};
pub use broker::{BrokerClient, BrokerHandle};
pub use error::{BrokerError, LedgerError, RelayError};
pub use filter::EventFilter;
pub use fingerprint::{ConfigFingerprint, ConnectionFlags};
pub use forwarder::{EventForwarder, EventSink, ForwardSink, Route};
pub use key::SubscriptionKey;
pub use ledger::{ClientHandle, LedgerClient, LedgerConnector, LiveEvents, Registration};
pub use pool::ConnectionPool;
pub use profile::NetworkProfile;
pub use registry::{SubscriptionInfo, SubscriptionRecord, SubscriptionRegistry};
pub use replay::{ReplayEngine, ReplayOutcome};
pub use types::{
    Block, BlockHeader, BrokerEnvelope, ChaincodeAction, ChaincodeEvent, ContractInfo,
    EnvelopeBody, LedgerEvent, Transaction, TransactionInfo, TxValidationCode,
};
pub use worker::{StopReason, SubscriptionWorker, WorkerCounters, WorkerState, WorkerStats};
