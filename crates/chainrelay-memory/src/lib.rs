//! chainrelay-memory: in-memory ledger, connector and broker.
//!
//! Used by the test suites and for running the relay without a real
//! network (`mq.type: log` plus profiles that resolve here).

pub mod broker;
pub mod connector;
pub mod ledger;

pub use broker::MemoryBroker;
pub use connector::MemoryConnector;
pub use ledger::{event_transaction, MemoryLedger, DEFAULT_CAPACITY};
