//! chainrelay-broker: `BrokerClient` implementations.
//!
//! - [`HttpBroker`]: posts each envelope to an HTTP message gateway
//! - [`LogBroker`]: writes each envelope to the tracing log

pub mod http;
pub mod log;

pub use http::{HttpBroker, HttpBrokerConfig};
pub use log::LogBroker;
