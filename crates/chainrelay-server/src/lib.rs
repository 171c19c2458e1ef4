//! chainrelay-server: HTTP front end for the relay.
//!
//! ```text
//! RelayConfig (YAML) ──► ChainCatalog ──┐
//!                                       ├──► AppState ──► axum Router (/api/v1)
//! SubscriptionBridge ───────────────────┘
//! ```

pub mod api;
pub mod app;
pub mod catalog;
pub mod config;
pub mod observability;

pub use app::{build_router, AppState};
pub use catalog::{ChainCatalog, ChainEntry};
pub use config::{RelayConfig, DEFAULT_CONFIG_PATH};
pub use observability::{init_tracing, LogConfig};
