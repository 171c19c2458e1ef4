//! Chaincode event filter.

use serde::{Deserialize, Serialize};

use crate::types::LedgerEvent;

/// Exact, case-sensitive match on `(chaincode_id, event_name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    pub chaincode_id: String,
    pub event_name: String,
}

impl EventFilter {
    pub fn new(chaincode_id: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self { chaincode_id: chaincode_id.into(), event_name: event_name.into() }
    }

    pub fn matches(&self, event: &LedgerEvent) -> bool {
        event.chaincode_id == self.chaincode_id && event.event_name == self.event_name
    }
}
