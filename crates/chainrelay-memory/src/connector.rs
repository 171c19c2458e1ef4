//! Connector that resolves network profiles to in-memory ledgers.
//!
//! Profiles are matched to networks by name (`name:` in the profile, else
//! the client organization). Unknown names get a fresh ledger with the
//! profile's channels, which is then reused for later connects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use chainrelay_core::ledger::{ClientHandle, LedgerConnector};
use chainrelay_core::{ConnectionFlags, LedgerError, NetworkProfile};

use crate::ledger::{MemoryLedger, DEFAULT_CAPACITY};

pub struct MemoryConnector {
    capacity: usize,
    networks: Mutex<HashMap<String, Arc<MemoryLedger>>>,
    connects: AtomicUsize,
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MemoryConnector {
    /// `capacity` sizes the live event channel of every registration.
    pub fn new(capacity: usize) -> Self {
        Self { capacity, networks: Mutex::new(HashMap::new()), connects: AtomicUsize::new(0) }
    }

    /// Pre-register a ledger under its network id.
    pub fn with_network(self, ledger: Arc<MemoryLedger>) -> Self {
        self.insert(ledger);
        self
    }

    pub fn insert(&self, ledger: Arc<MemoryLedger>) {
        use chainrelay_core::LedgerClient;
        self.networks.lock().insert(ledger.network_id().to_string(), ledger);
    }

    pub fn network(&self, name: &str) -> Option<Arc<MemoryLedger>> {
        self.networks.lock().get(name).cloned()
    }

    /// Successful `connect` calls so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerConnector for MemoryConnector {
    async fn connect(&self, raw_config: &str, flags: ConnectionFlags) -> Result<ClientHandle, LedgerError> {
        let profile =
            NetworkProfile::parse(raw_config).map_err(|e| LedgerError::InvalidConfig(e.to_string()))?;
        let name = profile.name.clone().unwrap_or_else(|| profile.organization.clone());

        let ledger = Arc::clone(
            self.networks
                .lock()
                .entry(name.clone())
                .or_insert_with(|| Arc::new(MemoryLedger::from_profile(&profile, self.capacity))),
        );
        for channel in &profile.channels {
            ledger.create_channel(channel);
        }

        self.connects.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            network = %name,
            organization = %profile.organization,
            channels = profile.channels.len(),
            gm_tls = flags.gm_tls,
            "connected in-memory ledger"
        );
        Ok(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainrelay_core::LedgerClient;

    const PROFILE: &str = "name: net-a\nclient:\n  organization: Org1\norganizations:\n  Org1:\n    mspid: Org1MSP\nchannels:\n  mychannel:\n";

    #[tokio::test]
    async fn same_network_name_shares_ledger() {
        let c = MemoryConnector::default();
        let a = c.connect(PROFILE, ConnectionFlags::default()).await.unwrap();
        let b = c
            .connect(PROFILE, ConnectionFlags { gm_tls: true, tx_timestamp: false })
            .await
            .unwrap();
        assert_eq!(a.network_id(), "net-a");
        assert_eq!(b.channels().await.unwrap(), vec!["mychannel"]);
        assert!(c.network("net-a").is_some());
        assert_eq!(c.connects(), 2);
    }

    #[tokio::test]
    async fn preseeded_network_is_used() {
        let ledger = Arc::new(MemoryLedger::new("net-a", &["mychannel"]));
        ledger.append_empty_blocks("mychannel", 4).unwrap();
        let c = MemoryConnector::default().with_network(ledger);
        let client = c.connect(PROFILE, ConnectionFlags::default()).await.unwrap();
        assert_eq!(client.ledger_height("mychannel").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn bad_profile_is_invalid_config() {
        let c = MemoryConnector::default();
        let err = c.connect("just: text", ConnectionFlags::default()).await.err().unwrap();
        assert!(matches!(err, LedgerError::InvalidConfig(_)));
        assert_eq!(c.connects(), 0);
    }
}
