//! Named chains from the `fabric:` section.
//!
//! A request may say `chainName: fabric-main` instead of posting the whole
//! connection profile. The catalog turns that name into the same
//! [`NetworkSource`] an inline `sdkConfig` would produce, so both forms
//! land on the same pooled client.

use std::collections::BTreeMap;

use anyhow::{Context, Result};

use chainrelay_core::{ConnectionFlags, NetworkProfile, NetworkSource, RelayError, SubscriptionBridge};

use crate::config::ChainConfig;

#[derive(Debug, Clone)]
pub struct ChainEntry {
    pub name: String,
    pub raw_config: String,
    pub flags: ConnectionFlags,
    pub chain_id: Option<String>,
    pub profile: NetworkProfile,
}

impl ChainEntry {
    pub fn new(
        name: impl Into<String>,
        raw_config: impl Into<String>,
        flags: ConnectionFlags,
        chain_id: Option<String>,
    ) -> Result<Self, RelayError> {
        let raw_config = raw_config.into();
        let profile = NetworkProfile::parse(&raw_config)?;
        Ok(Self { name: name.into(), raw_config, flags, chain_id, profile })
    }

    pub fn source(&self) -> NetworkSource {
        NetworkSource {
            raw_config: self.raw_config.clone(),
            flags: self.flags,
            chain_name: Some(self.name.clone()),
            chain_id: self.chain_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChainCatalog {
    chains: BTreeMap<String, ChainEntry>,
}

impl ChainCatalog {
    pub fn new(entries: impl IntoIterator<Item = ChainEntry>) -> Self {
        Self { chains: entries.into_iter().map(|e| (e.name.clone(), e)).collect() }
    }

    /// Read and parse every configured profile.
    pub fn load(fabric: &BTreeMap<String, ChainConfig>) -> Result<Self> {
        let mut entries = Vec::with_capacity(fabric.len());
        for (name, chain) in fabric {
            let raw = std::fs::read_to_string(&chain.config_file_path).with_context(|| {
                format!("read profile for chain '{name}': {}", chain.config_file_path.display())
            })?;
            let entry = ChainEntry::new(name, raw, chain.flags(), chain.chain_id.clone())
                .with_context(|| format!("parse profile for chain '{name}'"))?;
            entries.push(entry);
        }
        Ok(Self::new(entries))
    }

    pub fn get(&self, name: &str) -> Result<&ChainEntry, RelayError> {
        self.chains.get(name).ok_or_else(|| RelayError::UnknownChain(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.chains.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Build the pooled client of every chain. Stops at the first failure.
    pub async fn connect_all(&self, bridge: &SubscriptionBridge) -> Result<(), RelayError> {
        for entry in self.chains.values() {
            let client = bridge.client(&entry.source()).await?;
            tracing::info!(
                chain = %entry.name,
                network = %client.network_id(),
                fingerprint = %entry.source().fingerprint().short(),
                "chain connected"
            );
        }
        Ok(())
    }
}
