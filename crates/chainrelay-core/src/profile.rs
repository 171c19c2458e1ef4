//! Connection-profile parsing.
//!
//! Only the handful of sections the relay needs are read: the client's
//! organization, that organization's MSP id and users, the channel list and
//! the peer list. Everything else (TLS material, orderers, CA settings) is
//! left to the ledger SDK.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

#[derive(Debug, Deserialize)]
struct RawProfile {
    name: Option<String>,
    client: Option<RawClient>,
    #[serde(default)]
    organizations: BTreeMap<String, RawOrganization>,
    channels: Option<BTreeMap<String, serde_yaml::Value>>,
    #[serde(default)]
    peers: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct RawClient {
    organization: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOrganization {
    mspid: Option<String>,
    #[serde(default)]
    users: BTreeMap<String, serde_yaml::Value>,
}

/// The parts of a network connection profile the relay acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    /// `name:` at the top of the profile, if any.
    pub name: Option<String>,
    /// `client.organization`.
    pub organization: String,
    /// MSP id of the client organization.
    pub msp_id: Option<String>,
    /// Identity used for channel contexts (prefers a user named `Admin`).
    pub admin_user: Option<String>,
    /// Channel ids, sorted.
    pub channels: Vec<String>,
    /// Peer names, sorted.
    pub peers: Vec<String>,
}

impl NetworkProfile {
    /// Parse a YAML connection profile.
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let raw: RawProfile = serde_yaml::from_str(raw)
            .map_err(|e| RelayError::Config(format!("malformed network profile: {e}")))?;

        let organization = raw
            .client
            .and_then(|c| c.organization)
            .filter(|o| !o.is_empty())
            .ok_or_else(|| RelayError::Config("client.organization not set".into()))?;

        let org = raw.organizations.get(&organization).ok_or_else(|| {
            RelayError::Config(format!("organization '{organization}' not found"))
        })?;

        let admin_user = if org.users.contains_key("Admin") {
            Some("Admin".to_string())
        } else {
            org.users.keys().next().cloned()
        };

        let channels: Vec<String> = raw
            .channels
            .ok_or_else(|| RelayError::Config("channels configuration not found".into()))?
            .into_keys()
            .collect();

        Ok(Self {
            name: raw.name,
            organization,
            msp_id: org.mspid.clone(),
            admin_user,
            channels,
            peers: raw.peers.into_keys().collect(),
        })
    }

    /// The channel used when a request does not name one.
    pub fn default_channel(&self) -> Option<&str> {
        self.channels.first().map(String::as_str)
    }

    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels.iter().any(|c| c == channel)
    }
}
