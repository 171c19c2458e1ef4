//! Network configuration fingerprints.
//!
//! The fingerprint of a network configuration is the SHA-256 of its raw
//! bytes followed by a canonical encoding of the connection flags:
//!   sha256(raw_config || 0x00 || "gm_tls=<0|1>;tx_timestamp=<0|1>")
//!
//! It is the only key the connection pool uses, so two requests that post
//! byte-identical configurations with the same flags share one client.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RelayError;

/// Algorithm-selection flags that change how a client is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionFlags {
    /// Use the national-standard (SM2/SM3/SM4) TLS suite.
    #[serde(default)]
    pub gm_tls: bool,
    /// Stamp proposals with the client clock instead of letting the peer do it.
    #[serde(default)]
    pub tx_timestamp: bool,
}

impl ConnectionFlags {
    fn canonical(&self) -> String {
        format!(
            "gm_tls={};tx_timestamp={}",
            u8::from(self.gm_tls),
            u8::from(self.tx_timestamp)
        )
    }
}

/// Content hash identifying one network configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigFingerprint([u8; 32]);

impl ConfigFingerprint {
    /// Compute the fingerprint of `raw_config` under `flags`.
    pub fn compute(raw_config: &str, flags: ConnectionFlags) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(raw_config.as_bytes());
        hasher.update([0u8]);
        hasher.update(flags.canonical().as_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        Self(out)
    }

    /// Parse a 64-character hex rendering.
    pub fn from_hex(s: &str) -> Result<Self, RelayError> {
        let bytes = hex::decode(s)
            .map_err(|e| RelayError::InvalidRequest(format!("bad fingerprint '{s}': {e}")))?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            RelayError::InvalidRequest(format!("fingerprint '{s}' must be 32 bytes"))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl std::fmt::Display for ConfigFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ConfigFingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ConfigFingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
