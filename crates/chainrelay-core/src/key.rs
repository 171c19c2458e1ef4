//! Subscription identity.
//!
//! A subscription is identified by the network it listens on plus the
//! `(channel, chaincode, event)` triple. The single-string token hex-encodes
//! every free-form component so that `:` can be used as the separator:
//!
//!   `<fingerprint-hex>:<hex(channel)>:<hex(chaincode)>:<hex(event)>`

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::fingerprint::ConfigFingerprint;

/// Structured subscription key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub fingerprint: ConfigFingerprint,
    pub channel_id: String,
    pub chaincode_id: String,
    pub event_name: String,
}

impl SubscriptionKey {
    pub fn new(
        fingerprint: ConfigFingerprint,
        channel_id: impl Into<String>,
        chaincode_id: impl Into<String>,
        event_name: impl Into<String>,
    ) -> Self {
        Self {
            fingerprint,
            channel_id: channel_id.into(),
            chaincode_id: chaincode_id.into(),
            event_name: event_name.into(),
        }
    }

    /// The opaque token handed back to HTTP callers.
    pub fn token(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.fingerprint.to_hex(),
            hex::encode(&self.channel_id),
            hex::encode(&self.chaincode_id),
            hex::encode(&self.event_name),
        )
    }
}

impl std::fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.fingerprint.short(),
            self.channel_id,
            self.chaincode_id,
            self.event_name
        )
    }
}

fn decode_part(part: &str, what: &str) -> Result<String, RelayError> {
    let bytes = hex::decode(part)
        .map_err(|e| RelayError::InvalidRequest(format!("bad {what} in subscription id: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|_| RelayError::InvalidRequest(format!("{what} in subscription id is not UTF-8")))
}

impl FromStr for SubscriptionKey {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let [fp, channel, chaincode, event] = parts.as_slice() else {
            return Err(RelayError::InvalidRequest(format!(
                "subscription id must have 4 parts, got {}",
                parts.len()
            )));
        };
        Ok(Self {
            fingerprint: ConfigFingerprint::from_hex(fp)?,
            channel_id: decode_part(channel, "channel")?,
            chaincode_id: decode_part(chaincode, "chaincode")?,
            event_name: decode_part(event, "event")?,
        })
    }
}

impl Serialize for SubscriptionKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.token())
    }
}

impl<'de> Deserialize<'de> for SubscriptionKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::ConnectionFlags;

    fn fp() -> ConfigFingerprint {
        ConfigFingerprint::compute("profile", ConnectionFlags::default())
    }

    #[test]
    fn token_parses_back() {
        let key = SubscriptionKey::new(fp(), "mychannel", "escrow", "Created");
        let parsed: SubscriptionKey = key.token().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn colons_in_components_are_unambiguous() {
        let a = SubscriptionKey::new(fp(), "ch", "cc:x", "ev");
        let b = SubscriptionKey::new(fp(), "ch", "cc", "x:ev");
        assert_ne!(a.token(), b.token());
        assert_eq!(a.token().parse::<SubscriptionKey>().unwrap(), a);
        assert_eq!(b.token().parse::<SubscriptionKey>().unwrap(), b);
    }

    #[test]
    fn rebuilding_from_parts_gives_same_key() {
        let a = SubscriptionKey::new(fp(), "ch", "cc", "ev");
        let b = SubscriptionKey::new(fp(), "ch".to_string(), "cc".to_string(), "ev".to_string());
        assert_eq!(a, b);
        assert_eq!(a.token(), b.token());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!("".parse::<SubscriptionKey>().is_err());
        assert!("a:b:c".parse::<SubscriptionKey>().is_err());
        let bad_fp = format!("zz:{}:{}:{}", hex::encode("a"), hex::encode("b"), hex::encode("c"));
        assert!(bad_fp.parse::<SubscriptionKey>().is_err());
        let bad_part = format!("{}:nothex:{}:{}", fp().to_hex(), hex::encode("b"), hex::encode("c"));
        assert!(matches!(
            bad_part.parse::<SubscriptionKey>(),
            Err(RelayError::InvalidRequest(_))
        ));
    }

    #[test]
    fn serializes_as_token() {
        let key = SubscriptionKey::new(fp(), "ch", "cc", "ev");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.token()));
    }
}
