//! HTTP handlers under `/api/v1`.

pub mod connect;
pub mod contract;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod subscription;
pub mod types;

use chainrelay_core::{ConnectionFlags, NetworkProfile, NetworkSource, RelayError};

use crate::app::AppState;
use crate::api::types::SourceFields;

/// A request's network, resolved to a pool source and its parsed profile.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedSource {
    pub source: NetworkSource,
    pub profile: NetworkProfile,
}

impl ResolvedSource {
    /// The requested channel, or the profile's first channel.
    pub fn channel(&self, requested: Option<String>) -> Result<String, RelayError> {
        match requested.filter(|c| !c.is_empty()) {
            Some(channel) => Ok(channel),
            None => self.profile.default_channel().map(str::to_string).ok_or_else(|| {
                RelayError::InvalidRequest("channelId is required: the profile lists no channels".into())
            }),
        }
    }
}

pub(crate) fn resolve_source(state: &AppState, fields: &SourceFields) -> Result<ResolvedSource, RelayError> {
    let sdk_config = fields.sdk_config.as_deref().filter(|s| !s.trim().is_empty());
    let chain_name = fields.chain_name.as_deref().filter(|s| !s.is_empty());
    match (sdk_config, chain_name) {
        (Some(_), Some(_)) => Err(RelayError::InvalidRequest(
            "set either sdkConfig or chainName, not both".into(),
        )),
        (None, None) => Err(RelayError::InvalidRequest("sdkConfig or chainName is required".into())),
        (None, Some(name)) => resolve_chain(state, name),
        (Some(raw), None) => {
            let profile = NetworkProfile::parse(raw)?;
            let flags = ConnectionFlags { gm_tls: fields.gm_tls, tx_timestamp: fields.tx_timestamp };
            Ok(ResolvedSource { source: NetworkSource::inline(raw, flags), profile })
        }
    }
}

pub(crate) fn resolve_chain(state: &AppState, name: &str) -> Result<ResolvedSource, RelayError> {
    let entry = state.catalog.get(name)?;
    Ok(ResolvedSource { source: entry.source(), profile: entry.profile.clone() })
}
