//! Request and response bodies.
//!
//! Every response is wrapped in [`ApiResponse`]: `{code, message, data}`.
//! Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

use chainrelay_core::types::decode_transaction;
use chainrelay_core::{Block, LedgerEvent, RelayError, TransactionInfo};

// ─── Envelope ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { code: 200, message: "Success".to_string(), data }
    }
}

// ─── Network source ───────────────────────────────────────────────────────────

/// Where a request's network comes from: a posted profile or a catalog name.
/// Exactly one of `sdk_config` and `chain_name` must be set. The flags only
/// apply to `sdk_config`; catalog chains carry their own.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFields {
    #[serde(default)]
    pub sdk_config: Option<String>,
    #[serde(default)]
    pub chain_name: Option<String>,
    #[serde(default)]
    pub gm_tls: bool,
    #[serde(default)]
    pub tx_timestamp: bool,
}

// ─── Subscriptions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeBody {
    #[serde(flatten)]
    pub source: SourceFields,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub chaincode_id: String,
    pub event_name: String,
    #[serde(default)]
    pub from_block: Option<u64>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeResult {
    pub subscribe_id: String,
    /// Events forwarded during replay.
    pub replayed: u64,
    /// First block the live worker accepts; absent when no replay was asked for.
    pub next_block: Option<u64>,
}

/// Either `subscribeId`, or the source plus the event triple.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeBody {
    #[serde(default)]
    pub subscribe_id: Option<String>,
    #[serde(flatten)]
    pub source: SourceFields,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub chaincode_id: Option<String>,
    #[serde(default)]
    pub event_name: Option<String>,
}

// ─── Contracts ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalBody {
    #[serde(flatten)]
    pub source: SourceFields,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub chaincode_id: String,
    pub method: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalResult {
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelQuery {
    pub chain_name: String,
    #[serde(default)]
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractQuery {
    pub chain_name: String,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub chaincode_id: String,
}

// ─── Ledger ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockQuery {
    pub chain_name: String,
    #[serde(default)]
    pub channel_id: Option<String>,
    /// A block number or `latest`.
    pub block_number: String,
    #[serde(default)]
    pub only_header: bool,
}

/// Which block `/block/info` asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSelector {
    Latest,
    Number(u64),
}

impl std::str::FromStr for BlockSelector {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }
        s.parse()
            .map(Self::Number)
            .map_err(|_| RelayError::InvalidRequest(format!("blockNumber must be a number or 'latest', got '{s}'")))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQuery {
    pub chain_name: String,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub tx_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainQuery {
    pub chain_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub chaincode_id: String,
    pub event_name: String,
    pub tx_id: String,
    pub block_number: u64,
    pub payload: serde_json::Value,
}

impl From<&LedgerEvent> for EventView {
    fn from(ev: &LedgerEvent) -> Self {
        Self {
            chaincode_id: ev.chaincode_id.clone(),
            event_name: ev.event_name.clone(),
            tx_id: ev.tx_id.clone(),
            block_number: ev.block_number,
            payload: ev.payload_json(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub tx_id: String,
    pub block_number: u64,
    pub channel_id: String,
    pub validation: String,
    pub chaincodes: Vec<String>,
    pub events: Vec<EventView>,
}

impl TransactionView {
    pub fn from_info(info: &TransactionInfo) -> Result<Self, RelayError> {
        let tx = &info.transaction;
        let events = decode_transaction(tx, info.block_number, &info.channel_id)?;
        Ok(Self {
            tx_id: tx.tx_id.clone(),
            block_number: info.block_number,
            channel_id: info.channel_id.clone(),
            validation: serde_json::to_value(&tx.validation)?
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{:?}", tx.validation)),
            chaincodes: tx.actions.iter().map(|a| a.chaincode_id.clone()).collect(),
            events: events.iter().map(EventView::from).collect(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockView {
    pub number: u64,
    pub channel_id: String,
    pub previous_hash: String,
    pub data_hash: String,
    pub tx_count: usize,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub transactions: Option<Vec<TransactionView>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub events: Option<Vec<EventView>>,
}

impl BlockView {
    pub fn from_block(block: &Block, only_header: bool) -> Result<Self, RelayError> {
        let mut view = Self {
            number: block.number(),
            channel_id: block.channel_id.clone(),
            previous_hash: block.header.previous_hash.clone(),
            data_hash: block.header.data_hash.clone(),
            tx_count: block.transactions.len(),
            transactions: None,
            events: None,
        };
        if only_header {
            return Ok(view);
        }
        let mut transactions = Vec::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            transactions.push(TransactionView::from_info(&TransactionInfo {
                block_number: block.number(),
                channel_id: block.channel_id.clone(),
                transaction: tx.clone(),
            })?);
        }
        view.transactions = Some(transactions);
        view.events = Some(block.events()?.iter().map(EventView::from).collect());
        Ok(view)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResult {
    pub chain_name: String,
    pub network_id: String,
    pub channels: Vec<String>,
}

/// Chaincode response bytes as JSON when they parse, otherwise as a string.
pub fn payload_value(bytes: &[u8]) -> serde_json::Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_selector_parses_latest_and_numbers() {
        assert_eq!("latest".parse::<BlockSelector>().unwrap(), BlockSelector::Latest);
        assert_eq!("LATEST".parse::<BlockSelector>().unwrap(), BlockSelector::Latest);
        assert_eq!("42".parse::<BlockSelector>().unwrap(), BlockSelector::Number(42));
        assert!("-1".parse::<BlockSelector>().unwrap_err().is_client_error());
    }

    #[test]
    fn subscribe_body_flattens_source() {
        let body: SubscribeBody = serde_json::from_str(
            r#"{"chainName":"main","chaincodeId":"escrow","eventName":"Created","fromBlock":3}"#,
        )
        .unwrap();
        assert_eq!(body.source.chain_name.as_deref(), Some("main"));
        assert!(body.source.sdk_config.is_none());
        assert!(body.channel_id.is_none());
        assert_eq!(body.from_block, Some(3));
    }

    #[test]
    fn payload_falls_back_to_string() {
        assert_eq!(payload_value(br#"{"a":1}"#)["a"], 1);
        assert_eq!(payload_value(b"tx-7"), serde_json::json!("tx-7"));
    }
}
