//! Shared ledger and broker types.

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

// ─── ChaincodeEvent ───────────────────────────────────────────────────────────

/// A chaincode event as emitted by `SetEvent` inside a chaincode action.
///
/// Blocks carry it encoded (JSON) inside the action; see [`ChaincodeAction`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaincodeEvent {
    pub chaincode_id: String,
    pub tx_id: String,
    pub event_name: String,
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl ChaincodeEvent {
    /// Encode for embedding in a [`ChaincodeAction`].
    pub fn encode(&self) -> Result<Vec<u8>, RelayError> {
        Ok(serde_json::to_vec(self)?)
    }
}

// ─── Block ────────────────────────────────────────────────────────────────────

/// Validation outcome recorded by the committing peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxValidationCode {
    Valid,
    MvccReadConflict,
    EndorsementPolicyFailure,
    /// Any other non-valid code, by name.
    Invalid(String),
}

impl TxValidationCode {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// One chaincode action inside an endorser transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaincodeAction {
    pub chaincode_id: String,
    /// Encoded [`ChaincodeEvent`], absent when the action set no event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<u8>>,
}

/// A transaction as committed in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub tx_id: String,
    pub validation: TxValidationCode,
    pub actions: Vec<ChaincodeAction>,
}

/// Block header fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub number: u64,
    pub previous_hash: String,
    pub data_hash: String,
}

/// A committed block on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub header: BlockHeader,
    pub channel_id: String,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Decode every chaincode event in this block.
    ///
    /// Events come out in transaction order, then action order. Transactions
    /// that failed validation contribute nothing.
    pub fn events(&self) -> Result<Vec<LedgerEvent>, RelayError> {
        let mut out = Vec::new();
        for tx in &self.transactions {
            out.extend(decode_transaction(tx, self.number(), &self.channel_id)?);
        }
        Ok(out)
    }
}

/// Decode the chaincode events of a single transaction.
pub fn decode_transaction(
    tx: &Transaction,
    block_number: u64,
    channel_id: &str,
) -> Result<Vec<LedgerEvent>, RelayError> {
    if !tx.validation.is_valid() {
        return Ok(vec![]);
    }
    let mut out = Vec::new();
    for (idx, action) in tx.actions.iter().enumerate() {
        let Some(bytes) = &action.events else { continue };
        if bytes.is_empty() {
            continue;
        }
        let ev: ChaincodeEvent = serde_json::from_slice(bytes).map_err(|e| RelayError::Decode {
            block: block_number,
            reason: format!("tx {} action {idx}: {e}", tx.tx_id),
        })?;
        out.push(LedgerEvent {
            chaincode_id: ev.chaincode_id,
            event_name: ev.event_name,
            payload: ev.payload,
            block_number,
            channel_id: channel_id.to_string(),
            tx_id: if ev.tx_id.is_empty() { tx.tx_id.clone() } else { ev.tx_id },
        });
    }
    Ok(out)
}

// ─── LedgerEvent ──────────────────────────────────────────────────────────────

/// A decoded chaincode event, bound to the block it was committed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEvent {
    pub chaincode_id: String,
    pub event_name: String,
    pub payload: Vec<u8>,
    pub block_number: u64,
    pub channel_id: String,
    pub tx_id: String,
}

impl LedgerEvent {
    /// The payload as JSON when it parses, otherwise as a (lossy) UTF-8 string.
    pub fn payload_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&self.payload).into_owned())
        })
    }
}

// ─── Chaincode / transaction views ────────────────────────────────────────────

/// A chaincode definition committed on a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractInfo {
    pub name: String,
    pub version: String,
    pub sequence: i64,
}

/// A processed transaction looked up by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInfo {
    pub block_number: u64,
    pub channel_id: String,
    pub transaction: Transaction,
}

// ─── BrokerEnvelope ───────────────────────────────────────────────────────────

/// A message ready to be handed to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEnvelope {
    pub topic: String,
    pub body: Vec<u8>,
}

/// JSON body of a [`BrokerEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeBody {
    /// Caller-supplied routing label, e.g. `cross.fabric-main.escrow`.
    pub path: String,
    pub event_data: serde_json::Value,
    pub tx_id: String,
    pub chaincode_name: String,
    pub block_height: u64,
    /// Network identity of the source chain.
    pub chain_id: String,
    pub channel_id: String,
    /// The event name.
    pub topic: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(cc: &str, name: &str, payload: &[u8]) -> ChaincodeAction {
        let ev = ChaincodeEvent {
            chaincode_id: cc.into(),
            tx_id: String::new(),
            event_name: name.into(),
            payload: payload.to_vec(),
        };
        ChaincodeAction { chaincode_id: cc.into(), events: Some(ev.encode().unwrap()) }
    }

    fn block(txs: Vec<Transaction>) -> Block {
        Block {
            header: BlockHeader { number: 7, previous_hash: "aa".into(), data_hash: "bb".into() },
            channel_id: "mychannel".into(),
            transactions: txs,
        }
    }

    #[test]
    fn events_follow_tx_then_action_order() {
        let b = block(vec![
            Transaction {
                tx_id: "t1".into(),
                validation: TxValidationCode::Valid,
                actions: vec![action("cc", "A", b"1"), action("cc", "B", b"2")],
            },
            Transaction {
                tx_id: "t2".into(),
                validation: TxValidationCode::Valid,
                actions: vec![action("cc", "C", b"3")],
            },
        ]);
        let names: Vec<_> = b.events().unwrap().into_iter().map(|e| e.event_name).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn event_inherits_tx_id_and_block() {
        let b = block(vec![Transaction {
            tx_id: "t9".into(),
            validation: TxValidationCode::Valid,
            actions: vec![action("cc", "A", b"{}")],
        }]);
        let ev = &b.events().unwrap()[0];
        assert_eq!(ev.tx_id, "t9");
        assert_eq!(ev.block_number, 7);
        assert_eq!(ev.channel_id, "mychannel");
    }

    #[test]
    fn invalid_transactions_are_skipped() {
        let b = block(vec![Transaction {
            tx_id: "t1".into(),
            validation: TxValidationCode::MvccReadConflict,
            actions: vec![action("cc", "A", b"1")],
        }]);
        assert!(b.events().unwrap().is_empty());
    }

    #[test]
    fn undecodable_event_bytes_fail() {
        let b = block(vec![Transaction {
            tx_id: "t1".into(),
            validation: TxValidationCode::Valid,
            actions: vec![ChaincodeAction { chaincode_id: "cc".into(), events: Some(b"\x00\x01".to_vec()) }],
        }]);
        let err = b.events().unwrap_err();
        assert!(matches!(err, RelayError::Decode { block: 7, .. }));
    }

    #[test]
    fn payload_json_falls_back_to_string() {
        let mut ev = LedgerEvent {
            chaincode_id: "cc".into(),
            event_name: "E".into(),
            payload: br#"["a","b"]"#.to_vec(),
            block_number: 1,
            channel_id: "ch".into(),
            tx_id: "t".into(),
        };
        assert_eq!(ev.payload_json(), serde_json::json!(["a", "b"]));
        ev.payload = b"plain text".to_vec();
        assert_eq!(ev.payload_json(), serde_json::json!("plain text"));
    }
}
