//! In-crate test doubles. The full-featured in-memory ledger lives in
//! `chainrelay-memory`; these are the minimum the unit tests here need.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::broker::BrokerClient;
use crate::error::{BrokerError, LedgerError};
use crate::ledger::{LedgerClient, LiveEvents, Registration};
use crate::types::{
    Block, BlockHeader, ChaincodeAction, ChaincodeEvent, ContractInfo, LedgerEvent, Transaction,
    TransactionInfo, TxValidationCode,
};

/// Build block `number` whose single transaction carries `events` as `(chaincode, name, payload)`.
pub fn block_with(number: u64, events: &[(&str, &str, &str)]) -> Block {
    let actions = events
        .iter()
        .map(|(cc, name, payload)| {
            let ev = ChaincodeEvent {
                chaincode_id: cc.to_string(),
                tx_id: String::new(),
                event_name: name.to_string(),
                payload: payload.as_bytes().to_vec(),
            };
            ChaincodeAction { chaincode_id: cc.to_string(), events: Some(ev.encode().unwrap()) }
        })
        .collect();
    Block {
        header: BlockHeader {
            number,
            previous_hash: format!("{:064x}", number.saturating_sub(1)),
            data_hash: format!("{number:064x}"),
        },
        channel_id: "mychannel".into(),
        transactions: vec![Transaction {
            tx_id: format!("tx-{number}"),
            validation: TxValidationCode::Valid,
            actions,
        }],
    }
}

pub fn live_event(cc: &str, name: &str, block: u64) -> LedgerEvent {
    LedgerEvent {
        chaincode_id: cc.into(),
        event_name: name.into(),
        payload: br#"{"live":true}"#.to_vec(),
        block_number: block,
        channel_id: "mychannel".into(),
        tx_id: format!("tx-{block}"),
    }
}

/// Holds `ledger_height` open: `entered` fires on arrival, `release` lets it return.
#[derive(Clone, Default)]
pub struct HeightGate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// Ledger backed by a fixed block list.
#[derive(Default)]
pub struct StubLedger {
    pub blocks: Mutex<Vec<Block>>,
    pub fail_at: Mutex<Option<u64>>,
    pub height_gate: Mutex<Option<HeightGate>>,
    pub senders: Mutex<Vec<(Registration, mpsc::Sender<LedgerEvent>)>>,
    pub unregistered: Mutex<Vec<u64>>,
    next_id: AtomicU64,
}

impl StubLedger {
    pub fn with_blocks(blocks: Vec<Block>) -> Arc<Self> {
        Arc::new(Self { blocks: Mutex::new(blocks), ..Default::default() })
    }

    /// Height `n`, every block empty.
    pub fn empty(n: u64) -> Arc<Self> {
        Self::with_blocks((0..n).map(|i| block_with(i, &[])).collect())
    }

    /// Push a live event to every registration.
    pub async fn emit(&self, event: LedgerEvent) {
        let senders: Vec<_> = self.senders.lock().iter().map(|(_, tx)| tx.clone()).collect();
        for tx in senders {
            let _ = tx.send(event.clone()).await;
        }
    }

    /// Drop every live sender, closing the receivers.
    pub fn close_all(&self) {
        self.senders.lock().clear();
    }
}

#[async_trait]
impl LedgerClient for StubLedger {
    fn network_id(&self) -> &str {
        "stub-net"
    }

    async fn channels(&self) -> Result<Vec<String>, LedgerError> {
        Ok(vec!["mychannel".into()])
    }

    async fn register_event(
        &self,
        channel_id: &str,
        chaincode_id: &str,
        event_name: &str,
    ) -> Result<(Registration, LiveEvents), LedgerError> {
        let reg = Registration {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            channel_id: channel_id.into(),
            chaincode_id: chaincode_id.into(),
            event_name: event_name.into(),
        };
        let (tx, rx) = mpsc::channel(64);
        self.senders.lock().push((reg.clone(), tx));
        Ok((reg, rx))
    }

    async fn unregister(&self, registration: &Registration) -> Result<(), LedgerError> {
        self.senders.lock().retain(|(r, _)| r.id != registration.id);
        self.unregistered.lock().push(registration.id);
        Ok(())
    }

    async fn ledger_height(&self, _channel_id: &str) -> Result<u64, LedgerError> {
        let gate = self.height_gate.lock().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        Ok(self.blocks.lock().len() as u64)
    }

    async fn block(&self, channel_id: &str, number: u64) -> Result<Block, LedgerError> {
        if *self.fail_at.lock() == Some(number) {
            return Err(LedgerError::Unreachable(format!("peer dropped fetching block {number}")));
        }
        self.blocks.lock().get(number as usize).cloned().ok_or_else(|| {
            LedgerError::BlockNotFound { channel: channel_id.into(), number }
        })
    }

    async fn invoke(
        &self,
        _channel_id: &str,
        _chaincode_id: &str,
        _method: &str,
        _args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        Ok(vec![])
    }

    async fn query(
        &self,
        _channel_id: &str,
        _chaincode_id: &str,
        _method: &str,
        _args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        Ok(vec![])
    }

    async fn transaction(
        &self,
        _channel_id: &str,
        tx_id: &str,
    ) -> Result<TransactionInfo, LedgerError> {
        Err(LedgerError::TransactionNotFound { tx_id: tx_id.into() })
    }

    async fn contracts(&self, _channel_id: &str) -> Result<Vec<ContractInfo>, LedgerError> {
        Ok(vec![])
    }

    async fn contract_metadata(
        &self,
        _channel_id: &str,
        _chaincode_id: &str,
    ) -> Result<serde_json::Value, LedgerError> {
        Ok(serde_json::Value::Null)
    }
}

/// Broker that records every publish.
#[derive(Default)]
pub struct RecordingBroker {
    pub published: Mutex<Vec<(String, Vec<u8>)>>,
    pub fail: AtomicBool,
}

impl RecordingBroker {
    pub fn bodies(&self) -> Vec<serde_json::Value> {
        self.published
            .lock()
            .iter()
            .map(|(_, b)| serde_json::from_slice(b).unwrap())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.published.lock().len()
    }
}

#[async_trait]
impl BrokerClient for RecordingBroker {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn publish(&self, topic: &str, body: &[u8]) -> Result<(), BrokerError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BrokerError::Publish { topic: topic.into(), reason: "refused".into() });
        }
        self.published.lock().push((topic.to_string(), body.to_vec()));
        Ok(())
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}
