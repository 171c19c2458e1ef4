//! In-memory ledger.
//!
//! Keeps every channel's blocks in RAM and pushes chaincode events to live
//! registrations as blocks are committed. Each channel starts with an empty
//! genesis block, so a fresh channel has height 1.
//!
//! Deployed chaincodes understand a small key/value vocabulary:
//!
//! | method   | args             | kind   |
//! |----------|------------------|--------|
//! | `put`    | `key, value`     | invoke |
//! | `delete` | `key`            | invoke |
//! | `emit`   | `event, payload` | invoke |
//! | `get`    | `key`            | query  |

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use chainrelay_core::ledger::{LedgerClient, LiveEvents, Registration};
use chainrelay_core::types::{
    decode_transaction, Block, BlockHeader, ChaincodeAction, ChaincodeEvent, ContractInfo,
    Transaction, TransactionInfo, TxValidationCode,
};
use chainrelay_core::{LedgerError, LedgerEvent, NetworkProfile};

/// Live channel capacity used when none is given.
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Default)]
struct Contract {
    info: ContractInfo,
    state: BTreeMap<String, String>,
}

#[derive(Default)]
struct Channel {
    blocks: Vec<Block>,
    contracts: BTreeMap<String, Contract>,
}

struct Listener {
    registration: Registration,
    sender: mpsc::Sender<LedgerEvent>,
}

/// A self-contained ledger network.
pub struct MemoryLedger {
    network_id: String,
    capacity: usize,
    channels: RwLock<HashMap<String, Channel>>,
    listeners: Mutex<Vec<Listener>>,
    next_registration: AtomicU64,
    next_tx: AtomicU64,
}

fn sha_hex(parts: &[&[u8]]) -> String {
    let mut h = Sha256::new();
    for p in parts {
        h.update(p);
    }
    hex::encode(h.finalize())
}

fn header_hash(header: &BlockHeader) -> String {
    sha_hex(&[
        &header.number.to_be_bytes(),
        header.previous_hash.as_bytes(),
        header.data_hash.as_bytes(),
    ])
}

impl MemoryLedger {
    pub fn new(network_id: impl Into<String>, channels: &[&str]) -> Self {
        Self::with_capacity(network_id, channels, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(network_id: impl Into<String>, channels: &[&str], capacity: usize) -> Self {
        let ledger = Self {
            network_id: network_id.into(),
            capacity: capacity.max(1),
            channels: RwLock::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            next_registration: AtomicU64::new(1),
            next_tx: AtomicU64::new(1),
        };
        for ch in channels {
            ledger.create_channel(ch);
        }
        ledger
    }

    /// A ledger with the profile's channels, named after the profile.
    pub fn from_profile(profile: &NetworkProfile, capacity: usize) -> Self {
        let name = profile.name.clone().unwrap_or_else(|| profile.organization.clone());
        let channels: Vec<&str> = profile.channels.iter().map(String::as_str).collect();
        Self::with_capacity(name, &channels, capacity)
    }

    /// Create a channel with its genesis block. No-op if it exists.
    pub fn create_channel(&self, channel_id: &str) {
        let mut channels = self.channels.write();
        if channels.contains_key(channel_id) {
            return;
        }
        let header = BlockHeader { number: 0, previous_hash: String::new(), data_hash: sha_hex(&[]) };
        channels.insert(
            channel_id.to_string(),
            Channel {
                blocks: vec![Block { header, channel_id: channel_id.to_string(), transactions: vec![] }],
                contracts: BTreeMap::new(),
            },
        );
    }

    /// Commit a chaincode definition. Redeploying bumps the sequence.
    pub fn deploy(&self, channel_id: &str, name: &str, version: &str) -> Result<(), LedgerError> {
        let mut channels = self.channels.write();
        let channel = channels
            .get_mut(channel_id)
            .ok_or_else(|| LedgerError::UnknownChannel { channel: channel_id.into() })?;
        let contract = channel.contracts.entry(name.to_string()).or_default();
        contract.info = ContractInfo {
            name: name.to_string(),
            version: version.to_string(),
            sequence: contract.info.sequence + 1,
        };
        Ok(())
    }

    pub fn next_tx_id(&self) -> String {
        format!("{:064x}", self.next_tx.fetch_add(1, Ordering::Relaxed))
    }

    /// Append a block holding `transactions` and push its events to listeners.
    /// Returns the new block's number.
    pub fn commit(&self, channel_id: &str, transactions: Vec<Transaction>) -> Result<u64, LedgerError> {
        let block = {
            let mut channels = self.channels.write();
            let channel = channels
                .get_mut(channel_id)
                .ok_or_else(|| LedgerError::UnknownChannel { channel: channel_id.into() })?;
            let prev = channel
                .blocks
                .last()
                .map(|b| header_hash(&b.header))
                .unwrap_or_default();
            let data = serde_json::to_vec(&transactions).map_err(|e| LedgerError::Other(e.to_string()))?;
            let block = Block {
                header: BlockHeader {
                    number: channel.blocks.len() as u64,
                    previous_hash: prev,
                    data_hash: sha_hex(&[&data]),
                },
                channel_id: channel_id.to_string(),
                transactions,
            };
            channel.blocks.push(block.clone());
            // Still under the channel lock so listeners see blocks in commit order.
            self.notify(&block);
            block
        };
        Ok(block.number())
    }

    /// Commit a block with one transaction that sets a single chaincode event.
    /// Returns `(block_number, tx_id)`.
    pub fn emit_event(
        &self,
        channel_id: &str,
        chaincode_id: &str,
        event_name: &str,
        payload: &[u8],
    ) -> Result<(u64, String), LedgerError> {
        let tx_id = self.next_tx_id();
        let tx = event_transaction(&tx_id, chaincode_id, event_name, payload)?;
        let number = self.commit(channel_id, vec![tx])?;
        Ok((number, tx_id))
    }

    /// Commit `n` blocks without transactions.
    pub fn append_empty_blocks(&self, channel_id: &str, n: u64) -> Result<u64, LedgerError> {
        let mut last = 0;
        for _ in 0..n {
            last = self.commit(channel_id, vec![])?;
        }
        Ok(last)
    }

    /// Number of live registrations.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn notify(&self, block: &Block) {
        let mut events = Vec::new();
        for tx in &block.transactions {
            match decode_transaction(tx, block.number(), &block.channel_id) {
                Ok(evs) => events.extend(evs),
                Err(e) => tracing::warn!(block = block.number(), error = %e, "skipping undecodable events"),
            }
        }
        if events.is_empty() {
            return;
        }

        let mut listeners = self.listeners.lock();
        listeners.retain(|l| {
            let reg = &l.registration;
            for ev in events.iter().filter(|ev| {
                ev.channel_id == reg.channel_id
                    && ev.chaincode_id == reg.chaincode_id
                    && ev.event_name == reg.event_name
            }) {
                match l.sender.try_send(ev.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(registration = reg.id, block = ev.block_number, "live channel full, event dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => return false,
                }
            }
            true
        });
    }

    fn with_channel<T>(
        &self,
        channel_id: &str,
        f: impl FnOnce(&Channel) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let channels = self.channels.read();
        let channel = channels
            .get(channel_id)
            .ok_or_else(|| LedgerError::UnknownChannel { channel: channel_id.into() })?;
        f(channel)
    }

    fn require_contract(channel: &Channel, chaincode_id: &str) -> Result<(), LedgerError> {
        if channel.contracts.contains_key(chaincode_id) {
            Ok(())
        } else {
            Err(LedgerError::Chaincode {
                chaincode: chaincode_id.into(),
                reason: "chaincode not deployed".into(),
            })
        }
    }
}

/// A valid transaction with one action carrying `event_name`.
pub fn event_transaction(
    tx_id: &str,
    chaincode_id: &str,
    event_name: &str,
    payload: &[u8],
) -> Result<Transaction, LedgerError> {
    let event = ChaincodeEvent {
        chaincode_id: chaincode_id.to_string(),
        tx_id: tx_id.to_string(),
        event_name: event_name.to_string(),
        payload: payload.to_vec(),
    };
    let bytes = event.encode().map_err(|e| LedgerError::Other(e.to_string()))?;
    Ok(Transaction {
        tx_id: tx_id.to_string(),
        validation: TxValidationCode::Valid,
        actions: vec![ChaincodeAction { chaincode_id: chaincode_id.to_string(), events: Some(bytes) }],
    })
}

fn arg<'a>(chaincode_id: &str, args: &'a [String], idx: usize, name: &str) -> Result<&'a str, LedgerError> {
    args.get(idx).map(String::as_str).ok_or_else(|| LedgerError::Chaincode {
        chaincode: chaincode_id.into(),
        reason: format!("missing argument '{name}'"),
    })
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    fn network_id(&self) -> &str {
        &self.network_id
    }

    async fn channels(&self) -> Result<Vec<String>, LedgerError> {
        let mut names: Vec<String> = self.channels.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn register_event(
        &self,
        channel_id: &str,
        chaincode_id: &str,
        event_name: &str,
    ) -> Result<(Registration, LiveEvents), LedgerError> {
        if !self.channels.read().contains_key(channel_id) {
            return Err(LedgerError::UnknownChannel { channel: channel_id.into() });
        }
        let registration = Registration {
            id: self.next_registration.fetch_add(1, Ordering::Relaxed),
            channel_id: channel_id.into(),
            chaincode_id: chaincode_id.into(),
            event_name: event_name.into(),
        };
        let (sender, rx) = mpsc::channel(self.capacity);
        self.listeners.lock().push(Listener { registration: registration.clone(), sender });
        tracing::debug!(registration = registration.id, channel = channel_id, chaincode = chaincode_id, event = event_name, "registered");
        Ok((registration, rx))
    }

    async fn unregister(&self, registration: &Registration) -> Result<(), LedgerError> {
        self.listeners.lock().retain(|l| l.registration.id != registration.id);
        Ok(())
    }

    async fn ledger_height(&self, channel_id: &str) -> Result<u64, LedgerError> {
        self.with_channel(channel_id, |ch| Ok(ch.blocks.len() as u64))
    }

    async fn block(&self, channel_id: &str, number: u64) -> Result<Block, LedgerError> {
        self.with_channel(channel_id, |ch| {
            ch.blocks.get(number as usize).cloned().ok_or_else(|| LedgerError::BlockNotFound {
                channel: channel_id.into(),
                number,
            })
        })
    }

    async fn invoke(
        &self,
        channel_id: &str,
        chaincode_id: &str,
        method: &str,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        let tx_id = self.next_tx_id();
        let tx = {
            let mut channels = self.channels.write();
            let channel = channels
                .get_mut(channel_id)
                .ok_or_else(|| LedgerError::UnknownChannel { channel: channel_id.into() })?;
            Self::require_contract(channel, chaincode_id)?;
            let contract = channel
                .contracts
                .get_mut(chaincode_id)
                .ok_or_else(|| LedgerError::Other("contract vanished".into()))?;
            match method {
                "put" => {
                    let key = arg(chaincode_id, args, 0, "key")?;
                    let value = arg(chaincode_id, args, 1, "value")?;
                    contract.state.insert(key.to_string(), value.to_string());
                    Transaction {
                        tx_id: tx_id.clone(),
                        validation: TxValidationCode::Valid,
                        actions: vec![ChaincodeAction { chaincode_id: chaincode_id.into(), events: None }],
                    }
                }
                "delete" => {
                    let key = arg(chaincode_id, args, 0, "key")?;
                    contract.state.remove(key);
                    Transaction {
                        tx_id: tx_id.clone(),
                        validation: TxValidationCode::Valid,
                        actions: vec![ChaincodeAction { chaincode_id: chaincode_id.into(), events: None }],
                    }
                }
                "emit" => {
                    let event = arg(chaincode_id, args, 0, "event")?;
                    let payload = args.get(1).map(String::as_str).unwrap_or_default();
                    event_transaction(&tx_id, chaincode_id, event, payload.as_bytes())?
                }
                other => {
                    return Err(LedgerError::Chaincode {
                        chaincode: chaincode_id.into(),
                        reason: format!("unknown function '{other}'"),
                    })
                }
            }
        };
        self.commit(channel_id, vec![tx])?;
        Ok(tx_id.into_bytes())
    }

    async fn query(
        &self,
        channel_id: &str,
        chaincode_id: &str,
        method: &str,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        self.with_channel(channel_id, |ch| {
            Self::require_contract(ch, chaincode_id)?;
            let contract = &ch.contracts[chaincode_id];
            match method {
                "get" => {
                    let key = arg(chaincode_id, args, 0, "key")?;
                    contract.state.get(key).map(|v| v.clone().into_bytes()).ok_or_else(|| {
                        LedgerError::Chaincode {
                            chaincode: chaincode_id.into(),
                            reason: format!("key '{key}' not found"),
                        }
                    })
                }
                other => Err(LedgerError::Chaincode {
                    chaincode: chaincode_id.into(),
                    reason: format!("unknown function '{other}'"),
                }),
            }
        })
    }

    async fn transaction(&self, channel_id: &str, tx_id: &str) -> Result<TransactionInfo, LedgerError> {
        self.with_channel(channel_id, |ch| {
            ch.blocks
                .iter()
                .find_map(|b| {
                    b.transactions.iter().find(|t| t.tx_id == tx_id).map(|t| TransactionInfo {
                        block_number: b.number(),
                        channel_id: channel_id.to_string(),
                        transaction: t.clone(),
                    })
                })
                .ok_or_else(|| LedgerError::TransactionNotFound { tx_id: tx_id.into() })
        })
    }

    async fn contracts(&self, channel_id: &str) -> Result<Vec<ContractInfo>, LedgerError> {
        self.with_channel(channel_id, |ch| Ok(ch.contracts.values().map(|c| c.info.clone()).collect()))
    }

    async fn contract_metadata(&self, channel_id: &str, chaincode_id: &str) -> Result<serde_json::Value, LedgerError> {
        self.with_channel(channel_id, |ch| {
            Self::require_contract(ch, chaincode_id)?;
            let c = &ch.contracts[chaincode_id];
            Ok(serde_json::json!({
                "name": c.info.name,
                "version": c.info.version,
                "sequence": c.info.sequence,
                "transactions": ["put", "delete", "emit"],
                "queries": ["get"],
                "keys": c.state.len(),
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> MemoryLedger {
        let l = MemoryLedger::new("net-1", &["mychannel"]);
        l.deploy("mychannel", "escrow", "1.0").unwrap();
        l
    }

    #[tokio::test]
    async fn fresh_channel_has_genesis_block() {
        let l = ledger();
        assert_eq!(l.ledger_height("mychannel").await.unwrap(), 1);
        let genesis = l.block("mychannel", 0).await.unwrap();
        assert!(genesis.transactions.is_empty());
        assert!(matches!(
            l.block("mychannel", 1).await,
            Err(LedgerError::BlockNotFound { number: 1, .. })
        ));
        assert!(matches!(l.ledger_height("nope").await, Err(LedgerError::UnknownChannel { .. })));
    }

    #[tokio::test]
    async fn blocks_chain_by_hash() {
        let l = ledger();
        l.append_empty_blocks("mychannel", 2).unwrap();
        let b1 = l.block("mychannel", 1).await.unwrap();
        let b2 = l.block("mychannel", 2).await.unwrap();
        assert_eq!(b2.header.previous_hash, header_hash(&b1.header));
    }

    #[tokio::test]
    async fn registrations_receive_matching_events_only() {
        let l = ledger();
        let (_reg, mut rx) = l.register_event("mychannel", "escrow", "Created").await.unwrap();
        l.emit_event("mychannel", "escrow", "Released", b"{}").unwrap();
        let (n, tx_id) = l.emit_event("mychannel", "escrow", "Created", br#"{"id":1}"#).unwrap();

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.block_number, n);
        assert_eq!(ev.tx_id, tx_id);
        assert_eq!(ev.event_name, "Created");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_closes_stream() {
        let l = ledger();
        let (reg, mut rx) = l.register_event("mychannel", "escrow", "Created").await.unwrap();
        l.unregister(&reg).await.unwrap();
        assert_eq!(l.listener_count(), 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let l = MemoryLedger::with_capacity("n", &["ch"], 1);
        let (_reg, mut rx) = l.register_event("ch", "cc", "E").await.unwrap();
        l.emit_event("ch", "cc", "E", b"1").unwrap();
        l.emit_event("ch", "cc", "E", b"2").unwrap();
        assert_eq!(rx.recv().await.unwrap().payload, b"1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn kv_invoke_and_query() {
        let l = ledger();
        let args = vec!["a".to_string(), "100".to_string()];
        let tx_id = l.invoke("mychannel", "escrow", "put", &args).await.unwrap();
        let got = l.query("mychannel", "escrow", "get", &["a".to_string()]).await.unwrap();
        assert_eq!(got, b"100");

        let info = l.transaction("mychannel", &String::from_utf8(tx_id).unwrap()).await.unwrap();
        assert_eq!(info.block_number, 1);

        let err = l.invoke("mychannel", "missing", "put", &args).await.unwrap_err();
        assert!(matches!(err, LedgerError::Chaincode { .. }));
        let err = l.query("mychannel", "escrow", "nope", &[]).await.unwrap_err();
        assert!(err.to_string().contains("unknown function"));
    }

    #[tokio::test]
    async fn contract_listing_and_metadata() {
        let l = ledger();
        l.deploy("mychannel", "escrow", "1.1").unwrap();
        let list = l.contracts("mychannel").await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].version, "1.1");
        assert_eq!(list[0].sequence, 2);
        let meta = l.contract_metadata("mychannel", "escrow").await.unwrap();
        assert_eq!(meta["name"], "escrow");
    }
}
