//! Typed view of the ledger namespace
//!
//! Key layout, shared by every backend and by the gossip layer:
//!
//! - `transaction:{timestamp}`: submitted transaction pool
//! - `ledger-{node_id}:{timestamp}`: a node's pending queue
//! - `chain-{node_id}-{index}`: a node's sealed blocks
//! - `meta:node-id`: identity of the node owning a per-node store

use crate::core::{Block, NodeId, Transaction, TxId};
use crate::error::Result;
use crate::storage::{KvStore, MemoryStore};
use crate::utils::{deserialize, serialize};
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;

const TRANSACTION_PREFIX: &str = "transaction:";
const CHAIN_PREFIX: &str = "chain-";
const NODE_ID_KEY: &str = "meta:node-id";

fn transaction_key(txid: &str) -> String {
    format!("{TRANSACTION_PREFIX}{txid}")
}

fn ledger_prefix(node_id: &NodeId) -> String {
    format!("ledger-{node_id}:")
}

fn chain_key(node_id: &NodeId, index: usize) -> String {
    format!("{CHAIN_PREFIX}{node_id}-{index}")
}

// "chain-{node_id}-{index}" -> (node_id, index); node ids may contain '-'
fn parse_chain_key(key: &str) -> Option<(&str, usize)> {
    let rest = key.strip_prefix(CHAIN_PREFIX)?;
    let (node, index) = rest.rsplit_once('-')?;
    Some((node, index.parse().ok()?))
}

#[derive(Clone)]
pub struct LedgerStore {
    kv: Arc<dyn KvStore>,
}

impl LedgerStore {
    pub fn new(kv: Arc<dyn KvStore>) -> LedgerStore {
        LedgerStore { kv }
    }

    pub fn in_memory() -> LedgerStore {
        LedgerStore::new(Arc::new(MemoryStore::new()))
    }

    /// Add a transaction to the pool. Returns false if its identity was
    /// already present; the stored transaction is left untouched.
    pub fn put_transaction(&self, tx: &Transaction) -> Result<bool> {
        self.kv
            .set_if_absent(&transaction_key(tx.get_id()), &serialize(tx)?)
    }

    /// Pool identities in ascending (oldest first) order
    pub fn transaction_ids(&self) -> Result<Vec<TxId>> {
        Ok(self
            .kv
            .scan(TRANSACTION_PREFIX)?
            .into_iter()
            .filter_map(|key| key.strip_prefix(TRANSACTION_PREFIX).map(str::to_string))
            .collect())
    }

    pub fn get_transaction(&self, txid: &str) -> Result<Option<Transaction>> {
        match self.kv.get(&transaction_key(txid))? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn enqueue_pending(&self, node_id: &NodeId, tx: &Transaction) -> Result<()> {
        let key = format!("{}{}", ledger_prefix(node_id), tx.get_id());
        self.kv.set(&key, &serialize(tx)?)
    }

    pub fn remove_pending(&self, node_id: &NodeId, txid: &str) -> Result<()> {
        self.kv.delete(&format!("{}{txid}", ledger_prefix(node_id)))
    }

    pub fn load_pending(&self, node_id: &NodeId) -> Result<Vec<Transaction>> {
        let mut pending = Vec::new();
        for key in self.kv.scan(&ledger_prefix(node_id))? {
            if let Some(bytes) = self.kv.get(&key)? {
                pending.push(deserialize(&bytes)?);
            }
        }
        Ok(pending)
    }

    /// Persist a block at `index` unless that slot is already taken.
    pub fn put_block_if_absent(&self, node_id: &NodeId, index: usize, block: &Block) -> Result<bool> {
        self.kv
            .set_if_absent(&chain_key(node_id, index), &block.serialize()?)
    }

    pub fn load_chain(&self, node_id: &NodeId) -> Result<Vec<Block>> {
        let mut chain = Vec::new();
        while let Some(bytes) = self.kv.get(&chain_key(node_id, chain.len()))? {
            chain.push(Block::deserialize(&bytes)?);
        }
        Ok(chain)
    }

    fn chain_indices(&self, node_id: &NodeId) -> Result<Vec<usize>> {
        let prefix = format!("{CHAIN_PREFIX}{node_id}-");
        Ok(self
            .kv
            .scan(&prefix)?
            .iter()
            .filter_map(|key| parse_chain_key(key))
            .filter(|(node, _)| *node == node_id.as_str())
            .map(|(_, index)| index)
            .collect())
    }

    /// Overwrite a node's chain with `blocks`, dropping any longer tail.
    pub fn replace_chain(&self, node_id: &NodeId, blocks: &[Block]) -> Result<()> {
        for (index, block) in blocks.iter().enumerate() {
            self.kv.set(&chain_key(node_id, index), &block.serialize()?)?;
        }
        for index in self.chain_indices(node_id)? {
            if index >= blocks.len() {
                self.kv.delete(&chain_key(node_id, index))?;
            }
        }
        debug!("Persisted {} blocks for node {node_id}", blocks.len());
        Ok(())
    }

    /// Number of persisted blocks for every node with a chain
    pub fn chain_heights(&self) -> Result<BTreeMap<NodeId, usize>> {
        let mut heights = BTreeMap::new();
        for key in self.kv.scan(CHAIN_PREFIX)? {
            if let Some((node, _)) = parse_chain_key(&key) {
                *heights.entry(NodeId::from(node)).or_insert(0) += 1;
            }
        }
        Ok(heights)
    }

    pub fn load_or_create_node_id(&self) -> Result<NodeId> {
        if let Some(bytes) = self.kv.get(NODE_ID_KEY)? {
            return deserialize(&bytes);
        }
        let node_id = NodeId::random();
        if self.kv.set_if_absent(NODE_ID_KEY, &serialize(&node_id)?)? {
            return Ok(node_id);
        }
        // Lost a race with another opener; use whatever landed
        match self.kv.get(NODE_ID_KEY)? {
            Some(bytes) => deserialize(&bytes),
            None => Ok(node_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Digest;
    use crate::testnet::{mine_chain, signed_transaction_at};

    #[test]
    fn test_parse_chain_key_handles_dashed_ids() {
        assert_eq!(
            parse_chain_key("chain-6f1c-22ab-9-14"),
            Some(("6f1c-22ab-9", 14))
        );
        assert_eq!(parse_chain_key("chain-node-x"), None);
        assert_eq!(parse_chain_key("ledger-a:1"), None);
    }

    #[test]
    fn test_pool_is_idempotent_on_identity() {
        let store = LedgerStore::in_memory();
        let tx = signed_transaction_at("00000000000000000001", "alice", 5);
        let replay = signed_transaction_at("00000000000000000001", "mallory", 500);

        assert!(store.put_transaction(&tx).unwrap());
        assert!(!store.put_transaction(&replay).unwrap());
        assert_eq!(store.transaction_ids().unwrap(), vec![tx.get_id().to_string()]);
        assert_eq!(store.get_transaction(tx.get_id()).unwrap(), Some(tx));
    }

    #[test]
    fn test_pending_queues_are_per_node() {
        let store = LedgerStore::in_memory();
        let a = NodeId::new("a");
        let b = NodeId::new("b");
        let tx = signed_transaction_at("00000000000000000003", "carol", 1);

        store.enqueue_pending(&a, &tx).unwrap();
        assert_eq!(store.load_pending(&a).unwrap(), vec![tx.clone()]);
        assert!(store.load_pending(&b).unwrap().is_empty());

        store.remove_pending(&a, tx.get_id()).unwrap();
        assert!(store.load_pending(&a).unwrap().is_empty());
    }

    #[test]
    fn test_put_block_if_absent_guards_slot() {
        let store = LedgerStore::in_memory();
        let node = NodeId::new("a");
        let chain = mine_chain(Digest::GENESIS, 2, 1, "a");

        assert!(store.put_block_if_absent(&node, 0, &chain[0]).unwrap());
        assert!(!store.put_block_if_absent(&node, 0, &chain[1]).unwrap());
        assert_eq!(store.load_chain(&node).unwrap(), vec![chain[0].clone()]);
    }

    #[test]
    fn test_replace_chain_and_heights() {
        let store = LedgerStore::in_memory();
        let a = NodeId::new("node-a");
        let b = NodeId::new("node-a-b");
        let long = mine_chain(Digest::GENESIS, 3, 1, "node-a");
        let short = mine_chain(Digest::GENESIS, 1, 1, "node-a-b");

        store.replace_chain(&a, &long).unwrap();
        store.replace_chain(&b, &short).unwrap();
        assert_eq!(store.load_chain(&a).unwrap(), long);

        let heights = store.chain_heights().unwrap();
        assert_eq!(heights.get(&a), Some(&3));
        assert_eq!(heights.get(&b), Some(&1));

        store.replace_chain(&a, &short).unwrap();
        assert_eq!(store.load_chain(&a).unwrap(), short);
        assert_eq!(store.chain_heights().unwrap().get(&a), Some(&1));
    }

    #[test]
    fn test_node_id_is_stable() {
        let store = LedgerStore::in_memory();
        let first = store.load_or_create_node_id().unwrap();
        let second = store.load_or_create_node_id().unwrap();
        assert_eq!(first, second);
    }
}
