use crate::core::{Block, Digest, NodeId, Transaction, TxId};
use crate::error::Result;
use crate::storage::LedgerStore;
use log::info;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Everything one node knows: its chain, its tip and its work queue.
#[derive(Debug)]
pub struct NodeState {
    node_id: NodeId,
    previous_hash: Digest,
    chain: Vec<Block>,
    // Blocks [0, persisted_len) are known to be in the store
    persisted_len: usize,
    // A chain rewrite failed partway; stored slots may belong to another chain
    store_diverged: bool,
    confirmed_tx_ids: HashSet<TxId>,
    seen_tx_ids: HashSet<TxId>,
    pending_queue: BTreeMap<TxId, Transaction>,
}

impl NodeState {
    pub fn new(node_id: NodeId) -> NodeState {
        NodeState {
            node_id,
            previous_hash: Digest::GENESIS,
            chain: Vec::new(),
            persisted_len: 0,
            store_diverged: false,
            confirmed_tx_ids: HashSet::new(),
            seen_tx_ids: HashSet::new(),
            pending_queue: BTreeMap::new(),
        }
    }

    /// Rebuild a node from what it persisted in a previous run
    pub fn recover(node_id: NodeId, store: &LedgerStore) -> Result<NodeState> {
        let mut state = NodeState::new(node_id);
        let chain = store.load_chain(&state.node_id)?;
        let pending = store.load_pending(&state.node_id)?;

        state.persisted_len = chain.len();
        state.install_chain(chain);
        for tx in pending {
            if state.confirmed_tx_ids.contains(tx.get_id()) {
                continue;
            }
            state.seen_tx_ids.insert(tx.get_id().to_string());
            state.pending_queue.insert(tx.get_id().to_string(), tx);
        }

        info!(
            "Recovered node {} with {} blocks and {} pending transactions",
            state.node_id,
            state.chain.len(),
            state.pending_queue.len()
        );
        Ok(state)
    }

    fn install_chain(&mut self, chain: Vec<Block>) {
        self.previous_hash = chain
            .last()
            .map(|block| *block.get_hash())
            .unwrap_or(Digest::GENESIS);
        self.confirmed_tx_ids = chain
            .iter()
            .flat_map(|block| block.transaction_ids().cloned())
            .collect();
        self.seen_tx_ids.extend(self.confirmed_tx_ids.iter().cloned());
        self.chain = chain;
    }

    pub fn get_node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn get_previous_hash(&self) -> &Digest {
        &self.previous_hash
    }

    pub fn get_chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending_queue.len()
    }

    pub fn pending_ids(&self) -> Vec<TxId> {
        self.pending_queue.keys().cloned().collect()
    }

    pub fn has_seen(&self, txid: &str) -> bool {
        self.seen_tx_ids.contains(txid)
    }

    pub fn is_confirmed(&self, txid: &str) -> bool {
        self.confirmed_tx_ids.contains(txid)
    }

    pub(crate) fn mark_seen(&mut self, txid: &str) -> bool {
        self.seen_tx_ids.insert(txid.to_string())
    }

    pub(crate) fn enqueue(&mut self, tx: Transaction) {
        self.pending_queue.insert(tx.get_id().to_string(), tx);
    }

    /// Remove and return up to `count` transactions, oldest first
    pub(crate) fn take_oldest(&mut self, count: usize) -> Vec<Transaction> {
        let mut taken = Vec::with_capacity(count);
        while taken.len() < count {
            match self.pending_queue.pop_first() {
                Some((_, tx)) => taken.push(tx),
                None => break,
            }
        }
        taken
    }

    /// Append a freshly mined block if it still extends the tip
    pub(crate) fn append(&mut self, block: Block) -> bool {
        if *block.get_previous_hash() != self.previous_hash {
            return false;
        }
        self.previous_hash = *block.get_hash();
        self.confirmed_tx_ids
            .extend(block.transaction_ids().cloned());
        self.chain.push(block);
        true
    }

    pub(crate) fn unpersisted(&self) -> impl Iterator<Item = (usize, &Block)> + '_ {
        self.chain.iter().enumerate().skip(self.persisted_len)
    }

    pub(crate) fn mark_persisted(&mut self, len: usize) {
        self.persisted_len = len.min(self.chain.len());
    }

    pub fn is_store_diverged(&self) -> bool {
        self.store_diverged
    }

    /// Forget what the store holds; the whole chain gets rewritten next.
    pub(crate) fn mark_store_diverged(&mut self) {
        self.store_diverged = true;
        self.persisted_len = 0;
    }

    pub(crate) fn mark_rewritten(&mut self) {
        self.store_diverged = false;
        self.persisted_len = self.chain.len();
    }

    /// Swap in an adopted chain. Returns the pending transactions that
    /// the adopted chain already confirms; they leave the queue.
    pub(crate) fn adopt_chain(&mut self, chain: Vec<Block>) -> Vec<TxId> {
        self.install_chain(chain);
        self.mark_rewritten();

        let confirmed: Vec<TxId> = self
            .pending_queue
            .keys()
            .filter(|txid| self.confirmed_tx_ids.contains(*txid))
            .cloned()
            .collect();
        for txid in &confirmed {
            self.pending_queue.remove(txid);
        }
        confirmed
    }
}

/// `NodeState` behind the single lock both node loops share.
#[derive(Clone, Debug)]
pub struct SharedState(Arc<Mutex<NodeState>>);

impl SharedState {
    pub fn new(state: NodeState) -> SharedState {
        SharedState(Arc::new(Mutex::new(state)))
    }

    /// Lock the state, ignoring poisoning.
    pub fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn chain_snapshot(&self) -> Vec<Block> {
        self.lock().get_chain().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::{mine_chain, signed_transaction_at};

    #[test]
    fn test_take_oldest_is_timestamp_ordered() {
        let mut state = NodeState::new(NodeId::new("a"));
        for ts in ["00000000000000000003", "00000000000000000001", "00000000000000000002"] {
            state.enqueue(signed_transaction_at(ts, "bob", 1));
        }
        let taken = state.take_oldest(2);
        let ids: Vec<&str> = taken.iter().map(|tx| tx.get_id()).collect();
        assert_eq!(ids, vec!["00000000000000000001", "00000000000000000002"]);
        assert_eq!(state.pending_len(), 1);
    }

    #[test]
    fn test_append_rejects_block_off_the_tip() {
        let mut state = NodeState::new(NodeId::new("a"));
        let chain = mine_chain(Digest::GENESIS, 2, 1, "a");

        assert!(!state.append(chain[1].clone()));
        assert!(state.append(chain[0].clone()));
        assert!(state.append(chain[1].clone()));
        assert_eq!(state.get_previous_hash(), chain[1].get_hash());
        assert_eq!(state.chain_len(), 2);
    }

    #[test]
    fn test_adopt_chain_reseeds_and_purges() {
        let mut state = NodeState::new(NodeId::new("a"));
        let chain = mine_chain(Digest::GENESIS, 2, 1, "b");
        let confirmed_id = chain[0].transaction_ids().next().unwrap().clone();
        let confirmed_tx = chain[0].get_transactions()[&confirmed_id].clone();
        let unrelated = signed_transaction_at("99999999999999999999", "zed", 1);

        state.mark_seen(&confirmed_id);
        state.enqueue(confirmed_tx);
        state.mark_seen(unrelated.get_id());
        state.enqueue(unrelated.clone());

        let purged = state.adopt_chain(chain.clone());
        assert_eq!(purged, vec![confirmed_id.clone()]);
        assert_eq!(state.pending_ids(), vec![unrelated.get_id().to_string()]);
        assert_eq!(state.get_previous_hash(), chain[1].get_hash());
        for block in &chain {
            for txid in block.transaction_ids() {
                assert!(state.has_seen(txid));
                assert!(state.is_confirmed(txid));
            }
        }
    }

    #[test]
    fn test_recover_replays_chain_and_queue() {
        let store = LedgerStore::in_memory();
        let node = NodeId::new("a");
        let chain = mine_chain(Digest::GENESIS, 2, 1, "a");
        let pending = signed_transaction_at("99999999999999999990", "yan", 2);
        store.replace_chain(&node, &chain).unwrap();
        store.enqueue_pending(&node, &pending).unwrap();

        let state = NodeState::recover(node, &store).unwrap();
        assert_eq!(state.get_chain(), chain.as_slice());
        assert_eq!(state.get_previous_hash(), chain[1].get_hash());
        assert_eq!(state.pending_ids(), vec![pending.get_id().to_string()]);
        assert!(state.has_seen(pending.get_id()));
        assert_eq!(state.unpersisted().count(), 0);
    }

    #[test]
    fn test_shared_state_survives_poisoning() {
        let shared = SharedState::new(NodeState::new(NodeId::new("a")));
        let clone = shared.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock();
            panic!("poison the lock");
        })
        .join();
        assert_eq!(shared.lock().chain_len(), 0);
    }
}
