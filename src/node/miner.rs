use crate::core::{Block, CancelToken, ProofOfWork, Transaction, UnsealedBlock};
use crate::error::Result;
use crate::node::{NodeState, SharedState};
use crate::storage::LedgerStore;
use log::{info, warn};

/// Turns a node's pending queue into sealed blocks on its own tip.
#[derive(Debug, Clone, Copy)]
pub struct Miner {
    pow: ProofOfWork,
    batch_size: usize,
}

impl Miner {
    pub fn new(difficulty: usize, batch_size: usize) -> Miner {
        Miner {
            pow: ProofOfWork::new(difficulty),
            batch_size: batch_size.max(1),
        }
    }

    pub fn get_difficulty(&self) -> usize {
        self.pow.get_difficulty()
    }

    pub fn get_batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run one mining attempt.
    ///
    /// Selects the oldest pending transactions, searches for a nonce with
    /// the lock released, then appends and persists the block if the tip
    /// did not move meanwhile. Returns `None` when there was nothing to
    /// mine or the attempt was cancelled or went stale; in the latter
    /// cases the selected transactions go back to the queue unless the
    /// chain now confirms them.
    pub fn mine_once(
        &self,
        state: &SharedState,
        store: &LedgerStore,
        cancel: &CancelToken,
    ) -> Result<Option<Block>> {
        // Taken before selection so any chain swap after this point cancels the search
        let ticket = cancel.ticket();

        let (node_id, unsealed) = {
            let mut guard = state.lock();
            let selected = guard.take_oldest(self.batch_size);
            if selected.is_empty() {
                return Ok(None);
            }
            let node_id = guard.get_node_id().clone();
            for tx in &selected {
                if let Err(e) = store.remove_pending(&node_id, tx.get_id()) {
                    warn!("Node {node_id} could not dequeue {} from store: {e}", tx.get_id());
                }
            }
            (node_id, UnsealedBlock::new(*guard.get_previous_hash(), selected))
        };

        let Some((nonce, hash)) = self.pow.run(&unsealed, &ticket) else {
            info!("Node {node_id} abandoned a block on {}", unsealed.get_previous_hash());
            let selected: Vec<Transaction> = unsealed.get_transactions().values().cloned().collect();
            requeue(&mut state.lock(), store, selected);
            return Ok(None);
        };

        commit_block(state, store, unsealed.seal(nonce, hash, node_id))
    }
}

/// Append a sealed block if it still extends the tip and persist it.
/// A block mined on a stale tip is dropped and its transactions go back
/// to the queue unless the chain confirms them.
fn commit_block(state: &SharedState, store: &LedgerStore, block: Block) -> Result<Option<Block>> {
    let mut guard = state.lock();
    let node_id = guard.get_node_id().clone();
    if !guard.append(block.clone()) {
        info!("Node {node_id} discarded a stale block on {}", block.get_previous_hash());
        requeue(&mut guard, store, block.get_transactions().values().cloned().collect());
        return Ok(None);
    }
    info!(
        "Node {node_id} mined block {} ({} transactions, nonce {}) at height {}",
        block.get_hash(),
        block.get_transactions().len(),
        block.get_nonce(),
        guard.chain_len()
    );

    persist_chain(&mut guard, store)?;
    Ok(Some(block))
}

/// Write every block the store does not have yet, in index order.
///
/// After a failed rewrite the stored chain is replaced wholesale instead.
pub(crate) fn persist_chain(state: &mut NodeState, store: &LedgerStore) -> Result<()> {
    let node_id = state.get_node_id().clone();
    if state.is_store_diverged() {
        store.replace_chain(&node_id, state.get_chain())?;
        state.mark_rewritten();
        info!("Node {node_id} rewrote its stored chain ({} blocks)", state.chain_len());
        return Ok(());
    }

    let mut persisted = None;
    for (index, block) in state.unpersisted() {
        if !store.put_block_if_absent(&node_id, index, block)? {
            warn!("Node {node_id} already has a stored block at index {index}; keeping it");
        }
        persisted = Some(index + 1);
    }
    if let Some(len) = persisted {
        state.mark_persisted(len);
    }
    Ok(())
}

fn requeue(state: &mut NodeState, store: &LedgerStore, transactions: Vec<Transaction>) {
    let node_id = state.get_node_id().clone();
    for tx in transactions {
        if state.is_confirmed(tx.get_id()) {
            continue;
        }
        if let Err(e) = store.enqueue_pending(&node_id, &tx) {
            warn!("Node {node_id} could not requeue {} in store: {e}", tx.get_id());
        }
        state.enqueue(tx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChainValidator, NodeId};
    use crate::node::intake::poll_once;
    use crate::storage::MemoryStore;
    use crate::testnet::signed_transaction_at;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn setup(id: &str) -> (SharedState, LedgerStore) {
        (
            SharedState::new(NodeState::new(NodeId::new(id))),
            LedgerStore::in_memory(),
        )
    }

    fn submit(store: &LedgerStore, ts: &str) {
        store
            .put_transaction(&signed_transaction_at(ts, "bob", 1))
            .unwrap();
    }

    #[test]
    fn test_mine_once_with_empty_queue() {
        let (state, store) = setup("a");
        let miner = Miner::new(1, 1);
        assert!(miner
            .mine_once(&state, &store, &CancelToken::new())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_mine_once_extends_and_persists() {
        let (state, store) = setup("a");
        let miner = Miner::new(2, 1);
        let cancel = CancelToken::new();
        submit(&store, "00000000000000000002");
        submit(&store, "00000000000000000001");
        poll_once(&state, &store).unwrap();

        let first = miner.mine_once(&state, &store, &cancel).unwrap().unwrap();
        assert!(first.contains_transaction("00000000000000000001"));
        let second = miner.mine_once(&state, &store, &cancel).unwrap().unwrap();
        assert_eq!(second.get_previous_hash(), first.get_hash());

        let node = NodeId::new("a");
        let stored = store.load_chain(&node).unwrap();
        assert_eq!(stored, vec![first, second]);
        assert!(ChainValidator::new(2).is_valid(&stored));
        assert!(store.load_pending(&node).unwrap().is_empty());
        assert_eq!(state.lock().pending_len(), 0);
    }

    #[test]
    fn test_batch_size_bounds_block() {
        let (state, store) = setup("a");
        for ts in ["00000000000000000001", "00000000000000000002", "00000000000000000003"] {
            submit(&store, ts);
        }
        poll_once(&state, &store).unwrap();

        let block = Miner::new(1, 2)
            .mine_once(&state, &store, &CancelToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(block.get_transactions().len(), 2);
        assert_eq!(state.lock().pending_ids(), vec!["00000000000000000003".to_string()]);
    }

    #[test]
    fn test_cancelled_attempt_requeues() {
        let (state, store) = setup("a");
        let cancel = CancelToken::new();
        submit(&store, "00000000000000000001");
        poll_once(&state, &store).unwrap();

        // Unreachable difficulty keeps the search running until cancelled
        let miner = Miner::new(40, 1);
        let worker = {
            let (state, store, cancel) = (state.clone(), store.clone(), cancel.clone());
            thread::spawn(move || miner.mine_once(&state, &store, &cancel))
        };
        while state.lock().pending_len() > 0 {
            thread::sleep(Duration::from_millis(5));
        }
        cancel.cancel();

        assert!(worker.join().unwrap().unwrap().is_none());
        assert_eq!(state.lock().pending_ids(), vec!["00000000000000000001".to_string()]);
        assert_eq!(state.lock().chain_len(), 0);
        assert_eq!(store.load_pending(&NodeId::new("a")).unwrap().len(), 1);
    }

    #[test]
    fn test_block_on_moved_tip_is_discarded_and_requeued() {
        use crate::core::Digest;
        use crate::testnet::mine_chain;

        let (state, store) = setup("a");
        // mine_chain's first block confirms id ...01
        submit(&store, "00000000000000000001");
        submit(&store, "00000000000000000007");
        poll_once(&state, &store).unwrap();

        let selected = state.lock().take_oldest(2);
        let unsealed = UnsealedBlock::new(Digest::GENESIS, selected);
        let (nonce, hash) = ProofOfWork::new(1)
            .run(&unsealed, &CancelToken::new().ticket())
            .unwrap();
        let late = unsealed.seal(nonce, hash, NodeId::new("a"));

        let rival = mine_chain(Digest::GENESIS, 1, 1, "b");
        assert!(state.lock().append(rival[0].clone()));

        assert!(commit_block(&state, &store, late).unwrap().is_none());
        assert_eq!(state.chain_snapshot(), rival);
        assert_eq!(state.lock().pending_ids(), vec!["00000000000000000007".to_string()]);
        let stored: Vec<String> = store
            .load_pending(&NodeId::new("a"))
            .unwrap()
            .iter()
            .map(|tx| tx.get_id().to_string())
            .collect();
        assert!(stored.contains(&"00000000000000000007".to_string()));
    }

    #[test]
    fn test_persist_failure_is_retried() {
        let kv = Arc::new(MemoryStore::new());
        let store = LedgerStore::new(kv.clone());
        let state = SharedState::new(NodeState::new(NodeId::new("a")));
        let miner = Miner::new(1, 1);
        let cancel = CancelToken::new();
        submit(&store, "00000000000000000001");
        submit(&store, "00000000000000000002");
        poll_once(&state, &store).unwrap();

        kv.set_offline(true);
        assert!(miner.mine_once(&state, &store, &cancel).is_err());
        assert_eq!(state.lock().chain_len(), 1);
        kv.set_offline(false);

        miner.mine_once(&state, &store, &cancel).unwrap().unwrap();
        assert_eq!(store.load_chain(&NodeId::new("a")).unwrap(), state.chain_snapshot());
    }
}
