use crate::core::{CancelToken, ChainValidator, NodeId};
use crate::error::Result;
use crate::network::ChainSource;
use crate::node::miner::persist_chain;
use crate::node::SharedState;
use crate::storage::LedgerStore;
use log::{debug, info, warn};

/// Longest-valid-chain-wins reconciliation.
#[derive(Debug, Clone, Copy)]
pub struct ForkResolver {
    validator: ChainValidator,
}

impl ForkResolver {
    pub fn new(difficulty: usize) -> ForkResolver {
        ForkResolver {
            validator: ChainValidator::new(difficulty),
        }
    }

    /// Adopt the longest valid peer chain that beats the local one.
    ///
    /// Candidates are tried longest first and invalid ones are skipped.
    /// A store write that fails partway leaves the local chain in memory
    /// untouched and has it rewritten to the store on the next pass.
    /// Adoption replaces the local chain in memory and in the store,
    /// marks its transactions seen, drops them from the pending queue and
    /// cancels any mining in flight. Transactions only the discarded chain
    /// confirmed are not re-queued. Returns whether a chain was adopted.
    pub fn reconcile(
        &self,
        state: &SharedState,
        store: &LedgerStore,
        source: &dyn ChainSource,
        cancel: &CancelToken,
    ) -> Result<bool> {
        let (node_id, local_len) = {
            let mut guard = state.lock();
            // Catch the store up first so peers see this node's real chain
            persist_chain(&mut guard, store)?;
            (guard.get_node_id().clone(), guard.chain_len())
        };

        let mut candidates: Vec<(NodeId, usize)> = source
            .chain_heights()?
            .into_iter()
            .filter(|(peer, height)| *peer != node_id && *height > local_len)
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        for (peer, height) in candidates {
            let chain = match source.fetch_chain(&peer) {
                Ok(chain) => chain,
                Err(e) => {
                    warn!("Node {node_id} could not fetch chain of {peer}: {e}");
                    continue;
                }
            };
            if let Err(e) = self.validator.validate(&chain) {
                warn!("Node {node_id} rejected chain of {peer} (height {height}): {e}");
                continue;
            }

            let mut guard = state.lock();
            if chain.len() <= guard.chain_len() {
                debug!("Node {node_id} outgrew the chain of {peer} while validating it");
                continue;
            }

            if let Err(e) = store.replace_chain(&node_id, &chain) {
                guard.mark_store_diverged();
                return Err(e);
            }
            let replaced_len = guard.chain_len();
            let purged = guard.adopt_chain(chain);
            for txid in &purged {
                if let Err(e) = store.remove_pending(&node_id, txid) {
                    warn!("Node {node_id} could not drop confirmed {txid} from store: {e}");
                }
            }
            cancel.cancel();

            info!(
                "Node {node_id} adopted chain of {peer}: height {replaced_len} -> {}, {} pending confirmed",
                guard.chain_len(),
                purged.len()
            );
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Block, Digest};
    use crate::node::NodeState;
    use crate::testnet::{mine_chain, FlakyStore};
    use std::sync::Arc;

    const DIFFICULTY: usize = 1;

    fn node(store: &LedgerStore, id: &str, chain: &[Block]) -> SharedState {
        let node_id = NodeId::new(id);
        store.replace_chain(&node_id, chain).unwrap();
        SharedState::new(NodeState::recover(node_id, store).unwrap())
    }

    #[test]
    fn test_adopts_longer_valid_chain() {
        let store = LedgerStore::in_memory();
        let local = node(&store, "a", &mine_chain(Digest::GENESIS, 1, DIFFICULTY, "a"));
        let longer = mine_chain(Digest::GENESIS, 3, DIFFICULTY, "b");
        store.replace_chain(&NodeId::new("b"), &longer).unwrap();

        let cancel = CancelToken::new();
        let ticket = cancel.ticket();
        let adopted = ForkResolver::new(DIFFICULTY)
            .reconcile(&local, &store, &store, &cancel)
            .unwrap();

        assert!(adopted);
        assert!(ticket.is_cancelled());
        assert_eq!(local.chain_snapshot(), longer);
        assert_eq!(store.load_chain(&NodeId::new("a")).unwrap(), longer);
    }

    #[test]
    fn test_equal_or_shorter_chains_are_ignored() {
        let store = LedgerStore::in_memory();
        let mine = mine_chain(Digest::GENESIS, 2, DIFFICULTY, "a");
        let local = node(&store, "a", &mine);
        store
            .replace_chain(&NodeId::new("b"), &mine_chain(Digest::from_bytes([1; 32]), 2, DIFFICULTY, "b"))
            .unwrap();
        store
            .replace_chain(&NodeId::new("c"), &mine_chain(Digest::GENESIS, 1, DIFFICULTY, "c"))
            .unwrap();

        let adopted = ForkResolver::new(DIFFICULTY)
            .reconcile(&local, &store, &store, &CancelToken::new())
            .unwrap();
        assert!(!adopted);
        assert_eq!(local.chain_snapshot(), mine);
    }

    #[test]
    fn test_invalid_longest_falls_back_to_next_valid() {
        let store = LedgerStore::in_memory();
        let local = node(&store, "a", &[]);

        let mut forged = mine_chain(Digest::GENESIS, 4, DIFFICULTY, "evil");
        forged.swap(1, 2);
        store.replace_chain(&NodeId::new("evil"), &forged).unwrap();
        let honest = mine_chain(Digest::GENESIS, 2, DIFFICULTY, "b");
        store.replace_chain(&NodeId::new("b"), &honest).unwrap();

        assert!(ForkResolver::new(DIFFICULTY)
            .reconcile(&local, &store, &store, &CancelToken::new())
            .unwrap());
        assert_eq!(local.chain_snapshot(), honest);
    }

    #[test]
    fn test_only_invalid_candidates_leave_chain_untouched() {
        let store = LedgerStore::in_memory();
        let mine = mine_chain(Digest::GENESIS, 1, DIFFICULTY, "a");
        let local = node(&store, "a", &mine);

        let mut forged = mine_chain(Digest::GENESIS, 3, DIFFICULTY, "evil");
        forged.remove(1);
        forged.push(mine_chain(Digest::GENESIS, 1, DIFFICULTY, "x").remove(0));
        store.replace_chain(&NodeId::new("evil"), &forged).unwrap();

        assert!(!ForkResolver::new(DIFFICULTY)
            .reconcile(&local, &store, &store, &CancelToken::new())
            .unwrap());
        assert_eq!(local.chain_snapshot(), mine);
        assert_eq!(store.load_chain(&NodeId::new("a")).unwrap(), mine);
    }

    #[test]
    fn test_interrupted_adoption_is_repaired_next_pass() {
        let kv = Arc::new(FlakyStore::new());
        let store = LedgerStore::new(kv.clone());
        let mine = mine_chain(Digest::GENESIS, 2, DIFFICULTY, "a");
        let local = node(&store, "a", &mine);
        let peer = NodeId::new("b");
        store
            .replace_chain(&peer, &mine_chain(Digest::GENESIS, 4, DIFFICULTY, "b"))
            .unwrap();

        // One block of the peer chain lands before the store gives out
        kv.allow_writes(1);
        let resolver = ForkResolver::new(DIFFICULTY);
        assert!(resolver
            .reconcile(&local, &store, &store, &CancelToken::new())
            .is_err());
        assert_eq!(local.chain_snapshot(), mine);
        assert!(local.lock().is_store_diverged());
        assert!(!ChainValidator::new(DIFFICULTY).is_valid(&store.load_chain(&NodeId::new("a")).unwrap()));

        kv.heal();
        store.replace_chain(&peer, &[]).unwrap();
        assert!(!resolver
            .reconcile(&local, &store, &store, &CancelToken::new())
            .unwrap());
        assert!(!local.lock().is_store_diverged());
        assert_eq!(store.load_chain(&NodeId::new("a")).unwrap(), mine);
        let recovered = NodeState::recover(NodeId::new("a"), &store).unwrap();
        assert_eq!(recovered.get_chain(), mine.as_slice());
    }
}
