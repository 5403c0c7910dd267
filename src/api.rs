//! Request-layer facade over the pool and the chains

use crate::core::{Block, ChainValidator, NodeId, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::ChainSource;
use crate::storage::LedgerStore;
use log::{debug, info, warn};
use std::sync::Arc;

#[derive(Clone)]
pub struct LedgerApi {
    store: LedgerStore,
    source: Arc<dyn ChainSource>,
    validator: ChainValidator,
}

impl LedgerApi {
    pub fn new(store: LedgerStore, source: Arc<dyn ChainSource>, difficulty: usize) -> LedgerApi {
        LedgerApi {
            store,
            source,
            validator: ChainValidator::new(difficulty),
        }
    }

    /// Add a signed transaction to the pool.
    ///
    /// Resubmitting an identity that is already pooled succeeds and leaves
    /// the pooled transaction unchanged.
    pub fn submit_transaction(&self, tx: &Transaction) -> Result<()> {
        if !tx.verify_signature() {
            return Err(BlockchainError::Transaction(format!(
                "Signature check failed for transaction {}",
                tx.get_id()
            )));
        }
        if self.store.put_transaction(tx)? {
            info!("Accepted transaction {} ({} -> {})", tx.get_id(), tx.get_amount(), tx.get_recipient());
        } else {
            debug!("Ignoring duplicate transaction {}", tx.get_id());
        }
        Ok(())
    }

    pub fn get_local_chain(&self, node_id: &NodeId) -> Result<Vec<Block>> {
        self.store.load_chain(node_id)
    }

    /// The longest valid chain among the chains stored locally and the
    /// chains the source knows. Empty if no chain validates.
    pub fn get_consensus_chain(&self) -> Result<Vec<Block>> {
        let local = self.longest_valid(&self.store)?.unwrap_or_default();
        let remote = match self.longest_valid(self.source.as_ref()) {
            Ok(remote) => remote.unwrap_or_default(),
            Err(e) => {
                warn!("Could not query peer chains: {e}");
                Vec::new()
            }
        };
        Ok(if remote.len() > local.len() { remote } else { local })
    }

    fn longest_valid(&self, source: &dyn ChainSource) -> Result<Option<Vec<Block>>> {
        let mut heights = source.chain_heights()?;
        heights.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        for (node_id, _) in heights {
            let chain = match source.fetch_chain(&node_id) {
                Ok(chain) => chain,
                Err(e) => {
                    warn!("Could not fetch chain of {node_id}: {e}");
                    continue;
                }
            };
            match self.validator.validate(&chain) {
                Ok(()) => return Ok(Some(chain)),
                Err(e) => warn!("Skipping chain of {node_id}: {e}"),
            }
        }
        Ok(None)
    }
}
