use crate::core::{Block, NodeId};
use crate::error::Result;
use crate::storage::LedgerStore;

/// Where a node learns about other nodes' chains.
///
/// On a shared store the source is the store itself; across processes it
/// is the gossip client talking to peer servers.
pub trait ChainSource: Send + Sync {
    /// Known chains and their heights
    fn chain_heights(&self) -> Result<Vec<(NodeId, usize)>>;

    fn fetch_chain(&self, node_id: &NodeId) -> Result<Vec<Block>>;
}

impl ChainSource for LedgerStore {
    fn chain_heights(&self) -> Result<Vec<(NodeId, usize)>> {
        Ok(LedgerStore::chain_heights(self)?.into_iter().collect())
    }

    fn fetch_chain(&self, node_id: &NodeId) -> Result<Vec<Block>> {
        self.load_chain(node_id)
    }
}
