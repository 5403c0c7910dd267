//! In-process test network
//!
//! Several nodes sharing one in-memory store, the way separate node
//! processes would share a store server. Used by the `simulate` command
//! and by the tests.

#[cfg(test)]
mod fixtures;

#[cfg(test)]
pub use fixtures::{mine_chain, signed_transaction_at, FlakyStore};

use crate::api::LedgerApi;
use crate::config::Config;
use crate::core::{Block, ChainValidator, NodeId};
use crate::error::Result;
use crate::node::{Node, NodeHandle};
use crate::storage::{KvStore, LedgerStore, MemoryStore};
use log::{info, warn};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub struct LocalTestnet {
    store: LedgerStore,
    api: LedgerApi,
    nodes: Vec<Node>,
    difficulty: usize,
}

impl LocalTestnet {
    /// `node_count` fresh nodes over a new in-memory store
    pub fn new(node_count: usize, config: &Config) -> Result<LocalTestnet> {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let ids = (0..node_count).map(|_| NodeId::random()).collect();
        Self::with_store(kv, ids, config)
    }

    /// Nodes with the given identities over an existing store
    pub fn with_store(kv: Arc<dyn KvStore>, node_ids: Vec<NodeId>, config: &Config) -> Result<LocalTestnet> {
        config.validate()?;
        let store = LedgerStore::new(kv);
        let source = Arc::new(store.clone());
        let api = LedgerApi::new(store.clone(), source.clone(), config.difficulty);

        let mut nodes = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            nodes.push(Node::recover(node_id, store.clone(), source.clone(), config)?);
        }
        info!("Local testnet with {} nodes", nodes.len());

        Ok(LocalTestnet {
            store,
            api,
            nodes,
            difficulty: config.difficulty,
        })
    }

    pub fn get_api(&self) -> &LedgerApi {
        &self.api
    }

    pub fn get_store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn get_nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn get_node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    /// Start every node's loops
    pub fn start(&self) -> Result<Vec<NodeHandle>> {
        self.nodes.iter().map(Node::start).collect()
    }

    /// One deterministic round: every node reconciles and polls, then
    /// every node mines its queue empty.
    pub fn step(&self) -> Result<()> {
        for node in &self.nodes {
            node.tick();
        }
        for node in &self.nodes {
            node.mine_pending()?;
        }
        Ok(())
    }

    /// True when every node holds the same valid chain, nothing is left
    /// pending and every pooled transaction is in that chain.
    pub fn is_settled(&self) -> Result<bool> {
        let Some(first) = self.nodes.first() else {
            return Ok(true);
        };
        let chain = first.get_chain();
        if self.nodes.iter().any(|node| node.pending_len() > 0 || node.get_chain() != chain) {
            return Ok(false);
        }
        if !ChainValidator::new(self.difficulty).is_valid(&chain) {
            return Ok(false);
        }
        let pooled = self.store.transaction_ids()?;
        Ok(pooled
            .iter()
            .all(|txid| chain.iter().any(|block| block.contains_transaction(txid))))
    }

    /// Poll `is_settled` until it holds or `timeout` passes
    pub fn wait_until_settled(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.is_settled() {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => warn!("Could not check testnet state: {e}"),
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(Duration::from_millis(50));
        }
    }

    pub fn consensus_chain(&self) -> Result<Vec<Block>> {
        self.api.get_consensus_chain()
    }
}
