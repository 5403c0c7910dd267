use crate::config::Config;
use crate::core::{Block, CancelToken, NodeId};
use crate::error::Result;
use crate::network::ChainSource;
use crate::node::intake;
use crate::node::{ForkResolver, Miner, NodeState, SharedState};
use crate::storage::LedgerStore;
use log::{debug, error, info};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// Granularity at which sleeping loops notice a shutdown request
const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

/// One ledger node: its state plus the components that move it forward.
///
/// Cloning is cheap and every clone drives the same node.
#[derive(Clone)]
pub struct Node {
    state: SharedState,
    store: LedgerStore,
    source: Arc<dyn ChainSource>,
    miner: Miner,
    resolver: ForkResolver,
    cancel: CancelToken,
    poll_interval_ms: (u64, u64),
    mining_idle: Duration,
}

impl Node {
    /// Start a node from whatever `store` holds for `node_id`
    pub fn recover(
        node_id: NodeId,
        store: LedgerStore,
        source: Arc<dyn ChainSource>,
        config: &Config,
    ) -> Result<Node> {
        config.validate()?;
        let state = NodeState::recover(node_id, &store)?;
        Ok(Node {
            state: SharedState::new(state),
            store,
            source,
            miner: Miner::new(config.difficulty, config.batch_size),
            resolver: ForkResolver::new(config.difficulty),
            cancel: CancelToken::new(),
            poll_interval_ms: (config.poll_interval_min_ms, config.poll_interval_max_ms),
            mining_idle: config.get_mining_idle(),
        })
    }

    pub fn get_node_id(&self) -> NodeId {
        self.state.lock().get_node_id().clone()
    }

    pub fn get_state(&self) -> &SharedState {
        &self.state
    }

    pub fn get_chain(&self) -> Vec<Block> {
        self.state.chain_snapshot()
    }

    pub fn chain_len(&self) -> usize {
        self.state.lock().chain_len()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending_len()
    }

    pub fn poll_once(&self) -> Result<usize> {
        intake::poll_once(&self.state, &self.store)
    }

    pub fn mine_once(&self) -> Result<Option<Block>> {
        self.miner.mine_once(&self.state, &self.store, &self.cancel)
    }

    pub fn reconcile(&self) -> Result<bool> {
        self.resolver
            .reconcile(&self.state, &self.store, self.source.as_ref(), &self.cancel)
    }

    /// One pass of the reconciliation loop: reconcile, then poll.
    /// Failures are logged and left for the next tick.
    pub fn tick(&self) {
        if let Err(e) = self.reconcile() {
            error!("Node {} failed to reconcile: {e}", self.get_node_id());
        }
        if let Err(e) = self.poll_once() {
            error!("Node {} failed to poll the pool: {e}", self.get_node_id());
        }
    }

    /// Mine until the queue is empty. Returns the number of blocks mined.
    pub fn mine_pending(&self) -> Result<usize> {
        let mut mined = 0;
        while self.mine_once()?.is_some() {
            mined += 1;
        }
        Ok(mined)
    }

    /// Spawn the mining loop and the reconciliation loop
    pub fn start(&self) -> Result<NodeHandle> {
        let node_id = self.get_node_id();
        let shutdown = Arc::new(AtomicBool::new(false));

        let miner = {
            let node = self.clone();
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name(format!("miner-{node_id}"))
                .spawn(move || node.run_mining_loop(&shutdown))?
        };
        let syncer = {
            let node = self.clone();
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name(format!("sync-{node_id}"))
                .spawn(move || node.run_sync_loop(&shutdown))?
        };

        info!("Node {node_id} started");
        Ok(NodeHandle {
            node_id,
            shutdown,
            cancel: self.cancel.clone(),
            threads: vec![miner, syncer],
        })
    }

    fn run_mining_loop(&self, shutdown: &AtomicBool) {
        while !shutdown.load(Ordering::Relaxed) {
            match self.mine_once() {
                Ok(Some(_)) => {}
                Ok(None) => sleep_unless_shutdown(self.mining_idle, shutdown),
                Err(e) => {
                    error!("Node {} failed to mine: {e}", self.get_node_id());
                    sleep_unless_shutdown(self.mining_idle, shutdown);
                }
            }
        }
        debug!("Mining loop of {} stopped", self.get_node_id());
    }

    fn run_sync_loop(&self, shutdown: &AtomicBool) {
        let (min, max) = self.poll_interval_ms;
        let mut rng = rand::thread_rng();
        while !shutdown.load(Ordering::Relaxed) {
            self.tick();
            let wait = Duration::from_millis(rng.gen_range(min..=max));
            sleep_unless_shutdown(wait, shutdown);
        }
        debug!("Sync loop of {} stopped", self.get_node_id());
    }
}

fn sleep_unless_shutdown(duration: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + duration;
    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep(SHUTDOWN_POLL.min(deadline - now));
    }
}

/// Running loops of one node
pub struct NodeHandle {
    node_id: NodeId,
    shutdown: Arc<AtomicBool>,
    cancel: CancelToken,
    threads: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    pub fn get_node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Stop both loops, abandoning any nonce search in flight
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.cancel.cancel();
        for handle in self.threads {
            if handle.join().is_err() {
                error!("A loop of node {} panicked", self.node_id);
            }
        }
        info!("Node {} stopped", self.node_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ChainValidator;
    use crate::testnet::signed_transaction_at;

    fn fast_config() -> Config {
        Config {
            difficulty: 1,
            poll_interval_min_ms: 5,
            poll_interval_max_ms: 20,
            mining_idle_ms: 5,
            ..Config::default()
        }
    }

    fn node(store: &LedgerStore, id: &str) -> Node {
        Node::recover(
            NodeId::new(id),
            store.clone(),
            Arc::new(store.clone()),
            &fast_config(),
        )
        .unwrap()
    }

    #[test]
    fn test_manual_steps_mine_submitted_transactions() {
        let store = LedgerStore::in_memory();
        let a = node(&store, "a");
        store
            .put_transaction(&signed_transaction_at("00000000000000000001", "x", 1))
            .unwrap();
        store
            .put_transaction(&signed_transaction_at("00000000000000000002", "y", 2))
            .unwrap();

        a.tick();
        assert_eq!(a.pending_len(), 2);
        assert_eq!(a.mine_pending().unwrap(), 2);
        assert_eq!(a.chain_len(), 2);
        assert!(ChainValidator::new(1).is_valid(&a.get_chain()));
    }

    #[test]
    fn test_recover_rejects_inverted_poll_interval() {
        let store = LedgerStore::in_memory();
        let config = Config {
            poll_interval_min_ms: 50,
            poll_interval_max_ms: 10,
            ..fast_config()
        };
        let result = Node::recover(NodeId::new("a"), store.clone(), Arc::new(store), &config);
        assert!(matches!(result, Err(crate::error::BlockchainError::Config(_))));
    }

    #[test]
    fn test_loops_mine_and_stop() {
        let store = LedgerStore::in_memory();
        let a = node(&store, "a");
        let handle = a.start().unwrap();
        store
            .put_transaction(&signed_transaction_at("00000000000000000001", "x", 1))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while a.chain_len() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        handle.shutdown();

        assert_eq!(a.chain_len(), 1);
        assert_eq!(store.load_chain(&NodeId::new("a")).unwrap(), a.get_chain());
    }

    #[test]
    fn test_restart_recovers_chain_and_queue() {
        let store = LedgerStore::in_memory();
        {
            let a = node(&store, "a");
            store
                .put_transaction(&signed_transaction_at("00000000000000000001", "x", 1))
                .unwrap();
            store
                .put_transaction(&signed_transaction_at("00000000000000000002", "y", 2))
                .unwrap();
            a.poll_once().unwrap();
            a.mine_once().unwrap().unwrap();
        }

        let restarted = node(&store, "a");
        assert_eq!(restarted.chain_len(), 1);
        assert_eq!(restarted.pending_len(), 1);
        assert_eq!(restarted.poll_once().unwrap(), 0);
    }
}
