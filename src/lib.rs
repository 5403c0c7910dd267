//! # forkchain - a small proof-of-work ledger
//!
//! Every node keeps its own chain. Nodes pull submitted transactions from a
//! shared pool, mine them into blocks on their own tip, and replace their
//! chain whenever a peer holds a strictly longer one that validates.
//!
//! ## How the code is organized
//! - `core/`: transactions, blocks, the block hasher, proof of work, chain validation
//! - `storage/`: key-value backends (sled, in-memory) and the ledger key layout
//! - `node/`: per-node state plus the intake, mining and fork-resolution loops
//! - `network/`: JSON-over-TCP gossip and the `ChainSource` seam
//! - `api`: submit transactions, read local and consensus chains
//! - `wallet/`: named ECDSA P-256 signing keys
//! - `config/`: defaults, TOML file and environment overrides
//! - `testnet/`: several nodes in one process over a shared store
//! - `cli/`: command-line interface
//!
//! ## Where to start reading
//! 1. `node/engine.rs` for how the two loops of a node fit together
//! 2. `node/miner.rs` and `node/resolver.rs` for the two ways a chain changes
//! 3. `core/hasher.rs` for exactly which bytes a block hash covers

pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod node;
pub mod storage;
pub mod testnet;
pub mod utils;
pub mod wallet;

// Re-export commonly used types for convenience
pub use api::LedgerApi;
pub use cli::{Command, Opt};
pub use config::Config;
pub use core::{
    Block, CancelToken, ChainValidator, Digest, NodeId, ProofOfWork, Transaction, TxId,
    UnsealedBlock, DEFAULT_DIFFICULTY,
};
pub use error::{BlockchainError, Result};
pub use network::{ChainSource, GossipClient, Package, Peers, Server};
pub use node::{ForkResolver, Miner, Node, NodeHandle, NodeState, SharedState};
pub use storage::{KvStore, LedgerStore, MemoryStore, SledStore};
pub use testnet::LocalTestnet;
pub use wallet::{Wallet, Wallets};
