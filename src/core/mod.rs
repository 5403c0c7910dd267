//! Core ledger functionality
//!
//! Transactions, blocks, the block hasher, proof-of-work search and the
//! chain validator. Everything here is free of storage and threads.

pub mod block;
pub mod hasher;
pub mod node_id;
pub mod proof_of_work;
pub mod transaction;
pub mod validator;

pub use block::{Block, UnsealedBlock};
pub use hasher::Digest;
pub use node_id::NodeId;
pub use proof_of_work::{CancelToken, MiningTicket, ProofOfWork, DEFAULT_DIFFICULTY, MAX_DIFFICULTY};
pub use transaction::{Transaction, TxId};
pub use validator::ChainValidator;
