//! Data storage and persistence
//!
//! A small key-value contract (`KvStore`) with an embedded sled backend for
//! real nodes and an in-memory backend for the local testnet, plus the
//! typed `LedgerStore` that owns the key layout.

pub mod kv;
pub mod ledger_store;
pub mod memory_store;
pub mod sled_store;

pub use kv::KvStore;
pub use ledger_store::LedgerStore;
pub use memory_store::MemoryStore;
pub use sled_store::SledStore;
