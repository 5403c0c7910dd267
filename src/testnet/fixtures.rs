//! Signed transactions and mined chains for unit tests

use crate::core::{Block, CancelToken, Digest, NodeId, ProofOfWork, Transaction, UnsealedBlock};
use crate::error::{BlockchainError, Result};
use crate::storage::{KvStore, MemoryStore};
use crate::wallet::Wallet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A transaction signed by a throwaway wallet with a fixed identity
pub fn signed_transaction_at(timestamp: &str, recipient: &str, amount: u64) -> Transaction {
    Wallet::new()
        .unwrap()
        .sign_transfer_at(recipient, amount, timestamp)
        .unwrap()
}

/// Mine `len` single-transaction blocks on top of `root`
pub fn mine_chain(root: Digest, len: usize, difficulty: usize, miner: &str) -> Vec<Block> {
    let pow = ProofOfWork::new(difficulty);
    let cancel = CancelToken::new();
    let mut previous_hash = root;
    let mut chain = Vec::with_capacity(len);

    for index in 0..len {
        let tx = signed_transaction_at(&format!("{:020}", index + 1), "bob", index as u64 + 1);
        let unsealed = UnsealedBlock::new(previous_hash, vec![tx]);
        let (nonce, hash) = pow.run(&unsealed, &cancel.ticket()).unwrap();
        let block = unsealed.seal(nonce, hash, NodeId::new(miner));
        previous_hash = *block.get_hash();
        chain.push(block);
    }
    chain
}

/// Memory store that refuses writes once its allowance runs out
pub struct FlakyStore {
    inner: MemoryStore,
    writes_left: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> FlakyStore {
        FlakyStore {
            inner: MemoryStore::new(),
            writes_left: AtomicUsize::new(usize::MAX),
        }
    }

    pub fn allow_writes(&self, writes: usize) {
        self.writes_left.store(writes, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.allow_writes(usize::MAX);
    }

    fn take_write(&self) -> Result<()> {
        self.writes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .map(|_| ())
            .map_err(|_| BlockchainError::StoreUnavailable("write allowance exhausted".to_string()))
    }
}

impl KvStore for FlakyStore {
    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.take_write()?;
        self.inner.set(key, value)
    }

    fn set_if_absent(&self, key: &str, value: &[u8]) -> Result<bool> {
        self.take_write()?;
        self.inner.set_if_absent(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.take_write()?;
        self.inner.delete(key)
    }

    fn scan(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.scan(prefix)
    }
}
