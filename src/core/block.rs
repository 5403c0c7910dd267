use crate::core::hasher::{self, Digest};
use crate::core::{NodeId, Transaction, TxId};
use crate::error::Result;
use crate::utils::{deserialize, serialize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Block content before proof of work: the part the seal covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsealedBlock {
    transactions: BTreeMap<TxId, Transaction>,
    previous_hash: Digest,
}

impl UnsealedBlock {
    pub fn new(previous_hash: Digest, transactions: impl IntoIterator<Item = Transaction>) -> Self {
        let transactions = transactions
            .into_iter()
            .map(|tx| (tx.get_id().to_string(), tx))
            .collect();
        UnsealedBlock {
            transactions,
            previous_hash,
        }
    }

    pub fn get_transactions(&self) -> &BTreeMap<TxId, Transaction> {
        &self.transactions
    }

    pub fn get_previous_hash(&self) -> &Digest {
        &self.previous_hash
    }

    pub fn seal(self, nonce: u64, hash: Digest, miner_id: NodeId) -> Block {
        Block {
            transactions: self.transactions,
            previous_hash: self.previous_hash,
            nonce,
            hash,
            miner_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    transactions: BTreeMap<TxId, Transaction>,
    previous_hash: Digest,
    nonce: u64,
    hash: Digest,
    miner_id: NodeId,
}

impl Block {
    /// Build a block from raw parts; nothing is checked. Blocks received
    /// from peers go through the chain validator before they are trusted.
    pub fn from_parts(
        transactions: BTreeMap<TxId, Transaction>,
        previous_hash: Digest,
        nonce: u64,
        hash: Digest,
        miner_id: NodeId,
    ) -> Block {
        Block {
            transactions,
            previous_hash,
            nonce,
            hash,
            miner_id,
        }
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn get_transactions(&self) -> &BTreeMap<TxId, Transaction> {
        &self.transactions
    }

    pub fn get_previous_hash(&self) -> &Digest {
        &self.previous_hash
    }

    pub fn get_hash(&self) -> &Digest {
        &self.hash
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_miner_id(&self) -> &NodeId {
        &self.miner_id
    }

    pub fn contains_transaction(&self, txid: &str) -> bool {
        self.transactions.contains_key(txid)
    }

    pub fn transaction_ids(&self) -> impl Iterator<Item = &TxId> + '_ {
        self.transactions.keys()
    }

    /// Hash of the block content with its recorded nonce, which a valid
    /// block carries as its own hash.
    pub fn compute_hash(&self) -> Digest {
        hasher::digest_content(&self.previous_hash, &self.transactions, self.nonce)
    }
}
