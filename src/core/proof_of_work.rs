use crate::core::hasher::{Digest, PreparedHasher};
use crate::core::{Block, UnsealedBlock};
use log::{debug, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Leading zero hex characters a block hash needs by default
pub const DEFAULT_DIFFICULTY: usize = 2;

/// Highest supported difficulty: every nibble of a SHA-256 digest
pub const MAX_DIFFICULTY: usize = 64;

const MAX_NONCE: u64 = u64::MAX;

/// Shared cancellation signal for nonce searches.
///
/// Cancelling bumps an epoch; every ticket taken before the bump reports
/// itself cancelled. New searches take a fresh ticket and are unaffected.
#[derive(Clone, Default)]
pub struct CancelToken {
    epoch: Arc<AtomicU64>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub fn ticket(&self) -> MiningTicket {
        MiningTicket {
            epoch: Arc::clone(&self.epoch),
            issued_at: self.epoch.load(Ordering::SeqCst),
        }
    }
}

pub struct MiningTicket {
    epoch: Arc<AtomicU64>,
    issued_at: u64,
}

impl MiningTicket {
    pub fn is_cancelled(&self) -> bool {
        self.epoch.load(Ordering::Relaxed) != self.issued_at
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProofOfWork {
    difficulty: usize,
}

impl ProofOfWork {
    pub fn new(difficulty: usize) -> ProofOfWork {
        ProofOfWork {
            difficulty: difficulty.min(MAX_DIFFICULTY),
        }
    }

    pub fn get_difficulty(&self) -> usize {
        self.difficulty
    }

    /// Search nonces from zero upward until the hash meets the difficulty.
    ///
    /// The ticket is checked between trials, never inside one. Returns
    /// `None` when the ticket is cancelled or the nonce space runs out.
    pub fn run(&self, block: &UnsealedBlock, ticket: &MiningTicket) -> Option<(u64, Digest)> {
        let hasher = PreparedHasher::new(block.get_previous_hash(), block.get_transactions());
        debug!(
            "Mining block on {} with difficulty {}",
            block.get_previous_hash(),
            self.difficulty
        );

        let mut nonce = 0;
        loop {
            if ticket.is_cancelled() {
                info!("Nonce search cancelled after {nonce} trials");
                return None;
            }
            let hash = hasher.digest(nonce);
            if hash.meets_difficulty(self.difficulty) {
                return Some((nonce, hash));
            }
            if nonce == MAX_NONCE {
                return None;
            }
            nonce += 1;
        }
    }

    /// Check that a sealed block's hash recomputes and meets the difficulty
    pub fn validate(&self, block: &Block) -> bool {
        let hash = block.compute_hash();
        hash == *block.get_hash() && hash.meets_difficulty(self.difficulty)
    }
}
