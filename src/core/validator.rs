use crate::core::{Block, ProofOfWork};
use crate::error::{BlockchainError, Result};

/// Checks hash-chain integrity of a candidate chain.
///
/// The first block's `previous_hash` is taken as the chain root; every
/// block after it must point at its predecessor's hash. A chain either
/// validates as a whole or is rejected as a whole.
#[derive(Debug, Clone, Copy)]
pub struct ChainValidator {
    pow: ProofOfWork,
}

impl ChainValidator {
    pub fn new(difficulty: usize) -> Self {
        ChainValidator {
            pow: ProofOfWork::new(difficulty),
        }
    }

    pub fn is_valid(&self, chain: &[Block]) -> bool {
        self.validate(chain).is_ok()
    }

    pub fn validate(&self, chain: &[Block]) -> Result<()> {
        let Some(first) = chain.first() else {
            return Ok(());
        };

        let mut expected_previous_hash = *first.get_previous_hash();
        for (index, block) in chain.iter().enumerate() {
            if *block.get_previous_hash() != expected_previous_hash {
                return Err(BlockchainError::InvalidChain {
                    index,
                    reason: format!(
                        "previous hash {} does not match {}",
                        block.get_previous_hash(),
                        expected_previous_hash
                    ),
                });
            }

            let recomputed = block.compute_hash();
            if recomputed != *block.get_hash() {
                return Err(BlockchainError::InvalidChain {
                    index,
                    reason: format!(
                        "stored hash {} does not match content hash {}",
                        block.get_hash(),
                        recomputed
                    ),
                });
            }

            if !recomputed.meets_difficulty(self.pow.get_difficulty()) {
                return Err(BlockchainError::InvalidChain {
                    index,
                    reason: format!(
                        "hash {} has fewer than {} leading zeros",
                        recomputed,
                        self.pow.get_difficulty()
                    ),
                });
            }

            expected_previous_hash = recomputed;
        }

        Ok(())
    }
}
