use crate::core::{Transaction, TxId};
use crate::error::{BlockchainError, Result};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// An ECDSA P-256 signing identity. Key material is wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop, bincode::Encode, bincode::Decode)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let pkcs8 = crate::utils::new_key_pair()?;
        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .map_err(|e| {
                    BlockchainError::Crypto(format!("Failed to create key pair from PKCS8: {e}"))
                })?;
        let public_key = key_pair.public_key().as_ref().to_vec();
        Ok(Wallet { pkcs8, public_key })
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_public_key_hex(&self) -> String {
        data_encoding::HEXLOWER.encode(&self.public_key)
    }

    /// Sign a transfer stamped with the current time
    pub fn sign_transfer(&self, recipient: &str, amount: u64) -> Result<Transaction> {
        Transaction::new_signed(&self.pkcs8, &self.public_key, recipient, amount)
    }

    /// Sign a transfer with an explicit identity, used to replay or script submissions
    pub fn sign_transfer_at(&self, recipient: &str, amount: u64, timestamp: &str) -> Result<Transaction> {
        Transaction::new_signed_at(
            &self.pkcs8,
            &self.public_key,
            recipient,
            amount,
            TxId::from(timestamp),
        )
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("public_key", &self.get_public_key_hex())
            .finish_non_exhaustive()
    }
}
