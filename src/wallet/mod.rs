//! Wallet management
//!
//! Named ECDSA P-256 identities used to sign transfers before they are
//! submitted to the pool.

#[allow(clippy::module_inception)]
pub mod wallet;
pub mod wallets;

pub use wallet::Wallet;
pub use wallets::{Wallets, WALLET_FILE};
