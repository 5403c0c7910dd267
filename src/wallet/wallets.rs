use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use crate::wallet::Wallet;
use log::info;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const WALLET_FILE: &str = "wallets.dat";

/// Named wallets kept in a single file under the node's data directory
pub struct Wallets {
    path: PathBuf,
    wallets: BTreeMap<String, Wallet>,
}

impl Wallets {
    /// Open the wallet file at `path`; a missing file is an empty set
    pub fn load(path: &Path) -> Result<Wallets> {
        let mut wallets = Wallets {
            path: path.to_path_buf(),
            wallets: BTreeMap::new(),
        };
        if path.exists() {
            let mut file = File::open(path)?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            wallets.wallets = deserialize(&buf)?;
        }
        Ok(wallets)
    }

    pub fn create_wallet(&mut self, name: &str) -> Result<&Wallet> {
        if name.is_empty() {
            return Err(BlockchainError::Wallet(
                "Wallet name must not be empty".to_string(),
            ));
        }
        if self.wallets.contains_key(name) {
            return Err(BlockchainError::Wallet(format!(
                "Wallet '{name}' already exists"
            )));
        }
        self.wallets.insert(name.to_string(), Wallet::new()?);
        self.save()?;
        info!("Created wallet '{name}' in {}", self.path.display());
        self.get_wallet(name)
            .ok_or_else(|| BlockchainError::Wallet(format!("Wallet '{name}' vanished")))
    }

    pub fn get_wallet(&self, name: &str) -> Option<&Wallet> {
        self.wallets.get(name)
    }

    pub fn get_names(&self) -> Vec<String> {
        self.wallets.keys().cloned().collect()
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&serialize(&self.wallets)?)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_wallets_persist_by_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(WALLET_FILE);

        let public_key = {
            let mut wallets = Wallets::load(&path).unwrap();
            assert!(wallets.get_names().is_empty());
            wallets.create_wallet("alice").unwrap().get_public_key().to_vec()
        };

        let wallets = Wallets::load(&path).unwrap();
        assert_eq!(wallets.get_names(), vec!["alice".to_string()]);
        assert_eq!(
            wallets.get_wallet("alice").unwrap().get_public_key(),
            public_key.as_slice()
        );
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let dir = tempdir().unwrap();
        let mut wallets = Wallets::load(&dir.path().join(WALLET_FILE)).unwrap();
        wallets.create_wallet("bob").unwrap();
        assert!(matches!(
            wallets.create_wallet("bob"),
            Err(BlockchainError::Wallet(_))
        ));
    }
}
