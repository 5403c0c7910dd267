// Per-node embedded storage. Each node process owns one sled database
// under its data directory; peers read it only through the gossip server.

use crate::error::{BlockchainError, Result};
use crate::storage::KvStore;
use sled::{Db, Tree};
use std::path::{Path, PathBuf};

const LEDGER_TREE: &str = "ledger";

pub struct SledStore {
    db: Db,
    tree: Tree,
    db_path: PathBuf,
}

impl SledStore {
    pub fn open(db_path: &Path) -> Result<SledStore> {
        let db = sled::open(db_path).map_err(|e| {
            BlockchainError::StoreUnavailable(format!("Failed to open database: {e}"))
        })?;
        Self::from_db(db, db_path.to_path_buf())
    }

    /// A store that is removed when dropped
    pub fn temporary() -> Result<SledStore> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, PathBuf::new())
    }

    fn from_db(db: Db, db_path: PathBuf) -> Result<SledStore> {
        let tree = db.open_tree(LEDGER_TREE).map_err(|e| {
            BlockchainError::StoreUnavailable(format!("Failed to open ledger tree: {e}"))
        })?;
        Ok(SledStore { db, tree, db_path })
    }

    pub fn get_db_path(&self) -> &PathBuf {
        &self.db_path
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl KvStore for SledStore {
    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.tree.insert(key, value)?;
        Ok(())
    }

    fn set_if_absent(&self, key: &str, value: &[u8]) -> Result<bool> {
        let swapped = self
            .tree
            .compare_and_swap(key, None as Option<&[u8]>, Some(value))?;
        Ok(swapped.is_ok())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.tree.get(key)?.map(|value| value.to_vec()))
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.tree.contains_key(key)?)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.tree.remove(key)?;
        Ok(())
    }

    fn scan(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in self.tree.scan_prefix(prefix) {
            let (key, _) = entry?;
            let key = String::from_utf8(key.to_vec()).map_err(|e| {
                BlockchainError::StoreUnavailable(format!("Non UTF-8 key in ledger tree: {e}"))
            })?;
            keys.push(key);
        }
        Ok(keys)
    }
}
