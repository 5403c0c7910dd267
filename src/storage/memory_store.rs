use crate::error::{BlockchainError, Result};
use crate::storage::KvStore;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// In-process store shared by every node of a local testnet.
///
/// It can be switched offline to exercise the store-outage paths.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<BTreeMap<String, Vec<u8>>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(map) => map.len(),
            Err(_) => {
                log::error!("Failed to acquire read lock on memory store");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BlockchainError::StoreUnavailable(
                "memory store is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.check_online()?;
        self.inner.read().map_err(|e| {
            BlockchainError::StoreUnavailable(format!("Failed to acquire store lock: {e}"))
        })
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.check_online()?;
        self.inner.write().map_err(|e| {
            BlockchainError::StoreUnavailable(format!("Failed to acquire store lock: {e}"))
        })
    }
}

impl KvStore for MemoryStore {
    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.write()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn set_if_absent(&self, key: &str, value: &[u8]) -> Result<bool> {
        let mut map = self.write()?;
        if map.contains_key(key) {
            return Ok(false);
        }
        map.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.read()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.write()?.remove(key);
        Ok(())
    }

    fn scan(&self, prefix: &str) -> Result<Vec<String>> {
        let map = self.read()?;
        Ok(map
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
