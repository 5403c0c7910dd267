use crate::error::Result;

/// Key-value backend the ledger persists into.
///
/// Nothing beyond read-your-writes on a single node is assumed; the only
/// atomic operation required is `set_if_absent`.
pub trait KvStore: Send + Sync {
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Write `value` only if `key` is not present. Returns whether it wrote.
    fn set_if_absent(&self, key: &str, value: &[u8]) -> Result<bool>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn delete(&self, key: &str) -> Result<()>;

    /// Keys starting with `prefix`, in ascending order
    fn scan(&self, prefix: &str) -> Result<Vec<String>>;
}
