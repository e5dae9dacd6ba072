//! Primary key-value store trait and in-memory implementation.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{ConsentError, Result};

/// Persistent site-scoped string store (the browser's local storage).
///
/// Every call may fail: storage can be disabled, sandboxed or full.
pub trait KvStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
}

// --- Memory Implementation ---

#[derive(Debug, Default)]
pub struct MemoryKvStore {
    data: Mutex<HashMap<String, String>>,
    /// Byte budget across keys and values.
    quota: Option<usize>,
    disabled: bool,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            quota: Some(quota),
            ..Self::default()
        }
    }

    /// A store where every operation fails, like storage in a sandboxed
    /// iframe.
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    fn check_enabled(&self) -> Result<()> {
        if self.disabled {
            return Err(ConsentError::StorageUnavailable(
                "storage is disabled".to_string(),
            ));
        }
        Ok(())
    }
}

impl KvStore for MemoryKvStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.check_enabled()?;
        Ok(self.data.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.check_enabled()?;
        let mut data = self.data.lock();
        if let Some(quota) = self.quota {
            let used: usize = data
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = key.len() + value.len();
            if used + needed > quota {
                return Err(ConsentError::QuotaExceeded {
                    needed,
                    quota: quota.saturating_sub(used),
                });
            }
        }
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.check_enabled()?;
        self.data.lock().remove(key);
        Ok(())
    }
}
