//! Dual-store persistence for the consent record.
//!
//! `save`, `load` and `clear` never fail. Each store is tried independently
//! and failures are logged, so a visitor whose primary storage is blocked
//! still keeps consent through the cookie.

use std::sync::Arc;

use crate::config::DEFAULT_STORAGE_KEY;
use crate::record::ConsentRecord;
use crate::storage::{CookieJar, FallbackCookie, KvStore};

/// Fallback cookie lifetime: 365 days.
pub const FALLBACK_MAX_AGE_SECS: i64 = 31_536_000;

#[derive(Clone)]
pub struct ConsentStorage {
    primary: Arc<dyn KvStore>,
    fallback: Arc<dyn CookieJar>,
    storage_key: String,
    cookie_name: String,
}

impl std::fmt::Debug for ConsentStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentStorage")
            .field("storage_key", &self.storage_key)
            .field("cookie_name", &self.cookie_name)
            .finish_non_exhaustive()
    }
}

impl ConsentStorage {
    pub fn new(primary: Arc<dyn KvStore>, fallback: Arc<dyn CookieJar>) -> Self {
        Self {
            primary,
            fallback,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            cookie_name: DEFAULT_STORAGE_KEY.to_string(),
        }
    }

    pub fn with_keys(mut self, storage_key: &str, cookie_name: &str) -> Self {
        self.storage_key = storage_key.to_string();
        self.cookie_name = cookie_name.to_string();
        self
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Writes `record` to both stores.
    pub fn save(&self, record: &ConsentRecord) {
        let payload = match record.to_json() {
            Ok(payload) => payload,
            Err(error) => {
                log::warn!("consent record not serializable: {error}");
                return;
            }
        };

        if let Err(error) = self.primary.set_item(&self.storage_key, &payload) {
            log::warn!("primary consent store write failed: {error}");
        }

        let cookie = FallbackCookie::site_wide(
            &self.cookie_name,
            urlencoding::encode(&payload).into_owned(),
            FALLBACK_MAX_AGE_SECS,
        );
        if let Err(error) = self.fallback.write_cookie(&cookie) {
            log::warn!("fallback consent cookie write failed: {error}");
        }
    }

    /// Reads the primary store, then the cookie. Unreadable or malformed
    /// entries count as absent.
    pub fn load(&self) -> Option<ConsentRecord> {
        self.load_primary().or_else(|| self.load_fallback())
    }

    pub fn clear(&self) {
        if let Err(error) = self.primary.remove_item(&self.storage_key) {
            log::warn!("primary consent store clear failed: {error}");
        }
        if let Err(error) = self
            .fallback
            .write_cookie(&FallbackCookie::expired(&self.cookie_name))
        {
            log::warn!("fallback consent cookie clear failed: {error}");
        }
    }

    fn load_primary(&self) -> Option<ConsentRecord> {
        let payload = match self.primary.get_item(&self.storage_key) {
            Ok(payload) => payload?,
            Err(error) => {
                log::debug!("primary consent store unreadable: {error}");
                return None;
            }
        };
        match ConsentRecord::from_json(&payload) {
            Ok(record) => Some(record),
            Err(error) => {
                log::debug!("ignoring malformed primary consent record: {error}");
                None
            }
        }
    }

    fn load_fallback(&self) -> Option<ConsentRecord> {
        let raw = match self.fallback.read_cookie(&self.cookie_name) {
            Ok(raw) => raw?,
            Err(error) => {
                log::debug!("fallback consent cookie unreadable: {error}");
                return None;
            }
        };
        let payload = match urlencoding::decode(&raw) {
            Ok(payload) => payload,
            Err(error) => {
                log::debug!("fallback consent cookie not decodable: {error}");
                return None;
            }
        };
        match ConsentRecord::from_json(&payload) {
            Ok(record) => Some(record),
            Err(error) => {
                log::debug!("ignoring malformed fallback consent record: {error}");
                None
            }
        }
    }
}
