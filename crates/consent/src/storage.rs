//! Consent persistence.
//!
//! A record is written to two independent stores:
//! - a primary key/value store that survives across sessions
//! - a fallback cookie sent with every request, for environments that evict
//!   the primary store

mod adapter;
mod cookie_jar;
mod file;
mod kv_store;

pub use adapter::ConsentStorage;
pub use cookie_jar::{CookieJar, FallbackCookie, MemoryCookieJar, SameSite, StoredCookie};
pub use file::FileKvStore;
pub use kv_store::{KvStore, MemoryKvStore};
