//! Consent state library for the cookie banner.
//!
//! This crate provides the consent core:
//! - The persisted consent record and its category flags
//! - Dual-store persistence (primary key/value store plus fallback cookie)
//! - The consent manager that builds, validates and broadcasts records
//! - Category configuration, fingerprinting and geo targeting rules

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod geo;
pub mod manager;
pub mod record;
pub mod storage;

// Re-export main types
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{CategoryDefinition, ConsentConfig, GeoConfig};
pub use error::{ConsentError, Result};
pub use events::{
    ConsentChangedDetail, ConsentEvent, ConsentReadyDetail, EventBus, SubscriptionId,
    CONSENT_CHANGED_EVENT, CONSENT_READY_EVENT,
};
pub use manager::ConsentManager;
pub use record::{
    Category, ConsentCategories, ConsentRecord, ConsentSelection, Region, CONSENT_MAX_AGE_MS,
    CONSENT_SCHEMA_VERSION,
};
pub use storage::{
    ConsentStorage, CookieJar, FallbackCookie, FileKvStore, KvStore, MemoryCookieJar,
    MemoryKvStore, SameSite,
};
