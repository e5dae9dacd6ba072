//! Consent state engine.
//!
//! `ConsentManager` is the single writer of the consent record. It builds a
//! full record from a user action, persists it, and is the only component
//! that broadcasts [`ConsentEvent::Changed`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::ConsentConfig;
use crate::events::{ConsentChangedDetail, ConsentEvent, ConsentReadyDetail, EventBus};
use crate::geo;
use crate::record::{ConsentCategories, ConsentRecord, ConsentSelection, CONSENT_SCHEMA_VERSION};
use crate::storage::ConsentStorage;

pub struct ConsentManager {
    storage: ConsentStorage,
    config: Option<Arc<ConsentConfig>>,
    clock: Arc<dyn Clock>,
    bus: EventBus,
    ready_announced: AtomicBool,
}

impl std::fmt::Debug for ConsentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentManager")
            .field("storage", &self.storage)
            .field("config", &self.config)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl ConsentManager {
    pub fn new(storage: ConsentStorage, bus: EventBus) -> Self {
        Self {
            storage,
            config: None,
            clock: Arc::new(SystemClock),
            bus,
            ready_announced: AtomicBool::new(false),
        }
    }

    /// Activates `config`; storage keys follow the config.
    pub fn with_config(mut self, config: ConsentConfig) -> Self {
        self.set_config(config);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn set_config(&mut self, config: ConsentConfig) {
        self.storage = self
            .storage
            .clone()
            .with_keys(&config.storage_key, &config.cookie_name);
        self.config = Some(Arc::new(config));
    }

    pub fn config(&self) -> Option<&ConsentConfig> {
        self.config.as_deref()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn get_consent(&self) -> Option<ConsentRecord> {
        self.storage.load()
    }

    /// Records a user action and notifies subscribers.
    pub fn set_consent(&self, selection: ConsentSelection) {
        let record = ConsentRecord {
            schema_version: CONSENT_SCHEMA_VERSION,
            captured_at: self.clock.now_millis(),
            region: self.config.as_ref().and_then(|config| config.region),
            categories: selection.resolve(),
            config_fingerprint: self.current_fingerprint(),
        };
        self.storage.save(&record);
        log::info!(
            "consent saved: {}",
            record
                .categories
                .granted()
                .iter()
                .map(|category| category.as_str())
                .collect::<Vec<_>>()
                .join(",")
        );

        self.bus
            .dispatch(&ConsentEvent::Changed(ConsentChangedDetail {
                categories: record.categories,
                captured_at: record.captured_at,
                region: record.region,
            }));
    }

    pub fn is_consent_valid(&self) -> bool {
        self.get_consent()
            .is_some_and(|record| self.record_is_valid(&record))
    }

    pub fn clear_consent(&self) {
        self.storage.clear();
    }

    /// Categories the gate should start with: the stored ones when valid,
    /// otherwise essential only.
    pub fn effective_categories(&self) -> ConsentCategories {
        self.get_consent()
            .filter(|record| self.record_is_valid(record))
            .map(|record| record.categories)
            .unwrap_or_else(ConsentCategories::essential_only)
    }

    /// The banner is needed when there is no valid consent and geo rules
    /// target this visitor.
    pub fn should_show_banner(&self) -> bool {
        if self.is_consent_valid() {
            return false;
        }
        match self.config.as_deref() {
            Some(config) => geo::should_show_banner(&config.geo, config.region),
            None => true,
        }
    }

    /// Emits the ready notification once. Returns false on repeat calls.
    pub fn announce_ready(&self) -> bool {
        if self.ready_announced.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.bus.dispatch(&ConsentEvent::Ready(ConsentReadyDetail {
            config: self.config.as_deref().cloned(),
        }));
        true
    }

    fn current_fingerprint(&self) -> String {
        self.config
            .as_ref()
            .map(|config| config.fingerprint())
            .unwrap_or_default()
    }

    fn record_is_valid(&self, record: &ConsentRecord) -> bool {
        if !record.is_fresh(self.clock.now_millis()) {
            return false;
        }
        match self.config.as_deref() {
            Some(config) => record.config_fingerprint == config.fingerprint(),
            None => true,
        }
    }
}
