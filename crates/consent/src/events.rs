//! Document-level consent notifications.
//!
//! The manager publishes through an `EventBus` and the script gate (or the
//! host page) subscribes to it. Dispatch is synchronous: every handler that
//! is subscribed when `dispatch` runs is invoked before it returns.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::ConsentConfig;
use crate::record::{ConsentCategories, Region};

pub const CONSENT_CHANGED_EVENT: &str = "consent:changed";
pub const CONSENT_READY_EVENT: &str = "consent:ready";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentChangedDetail {
    pub categories: ConsentCategories,
    pub captured_at: i64,
    pub region: Option<Region>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsentReadyDetail {
    pub config: Option<ConsentConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentEvent {
    Changed(ConsentChangedDetail),
    Ready(ConsentReadyDetail),
}

impl ConsentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Changed(_) => CONSENT_CHANGED_EVENT,
            Self::Ready(_) => CONSENT_READY_EVENT,
        }
    }

    /// The event detail as JSON, as a host page would read it.
    pub fn detail_json(&self) -> serde_json::Value {
        let detail = match self {
            Self::Changed(detail) => serde_json::to_value(detail),
            Self::Ready(detail) => serde_json::to_value(detail),
        };
        detail.unwrap_or(serde_json::Value::Null)
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&ConsentEvent) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

/// Publish/subscribe channel for consent events.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ConsentEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.subscribers.lock().push(Subscriber {
            id,
            handler: Arc::new(handler),
        });
        id
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.inner.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Invokes every current handler in subscription order and returns how
    /// many ran. No lock is held while a handler runs.
    pub fn dispatch(&self, event: &ConsentEvent) -> usize {
        let snapshot: Vec<SubscriptionId> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|subscriber| subscriber.id)
            .collect();

        let mut delivered = 0;
        for id in snapshot {
            // Re-resolve so handlers removed mid-dispatch are skipped.
            let handler = self
                .inner
                .subscribers
                .lock()
                .iter()
                .find(|subscriber| subscriber.id == id)
                .map(|subscriber| subscriber.handler.clone());
            if let Some(handler) = handler {
                handler(event);
                delivered += 1;
            }
        }
        log::debug!("dispatched {} to {} handler(s)", event.name(), delivered);
        delivered
    }
}
