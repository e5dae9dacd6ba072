//! Consent-gated promotion of inert scripts.
//!
//! Third-party scripts are shipped as
//! `<script type="text/plain" data-category="analytics">`. The gate replaces
//! each one with a live `<script>` once its category is granted, exactly
//! once per node, in document order.
//!
//! Per node the only transition is `Blocked -> Executed`. The node is put in
//! the executed set before its replacement is inserted, so neither a repeated
//! scan nor a late mutation batch can run it twice. Once the replacement is
//! in place the inert node is released from the document and dropped from
//! the set, so neither grows with the number of promoted scripts.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use consent::{Category, ConsentCategories, ConsentEvent, EventBus, SubscriptionId};
use parking_lot::Mutex;

use crate::document::{Document, ElementRef, MutationRecord, NodeId, ObserverId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateOptions {
    /// Non-executable `type` marking a script as inert.
    pub inert_type: String,
    /// Attribute naming the script's consent category.
    pub category_attribute: String,
    /// Watch the document for scripts inserted after `init`.
    pub observe_dynamic: bool,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            inert_type: "text/plain".to_string(),
            category_attribute: "data-category".to_string(),
            observe_dynamic: true,
        }
    }
}

impl GateOptions {
    fn is_inert(&self, element: ElementRef<'_>) -> bool {
        element.tag() == "script"
            && element
                .attribute("type")
                .is_some_and(|value| value.trim().eq_ignore_ascii_case(&self.inert_type))
            && element.has_attribute(&self.category_attribute)
    }
}

#[derive(Debug, Default)]
struct GateState {
    initialized: bool,
    /// Last known consent; `None` until `init` or `update_consent`.
    categories: Option<ConsentCategories>,
    executed: HashSet<NodeId>,
    observer: Option<ObserverId>,
    subscription: Option<SubscriptionId>,
}

impl GateState {
    fn is_granted(&self, category: Category) -> bool {
        category == Category::Essential
            || self
                .categories
                .is_some_and(|categories| categories.is_granted(category))
    }
}

struct GateShared {
    document: Document,
    bus: Option<EventBus>,
    options: GateOptions,
    state: Mutex<GateState>,
}

/// Script gate bound to one document.
///
/// Dropping the gate destroys it.
pub struct ScriptGate {
    shared: Arc<GateShared>,
}

impl std::fmt::Debug for ScriptGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptGate")
            .field("options", &self.shared.options)
            .field("state", &*self.shared.state.lock())
            .finish()
    }
}

impl ScriptGate {
    /// A gate driven only through [`update_consent`](Self::update_consent).
    pub fn new(document: Document, options: GateOptions) -> Self {
        Self::build(document, None, options)
    }

    /// A gate that also follows consent-changed events on `bus`.
    pub fn with_event_bus(document: Document, bus: EventBus, options: GateOptions) -> Self {
        Self::build(document, Some(bus), options)
    }

    fn build(document: Document, bus: Option<EventBus>, options: GateOptions) -> Self {
        Self {
            shared: Arc::new(GateShared {
                document,
                bus,
                options,
                state: Mutex::new(GateState::default()),
            }),
        }
    }

    pub fn document(&self) -> &Document {
        &self.shared.document
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.state.lock().initialized
    }

    /// Starts gating with `categories`. Repeat calls are ignored until
    /// [`destroy`](Self::destroy).
    pub fn init(&self, categories: ConsentCategories) {
        {
            let mut state = self.shared.state.lock();
            if state.initialized {
                log::debug!("script gate already initialized");
                return;
            }
            state.initialized = true;
            state.categories = Some(categories);
        }

        self.subscribe();
        if self.shared.options.observe_dynamic {
            self.start_observer();
        }
        let unblocked = self.shared.process_blocked_scripts();
        log::info!("script gate initialized, {unblocked} script(s) unblocked");
    }

    /// Re-scans the document and unblocks everything now permitted.
    /// Returns how many scripts were unblocked.
    pub fn process_blocked_scripts(&self) -> usize {
        self.shared.process_blocked_scripts()
    }

    /// Replaces one inert node with a live script if its category is
    /// granted. Returns false, without side effects, when it is not.
    pub fn unblock_script(&self, node: NodeId) -> bool {
        self.shared.unblock_script(node)
    }

    /// Inert scripts still waiting, in document order.
    pub fn get_blocked_scripts(&self) -> Vec<NodeId> {
        self.shared.blocked_scripts()
    }

    pub fn is_category_consented(&self, category: Category) -> bool {
        self.shared.state.lock().is_granted(category)
    }

    pub fn update_consent(&self, categories: ConsentCategories) {
        self.shared.update_consent(categories);
    }

    pub fn start_observer(&self) {
        let mut state = self.shared.state.lock();
        if state.observer.is_some() {
            return;
        }
        let document = &self.shared.document;
        let weak: Weak<GateShared> = Arc::downgrade(&self.shared);
        match document.observe(document.root(), move |_, records| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_mutations(records);
            }
        }) {
            Ok(id) => state.observer = Some(id),
            Err(error) => log::warn!("script gate could not observe document: {error}"),
        }
    }

    pub fn stop_observer(&self) {
        let observer = self.shared.state.lock().observer.take();
        if let Some(id) = observer {
            self.shared.document.disconnect(id);
        }
    }

    pub fn is_observing(&self) -> bool {
        self.shared.state.lock().observer.is_some()
    }

    /// Stops observation, drops the event subscription and forgets all
    /// consent and execution state. Safe to call repeatedly; `init` may be
    /// called again afterwards.
    pub fn destroy(&self) {
        let (observer, subscription) = {
            let mut state = self.shared.state.lock();
            let observer = state.observer.take();
            let subscription = state.subscription.take();
            *state = GateState::default();
            (observer, subscription)
        };
        if let Some(id) = observer {
            self.shared.document.disconnect(id);
        }
        if let (Some(id), Some(bus)) = (subscription, self.shared.bus.as_ref()) {
            bus.unsubscribe(id);
        }
    }

    fn subscribe(&self) {
        let Some(bus) = self.shared.bus.as_ref() else {
            return;
        };
        let weak: Weak<GateShared> = Arc::downgrade(&self.shared);
        let id = bus.subscribe(move |event| {
            if let ConsentEvent::Changed(detail) = event {
                if let Some(shared) = weak.upgrade() {
                    shared.handle_consent_changed(detail.categories);
                }
            }
        });
        self.shared.state.lock().subscription = Some(id);
    }
}

impl Drop for ScriptGate {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl GateShared {
    fn update_consent(&self, categories: ConsentCategories) {
        self.state.lock().categories = Some(categories);
        let unblocked = self.process_blocked_scripts();
        log::debug!("consent updated, {unblocked} script(s) unblocked");
    }

    fn handle_consent_changed(&self, categories: ConsentCategories) {
        if !self.state.lock().initialized {
            return;
        }
        self.update_consent(categories);
    }

    fn process_blocked_scripts(&self) -> usize {
        // Forget nodes the document has released.
        self.state
            .lock()
            .executed
            .retain(|id| self.document.contains(*id));

        self.blocked_scripts()
            .into_iter()
            .filter(|node| self.unblock_script(*node))
            .count()
    }

    fn blocked_scripts(&self) -> Vec<NodeId> {
        let document = &self.document;
        let candidates = document.find_all(document.root(), |element| self.options.is_inert(element));
        let state = self.state.lock();
        candidates
            .into_iter()
            .filter(|id| !state.executed.contains(id))
            .collect()
    }

    fn unblock_script(&self, node: NodeId) -> bool {
        let document = &self.document;
        let inert = document
            .find_all(node, |element| element.id() == node && self.options.is_inert(element))
            .contains(&node);
        if !inert {
            return false;
        }
        let Some(category) = document
            .attribute(node, &self.options.category_attribute)
            .and_then(|id| Category::from_id(&id))
        else {
            return false;
        };

        {
            let mut state = self.state.lock();
            if state.executed.contains(&node) || !state.is_granted(category) {
                return false;
            }
            state.executed.insert(node);
        }

        self.promote(node, category);
        true
    }

    /// Swaps `node` for an equivalent live script.
    fn promote(&self, node: NodeId, category: Category) {
        let document = &self.document;
        let attributes = document.attributes(node);
        let remote = attributes.iter().any(|(name, _)| name == "src");

        let live = document.create_element("script");
        for (name, value) in &attributes {
            if name == "type" || *name == self.options.category_attribute {
                continue;
            }
            // Keeps remote scripts in document order.
            if remote && name == "async" {
                continue;
            }
            if let Err(error) = document.set_attribute(live, name, value) {
                log::warn!("failed to copy attribute {name} onto live script: {error}");
            }
        }
        if !remote {
            let text = document.text(node).unwrap_or_default();
            if let Err(error) = document.set_text(live, &text) {
                log::warn!("failed to copy inline script body: {error}");
            }
        }

        let inserted = match document.parent(node) {
            Some(_) => document.replace_with(node, live),
            None => document.append_child(document.body(), live),
        };
        if let Err(error) = inserted {
            log::warn!("failed to insert live script for {node}: {error}");
            return;
        }
        log::debug!("unblocked {category} script {node}");

        // The inert node is detached now; its id can no longer resolve.
        match document.release(node) {
            Ok(()) => {
                self.state.lock().executed.remove(&node);
            }
            Err(error) => log::debug!("inert script {node} kept alive: {error}"),
        }
    }

    fn handle_mutations(&self, records: &[MutationRecord]) {
        let document = &self.document;
        let mut seen = HashSet::new();
        let mut candidates: Vec<(Vec<usize>, NodeId)> = Vec::new();
        for added in records.iter().flat_map(|record| record.added.iter()) {
            for id in document.find_all(*added, |element| self.options.is_inert(element)) {
                if !seen.insert(id) {
                    continue;
                }
                if let Some(position) = document.tree_position(id) {
                    candidates.push((position, id));
                }
            }
        }
        candidates.sort();

        let unblocked = candidates
            .into_iter()
            .filter(|(_, id)| self.unblock_script(*id))
            .count();
        if unblocked > 0 {
            log::debug!("{unblocked} inserted script(s) unblocked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ScriptInvocation, ScriptRuntime, ScriptSource};
    use consent::{
        ConsentManager, ConsentSelection, ConsentStorage, MemoryCookieJar, MemoryKvStore,
    };

    /// Records what ran. Inline bodies of the form `push:<n>` append `n` to
    /// `order`, like a page script pushing onto a shared array.
    #[derive(Default)]
    struct PageRuntime {
        ran: Mutex<Vec<ScriptInvocation>>,
        order: Mutex<Vec<u32>>,
    }

    impl ScriptRuntime for PageRuntime {
        fn execute(&self, _document: &Document, script: &ScriptInvocation) {
            if let ScriptSource::Inline(body) = &script.source {
                if let Some(n) = body.strip_prefix("push:").and_then(|n| n.parse::<u32>().ok()) {
                    self.order.lock().push(n);
                }
            }
            self.ran.lock().push(script.clone());
        }
    }

    impl PageRuntime {
        fn count(&self) -> usize {
            self.ran.lock().len()
        }
    }

    fn page() -> (Document, Arc<PageRuntime>) {
        let document = Document::new();
        let runtime = Arc::new(PageRuntime::default());
        document.set_script_runtime(runtime.clone());
        (document, runtime)
    }

    fn inert(document: &Document, category: &str, body: &str) -> NodeId {
        let node = document.create_element_with(
            "script",
            &[("type", "text/plain"), ("data-category", category)],
            body,
        );
        document
            .append_child(document.body(), node)
            .expect("append");
        node
    }

    fn analytics_only() -> ConsentCategories {
        ConsentCategories {
            analytics: true,
            ..ConsentCategories::default()
        }
    }

    #[test]
    fn init_runs_granted_scripts_in_document_order() {
        let (document, runtime) = page();
        inert(&document, "analytics", "push:1");
        inert(&document, "marketing", "push:99");
        inert(&document, "analytics", "push:2");
        inert(&document, "essential", "push:3");

        let gate = ScriptGate::new(document.clone(), GateOptions::default());
        gate.init(analytics_only());

        assert_eq!(*runtime.order.lock(), vec![1, 2, 3]);
        assert_eq!(gate.get_blocked_scripts().len(), 1);
    }

    #[test]
    fn category_isolation() {
        let (document, runtime) = page();
        let marketing = inert(&document, "marketing", "push:2");
        inert(&document, "analytics", "push:1");

        let gate = ScriptGate::new(document.clone(), GateOptions::default());
        gate.init(analytics_only());
        assert_eq!(*runtime.order.lock(), vec![1]);
        assert_eq!(gate.get_blocked_scripts(), vec![marketing]);
        assert!(!gate.unblock_script(marketing));

        gate.update_consent(ConsentCategories {
            marketing: true,
            ..analytics_only()
        });
        assert_eq!(*runtime.order.lock(), vec![1, 2]);
        assert!(gate.get_blocked_scripts().is_empty());
    }

    #[test]
    fn repeated_updates_execute_each_script_once() {
        let (document, runtime) = page();
        for n in 0..5 {
            inert(&document, "analytics", &format!("push:{n}"));
        }
        let gate = ScriptGate::new(document.clone(), GateOptions::default());
        gate.init(ConsentCategories::essential_only());
        assert_eq!(runtime.count(), 0);

        for _ in 0..4 {
            gate.update_consent(analytics_only());
            gate.process_blocked_scripts();
        }
        document.flush_mutations();
        assert_eq!(*runtime.order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn live_script_keeps_attributes_and_position() {
        let (document, runtime) = page();
        let before = document.create_element("div");
        let after = document.create_element("div");
        let script = document.create_element_with(
            "script",
            &[
                ("type", "text/plain"),
                ("data-category", "analytics"),
                ("src", "https://cdn.example/a.js"),
                ("async", ""),
                ("id", "ga"),
                ("data-domain", "example.org"),
            ],
            "",
        );
        for node in [before, script, after] {
            document.append_child(document.body(), node).expect("append");
        }

        let gate = ScriptGate::new(document.clone(), GateOptions::default());
        gate.init(analytics_only());

        let children = document.children(document.body());
        assert_eq!(children.len(), 3);
        assert_eq!((children[0], children[2]), (before, after));
        let live = children[1];
        assert_ne!(live, script);
        assert_eq!(
            document.attributes(live),
            vec![
                ("src".to_string(), "https://cdn.example/a.js".to_string()),
                ("id".to_string(), "ga".to_string()),
                ("data-domain".to_string(), "example.org".to_string()),
            ]
        );
        assert!(!document.is_connected(script));

        let ran = runtime.ran.lock();
        assert_eq!(ran.len(), 1);
        assert_eq!(
            ran[0].source,
            ScriptSource::Remote {
                src: "https://cdn.example/a.js".to_string(),
                is_async: false
            }
        );
    }

    #[test]
    fn orphan_node_is_appended_to_body() {
        let (document, runtime) = page();
        let orphan = document.create_element_with(
            "script",
            &[("type", "text/plain"), ("data-category", "analytics")],
            "push:7",
        );
        let gate = ScriptGate::new(document.clone(), GateOptions::default());
        gate.init(analytics_only());

        assert!(gate.unblock_script(orphan));
        assert!(!gate.unblock_script(orphan));
        assert_eq!(*runtime.order.lock(), vec![7]);
        let last = document.children(document.body()).pop().expect("live script");
        assert_eq!(document.text(last).as_deref(), Some("push:7"));
    }

    #[test]
    fn empty_inline_script_still_executes() {
        let (document, runtime) = page();
        inert(&document, "analytics", "");
        let gate = ScriptGate::new(document.clone(), GateOptions::default());
        gate.init(analytics_only());

        assert_eq!(runtime.count(), 1);
        assert_eq!(runtime.ran.lock()[0].source, ScriptSource::Inline(String::new()));
        assert!(gate.get_blocked_scripts().is_empty());
    }

    #[test]
    fn unknown_or_missing_category_stays_blocked() {
        let (document, runtime) = page();
        let unknown = inert(&document, "advertising", "push:1");
        let blank = inert(&document, "", "push:2");
        let gate = ScriptGate::new(document.clone(), GateOptions::default());
        gate.init(ConsentCategories::all_granted());

        assert_eq!(runtime.count(), 0);
        assert_eq!(gate.get_blocked_scripts(), vec![unknown, blank]);
        assert!(!gate.unblock_script(unknown));
    }

    #[test]
    fn non_inert_and_missing_nodes_are_ignored() {
        let (document, runtime) = page();
        let div = document.create_element_with("div", &[("data-category", "essential")], "");
        document.append_child(document.body(), div).expect("append");
        let gate = ScriptGate::new(document.clone(), GateOptions::default());
        gate.init(ConsentCategories::all_granted());

        assert!(!gate.unblock_script(div));
        let gone = document.create_element("p");
        document.release(gone).expect("release");
        assert!(!gate.unblock_script(gone));
        assert_eq!(runtime.count(), 0);
    }

    #[test]
    fn consent_before_init_is_essential_only() {
        let (document, _) = page();
        let gate = ScriptGate::new(document, GateOptions::default());
        assert!(gate.is_category_consented(Category::Essential));
        assert!(!gate.is_category_consented(Category::Analytics));

        gate.init(analytics_only());
        assert!(gate.is_category_consented(Category::Analytics));
        assert!(!gate.is_category_consented(Category::Marketing));
    }

    #[test]
    fn second_init_is_ignored() {
        let (document, runtime) = page();
        inert(&document, "marketing", "push:1");
        let gate = ScriptGate::new(document.clone(), GateOptions::default());
        gate.init(ConsentCategories::essential_only());
        gate.init(ConsentCategories::all_granted());

        assert_eq!(runtime.count(), 0);
        assert!(!gate.is_category_consented(Category::Marketing));
        assert_eq!(document.observer_count(), 1);
    }

    #[test]
    fn dynamic_script_runs_after_observation() {
        let (document, runtime) = page();
        let gate = ScriptGate::new(document.clone(), GateOptions::default());
        gate.init(analytics_only());

        inert(&document, "analytics", "push:1");
        assert_eq!(runtime.count(), 0);
        document.flush_mutations();
        assert_eq!(*runtime.order.lock(), vec![1]);
    }

    #[test]
    fn nested_inserted_scripts_run_in_document_order() {
        let (document, runtime) = page();
        let gate = ScriptGate::new(document.clone(), GateOptions::default());
        gate.init(analytics_only());

        let widget = document.create_element("section");
        let inner = document.create_element("div");
        for (parent, body) in [(widget, "push:1"), (inner, "push:2"), (widget, "push:4")] {
            let node = document.create_element_with(
                "script",
                &[("type", "text/plain"), ("data-category", "analytics")],
                body,
            );
            document.append_child(parent, node).expect("append");
        }
        let first = document.children(widget)[0];
        document.insert_before(widget, inner, Some(first)).expect("insert");
        let third = document.create_element_with(
            "script",
            &[("type", "text/plain"), ("data-category", "analytics")],
            "push:3",
        );
        document.insert_before(widget, third, Some(first)).expect("insert");

        document.append_child(document.body(), widget).expect("append");
        let later = document.create_element_with(
            "script",
            &[("type", "text/plain"), ("data-category", "analytics")],
            "push:5",
        );
        document.append_child(document.body(), later).expect("append");
        // Moving it again puts the same node in a second record of the batch.
        document.append_child(document.body(), later).expect("move");
        document.flush_mutations();

        assert_eq!(*runtime.order.lock(), vec![2, 3, 1, 4, 5]);
    }

    #[test]
    fn inserted_scripts_use_current_consent() {
        let (document, runtime) = page();
        let gate = ScriptGate::new(document.clone(), GateOptions::default());
        gate.init(ConsentCategories::essential_only());
        gate.update_consent(analytics_only());

        inert(&document, "analytics", "push:1");
        let marketing = inert(&document, "marketing", "push:2");
        document.flush_mutations();
        assert_eq!(*runtime.order.lock(), vec![1]);
        assert_eq!(gate.get_blocked_scripts(), vec![marketing]);
    }

    #[test]
    fn stopped_observer_leaves_new_scripts_blocked() {
        let (document, runtime) = page();
        let gate = ScriptGate::new(document.clone(), GateOptions::default());
        gate.init(analytics_only());
        gate.stop_observer();
        gate.stop_observer();
        assert!(!gate.is_observing());

        let node = inert(&document, "analytics", "push:1");
        document.flush_mutations();
        assert_eq!(runtime.count(), 0);
        assert_eq!(gate.get_blocked_scripts(), vec![node]);

        assert_eq!(gate.process_blocked_scripts(), 1);
        assert_eq!(*runtime.order.lock(), vec![1]);
    }

    #[test]
    fn restarted_observer_sees_later_insertions() {
        let (document, runtime) = page();
        let gate = ScriptGate::new(
            document.clone(),
            GateOptions {
                observe_dynamic: false,
                ..GateOptions::default()
            },
        );
        gate.init(analytics_only());
        assert!(!gate.is_observing());

        gate.start_observer();
        gate.start_observer();
        assert_eq!(document.observer_count(), 1);
        inert(&document, "analytics", "push:1");
        document.flush_mutations();
        assert_eq!(runtime.count(), 1);
    }

    #[test]
    fn scan_and_mutation_race_runs_once() {
        let (document, runtime) = page();
        let gate = ScriptGate::new(document.clone(), GateOptions::default());
        gate.init(ConsentCategories::essential_only());

        inert(&document, "analytics", "push:1");
        // Scan catches it before the pending mutation batch is delivered.
        gate.update_consent(analytics_only());
        document.flush_mutations();
        assert_eq!(*runtime.order.lock(), vec![1]);
    }

    #[test]
    fn scripts_inserted_by_scripts_are_gated() {
        struct Loader;
        impl ScriptRuntime for Loader {
            fn execute(&self, document: &Document, script: &ScriptInvocation) {
                if script.attribute("id") == Some("loader") {
                    let child = document.create_element_with(
                        "script",
                        &[("type", "text/plain"), ("data-category", "marketing")],
                        "",
                    );
                    document
                        .append_child(document.head(), child)
                        .expect("append");
                }
            }
        }

        let document = Document::new();
        document.set_script_runtime(Arc::new(Loader));
        let loader = document.create_element_with(
            "script",
            &[
                ("type", "text/plain"),
                ("data-category", "analytics"),
                ("id", "loader"),
            ],
            "",
        );
        document.append_child(document.body(), loader).expect("append");

        let gate = ScriptGate::new(document.clone(), GateOptions::default());
        gate.init(analytics_only());
        document.flush_mutations();
        assert_eq!(gate.get_blocked_scripts().len(), 1);

        gate.update_consent(ConsentCategories::all_granted());
        assert!(gate.get_blocked_scripts().is_empty());
    }

    #[test]
    fn custom_markers() {
        let (document, runtime) = page();
        let node = document.create_element_with(
            "script",
            &[("type", "text/x-blocked"), ("data-consent", "analytics")],
            "push:1",
        );
        document.append_child(document.body(), node).expect("append");
        inert(&document, "analytics", "push:2");

        let gate = ScriptGate::new(
            document.clone(),
            GateOptions {
                inert_type: "text/x-blocked".to_string(),
                category_attribute: "data-consent".to_string(),
                observe_dynamic: true,
            },
        );
        gate.init(analytics_only());
        assert_eq!(*runtime.order.lock(), vec![1]);
    }

    #[test]
    fn consent_events_drive_the_gate() {
        let (document, runtime) = page();
        inert(&document, "analytics", "push:1");
        inert(&document, "personalization", "push:2");

        let bus = EventBus::new();
        let storage = ConsentStorage::new(
            Arc::new(MemoryKvStore::new()),
            Arc::new(MemoryCookieJar::new()),
        );
        let manager = ConsentManager::new(storage, bus.clone());
        let gate = ScriptGate::with_event_bus(document.clone(), bus.clone(), GateOptions::default());
        gate.init(manager.effective_categories());
        assert_eq!(runtime.count(), 0);

        manager.set_consent(ConsentSelection {
            analytics: Some(true),
            ..ConsentSelection::default()
        });
        assert_eq!(*runtime.order.lock(), vec![1]);
        assert!(gate.is_category_consented(Category::Analytics));

        // Identical event again does not re-run anything.
        manager.set_consent(ConsentSelection {
            analytics: Some(true),
            ..ConsentSelection::default()
        });
        manager.set_consent(ConsentSelection::accept_all());
        assert_eq!(*runtime.order.lock(), vec![1, 2]);
    }

    #[test]
    fn destroy_detaches_everything_and_allows_reinit() {
        let (document, runtime) = page();
        let bus = EventBus::new();
        let gate = ScriptGate::with_event_bus(document.clone(), bus.clone(), GateOptions::default());
        gate.init(ConsentCategories::essential_only());
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(document.observer_count(), 1);

        let pending = inert(&document, "analytics", "push:1");
        gate.destroy();
        gate.destroy();
        assert!(!gate.is_initialized());
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(document.observer_count(), 0);
        assert!(!gate.is_category_consented(Category::Analytics));

        bus.dispatch(&ConsentEvent::Changed(consent::ConsentChangedDetail {
            categories: ConsentCategories::all_granted(),
            captured_at: 0,
            region: None,
        }));
        document.flush_mutations();
        assert_eq!(runtime.count(), 0);
        assert_eq!(gate.get_blocked_scripts(), vec![pending]);

        gate.init(analytics_only());
        assert_eq!(*runtime.order.lock(), vec![1]);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn dropping_the_gate_unsubscribes() {
        let (document, _) = page();
        let bus = EventBus::new();
        {
            let gate =
                ScriptGate::with_event_bus(document.clone(), bus.clone(), GateOptions::default());
            gate.init(ConsentCategories::essential_only());
        }
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(document.observer_count(), 0);
    }

    #[test]
    fn promoted_nodes_are_released() {
        let (document, runtime) = page();
        let gate = ScriptGate::new(document.clone(), GateOptions::default());
        gate.init(analytics_only());
        let baseline = document.node_count();

        for n in 0..1000 {
            let node = inert(&document, "analytics", &format!("push:{n}"));
            document.flush_mutations();
            assert!(!document.contains(node));
            assert!(!gate.unblock_script(node));
        }

        assert_eq!(runtime.count(), 1000);
        assert!(gate.shared.state.lock().executed.is_empty());
        // Only the live replacements remain.
        assert_eq!(document.node_count(), baseline + 1000);
        assert!(gate.get_blocked_scripts().is_empty());
    }

    #[test]
    fn released_nodes_leave_the_executed_set() {
        let (document, _) = page();
        let gate = ScriptGate::new(document.clone(), GateOptions::default());
        gate.init(analytics_only());
        let node = inert(&document, "analytics", "");
        gate.shared.state.lock().executed.insert(node);
        document.remove(node).expect("remove");
        document.release(node).expect("release detached inert node");

        gate.process_blocked_scripts();
        assert!(gate.shared.state.lock().executed.is_empty());
    }
}
