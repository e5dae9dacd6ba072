//! In-process document model.
//!
//! A small element tree with the DOM behaviour the script gate depends on:
//! - Arena storage with generational `NodeId` handles
//! - Child-list mutation records, queued per observer and delivered only
//!   at `flush_mutations` (the microtask checkpoint)
//! - Script execution when a runnable `<script>` first becomes connected
//!
//! `Document` is a cheap handle. No internal lock is held while observer
//! callbacks or the script runtime run, so both may call back into the
//! document.

mod mutation;
mod node;
mod script;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{DomError, Result};

pub use mutation::{MutationRecord, ObserverId};
pub use node::{ElementRef, NodeId};
pub use script::{is_executable_type, ScriptInvocation, ScriptRuntime, ScriptSource};

use mutation::{MutationCallback, Observer};
use node::{NodeData, Slot};

struct DocumentState {
    slots: Vec<Slot>,
    free: Vec<usize>,
    root: NodeId,
    head: NodeId,
    body: NodeId,
    observers: Vec<Observer>,
    next_observer: u64,
    runtime: Option<Arc<dyn ScriptRuntime>>,
}

impl DocumentState {
    fn new() -> Self {
        let mut state = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId::new(0, 0),
            head: NodeId::new(0, 0),
            body: NodeId::new(0, 0),
            observers: Vec::new(),
            next_observer: 0,
            runtime: None,
        };
        let root = state.alloc(NodeData::new("html"));
        let head = state.alloc(NodeData::new("head"));
        let body = state.alloc(NodeData::new("body"));
        for child in [head, body] {
            if let Some(slot) = state.slots.get_mut(child.index()) {
                if let Some(node) = slot.node.as_mut() {
                    node.parent = Some(root);
                }
            }
            if let Some(node) = state.slots[root.index()].node.as_mut() {
                node.children.push(child);
            }
        }
        state.root = root;
        state.head = head;
        state.body = body;
        state
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.node = Some(data);
            return NodeId::new(index, slot.generation);
        }
        self.slots.push(Slot {
            generation: 0,
            node: Some(data),
        });
        NodeId::new(self.slots.len() - 1, 0)
    }

    fn node(&self, id: NodeId) -> Result<&NodeData> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_ref())
            .ok_or(DomError::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_mut())
            .ok_or(DomError::NodeNotFound(id))
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.node(id).ok().and_then(|data| data.parent);
        }
        false
    }

    fn is_connected(&self, id: NodeId) -> bool {
        self.node(id).is_ok() && self.is_inclusive_ancestor(self.root, id)
    }

    /// Pre-order, including `id` itself.
    fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Ok(data) = self.node(current) else {
                continue;
            };
            out.push(current);
            stack.extend(data.children.iter().rev().copied());
        }
        out
    }

    fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.node(id).ok()?.parent?;
        let siblings = &self.node(parent).ok()?.children;
        let position = siblings.iter().position(|child| *child == id)?;
        siblings.get(position + 1).copied()
    }

    fn queue_record(&mut self, record: MutationRecord) {
        let interested: Vec<usize> = self
            .observers
            .iter()
            .enumerate()
            .filter(|(_, observer)| self.is_inclusive_ancestor(observer.root, record.target))
            .map(|(index, _)| index)
            .collect();
        for index in interested {
            self.observers[index].pending.push(record.clone());
        }
    }

    /// Unlinks `id` from its parent, queueing a removal record.
    fn detach(&mut self, id: NodeId) -> Result<()> {
        let Some(parent) = self.node(id)?.parent else {
            return Ok(());
        };
        self.node_mut(parent)?.children.retain(|child| *child != id);
        self.node_mut(id)?.parent = None;
        self.queue_record(MutationRecord {
            target: parent,
            added: Vec::new(),
            removed: vec![id],
        });
        Ok(())
    }

    fn check_insertable(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.node(parent)?;
        self.node(child)?;
        if self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::HierarchyRequest(format!(
                "cannot insert {child} into its own subtree at {parent}"
            )));
        }
        Ok(())
    }

    fn insert(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<Vec<ScriptInvocation>> {
        self.check_insertable(parent, child)?;
        if let Some(reference) = reference {
            if self.node(reference)?.parent != Some(parent) {
                return Err(DomError::NotAChild {
                    parent,
                    child: reference,
                });
            }
        }
        let reference = if reference == Some(child) {
            self.next_sibling(child)
        } else {
            reference
        };

        self.detach(child)?;
        let children = &mut self.node_mut(parent)?.children;
        let position = match reference {
            Some(reference) => children
                .iter()
                .position(|existing| *existing == reference)
                .ok_or(DomError::NotAChild {
                    parent,
                    child: reference,
                })?,
            None => children.len(),
        };
        children.insert(position, child);
        self.node_mut(child)?.parent = Some(parent);
        self.queue_record(MutationRecord {
            target: parent,
            added: vec![child],
            removed: Vec::new(),
        });
        Ok(self.take_runnable_scripts(child))
    }

    fn replace(&mut self, old: NodeId, new: NodeId) -> Result<Vec<ScriptInvocation>> {
        let parent = self.node(old)?.parent.ok_or_else(|| {
            DomError::HierarchyRequest(format!("{old} has no parent to replace it in"))
        })?;
        if old == new {
            return Ok(Vec::new());
        }
        self.check_insertable(parent, new)?;

        self.detach(new)?;
        let children = &mut self.node_mut(parent)?.children;
        let position = children
            .iter()
            .position(|child| *child == old)
            .ok_or(DomError::NotAChild { parent, child: old })?;
        children[position] = new;
        self.node_mut(old)?.parent = None;
        self.node_mut(new)?.parent = Some(parent);
        self.queue_record(MutationRecord {
            target: parent,
            added: vec![new],
            removed: vec![old],
        });
        Ok(self.take_runnable_scripts(new))
    }

    /// Marks every runnable, not yet started script under a freshly
    /// inserted node as started and returns them in tree order.
    fn take_runnable_scripts(&mut self, inserted: NodeId) -> Vec<ScriptInvocation> {
        if !self.is_connected(inserted) {
            return Vec::new();
        }
        let mut scripts = Vec::new();
        for id in self.descendants(inserted) {
            let Ok(data) = self.node_mut(id) else {
                continue;
            };
            if data.tag != "script"
                || data.script_started
                || !is_executable_type(data.attribute("type"))
            {
                continue;
            }
            data.script_started = true;
            let source = match data.attribute("src") {
                Some(src) => ScriptSource::Remote {
                    src: src.to_string(),
                    is_async: data.attribute("async").is_some(),
                },
                None => ScriptSource::Inline(data.text.clone()),
            };
            scripts.push(ScriptInvocation {
                node: id,
                source,
                attributes: data.attributes.clone(),
            });
        }
        scripts
    }

    fn tree_position(&self, id: NodeId) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut current = id;
        while current != self.root {
            let parent = self.node(current).ok()?.parent?;
            let index = self
                .node(parent)
                .ok()?
                .children
                .iter()
                .position(|child| *child == current)?;
            path.push(index);
            current = parent;
        }
        path.reverse();
        Some(path)
    }
}

/// Shared handle to a document tree.
#[derive(Clone)]
pub struct Document {
    state: Arc<Mutex<DocumentState>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (nodes, observers) = (self.node_count(), self.observer_count());
        f.debug_struct("Document")
            .field("nodes", &nodes)
            .field("observers", &observers)
            .finish()
    }
}

impl Document {
    /// Creates `<html><head></head><body></body></html>`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DocumentState::new())),
        }
    }

    pub fn root(&self) -> NodeId {
        self.state.lock().root
    }

    pub fn head(&self) -> NodeId {
        self.state.lock().head
    }

    pub fn body(&self) -> NodeId {
        self.state.lock().body
    }

    pub fn set_script_runtime(&self, runtime: Arc<dyn ScriptRuntime>) {
        self.state.lock().runtime = Some(runtime);
    }

    // --- Nodes ---

    /// Creates a detached element.
    pub fn create_element(&self, tag: &str) -> NodeId {
        self.state.lock().alloc(NodeData::new(tag))
    }

    /// Creates a detached element with attributes and text content.
    pub fn create_element_with(&self, tag: &str, attributes: &[(&str, &str)], text: &str) -> NodeId {
        let mut data = NodeData::new(tag);
        for (name, value) in attributes {
            data.set_attribute(name, value);
        }
        data.text = text.to_string();
        self.state.lock().alloc(data)
    }

    /// Whether `id` still refers to a live (unreleased) node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.state.lock().node(id).is_ok()
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        self.state.lock().is_connected(id)
    }

    pub fn tag(&self, id: NodeId) -> Option<String> {
        self.state.lock().node(id).ok().map(|data| data.tag.clone())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.state.lock().node(id).ok().and_then(|data| data.parent)
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.state
            .lock()
            .node(id)
            .map(|data| data.children.clone())
            .unwrap_or_default()
    }

    /// `id` and everything below it, in tree order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        self.state.lock().descendants(id)
    }

    /// Elements under `root` (inclusive) accepted by `predicate`, in tree
    /// order. The predicate runs under the document lock and must not call
    /// back into the document.
    pub fn find_all<F>(&self, root: NodeId, predicate: F) -> Vec<NodeId>
    where
        F: Fn(ElementRef<'_>) -> bool,
    {
        let state = self.state.lock();
        state
            .descendants(root)
            .into_iter()
            .filter(|id| {
                state
                    .node(*id)
                    .map(|data| predicate(ElementRef { id: *id, data }))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Child-index path from the root; comparing two paths compares
    /// document order. `None` when the node is not connected.
    pub fn tree_position(&self, id: NodeId) -> Option<Vec<usize>> {
        self.state.lock().tree_position(id)
    }

    // --- Attributes and text ---

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<String> {
        self.state
            .lock()
            .node(id)
            .ok()
            .and_then(|data| data.attribute(name).map(str::to_string))
    }

    pub fn attributes(&self, id: NodeId) -> Vec<(String, String)> {
        self.state
            .lock()
            .node(id)
            .map(|data| data.attributes.clone())
            .unwrap_or_default()
    }

    pub fn set_attribute(&self, id: NodeId, name: &str, value: &str) -> Result<()> {
        self.state.lock().node_mut(id)?.set_attribute(name, value);
        Ok(())
    }

    pub fn remove_attribute(&self, id: NodeId, name: &str) -> Result<bool> {
        Ok(self.state.lock().node_mut(id)?.remove_attribute(name))
    }

    pub fn text(&self, id: NodeId) -> Option<String> {
        self.state.lock().node(id).ok().map(|data| data.text.clone())
    }

    pub fn set_text(&self, id: NodeId, text: &str) -> Result<()> {
        self.state.lock().node_mut(id)?.text = text.to_string();
        Ok(())
    }

    // --- Tree mutation ---

    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.insert_before(parent, child, None)
    }

    /// Inserts `child` under `parent` before `reference` (or last), moving
    /// it from its previous position if it had one.
    pub fn insert_before(
        &self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<()> {
        let scripts = self.state.lock().insert(parent, child, reference)?;
        self.run_scripts(scripts);
        Ok(())
    }

    /// Puts `new` where `old` is. `old` must have a parent.
    pub fn replace_with(&self, old: NodeId, new: NodeId) -> Result<()> {
        let scripts = self.state.lock().replace(old, new)?;
        self.run_scripts(scripts);
        Ok(())
    }

    /// Detaches `id` from its parent. Detached nodes stay alive.
    pub fn remove(&self, id: NodeId) -> Result<()> {
        self.state.lock().detach(id)
    }

    /// Frees a detached subtree. Handles to it become stale.
    pub fn release(&self, id: NodeId) -> Result<()> {
        let mut state = self.state.lock();
        if state.node(id)?.parent.is_some() || id == state.root {
            return Err(DomError::HierarchyRequest(format!(
                "{id} is still attached"
            )));
        }
        for node in state.descendants(id) {
            let index = node.index();
            let slot = &mut state.slots[index];
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            state.free.push(index);
        }
        Ok(())
    }

    // --- Observation ---

    /// Registers `callback` for child-list changes anywhere under `root`.
    pub fn observe<F>(&self, root: NodeId, callback: F) -> Result<ObserverId>
    where
        F: Fn(&Document, &[MutationRecord]) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        state.node(root)?;
        let id = ObserverId(state.next_observer);
        state.next_observer += 1;
        let callback: MutationCallback = Arc::new(callback);
        state.observers.push(Observer {
            id,
            root,
            callback,
            pending: Vec::new(),
        });
        Ok(id)
    }

    /// Stops an observer and drops its undelivered records.
    pub fn disconnect(&self, id: ObserverId) -> bool {
        let mut state = self.state.lock();
        let before = state.observers.len();
        state.observers.retain(|observer| observer.id != id);
        state.observers.len() != before
    }

    /// Live nodes in the arena, attached or not.
    pub fn node_count(&self) -> usize {
        let state = self.state.lock();
        state.slots.len() - state.free.len()
    }

    pub fn observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }

    pub fn has_pending_mutations(&self) -> bool {
        self.state
            .lock()
            .observers
            .iter()
            .any(|observer| !observer.pending.is_empty())
    }

    /// Delivers queued records, one batch per observer, until no observer
    /// has anything pending. Returns the number of callbacks invoked.
    pub fn flush_mutations(&self) -> usize {
        let mut delivered = 0;
        loop {
            let ids: Vec<ObserverId> = self
                .state
                .lock()
                .observers
                .iter()
                .filter(|observer| !observer.pending.is_empty())
                .map(|observer| observer.id)
                .collect();
            if ids.is_empty() {
                return delivered;
            }
            for id in ids {
                // An earlier callback in this round may have disconnected it.
                let batch = {
                    let mut state = self.state.lock();
                    let taken = state
                        .observers
                        .iter_mut()
                        .find(|observer| observer.id == id)
                        .filter(|observer| !observer.pending.is_empty())
                        .map(|observer| {
                            (
                                observer.callback.clone(),
                                std::mem::take(&mut observer.pending),
                            )
                        });
                    taken
                };
                if let Some((callback, records)) = batch {
                    callback(self, records.as_slice());
                    delivered += 1;
                }
            }
        }
    }

    fn run_scripts(&self, scripts: Vec<ScriptInvocation>) {
        if scripts.is_empty() {
            return;
        }
        let runtime = self.state.lock().runtime.clone();
        match runtime {
            Some(runtime) => {
                for script in &scripts {
                    runtime.execute(self, script);
                }
            }
            None => log::debug!("no script runtime installed, {} script(s) skipped", scripts.len()),
        }
    }
}
