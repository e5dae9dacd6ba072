//! Mutation records and observer registrations.

use std::sync::Arc;

use super::{Document, NodeId};

/// One child-list change under `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

/// Handle returned by [`Document::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);

pub(crate) type MutationCallback = Arc<dyn Fn(&Document, &[MutationRecord]) + Send + Sync>;

pub(crate) struct Observer {
    pub id: ObserverId,
    /// Subtree root; records whose target is inside it are queued.
    pub root: NodeId,
    pub callback: MutationCallback,
    pub pending: Vec<MutationRecord>,
}
