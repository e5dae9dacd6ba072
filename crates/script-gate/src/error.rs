use crate::document::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Node {child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },

    #[error("Hierarchy request error: {0}")]
    HierarchyRequest(String),
}

pub type Result<T> = std::result::Result<T, DomError>;
