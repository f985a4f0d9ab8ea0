//! Error types for graph operations.
//!
//! Structural contract violations in direct API calls (indexing scalar content, using
//! a key on a sequence, addressing a missing item) are returned immediately. Recoverable
//! anomalies found while propagating or reconciling are not errors; they are collected in
//! a [`ReconcileReport`](super::ReconcileReport) and logged.

use thiserror::Error;

/// Structured error types for node graph operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GraphError {
    /// An indexed operation targeted content that is not a sequence or dictionary
    #[error("Node {node} is not indexable (index {index})")]
    NotIndexable { node: String, index: String },

    /// The index kind does not fit the content (a key on a sequence, a position on a
    /// dictionary, an empty index where an item is required)
    #[error("Node {node} expects a {expected} index, found {actual}")]
    IndexKindMismatch {
        node: String,
        expected: &'static str,
        actual: String,
    },

    /// Sequence position past the end
    #[error("Index {index} is out of range for {len} items in {node}")]
    IndexOutOfRange {
        node: String,
        index: usize,
        len: usize,
    },

    /// Dictionary key not present
    #[error("Key {key} not found in {node}")]
    KeyNotFound { node: String, key: String },

    /// Dictionary key already present
    #[error("Key {key} already exists in {node}")]
    DuplicateKey { node: String, key: String },

    /// The node id does not designate a live node
    #[error("Node not found: {node}")]
    NodeNotFound { node: String },

    /// The object has no member with this name
    #[error("Type {type_name} has no member {member}")]
    MemberNotFound { type_name: String, member: String },

    /// No graph is registered for the asset
    #[error("Asset not found: {asset}")]
    AssetNotFound { asset: String },

    /// A graph is already registered for the asset
    #[error("Asset already exists: {asset}")]
    AssetAlreadyExists { asset: String },

    /// A value of the wrong kind for the slot
    #[error("Type mismatch at {node}: expected {expected}, found {actual}")]
    TypeMismatch {
        node: String,
        expected: String,
        actual: String,
    },

    /// The operation needs a base link the node does not have
    #[error("Node {node} has no base")]
    NoBase { node: String },

    /// The requested base cannot be used
    #[error("Invalid base for {asset}: {reason}")]
    InvalidBase { asset: String, reason: String },

    /// The operation needs a collection
    #[error("Node {node} is not a collection")]
    NotACollection { node: String },

    /// The item identifier is not live in the collection
    #[error("Item {item_id} not found in {node}")]
    UnknownItemId { node: String, item_id: String },

    /// A path did not resolve against the graph
    #[error("Path {path} does not resolve: {reason}")]
    PathNotFound { path: String, reason: String },

    /// The node arena cannot address another slot
    #[error("Node arena exhausted at {capacity} slots")]
    ArenaExhausted { capacity: usize },
}

impl GraphError {
    /// Check if this error indicates a resource was not found
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GraphError::KeyNotFound { .. }
                | GraphError::NodeNotFound { .. }
                | GraphError::MemberNotFound { .. }
                | GraphError::AssetNotFound { .. }
                | GraphError::UnknownItemId { .. }
                | GraphError::PathNotFound { .. }
        )
    }

    /// Check if this error is a structural mismatch between an operation and the content
    /// it addresses
    pub fn is_structural_mismatch(&self) -> bool {
        matches!(
            self,
            GraphError::NotIndexable { .. }
                | GraphError::IndexKindMismatch { .. }
                | GraphError::NotACollection { .. }
        )
    }

    /// Check if this error is related to type mismatches
    pub fn is_type_error(&self) -> bool {
        matches!(self, GraphError::TypeMismatch { .. })
    }

    /// Check if this error indicates a conflict (already exists)
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            GraphError::DuplicateKey { .. }
                | GraphError::AssetAlreadyExists { .. }
                | GraphError::InvalidBase { .. }
        )
    }
}

impl From<GraphError> for crate::Error {
    fn from(err: GraphError) -> Self {
        crate::Error::Graph(err)
    }
}
