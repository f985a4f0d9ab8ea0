//!
//! Archetype: object graphs where assets inherit from other assets.
//!
//! A derived asset starts as a copy of its base (its archetype) and records, value by
//! value, what it overrides. Base edits flow into every value the derived asset still
//! inherits, while overridden values keep their local content. Collections carry a
//! stable identifier per item so that inheritance survives insertions, removals and
//! reordering on either side.
//!
//! ## Core Concepts
//!
//! * **Values (`value::Value`)**: Plain data trees of objects, lists, maps, scalars and
//!   references, used to create assets and to read content back.
//! * **Schema (`schema::TypeRegistry`)**: Explicit descriptions of object types, their
//!   members and the annotations that change override behaviour.
//! * **Graph (`graph::GraphContainer`)**: Owns the node graphs of loaded assets, links
//!   derived nodes to base nodes, tracks override state and propagates base edits.
//! * **Item identifiers (`ids::ItemId`, `collection::CollectionItemIds`)**: Stable
//!   identity for collection items, with tombstones for base items deleted locally.
//! * **Reconciliation (`graph::ReconcileReport`)**: Re-aligns a derived asset with a
//!   base that changed while the derived asset was not loaded.
//! * **Codec (`codec`)**: The indentation-based text form of assets, override markers
//!   included.
//! * **Hierarchies (`hierarchy::CompositeHierarchy`)**: Part trees whose parts can be
//!   instantiated from other assets and keep inheriting from them part by part.

pub mod codec;
pub mod collection;
pub mod config;
pub mod constants;
pub mod graph;
pub mod hierarchy;
pub mod ids;
pub mod index;
pub mod schema;
pub mod value;

/// Re-export the main types for easier access.
pub use graph::{GraphContainer, OverrideType};
pub use index::Index;
pub use value::{Object, Value};

/// Result type used throughout the Archetype library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Archetype library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structured item identifier table errors from the collection module
    #[error(transparent)]
    Collection(collection::CollectionError),

    /// Structured type description errors from the schema module
    #[error(transparent)]
    Schema(schema::SchemaError),

    /// Structured node graph errors from the graph module
    #[error(transparent)]
    Graph(graph::GraphError),

    /// Structured text encoding errors from the codec module
    #[error(transparent)]
    Codec(codec::CodecError),

    /// Structured composite hierarchy errors from the hierarchy module
    #[error(transparent)]
    Hierarchy(hierarchy::HierarchyError),

    /// Identifier parsing errors from the ids module
    #[error(transparent)]
    Id(ids::IdError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Collection(_) => "collection",
            Error::Schema(_) => "schema",
            Error::Graph(_) => "graph",
            Error::Codec(_) => "codec",
            Error::Hierarchy(_) => "hierarchy",
            Error::Id(_) => "ids",
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Collection(err) => err.is_not_found(),
            Error::Schema(err) => err.is_not_found(),
            Error::Graph(err) => err.is_not_found(),
            Error::Hierarchy(err) => err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is an operation that does not fit the content it addresses.
    pub fn is_structural_mismatch(&self) -> bool {
        match self {
            Error::Graph(err) => err.is_structural_mismatch(),
            _ => false,
        }
    }

    /// Check if this error is a value of the wrong kind.
    pub fn is_type_error(&self) -> bool {
        match self {
            Error::Graph(err) => err.is_type_error(),
            Error::Schema(err) => err.is_type_error(),
            _ => false,
        }
    }

    /// Check if this error indicates a conflict (already exists).
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Graph(err) => err.is_conflict(),
            Error::Collection(err) => err.is_collision(),
            _ => false,
        }
    }

    /// Check if this error comes from text that does not follow the encoding.
    pub fn is_malformed_encoding(&self) -> bool {
        match self {
            Error::Codec(err) => err.is_malformed(),
            Error::Id(_) => true,
            _ => false,
        }
    }
}

impl From<collection::CollectionError> for Error {
    fn from(err: collection::CollectionError) -> Self {
        Error::Collection(err)
    }
}

impl From<schema::SchemaError> for Error {
    fn from(err: schema::SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<ids::IdError> for Error {
    fn from(err: ids::IdError) -> Self {
        Error::Id(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_report_their_module() {
        let err: Error = schema::SchemaError::UnknownType {
            name: "Missing".to_string(),
        }
        .into();
        assert_eq!(err.module(), "schema");
        assert!(err.is_not_found());
        assert!(!err.is_structural_mismatch());

        let err: Error = graph::GraphError::NotIndexable {
            node: "MyAsset.MyString".to_string(),
            index: "[0]".to_string(),
        }
        .into();
        assert_eq!(err.module(), "graph");
        assert!(err.is_structural_mismatch());

        let err: Error = codec::CodecError::Malformed {
            line: 3,
            reason: "bad indentation".to_string(),
        }
        .into();
        assert!(err.is_malformed_encoding());
        assert_eq!(err.to_string(), "Malformed document at line 3: bad indentation");
    }

    #[test]
    fn id_errors_convert() {
        let err: Error = "zz".parse::<ids::ItemId>().unwrap_err().into();
        assert_eq!(err.module(), "ids");
        assert!(err.is_malformed_encoding());
    }
}
