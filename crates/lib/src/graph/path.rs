//! Structural paths into an asset graph.
//!
//! An [`AssetPath`] locates a value from the root object of an asset. Collection items
//! are addressed by [`ItemId`], never by position, so a path keeps designating the same
//! item after inserts and removals around it. Positions are only used for items of
//! collections without identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{graph::NodeId, ids::ItemId, index::Index};

/// One step of an [`AssetPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PathSegment {
    /// A member of the current object
    Member(String),
    /// The value of an identifiable collection item
    Item(ItemId),
    /// The key of an identifiable dictionary entry
    Key(ItemId),
    /// An item of a collection without identifiers
    Position(usize),
}

/// Location of a value inside an asset.
///
/// The last segment says what is addressed: a member's content, an item's value, or a
/// dictionary entry's key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct AssetPath(Vec<PathSegment>);

impl AssetPath {
    /// The root object.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    pub fn with_member(mut self, name: impl Into<String>) -> Self {
        self.0.push(PathSegment::Member(name.into()));
        self
    }

    pub fn with_item(mut self, id: ItemId) -> Self {
        self.0.push(PathSegment::Item(id));
        self
    }

    pub fn with_key(mut self, id: ItemId) -> Self {
        self.0.push(PathSegment::Key(id));
        self
    }

    pub fn with_position(mut self, position: usize) -> Self {
        self.0.push(PathSegment::Position(position));
        self
    }

    pub fn push(&mut self, segment: PathSegment) {
        self.0.push(segment);
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    /// The path without its last segment.
    pub fn parent(&self) -> Option<AssetPath> {
        let (_, rest) = self.0.split_last()?;
        Some(AssetPath(rest.to_vec()))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AssetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "(root)");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Member(name) if i == 0 => write!(f, "{name}")?,
                PathSegment::Member(name) => write!(f, ".{name}")?,
                PathSegment::Item(id) => write!(f, "[{id}]")?,
                PathSegment::Key(id) => write!(f, "[{id}]~")?,
                PathSegment::Position(p) => write!(f, "[#{p}]")?,
            }
        }
        Ok(())
    }
}

/// An [`AssetPath`] resolved against a live graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Member node for content paths, collection node for item and key paths, object
    /// node for the root path
    pub node: NodeId,
    pub index: Index,
    /// The path addresses the key of a dictionary entry rather than its value
    pub on_key: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_members_and_items() {
        let path = AssetPath::root()
            .with_member("MyObjects")
            .with_item(ItemId::from_seed(1))
            .with_member("Value");
        assert_eq!(
            path.to_string(),
            "MyObjects[01000000010000000100000001000000].Value"
        );
        assert_eq!(path.parent().map(|p| p.len()), Some(2));
    }

    #[test]
    fn paths_order_by_segments() {
        let a = AssetPath::root().with_member("A");
        let b = AssetPath::root().with_member("B");
        assert!(a < b);
        assert!(AssetPath::root().is_root());
    }
}
