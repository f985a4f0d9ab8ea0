//! Uniform addressing of node content.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Addresses a value inside a node.
///
/// - [`Index::Empty`] addresses the node's own value (scalar members, or a whole collection).
/// - [`Index::Position`] addresses an element of a sequence.
/// - [`Index::Key`] addresses an entry of a dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Index {
    #[default]
    Empty,
    Position(usize),
    Key(String),
}

impl Index {
    /// Creates a key index.
    pub fn key(key: impl Into<String>) -> Self {
        Index::Key(key.into())
    }

    /// Returns true for [`Index::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Index::Empty)
    }

    /// Returns the position if this is a sequence index.
    pub fn as_position(&self) -> Option<usize> {
        match self {
            Index::Position(p) => Some(*p),
            _ => None,
        }
    }

    /// Returns the key if this is a dictionary index.
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Index::Key(k) => Some(k),
            _ => None,
        }
    }

    /// Short name of the index kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Index::Empty => "empty",
            Index::Position(_) => "position",
            Index::Key(_) => "key",
        }
    }
}

impl From<usize> for Index {
    fn from(position: usize) -> Self {
        Index::Position(position)
    }
}

impl From<&str> for Index {
    fn from(key: &str) -> Self {
        Index::Key(key.to_string())
    }
}

impl From<String> for Index {
    fn from(key: String) -> Self {
        Index::Key(key)
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Index::Empty => Ok(()),
            Index::Position(p) => write!(f, "[{p}]"),
            Index::Key(k) => write!(f, "[{k}]"),
        }
    }
}
