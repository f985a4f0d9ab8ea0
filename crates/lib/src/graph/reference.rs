//! Deciding whether a value is owned or referenced.
//!
//! Every [`Value::Reference`] is a reference. A [`Value::Object`] that carries an
//! identity is ambiguous: it may be a new owned object, or stand for an object that
//! lives elsewhere. The [`ObjectReferencePolicy`] registered for the asset's type
//! settles it. Assets without a registered policy own every object value.

use std::fmt;

use crate::{
    graph::{NodeArena, NodeId},
    index::Index,
    value::Value,
};

/// Classifies identifiable object values written into a slot.
///
/// `holder` is the member or collection node receiving the value and `index` the
/// position inside it ([`Index::Empty`] for a member).
pub trait ObjectReferencePolicy: fmt::Debug {
    fn is_reference(&self, nodes: &NodeArena, holder: NodeId, index: &Index, value: &Value) -> bool;
}

/// Owns every object value.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReferences;

impl ObjectReferencePolicy for NoReferences {
    fn is_reference(&self, _: &NodeArena, _: NodeId, _: &Index, _: &Value) -> bool {
        false
    }
}

/// Treats identifiable objects stored under the named members as references.
///
/// ```
/// use archetype::graph::MemberReferences;
///
/// let policy = MemberReferences::new(["MyReference", "MyReferences"]);
/// assert!(policy.covers("MyReferences"));
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemberReferences {
    members: Vec<String>,
}

impl MemberReferences {
    pub fn new<S: Into<String>>(members: impl IntoIterator<Item = S>) -> Self {
        Self {
            members: members.into_iter().map(Into::into).collect(),
        }
    }

    pub fn covers(&self, member: &str) -> bool {
        self.members.iter().any(|m| m == member)
    }
}

impl ObjectReferencePolicy for MemberReferences {
    fn is_reference(&self, nodes: &NodeArena, holder: NodeId, _: &Index, _: &Value) -> bool {
        owning_member(nodes, holder).is_some_and(|name| self.covers(&name))
    }
}

/// Name of the member a holder belongs to: the member itself, or the member owning the
/// collection.
pub(crate) fn owning_member(nodes: &NodeArena, holder: NodeId) -> Option<String> {
    let mut current = Some(holder);
    while let Some(id) = current {
        let node = nodes.get(id).ok()?;
        if let Some(name) = node.name() {
            return Some(name.to_string());
        }
        if node.as_object().is_some() {
            return None;
        }
        current = node.parent();
    }
    None
}
