//! Nodes and the node arena.
//!
//! Every node of every graph lives in one [`NodeArena`] owned by the
//! [`GraphContainer`](super::GraphContainer). Links between nodes (parent, base, owned
//! content, references) are [`NodeId`] indices into the arena, never owning pointers, so
//! cycles through references and base links cost nothing at teardown.
//!
//! There are three kinds of nodes:
//!
//! - **member** nodes: one named member of an object, holding a single [`Slot`]
//! - **object** nodes: an object instance with its member nodes
//! - **collection** nodes: a sequence or dictionary of slots, with the
//!   [`CollectionItemIds`] table of its items
//!
//! An object instance has exactly one node. A slot either owns the node it points to
//! ([`Slot::Owned`]) or merely references it ([`Slot::Reference`]).

use std::fmt;

use crate::{
    collection::CollectionItemIds,
    graph::{GraphError, overrides::OverrideState},
    ids::{AssetId, ItemId, ObjectId},
    index::Index,
    schema::ValueKind,
    value::Value,
};

/// Index of a node in the arena.
///
/// Vacated arena slots are reused, so an id also carries the generation of its slot.
/// An id kept past the removal of its node never designates the node that reuses the
/// slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.generation {
            0 => write!(f, "#{}", self.index),
            generation => write!(f, "#{}v{}", self.index, generation),
        }
    }
}

/// The content of one value position: a member's value or a collection item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    /// An object or collection owned by this slot
    Owned(NodeId),
    /// An identifiable object owned elsewhere
    Reference(NodeId),
}

impl Slot {
    pub fn is_null(&self) -> bool {
        matches!(self, Slot::Null)
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Slot::Bool(_) | Slot::Int(_) | Slot::Text(_))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Slot::Reference(_))
    }

    pub fn owned(&self) -> Option<NodeId> {
        match self {
            Slot::Owned(id) => Some(*id),
            _ => None,
        }
    }

    pub fn reference(&self) -> Option<NodeId> {
        match self {
            Slot::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// The node this slot points to, owned or referenced.
    pub fn target(&self) -> Option<NodeId> {
        match self {
            Slot::Owned(id) | Slot::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Converts a scalar or null value into a slot.
    pub(crate) fn from_scalar(value: &Value) -> Option<Slot> {
        match value {
            Value::Null => Some(Slot::Null),
            Value::Bool(b) => Some(Slot::Bool(*b)),
            Value::Int(n) => Some(Slot::Int(*n)),
            Value::Text(s) => Some(Slot::Text(s.clone())),
            _ => None,
        }
    }

    /// Converts a scalar or null slot back into a value.
    pub(crate) fn scalar_value(&self) -> Option<Value> {
        match self {
            Slot::Null => Some(Value::Null),
            Slot::Bool(b) => Some(Value::Bool(*b)),
            Slot::Int(n) => Some(Value::Int(*n)),
            Slot::Text(s) => Some(Value::Text(s.clone())),
            _ => None,
        }
    }
}

/// A named member of an object.
#[derive(Debug, Clone)]
pub struct MemberNode {
    pub(crate) name: String,
    pub(crate) kind: ValueKind,
    pub(crate) slot: Slot,
    pub(crate) non_identifiable_items: bool,
}

impl MemberNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared kind of the member.
    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn slot(&self) -> &Slot {
        &self.slot
    }
}

/// An object instance.
#[derive(Debug, Clone)]
pub struct ObjectNode {
    pub(crate) type_name: String,
    pub(crate) identity: Option<ObjectId>,
    pub(crate) members: Vec<NodeId>,
}

impl ObjectNode {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn identity(&self) -> Option<ObjectId> {
        self.identity
    }

    /// Member nodes in declaration order.
    pub fn members(&self) -> &[NodeId] {
        &self.members
    }
}

/// Items of a collection node.
#[derive(Debug, Clone)]
pub enum Items {
    Sequence(Vec<Slot>),
    Dictionary(Vec<(String, Slot)>),
}

/// A sequence or dictionary.
#[derive(Debug, Clone)]
pub struct CollectionNode {
    pub(crate) element: ValueKind,
    pub(crate) identifiable: bool,
    pub(crate) items: Items,
    pub(crate) ids: CollectionItemIds,
}

impl CollectionNode {
    pub fn element(&self) -> &ValueKind {
        &self.element
    }

    /// Whether items carry stable identifiers.
    pub fn is_identifiable(&self) -> bool {
        self.identifiable
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self.items, Items::Sequence(_))
    }

    pub fn ids(&self) -> &CollectionItemIds {
        &self.ids
    }

    pub fn len(&self) -> usize {
        match &self.items {
            Items::Sequence(items) => items.len(),
            Items::Dictionary(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index kind expected by this collection.
    pub(crate) fn index_kind(&self) -> &'static str {
        if self.is_sequence() { "position" } else { "key" }
    }

    /// Storage offset of `index`, if the item exists.
    pub(crate) fn offset(&self, index: &Index) -> Option<usize> {
        match (&self.items, index) {
            (Items::Sequence(items), Index::Position(p)) => (*p < items.len()).then_some(*p),
            (Items::Dictionary(entries), Index::Key(k)) => {
                entries.iter().position(|(key, _)| key == k)
            }
            _ => None,
        }
    }

    /// Returns true if the index kind fits this collection.
    pub(crate) fn accepts_index(&self, index: &Index) -> bool {
        matches!(
            (&self.items, index),
            (Items::Sequence(_), Index::Position(_)) | (Items::Dictionary(_), Index::Key(_))
        )
    }

    pub fn slot(&self, index: &Index) -> Option<&Slot> {
        let offset = self.offset(index)?;
        match &self.items {
            Items::Sequence(items) => items.get(offset),
            Items::Dictionary(entries) => entries.get(offset).map(|(_, slot)| slot),
        }
    }

    pub(crate) fn slot_mut(&mut self, index: &Index) -> Option<&mut Slot> {
        let offset = self.offset(index)?;
        match &mut self.items {
            Items::Sequence(items) => items.get_mut(offset),
            Items::Dictionary(entries) => entries.get_mut(offset).map(|(_, slot)| slot),
        }
    }

    /// Indices of all items in storage order.
    pub fn indices(&self) -> Vec<Index> {
        match &self.items {
            Items::Sequence(items) => (0..items.len()).map(Index::Position).collect(),
            Items::Dictionary(entries) => entries
                .iter()
                .map(|(key, _)| Index::Key(key.clone()))
                .collect(),
        }
    }

    /// Items in storage order.
    pub fn slots(&self) -> Vec<(Index, &Slot)> {
        match &self.items {
            Items::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(p, slot)| (Index::Position(p), slot))
                .collect(),
            Items::Dictionary(entries) => entries
                .iter()
                .map(|(key, slot)| (Index::Key(key.clone()), slot))
                .collect(),
        }
    }

    /// Current index of a live item.
    pub fn index_of(&self, id: ItemId) -> Option<Index> {
        self.ids.key_of(id).cloned()
    }

    /// Identifier of the item at `index`.
    pub fn id_at(&self, index: &Index) -> Option<ItemId> {
        self.ids.get(index)
    }

    /// Inserts a slot. Sequences shift later items; dictionaries append.
    pub(crate) fn insert_slot(&mut self, index: &Index, slot: Slot) {
        match (&mut self.items, index) {
            (Items::Sequence(items), Index::Position(p)) => items.insert((*p).min(items.len()), slot),
            (Items::Dictionary(entries), Index::Key(k)) => entries.push((k.clone(), slot)),
            _ => {}
        }
    }

    /// Removes and returns the slot at `index`.
    pub(crate) fn remove_slot(&mut self, index: &Index) -> Option<Slot> {
        let offset = self.offset(index)?;
        match &mut self.items {
            Items::Sequence(items) => Some(items.remove(offset)),
            Items::Dictionary(entries) => Some(entries.remove(offset).1),
        }
    }

    /// Changes the key of a dictionary entry in place.
    pub(crate) fn rename_slot(&mut self, from: &str, to: &str) -> bool {
        if let Items::Dictionary(entries) = &mut self.items
            && let Some(entry) = entries.iter_mut().find(|(key, _)| key == from)
        {
            entry.0 = to.to_string();
            return true;
        }
        false
    }
}

/// The three kinds of nodes.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Member(MemberNode),
    Object(ObjectNode),
    Collection(CollectionNode),
}

/// A node of an asset graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) asset: AssetId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind,
    pub(crate) base: Option<NodeId>,
    pub(crate) overrides: OverrideState,
    pub(crate) can_override: bool,
}

impl Node {
    pub(crate) fn new(asset: AssetId, parent: Option<NodeId>, kind: NodeKind, can_override: bool) -> Self {
        Self {
            asset,
            parent,
            kind,
            base: None,
            overrides: OverrideState::default(),
            can_override,
        }
    }

    /// The asset whose graph owns this node.
    pub fn asset(&self) -> AssetId {
        self.asset
    }

    /// The owning node: the object of a member, the member or collection owning an
    /// object or collection.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// The corresponding node of the base graph.
    pub fn base(&self) -> Option<NodeId> {
        self.base
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// False for members declared non-overridable and everything below them.
    pub fn can_override(&self) -> bool {
        self.can_override
    }

    pub fn overrides(&self) -> &OverrideState {
        &self.overrides
    }

    pub fn as_member(&self) -> Option<&MemberNode> {
        match &self.kind {
            NodeKind::Member(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectNode> {
        match &self.kind {
            NodeKind::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&CollectionNode> {
        match &self.kind {
            NodeKind::Collection(c) => Some(c),
            _ => None,
        }
    }

    pub(crate) fn as_collection_mut(&mut self) -> Option<&mut CollectionNode> {
        match &mut self.kind {
            NodeKind::Collection(c) => Some(c),
            _ => None,
        }
    }

    /// Member name, for member nodes.
    pub fn name(&self) -> Option<&str> {
        self.as_member().map(MemberNode::name)
    }

    /// Type name, for object nodes.
    pub fn type_name(&self) -> Option<&str> {
        self.as_object().map(ObjectNode::type_name)
    }

    /// Identity, for identifiable object nodes.
    pub fn identity(&self) -> Option<ObjectId> {
        self.as_object().and_then(ObjectNode::identity)
    }
}

/// One arena slot. The generation is bumped each time the slot is vacated.
#[derive(Debug)]
struct Entry {
    generation: u32,
    node: Option<Node>,
}

/// Storage for the nodes of every graph of a container.
#[derive(Debug, Default)]
pub struct NodeArena {
    entries: Vec<Entry>,
    vacant: Vec<u32>,
}

impl NodeArena {
    pub(crate) fn alloc(&mut self, node: Node) -> Result<NodeId, GraphError> {
        if let Some(index) = self.vacant.pop() {
            let entry = &mut self.entries[index as usize];
            entry.node = Some(node);
            return Ok(NodeId {
                index,
                generation: entry.generation,
            });
        }
        let index = u32::try_from(self.entries.len()).map_err(|_| GraphError::ArenaExhausted {
            capacity: self.entries.len(),
        })?;
        self.entries.push(Entry {
            generation: 0,
            node: Some(node),
        });
        Ok(NodeId {
            index,
            generation: 0,
        })
    }

    fn entry(&self, id: NodeId) -> Option<&Entry> {
        self.entries
            .get(id.index())
            .filter(|entry| entry.generation == id.generation)
    }

    fn entry_mut(&mut self, id: NodeId) -> Option<&mut Entry> {
        self.entries
            .get_mut(id.index())
            .filter(|entry| entry.generation == id.generation)
    }

    /// Returns true if `id` designates a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.entry(id).is_some_and(|entry| entry.node.is_some())
    }

    pub fn get(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.entry(id)
            .and_then(|entry| entry.node.as_ref())
            .ok_or_else(|| GraphError::NodeNotFound {
                node: id.to_string(),
            })
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.entry_mut(id)
            .and_then(|entry| entry.node.as_mut())
            .ok_or_else(|| GraphError::NodeNotFound {
                node: id.to_string(),
            })
    }

    /// Removes a node and makes its slot available to later allocations.
    pub(crate) fn free(&mut self, id: NodeId) -> Option<Node> {
        let entry = self.entry_mut(id)?;
        let node = entry.node.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.vacant.push(id.index);
        Some(node)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.entries.len() - self.vacant.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots ever allocated, live or vacant.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Live nodes with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.entries.iter().enumerate().filter_map(|(i, entry)| {
            entry.node.as_ref().map(|n| {
                (
                    NodeId {
                        index: i as u32,
                        generation: entry.generation,
                    },
                    n,
                )
            })
        })
    }

    /// Nodes directly owned by `id`: a member's owned target, an object's members, a
    /// collection's owned items.
    pub fn owned_children(&self, id: NodeId) -> Vec<NodeId> {
        let Ok(node) = self.get(id) else {
            return Vec::new();
        };
        match &node.kind {
            NodeKind::Member(m) => m.slot.owned().into_iter().collect(),
            NodeKind::Object(o) => o.members.clone(),
            NodeKind::Collection(c) => c
                .slots()
                .into_iter()
                .filter_map(|(_, slot)| slot.owned())
                .collect(),
        }
    }

    /// `id` and every node it owns, transitively, in pre-order.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if !self.contains(next) {
                continue;
            }
            result.push(next);
            let mut children = self.owned_children(next);
            children.reverse();
            stack.extend(children);
        }
        result
    }

    /// Member node of an object by name. A member node holding an object is followed to
    /// its target first.
    pub fn member(&self, node: NodeId, name: &str) -> Result<NodeId, GraphError> {
        let object = self.object_of(node)?;
        let object_node = self.get(object)?;
        let Some(o) = object_node.as_object() else {
            return Err(GraphError::MemberNotFound {
                type_name: self.describe(object),
                member: name.to_string(),
            });
        };
        o.members
            .iter()
            .copied()
            .find(|m| self.get(*m).ok().and_then(Node::name) == Some(name))
            .ok_or_else(|| GraphError::MemberNotFound {
                type_name: o.type_name.clone(),
                member: name.to_string(),
            })
    }

    /// Resolves a member node to the object it points to; other nodes resolve to
    /// themselves.
    pub fn object_of(&self, node: NodeId) -> Result<NodeId, GraphError> {
        let n = self.get(node)?;
        match &n.kind {
            NodeKind::Member(m) => m.slot.target().ok_or_else(|| GraphError::NodeNotFound {
                node: format!("{} (null member)", self.path_of(node)),
            }),
            _ => Ok(node),
        }
    }

    /// Resolves a node to the collection it designates: the node itself, or the owned
    /// collection of a member.
    pub fn collection_of(&self, node: NodeId) -> Option<NodeId> {
        let n = self.get(node).ok()?;
        match &n.kind {
            NodeKind::Collection(_) => Some(node),
            NodeKind::Member(m) => m
                .slot
                .owned()
                .filter(|t| matches!(self.get(*t).map(|t| &t.kind), Ok(NodeKind::Collection(_)))),
            NodeKind::Object(_) => None,
        }
    }

    /// Index under which `child` is stored in its parent collection.
    pub fn index_in_parent(&self, child: NodeId) -> Option<Index> {
        let parent = self.get(child).ok()?.parent?;
        let collection = self.get(parent).ok()?.as_collection()?;
        collection
            .slots()
            .into_iter()
            .find(|(_, slot)| slot.owned() == Some(child))
            .map(|(index, _)| index)
    }

    /// Human readable location of a node, for logs and errors.
    pub fn path_of(&self, id: NodeId) -> String {
        let mut segments: Vec<String> = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let Ok(node) = self.get(node_id) else {
                break;
            };
            match &node.kind {
                NodeKind::Member(m) => segments.push(format!(".{}", m.name)),
                NodeKind::Object(_) | NodeKind::Collection(_) => {
                    if let Some(index) = self.index_in_parent(node_id) {
                        segments.push(index.to_string());
                    }
                }
            }
            current = node.parent;
        }
        let path: String = segments.into_iter().rev().collect();
        let path = path.trim_start_matches('.').to_string();
        if path.is_empty() {
            "(root)".to_string()
        } else {
            path
        }
    }

    fn describe(&self, id: NodeId) -> String {
        match self.get(id).map(|n| &n.kind) {
            Ok(NodeKind::Object(o)) => o.type_name.clone(),
            Ok(NodeKind::Collection(c)) => format!("collection of {}", c.element),
            Ok(NodeKind::Member(m)) => m.name.clone(),
            Err(_) => id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str) -> Node {
        Node::new(
            AssetId::from_seed(1),
            None,
            NodeKind::Member(MemberNode {
                name: name.to_string(),
                kind: ValueKind::Int,
                slot: Slot::Null,
                non_identifiable_items: false,
            }),
            true,
        )
    }

    #[test]
    fn freed_slots_are_reused_under_a_new_generation() {
        let mut arena = NodeArena::default();
        let first = arena.alloc(member("First")).unwrap();
        let second = arena.alloc(member("Second")).unwrap();
        assert!(arena.free(first).is_some());
        assert!(arena.free(first).is_none());

        let third = arena.alloc(member("Third")).unwrap();
        assert_eq!(third.index(), first.index());
        assert_ne!(third, first);
        assert_eq!(arena.capacity(), 2);
        assert_eq!(arena.len(), 2);

        assert!(!arena.contains(first));
        assert!(arena.get(first).is_err());
        assert_eq!(arena.get(third).unwrap().name(), Some("Third"));
        assert_eq!(arena.get(second).unwrap().name(), Some("Second"));
        assert_eq!(arena.iter().map(|(id, _)| id).collect::<Vec<_>>(), vec![third, second]);
    }
}
