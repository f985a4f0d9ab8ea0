//! The container owning every asset graph.
//!
//! A [`GraphContainer`] holds one node arena shared by all of its assets, so base links
//! and references between assets are plain [`NodeId`]s. Each asset is described by an
//! [`AssetPropertyGraph`]: its root node, its optional base, its pool of identifiable
//! objects and its custom base links.
//!
//! Local edits, propagation and reconciliation are implemented on the container in the
//! sibling modules; this module holds construction, the asset lifecycle, navigation and
//! the structural helpers they share.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{
    Result,
    collection::CollectionItemIds,
    config::GraphConfig,
    graph::{
        GraphError, NodeArena, NodeId, ObjectReferencePolicy,
        build::{BuildContext, BuildMode},
        node::{CollectionNode, Node, NodeKind, Slot},
        path::{AssetPath, PathSegment, ResolvedPath},
    },
    ids::{AssetId, IdGenerator, ObjectId},
    index::Index,
    schema::TypeRegistry,
    value::{Object, Value},
};

/// The base of a derived asset: which asset, and where its document lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseReference {
    pub asset: AssetId,
    /// Location of the base document, relative to the derived one
    pub location: String,
}

impl BaseReference {
    pub fn new(asset: AssetId, location: impl Into<String>) -> Self {
        Self {
            asset,
            location: location.into(),
        }
    }
}

/// One asset in a container.
#[derive(Debug, Clone)]
pub struct AssetPropertyGraph {
    pub(crate) id: AssetId,
    pub(crate) type_name: String,
    pub(crate) root: NodeId,
    pub(crate) base: Option<BaseReference>,
    /// Derived node to base node, consulted before structural matching
    pub(crate) custom_links: HashMap<NodeId, NodeId>,
    /// Identifiable objects owned by this asset
    pub(crate) objects: HashMap<ObjectId, NodeId>,
}

impl AssetPropertyGraph {
    pub fn id(&self) -> AssetId {
        self.id
    }

    /// Type of the root object.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn base(&self) -> Option<&BaseReference> {
        self.base.as_ref()
    }

    /// Explicitly registered base links.
    pub fn custom_links(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.custom_links.iter().map(|(d, b)| (*d, *b))
    }

    /// Number of identifiable objects owned by the asset.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

/// A node that was removed from the arena, remembered so references to it can be
/// rebound.
#[derive(Debug, Clone)]
pub(crate) struct FreedNode {
    pub(crate) node: NodeId,
    pub(crate) asset: AssetId,
    pub(crate) identity: Option<ObjectId>,
}

/// Owner of the node arena and of every asset graph.
///
/// All operations are synchronous. An edit on a base asset is pushed to its derived
/// assets before the call returns, so its cost grows with the number of dependents.
///
/// # Example
///
/// ```
/// use archetype::graph::GraphContainer;
/// use archetype::ids::AssetId;
/// use archetype::schema::{MemberDescriptor, TypeDescriptor, TypeRegistry};
/// use archetype::{Index, Object};
///
/// let mut registry = TypeRegistry::new();
/// registry.register(TypeDescriptor::new("MyAsset").member(MemberDescriptor::text("MyString")))?;
/// let mut container = GraphContainer::new(registry);
///
/// let base = AssetId::new_random();
/// let derived = AssetId::new_random();
/// container.create_asset(base, Object::new("MyAsset").with("MyString", "String"))?;
/// container.derive_asset(base, derived, "base.asset")?;
///
/// let base_member = container.child(container.root(base)?, "MyString")?;
/// container.update(base_member, "MyBaseString", Index::Empty)?;
///
/// let derived_member = container.child(container.root(derived)?, "MyString")?;
/// assert!(container.retrieve(derived_member, Index::Empty)? == "MyBaseString");
/// # Ok::<(), archetype::Error>(())
/// ```
#[derive(Debug)]
pub struct GraphContainer {
    pub(crate) nodes: NodeArena,
    pub(crate) registry: TypeRegistry,
    pub(crate) config: GraphConfig,
    pub(crate) ids: Box<dyn IdGenerator>,
    pub(crate) policies: HashMap<String, Arc<dyn ObjectReferencePolicy>>,
    pub(crate) graphs: BTreeMap<AssetId, AssetPropertyGraph>,
    /// Base node to the derived nodes linked to it
    pub(crate) dependents: HashMap<NodeId, Vec<NodeId>>,
    /// References nulled by node removals, collected while a reconciliation runs
    pub(crate) broken_references: Option<Vec<(String, ObjectId)>>,
}

impl GraphContainer {
    /// Creates an empty container with the default configuration.
    pub fn new(registry: TypeRegistry) -> Self {
        Self::with_config(registry, GraphConfig::default())
    }

    pub fn with_config(registry: TypeRegistry, config: GraphConfig) -> Self {
        let ids = config.id_allocation.generator();
        Self {
            nodes: NodeArena::default(),
            registry,
            config,
            ids,
            policies: HashMap::new(),
            graphs: BTreeMap::new(),
            dependents: HashMap::new(),
            broken_references: None,
        }
    }

    /// Registers the reference policy used by assets whose root has type `asset_type`.
    ///
    /// The policy applies to content built after the call.
    pub fn register_reference_policy(
        &mut self,
        asset_type: impl Into<String>,
        policy: impl ObjectReferencePolicy + 'static,
    ) {
        self.policies.insert(asset_type.into(), Arc::new(policy));
    }

    pub fn nodes(&self) -> &NodeArena {
        &self.nodes
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        Ok(self.nodes.get(id)?)
    }

    pub fn graph(&self, asset: AssetId) -> Result<&AssetPropertyGraph> {
        self.graphs.get(&asset).ok_or_else(|| {
            GraphError::AssetNotFound {
                asset: asset.to_string(),
            }
            .into()
        })
    }

    pub(crate) fn graph_mut(&mut self, asset: AssetId) -> Result<&mut AssetPropertyGraph> {
        self.graphs.get_mut(&asset).ok_or_else(|| {
            GraphError::AssetNotFound {
                asset: asset.to_string(),
            }
            .into()
        })
    }

    /// Ids of every asset in the container, in ascending order.
    pub fn assets(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.graphs.keys().copied()
    }

    pub fn contains_asset(&self, asset: AssetId) -> bool {
        self.graphs.contains_key(&asset)
    }

    // ===== Asset lifecycle =====

    /// Creates a new asset from plain data.
    ///
    /// Members missing from `root` take their declared defaults, identifiable objects
    /// without an identity receive a fresh one and collection items without an
    /// identifier receive a fresh [`ItemId`](crate::ids::ItemId).
    ///
    /// # Returns
    /// The root object node of the new graph.
    pub fn create_asset(&mut self, id: AssetId, root: Object) -> Result<NodeId> {
        self.registry.check(&root)?;
        self.insert_graph(id, root, None, BuildMode::Local)
    }

    /// Creates `id` as a derived copy of `base`.
    ///
    /// Item identifiers and object identities are kept so the copy lines up with its
    /// base; tombstones and override flags of the base are not carried over. The new
    /// graph is linked to the base and starts fully inherited.
    ///
    /// # Arguments
    /// * `base` - The asset to derive from
    /// * `id` - Id of the new asset
    /// * `location` - Location of the base document, recorded in the base reference
    pub fn derive_asset(
        &mut self,
        base: AssetId,
        id: AssetId,
        location: impl Into<String>,
    ) -> Result<NodeId> {
        let base_root = self.graph(base)?.root;
        let Value::Object(root) = self.nodes.snapshot(base_root, false) else {
            return Err(GraphError::NodeNotFound {
                node: base_root.to_string(),
            }
            .into());
        };
        let reference = BaseReference::new(base, location);
        let root_node = self.insert_graph(id, root, Some(reference), BuildMode::CloneFromBase)?;
        self.refresh_base(id)?;
        tracing::debug!(asset = %id, base = %base, "derived asset created");
        Ok(root_node)
    }

    /// Drops an asset and every node it owns.
    ///
    /// Assets derived from it keep their base reference but lose their links until the
    /// base is loaded again. References into the removed asset become null.
    pub fn remove_asset(&mut self, id: AssetId) -> Result<()> {
        let root = self.graph(id)?.root;
        let freed = self.free_subtree(root);
        self.graphs.remove(&id);
        self.rebind_references(&freed);
        tracing::debug!(asset = %id, nodes = freed.len(), "asset removed");
        Ok(())
    }

    /// Builds a graph for `root` and registers it under `id`.
    pub(crate) fn insert_graph(
        &mut self,
        id: AssetId,
        mut root: Object,
        base: Option<BaseReference>,
        mode: BuildMode,
    ) -> Result<NodeId> {
        if self.graphs.contains_key(&id) {
            return Err(GraphError::AssetAlreadyExists {
                asset: id.to_string(),
            }
            .into());
        }
        let type_name = root.type_name().to_string();
        let identifiable = self.registry.get(&type_name)?.identifiable;
        root.set_id(identifiable.then(|| ObjectId::from(*id.as_uuid())));

        let mut ctx = BuildContext::new(id, &type_name, mode, &self.policies);
        let root_node = self.build_object(&mut ctx, None, root, true)?;
        self.graphs.insert(
            id,
            AssetPropertyGraph {
                id,
                type_name: type_name.clone(),
                root: root_node,
                base,
                custom_links: HashMap::new(),
                objects: HashMap::new(),
            },
        );
        self.finish_build(ctx)?;
        tracing::debug!(asset = %id, type_name = %type_name, "asset graph built");
        Ok(root_node)
    }

    // ===== Navigation =====

    /// Root object node of an asset.
    pub fn root(&self, asset: AssetId) -> Result<NodeId> {
        Ok(self.graph(asset)?.root)
    }

    /// Member node `name` of an object. A member node holding an object is followed to
    /// its target first, so `child(child(root, "A")?, "B")` walks `A.B`.
    pub fn child(&self, node: NodeId, name: &str) -> Result<NodeId> {
        Ok(self.nodes.member(node, name)?)
    }

    /// The object or collection a member points to.
    pub fn target(&self, member: NodeId) -> Result<Option<NodeId>> {
        let node = self.nodes.get(member)?;
        Ok(node.as_member().and_then(|m| m.slot.target()))
    }

    /// The object or collection stored at `index` of a collection.
    pub fn indexed_target(&self, node: NodeId, index: &Index) -> Result<Option<NodeId>> {
        let collection = self.indexable(node, index)?;
        self.require_item(collection, index)?;
        Ok(self.slot(collection, index)?.target())
    }

    /// Identifiable object of an asset by identity.
    pub fn find_object(&self, asset: AssetId, id: ObjectId) -> Option<NodeId> {
        self.pooled(asset, id)
    }

    /// Resolves a structural path against an asset.
    pub fn node_at(&self, asset: AssetId, path: &AssetPath) -> Result<ResolvedPath> {
        let not_found = |reason: String| GraphError::PathNotFound {
            path: path.to_string(),
            reason,
        };
        let mut current = self.graph(asset)?.root;
        let segments = path.segments();
        if segments.is_empty() {
            return Ok(ResolvedPath {
                node: current,
                index: Index::Empty,
                on_key: false,
            });
        }
        for (i, segment) in segments.iter().enumerate() {
            let last = i + 1 == segments.len();
            let (collection, index) = match segment {
                PathSegment::Member(name) => {
                    current = self
                        .nodes
                        .member(current, name)
                        .map_err(|_| not_found(format!("no member {name}")))?;
                    if last {
                        break;
                    }
                    continue;
                }
                PathSegment::Item(id) | PathSegment::Key(id) => {
                    let collection = self.path_collection(current, path)?;
                    let index = self
                        .collection(collection)?
                        .index_of(*id)
                        .ok_or_else(|| not_found(format!("no item {id}")))?;
                    (collection, index)
                }
                PathSegment::Position(p) => {
                    let collection = self.path_collection(current, path)?;
                    let index = self
                        .collection(collection)?
                        .indices()
                        .into_iter()
                        .nth(*p)
                        .ok_or_else(|| not_found(format!("no item at {p}")))?;
                    (collection, index)
                }
            };
            let on_key = matches!(segment, PathSegment::Key(_));
            if last {
                return Ok(ResolvedPath {
                    node: collection,
                    index,
                    on_key,
                });
            }
            if on_key {
                return Err(not_found("a key segment must be last".to_string()).into());
            }
            current = self
                .collection(collection)?
                .slot(&index)
                .and_then(Slot::owned)
                .ok_or_else(|| not_found(format!("item {index} owns no node")))?;
        }
        Ok(ResolvedPath {
            node: current,
            index: Index::Empty,
            on_key: false,
        })
    }

    fn path_collection(&self, node: NodeId, path: &AssetPath) -> Result<NodeId> {
        self.nodes.collection_of(node).ok_or_else(|| {
            GraphError::PathNotFound {
                path: path.to_string(),
                reason: format!("{} is not a collection", self.nodes.path_of(node)),
            }
            .into()
        })
    }

    /// Structural path of a node from the root of its asset.
    ///
    /// Member nodes end with [`PathSegment::Member`]; objects and collections stored in
    /// a collection end with the item segment.
    pub fn path_of(&self, node: NodeId) -> Result<AssetPath> {
        let mut segments = Vec::new();
        let mut current = node;
        loop {
            let n = self.nodes.get(current)?;
            match &n.kind {
                NodeKind::Member(m) => segments.push(PathSegment::Member(m.name.clone())),
                NodeKind::Object(_) | NodeKind::Collection(_) => {
                    if let Some(parent) = n.parent
                        && let Some(c) = self.nodes.get(parent)?.as_collection()
                        && let Some(index) = self.nodes.index_in_parent(current)
                    {
                        segments.push(match c.id_at(&index) {
                            Some(id) => PathSegment::Item(id),
                            None => PathSegment::Position(c.offset(&index).unwrap_or_default()),
                        });
                    }
                }
            }
            match n.parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        segments.reverse();
        Ok(AssetPath::from_segments(segments))
    }

    /// Human readable location of a node, for messages.
    pub fn describe(&self, node: NodeId) -> String {
        self.nodes.path_of(node)
    }

    /// Copies the value at `index` of a node into plain data.
    ///
    /// With [`Index::Empty`] the node's own content is returned: a member's value, an
    /// object, or a whole collection. Other indices address collection items; a member
    /// owning a collection can be indexed directly.
    pub fn retrieve(&self, node: NodeId, index: Index) -> Result<Value> {
        if index.is_empty() {
            self.nodes.get(node)?;
            return Ok(self.nodes.snapshot(node, true));
        }
        let collection = self.indexable(node, &index)?;
        self.require_item(collection, &index)?;
        Ok(self
            .nodes
            .snapshot_slot(self.slot(collection, &index)?, true))
    }

    /// Item identifier table of a collection (or of the collection a member owns).
    pub fn item_ids(&self, node: NodeId) -> Result<&CollectionItemIds> {
        let collection = self.require_collection(node)?;
        Ok(&self.collection(collection)?.ids)
    }

    // ===== Structural helpers =====

    pub(crate) fn collection(&self, node: NodeId) -> Result<&CollectionNode> {
        self.nodes.get(node)?.as_collection().ok_or_else(|| {
            GraphError::NotACollection {
                node: self.nodes.path_of(node),
            }
            .into()
        })
    }

    pub(crate) fn collection_mut(&mut self, node: NodeId) -> Result<&mut CollectionNode> {
        let path = self.nodes.path_of(node);
        self.nodes
            .get_mut(node)?
            .as_collection_mut()
            .ok_or_else(|| GraphError::NotACollection { node: path }.into())
    }

    /// The collection a node designates, or [`GraphError::NotACollection`].
    pub(crate) fn require_collection(&self, node: NodeId) -> Result<NodeId> {
        self.nodes.collection_of(node).ok_or_else(|| {
            GraphError::NotACollection {
                node: self.nodes.path_of(node),
            }
            .into()
        })
    }

    /// The collection addressed by an indexed operation on `node`, with the index kind
    /// checked against it.
    pub(crate) fn indexable(&self, node: NodeId, index: &Index) -> Result<NodeId> {
        self.nodes.get(node)?;
        let Some(collection) = self.nodes.collection_of(node) else {
            return Err(GraphError::NotIndexable {
                node: self.nodes.path_of(node),
                index: index.to_string(),
            }
            .into());
        };
        let c = self.collection(collection)?;
        if !c.accepts_index(index) {
            return Err(GraphError::IndexKindMismatch {
                node: self.nodes.path_of(node),
                expected: c.index_kind(),
                actual: index.kind_name().to_string(),
            }
            .into());
        }
        Ok(collection)
    }

    /// Fails unless `index` designates an existing item.
    pub(crate) fn require_item(&self, collection: NodeId, index: &Index) -> Result<()> {
        let c = self.collection(collection)?;
        if c.offset(index).is_some() {
            return Ok(());
        }
        let node = self.nodes.path_of(collection);
        Err(match index {
            Index::Position(p) => GraphError::IndexOutOfRange {
                node,
                index: *p,
                len: c.len(),
            },
            Index::Key(key) => GraphError::KeyNotFound {
                node,
                key: key.clone(),
            },
            Index::Empty => GraphError::IndexKindMismatch {
                node,
                expected: c.index_kind(),
                actual: index.kind_name().to_string(),
            },
        }
        .into())
    }

    /// Where the content of a node is stored: a member's own slot, or the item of the
    /// collection holding an object.
    ///
    /// Indexed addresses are checked against the collection; the root object has no
    /// holder.
    pub(crate) fn edit_target(&self, node: NodeId, index: Index) -> Result<(NodeId, Index)> {
        if !index.is_empty() {
            let collection = self.indexable(node, &index)?;
            self.require_item(collection, &index)?;
            return Ok((collection, index));
        }
        let n = self.nodes.get(node)?;
        if n.as_member().is_some() {
            return Ok((node, Index::Empty));
        }
        let holder = n.parent.and_then(|parent| {
            let p = self.nodes.get(parent).ok()?;
            match &p.kind {
                NodeKind::Member(_) => Some((parent, Index::Empty)),
                NodeKind::Collection(_) => self.nodes.index_in_parent(node).map(|i| (parent, i)),
                NodeKind::Object(_) => None,
            }
        });
        holder.ok_or_else(|| {
            GraphError::NotIndexable {
                node: self.nodes.path_of(node),
                index: index.to_string(),
            }
            .into()
        })
    }

    /// The slot of a member ([`Index::Empty`]) or of a collection item.
    pub(crate) fn slot(&self, holder: NodeId, index: &Index) -> Result<&Slot> {
        let node = self.nodes.get(holder)?;
        let slot = match (&node.kind, index) {
            (NodeKind::Member(m), Index::Empty) => Some(&m.slot),
            (NodeKind::Collection(c), _) => c.slot(index),
            _ => None,
        };
        slot.ok_or_else(|| {
            GraphError::NotIndexable {
                node: self.nodes.path_of(holder),
                index: index.to_string(),
            }
            .into()
        })
    }

    pub(crate) fn set_slot(&mut self, holder: NodeId, index: &Index, value: Slot) -> Result<()> {
        let path = self.nodes.path_of(holder);
        let node = self.nodes.get_mut(holder)?;
        let slot = match (&mut node.kind, index) {
            (NodeKind::Member(m), Index::Empty) => Some(&mut m.slot),
            (NodeKind::Collection(c), _) => c.slot_mut(index),
            _ => None,
        };
        match slot {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(GraphError::NotIndexable {
                node: path,
                index: index.to_string(),
            }
            .into()),
        }
    }

    /// Identifiable object of an asset's pool, if still live.
    pub(crate) fn pooled(&self, asset: AssetId, id: ObjectId) -> Option<NodeId> {
        let node = *self.graphs.get(&asset)?.objects.get(&id)?;
        let live = self.nodes.get(node).ok()?;
        (live.identity() == Some(id)).then_some(node)
    }

    /// Removes `root` and every node it owns, detaching their base links, pool entries
    /// and custom links.
    pub(crate) fn free_subtree(&mut self, root: NodeId) -> Vec<FreedNode> {
        let subtree = self.nodes.subtree(root);
        let mut freed = Vec::with_capacity(subtree.len());
        for id in subtree {
            self.set_link(id, None);
            if let Some(derived) = self.dependents.remove(&id) {
                for d in derived {
                    if let Ok(n) = self.nodes.get_mut(d) {
                        n.base = None;
                    }
                }
            }
            let Some(node) = self.nodes.free(id) else {
                continue;
            };
            let identity = node.identity();
            if let Some(graph) = self.graphs.get_mut(&node.asset) {
                if let Some(identity) = identity
                    && graph.objects.get(&identity) == Some(&id)
                {
                    graph.objects.remove(&identity);
                }
                graph.custom_links.retain(|d, b| *d != id && *b != id);
            }
            freed.push(FreedNode {
                node: id,
                asset: node.asset,
                identity,
            });
        }
        freed
    }

    /// True when the slot follows its base counterpart.
    pub(crate) fn inherits_slot(&self, holder: NodeId, index: &Index) -> bool {
        let Ok(node) = self.nodes.get(holder) else {
            return false;
        };
        let Some(base) = node.base else {
            return false;
        };
        match (&node.kind, index) {
            (NodeKind::Member(_), Index::Empty) => node.overrides.content().is_base(),
            (NodeKind::Collection(c), _) => c.id_at(index).is_some_and(|id| {
                !node.overrides.item(id).is_new()
                    && self
                        .nodes
                        .get(base)
                        .ok()
                        .and_then(Node::as_collection)
                        .is_some_and(|bc| bc.index_of(id).is_some())
            }),
            _ => false,
        }
    }

    /// Points references to freed nodes at the live object with the same identity in
    /// the same asset, or nulls them.
    pub(crate) fn rebind_references(&mut self, freed: &[FreedNode]) {
        if freed.is_empty() {
            return;
        }
        let lookup: HashMap<NodeId, &FreedNode> = freed.iter().map(|f| (f.node, f)).collect();
        let mut stale = Vec::new();
        for (holder, node) in self.nodes.iter() {
            match &node.kind {
                NodeKind::Member(m) => {
                    if let Slot::Reference(target) = m.slot
                        && lookup.contains_key(&target)
                    {
                        stale.push((holder, Index::Empty, target));
                    }
                }
                NodeKind::Collection(c) => {
                    for (index, slot) in c.slots() {
                        if let Slot::Reference(target) = slot
                            && lookup.contains_key(target)
                        {
                            stale.push((holder, index, *target));
                        }
                    }
                }
                NodeKind::Object(_) => {}
            }
        }
        for (holder, index, target) in stale {
            let Some(freed) = lookup.get(&target) else {
                continue;
            };
            let replacement = freed
                .identity
                .and_then(|identity| self.pooled(freed.asset, identity));
            let slot = match replacement {
                Some(node) => Slot::Reference(node),
                None => {
                    let path = format!("{}{}", self.nodes.path_of(holder), index);
                    tracing::warn!(path = %path, "reference target was removed, slot set to null");
                    let inherited = self.inherits_slot(holder, &index);
                    if let Some(broken) = self.broken_references.as_mut()
                        && let Some(identity) = freed.identity
                        && !inherited
                    {
                        broken.push((path, identity));
                    }
                    Slot::Null
                }
            };
            if let Err(err) = self.set_slot(holder, &index, slot) {
                tracing::debug!(error = %err, "stale reference holder vanished");
            }
        }
    }
}
