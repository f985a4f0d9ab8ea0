//! Base links between derived and base nodes.
//!
//! Links are recomputed from scratch by [`GraphContainer::refresh_base`], walking the
//! derived graph and its base side by side:
//!
//! - members match by name, objects by type, collections by kind
//! - identifiable collection items match by [`ItemId`](crate::ids::ItemId), never by
//!   position
//! - items without identifiers only link through custom links
//! - references are not followed; the referenced object links through its owner
//! - the content of a New member or item is independent of the base and stays unlinked
//!
//! A custom link registered for a derived node takes priority over structural matching.

use crate::{
    Result,
    graph::{GraphContainer, GraphError, NodeId, container::BaseReference, node::NodeKind},
    ids::AssetId,
    index::Index,
};

impl GraphContainer {
    /// Recomputes every base link of an asset.
    ///
    /// Called after the base changes identity or is reloaded. Assets without a base, or
    /// whose base is not loaded, end up fully unlinked.
    pub fn refresh_base(&mut self, asset: AssetId) -> Result<()> {
        let graph = self.graph(asset)?;
        let root = graph.root;
        let base_root = graph
            .base
            .as_ref()
            .and_then(|b| self.graphs.get(&b.asset))
            .map(|g| g.root);
        for node in self.nodes.subtree(root) {
            self.set_link(node, None);
        }
        self.link_node(root, base_root);
        tracing::debug!(asset = %asset, linked = base_root.is_some(), "base links refreshed");
        Ok(())
    }

    /// Changes the base of an asset and relinks it.
    pub fn set_base(&mut self, asset: AssetId, base: Option<BaseReference>) -> Result<()> {
        if let Some(reference) = &base
            && reference.asset == asset
        {
            return Err(GraphError::InvalidBase {
                asset: asset.to_string(),
                reason: "an asset cannot be its own base".to_string(),
            }
            .into());
        }
        self.graph_mut(asset)?.base = base;
        self.refresh_base(asset)
    }

    /// Registers an explicit base link for a node of `asset`.
    ///
    /// Used for content that has no stable identity of its own, such as items of
    /// collections without identifiers or parts instantiated from another asset. The
    /// link takes effect on the next [`refresh_base`](Self::refresh_base).
    pub fn register_custom_base_link(
        &mut self,
        asset: AssetId,
        derived: NodeId,
        base: NodeId,
    ) -> Result<()> {
        let node = self.nodes.get(derived)?;
        if node.asset != asset {
            return Err(GraphError::NodeNotFound {
                node: format!("{derived} in asset {asset}"),
            }
            .into());
        }
        self.nodes.get(base)?;
        self.graph_mut(asset)?.custom_links.insert(derived, base);
        Ok(())
    }

    /// Removes an explicit base link. Returns true if one was registered.
    pub fn remove_custom_base_link(&mut self, asset: AssetId, derived: NodeId) -> Result<bool> {
        Ok(self.graph_mut(asset)?.custom_links.remove(&derived).is_some())
    }

    /// Refreshes every asset whose base is `base`.
    pub(crate) fn refresh_dependents_of(&mut self, base: AssetId) -> Result<()> {
        let derived: Vec<AssetId> = self
            .graphs
            .values()
            .filter(|g| g.base.as_ref().is_some_and(|b| b.asset == base))
            .map(|g| g.id)
            .collect();
        for asset in derived {
            self.refresh_base(asset)?;
        }
        Ok(())
    }

    /// Links `derived` to `candidate` (or to its custom link) and recurses into the
    /// nodes it owns.
    pub(crate) fn link_node(&mut self, derived: NodeId, candidate: Option<NodeId>) {
        let Ok(asset) = self.nodes.get(derived).map(|n| n.asset) else {
            return;
        };
        let custom = self
            .graphs
            .get(&asset)
            .and_then(|g| g.custom_links.get(&derived).copied())
            .filter(|b| self.nodes.contains(*b));
        let base = custom.or(candidate).filter(|b| self.compatible(derived, *b));
        self.set_link(derived, base);

        let Ok(node) = self.nodes.get(derived) else {
            return;
        };
        let children: Vec<(NodeId, Option<NodeId>)> = match &node.kind {
            NodeKind::Object(o) => o
                .members
                .iter()
                .map(|member| {
                    let base_member = base.and_then(|b| {
                        let name = self.nodes.get(*member).ok()?.name()?;
                        self.nodes.member(b, name).ok()
                    });
                    (*member, base_member)
                })
                .collect(),
            NodeKind::Member(m) => m
                .slot
                .owned()
                .map(|target| (target, self.base_child_of(derived, base, &Index::Empty)))
                .into_iter()
                .collect(),
            NodeKind::Collection(c) => c
                .slots()
                .into_iter()
                .filter_map(|(index, slot)| {
                    let child = slot.owned()?;
                    Some((child, self.base_child_of(derived, base, &index)))
                })
                .collect(),
        };
        for (child, base_child) in children {
            self.link_node(child, base_child);
        }
    }

    /// Relinks the content of one slot after it was rewritten.
    pub(crate) fn relink_slot(&mut self, holder: NodeId, index: &Index) -> Result<()> {
        let Some(child) = self.slot(holder, index)?.owned() else {
            return Ok(());
        };
        let base = self.nodes.get(holder)?.base;
        let base_child = self.base_child_of(holder, base, index);
        self.link_node(child, base_child);
        Ok(())
    }

    /// The node owned by the base counterpart of a slot, if the slot inherits.
    fn base_child_of(&self, holder: NodeId, base: Option<NodeId>, index: &Index) -> Option<NodeId> {
        let base = base?;
        let node = self.nodes.get(holder).ok()?;
        let base_node = self.nodes.get(base).ok()?;
        match (&node.kind, &base_node.kind) {
            (NodeKind::Member(_), NodeKind::Member(bm)) => {
                if node.overrides.content().is_new() {
                    return None;
                }
                bm.slot.owned()
            }
            (NodeKind::Collection(c), NodeKind::Collection(bc)) => {
                if !c.identifiable {
                    return None;
                }
                let id = c.id_at(index)?;
                if node.overrides.item(id).is_new() {
                    return None;
                }
                bc.slot(&bc.index_of(id)?)?.owned()
            }
            _ => None,
        }
    }

    /// Nodes can only link to a node of the same shape.
    fn compatible(&self, derived: NodeId, base: NodeId) -> bool {
        let (Ok(d), Ok(b)) = (self.nodes.get(derived), self.nodes.get(base)) else {
            return false;
        };
        match (&d.kind, &b.kind) {
            (NodeKind::Member(dm), NodeKind::Member(bm)) => dm.name == bm.name,
            (NodeKind::Object(o), NodeKind::Object(bo)) => o.type_name == bo.type_name,
            (NodeKind::Collection(c), NodeKind::Collection(bc)) => {
                c.is_sequence() == bc.is_sequence()
            }
            _ => false,
        }
    }

    /// Sets the base link of a node, keeping the dependents index in step.
    pub(crate) fn set_link(&mut self, derived: NodeId, base: Option<NodeId>) {
        let Ok(node) = self.nodes.get_mut(derived) else {
            return;
        };
        let previous = node.base;
        if previous == base {
            return;
        }
        node.base = base;
        if let Some(previous) = previous
            && let Some(list) = self.dependents.get_mut(&previous)
        {
            list.retain(|d| *d != derived);
            if list.is_empty() {
                self.dependents.remove(&previous);
            }
        }
        if let Some(base) = base {
            self.dependents.entry(base).or_default().push(derived);
        }
    }

    /// Derived nodes linked to `base`.
    pub fn dependents_of(&self, base: NodeId) -> &[NodeId] {
        self.dependents.get(&base).map(Vec::as_slice).unwrap_or_default()
    }

    /// The node of `asset` linked to `base`.
    pub(crate) fn counterpart_in(&self, base: NodeId, asset: AssetId) -> Option<NodeId> {
        self.dependents_of(base)
            .iter()
            .copied()
            .find(|d| self.nodes.get(*d).is_ok_and(|n| n.asset == asset))
    }
}
