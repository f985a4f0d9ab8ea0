//! Building nodes from plain values.
//!
//! Content is built depth first from a [`Value`] following the registered type
//! descriptors. References cannot be resolved while their target may still be under
//! construction, so they are collected in the [`BuildContext`] and resolved when the
//! whole operation has been built.

use std::{collections::HashMap, sync::Arc};

use crate::{
    Result,
    collection::CollectionItemIds,
    graph::{
        GraphContainer, GraphError, NodeId, ObjectReferencePolicy,
        node::{CollectionNode, Items, MemberNode, Node, NodeKind, ObjectNode, Slot},
    },
    ids::{AssetId, IdGenerator, ItemId, ObjectId},
    index::Index,
    schema::{SchemaError, ValueKind},
    value::{List, Map, Object, Value},
};

/// Where content being built comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuildMode {
    /// A local edit or a loaded document
    Local,
    /// A copy of base content written into a derived graph
    CloneFromBase,
}

/// Address of a slot awaiting a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SlotAddr {
    Member,
    Item(ItemId),
    Position(usize),
    Key(String),
}

impl SlotAddr {
    /// Address of the item at `index` of a collection.
    pub(crate) fn of_item(collection: &CollectionNode, index: &Index) -> Self {
        match (collection.id_at(index), index) {
            (Some(id), _) => SlotAddr::Item(id),
            (None, Index::Key(key)) => SlotAddr::Key(key.clone()),
            (None, Index::Position(p)) => SlotAddr::Position(*p),
            (None, Index::Empty) => SlotAddr::Member,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PendingReference {
    holder: NodeId,
    addr: SlotAddr,
    target: ObjectId,
}

/// State of one build operation.
#[derive(Debug)]
pub(crate) struct BuildContext {
    asset: AssetId,
    mode: BuildMode,
    policy: Option<Arc<dyn ObjectReferencePolicy>>,
    objects: Vec<(ObjectId, NodeId)>,
    pending: Vec<PendingReference>,
}

impl BuildContext {
    pub(crate) fn new(
        asset: AssetId,
        asset_type: &str,
        mode: BuildMode,
        policies: &HashMap<String, Arc<dyn ObjectReferencePolicy>>,
    ) -> Self {
        Self {
            asset,
            mode,
            policy: policies.get(asset_type).cloned(),
            objects: Vec::new(),
            pending: Vec::new(),
        }
    }
}

impl GraphContainer {
    /// Starts a build operation on an existing asset.
    pub(crate) fn build_context(&self, asset: AssetId, mode: BuildMode) -> Result<BuildContext> {
        let type_name = &self.graph(asset)?.type_name;
        Ok(BuildContext::new(asset, type_name, mode, &self.policies))
    }

    /// Builds an object node and its members.
    pub(crate) fn build_object(
        &mut self,
        ctx: &mut BuildContext,
        parent: Option<NodeId>,
        mut object: Object,
        can_override: bool,
    ) -> Result<NodeId> {
        let descriptor = self.registry.get(object.type_name())?.clone();
        if let Some((name, _)) = object
            .members()
            .find(|(name, _)| descriptor.find_member(name).is_none())
        {
            return Err(SchemaError::UnknownMember {
                type_name: descriptor.name.clone(),
                member: name.to_string(),
            }
            .into());
        }
        let identity = descriptor
            .identifiable
            .then(|| self.claim_identity(ctx, object.id()));
        let node = self.nodes.alloc(Node::new(
            ctx.asset,
            parent,
            NodeKind::Object(ObjectNode {
                type_name: descriptor.name.clone(),
                identity,
                members: Vec::with_capacity(descriptor.members.len()),
            }),
            can_override,
        ))?;
        if let Some(identity) = identity {
            ctx.objects.push((identity, node));
        }

        for member in &descriptor.members {
            let value = object
                .remove(&member.name)
                .unwrap_or_else(|| member.default_value());
            let member_can_override = can_override && !member.non_overridable;
            let member_node = self.nodes.alloc(Node::new(
                ctx.asset,
                Some(node),
                NodeKind::Member(MemberNode {
                    name: member.name.clone(),
                    kind: member.kind.clone(),
                    slot: Slot::Null,
                    non_identifiable_items: member.non_identifiable_items,
                }),
                member_can_override,
            ))?;
            if let NodeKind::Object(o) = &mut self.nodes.get_mut(node)?.kind {
                o.members.push(member_node);
            }
            let slot = self.build_slot(
                ctx,
                member_node,
                &Index::Empty,
                SlotAddr::Member,
                &member.kind,
                value,
                !member.non_identifiable_items,
                member_can_override,
            )?;
            self.set_slot(member_node, &Index::Empty, slot)?;
        }
        Ok(node)
    }

    /// Builds the content of one slot.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn build_slot(
        &mut self,
        ctx: &mut BuildContext,
        holder: NodeId,
        index: &Index,
        addr: SlotAddr,
        kind: &ValueKind,
        value: Value,
        identifiable_items: bool,
        can_override: bool,
    ) -> Result<Slot> {
        if !kind.accepts(&value) {
            return Err(GraphError::TypeMismatch {
                node: self.nodes.path_of(holder),
                expected: kind.to_string(),
                actual: value.type_name().to_string(),
            }
            .into());
        }
        let is_reference = match &value {
            Value::Reference(_) => true,
            Value::Object(object) => {
                object.id().is_some()
                    && ctx
                        .policy
                        .as_ref()
                        .is_some_and(|p| p.is_reference(&self.nodes, holder, index, &value))
            }
            _ => false,
        };
        if is_reference {
            if let Some(target) = value.object_identity() {
                ctx.pending.push(PendingReference {
                    holder,
                    addr,
                    target,
                });
            }
            return Ok(Slot::Null);
        }

        match value {
            Value::Object(object) => Ok(Slot::Owned(self.build_object(
                ctx,
                Some(holder),
                object,
                can_override,
            )?)),
            Value::List(list) => {
                let element = self.element_kind(holder, kind, "list")?;
                Ok(Slot::Owned(self.build_sequence(
                    ctx,
                    holder,
                    element,
                    list,
                    identifiable_items,
                    can_override,
                )?))
            }
            Value::Map(map) => {
                let element = self.element_kind(holder, kind, "map")?;
                Ok(Slot::Owned(self.build_dictionary(
                    ctx,
                    holder,
                    element,
                    map,
                    identifiable_items,
                    can_override,
                )?))
            }
            scalar => Ok(Slot::from_scalar(&scalar).unwrap_or(Slot::Null)),
        }
    }

    fn element_kind(&self, holder: NodeId, kind: &ValueKind, actual: &str) -> Result<ValueKind> {
        kind.element().cloned().ok_or_else(|| {
            GraphError::TypeMismatch {
                node: self.nodes.path_of(holder),
                expected: kind.to_string(),
                actual: actual.to_string(),
            }
            .into()
        })
    }

    fn build_sequence(
        &mut self,
        ctx: &mut BuildContext,
        parent: NodeId,
        element: ValueKind,
        list: List,
        identifiable: bool,
        can_override: bool,
    ) -> Result<NodeId> {
        let (items, mut ids) = list.into_parts();
        if identifiable {
            let len = items.len();
            self.complete_table(ctx.asset, parent, &mut ids, |ids, generator| {
                ids.repair_sequence(len, generator)
            });
        } else {
            ids.clear();
        }
        let node = self.alloc_collection(
            ctx,
            parent,
            &element,
            Items::Sequence(Vec::new()),
            ids,
            identifiable,
            can_override,
        )?;
        for (position, item) in items.into_iter().enumerate() {
            let index = Index::Position(position);
            self.collection_mut(node)?.insert_slot(&index, Slot::Null);
            let addr = SlotAddr::of_item(self.collection(node)?, &index);
            let slot = self.build_slot(ctx, node, &index, addr, &element, item, true, can_override)?;
            self.set_slot(node, &index, slot)?;
        }
        Ok(node)
    }

    fn build_dictionary(
        &mut self,
        ctx: &mut BuildContext,
        parent: NodeId,
        element: ValueKind,
        map: Map,
        identifiable: bool,
        can_override: bool,
    ) -> Result<NodeId> {
        let (entries, mut ids) = map.into_parts();
        if identifiable {
            let keys: Vec<String> = entries.iter().map(|(key, _)| key.clone()).collect();
            self.complete_table(ctx.asset, parent, &mut ids, |ids, generator| {
                ids.repair_keys(keys.iter().map(String::as_str), generator)
            });
        } else {
            ids.clear();
        }
        let items = Items::Dictionary(Vec::new());
        let node =
            self.alloc_collection(ctx, parent, &element, items, ids, identifiable, can_override)?;
        for (key, item) in entries {
            let index = Index::Key(key);
            self.collection_mut(node)?.insert_slot(&index, Slot::Null);
            let addr = SlotAddr::of_item(self.collection(node)?, &index);
            let slot = self.build_slot(ctx, node, &index, addr, &element, item, true, can_override)?;
            self.set_slot(node, &index, slot)?;
        }
        Ok(node)
    }

    #[allow(clippy::too_many_arguments)]
    fn alloc_collection(
        &mut self,
        ctx: &BuildContext,
        parent: NodeId,
        element: &ValueKind,
        items: Items,
        ids: CollectionItemIds,
        identifiable: bool,
        can_override: bool,
    ) -> Result<NodeId> {
        let node = self.nodes.alloc(Node::new(
            ctx.asset,
            Some(parent),
            NodeKind::Collection(CollectionNode {
                element: element.clone(),
                identifiable,
                items,
                ids,
            }),
            can_override,
        ))?;
        Ok(node)
    }

    /// Fills the gaps of an item table, warning when a table that was provided
    /// disagreed with its collection.
    fn complete_table(
        &mut self,
        asset: AssetId,
        holder: NodeId,
        ids: &mut CollectionItemIds,
        repair: impl FnOnce(&mut CollectionItemIds, &mut dyn IdGenerator) -> bool,
    ) {
        let provided = ids.key_count() > 0;
        if repair(ids, self.ids.as_mut()) && provided {
            tracing::warn!(
                asset = %asset,
                path = %self.nodes.path_of(holder),
                "item identifier table disagreed with its collection and was repaired"
            );
        }
    }

    /// Keeps a requested identity unless another live object of the asset holds it.
    fn claim_identity(&mut self, ctx: &BuildContext, requested: Option<ObjectId>) -> ObjectId {
        let Some(id) = requested else {
            return self.ids.next_object_id();
        };
        let taken = ctx.objects.iter().any(|(existing, _)| *existing == id)
            || self.pooled(ctx.asset, id).is_some();
        if !taken {
            return id;
        }
        let fresh = self.ids.next_object_id();
        tracing::warn!(
            asset = %ctx.asset,
            identity = %id,
            replacement = %fresh,
            "duplicate object identity, assigned a fresh one"
        );
        fresh
    }

    /// Registers the objects built by an operation in their asset's pool, then resolves
    /// its pending references.
    ///
    /// References whose target cannot be found are left null.
    pub(crate) fn finish_build(&mut self, ctx: BuildContext) -> Result<()> {
        let BuildContext {
            asset,
            mode,
            objects,
            pending,
            ..
        } = ctx;
        let graph = self.graph_mut(asset)?;
        graph.objects.extend(objects);

        for reference in pending {
            match self.resolve_identity(asset, mode, reference.target) {
                Some(target) => self.write_pending(&reference, Slot::Reference(target))?,
                None => tracing::warn!(
                    asset = %asset,
                    path = %self.nodes.path_of(reference.holder),
                    target = %reference.target,
                    "reference target not found, slot set to null"
                ),
            }
        }
        Ok(())
    }

    /// Finds the node an identity designates for `asset`.
    ///
    /// Content copied from a base first looks for the derived counterpart of the base
    /// object, then for the identity in the asset itself, then in assets other than the
    /// base.
    pub(crate) fn resolve_identity(
        &self,
        asset: AssetId,
        mode: BuildMode,
        target: ObjectId,
    ) -> Option<NodeId> {
        let base_asset = self
            .graphs
            .get(&asset)
            .and_then(|g| g.base.as_ref())
            .map(|b| b.asset);
        let from_base = mode == BuildMode::CloneFromBase;
        if from_base {
            // The base asset first, then assets linked through custom links
            let sources = base_asset.into_iter().chain(
                self.graphs
                    .keys()
                    .copied()
                    .filter(|a| *a != asset && Some(*a) != base_asset),
            );
            for source in sources {
                if let Some(base_node) = self.pooled(source, target)
                    && let Some(counterpart) = self.counterpart_in(base_node, asset)
                    && self.nodes.get(counterpart).is_ok_and(|n| n.identity().is_some())
                {
                    return Some(counterpart);
                }
            }
        }
        if let Some(node) = self.pooled(asset, target) {
            return Some(node);
        }
        self.graphs
            .keys()
            .filter(|a| **a != asset && !(from_base && Some(**a) == base_asset))
            .find_map(|a| self.pooled(*a, target))
    }

    fn write_pending(&mut self, reference: &PendingReference, slot: Slot) -> Result<()> {
        if !self.nodes.contains(reference.holder) {
            return Ok(());
        }
        let index = match &reference.addr {
            SlotAddr::Member => Some(Index::Empty),
            SlotAddr::Item(id) => self.collection(reference.holder)?.index_of(*id),
            SlotAddr::Position(p) => Some(Index::Position(*p)),
            SlotAddr::Key(key) => Some(Index::Key(key.clone())),
        };
        match index {
            Some(index) => self.set_slot(reference.holder, &index, slot),
            None => Ok(()),
        }
    }
}
