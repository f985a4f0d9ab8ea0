//! Local edits and the override API.
//!
//! Every public edit follows the same steps: write the content, flag it New when the
//! node inherits from a base, relink the rewritten slot, and push the change to the
//! nodes derived from this one. Writes performed on behalf of a base go through the
//! same low-level helpers but never touch override flags.

use crate::{
    Result,
    graph::{
        GraphContainer, GraphError, NodeId, OverrideType,
        build::{BuildContext, BuildMode, SlotAddr},
        node::{NodeKind, Slot},
        propagate::BaseChange,
        reference::owning_member,
    },
    ids::ItemId,
    index::Index,
    value::Value,
};

impl GraphContainer {
    // ===== Local edits =====

    /// Replaces the value at `index` of a node.
    ///
    /// [`Index::Empty`] replaces a member's value (or the object or collection a node
    /// designates, through the slot holding it); other indices replace collection items.
    /// The edited slot becomes New if the node has a base.
    ///
    /// # Errors
    /// [`GraphError::NotIndexable`] when an index is used on content that is not a
    /// collection, [`GraphError::IndexKindMismatch`] for a key on a sequence or a
    /// position on a dictionary, and [`GraphError::TypeMismatch`] for a value that does
    /// not fit the declared kind.
    pub fn update(&mut self, node: NodeId, value: impl Into<Value>, index: Index) -> Result<()> {
        let (holder, index) = self.edit_target(node, index)?;
        self.write_value(holder, &index, value.into(), BuildMode::Local)?;
        // New content stays unlinked
        self.mark_local_edit(holder, &index)?;
        self.relink_slot(holder, &index)?;
        let change = BaseChange::Value {
            index: index.clone(),
        };
        self.commit_local_edit(holder, Some(&index), Some(change))
    }

    /// Inserts an item into a collection.
    ///
    /// Sequences append when `index` is `None` and insert before `index` otherwise;
    /// dictionaries require a key that is not present yet. The item receives a fresh
    /// [`ItemId`] when the collection is identifiable.
    ///
    /// # Returns
    /// The identifier of the new item, if the collection has identifiers.
    pub fn add(
        &mut self,
        node: NodeId,
        value: impl Into<Value>,
        index: Option<Index>,
    ) -> Result<Option<ItemId>> {
        self.add_item(node, value.into(), index, None)
    }

    /// Inserts an item with a known identifier.
    ///
    /// An identifier already used or tombstoned in this collection is replaced by a
    /// fresh one; the tombstone is kept.
    pub fn add_with_id(
        &mut self,
        node: NodeId,
        value: impl Into<Value>,
        index: Option<Index>,
        id: ItemId,
    ) -> Result<Option<ItemId>> {
        self.add_item(node, value.into(), index, Some(id))
    }

    /// Appends several items to a sequence in one operation.
    ///
    /// References between the new items, or from them to each other's content, resolve
    /// because resolution waits until every item is built.
    pub fn add_many(
        &mut self,
        node: NodeId,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<Vec<Option<ItemId>>> {
        let collection = self.require_collection(node)?;
        let asset = self.nodes.get(collection)?.asset;
        let mut ctx = self.build_context(asset, BuildMode::Local)?;
        let mut added = Vec::new();
        for value in values {
            let index = self.insertion_index(collection, None)?;
            let item = self.insert_with(&mut ctx, collection, &index, value, None)?;
            added.push((index, item));
        }
        self.finish_build(ctx)?;

        let mut ids = Vec::with_capacity(added.len());
        for (index, item) in added {
            self.relink_slot(collection, &index)?;
            let change = item.map(|id| BaseChange::Add {
                index: index.clone(),
                item: id,
            });
            self.commit_local_edit(collection, Some(&index), change)?;
            ids.push(item);
        }
        Ok(ids)
    }

    /// Removes the item at `index` and returns its value.
    ///
    /// The item's identifier is kept as a tombstone only when the collection has a base
    /// that knows it; its override flags are dropped.
    pub fn remove(&mut self, node: NodeId, index: Index) -> Result<Value> {
        let collection = self.indexable(node, &index)?;
        self.require_item(collection, &index)?;
        let id = self.collection(collection)?.id_at(&index);
        let base = self.nodes.get(collection)?.base;
        let mark = match (id, base) {
            (Some(id), Some(base)) => self.collection(base)?.ids.contains_id(id),
            _ => false,
        };
        let (id, value) = self.remove_item(collection, &index, mark)?;
        let change = id.map(|id| BaseChange::Remove { item: id });
        self.commit_local_edit(collection, None, change)?;
        Ok(value)
    }

    /// Changes the key of a dictionary entry, keeping its identifier.
    ///
    /// The key becomes New if the dictionary has a base.
    pub fn rename_key(
        &mut self,
        node: NodeId,
        index: Index,
        new_key: impl Into<String>,
    ) -> Result<()> {
        let collection = self.indexable(node, &index)?;
        self.require_item(collection, &index)?;
        let Index::Key(current) = &index else {
            return Err(GraphError::IndexKindMismatch {
                node: self.nodes.path_of(node),
                expected: "key",
                actual: index.kind_name().to_string(),
            }
            .into());
        };
        let new_key = new_key.into();
        if *current == new_key {
            return Ok(());
        }
        self.rename_item(collection, current, &new_key)?;
        let id = self.collection(collection)?.id_at(&Index::Key(new_key));
        if let Some(id) = id {
            let n = self.nodes.get_mut(collection)?;
            if n.base.is_some() && n.can_override {
                n.overrides.set_key(id, OverrideType::New);
            }
        }
        let change = id.map(|id| BaseChange::Rename { item: id });
        self.commit_local_edit(collection, None, change)
    }

    fn add_item(
        &mut self,
        node: NodeId,
        value: Value,
        index: Option<Index>,
        id: Option<ItemId>,
    ) -> Result<Option<ItemId>> {
        let collection = self.nodes.collection_of(node).ok_or_else(|| GraphError::NotIndexable {
            node: self.nodes.path_of(node),
            index: index.as_ref().map(Index::to_string).unwrap_or_default(),
        })?;
        let index = self.insertion_index(collection, index)?;
        let item = self.insert_value(collection, &index, value, id, BuildMode::Local)?;
        self.relink_slot(collection, &index)?;
        let change = item.map(|id| BaseChange::Add {
            index: index.clone(),
            item: id,
        });
        self.commit_local_edit(collection, Some(&index), change)?;
        Ok(item)
    }

    /// Checks and normalizes the index of an insertion.
    fn insertion_index(&self, collection: NodeId, index: Option<Index>) -> Result<Index> {
        let c = self.collection(collection)?;
        let node = || self.nodes.path_of(collection);
        match (c.is_sequence(), index) {
            (true, None) => Ok(Index::Position(c.len())),
            (true, Some(Index::Position(p))) if p <= c.len() => Ok(Index::Position(p)),
            (true, Some(Index::Position(p))) => Err(GraphError::IndexOutOfRange {
                node: node(),
                index: p,
                len: c.len(),
            }
            .into()),
            (false, Some(Index::Key(key))) => {
                if c.offset(&Index::Key(key.clone())).is_some() {
                    return Err(GraphError::DuplicateKey { node: node(), key }.into());
                }
                Ok(Index::Key(key))
            }
            (_, other) => Err(GraphError::IndexKindMismatch {
                node: node(),
                expected: c.index_kind(),
                actual: other.as_ref().map_or("empty", Index::kind_name).to_string(),
            }
            .into()),
        }
    }

    /// Records a local edit: flags the edited slot New and pushes the change to the
    /// nodes derived from `holder`.
    ///
    /// Collections without item identifiers are overridden and propagated as a whole,
    /// through the slot holding them.
    fn commit_local_edit(
        &mut self,
        holder: NodeId,
        edited: Option<&Index>,
        change: Option<BaseChange>,
    ) -> Result<()> {
        if let Some((outer, outer_index)) = self.whole_collection_slot(holder)? {
            let change = BaseChange::Value {
                index: outer_index.clone(),
            };
            return self.commit_local_edit(outer, Some(&outer_index), Some(change));
        }
        if let Some(index) = edited {
            self.mark_local_edit(holder, index)?;
        }
        match change {
            Some(change) => self.propagate(holder, &change),
            None => Ok(()),
        }
    }

    /// The slot holding a collection without item identifiers.
    pub(crate) fn whole_collection_slot(&self, node: NodeId) -> Result<Option<(NodeId, Index)>> {
        match self.nodes.get(node)?.as_collection() {
            Some(c) if !c.identifiable => Ok(self.edit_target(node, Index::Empty).ok()),
            _ => Ok(None),
        }
    }

    /// Flags a locally edited slot New when it has something to override.
    fn mark_local_edit(&mut self, holder: NodeId, index: &Index) -> Result<()> {
        let node = self.nodes.get_mut(holder)?;
        if node.base.is_none() || !node.can_override {
            return Ok(());
        }
        if index.is_empty() {
            node.overrides.set_content(OverrideType::New);
        } else if let Some(id) = node.as_collection().and_then(|c| c.id_at(index)) {
            node.overrides.set_item(id, OverrideType::New);
        }
        Ok(())
    }

    // ===== Low-level writes shared with propagation and reconciliation =====

    /// Replaces the content of a slot without touching override flags.
    pub(crate) fn write_value(
        &mut self,
        holder: NodeId,
        index: &Index,
        value: Value,
        mode: BuildMode,
    ) -> Result<()> {
        let node = self.nodes.get(holder)?;
        let asset = node.asset;
        let can_override = node.can_override;
        let (kind, identifiable_items, member) = match (&node.kind, index) {
            (NodeKind::Member(m), Index::Empty) => {
                (m.kind.clone(), !m.non_identifiable_items, m.name.clone())
            }
            (NodeKind::Collection(c), _) if !index.is_empty() => (
                c.element.clone(),
                true,
                owning_member(&self.nodes, holder).unwrap_or_default(),
            ),
            _ => {
                return Err(GraphError::NotIndexable {
                    node: self.nodes.path_of(holder),
                    index: index.to_string(),
                }
                .into());
            }
        };
        self.check_kind(holder, &member, &kind, &value)?;
        let addr = match index {
            Index::Empty => SlotAddr::Member,
            _ => SlotAddr::of_item(self.collection(holder)?, index),
        };

        let old = self.slot(holder, index)?.clone();
        self.set_slot(holder, index, Slot::Null)?;
        let freed = old
            .owned()
            .map(|target| self.free_subtree(target))
            .unwrap_or_default();

        let mut ctx = self.build_context(asset, mode)?;
        let slot = self.build_slot(
            &mut ctx,
            holder,
            index,
            addr,
            &kind,
            value,
            identifiable_items,
            can_override,
        )?;
        self.set_slot(holder, index, slot)?;
        self.finish_build(ctx)?;
        self.rebind_references(&freed);
        Ok(())
    }

    /// Inserts an item as one complete operation.
    pub(crate) fn insert_value(
        &mut self,
        collection: NodeId,
        index: &Index,
        value: Value,
        id: Option<ItemId>,
        mode: BuildMode,
    ) -> Result<Option<ItemId>> {
        let asset = self.nodes.get(collection)?.asset;
        let mut ctx = self.build_context(asset, mode)?;
        let item = self.insert_with(&mut ctx, collection, index, value, id)?;
        self.finish_build(ctx)?;
        Ok(item)
    }

    /// Inserts an item within a larger build operation.
    pub(crate) fn insert_with(
        &mut self,
        ctx: &mut BuildContext,
        collection: NodeId,
        index: &Index,
        value: Value,
        requested: Option<ItemId>,
    ) -> Result<Option<ItemId>> {
        if index.is_empty() {
            return Err(GraphError::IndexKindMismatch {
                node: self.nodes.path_of(collection),
                expected: "position or key",
                actual: index.kind_name().to_string(),
            }
            .into());
        }
        let node = self.nodes.get(collection)?;
        let can_override = node.can_override;
        let Some(c) = node.as_collection() else {
            return Err(GraphError::NotACollection {
                node: self.nodes.path_of(collection),
            }
            .into());
        };
        let kind = c.element.clone();
        let identifiable = c.identifiable;
        let reusable = requested
            .filter(|id| !id.is_empty() && !c.ids.contains_id(*id) && !c.ids.is_deleted(*id));
        let member = owning_member(&self.nodes, collection).unwrap_or_default();
        self.check_kind(collection, &member, &kind, &value)?;

        let item = match (identifiable, reusable, requested) {
            (false, _, _) => None,
            (true, Some(id), _) => Some(id),
            (true, None, requested) => {
                let fresh = self.fresh_item_id(collection)?;
                if let Some(requested) = requested {
                    tracing::debug!(
                        path = %self.nodes.path_of(collection),
                        requested = %requested,
                        assigned = %fresh,
                        "item identifier already known to the collection, assigned a fresh one"
                    );
                }
                Some(fresh)
            }
        };

        let c = self.collection_mut(collection)?;
        match (index, item) {
            (Index::Position(p), Some(id)) => c.ids.insert(*p, id)?,
            (_, Some(id)) => c.ids.add(index.clone(), id)?,
            (_, None) => {}
        }
        c.insert_slot(index, Slot::Null);

        let addr = SlotAddr::of_item(self.collection(collection)?, index);
        let slot = self.build_slot(ctx, collection, index, addr, &kind, value, true, can_override)?;
        self.set_slot(collection, index, slot)?;
        Ok(item)
    }

    /// Removes an item, optionally tombstoning its identifier.
    pub(crate) fn remove_item(
        &mut self,
        collection: NodeId,
        index: &Index,
        mark_as_deleted: bool,
    ) -> Result<(Option<ItemId>, Value)> {
        let value = self
            .nodes
            .snapshot_slot(self.slot(collection, index)?, true);
        let c = self.collection_mut(collection)?;
        let slot = c.remove_slot(index).unwrap_or(Slot::Null);
        let id = match index {
            Index::Position(p) => c.ids.delete_and_shift(*p, mark_as_deleted),
            Index::Key(_) => c.ids.delete(index, mark_as_deleted),
            Index::Empty => None,
        };
        if let Some(id) = id {
            self.nodes.get_mut(collection)?.overrides.forget_item(id);
        }
        if let Some(owned) = slot.owned() {
            let freed = self.free_subtree(owned);
            self.rebind_references(&freed);
        }
        tracing::trace!(
            path = %self.nodes.path_of(collection),
            index = %index,
            tombstone = mark_as_deleted,
            "item removed"
        );
        Ok((id, value))
    }

    /// Moves a dictionary entry to a new key.
    pub(crate) fn rename_item(&mut self, collection: NodeId, from: &str, to: &str) -> Result<()> {
        let target = Index::key(to);
        if self.collection(collection)?.offset(&target).is_some() {
            return Err(GraphError::DuplicateKey {
                node: self.nodes.path_of(collection),
                key: to.to_string(),
            }
            .into());
        }
        let source = Index::key(from);
        let c = self.collection_mut(collection)?;
        c.rename_slot(from, to);
        if c.ids.contains_key(&source) {
            c.ids.rename_key(&source, target)?;
        }
        Ok(())
    }

    fn check_kind(
        &self,
        holder: NodeId,
        member: &str,
        kind: &crate::schema::ValueKind,
        value: &Value,
    ) -> Result<()> {
        if !kind.accepts(value) {
            return Err(GraphError::TypeMismatch {
                node: self.nodes.path_of(holder),
                expected: kind.to_string(),
                actual: value.type_name().to_string(),
            }
            .into());
        }
        Ok(self.registry.check_value(member, kind, value)?)
    }

    fn fresh_item_id(&mut self, collection: NodeId) -> Result<ItemId> {
        loop {
            let id = self.ids.next_item_id();
            let ids = &self.collection(collection)?.ids;
            if !ids.contains_id(id) && !ids.is_deleted(id) {
                return Ok(id);
            }
        }
    }

    // ===== Override queries =====

    /// Override flag of a member's content ([`Index::Empty`]) or of a collection item.
    pub fn get_override(&self, node: NodeId, index: &Index) -> Result<OverrideType> {
        if index.is_empty() {
            return Ok(self.nodes.get(node)?.overrides.content());
        }
        let (collection, id) = self.item_at(node, index)?;
        Ok(id
            .map(|id| self.nodes.get(collection).map(|n| n.overrides.item(id)))
            .transpose()?
            .unwrap_or_default())
    }

    /// Override flag of a dictionary entry's key.
    pub fn get_key_override(&self, node: NodeId, index: &Index) -> Result<OverrideType> {
        let (collection, id) = self.item_at(node, index)?;
        Ok(id
            .map(|id| self.nodes.get(collection).map(|n| n.overrides.key(id)))
            .transpose()?
            .unwrap_or_default())
    }

    /// True when the node has a base and its content is not overridden.
    pub fn is_content_inherited(&self, node: NodeId) -> Result<bool> {
        let n = self.nodes.get(node)?;
        Ok(n.base.is_some() && n.overrides.content().is_base())
    }

    /// True when the item exists in the base collection and is not overridden.
    pub fn is_item_inherited(&self, node: NodeId, index: &Index) -> Result<bool> {
        self.inherited(node, index, |n, id| n.overrides.item(id).is_base())
    }

    /// True when the entry exists in the base dictionary and its key is not overridden.
    pub fn is_key_inherited(&self, node: NodeId, index: &Index) -> Result<bool> {
        self.inherited(node, index, |n, id| n.overrides.key(id).is_base())
    }

    fn inherited(
        &self,
        node: NodeId,
        index: &Index,
        not_overridden: impl Fn(&crate::graph::Node, ItemId) -> bool,
    ) -> Result<bool> {
        let (collection, id) = self.item_at(node, index)?;
        let n = self.nodes.get(collection)?;
        let (Some(id), Some(base)) = (id, n.base) else {
            return Ok(false);
        };
        Ok(not_overridden(n, id) && self.collection(base)?.ids.contains_id(id))
    }

    /// Indices of the items whose value is New.
    pub fn overridden_item_indices(&self, node: NodeId) -> Result<Vec<Index>> {
        let collection = self.require_collection(node)?;
        let c = self.collection(collection)?;
        let n = self.nodes.get(collection)?;
        Ok(n.overrides
            .overridden_items()
            .filter_map(|id| c.index_of(id))
            .collect())
    }

    /// Indices of the dictionary entries whose key is New.
    pub fn overridden_key_indices(&self, node: NodeId) -> Result<Vec<Index>> {
        let collection = self.require_collection(node)?;
        let c = self.collection(collection)?;
        let n = self.nodes.get(collection)?;
        Ok(n.overrides
            .overridden_keys()
            .filter_map(|id| c.index_of(id))
            .collect())
    }

    /// True if `item` is tombstoned in the collection.
    pub fn is_item_deleted(&self, node: NodeId, item: ItemId) -> Result<bool> {
        let collection = self.require_collection(node)?;
        Ok(self.collection(collection)?.ids.is_deleted(item))
    }

    /// Maps an index of the base collection to the index of the same item here.
    ///
    /// Returns [`Index::Empty`] when the item no longer exists in this collection.
    pub fn retrieve_derived_index(&self, node: NodeId, base_index: &Index) -> Result<Index> {
        let collection = self.require_collection(node)?;
        let base = self
            .nodes
            .get(collection)?
            .base
            .ok_or_else(|| GraphError::NoBase {
                node: self.nodes.path_of(collection),
            })?;
        let Some(id) = self.collection(base)?.id_at(base_index) else {
            return Ok(Index::Empty);
        };
        Ok(self
            .collection(collection)?
            .index_of(id)
            .unwrap_or_default())
    }

    fn item_at(&self, node: NodeId, index: &Index) -> Result<(NodeId, Option<ItemId>)> {
        let collection = self.indexable(node, index)?;
        self.require_item(collection, index)?;
        Ok((collection, self.collection(collection)?.id_at(index)))
    }

    // ===== Explicit override changes =====

    /// Sets the override flag of a member's content directly.
    ///
    /// Intended for undo/redo layers replaying a recorded state. A New flag is ignored
    /// on nodes without a base or that cannot be overridden.
    pub fn override_content(&mut self, node: NodeId, value: OverrideType) -> Result<()> {
        let n = self.nodes.get_mut(node)?;
        if value.is_new() && (n.base.is_none() || !n.can_override) {
            return Ok(());
        }
        n.overrides.set_content(value);
        if n.as_member().is_some() {
            self.relink_slot(node, &Index::Empty)?;
        }
        Ok(())
    }

    /// Sets the override flag of a collection item's value directly.
    pub fn override_item(&mut self, node: NodeId, index: &Index, value: OverrideType) -> Result<()> {
        let (collection, id) = self.item_at(node, index)?;
        let Some(id) = id else {
            return Ok(());
        };
        let n = self.nodes.get_mut(collection)?;
        if value.is_new() && (n.base.is_none() || !n.can_override) {
            return Ok(());
        }
        n.overrides.set_item(id, value);
        self.relink_slot(collection, index)
    }

    /// Sets the override flag of a dictionary entry's key directly.
    pub fn override_key(&mut self, node: NodeId, index: &Index, value: OverrideType) -> Result<()> {
        let (collection, id) = self.item_at(node, index)?;
        let Some(id) = id else {
            return Ok(());
        };
        let n = self.nodes.get_mut(collection)?;
        if value.is_new() && (n.base.is_none() || !n.can_override) {
            return Ok(());
        }
        n.overrides.set_key(id, value);
        Ok(())
    }

    /// Drops the override at `index` and restores the base value.
    ///
    /// For dictionary entries the base key is restored too, unless another entry
    /// already uses it.
    ///
    /// # Errors
    /// [`GraphError::NoBase`] when the node has no base.
    pub fn reset_override(&mut self, node: NodeId, index: Index) -> Result<()> {
        let (holder, index) = self.edit_target(node, index)?;
        let base = self
            .nodes
            .get(holder)?
            .base
            .ok_or_else(|| GraphError::NoBase {
                node: self.nodes.path_of(holder),
            })?;
        if index.is_empty() {
            self.nodes
                .get_mut(holder)?
                .overrides
                .set_content(OverrideType::Base);
            self.copy_from_base(holder, &Index::Empty, base, &Index::Empty)?;
            return self.propagate(holder, &BaseChange::Value { index });
        }

        let id = self
            .collection(holder)?
            .id_at(&index)
            .ok_or_else(|| GraphError::UnknownItemId {
                node: self.nodes.path_of(holder),
                item_id: index.to_string(),
            })?;
        let n = self.nodes.get_mut(holder)?;
        n.overrides.set_item(id, OverrideType::Base);
        n.overrides.set_key(id, OverrideType::Base);
        let Some(base_index) = self.collection(base)?.index_of(id) else {
            return Ok(());
        };

        let mut index = index;
        if let (Index::Key(current), Index::Key(base_key)) = (index.clone(), base_index.clone())
            && current != base_key
            && self.collection(holder)?.offset(&base_index).is_none()
        {
            self.rename_item(holder, &current, &base_key)?;
            index = base_index.clone();
            self.propagate(holder, &BaseChange::Rename { item: id })?;
        }
        self.copy_from_base(holder, &index, base, &base_index)?;
        self.propagate(holder, &BaseChange::Value { index })
    }

    /// Brings back a base item that was removed here.
    ///
    /// The item is re-inserted with its original identifier, its tombstone is dropped
    /// and it inherits again.
    ///
    /// # Returns
    /// The index of the restored item.
    pub fn restore_deleted_item(&mut self, node: NodeId, item: ItemId) -> Result<Index> {
        let collection = self.require_collection(node)?;
        let unknown = || GraphError::UnknownItemId {
            node: self.nodes.path_of(collection),
            item_id: item.to_string(),
        };
        if !self.collection(collection)?.ids.is_deleted(item) {
            return Err(unknown().into());
        }
        let base = self
            .nodes
            .get(collection)?
            .base
            .ok_or_else(|| GraphError::NoBase {
                node: self.nodes.path_of(collection),
            })?;
        let base_index = self
            .collection(base)?
            .index_of(item)
            .ok_or_else(unknown)?;
        let index = match &base_index {
            Index::Key(key) => {
                if self.collection(collection)?.offset(&base_index).is_some() {
                    return Err(GraphError::DuplicateKey {
                        node: self.nodes.path_of(collection),
                        key: key.clone(),
                    }
                    .into());
                }
                base_index.clone()
            }
            _ => Index::Position(self.derived_insert_position(collection, base, item)?),
        };
        self.collection_mut(collection)?.ids.unmark_as_deleted(item);
        self.clone_item_from_base(collection, &index, base, &base_index, item)?;
        self.propagate(
            collection,
            &BaseChange::Add {
                index: index.clone(),
                item,
            },
        )?;
        Ok(index)
    }
}
