//! Pushing base edits down to derived graphs.
//!
//! After a local edit on a node, every node linked to it receives the same change,
//! translated through [`ItemId`]s, unless the derived side overrides it. Derived nodes
//! that accepted the change pass it on to their own dependents, so a chain of
//! derivations is updated depth first within the call.

use crate::{
    Result,
    graph::{GraphContainer, NodeId, build::BuildMode},
    ids::ItemId,
    index::Index,
};

/// A change applied to a base node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BaseChange {
    /// The value at `index` was replaced
    Value { index: Index },
    /// An item was inserted at `index`
    Add { index: Index, item: ItemId },
    /// An item was removed
    Remove { item: ItemId },
    /// A dictionary entry changed key
    Rename { item: ItemId },
}

impl GraphContainer {
    /// Applies `change`, made on `base`, to every node linked to it.
    pub(crate) fn propagate(&mut self, base: NodeId, change: &BaseChange) -> Result<()> {
        if !self.config.propagate_changes_from_base {
            return Ok(());
        }
        let dependents = self.dependents_of(base).to_vec();
        for derived in dependents {
            if !self.nodes.contains(derived) {
                continue;
            }
            if let Some(applied) = self.apply_base_change(derived, base, change)? {
                self.propagate(derived, &applied)?;
            }
        }
        Ok(())
    }

    /// Applies one base change to one derived node.
    ///
    /// Returns the change as seen from the derived node, or `None` when the derived
    /// node overrides it and nothing changed.
    fn apply_base_change(
        &mut self,
        derived: NodeId,
        base: NodeId,
        change: &BaseChange,
    ) -> Result<Option<BaseChange>> {
        let node = self.nodes.get(derived)?;
        if !node.can_override {
            return Ok(None);
        }
        let asset = node.asset;
        match change {
            BaseChange::Value { index } if index.is_empty() => {
                if node.overrides.content().is_new() {
                    tracing::trace!(
                        asset = %asset,
                        path = %self.nodes.path_of(derived),
                        "overridden, base value not propagated"
                    );
                    return Ok(None);
                }
                self.copy_from_base(derived, &Index::Empty, base, &Index::Empty)?;
                Ok(Some(BaseChange::Value { index: Index::Empty }))
            }
            BaseChange::Value { index } => {
                let Some(id) = self.collection(base)?.id_at(index) else {
                    return Ok(None);
                };
                if node.overrides.item(id).is_new() {
                    return Ok(None);
                }
                let Some(derived_index) = self.collection(derived)?.index_of(id) else {
                    return Ok(None);
                };
                self.copy_from_base(derived, &derived_index, base, index)?;
                Ok(Some(BaseChange::Value {
                    index: derived_index,
                }))
            }
            BaseChange::Add { index, item } => {
                let c = self.collection(derived)?;
                if !c.identifiable || c.ids.contains_id(*item) || c.ids.is_deleted(*item) {
                    return Ok(None);
                }
                let derived_index = match index {
                    Index::Key(key) => {
                        if c.ids.contains_key(index) {
                            self.collection_mut(derived)?.ids.mark_as_deleted(*item);
                            tracing::info!(
                                asset = %asset,
                                path = %self.nodes.path_of(derived),
                                key = %key,
                                item_id = %item,
                                "key added in base already exists in derived, base item recorded as deleted"
                            );
                            return Ok(None);
                        }
                        index.clone()
                    }
                    _ => Index::Position(self.derived_insert_position(derived, base, *item)?),
                };
                self.clone_item_from_base(derived, &derived_index, base, index, *item)?;
                Ok(Some(BaseChange::Add {
                    index: derived_index,
                    item: *item,
                }))
            }
            BaseChange::Remove { item } => {
                let c = self.collection(derived)?;
                if let Some(derived_index) = c.index_of(*item) {
                    if node.overrides.item(*item).is_new() {
                        tracing::debug!(
                            asset = %asset,
                            item_id = %item,
                            "item removed in base is overridden, kept as orphan"
                        );
                        return Ok(None);
                    }
                    self.remove_item(derived, &derived_index, false)?;
                    return Ok(Some(BaseChange::Remove { item: *item }));
                }
                if c.ids.is_deleted(*item) {
                    self.collection_mut(derived)?.ids.unmark_as_deleted(*item);
                }
                Ok(None)
            }
            BaseChange::Rename { item } => {
                let Some(Index::Key(new_key)) = self.collection(base)?.index_of(*item) else {
                    return Ok(None);
                };
                let c = self.collection(derived)?;
                let Some(Index::Key(current)) = c.index_of(*item) else {
                    return Ok(None);
                };
                if node.overrides.key(*item).is_new() {
                    return Ok(None);
                }
                if c.ids.contains_key(&Index::Key(new_key.clone())) {
                    tracing::debug!(
                        asset = %asset,
                        key = %new_key,
                        "renamed key collides in derived, not propagated"
                    );
                    return Ok(None);
                }
                self.rename_item(derived, &current, &new_key)?;
                Ok(Some(BaseChange::Rename { item: *item }))
            }
        }
    }

    /// Overwrites a derived slot with a copy of its base slot and relinks it.
    pub(crate) fn copy_from_base(
        &mut self,
        derived: NodeId,
        derived_index: &Index,
        base: NodeId,
        base_index: &Index,
    ) -> Result<()> {
        let value = self
            .nodes
            .snapshot_slot(self.slot(base, base_index)?, false);
        self.write_value(derived, derived_index, value, BuildMode::CloneFromBase)?;
        self.relink_slot(derived, derived_index)
    }

    /// Inserts a copy of a base item into a derived collection, keeping its identifier.
    pub(crate) fn clone_item_from_base(
        &mut self,
        derived: NodeId,
        derived_index: &Index,
        base: NodeId,
        base_index: &Index,
        item: ItemId,
    ) -> Result<()> {
        let value = self
            .nodes
            .snapshot_slot(self.slot(base, base_index)?, false);
        self.insert_value(derived, derived_index, value, Some(item), BuildMode::CloneFromBase)?;
        self.relink_slot(derived, derived_index)
    }

    /// Position in a derived sequence for a base item: right after the closest
    /// preceding base item the derived sequence still has, or first.
    pub(crate) fn derived_insert_position(
        &self,
        derived: NodeId,
        base: NodeId,
        item: ItemId,
    ) -> Result<usize> {
        let base_collection = self.collection(base)?;
        let derived_collection = self.collection(derived)?;
        let Some(Index::Position(base_position)) = base_collection.index_of(item) else {
            return Ok(derived_collection.len());
        };
        for position in (0..base_position).rev() {
            if let Some(sibling) = base_collection.id_at(&Index::Position(position))
                && let Some(Index::Position(p)) = derived_collection.index_of(sibling)
            {
                return Ok(p + 1);
            }
        }
        Ok(0)
    }
}
