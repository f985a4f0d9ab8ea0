//! Re-synchronizing a derived graph with its base.
//!
//! Reconciliation runs on demand, typically after a base and a derived document were
//! loaded from snapshots taken at different times. It works in two passes over the
//! derived asset:
//!
//! 1. Content. For every inherited collection, items the base removed are removed,
//!    items the base added are inserted, keys the base renamed are renamed, and every
//!    inherited value that differs from its base is overwritten. Overridden (New)
//!    values and non-overridable members are left alone.
//! 2. References. Inherited reference slots are pointed at the derived counterpart of
//!    the object the base references. A target that cannot be found leaves the slot
//!    null.
//!
//! Own references whose target the content pass removed are nulled as the target goes
//! and reported like broken inherited ones.
//!
//! Problems found on the way are recovered locally and listed in the returned
//! [`ReconcileReport`]. A second reconciliation of a converged pair changes nothing and
//! reports nothing.

use std::fmt;

use crate::{
    Result,
    graph::{
        GraphContainer, NodeId,
        node::{NodeKind, Slot},
    },
    ids::{AssetId, ItemId, ObjectId},
    index::Index,
};

/// A recoverable problem found while reconciling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// A reference whose target no longer exists was set to null.
    BrokenReference { path: String, target: ObjectId },
    /// An inherited object was replaced because its base counterpart changed type.
    TypeChanged {
        path: String,
        base_type: String,
        derived_type: String,
    },
    /// An item added in the base uses a key the derived dictionary already has. The
    /// base item is recorded as deleted in the derived dictionary.
    IdentifierCollision {
        path: String,
        key: String,
        item_id: ItemId,
    },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::BrokenReference { path, target } => {
                write!(f, "broken reference at {path} to {target}")
            }
            Anomaly::TypeChanged {
                path,
                base_type,
                derived_type,
            } => write!(
                f,
                "type changed at {path}: base {base_type}, derived {derived_type}"
            ),
            Anomaly::IdentifierCollision { path, key, item_id } => {
                write!(f, "key {key} at {path} collides with base item {item_id}")
            }
        }
    }
}

/// Outcome of [`GraphContainer::reconcile_with_base`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub anomalies: Vec<Anomaly>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.anomalies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.anomalies.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Anomaly> + '_ {
        self.anomalies.iter()
    }

    fn record(&mut self, anomaly: Anomaly) {
        tracing::warn!(anomaly = %anomaly, "reconciliation anomaly");
        self.anomalies.push(anomaly);
    }
}

impl GraphContainer {
    /// Re-aligns a derived asset with the current state of its base.
    ///
    /// Base links are recomputed first. Assets without a loaded base are left
    /// unchanged.
    ///
    /// # Returns
    /// The anomalies that were recovered, see [`Anomaly`].
    pub fn reconcile_with_base(&mut self, asset: AssetId) -> Result<ReconcileReport> {
        self.refresh_base(asset)?;
        let mut report = ReconcileReport::default();
        let graph = self.graph(asset)?;
        let root = graph.root;
        if self.nodes.get(root)?.base.is_none() && graph.custom_links.is_empty() {
            tracing::debug!(asset = %asset, "no base loaded, nothing to reconcile");
            return Ok(report);
        }
        self.broken_references = Some(Vec::new());
        let result = self
            .reconcile_node(root, &mut report)
            .and_then(|()| self.reconcile_references(asset, &mut report));
        for (path, target) in self.broken_references.take().unwrap_or_default() {
            report.record(Anomaly::BrokenReference { path, target });
        }
        result?;
        tracing::debug!(
            asset = %asset,
            anomalies = report.len(),
            "reconciled with base"
        );
        Ok(report)
    }

    // ===== Content pass =====

    fn reconcile_node(&mut self, node: NodeId, report: &mut ReconcileReport) -> Result<()> {
        let n = self.nodes.get(node)?;
        if !n.can_override {
            return Ok(());
        }
        let Some(base) = n.base else {
            // Custom-linked content can sit below unlinked nodes
            for child in self.nodes.owned_children(node) {
                self.reconcile_node(child, report)?;
            }
            return Ok(());
        };
        match &n.kind {
            NodeKind::Object(o) => {
                for member in o.members.clone() {
                    self.reconcile_node(member, report)?;
                }
                Ok(())
            }
            NodeKind::Member(_) => {
                if n.overrides.content().is_new() {
                    return Ok(());
                }
                self.reconcile_slot(node, &Index::Empty, base, &Index::Empty, report)
            }
            NodeKind::Collection(_) => self.reconcile_collection(node, base, report),
        }
    }

    /// Aligns one inherited slot with its base slot.
    ///
    /// Reference slots of the base are left to the reference pass.
    fn reconcile_slot(
        &mut self,
        holder: NodeId,
        index: &Index,
        base_holder: NodeId,
        base_index: &Index,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let derived = self.slot(holder, index)?.clone();
        let base = self.slot(base_holder, base_index)?.clone();
        match (&derived, &base) {
            (_, Slot::Reference(_)) => Ok(()),
            (Slot::Owned(d), Slot::Owned(b)) => {
                let (d, b) = (*d, *b);
                match (&self.nodes.get(d)?.kind, &self.nodes.get(b)?.kind) {
                    (NodeKind::Object(o), NodeKind::Object(bo)) if o.type_name == bo.type_name => {
                        self.ensure_linked(holder, index, d, b)?;
                        self.reconcile_node(d, report)
                    }
                    (NodeKind::Object(o), NodeKind::Object(bo)) => {
                        report.record(Anomaly::TypeChanged {
                            path: self.slot_path(holder, index),
                            base_type: bo.type_name.clone(),
                            derived_type: o.type_name.clone(),
                        });
                        self.copy_from_base(holder, index, base_holder, base_index)
                    }
                    (NodeKind::Collection(c), NodeKind::Collection(bc))
                        if c.is_sequence() == bc.is_sequence() && c.identifiable =>
                    {
                        self.ensure_linked(holder, index, d, b)?;
                        self.reconcile_collection(d, b, report)
                    }
                    (NodeKind::Collection(c), NodeKind::Collection(bc))
                        if c.is_sequence() == bc.is_sequence() =>
                    {
                        if self.nodes.snapshot(d, false) != self.nodes.snapshot(b, false) {
                            self.copy_from_base(holder, index, base_holder, base_index)?;
                        }
                        Ok(())
                    }
                    _ => self.copy_from_base(holder, index, base_holder, base_index),
                }
            }
            (d, b) if d == b => Ok(()),
            _ => {
                tracing::trace!(
                    path = %self.slot_path(holder, index),
                    "inherited value differs from base, realigned"
                );
                self.copy_from_base(holder, index, base_holder, base_index)
            }
        }
    }

    fn reconcile_collection(
        &mut self,
        derived: NodeId,
        base: NodeId,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        if !self.collection(derived)?.identifiable {
            return Ok(());
        }

        // Items the base removed
        let removed: Vec<ItemId> = {
            let d = self.collection(derived)?;
            let b = self.collection(base)?;
            let overrides = &self.nodes.get(derived)?.overrides;
            d.indices()
                .iter()
                .filter_map(|index| d.id_at(index))
                .filter(|id| !b.ids.contains_id(*id) && overrides.item(*id).is_base())
                .collect()
        };
        for id in removed {
            if let Some(index) = self.collection(derived)?.index_of(id) {
                tracing::debug!(
                    path = %self.nodes.path_of(derived),
                    item_id = %id,
                    "item removed from base, removed here"
                );
                self.remove_item(derived, &index, false)?;
            }
        }

        // Tombstones of items the base no longer has
        let stale: Vec<ItemId> = {
            let b = &self.collection(base)?.ids;
            self.collection(derived)?
                .ids
                .deleted_items()
                .filter(|id| !b.contains_id(*id))
                .collect()
        };
        let d = self.collection_mut(derived)?;
        for id in stale {
            d.ids.unmark_as_deleted(id);
        }

        // Items the base added
        let base_items: Vec<(Index, ItemId)> = {
            let b = self.collection(base)?;
            b.indices()
                .into_iter()
                .filter_map(|index| b.id_at(&index).map(|id| (index, id)))
                .collect()
        };
        for (base_index, id) in &base_items {
            let d = self.collection(derived)?;
            if d.ids.contains_id(*id) || d.ids.is_deleted(*id) {
                continue;
            }
            let index = match base_index {
                Index::Key(key) => {
                    if d.offset(base_index).is_some() {
                        let path = self.nodes.path_of(derived);
                        self.collection_mut(derived)?.ids.mark_as_deleted(*id);
                        report.record(Anomaly::IdentifierCollision {
                            path,
                            key: key.clone(),
                            item_id: *id,
                        });
                        continue;
                    }
                    base_index.clone()
                }
                _ => Index::Position(self.derived_insert_position(derived, base, *id)?),
            };
            tracing::debug!(
                path = %self.nodes.path_of(derived),
                item_id = %id,
                "item added in base, inserted here"
            );
            self.clone_item_from_base(derived, &index, base, base_index, *id)?;
        }

        // Keys and values of items both sides have
        for (base_index, id) in &base_items {
            let Some(mut index) = self.collection(derived)?.index_of(*id) else {
                continue;
            };
            let overrides = self.nodes.get(derived)?.overrides.clone();
            let renamed = match (&index, base_index) {
                (Index::Key(current), Index::Key(base_key)) if current != base_key => {
                    Some((current.clone(), base_key.clone()))
                }
                _ => None,
            };
            if let Some((current, base_key)) = renamed
                && overrides.key(*id).is_base()
                && self.collection(derived)?.offset(base_index).is_none()
            {
                self.rename_item(derived, &current, &base_key)?;
                index = base_index.clone();
            }
            if overrides.item(*id).is_new() {
                self.note_overridden_type(derived, &index, base, base_index);
                continue;
            }
            self.reconcile_slot(derived, &index, base, base_index, report)?;
        }
        Ok(())
    }

    /// Relinks a slot whose content is not linked to the expected base node.
    fn ensure_linked(
        &mut self,
        holder: NodeId,
        index: &Index,
        derived: NodeId,
        base: NodeId,
    ) -> Result<()> {
        if self.nodes.get(derived)?.base != Some(base) {
            self.relink_slot(holder, index)?;
        }
        Ok(())
    }

    /// An overridden item keeps its own type even when the base changed type too.
    fn note_overridden_type(&self, derived: NodeId, index: &Index, base: NodeId, base_index: &Index) {
        let type_of = |holder: NodeId, index: &Index| {
            let target = self.slot(holder, index).ok()?.owned()?;
            self.nodes.get(target).ok()?.type_name().map(str::to_string)
        };
        if let (Some(derived_type), Some(base_type)) =
            (type_of(derived, index), type_of(base, base_index))
            && derived_type != base_type
        {
            tracing::debug!(
                path = %self.slot_path(derived, index),
                base_type = %base_type,
                derived_type = %derived_type,
                "overridden item keeps its own type"
            );
        }
    }

    // ===== Reference pass =====

    fn reconcile_references(&mut self, asset: AssetId, report: &mut ReconcileReport) -> Result<()> {
        let root = self.graph(asset)?.root;

        let mut slots = Vec::new();
        for holder in self.nodes.subtree(root) {
            let n = self.nodes.get(holder)?;
            if !n.can_override {
                continue;
            }
            match &n.kind {
                NodeKind::Member(_) => {
                    if n.overrides.content().is_base()
                        && let Some(base) = n.base
                    {
                        slots.push((holder, Index::Empty, base, Index::Empty));
                    }
                }
                NodeKind::Collection(c) => {
                    let base = n.base.and_then(|b| self.nodes.get(b).ok()?.as_collection().map(|bc| (b, bc)));
                    for index in c.indices() {
                        let inherited = c.id_at(&index).and_then(|id| {
                            if n.overrides.item(id).is_new() {
                                return None;
                            }
                            let (b, bc) = base?;
                            Some((b, bc.index_of(id)?))
                        });
                        if let Some((b, base_index)) = inherited {
                            slots.push((holder, index, b, base_index));
                        }
                    }
                }
                NodeKind::Object(_) => {}
            }
        }

        // Own references never point at removed nodes: removals null them as they go
        for (holder, index, base_holder, base_index) in slots {
            let current = self.slot(holder, &index)?.clone();
            let Slot::Reference(base_target) = self.slot(base_holder, &base_index)?.clone() else {
                continue;
            };
            let base_asset = self.nodes.get(base_holder)?.asset;
            match self.expected_reference(asset, base_asset, base_target) {
                Some(target) if current != Slot::Reference(target) => {
                    tracing::debug!(
                        path = %self.slot_path(holder, &index),
                        "inherited reference realigned"
                    );
                    self.set_slot(holder, &index, Slot::Reference(target))?;
                }
                Some(_) => {}
                None if !current.is_null() => {
                    let target = self.nodes.get(base_target)?.identity();
                    self.set_slot(holder, &index, Slot::Null)?;
                    if let Some(target) = target {
                        report.record(Anomaly::BrokenReference {
                            path: self.slot_path(holder, &index),
                            target,
                        });
                    }
                }
                None => {}
            }
        }
        Ok(())
    }

    /// The object a derived reference should point to, given the base's target.
    ///
    /// Targets inside the base asset map to their derived counterpart; targets in other
    /// assets are shared as is.
    fn expected_reference(
        &self,
        asset: AssetId,
        base_asset: AssetId,
        base_target: NodeId,
    ) -> Option<NodeId> {
        let target = self.nodes.get(base_target).ok()?;
        if target.asset != base_asset {
            return Some(base_target);
        }
        // Instanced parts link to originals carrying another identity
        if let Some(counterpart) = self.counterpart_in(base_target, asset)
            && self.nodes.get(counterpart).is_ok_and(|n| n.identity().is_some())
        {
            return Some(counterpart);
        }
        target.identity().and_then(|id| self.pooled(asset, id))
    }

    pub(crate) fn slot_path(&self, holder: NodeId, index: &Index) -> String {
        format!("{}{}", self.nodes.path_of(holder), index)
    }
}
