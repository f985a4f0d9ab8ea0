//! Detached asset documents and override capture.
//!
//! An [`AssetDocument`] is everything needed to rebuild an asset: its plain-data root,
//! its base reference and the override flags of its graph, keyed by [`AssetPath`]. The
//! codec turns documents into text and back; this module moves them in and out of a
//! [`GraphContainer`].

use std::collections::BTreeMap;

use crate::{
    Result,
    graph::{
        GraphContainer, GraphError, NodeId, OverrideType,
        build::BuildMode,
        container::BaseReference,
        node::NodeKind,
        path::AssetPath,
    },
    ids::AssetId,
    value::{Object, Value},
};

/// A base document embedded inside a derived one.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineBase {
    pub location: String,
    pub document: AssetDocument,
}

/// Plain-data form of one asset.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetDocument {
    pub asset_id: AssetId,
    pub root: Object,
    /// Base of the asset, if it is derived
    pub archetype: Option<BaseReference>,
    /// Overridden values, everything absent is inherited
    pub overrides: BTreeMap<AssetPath, OverrideType>,
    /// The base document itself, when embedded
    pub base: Option<Box<InlineBase>>,
}

impl AssetDocument {
    /// A document without base and overrides.
    pub fn new(asset_id: AssetId, root: Object) -> Self {
        Self {
            asset_id,
            root,
            archetype: None,
            overrides: BTreeMap::new(),
            base: None,
        }
    }

    /// Override flag recorded for `path`.
    pub fn override_at(&self, path: &AssetPath) -> OverrideType {
        self.overrides.get(path).copied().unwrap_or_default()
    }
}

impl GraphContainer {
    /// Collects the New flags of an asset, keyed by the path of the flagged value.
    ///
    /// Member content is keyed by the member path, item values by a path ending with
    /// [`PathSegment::Item`](super::PathSegment::Item) and dictionary keys by a path
    /// ending with [`PathSegment::Key`](super::PathSegment::Key).
    pub fn generate_overrides(&self, asset: AssetId) -> Result<BTreeMap<AssetPath, OverrideType>> {
        let root = self.graph(asset)?.root;
        let mut overrides = BTreeMap::new();
        self.collect_overrides(root, AssetPath::root(), &mut overrides)?;
        Ok(overrides)
    }

    fn collect_overrides(
        &self,
        node: NodeId,
        path: AssetPath,
        overrides: &mut BTreeMap<AssetPath, OverrideType>,
    ) -> Result<()> {
        let n = self.nodes.get(node)?;
        match &n.kind {
            NodeKind::Object(o) => {
                for member in &o.members {
                    let name = self.nodes.get(*member)?.name().unwrap_or_default();
                    self.collect_overrides(*member, path.clone().with_member(name), overrides)?;
                }
            }
            NodeKind::Member(m) => {
                if n.overrides.content().is_new() {
                    overrides.insert(path.clone(), OverrideType::New);
                }
                if let Some(target) = m.slot.owned() {
                    self.collect_overrides(target, path, overrides)?;
                }
            }
            NodeKind::Collection(c) => {
                for (position, (index, slot)) in c.slots().into_iter().enumerate() {
                    let item_path = match c.id_at(&index) {
                        Some(id) => {
                            if n.overrides.item(id).is_new() {
                                overrides.insert(path.clone().with_item(id), OverrideType::New);
                            }
                            if n.overrides.key(id).is_new() {
                                overrides.insert(path.clone().with_key(id), OverrideType::New);
                            }
                            path.clone().with_item(id)
                        }
                        None => path.clone().with_position(position),
                    };
                    if let Some(target) = slot.owned() {
                        self.collect_overrides(target, item_path, overrides)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Sets override flags captured by [`generate_overrides`](Self::generate_overrides).
    ///
    /// Flags are written as given, without looking at base links, so they can be
    /// applied before the base is loaded. Paths that do not resolve are skipped.
    ///
    /// # Returns
    /// The number of flags applied.
    pub fn apply_overrides(
        &mut self,
        asset: AssetId,
        overrides: &BTreeMap<AssetPath, OverrideType>,
    ) -> Result<usize> {
        let mut applied = 0;
        for (path, value) in overrides {
            let resolved = match self.node_at(asset, path) {
                Ok(resolved) => resolved,
                Err(err) => {
                    tracing::warn!(
                        asset = %asset,
                        path = %path,
                        error = %err,
                        "override path does not resolve, skipped"
                    );
                    continue;
                }
            };
            let node = self.nodes.get_mut(resolved.node)?;
            if !node.can_override {
                continue;
            }
            if resolved.index.is_empty() {
                node.overrides.set_content(*value);
            } else if let Some(id) = node.as_collection().and_then(|c| c.id_at(&resolved.index)) {
                if resolved.on_key {
                    node.overrides.set_key(id, *value);
                } else {
                    node.overrides.set_item(id, *value);
                }
            } else {
                continue;
            }
            applied += 1;
        }
        Ok(applied)
    }

    /// Detaches an asset into a document.
    pub fn to_document(&self, asset: AssetId) -> Result<AssetDocument> {
        let graph = self.graph(asset)?;
        let Value::Object(root) = self.nodes.snapshot(graph.root, true) else {
            return Err(GraphError::NodeNotFound {
                node: graph.root.to_string(),
            }
            .into());
        };
        Ok(AssetDocument {
            asset_id: asset,
            root,
            archetype: graph.base.clone(),
            overrides: self.generate_overrides(asset)?,
            base: None,
        })
    }

    /// Detaches an asset into a document that embeds its base document, recursively.
    pub fn to_document_with_inline_base(&self, asset: AssetId) -> Result<AssetDocument> {
        let mut document = self.to_document(asset)?;
        if let Some(reference) = &document.archetype
            && self.contains_asset(reference.asset)
        {
            document.base = Some(Box::new(InlineBase {
                location: reference.location.clone(),
                document: self.to_document_with_inline_base(reference.asset)?,
            }));
        }
        Ok(document)
    }

    /// Builds an asset from a document.
    ///
    /// An inline base is loaded first unless its asset is already present. The new
    /// graph is linked to its base, and assets already loaded that derive from it are
    /// relinked. No reconciliation happens; call
    /// [`reconcile_with_base`](Self::reconcile_with_base) when the base may have
    /// changed since the document was written.
    ///
    /// # Returns
    /// The id of the loaded asset.
    pub fn load_document(&mut self, document: AssetDocument) -> Result<AssetId> {
        let AssetDocument {
            asset_id,
            root,
            archetype,
            overrides,
            base,
        } = document;
        if let Some(inline) = base
            && !self.contains_asset(inline.document.asset_id)
        {
            self.load_document(inline.document)?;
        }
        self.registry.check(&root)?;
        self.insert_graph(asset_id, root, archetype, BuildMode::Local)?;
        self.apply_overrides(asset_id, &overrides)?;
        self.refresh_base(asset_id)?;
        self.refresh_dependents_of(asset_id)?;
        tracing::debug!(asset = %asset_id, overrides = overrides.len(), "document loaded");
        Ok(asset_id)
    }

    /// Re-verifies the item identifier tables of an asset before it is written out.
    ///
    /// Does nothing unless [`GraphConfig::repair_item_ids`](crate::config::GraphConfig)
    /// is set. Override flags of identifiers that were dropped are forgotten.
    ///
    /// # Returns
    /// The number of collections that were repaired.
    pub fn prepare_for_save(&mut self, asset: AssetId) -> Result<usize> {
        if !self.config.repair_item_ids {
            return Ok(0);
        }
        let root = self.graph(asset)?.root;
        let mut repaired = 0;
        for node in self.nodes.subtree(root) {
            let Some(c) = self.nodes.get(node)?.as_collection() else {
                continue;
            };
            if !c.identifiable {
                continue;
            }
            let keys: Option<Vec<String>> = (!c.is_sequence()).then(|| {
                c.indices()
                    .into_iter()
                    .filter_map(|index| index.as_key().map(str::to_string))
                    .collect()
            });
            let len = c.len();
            let mut ids = c.ids.clone();
            let changed = match &keys {
                Some(keys) => ids.repair_keys(keys.iter().map(String::as_str), self.ids.as_mut()),
                None => ids.repair_sequence(len, self.ids.as_mut()),
            };
            if !changed {
                continue;
            }
            tracing::warn!(
                asset = %asset,
                path = %self.nodes.path_of(node),
                "item identifiers disagreed with the collection, repaired"
            );
            let n = self.nodes.get_mut(node)?;
            let stale: Vec<_> = n
                .overrides
                .overridden_items()
                .chain(n.overrides.overridden_keys())
                .filter(|id| !ids.contains_id(*id))
                .collect();
            for id in stale {
                n.overrides.forget_item(id);
            }
            if let Some(c) = n.as_collection_mut() {
                c.ids = ids;
            }
            repaired += 1;
        }
        Ok(repaired)
    }
}
