//! Operations on a composite asset's part tree.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{
    Result,
    graph::{GraphContainer, NodeId, OverrideType},
    hierarchy::{BasePartInfo, HierarchyError, HierarchyLayout},
    ids::{AssetId, ObjectId},
    index::Index,
    value::{Object, Value},
};

/// Options of [`CompositeHierarchy::clone_sub_hierarchies`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloneFlags {
    /// Give every cloned part a fresh id
    pub generate_new_ids: bool,
    /// Null references to parts outside the cloned sub-hierarchies
    pub clean_external_references: bool,
}

/// Plain-data copy of one or more sub-hierarchies.
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyClone {
    /// Designs of every cloned part, parents before children
    pub designs: Vec<Object>,
    /// Ids of the cloned roots
    pub roots: Vec<ObjectId>,
    /// Original part id to clone id, when new ids were generated
    pub remapping: Option<BTreeMap<ObjectId, ObjectId>>,
}

/// Result of [`CompositeHierarchy::instantiate`].
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyInstance {
    pub instance_id: ObjectId,
    /// The new root parts
    pub roots: Vec<ObjectId>,
    /// Base part id to new part id
    pub parts: BTreeMap<ObjectId, ObjectId>,
}

/// View over the part tree of a composite asset held in a [`GraphContainer`].
///
/// The view stores no graph state; every operation takes the container.
///
/// # Example
///
/// ```
/// use archetype::graph::GraphContainer;
/// use archetype::hierarchy::{CompositeHierarchy, HierarchyLayout};
/// use archetype::ids::{AssetId, ObjectId};
/// use archetype::schema::{MemberDescriptor, TypeDescriptor, TypeRegistry};
/// use archetype::Object;
///
/// let layout = HierarchyLayout::default();
/// let mut registry = TypeRegistry::new();
/// registry.register(layout.part_descriptor("Entity").member(MemberDescriptor::text("Name")))?;
/// layout.register_types(&mut registry, "Entity")?;
/// registry.register(TypeDescriptor::new("Scene").member(layout.hierarchy_member("Entity")))?;
///
/// let mut container = GraphContainer::new(registry);
/// container.register_reference_policy("Scene", layout.reference_policy());
/// let scene = AssetId::new_random();
/// container.create_asset(
///     scene,
///     Object::new("Scene").with("Hierarchy", layout.empty_hierarchy("Entity")),
/// )?;
///
/// let hierarchy = CompositeHierarchy::new(scene);
/// let root = ObjectId::new_random();
/// let entity = Object::new("Entity").with_id(root).with("Name", "Root");
/// hierarchy.add_part(&mut container, layout.design("Entity", entity, None), None, None)?;
/// assert_eq!(hierarchy.root_part_ids(&container)?, vec![root]);
/// # Ok::<(), archetype::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeHierarchy {
    asset: AssetId,
    layout: HierarchyLayout,
}

fn identities(value: &Value) -> Vec<ObjectId> {
    match value {
        Value::List(list) => list
            .items()
            .iter()
            .filter_map(Value::object_identity)
            .collect(),
        _ => Vec::new(),
    }
}

impl CompositeHierarchy {
    pub fn new(asset: AssetId) -> Self {
        Self::with_layout(asset, HierarchyLayout::default())
    }

    pub fn with_layout(asset: AssetId, layout: HierarchyLayout) -> Self {
        Self { asset, layout }
    }

    pub fn asset(&self) -> AssetId {
        self.asset
    }

    pub fn layout(&self) -> &HierarchyLayout {
        &self.layout
    }

    fn not_found(&self, part: ObjectId) -> crate::Error {
        HierarchyError::PartNotFound {
            asset: self.asset.to_string(),
            part,
        }
        .into()
    }

    // ===== Queries =====

    /// Member node of the hierarchy object.
    fn hierarchy_member(&self, container: &GraphContainer, name: &str) -> Result<NodeId> {
        let hierarchy = container.child(container.root(self.asset)?, &self.layout.hierarchy)?;
        container.child(hierarchy, name)
    }

    pub fn root_part_ids(&self, container: &GraphContainer) -> Result<Vec<ObjectId>> {
        let root_parts = self.hierarchy_member(container, &self.layout.root_parts)?;
        Ok(identities(&container.retrieve(root_parts, Index::Empty)?))
    }

    /// Ids of every part, in design order.
    pub fn part_ids(&self, container: &GraphContainer) -> Result<Vec<ObjectId>> {
        let parts = self.hierarchy_member(container, &self.layout.parts)?;
        let Value::List(designs) = container.retrieve(parts, Index::Empty)? else {
            return Ok(Vec::new());
        };
        Ok(designs
            .items()
            .iter()
            .filter_map(|design| design.as_object()?.get(&self.layout.part)?.object_identity())
            .collect())
    }

    /// Object node of a part.
    pub fn part_node(&self, container: &GraphContainer, part: ObjectId) -> Result<NodeId> {
        container
            .find_object(self.asset, part)
            .ok_or_else(|| self.not_found(part))
    }

    /// Object node of the design owning a part.
    pub fn design_node(&self, container: &GraphContainer, part: ObjectId) -> Result<NodeId> {
        let node = self.part_node(container, part)?;
        let member = container
            .node(node)?
            .parent()
            .ok_or_else(|| self.not_found(part))?;
        let member_node = container.node(member)?;
        if member_node.name() != Some(self.layout.part.as_str()) {
            return Err(self.not_found(part));
        }
        member_node.parent().ok_or_else(|| self.not_found(part))
    }

    fn design_index(&self, container: &GraphContainer, part: ObjectId) -> Result<Index> {
        let design = self.design_node(container, part)?;
        container
            .nodes()
            .index_in_parent(design)
            .ok_or_else(|| self.not_found(part))
    }

    pub fn children(&self, container: &GraphContainer, part: ObjectId) -> Result<Vec<ObjectId>> {
        let node = self.part_node(container, part)?;
        let children = container.child(node, &self.layout.children)?;
        Ok(identities(&container.retrieve(children, Index::Empty)?))
    }

    pub fn parent(&self, container: &GraphContainer, part: ObjectId) -> Result<Option<ObjectId>> {
        let node = self.part_node(container, part)?;
        let parent = container.child(node, &self.layout.parent)?;
        Ok(container.retrieve(parent, Index::Empty)?.object_identity())
    }

    /// `roots` and every part below them, parents before children.
    pub fn descendants(
        &self,
        container: &GraphContainer,
        roots: &[ObjectId],
    ) -> Result<Vec<ObjectId>> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<ObjectId> = roots.iter().rev().copied().collect();
        while let Some(part) = stack.pop() {
            if !seen.insert(part) {
                continue;
            }
            order.push(part);
            stack.extend(self.children(container, part)?.into_iter().rev());
        }
        Ok(order)
    }

    fn design_part_id(&self, design: &Object) -> std::result::Result<ObjectId, HierarchyError> {
        design
            .get(&self.layout.part)
            .and_then(Value::object_identity)
            .ok_or_else(|| HierarchyError::InvalidDesign {
                reason: format!(
                    "{} has no identifiable {} member",
                    design.type_name(),
                    self.layout.part
                ),
            })
    }

    // ===== Cloning =====

    /// Copies the designs of `roots` and their descendants into plain data.
    ///
    /// References between cloned parts follow the clones. References leaving the
    /// cloned set are kept, or nulled with
    /// [`clean_external_references`](CloneFlags::clean_external_references).
    pub fn clone_sub_hierarchies(
        &self,
        container: &GraphContainer,
        roots: &[ObjectId],
        flags: CloneFlags,
    ) -> Result<HierarchyClone> {
        let parts = self.descendants(container, roots)?;
        let cloned: HashSet<ObjectId> = parts.iter().copied().collect();
        let remapping: Option<BTreeMap<ObjectId, ObjectId>> = flags
            .generate_new_ids
            .then(|| parts.iter().map(|p| (*p, ObjectId::new_random())).collect());
        let remap = |id: ObjectId| {
            remapping
                .as_ref()
                .and_then(|m| m.get(&id))
                .copied()
                .unwrap_or(id)
        };

        let mut designs = Vec::with_capacity(parts.len());
        for part in &parts {
            let mut design = container.retrieve(self.design_node(container, *part)?, Index::Empty)?;
            design.walk_mut(&mut |value: &mut Value| {
                if let Value::Reference(target) = value {
                    let target = *target;
                    if cloned.contains(&target) {
                        *value = Value::Reference(remap(target));
                    } else if flags.clean_external_references {
                        *value = Value::Null;
                    }
                    return;
                }
                match value {
                    Value::Object(object) => {
                        if let Some(id) = object.id()
                            && cloned.contains(&id)
                        {
                            object.set_id(Some(remap(id)));
                        }
                    }
                    Value::List(list) => list.ids_mut().clear_deleted(),
                    Value::Map(map) => map.ids_mut().clear_deleted(),
                    _ => {}
                }
            });
            let Value::Object(design) = design else {
                return Err(HierarchyError::InvalidDesign {
                    reason: format!("design of {part} is not an object"),
                }
                .into());
            };
            designs.push(design);
        }
        let roots = roots.iter().map(|root| remap(*root)).collect();
        tracing::debug!(
            asset = %self.asset,
            parts = designs.len(),
            new_ids = flags.generate_new_ids,
            "sub-hierarchies cloned"
        );
        Ok(HierarchyClone {
            designs,
            roots,
            remapping,
        })
    }

    // ===== Editing =====

    /// Adds one part and attaches it under `parent`, or as a root part.
    ///
    /// # Arguments
    /// * `design` - The design object, its part carrying an id
    /// * `parent` - The parent part, `None` for a root part
    /// * `index` - Position among the parent's children, `None` to append
    ///
    /// # Returns
    /// The id of the new part.
    pub fn add_part(
        &self,
        container: &mut GraphContainer,
        design: Object,
        parent: Option<ObjectId>,
        index: Option<usize>,
    ) -> Result<ObjectId> {
        let part = self.design_part_id(&design)?;
        self.add_parts(container, vec![design], &[part], parent, index)?;
        Ok(part)
    }

    /// Adds several designs at once and attaches `roots` under `parent`.
    ///
    /// References between the new parts resolve because the designs are built in a
    /// single operation.
    pub fn add_parts(
        &self,
        container: &mut GraphContainer,
        designs: Vec<Object>,
        roots: &[ObjectId],
        parent: Option<ObjectId>,
        index: Option<usize>,
    ) -> Result<()> {
        for design in &designs {
            let part = self.design_part_id(design)?;
            if container.find_object(self.asset, part).is_some() {
                return Err(HierarchyError::DuplicatePart {
                    asset: self.asset.to_string(),
                    part,
                }
                .into());
            }
        }
        if let Some(parent) = parent {
            self.part_node(container, parent)?;
        }
        let parts = self.hierarchy_member(container, &self.layout.parts)?;
        container.add_many(parts, designs.into_iter().map(Value::Object))?;
        for (offset, root) in roots.iter().enumerate() {
            self.attach(container, *root, parent, index.map(|i| i + offset))?;
        }
        Ok(())
    }

    fn attach(
        &self,
        container: &mut GraphContainer,
        part: ObjectId,
        parent: Option<ObjectId>,
        index: Option<usize>,
    ) -> Result<()> {
        let node = self.part_node(container, part)?;
        let parent_member = container.child(node, &self.layout.parent)?;
        container.update(parent_member, Value::from(parent), Index::Empty)?;
        let siblings = self.siblings_of(container, parent)?;
        container.add(siblings, Value::Reference(part), index.map(Index::Position))?;
        Ok(())
    }

    fn detach(&self, container: &mut GraphContainer, part: ObjectId) -> Result<()> {
        let parent = self.parent(container, part)?;
        let siblings = self.siblings_of(container, parent)?;
        let position = identities(&container.retrieve(siblings, Index::Empty)?)
            .iter()
            .position(|id| *id == part);
        if let Some(position) = position {
            container.remove(siblings, Index::Position(position))?;
        }
        Ok(())
    }

    /// The list a part with this parent is referenced from.
    fn siblings_of(&self, container: &GraphContainer, parent: Option<ObjectId>) -> Result<NodeId> {
        match parent {
            Some(parent) => {
                let node = self.part_node(container, parent)?;
                container.child(node, &self.layout.children)
            }
            None => self.hierarchy_member(container, &self.layout.root_parts),
        }
    }

    /// Removes a part and its descendants, detaching it from its parent.
    ///
    /// # Returns
    /// The ids of the removed parts.
    pub fn remove_part(&self, container: &mut GraphContainer, part: ObjectId) -> Result<Vec<ObjectId>> {
        let removed = self.descendants(container, &[part])?;
        self.detach(container, part)?;
        let parts = self.hierarchy_member(container, &self.layout.parts)?;
        for id in &removed {
            let node = self.part_node(container, *id)?;
            container.remove_custom_base_link(self.asset, node)?;
            let index = self.design_index(container, *id)?;
            container.remove(parts, index)?;
        }
        tracing::debug!(asset = %self.asset, part = %part, removed = removed.len(), "part removed");
        Ok(removed)
    }

    // ===== Instancing =====

    /// Creates an instance of sub-hierarchies of `base_asset` in this hierarchy.
    ///
    /// The parts are cloned with new ids and without references leaving the cloned
    /// set, stamped with a [`BasePartInfo`] sharing one instance id, and linked part
    /// by part to their originals. Later edits of the original parts propagate to the
    /// instance like any base edit. The parent of each new root is overridden.
    pub fn instantiate(
        &self,
        container: &mut GraphContainer,
        base_asset: AssetId,
        roots: &[ObjectId],
        parent: Option<ObjectId>,
        index: Option<usize>,
    ) -> Result<HierarchyInstance> {
        let base = CompositeHierarchy::with_layout(base_asset, self.layout.clone());
        let flags = CloneFlags {
            generate_new_ids: true,
            clean_external_references: true,
        };
        let HierarchyClone {
            mut designs,
            roots,
            remapping,
        } = base.clone_sub_hierarchies(container, roots, flags)?;
        let parts = remapping.unwrap_or_default();
        let originals: HashMap<ObjectId, ObjectId> =
            parts.iter().map(|(original, clone)| (*clone, *original)).collect();

        let instance_id = ObjectId::new_random();
        for design in &mut designs {
            let part = self.design_part_id(design)?;
            let base_part = originals.get(&part).copied().ok_or_else(|| {
                HierarchyError::InvalidDesign {
                    reason: format!("cloned part {part} has no original"),
                }
            })?;
            let info = BasePartInfo {
                base_asset,
                base_part,
                instance_id,
            };
            design.set(&self.layout.base, info.to_object());
        }
        self.add_parts(container, designs, &roots, parent, index)?;

        for (original, clone) in &parts {
            let derived = self.part_node(container, *clone)?;
            let base_node = base.part_node(container, *original)?;
            container.register_custom_base_link(self.asset, derived, base_node)?;
        }
        container.refresh_base(self.asset)?;
        for root in &roots {
            let node = self.part_node(container, *root)?;
            let parent_member = container.child(node, &self.layout.parent)?;
            container.override_content(parent_member, OverrideType::New)?;
        }
        tracing::debug!(
            asset = %self.asset,
            base_asset = %base_asset,
            instance = %instance_id,
            parts = parts.len(),
            "sub-hierarchy instantiated"
        );
        Ok(HierarchyInstance {
            instance_id,
            roots,
            parts,
        })
    }

    /// Rebuilds the part links of instances from their stored [`BasePartInfo`].
    ///
    /// Needed after the asset is loaded, since custom links are not part of the
    /// document. Parts whose original is not loaded stay unlinked.
    ///
    /// # Returns
    /// The number of parts linked.
    pub fn relink_parts(&self, container: &mut GraphContainer) -> Result<usize> {
        let parts = self.hierarchy_member(container, &self.layout.parts)?;
        let Value::List(designs) = container.retrieve(parts, Index::Empty)? else {
            return Ok(0);
        };
        let mut linked = 0;
        for design in designs.items().iter().filter_map(Value::as_object) {
            let Some(part) = design
                .get(&self.layout.part)
                .and_then(Value::object_identity)
            else {
                continue;
            };
            let base = design.get(&self.layout.base).unwrap_or(&Value::Null);
            let Some(info) = BasePartInfo::from_value(part, base)? else {
                continue;
            };
            let Some(base_node) = container.find_object(info.base_asset, info.base_part) else {
                tracing::warn!(
                    asset = %self.asset,
                    part = %part,
                    base_asset = %info.base_asset,
                    base_part = %info.base_part,
                    "original part not loaded, instance part left unlinked"
                );
                continue;
            };
            let derived = self.part_node(container, part)?;
            container.register_custom_base_link(self.asset, derived, base_node)?;
            linked += 1;
        }
        container.refresh_base(self.asset)?;
        Ok(linked)
    }
}
