//! Member names, type descriptions and the reference policy of composite hierarchies.

use serde::{Deserialize, Serialize};

use crate::{
    graph::{NodeArena, NodeId, ObjectReferencePolicy, owning_member},
    hierarchy::HierarchyError,
    ids::{AssetId, ObjectId},
    index::Index,
    schema::{AssetSchema, MemberDescriptor, SchemaError, TypeDescriptor, TypeRegistry, ValueKind},
    value::{List, Object, Value},
};

/// Names of the members a composite hierarchy is made of.
///
/// ```text
/// <asset>.Hierarchy            object
///     RootParts                list of part references
///     Parts                    identifiable list of designs
///         Part                 the owned part
///         Base                 BasePartInfo or null
/// <part>.Parent                part reference or null
/// <part>.Children              list of part references
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyLayout {
    pub hierarchy: String,
    pub root_parts: String,
    pub parts: String,
    pub part: String,
    pub base: String,
    pub parent: String,
    pub children: String,
}

impl Default for HierarchyLayout {
    fn default() -> Self {
        Self {
            hierarchy: "Hierarchy".to_string(),
            root_parts: "RootParts".to_string(),
            parts: "Parts".to_string(),
            part: "Part".to_string(),
            base: "Base".to_string(),
            parent: "Parent".to_string(),
            children: "Children".to_string(),
        }
    }
}

impl HierarchyLayout {
    /// Name of the hierarchy object type for parts of `part_type`.
    pub fn hierarchy_type(&self, part_type: &str) -> String {
        format!("{part_type}{}", self.hierarchy)
    }

    /// Name of the design type for parts of `part_type`.
    pub fn design_type(&self, part_type: &str) -> String {
        format!("{part_type}Design")
    }

    /// Descriptor of a part type with its `Parent` and `Children` members. Further
    /// members are added by the caller.
    pub fn part_descriptor(&self, part_type: &str) -> TypeDescriptor {
        TypeDescriptor::new(part_type)
            .identifiable()
            .member(MemberDescriptor::object(&self.parent, part_type))
            .member(MemberDescriptor::new(
                &self.children,
                ValueKind::list(ValueKind::object(part_type)),
            ))
    }

    /// Member holding the hierarchy of `part_type` parts, to add to the asset type.
    pub fn hierarchy_member(&self, part_type: &str) -> MemberDescriptor {
        MemberDescriptor::object(&self.hierarchy, self.hierarchy_type(part_type))
    }

    /// Registers the hierarchy and design types for `part_type`, and [`BasePartInfo`]
    /// unless it is already known. The part type itself is registered by the caller.
    pub fn register_types(
        &self,
        registry: &mut TypeRegistry,
        part_type: &str,
    ) -> Result<(), SchemaError> {
        let design_type = self.design_type(part_type);
        registry.register(
            TypeDescriptor::new(self.hierarchy_type(part_type))
                .member(MemberDescriptor::new(
                    &self.root_parts,
                    ValueKind::list(ValueKind::object(part_type)),
                ))
                .member(MemberDescriptor::new(
                    &self.parts,
                    ValueKind::list(ValueKind::object(&design_type)),
                )),
        )?;
        registry.register(
            TypeDescriptor::new(design_type)
                .member(MemberDescriptor::object(&self.part, part_type))
                .member(MemberDescriptor::object(&self.base, BasePartInfo::type_name())),
        )?;
        if !registry.contains(BasePartInfo::type_name()) {
            registry.register_schema::<BasePartInfo>()?;
        }
        Ok(())
    }

    /// Policy to register for the composite asset type.
    pub fn reference_policy(&self) -> HierarchyReferencePolicy {
        HierarchyReferencePolicy {
            part_member: self.part.clone(),
        }
    }

    /// A hierarchy object without parts.
    pub fn empty_hierarchy(&self, part_type: &str) -> Object {
        Object::new(self.hierarchy_type(part_type))
            .with(&self.root_parts, List::new())
            .with(&self.parts, List::new())
    }

    /// A design object for `part`.
    pub fn design(&self, part_type: &str, part: Object, base: Option<BasePartInfo>) -> Object {
        Object::new(self.design_type(part_type))
            .with(&self.part, part)
            .with(&self.base, base.map(|info| info.to_object()))
    }
}

/// Where an instantiated part comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasePartInfo {
    /// Asset holding the original part
    pub base_asset: AssetId,
    /// The original part
    pub base_part: ObjectId,
    /// Shared by every part created by the same instantiation
    pub instance_id: ObjectId,
}

const BASE_PART_ASSET: &str = "BasePartAsset";
const BASE_PART_ID: &str = "BasePartId";
const INSTANCE_ID: &str = "InstanceId";

impl AssetSchema for BasePartInfo {
    fn type_name() -> &'static str {
        "BasePartInfo"
    }

    fn describe() -> TypeDescriptor {
        TypeDescriptor::new(Self::type_name())
            .member(MemberDescriptor::text(BASE_PART_ASSET))
            .member(MemberDescriptor::text(BASE_PART_ID))
            .member(MemberDescriptor::text(INSTANCE_ID))
    }
}

impl BasePartInfo {
    pub fn to_object(&self) -> Object {
        Object::new(Self::type_name())
            .with(BASE_PART_ASSET, self.base_asset.to_string())
            .with(BASE_PART_ID, self.base_part.to_string())
            .with(INSTANCE_ID, self.instance_id.to_string())
    }

    /// Reads the value of a design's `Base` member. Null means the part is not an
    /// instance.
    pub fn from_value(part: ObjectId, value: &Value) -> Result<Option<Self>, HierarchyError> {
        let object = match value {
            Value::Null => return Ok(None),
            Value::Object(object) => object,
            other => {
                return Err(HierarchyError::InvalidBasePartInfo {
                    part,
                    reason: format!("expected an object, found {}", other.type_name()),
                });
            }
        };
        let id = |name: &str| -> Result<String, HierarchyError> {
            object
                .get(name)
                .and_then(Value::as_text)
                .map(str::to_string)
                .ok_or_else(|| HierarchyError::InvalidBasePartInfo {
                    part,
                    reason: format!("missing {name}"),
                })
        };
        let invalid = |name: &str| HierarchyError::InvalidBasePartInfo {
            part,
            reason: format!("{name} is not a valid id"),
        };
        Ok(Some(Self {
            base_asset: id(BASE_PART_ASSET)?
                .parse()
                .map_err(|_| invalid(BASE_PART_ASSET))?,
            base_part: id(BASE_PART_ID)?
                .parse()
                .map_err(|_| invalid(BASE_PART_ID))?,
            instance_id: id(INSTANCE_ID)?
                .parse()
                .map_err(|_| invalid(INSTANCE_ID))?,
        }))
    }
}

/// Treats every identifiable part value as a reference, except the part a design owns.
#[derive(Debug, Clone)]
pub struct HierarchyReferencePolicy {
    part_member: String,
}

impl ObjectReferencePolicy for HierarchyReferencePolicy {
    fn is_reference(&self, nodes: &NodeArena, holder: NodeId, _: &Index, _: &Value) -> bool {
        owning_member(nodes, holder).is_none_or(|member| member != self.part_member)
    }
}
