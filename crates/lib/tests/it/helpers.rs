//! Shared fixtures: the test type registry, containers with deterministic ids and
//! small navigation helpers.

use archetype::{
    GraphContainer, Object,
    config::{GraphConfig, IdAllocation},
    graph::{MemberReferences, NodeId},
    ids::{AssetId, ItemId, ObjectId},
    index::Index,
    schema::{MemberDescriptor, TypeDescriptor, TypeRegistry, ValueKind},
    value::{List, Map},
};

/// Registry with the asset type used across the suite.
///
/// ```text
/// MyAsset
///     MyString        text
///     MyInt           int
///     MyStrings       list of text
///     MyDictionary    map of text
///     MyObject        MyObject
///     MyObjects       list of MyObject
///     MyReference     MyObject, always a reference
///     MyPlain         list of int without item identifiers
///     Locked          text, not overridable
/// MyObject            identifiable: Name, Value
/// MyOtherObject       identifiable: Name
/// ```
pub fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .register(
            TypeDescriptor::new("MyAsset")
                .member(MemberDescriptor::text("MyString"))
                .member(MemberDescriptor::int("MyInt"))
                .member(MemberDescriptor::new(
                    "MyStrings",
                    ValueKind::list(ValueKind::Text),
                ))
                .member(MemberDescriptor::new(
                    "MyDictionary",
                    ValueKind::map(ValueKind::Text),
                ))
                .member(MemberDescriptor::object("MyObject", "MyObject"))
                .member(MemberDescriptor::new(
                    "MyObjects",
                    ValueKind::list(ValueKind::object("MyObject")),
                ))
                .member(MemberDescriptor::object("MyReference", "MyObject"))
                .member(
                    MemberDescriptor::new("MyPlain", ValueKind::list(ValueKind::Int))
                        .non_identifiable_items(),
                )
                .member(MemberDescriptor::text("Locked").non_overridable()),
        )
        .expect("MyAsset registers");
    registry
        .register(
            TypeDescriptor::new("MyObject")
                .identifiable()
                .member(MemberDescriptor::text("Name"))
                .member(MemberDescriptor::int("Value")),
        )
        .expect("MyObject registers");
    registry
        .register(
            TypeDescriptor::new("MyOtherObject")
                .identifiable()
                .member(MemberDescriptor::text("Name")),
        )
        .expect("MyOtherObject registers");
    registry
}

/// Container over [`registry`] with sequential identifiers and live propagation.
pub fn container() -> GraphContainer {
    container_with(GraphConfig {
        id_allocation: IdAllocation::Sequential { start: 100 },
        ..Default::default()
    })
}

/// Container whose base edits are only picked up by reconciliation.
pub fn detached_container() -> GraphContainer {
    container_with(GraphConfig {
        propagate_changes_from_base: false,
        id_allocation: IdAllocation::Sequential { start: 100 },
        ..Default::default()
    })
}

pub fn container_with(config: GraphConfig) -> GraphContainer {
    let mut container = GraphContainer::with_config(registry(), config);
    container.register_reference_policy("MyAsset", MemberReferences::new(["MyReference"]));
    container
}

pub const BASE: u32 = 1;
pub const DERIVED: u32 = 2;
pub const OBJECT_A: u32 = 50;

pub fn asset(seed: u32) -> AssetId {
    AssetId::from_seed(seed)
}

pub fn my_object(seed: u32, name: &str, value: i64) -> Object {
    Object::new("MyObject")
        .with_id(ObjectId::from_seed(seed))
        .with("Name", name)
        .with("Value", value)
}

/// The base content most tests start from.
pub fn base_content() -> Object {
    Object::new("MyAsset")
        .with("MyString", "String")
        .with("MyInt", 1)
        .with(
            "MyStrings",
            List::from_values(["String1", "String2", "String3", "String4"]),
        )
        .with(
            "MyDictionary",
            Map::new().with("Key1", "String1").with("Key2", "String2"),
        )
        .with(
            "MyObjects",
            List::new().with(my_object(OBJECT_A, "A", 1)),
        )
        .with("MyReference", ObjectId::from_seed(OBJECT_A))
        .with("MyPlain", List::from_values([1, 2]))
        .with("Locked", "Base")
}

/// Creates the base asset and a derived copy of it.
pub fn base_and_derived(container: &mut GraphContainer) -> (AssetId, AssetId) {
    let base = asset(BASE);
    let derived = asset(DERIVED);
    container
        .create_asset(base, base_content())
        .expect("base asset created");
    container
        .derive_asset(base, derived, "base.asset")
        .expect("derived asset created");
    (base, derived)
}

/// Member node of an asset's root object.
pub fn member(container: &GraphContainer, asset: AssetId, name: &str) -> NodeId {
    let root = container.root(asset).expect("asset is loaded");
    container.child(root, name).expect("member exists")
}

/// Item identifiers of a collection member, in index order.
pub fn live_ids(container: &GraphContainer, asset: AssetId, name: &str) -> Vec<ItemId> {
    let node = member(container, asset, name);
    let ids = container.item_ids(node).expect("member holds a collection");
    let len = ids.key_count();
    (0..len)
        .filter_map(|position| ids.get(&Index::Position(position)))
        .collect()
}

/// Item identifier of a dictionary key.
pub fn key_id(container: &GraphContainer, asset: AssetId, name: &str, key: &str) -> ItemId {
    let node = member(container, asset, name);
    container
        .item_ids(node)
        .expect("member holds a collection")
        .get(&Index::key(key))
        .expect("key has an identifier")
}
