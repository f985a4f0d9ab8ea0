use archetype::{
    GraphContainer, Object,
    config::{GraphConfig, IdAllocation},
    ids::AssetId,
    index::Index,
    schema::{MemberDescriptor, TypeDescriptor, TypeRegistry, ValueKind},
    value::{List, Map},
};

use crate::helpers::*;

fn settings_container() -> GraphContainer {
    let mut registry = TypeRegistry::new();
    registry
        .register(
            TypeDescriptor::new("Settings")
                .member(MemberDescriptor::text("Name"))
                .member(MemberDescriptor::new("Tags", ValueKind::list(ValueKind::Text)))
                .member(MemberDescriptor::new("Values", ValueKind::map(ValueKind::Int))),
        )
        .unwrap();
    GraphContainer::with_config(
        registry,
        GraphConfig {
            id_allocation: IdAllocation::Sequential { start: 1 },
            ..Default::default()
        },
    )
}

/// A derived settings asset with one overridden member, one overridden item, one
/// deleted item and one overridden dictionary value.
fn derived_settings(container: &mut GraphContainer) -> (AssetId, AssetId) {
    let base = AssetId::from_seed(1);
    let derived = AssetId::from_seed(2);
    container
        .create_asset(
            base,
            Object::new("Settings")
                .with("Name", "Base")
                .with("Tags", List::from_values(["a", "b"]))
                .with("Values", Map::new().with("x", 1).with("y", 0)),
        )
        .unwrap();
    container.derive_asset(base, derived, "base.asset").unwrap();

    let root = container.root(derived).unwrap();
    let name = container.child(root, "Name").unwrap();
    let tags = container.child(root, "Tags").unwrap();
    let values = container.child(root, "Values").unwrap();
    container.update(name, "Derived", Index::Empty).unwrap();
    container.remove(tags, Index::Position(0)).unwrap();
    container.update(tags, "B", Index::Position(0)).unwrap();
    container.update(values, 2, Index::key("y")).unwrap();
    (base, derived)
}

#[test]
fn derived_assets_encode_their_override_markers() {
    let mut container = settings_container();
    let (base, derived) = derived_settings(&mut container);
    let root = container.root(base).unwrap();
    let tags = container.item_ids(container.child(root, "Tags").unwrap()).unwrap();
    let (a, b) = (
        tags.get(&Index::Position(0)).unwrap(),
        tags.get(&Index::Position(1)).unwrap(),
    );
    let values = container
        .item_ids(container.child(root, "Values").unwrap())
        .unwrap();
    let (x, y) = (
        values.get(&Index::key("x")).unwrap(),
        values.get(&Index::key("y")).unwrap(),
    );

    let text = container.encode_asset(derived).unwrap();
    let expected = format!(
        "!Settings\n\
         Id: {derived}\n\
         Archetype: {base}:base.asset\n\
         Name*: Derived\n\
         Tags:\n    \
             {b}*: B\n    \
             {a}: ~(Deleted)\n\
         Values:\n    \
             {x}~x: 1\n    \
             {y}*~y: 2\n"
    );
    assert_eq!(text, expected);
}

#[test]
fn decoding_then_encoding_reproduces_the_text() {
    let mut container = settings_container();
    let (base, derived) = derived_settings(&mut container);
    let base_text = container.encode_asset(base).unwrap();
    let derived_text = container.encode_asset(derived).unwrap();

    let mut reloaded = settings_container();
    assert_eq!(reloaded.decode_asset(&base_text).unwrap(), base);
    assert_eq!(reloaded.decode_asset(&derived_text).unwrap(), derived);
    assert_eq!(reloaded.encode_asset(base).unwrap(), base_text);
    assert_eq!(reloaded.encode_asset(derived).unwrap(), derived_text);

    // Links are restored: the inherited value still follows the base
    let base_values = reloaded
        .child(reloaded.root(base).unwrap(), "Values")
        .unwrap();
    reloaded.update(base_values, 5, Index::key("x")).unwrap();
    let derived_values = reloaded
        .child(reloaded.root(derived).unwrap(), "Values")
        .unwrap();
    assert_eq!(
        reloaded.retrieve(derived_values, Index::key("x")).unwrap(),
        5
    );
    assert_eq!(
        reloaded.retrieve(derived_values, Index::key("y")).unwrap(),
        2
    );
}

#[test]
fn full_assets_survive_a_round_trip() {
    let mut container = container();
    let (base, derived) = base_and_derived(&mut container);
    let derived_strings = member(&container, derived, "MyStrings");
    container
        .update(derived_strings, "Local", Index::Position(1))
        .unwrap();
    container.remove(derived_strings, Index::Position(3)).unwrap();
    container
        .rename_key(
            member(&container, derived, "MyDictionary"),
            Index::key("Key1"),
            "Renamed",
        )
        .unwrap();

    let base_text = container.encode_asset(base).unwrap();
    let derived_text = container.encode_asset(derived).unwrap();
    let mut reloaded = crate::helpers::container();
    reloaded.decode_asset(&base_text).unwrap();
    reloaded.decode_asset(&derived_text).unwrap();

    assert_eq!(
        reloaded.to_document(derived).unwrap(),
        container.to_document(derived).unwrap()
    );
    assert_eq!(
        reloaded.generate_overrides(derived).unwrap(),
        container.generate_overrides(derived).unwrap()
    );
    assert_eq!(
        live_ids(&reloaded, derived, "MyStrings"),
        live_ids(&container, derived, "MyStrings")
    );
    assert_eq!(
        reloaded.target(member(&reloaded, derived, "MyReference")).unwrap(),
        reloaded.find_object(derived, archetype::ids::ObjectId::from_seed(OBJECT_A))
    );
}

#[test]
fn inline_bases_load_with_the_derived_asset() {
    let mut container = container();
    let (base, derived) = base_and_derived(&mut container);
    let text = container.encode_asset_with_inline_base(derived).unwrap();
    assert!(text.contains("~Base:"));

    let mut reloaded = crate::helpers::container();
    assert_eq!(reloaded.decode_asset(&text).unwrap(), derived);
    assert_eq!(
        reloaded.to_document(base).unwrap(),
        container.to_document(base).unwrap()
    );
    reloaded
        .update(member(&reloaded, base, "MyString"), "Changed", Index::Empty)
        .unwrap();
    assert_eq!(
        reloaded
            .retrieve(member(&reloaded, derived, "MyString"), Index::Empty)
            .unwrap(),
        "Changed"
    );
}

#[test]
fn malformed_text_is_rejected() {
    let mut container = settings_container();
    let text = "!Settings\nId: 01000000-0100-0000-0100-000001000000\nTags:\n   01000000010000000100000001000000: a\n";
    let err = container.decode_asset(text).unwrap_err();
    assert_eq!(err.module(), "codec");
    assert!(err.is_malformed_encoding());

    let err = container
        .decode_asset("!Unknown\nId: 01000000-0100-0000-0100-000001000000\n")
        .unwrap_err();
    assert_eq!(err.module(), "codec");
    assert!(!err.is_malformed_encoding());
}
