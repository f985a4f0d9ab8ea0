use archetype::{
    OverrideType, Value,
    index::Index,
    value::{List, Object},
};

use crate::helpers::*;

#[test]
fn base_edits_reach_inherited_members_only() {
    let mut container = container();
    let (base, derived) = base_and_derived(&mut container);
    let base_string = member(&container, base, "MyString");
    let derived_string = member(&container, derived, "MyString");

    container
        .update(base_string, "MyBaseString", Index::Empty)
        .unwrap();
    assert_eq!(
        container.retrieve(derived_string, Index::Empty).unwrap(),
        "MyBaseString"
    );
    assert!(container.is_content_inherited(derived_string).unwrap());

    container
        .update(derived_string, "MyDerivedString", Index::Empty)
        .unwrap();
    assert_eq!(
        container.get_override(derived_string, &Index::Empty).unwrap(),
        OverrideType::New
    );

    container
        .update(base_string, "MyOtherBaseString", Index::Empty)
        .unwrap();
    assert_eq!(
        container.retrieve(derived_string, Index::Empty).unwrap(),
        "MyDerivedString"
    );
    assert!(!container.is_content_inherited(derived_string).unwrap());
}

#[test]
fn assets_without_base_never_override() {
    let mut container = container();
    let (base, _) = base_and_derived(&mut container);
    let base_string = member(&container, base, "MyString");
    let base_strings = member(&container, base, "MyStrings");

    container.update(base_string, "Edited", Index::Empty).unwrap();
    container
        .update(base_strings, "Edited", Index::Position(0))
        .unwrap();
    container.add(base_strings, "Added", None).unwrap();

    assert_eq!(
        container.get_override(base_string, &Index::Empty).unwrap(),
        OverrideType::Base
    );
    assert!(
        container
            .overridden_item_indices(base_strings)
            .unwrap()
            .is_empty()
    );
    assert!(
        container
            .generate_overrides(base)
            .unwrap()
            .is_empty()
    );

    // Explicit New flags are ignored without a base
    container
        .override_content(base_string, OverrideType::New)
        .unwrap();
    assert_eq!(
        container.get_override(base_string, &Index::Empty).unwrap(),
        OverrideType::Base
    );
}

#[test]
fn chains_of_derivation_propagate_depth_first() {
    let mut container = container();
    let (base, derived) = base_and_derived(&mut container);
    let grandchild = asset(3);
    container
        .derive_asset(derived, grandchild, "derived.asset")
        .unwrap();

    let base_int = member(&container, base, "MyInt");
    container.update(base_int, 7, Index::Empty).unwrap();
    assert_eq!(
        container
            .retrieve(member(&container, grandchild, "MyInt"), Index::Empty)
            .unwrap(),
        7
    );

    // An override in the middle stops the change for everything below it
    let derived_int = member(&container, derived, "MyInt");
    container.update(derived_int, 8, Index::Empty).unwrap();
    assert_eq!(
        container
            .retrieve(member(&container, grandchild, "MyInt"), Index::Empty)
            .unwrap(),
        8
    );
    container.update(base_int, 9, Index::Empty).unwrap();
    assert_eq!(
        container
            .retrieve(member(&container, grandchild, "MyInt"), Index::Empty)
            .unwrap(),
        8
    );
}

#[test]
fn reset_override_restores_the_base_value() {
    let mut container = container();
    let (base, derived) = base_and_derived(&mut container);
    let derived_string = member(&container, derived, "MyString");
    let derived_strings = member(&container, derived, "MyStrings");

    container
        .update(derived_string, "Local", Index::Empty)
        .unwrap();
    container
        .update(derived_strings, "Local", Index::Position(1))
        .unwrap();
    assert_eq!(
        container.overridden_item_indices(derived_strings).unwrap(),
        vec![Index::Position(1)]
    );

    container
        .reset_override(derived_string, Index::Empty)
        .unwrap();
    container
        .reset_override(derived_strings, Index::Position(1))
        .unwrap();

    assert_eq!(
        container.retrieve(derived_string, Index::Empty).unwrap(),
        "String"
    );
    assert_eq!(
        container
            .retrieve(derived_strings, Index::Position(1))
            .unwrap(),
        "String2"
    );
    assert!(container.is_content_inherited(derived_string).unwrap());
    assert!(
        container
            .is_item_inherited(derived_strings, &Index::Position(1))
            .unwrap()
    );
    assert!(container.generate_overrides(derived).unwrap().is_empty());

    // Inherits again
    let base_string = member(&container, base, "MyString");
    container.update(base_string, "Again", Index::Empty).unwrap();
    assert_eq!(
        container.retrieve(derived_string, Index::Empty).unwrap(),
        "Again"
    );
}

#[test]
fn reset_without_base_fails() {
    let mut container = container();
    let (base, _) = base_and_derived(&mut container);
    let err = container
        .reset_override(member(&container, base, "MyString"), Index::Empty)
        .unwrap_err();
    assert_eq!(err.module(), "graph");
    assert!(matches!(
        err,
        archetype::Error::Graph(archetype::graph::GraphError::NoBase { .. })
    ));
}

#[test]
fn explicit_override_flags_stop_propagation() {
    let mut container = container();
    let (base, derived) = base_and_derived(&mut container);
    let derived_int = member(&container, derived, "MyInt");

    container
        .override_content(derived_int, OverrideType::New)
        .unwrap();
    container
        .update(member(&container, base, "MyInt"), 5, Index::Empty)
        .unwrap();
    assert_eq!(container.retrieve(derived_int, Index::Empty).unwrap(), 1);

    container
        .override_content(derived_int, OverrideType::Base)
        .unwrap();
    container
        .update(member(&container, base, "MyInt"), 6, Index::Empty)
        .unwrap();
    assert_eq!(container.retrieve(derived_int, Index::Empty).unwrap(), 6);
}

#[test]
fn nested_object_members_inherit_individually() {
    let mut container = container();
    let base = asset(BASE);
    let derived = asset(DERIVED);
    container
        .create_asset(
            base,
            base_content().with("MyObject", my_object(60, "Nested", 1)),
        )
        .unwrap();
    container.derive_asset(base, derived, "base.asset").unwrap();

    let base_nested = member(&container, base, "MyObject");
    let derived_nested = member(&container, derived, "MyObject");
    let derived_name = container.child(derived_nested, "Name").unwrap();
    let derived_value = container.child(derived_nested, "Value").unwrap();

    container.update(derived_value, 10, Index::Empty).unwrap();
    container
        .update(container.child(base_nested, "Name").unwrap(), "Renamed", Index::Empty)
        .unwrap();
    container
        .update(container.child(base_nested, "Value").unwrap(), 20, Index::Empty)
        .unwrap();

    assert_eq!(
        container.retrieve(derived_name, Index::Empty).unwrap(),
        "Renamed"
    );
    assert_eq!(container.retrieve(derived_value, Index::Empty).unwrap(), 10);
    let overrides = container.generate_overrides(derived).unwrap();
    assert_eq!(overrides.len(), 1);
    assert_eq!(
        overrides.keys().next().unwrap().to_string(),
        "MyObject.Value"
    );
}

#[test]
fn replacing_an_object_overrides_the_member() {
    let mut container = container();
    let base = asset(BASE);
    let derived = asset(DERIVED);
    container
        .create_asset(
            base,
            base_content().with("MyObject", my_object(60, "Nested", 1)),
        )
        .unwrap();
    container.derive_asset(base, derived, "base.asset").unwrap();

    let derived_nested = member(&container, derived, "MyObject");
    container
        .update(
            derived_nested,
            Object::new("MyOtherObject").with("Name", "Other"),
            Index::Empty,
        )
        .unwrap();
    assert_eq!(
        container.get_override(derived_nested, &Index::Empty).unwrap(),
        OverrideType::New
    );

    // The replacement is not linked, base edits below the member do not reach it
    let base_nested = member(&container, base, "MyObject");
    container
        .update(container.child(base_nested, "Name").unwrap(), "Renamed", Index::Empty)
        .unwrap();
    let value = container.retrieve(derived_nested, Index::Empty).unwrap();
    let object = value.as_object().unwrap();
    assert_eq!(object.type_name(), "MyOtherObject");
    assert_eq!(object.get("Name").unwrap(), "Other");
}

#[test]
fn repeated_object_updates_reuse_node_slots() {
    let mut container = container();
    let (base, derived) = base_and_derived(&mut container);
    let base_objects = member(&container, base, "MyObjects");
    let derived_objects = member(&container, derived, "MyObjects");
    let replacement = |round: i64| {
        Object::new("MyObject")
            .with("Name", format!("Round {round}"))
            .with("Value", round)
    };

    let stale = container
        .indexed_target(derived_objects, &Index::Position(0))
        .unwrap()
        .unwrap();
    container
        .update(base_objects, replacement(0), Index::Position(0))
        .unwrap();
    let live = container.nodes().len();
    let capacity = container.nodes().capacity();

    for round in 1..=5 {
        container
            .update(base_objects, replacement(round), Index::Position(0))
            .unwrap();
        assert_eq!(container.nodes().len(), live);
        assert_eq!(container.nodes().capacity(), capacity);
    }

    // Ids of removed nodes never designate the nodes reusing their slots
    assert!(!container.nodes().contains(stale));
    assert!(container.retrieve(stale, Index::Empty).unwrap_err().is_not_found());
    let value = container
        .retrieve(derived_objects, Index::Position(0))
        .unwrap();
    assert_eq!(value.as_object().unwrap().get("Name").unwrap(), "Round 5");
}

#[test]
fn non_overridable_members_belong_to_each_asset() {
    let mut container = container();
    let (base, derived) = base_and_derived(&mut container);
    let base_locked = member(&container, base, "Locked");
    let derived_locked = member(&container, derived, "Locked");

    assert_eq!(
        container.retrieve(derived_locked, Index::Empty).unwrap(),
        "Base"
    );
    container
        .update(derived_locked, "Derived", Index::Empty)
        .unwrap();
    assert_eq!(
        container.get_override(derived_locked, &Index::Empty).unwrap(),
        OverrideType::Base
    );

    container
        .update(base_locked, "Changed", Index::Empty)
        .unwrap();
    assert_eq!(
        container.retrieve(derived_locked, Index::Empty).unwrap(),
        "Derived"
    );
    assert!(container.generate_overrides(derived).unwrap().is_empty());
}

#[test]
fn lists_without_identifiers_are_overridden_whole() {
    let mut container = container();
    let (base, derived) = base_and_derived(&mut container);
    let base_plain = member(&container, base, "MyPlain");
    let derived_plain = member(&container, derived, "MyPlain");

    container
        .update(base_plain, 10, Index::Position(0))
        .unwrap();
    assert_eq!(
        container.retrieve(derived_plain, Index::Empty).unwrap(),
        Value::List(List::from_values([10, 2]))
    );

    container.add(derived_plain, 3, None).unwrap();
    assert_eq!(
        container.get_override(derived_plain, &Index::Empty).unwrap(),
        OverrideType::New
    );
    assert_eq!(container.item_ids(derived_plain).unwrap().key_count(), 0);

    container
        .update(base_plain, 11, Index::Position(0))
        .unwrap();
    assert_eq!(
        container.retrieve(derived_plain, Index::Empty).unwrap(),
        Value::List(List::from_values([10, 2, 3]))
    );
}

#[test]
fn disabled_propagation_leaves_derived_assets_alone() {
    let mut container = detached_container();
    let (base, derived) = base_and_derived(&mut container);
    container
        .update(member(&container, base, "MyString"), "Changed", Index::Empty)
        .unwrap();
    assert_eq!(
        container
            .retrieve(member(&container, derived, "MyString"), Index::Empty)
            .unwrap(),
        "String"
    );
}

#[test]
fn type_mismatches_are_rejected() {
    let mut container = container();
    let (_, derived) = base_and_derived(&mut container);
    let err = container
        .update(member(&container, derived, "MyString"), 3, Index::Empty)
        .unwrap_err();
    assert!(err.is_type_error());

    let err = container
        .update(
            member(&container, derived, "MyString"),
            "x",
            Index::Position(0),
        )
        .unwrap_err();
    assert!(err.is_structural_mismatch());

    let err = container
        .update(
            member(&container, derived, "MyStrings"),
            "x",
            Index::key("Key1"),
        )
        .unwrap_err();
    assert!(err.is_structural_mismatch());
}
