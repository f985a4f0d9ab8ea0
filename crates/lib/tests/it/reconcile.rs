use archetype::{
    GraphContainer, Object, OverrideType,
    graph::Anomaly,
    ids::ObjectId,
    index::Index,
};

use crate::helpers::*;

/// Reconciles and checks that a second pass finds nothing left to do.
fn reconcile_converged(container: &mut GraphContainer, derived: archetype::ids::AssetId) {
    let before = container.to_document(derived).unwrap();
    let report = container.reconcile_with_base(derived).unwrap();
    assert!(report.is_empty(), "second pass reported {:?}", report.anomalies);
    assert_eq!(container.to_document(derived).unwrap(), before);
}

#[test]
fn base_additions_are_picked_up() {
    let mut container = detached_container();
    let (base, derived) = base_and_derived(&mut container);
    let base_dictionary = member(&container, base, "MyDictionary");
    let derived_dictionary = member(&container, derived, "MyDictionary");

    let added = container
        .add(base_dictionary, "String2.5", Some(Index::key("Key2.5")))
        .unwrap()
        .unwrap();
    assert_eq!(container.item_ids(derived_dictionary).unwrap().key_count(), 2);

    let report = container.reconcile_with_base(derived).unwrap();
    assert!(report.is_empty());
    for dictionary in [base_dictionary, derived_dictionary] {
        let ids = container.item_ids(dictionary).unwrap();
        assert_eq!(ids.key_count(), 3);
        assert_eq!(ids.deleted_count(), 0);
    }
    assert_eq!(key_id(&container, derived, "MyDictionary", "Key2.5"), added);
    assert_eq!(
        container
            .retrieve(derived_dictionary, Index::key("Key2.5"))
            .unwrap(),
        "String2.5"
    );
    reconcile_converged(&mut container, derived);
}

#[test]
fn base_changes_made_while_unloaded_are_picked_up() {
    let mut container = container();
    let (base, derived) = base_and_derived(&mut container);
    let derived_text = container.encode_asset(derived).unwrap();
    container
        .add(
            member(&container, base, "MyDictionary"),
            "String2.5",
            Some(Index::key("Key2.5")),
        )
        .unwrap();
    let base_text = container.encode_asset(base).unwrap();

    let mut reloaded = crate::helpers::container();
    reloaded.decode_asset(&base_text).unwrap();
    reloaded.decode_asset(&derived_text).unwrap();
    let dictionary = member(&reloaded, derived, "MyDictionary");
    assert_eq!(reloaded.item_ids(dictionary).unwrap().key_count(), 2);

    let report = reloaded.reconcile_with_base(derived).unwrap();
    assert!(report.is_empty());
    assert_eq!(reloaded.item_ids(dictionary).unwrap().key_count(), 3);
    assert_eq!(reloaded.item_ids(dictionary).unwrap().deleted_count(), 0);
    assert_eq!(
        key_id(&reloaded, derived, "MyDictionary", "Key2.5"),
        key_id(&reloaded, base, "MyDictionary", "Key2.5")
    );
    reconcile_converged(&mut reloaded, derived);
}

#[test]
fn inherited_values_are_realigned_and_overrides_kept() {
    let mut container = detached_container();
    let (base, derived) = base_and_derived(&mut container);
    let derived_string = member(&container, derived, "MyString");
    let derived_int = member(&container, derived, "MyInt");
    let derived_strings = member(&container, derived, "MyStrings");
    let ids = live_ids(&container, base, "MyStrings");

    container.update(derived_int, 42, Index::Empty).unwrap();
    container
        .update(member(&container, base, "MyString"), "Changed", Index::Empty)
        .unwrap();
    container
        .update(member(&container, base, "MyInt"), 7, Index::Empty)
        .unwrap();
    container
        .remove(member(&container, base, "MyStrings"), Index::Position(1))
        .unwrap();

    let report = container.reconcile_with_base(derived).unwrap();
    assert!(report.is_empty());
    assert_eq!(
        container.retrieve(derived_string, Index::Empty).unwrap(),
        "Changed"
    );
    assert_eq!(container.retrieve(derived_int, Index::Empty).unwrap(), 42);
    assert_eq!(
        container.get_override(derived_int, &Index::Empty).unwrap(),
        OverrideType::New
    );

    // The base removal is followed without leaving a tombstone
    assert_eq!(
        live_ids(&container, derived, "MyStrings"),
        vec![ids[0], ids[2], ids[3]]
    );
    assert_eq!(container.item_ids(derived_strings).unwrap().deleted_count(), 0);
    reconcile_converged(&mut container, derived);
}

#[test]
fn key_collisions_tombstone_the_base_item() {
    let mut container = detached_container();
    let (base, derived) = base_and_derived(&mut container);
    let derived_dictionary = member(&container, derived, "MyDictionary");

    container
        .add(derived_dictionary, "Derived3", Some(Index::key("Key3")))
        .unwrap();
    let base_key3 = container
        .add(
            member(&container, base, "MyDictionary"),
            "Base3",
            Some(Index::key("Key3")),
        )
        .unwrap()
        .unwrap();

    let report = container.reconcile_with_base(derived).unwrap();
    assert_eq!(report.len(), 1);
    assert!(matches!(
        report.iter().next(),
        Some(Anomaly::IdentifierCollision { key, item_id, .. })
            if key == "Key3" && *item_id == base_key3
    ));
    assert!(
        container
            .is_item_deleted(derived_dictionary, base_key3)
            .unwrap()
    );
    assert_eq!(
        container
            .retrieve(derived_dictionary, Index::key("Key3"))
            .unwrap(),
        "Derived3"
    );
    reconcile_converged(&mut container, derived);
}

#[test]
fn base_type_changes_replace_inherited_objects() {
    let mut container = detached_container();
    let (base, derived) = base_and_derived(&mut container);
    let derived_objects = member(&container, derived, "MyObjects");

    container
        .update(
            member(&container, base, "MyObjects"),
            Object::new("MyOtherObject")
                .with_id(ObjectId::from_seed(60))
                .with("Name", "Other"),
            Index::Position(0),
        )
        .unwrap();

    let report = container.reconcile_with_base(derived).unwrap();
    assert_eq!(report.len(), 1);
    assert!(matches!(
        report.iter().next(),
        Some(Anomaly::TypeChanged { base_type, derived_type, .. })
            if base_type == "MyOtherObject" && derived_type == "MyObject"
    ));

    let value = container
        .retrieve(derived_objects, Index::Position(0))
        .unwrap();
    assert_eq!(value.as_object().unwrap().type_name(), "MyOtherObject");
    assert!(
        container
            .find_object(derived, ObjectId::from_seed(OBJECT_A))
            .is_none()
    );
    reconcile_converged(&mut container, derived);
}

#[test]
fn references_to_missing_objects_are_nulled() {
    let mut container = detached_container();
    let (base, derived) = base_and_derived(&mut container);
    let b = ObjectId::from_seed(51);

    // The derived list no longer follows the base, so B never reaches it
    container
        .override_content(member(&container, derived, "MyObjects"), OverrideType::New)
        .unwrap();
    container
        .add(member(&container, base, "MyObjects"), my_object(51, "B", 2), None)
        .unwrap();
    container
        .update(member(&container, base, "MyReference"), b, Index::Empty)
        .unwrap();

    let report = container.reconcile_with_base(derived).unwrap();
    assert_eq!(report.len(), 1);
    assert!(matches!(
        report.iter().next(),
        Some(Anomaly::BrokenReference { target, .. }) if *target == b
    ));
    assert!(
        container
            .retrieve(member(&container, derived, "MyReference"), Index::Empty)
            .unwrap()
            .is_null()
    );
    reconcile_converged(&mut container, derived);
}

#[test]
fn own_references_to_removed_objects_are_reported() {
    let mut container = detached_container();
    let (base, derived) = base_and_derived(&mut container);
    let a = ObjectId::from_seed(OBJECT_A);
    let derived_reference = member(&container, derived, "MyReference");

    // A local reference to the derived copy of A
    container.update(derived_reference, a, Index::Empty).unwrap();
    assert_eq!(
        container
            .get_override(derived_reference, &Index::Empty)
            .unwrap(),
        OverrideType::New
    );
    container
        .remove(member(&container, base, "MyObjects"), Index::Position(0))
        .unwrap();

    let report = container.reconcile_with_base(derived).unwrap();
    assert_eq!(report.len(), 1, "{:?}", report.anomalies);
    assert!(matches!(
        report.iter().next(),
        Some(Anomaly::BrokenReference { target, .. }) if *target == a
    ));
    assert!(container.find_object(derived, a).is_none());
    assert!(
        container
            .retrieve(derived_reference, Index::Empty)
            .unwrap()
            .is_null()
    );
    reconcile_converged(&mut container, derived);
}

#[test]
fn assets_without_base_reconcile_to_nothing() {
    let mut container = container();
    let (base, _) = base_and_derived(&mut container);
    let before = container.to_document(base).unwrap();
    assert!(container.reconcile_with_base(base).unwrap().is_empty());
    assert_eq!(container.to_document(base).unwrap(), before);
}
