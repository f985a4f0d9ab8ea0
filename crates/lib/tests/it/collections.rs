use archetype::{OverrideType, index::Index};

use crate::helpers::*;

#[test]
fn derived_collections_share_item_ids() {
    let mut container = container();
    let (base, derived) = base_and_derived(&mut container);
    assert_eq!(
        live_ids(&container, base, "MyStrings"),
        live_ids(&container, derived, "MyStrings")
    );
    assert_eq!(
        key_id(&container, base, "MyDictionary", "Key2"),
        key_id(&container, derived, "MyDictionary", "Key2")
    );
    assert_eq!(live_ids(&container, base, "MyStrings").len(), 4);
}

#[test]
fn removal_keeps_surviving_ids_and_tombstones_the_removed_one() {
    let mut container = container();
    let (_, derived) = base_and_derived(&mut container);
    let ids = live_ids(&container, derived, "MyStrings");
    let strings = member(&container, derived, "MyStrings");

    let removed = container.remove(strings, Index::Position(2)).unwrap();
    assert_eq!(removed, "String3");

    assert_eq!(
        live_ids(&container, derived, "MyStrings"),
        vec![ids[0], ids[1], ids[3]]
    );
    let table = container.item_ids(strings).unwrap();
    assert_eq!(table.deleted_items().collect::<Vec<_>>(), vec![ids[2]]);
    assert_eq!(table.key_count(), 3);
    assert_eq!(table.count(), 4);
    assert!(container.is_item_deleted(strings, ids[2]).unwrap());
}

#[test]
fn removal_without_base_leaves_no_tombstone() {
    let mut container = container();
    let (base, _) = base_and_derived(&mut container);
    let strings = member(&container, base, "MyStrings");
    container.remove(strings, Index::Position(0)).unwrap();
    assert_eq!(container.item_ids(strings).unwrap().deleted_count(), 0);
}

#[test]
fn keys_added_on_both_sides_do_not_collide() {
    let mut container = container();
    let (base, derived) = base_and_derived(&mut container);
    let base_dictionary = member(&container, base, "MyDictionary");
    let derived_dictionary = member(&container, derived, "MyDictionary");

    container
        .add(derived_dictionary, "Derived3", Some(Index::key("Key3")))
        .unwrap();
    container
        .add(base_dictionary, "Base3", Some(Index::key("Key3")))
        .unwrap();

    let base_key3 = key_id(&container, base, "MyDictionary", "Key3");
    let derived_key3 = key_id(&container, derived, "MyDictionary", "Key3");
    assert_ne!(base_key3, derived_key3);

    let table = container.item_ids(derived_dictionary).unwrap();
    assert_eq!(table.key_count(), 3);
    assert_eq!(table.deleted_count(), 1);
    assert!(table.is_deleted(base_key3));
    assert_eq!(
        container
            .retrieve(derived_dictionary, Index::key("Key3"))
            .unwrap(),
        "Derived3"
    );
}

#[test]
fn base_insertions_land_next_to_their_base_neighbour() {
    let mut container = container();
    let (base, derived) = base_and_derived(&mut container);
    let base_strings = member(&container, base, "MyStrings");
    let derived_strings = member(&container, derived, "MyStrings");

    // The derived list drops its first item, so base positions no longer match
    container
        .remove(derived_strings, Index::Position(0))
        .unwrap();
    let added = container
        .add(base_strings, "String2.5", Some(Index::Position(2)))
        .unwrap()
        .unwrap();

    assert_eq!(
        container
            .retrieve(derived_strings, Index::Position(1))
            .unwrap(),
        "String2.5"
    );
    assert_eq!(live_ids(&container, derived, "MyStrings")[1], added);
    assert!(
        container
            .is_item_inherited(derived_strings, &Index::Position(1))
            .unwrap()
    );
}

#[test]
fn base_removals_spare_overridden_items() {
    let mut container = container();
    let (base, derived) = base_and_derived(&mut container);
    let base_strings = member(&container, base, "MyStrings");
    let derived_strings = member(&container, derived, "MyStrings");
    let ids = live_ids(&container, base, "MyStrings");

    container
        .update(derived_strings, "Local", Index::Position(1))
        .unwrap();
    container.remove(base_strings, Index::Position(1)).unwrap();
    container.remove(base_strings, Index::Position(0)).unwrap();

    // String1 followed the base, the overridden item stays as an orphan
    assert_eq!(
        live_ids(&container, derived, "MyStrings"),
        vec![ids[1], ids[2], ids[3]]
    );
    assert_eq!(
        container
            .retrieve(derived_strings, Index::Position(0))
            .unwrap(),
        "Local"
    );
    assert_eq!(container.item_ids(derived_strings).unwrap().deleted_count(), 0);
    assert!(
        !container
            .is_item_inherited(derived_strings, &Index::Position(0))
            .unwrap()
    );
}

#[test]
fn removing_an_item_drops_its_overrides() {
    let mut container = container();
    let (_, derived) = base_and_derived(&mut container);
    let strings = member(&container, derived, "MyStrings");

    container
        .update(strings, "Local", Index::Position(3))
        .unwrap();
    assert_eq!(container.generate_overrides(derived).unwrap().len(), 1);
    container.remove(strings, Index::Position(3)).unwrap();
    assert!(container.generate_overrides(derived).unwrap().is_empty());
    assert!(container.overridden_item_indices(strings).unwrap().is_empty());
}

#[test]
fn deleted_items_can_be_restored() {
    let mut container = container();
    let (base, derived) = base_and_derived(&mut container);
    let strings = member(&container, derived, "MyStrings");
    let ids = live_ids(&container, derived, "MyStrings");

    container.remove(strings, Index::Position(2)).unwrap();
    let index = container.restore_deleted_item(strings, ids[2]).unwrap();

    assert_eq!(index, Index::Position(2));
    assert_eq!(container.retrieve(strings, index).unwrap(), "String3");
    assert_eq!(live_ids(&container, derived, "MyStrings"), ids);
    assert!(!container.is_item_deleted(strings, ids[2]).unwrap());

    // Restored items inherit again
    container
        .update(
            member(&container, base, "MyStrings"),
            "Changed",
            Index::Position(2),
        )
        .unwrap();
    assert_eq!(
        container.retrieve(strings, Index::Position(2)).unwrap(),
        "Changed"
    );

    let err = container.restore_deleted_item(strings, ids[2]).unwrap_err();
    assert!(matches!(
        err,
        archetype::Error::Graph(archetype::graph::GraphError::UnknownItemId { .. })
    ));
}

#[test]
fn base_indices_map_to_derived_indices() {
    let mut container = container();
    let (_, derived) = base_and_derived(&mut container);
    let strings = member(&container, derived, "MyStrings");
    container.remove(strings, Index::Position(0)).unwrap();

    assert_eq!(
        container
            .retrieve_derived_index(strings, &Index::Position(1))
            .unwrap(),
        Index::Position(0)
    );
    assert_eq!(
        container
            .retrieve_derived_index(strings, &Index::Position(0))
            .unwrap(),
        Index::Empty
    );
}

#[test]
fn key_renames_keep_identity() {
    let mut container = container();
    let (base, derived) = base_and_derived(&mut container);
    let base_dictionary = member(&container, base, "MyDictionary");
    let derived_dictionary = member(&container, derived, "MyDictionary");
    let key1 = key_id(&container, derived, "MyDictionary", "Key1");
    let key2 = key_id(&container, derived, "MyDictionary", "Key2");

    // A local rename marks the key, not the value
    container
        .rename_key(derived_dictionary, Index::key("Key1"), "Local1")
        .unwrap();
    assert_eq!(key_id(&container, derived, "MyDictionary", "Local1"), key1);
    assert_eq!(
        container
            .get_key_override(derived_dictionary, &Index::key("Local1"))
            .unwrap(),
        OverrideType::New
    );
    assert_eq!(
        container
            .get_override(derived_dictionary, &Index::key("Local1"))
            .unwrap(),
        OverrideType::Base
    );
    assert_eq!(
        container.overridden_key_indices(derived_dictionary).unwrap(),
        vec![Index::key("Local1")]
    );

    // Base renames follow unless the key is overridden
    container
        .rename_key(base_dictionary, Index::key("Key2"), "Base2")
        .unwrap();
    container
        .rename_key(base_dictionary, Index::key("Key1"), "Base1")
        .unwrap();
    assert_eq!(key_id(&container, derived, "MyDictionary", "Base2"), key2);
    assert_eq!(key_id(&container, derived, "MyDictionary", "Local1"), key1);
    assert!(
        container
            .is_key_inherited(derived_dictionary, &Index::key("Base2"))
            .unwrap()
    );

    // Values still inherit under a renamed key
    container
        .update(base_dictionary, "Changed", Index::key("Base1"))
        .unwrap();
    assert_eq!(
        container
            .retrieve(derived_dictionary, Index::key("Local1"))
            .unwrap(),
        "Changed"
    );

    // Resetting the key override restores the base key
    container
        .override_key(derived_dictionary, &Index::key("Local1"), OverrideType::Base)
        .unwrap();
    container
        .reset_override(derived_dictionary, Index::key("Local1"))
        .unwrap();
    assert_eq!(key_id(&container, derived, "MyDictionary", "Base1"), key1);
}

#[test]
fn duplicate_keys_are_rejected() {
    let mut container = container();
    let (_, derived) = base_and_derived(&mut container);
    let dictionary = member(&container, derived, "MyDictionary");

    let err = container
        .add(dictionary, "x", Some(Index::key("Key1")))
        .unwrap_err();
    assert!(err.is_conflict());

    let err = container
        .rename_key(dictionary, Index::key("Key1"), "Key2")
        .unwrap_err();
    assert!(err.is_conflict());

    let err = container
        .remove(dictionary, Index::key("Missing"))
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn batch_adds_assign_one_id_per_item() {
    let mut container = container();
    let (base, derived) = base_and_derived(&mut container);
    let base_strings = member(&container, base, "MyStrings");
    let added = container
        .add_many(base_strings, ["A".into(), "B".into()])
        .unwrap();

    assert_eq!(added.len(), 2);
    let derived_ids = live_ids(&container, derived, "MyStrings");
    assert_eq!(derived_ids.len(), 6);
    assert_eq!(derived_ids[4..], [added[0].unwrap(), added[1].unwrap()]);
}
