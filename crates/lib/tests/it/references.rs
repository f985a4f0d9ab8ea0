use archetype::{
    Object, Value,
    ids::ObjectId,
    index::Index,
    value::List,
};

use crate::helpers::*;

#[test]
fn derived_references_point_into_the_derived_asset() {
    let mut container = container();
    let (base, derived) = base_and_derived(&mut container);
    let a = ObjectId::from_seed(OBJECT_A);

    let base_target = container
        .target(member(&container, base, "MyReference"))
        .unwrap();
    let derived_target = container
        .target(member(&container, derived, "MyReference"))
        .unwrap();

    assert_eq!(base_target, container.find_object(base, a));
    assert_eq!(derived_target, container.find_object(derived, a));
    assert_ne!(base_target, derived_target);
    assert_eq!(
        container
            .retrieve(member(&container, derived, "MyReference"), Index::Empty)
            .unwrap(),
        Value::Reference(a)
    );
}

#[test]
fn identified_objects_under_reference_members_are_not_copied() {
    let mut container = container();
    let (base, _) = base_and_derived(&mut container);
    let reference = member(&container, base, "MyReference");

    container
        .update(reference, my_object(OBJECT_A, "Copy", 9), Index::Empty)
        .unwrap();

    assert_eq!(
        container.target(reference).unwrap(),
        container.find_object(base, ObjectId::from_seed(OBJECT_A))
    );
    let objects = container
        .retrieve(member(&container, base, "MyObjects"), Index::Empty)
        .unwrap();
    let first = objects.as_list().unwrap().get(0).unwrap().as_object().unwrap();
    assert_eq!(first.get("Name").unwrap(), "A");
}

#[test]
fn removing_a_target_nulls_its_references() {
    let mut container = container();
    let (base, derived) = base_and_derived(&mut container);

    container
        .remove(member(&container, base, "MyObjects"), Index::Position(0))
        .unwrap();

    for asset in [base, derived] {
        let reference = member(&container, asset, "MyReference");
        assert_eq!(container.target(reference).unwrap(), None);
        assert!(
            container
                .retrieve(reference, Index::Empty)
                .unwrap()
                .is_null()
        );
    }
}

#[test]
fn references_into_other_assets_are_shared() {
    let mut container = container();
    let (base, derived) = base_and_derived(&mut container);
    let library = asset(9);
    let b = ObjectId::from_seed(70);
    container
        .create_asset(
            library,
            Object::new("MyAsset").with("MyObjects", List::new().with(my_object(70, "B", 2))),
        )
        .unwrap();

    container
        .update(
            member(&container, base, "MyReference"),
            Value::Reference(b),
            Index::Empty,
        )
        .unwrap();

    let shared = container.find_object(library, b);
    assert!(shared.is_some());
    for asset in [base, derived] {
        assert_eq!(
            container
                .target(member(&container, asset, "MyReference"))
                .unwrap(),
            shared
        );
    }

    // Removing the other asset leaves the references dangling as null
    container.remove_asset(library).unwrap();
    assert_eq!(
        container
            .target(member(&container, derived, "MyReference"))
            .unwrap(),
        None
    );
}

#[test]
fn unknown_targets_resolve_to_null() {
    let mut container = container();
    let id = asset(BASE);
    container
        .create_asset(
            id,
            Object::new("MyAsset").with("MyReference", ObjectId::from_seed(999)),
        )
        .unwrap();
    assert!(
        container
            .retrieve(member(&container, id, "MyReference"), Index::Empty)
            .unwrap()
            .is_null()
    );
}

#[test]
fn references_reach_newly_added_objects() {
    let mut container = container();
    let (base, _) = base_and_derived(&mut container);
    let objects = member(&container, base, "MyObjects");

    container
        .add_many(
            objects,
            [
                Value::Object(my_object(71, "First", 1)),
                Value::Object(my_object(72, "Second", 2)),
            ],
        )
        .unwrap();
    container
        .update(
            member(&container, base, "MyReference"),
            ObjectId::from_seed(72),
            Index::Empty,
        )
        .unwrap();
    assert_eq!(
        container
            .target(member(&container, base, "MyReference"))
            .unwrap(),
        container.find_object(base, ObjectId::from_seed(72))
    );
}
