use archetype::{
    GraphContainer, Object, Value,
    hierarchy::{BasePartInfo, CloneFlags, CompositeHierarchy, HierarchyLayout},
    ids::{AssetId, ObjectId},
    index::Index,
    schema::{MemberDescriptor, TypeDescriptor, TypeRegistry},
};

const PREFAB: u32 = 10;
const SCENE: u32 = 11;
const ROOT: u32 = 20;
const CHILD: u32 = 21;

fn scene_container() -> GraphContainer {
    let layout = HierarchyLayout::default();
    let mut registry = TypeRegistry::new();
    registry
        .register(layout.part_descriptor("Entity").member(MemberDescriptor::text("Name")))
        .unwrap();
    layout.register_types(&mut registry, "Entity").unwrap();
    registry
        .register(TypeDescriptor::new("Scene").member(layout.hierarchy_member("Entity")))
        .unwrap();
    let mut container = GraphContainer::new(registry);
    container.register_reference_policy("Scene", layout.reference_policy());
    container
}

fn entity(seed: u32, name: &str) -> Object {
    Object::new("Entity")
        .with_id(ObjectId::from_seed(seed))
        .with("Name", name)
}

fn create_scene(container: &mut GraphContainer, seed: u32) -> CompositeHierarchy {
    let asset = AssetId::from_seed(seed);
    let layout = HierarchyLayout::default();
    container
        .create_asset(
            asset,
            Object::new("Scene").with("Hierarchy", layout.empty_hierarchy("Entity")),
        )
        .unwrap();
    CompositeHierarchy::new(asset)
}

/// A prefab with a root part and one child, and an empty scene.
fn prefab_and_scene(container: &mut GraphContainer) -> (CompositeHierarchy, CompositeHierarchy) {
    let prefab = create_scene(container, PREFAB);
    let layout = prefab.layout().clone();
    let root = prefab
        .add_part(container, layout.design("Entity", entity(ROOT, "Root"), None), None, None)
        .unwrap();
    prefab
        .add_part(
            container,
            layout.design("Entity", entity(CHILD, "Child"), None),
            Some(root),
            None,
        )
        .unwrap();
    let scene = create_scene(container, SCENE);
    (prefab, scene)
}

fn name_of(container: &GraphContainer, hierarchy: &CompositeHierarchy, part: ObjectId) -> Value {
    let node = hierarchy.part_node(container, part).unwrap();
    let name = container.child(node, "Name").unwrap();
    container.retrieve(name, Index::Empty).unwrap()
}

fn rename(
    container: &mut GraphContainer,
    hierarchy: &CompositeHierarchy,
    part: ObjectId,
    value: &str,
) {
    let node = hierarchy.part_node(container, part).unwrap();
    let name = container.child(node, "Name").unwrap();
    container.update(name, value, Index::Empty).unwrap();
}

#[test]
fn parts_form_a_tree() {
    let mut container = scene_container();
    let (prefab, _) = prefab_and_scene(&mut container);
    let (root, child) = (ObjectId::from_seed(ROOT), ObjectId::from_seed(CHILD));

    assert_eq!(prefab.root_part_ids(&container).unwrap(), vec![root]);
    assert_eq!(prefab.part_ids(&container).unwrap(), vec![root, child]);
    assert_eq!(prefab.children(&container, root).unwrap(), vec![child]);
    assert_eq!(prefab.parent(&container, child).unwrap(), Some(root));
    assert_eq!(prefab.parent(&container, root).unwrap(), None);
    assert_eq!(
        prefab.descendants(&container, &[root]).unwrap(),
        vec![root, child]
    );

    let layout = prefab.layout().clone();
    let err = prefab
        .add_part(&mut container, layout.design("Entity", entity(CHILD, "Again"), None), None, None)
        .unwrap_err();
    assert_eq!(err.module(), "hierarchy");
    let err = prefab
        .children(&container, ObjectId::from_seed(99))
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn instances_follow_their_originals() {
    let mut container = scene_container();
    let (prefab, scene) = prefab_and_scene(&mut container);
    let (root, child) = (ObjectId::from_seed(ROOT), ObjectId::from_seed(CHILD));

    let instance = scene
        .instantiate(&mut container, prefab.asset(), &[root], None, None)
        .unwrap();
    let new_root = instance.parts[&root];
    let new_child = instance.parts[&child];
    assert_ne!(new_root, root);
    assert_eq!(instance.roots, vec![new_root]);
    assert_eq!(scene.root_part_ids(&container).unwrap(), vec![new_root]);
    assert_eq!(scene.children(&container, new_root).unwrap(), vec![new_child]);
    assert_eq!(scene.parent(&container, new_child).unwrap(), Some(new_root));

    let design = scene.design_node(&container, new_child).unwrap();
    let base = container
        .retrieve(container.child(design, "Base").unwrap(), Index::Empty)
        .unwrap();
    let info = BasePartInfo::from_value(new_child, &base).unwrap().unwrap();
    assert_eq!(info.base_asset, prefab.asset());
    assert_eq!(info.base_part, child);
    assert_eq!(info.instance_id, instance.instance_id);

    rename(&mut container, &prefab, child, "Renamed");
    assert_eq!(name_of(&container, &scene, new_child), "Renamed");

    // A local edit stops the flow for that part only
    rename(&mut container, &scene, new_root, "Local");
    rename(&mut container, &prefab, root, "Prefab root");
    assert_eq!(name_of(&container, &scene, new_root), "Local");

    assert!(container.reconcile_with_base(scene.asset()).unwrap().is_empty());
}

#[test]
fn removing_a_part_removes_its_descendants() {
    let mut container = scene_container();
    let (prefab, scene) = prefab_and_scene(&mut container);
    let root = ObjectId::from_seed(ROOT);
    let instance = scene
        .instantiate(&mut container, prefab.asset(), &[root], None, None)
        .unwrap();
    let new_root = instance.parts[&root];

    let mut removed = scene.remove_part(&mut container, new_root).unwrap();
    removed.sort();
    let mut expected: Vec<ObjectId> = instance.parts.values().copied().collect();
    expected.sort();
    assert_eq!(removed, expected);
    assert!(scene.part_ids(&container).unwrap().is_empty());
    assert!(scene.root_part_ids(&container).unwrap().is_empty());
    assert!(
        container
            .graph(scene.asset())
            .unwrap()
            .custom_links()
            .next()
            .is_none()
    );

    // The prefab is untouched
    assert_eq!(prefab.part_ids(&container).unwrap().len(), 2);
}

#[test]
fn clones_keep_or_drop_outside_references() {
    let mut container = scene_container();
    let (prefab, _) = prefab_and_scene(&mut container);
    let (root, child) = (ObjectId::from_seed(ROOT), ObjectId::from_seed(CHILD));
    let parent_of = |design: &Object| {
        design
            .get("Part")
            .and_then(Value::as_object)
            .and_then(|part| part.get("Parent"))
            .cloned()
    };

    let kept = prefab
        .clone_sub_hierarchies(&container, &[child], CloneFlags::default())
        .unwrap();
    assert_eq!(kept.roots, vec![child]);
    assert!(kept.remapping.is_none());
    assert_eq!(parent_of(&kept.designs[0]), Some(Value::Reference(root)));

    let cleaned = prefab
        .clone_sub_hierarchies(
            &container,
            &[root],
            CloneFlags {
                generate_new_ids: true,
                clean_external_references: true,
            },
        )
        .unwrap();
    let remapping = cleaned.remapping.unwrap();
    assert_eq!(cleaned.designs.len(), 2);
    assert_eq!(cleaned.roots, vec![remapping[&root]]);
    // The child's parent is inside the clone and follows it
    assert_eq!(
        parent_of(&cleaned.designs[1]),
        Some(Value::Reference(remapping[&root]))
    );

    let outside = prefab
        .clone_sub_hierarchies(
            &container,
            &[child],
            CloneFlags {
                generate_new_ids: false,
                clean_external_references: true,
            },
        )
        .unwrap();
    assert_eq!(parent_of(&outside.designs[0]), Some(Value::Null));
}

#[test]
fn instances_relink_after_loading() {
    let mut container = scene_container();
    let (prefab, scene) = prefab_and_scene(&mut container);
    let child = ObjectId::from_seed(CHILD);
    let instance = scene
        .instantiate(&mut container, prefab.asset(), &[ObjectId::from_seed(ROOT)], None, None)
        .unwrap();
    let prefab_text = container.encode_asset(prefab.asset()).unwrap();
    let scene_text = container.encode_asset(scene.asset()).unwrap();

    let mut reloaded = scene_container();
    reloaded.decode_asset(&prefab_text).unwrap();
    reloaded.decode_asset(&scene_text).unwrap();
    assert_eq!(scene.relink_parts(&mut reloaded).unwrap(), 2);

    let new_child = instance.parts[&child];
    rename(&mut reloaded, &prefab, child, "After reload");
    assert_eq!(name_of(&reloaded, &scene, new_child), "After reload");
    assert!(reloaded.reconcile_with_base(scene.asset()).unwrap().is_empty());
}

#[test]
fn instances_without_their_original_stay_unlinked() {
    let mut container = scene_container();
    let (prefab, scene) = prefab_and_scene(&mut container);
    scene
        .instantiate(&mut container, prefab.asset(), &[ObjectId::from_seed(ROOT)], None, None)
        .unwrap();
    let scene_text = container.encode_asset(scene.asset()).unwrap();

    let mut reloaded = scene_container();
    reloaded.decode_asset(&scene_text).unwrap();
    assert_eq!(scene.relink_parts(&mut reloaded).unwrap(), 0);
    assert_eq!(scene.part_ids(&reloaded).unwrap().len(), 2);
}
