//! Asset graphs with archetype inheritance.
//!
//! Every asset loaded into a [`GraphContainer`] becomes a tree of nodes in a shared
//! [`NodeArena`]: object nodes own member nodes, member nodes own the object or
//! collection they hold, collections own their items. A derived asset is linked to its
//! base node by node, and the container uses these base links to:
//!
//! * track, per member and per collection item, whether a value is inherited (Base)
//!   or overridden locally (New), see [`OverrideType`]
//! * push edits made on a base to every derived value that still inherits
//! * reconcile a derived asset with a base that changed while it was not loaded
//!
//! Collection items are matched through their [`ItemId`](crate::ids::ItemId), so
//! overrides and links survive insertions, removals and reordering.
//!
//! ## Example
//!
//! ```
//! use archetype::graph::{GraphContainer, OverrideType};
//! use archetype::ids::AssetId;
//! use archetype::schema::{MemberDescriptor, TypeDescriptor, TypeRegistry, ValueKind};
//! use archetype::value::List;
//! use archetype::{Index, Object};
//!
//! let mut registry = TypeRegistry::new();
//! registry.register(
//!     TypeDescriptor::new("MyAsset")
//!         .member(MemberDescriptor::new("MyStrings", ValueKind::list(ValueKind::Text))),
//! )?;
//! let mut container = GraphContainer::new(registry);
//!
//! let base = AssetId::new_random();
//! let derived = AssetId::new_random();
//! let strings = List::from_values(["String1", "String2"]);
//! container.create_asset(base, Object::new("MyAsset").with("MyStrings", strings))?;
//! container.derive_asset(base, derived, "base.asset")?;
//!
//! let derived_strings = container.child(container.root(derived)?, "MyStrings")?;
//! container.update(derived_strings, "Local", Index::Position(1))?;
//! assert_eq!(
//!     container.get_override(derived_strings, &Index::Position(1))?,
//!     OverrideType::New
//! );
//!
//! // The overridden item keeps its value, the inherited one follows the base
//! let base_strings = container.child(container.root(base)?, "MyStrings")?;
//! container.update(base_strings, "Changed0", Index::Position(0))?;
//! container.update(base_strings, "Changed1", Index::Position(1))?;
//! assert!(container.retrieve(derived_strings, Index::Position(0))? == "Changed0");
//! assert!(container.retrieve(derived_strings, Index::Position(1))? == "Local");
//! # Ok::<(), archetype::Error>(())
//! ```

mod build;
mod container;
mod document;
mod edit;
mod errors;
mod link;
mod node;
mod overrides;
mod path;
mod propagate;
mod reconcile;
mod reference;
mod snapshot;

pub use container::{AssetPropertyGraph, BaseReference, GraphContainer};
pub use document::{AssetDocument, InlineBase};
pub use errors::GraphError;
pub use node::{
    CollectionNode, Items, MemberNode, Node, NodeArena, NodeId, NodeKind, ObjectNode, Slot,
};
pub use overrides::{OverrideState, OverrideType};
pub use path::{AssetPath, PathSegment, ResolvedPath};
pub use reconcile::{Anomaly, ReconcileReport};
pub use reference::{MemberReferences, NoReferences, ObjectReferencePolicy};
pub(crate) use reference::owning_member;
