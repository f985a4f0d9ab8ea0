//! Composite assets made of parts.
//!
//! A composite asset holds a tree of identifiable parts. The parts live in a list of
//! designs, each owning one part and optionally recording where the part was
//! instantiated from; the tree itself is expressed by references (`RootParts`,
//! `Parent`, `Children`). See [`HierarchyLayout`] for the member names.
//!
//! Instantiating parts of another asset does not derive the whole asset. Each new
//! part is linked to its original through a custom base link, so base edits flow per
//! part through the regular propagation and reconciliation of the graph.

mod composite;
mod errors;
mod layout;

pub use composite::{CloneFlags, CompositeHierarchy, HierarchyClone, HierarchyInstance};
pub use errors::HierarchyError;
pub use layout::{BasePartInfo, HierarchyLayout, HierarchyReferencePolicy};
