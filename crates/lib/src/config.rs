//! Graph container configuration.
//!
//! [`GraphConfig`] is plain serde data so hosts can persist it next to their own
//! settings; every field has a default.

use serde::{Deserialize, Serialize};

use crate::ids::{IdGenerator, RandomIds, SequentialIds};

/// How fresh item identifiers and object identities are allocated.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum IdAllocation {
    /// Random uuid v4 identifiers
    #[default]
    Random,
    /// Deterministic identifiers seeded from `start`, see [`SequentialIds`]
    Sequential { start: u32 },
}

impl IdAllocation {
    /// Creates the generator described by this setting.
    pub fn generator(&self) -> Box<dyn IdGenerator> {
        match self {
            IdAllocation::Random => Box::new(RandomIds),
            IdAllocation::Sequential { start } => Box::new(SequentialIds::new(*start)),
        }
    }
}

/// Behaviour switches of a [`GraphContainer`](crate::graph::GraphContainer).
///
/// # Example
///
/// ```
/// use archetype::config::{GraphConfig, IdAllocation};
///
/// let config = GraphConfig {
///     id_allocation: IdAllocation::Sequential { start: 1 },
///     ..Default::default()
/// };
/// assert!(config.propagate_changes_from_base);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GraphConfig {
    /// Push base edits down to derived graphs as they happen.
    ///
    /// When disabled, derived graphs only catch up through explicit reconciliation.
    pub propagate_changes_from_base: bool,

    /// Identifier allocation strategy.
    pub id_allocation: IdAllocation,

    /// Re-verify item identifier tables against their collections before saving,
    /// regenerating missing identifiers and dropping stale ones.
    ///
    /// Building a graph always completes tables that are missing identifiers.
    pub repair_item_ids: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            propagate_changes_from_base: true,
            id_allocation: IdAllocation::Random,
            repair_item_ids: true,
        }
    }
}
