//! Stable identity for collection items.
//!
//! A [`CollectionItemIds`] table is kept alongside every identifiable sequence or
//! dictionary. It maps each live index to an [`ItemId`] that does not change when items
//! are inserted, removed or reordered around it, and keeps a set of *deleted* ids
//! (tombstones): ids present in the base collection that a derived collection removed on
//! purpose. A tombstone is what distinguishes "explicitly removed" from "never had".
//!
//! For sequences the keys are [`Index::Position`] values kept dense and ordered; for
//! dictionaries they are [`Index::Key`] values in insertion order.
//!
//! ```
//! use archetype::collection::CollectionItemIds;
//! use archetype::ids::ItemId;
//!
//! let mut ids = CollectionItemIds::new();
//! for n in 0..4 {
//!     ids.push(ItemId::from_seed(n + 1))?;
//! }
//! let removed = ids.delete_and_shift(2, true);
//! assert_eq!(removed, Some(ItemId::from_seed(3)));
//! assert_eq!(ids.key_count(), 3);
//! assert_eq!(ids.deleted_count(), 1);
//! assert_eq!(ids.count(), 4);
//! # Ok::<(), archetype::collection::CollectionError>(())
//! ```

use std::collections::{BTreeSet, HashSet};

use thiserror::Error;

use crate::{
    ids::{IdGenerator, ItemId},
    index::Index,
};

/// Errors raised by item identifier table operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CollectionError {
    /// The identifier is already assigned to another index.
    #[error("Item identifier {id} is already used at {index}")]
    DuplicateId { id: ItemId, index: String },

    /// The key is already present in the table.
    #[error("Key {index} already has an item identifier")]
    DuplicateKey { index: String },

    /// The key is not present in the table.
    #[error("No item identifier for {index}")]
    KeyNotFound { index: String },

    /// Sequence insertion past the end.
    #[error("Position {position} is out of range for {len} items")]
    PositionOutOfRange { position: usize, len: usize },

    /// The empty id cannot be stored.
    #[error("The empty item identifier cannot be assigned")]
    EmptyId,
}

impl CollectionError {
    /// Check if this error is a lookup failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, CollectionError::KeyNotFound { .. })
    }

    /// Check if this error is an identifier collision
    pub fn is_collision(&self) -> bool {
        matches!(
            self,
            CollectionError::DuplicateId { .. } | CollectionError::DuplicateKey { .. }
        )
    }
}

/// Bidirectional map between collection indices and stable item identifiers, plus the
/// set of tombstoned identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionItemIds {
    entries: Vec<(Index, ItemId)>,
    deleted: BTreeSet<ItemId>,
}

impl CollectionItemIds {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the identifier associated with `index`.
    pub fn get(&self, index: &Index) -> Option<ItemId> {
        self.entries
            .iter()
            .find(|(key, _)| key == index)
            .map(|(_, id)| *id)
    }

    /// Returns the index currently holding `id`.
    pub fn key_of(&self, id: ItemId) -> Option<&Index> {
        self.entries
            .iter()
            .find(|(_, item)| *item == id)
            .map(|(key, _)| key)
    }

    pub fn contains_key(&self, index: &Index) -> bool {
        self.get(index).is_some()
    }

    /// Returns true if `id` is live (not deleted) in this table.
    pub fn contains_id(&self, id: ItemId) -> bool {
        self.entries.iter().any(|(_, item)| *item == id)
    }

    /// Inserts an identifier at a sequence position, shifting later positions up.
    pub fn insert(&mut self, position: usize, id: ItemId) -> Result<(), CollectionError> {
        self.check_new_id(id)?;
        let len = self.key_count();
        if position > len {
            return Err(CollectionError::PositionOutOfRange { position, len });
        }
        for (key, _) in self.entries.iter_mut() {
            if let Index::Position(p) = key
                && *p >= position
            {
                *p += 1;
            }
        }
        self.entries.insert(position, (Index::Position(position), id));
        self.deleted.remove(&id);
        Ok(())
    }

    /// Appends an identifier at the end of a sequence.
    pub fn push(&mut self, id: ItemId) -> Result<(), CollectionError> {
        self.insert(self.key_count(), id)
    }

    /// Associates a new key with `id`.
    pub fn add(&mut self, index: Index, id: ItemId) -> Result<(), CollectionError> {
        if self.contains_key(&index) {
            return Err(CollectionError::DuplicateKey {
                index: index.to_string(),
            });
        }
        self.check_new_id(id)?;
        self.entries.push((index, id));
        self.deleted.remove(&id);
        Ok(())
    }

    /// Associates `index` with `id`, replacing any previous identifier for that key.
    pub fn set(&mut self, index: Index, id: ItemId) -> Result<(), CollectionError> {
        if id.is_empty() {
            return Err(CollectionError::EmptyId);
        }
        if let Some(existing) = self.key_of(id)
            && *existing != index
        {
            return Err(CollectionError::DuplicateId {
                id,
                index: existing.to_string(),
            });
        }
        match self.entries.iter_mut().find(|(key, _)| *key == index) {
            Some(entry) => entry.1 = id,
            None => self.entries.push((index, id)),
        }
        self.deleted.remove(&id);
        Ok(())
    }

    /// Removes the identifier of a dictionary key, optionally keeping it as a tombstone.
    pub fn delete(&mut self, index: &Index, mark_as_deleted: bool) -> Option<ItemId> {
        let position = self.entries.iter().position(|(key, _)| key == index)?;
        let (_, id) = self.entries.remove(position);
        if mark_as_deleted {
            self.deleted.insert(id);
        }
        Some(id)
    }

    /// Removes the identifier at a sequence position and shifts later positions down,
    /// optionally keeping it as a tombstone.
    pub fn delete_and_shift(&mut self, position: usize, mark_as_deleted: bool) -> Option<ItemId> {
        let id = self.delete(&Index::Position(position), mark_as_deleted)?;
        for (key, _) in self.entries.iter_mut() {
            if let Index::Position(p) = key
                && *p > position
            {
                *p -= 1;
            }
        }
        Some(id)
    }

    /// Moves an identifier to a different dictionary key.
    pub fn rename_key(&mut self, from: &Index, to: Index) -> Result<(), CollectionError> {
        if from == &to {
            return Ok(());
        }
        if self.contains_key(&to) {
            return Err(CollectionError::DuplicateKey {
                index: to.to_string(),
            });
        }
        let entry = self
            .entries
            .iter_mut()
            .find(|(key, _)| key == from)
            .ok_or_else(|| CollectionError::KeyNotFound {
                index: from.to_string(),
            })?;
        entry.0 = to;
        Ok(())
    }

    /// Records `id` as deliberately removed.
    pub fn mark_as_deleted(&mut self, id: ItemId) {
        self.deleted.insert(id);
    }

    /// Forgets a tombstone. Returns true if it existed.
    pub fn unmark_as_deleted(&mut self, id: ItemId) -> bool {
        self.deleted.remove(&id)
    }

    pub fn is_deleted(&self, id: ItemId) -> bool {
        self.deleted.contains(&id)
    }

    /// Tombstoned identifiers in ascending order.
    pub fn deleted_items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.deleted.iter().copied()
    }

    /// Number of live entries.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of tombstones.
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    /// Live entries plus tombstones.
    pub fn count(&self) -> usize {
        self.key_count() + self.deleted_count()
    }

    /// Live entries in table order.
    pub fn iter(&self) -> impl Iterator<Item = (&Index, ItemId)> + '_ {
        self.entries.iter().map(|(key, id)| (key, *id))
    }

    /// Identifiers present in `base` that are neither live nor deleted here, in base order.
    pub fn find_missing_ids(&self, base: &CollectionItemIds) -> Vec<ItemId> {
        base.iter()
            .map(|(_, id)| id)
            .filter(|id| !self.contains_id(*id) && !self.is_deleted(*id))
            .collect()
    }

    /// First identifier of `base` that is neither live nor deleted here.
    pub fn find_missing_id(&self, base: &CollectionItemIds) -> Option<ItemId> {
        self.find_missing_ids(base).into_iter().next()
    }

    /// Drops every entry and tombstone.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.deleted.clear();
    }

    /// Drops tombstones only.
    pub fn clear_deleted(&mut self) {
        self.deleted.clear();
    }

    /// Makes the table agree with a sequence of `len` items.
    ///
    /// Existing identifiers of positions `0..len` are kept, stale positions are dropped
    /// and missing positions receive fresh identifiers. Returns true if anything changed.
    pub fn repair_sequence(&mut self, len: usize, ids: &mut dyn IdGenerator) -> bool {
        let mut seen = HashSet::new();
        let mut repaired = Vec::with_capacity(len);
        let mut changed = self.entries.len() != len;
        for position in 0..len {
            let existing = self
                .get(&Index::Position(position))
                .filter(|id| !id.is_empty() && !seen.contains(id));
            let id = match existing {
                Some(id) => id,
                None => {
                    changed = true;
                    self.fresh_id(&seen, ids)
                }
            };
            seen.insert(id);
            repaired.push((Index::Position(position), id));
        }
        self.entries = repaired;
        self.deleted.retain(|id| !seen.contains(id));
        changed
    }

    /// Makes the table agree with the keys of a dictionary, in the given order.
    ///
    /// Returns true if anything changed.
    pub fn repair_keys<'a>(
        &mut self,
        keys: impl IntoIterator<Item = &'a str>,
        ids: &mut dyn IdGenerator,
    ) -> bool {
        let mut seen = HashSet::new();
        let mut repaired = Vec::new();
        let mut changed = false;
        for key in keys {
            let index = Index::key(key);
            let existing = self
                .get(&index)
                .filter(|id| !id.is_empty() && !seen.contains(id));
            let id = match existing {
                Some(id) => id,
                None => {
                    changed = true;
                    self.fresh_id(&seen, ids)
                }
            };
            seen.insert(id);
            repaired.push((index, id));
        }
        changed |= repaired.len() != self.entries.len();
        if !changed {
            changed = repaired
                .iter()
                .zip(self.entries.iter())
                .any(|(a, b)| a != b);
        }
        self.entries = repaired;
        self.deleted.retain(|id| !seen.contains(id));
        changed
    }

    fn fresh_id(&self, seen: &HashSet<ItemId>, ids: &mut dyn IdGenerator) -> ItemId {
        loop {
            let id = ids.next_item_id();
            if !seen.contains(&id) && !self.contains_id(id) && !self.is_deleted(id) {
                return id;
            }
        }
    }

    fn check_new_id(&self, id: ItemId) -> Result<(), CollectionError> {
        if id.is_empty() {
            return Err(CollectionError::EmptyId);
        }
        if let Some(existing) = self.key_of(id) {
            return Err(CollectionError::DuplicateId {
                id,
                index: existing.to_string(),
            });
        }
        Ok(())
    }
}
