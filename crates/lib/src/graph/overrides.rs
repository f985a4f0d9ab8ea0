//! Override flags.
//!
//! A node records only what is New. Everything not recorded is Base, so a node that
//! has never been edited locally carries an empty [`OverrideState`].
//!
//! Item and key flags are keyed by [`ItemId`] rather than by index, which keeps them
//! attached to the right item when the collection is reordered around it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::ItemId;

/// Whether a value mirrors its base or was set locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OverrideType {
    /// Inherited from the base unchanged
    #[default]
    Base,
    /// Set locally; base changes no longer reach it
    New,
}

impl OverrideType {
    pub fn is_new(&self) -> bool {
        matches!(self, OverrideType::New)
    }

    pub fn is_base(&self) -> bool {
        matches!(self, OverrideType::Base)
    }

    fn from_flag(flag: bool) -> Self {
        if flag {
            OverrideType::New
        } else {
            OverrideType::Base
        }
    }
}

/// Override flags of one node: its own content, and per item the value and the key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideState {
    content: bool,
    items: BTreeSet<ItemId>,
    keys: BTreeSet<ItemId>,
}

impl OverrideState {
    pub fn content(&self) -> OverrideType {
        OverrideType::from_flag(self.content)
    }

    pub(crate) fn set_content(&mut self, value: OverrideType) {
        self.content = value.is_new();
    }

    pub fn item(&self, id: ItemId) -> OverrideType {
        OverrideType::from_flag(self.items.contains(&id))
    }

    pub(crate) fn set_item(&mut self, id: ItemId, value: OverrideType) {
        if value.is_new() {
            self.items.insert(id);
        } else {
            self.items.remove(&id);
        }
    }

    pub fn key(&self, id: ItemId) -> OverrideType {
        OverrideType::from_flag(self.keys.contains(&id))
    }

    pub(crate) fn set_key(&mut self, id: ItemId, value: OverrideType) {
        if value.is_new() {
            self.keys.insert(id);
        } else {
            self.keys.remove(&id);
        }
    }

    /// Items whose value is New.
    pub fn overridden_items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.items.iter().copied()
    }

    /// Items whose key is New.
    pub fn overridden_keys(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.keys.iter().copied()
    }

    /// Drops every flag of a removed item.
    pub(crate) fn forget_item(&mut self, id: ItemId) {
        self.items.remove(&id);
        self.keys.remove(&id);
    }

    pub fn is_empty(&self) -> bool {
        !self.content && self.items.is_empty() && self.keys.is_empty()
    }
}
