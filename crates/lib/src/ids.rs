//! Identifier types used throughout the archetype graph.
//!
//! Three kinds of identity exist:
//!
//! - [`ItemId`] - the stable identity of one element of a collection, independent of
//!   its position or key. Shared by a base collection and every collection derived from it.
//! - [`ObjectId`] - the identity of an identifiable object (`Id:` in the text encoding).
//! - [`AssetId`] - the identity of a whole asset document.
//!
//! Fresh identifiers come from an [`IdGenerator`]. [`RandomIds`] is used by default;
//! [`SequentialIds`] produces a deterministic sequence so that encoding is reproducible.
//!
//! ```
//! use archetype::ids::{IdGenerator, ItemId, SequentialIds};
//!
//! let mut ids = SequentialIds::new(10);
//! let first = ids.next_item_id();
//! assert_eq!(first.to_string(), "0a0000000a0000000a0000000a000000");
//! assert_eq!(first, "0a0000000a0000000a0000000a000000".parse::<ItemId>()?);
//! # Ok::<(), archetype::ids::IdError>(())
//! ```

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error type for identifier parsing failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    /// Item identifiers are 32 hexadecimal characters.
    #[error("Invalid item identifier '{value}': {reason}")]
    InvalidItemId { value: String, reason: String },

    /// Object and asset identifiers are hyphenated uuids.
    #[error("Invalid uuid '{value}'")]
    InvalidUuid { value: String },
}

/// Stable identifier of a collection item.
///
/// Printed as the 32 lowercase hex characters of its raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ItemId([u8; 16]);

impl ItemId {
    /// The empty identifier. Never allocated by a generator.
    pub const EMPTY: ItemId = ItemId([0; 16]);

    /// Creates an identifier from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Creates a fresh random identifier.
    pub fn new_random() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    /// Creates the deterministic identifier for `n`: the little-endian bytes of `n`
    /// repeated four times.
    pub fn from_seed(n: u32) -> Self {
        let mut bytes = [0u8; 16];
        for chunk in bytes.chunks_exact_mut(4) {
            chunk.copy_from_slice(&n.to_le_bytes());
        }
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Returns true for [`ItemId::EMPTY`].
    pub fn is_empty(&self) -> bool {
        self.0 == [0; 16]
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for ItemId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 {
            return Err(IdError::InvalidItemId {
                value: s.to_string(),
                reason: format!("expected 32 hex characters, found {}", s.len()),
            });
        }
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| IdError::InvalidItemId {
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for ItemId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a fresh random identifier.
            pub fn new_random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from raw bytes.
            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }

            /// Creates the deterministic identifier for `n`, laid out like [`ItemId::from_seed`].
            pub fn from_seed(n: u32) -> Self {
                Self::from_bytes(*ItemId::from_seed(n).as_bytes())
            }

            /// Returns the underlying uuid.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::try_parse(s).map(Self).map_err(|_| IdError::InvalidUuid {
                    value: s.to_string(),
                })
            }
        }
    };
}

uuid_id!(
    /// Identity of an identifiable object inside an asset.
    ObjectId
);

uuid_id!(
    /// Identity of an asset document.
    AssetId
);

/// A source of fresh identifiers.
///
/// This trait abstracts over identifier allocation so that production code can use
/// random identifiers while tests and reproducible encodings use a fixed sequence.
pub trait IdGenerator: fmt::Debug {
    /// Allocates a fresh collection item identifier.
    fn next_item_id(&mut self) -> ItemId;

    /// Allocates a fresh object identity.
    fn next_object_id(&mut self) -> ObjectId;
}

/// Random (uuid v4) identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_item_id(&mut self) -> ItemId {
        // v4 uuids carry version bits, so this is never EMPTY
        ItemId::new_random()
    }

    fn next_object_id(&mut self) -> ObjectId {
        ObjectId::new_random()
    }
}

/// Deterministic identifiers built with [`ItemId::from_seed`].
///
/// Item ids and object ids share one counter, so no two allocations ever produce the
/// same bytes.
#[derive(Debug, Clone)]
pub struct SequentialIds {
    next: u32,
}

impl SequentialIds {
    /// Creates a generator whose first identifier is seeded with `start`.
    ///
    /// A start of zero is bumped to one since seed zero is [`ItemId::EMPTY`].
    pub fn new(start: u32) -> Self {
        Self {
            next: start.max(1),
        }
    }

    fn bump(&mut self) -> u32 {
        let n = self.next;
        self.next = self.next.wrapping_add(1).max(1);
        n
    }
}

impl IdGenerator for SequentialIds {
    fn next_item_id(&mut self) -> ItemId {
        ItemId::from_seed(self.bump())
    }

    fn next_object_id(&mut self) -> ObjectId {
        ObjectId::from_seed(self.bump())
    }
}
