//! Constants used throughout the archetype library.
//!
//! Reserved keys and markers of the text encoding.

/// Key of the identity line of an asset or identifiable object.
pub const ID_KEY: &str = "Id";

/// Key of the base back-reference of a derived asset.
pub const ARCHETYPE_KEY: &str = "Archetype";

/// Reserved key under which a base document is embedded inline.
pub const BASE_KEY: &str = "~Base";

/// Location line of an inline base.
pub const BASE_LOCATION_KEY: &str = "Location";

/// Document line of an inline base.
pub const BASE_ASSET_KEY: &str = "Asset";

/// Suffix marking an overridden (New) key.
pub const OVERRIDE_MARKER: char = '*';

/// Separator between an item identifier and a dictionary key.
pub const KEY_SEPARATOR: char = '~';

/// Value of a tombstoned item identifier.
pub const DELETED_MARKER: &str = "~(Deleted)";

/// Prefix of a reference value.
pub const REFERENCE_PREFIX: &str = "ref!!";

/// Prefix of a type tag.
pub const TAG_PREFIX: char = '!';

/// Literal null.
pub const NULL_LITERAL: &str = "null";

/// Prefix of an item of a collection without identifiers.
pub const SEQUENCE_ITEM_PREFIX: &str = "-   ";

/// Spaces per indentation level.
pub const INDENT: usize = 4;
