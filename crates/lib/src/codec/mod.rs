//! Indentation-based text encoding of asset documents.
//!
//! The format is line oriented, four spaces per level:
//!
//! ```text
//! !MyAsset
//! Id: 4f4b7c36-0cf4-4dbd-a18b-5c5fe3a2b2d1
//! Archetype: 2e8a1d10-7b0c-4f3e-9f56-0d3e0f9c8a11:base.asset
//! MyString*: Overridden
//! MyStrings:
//!     0a0000000a0000000a0000000a000000: String1
//!     14000000140000001400000014000000*: Local
//!     1e0000001e0000001e0000001e000000: ~(Deleted)
//! MyDictionary:
//!     28000000280000002800000028000000~Key1*: Value1
//! ```
//!
//! * The first line names the root type. `Id` is the asset id and `Archetype` the
//!   base, as `<asset id>:<location>`.
//! * A `*` after a member name, an item id or a dictionary key marks the value (or
//!   the key) as overridden. Everything unmarked is inherited.
//! * Items of identifiable collections are written as `<item id>: value`, dictionary
//!   items as `<item id>~<key>: value`. Deleted base items are listed last as
//!   `<item id>: ~(Deleted)`.
//! * Non-identifiable lists use `-   value` items; non-identifiable dictionaries use
//!   plain `key: value` entries.
//! * An object of a type other than the declared one is tagged `!Type`; references
//!   are written `ref!! <object id>`; ambiguous text is quoted as a JSON string.
//! * An embedded base document follows under `~Base:`, with `Location:` and a tagged
//!   `Asset:` block.
//!
//! ## Example
//!
//! ```
//! use archetype::codec::{decode_document, encode_document};
//! use archetype::graph::AssetDocument;
//! use archetype::ids::AssetId;
//! use archetype::schema::{MemberDescriptor, TypeDescriptor, TypeRegistry};
//! use archetype::Object;
//!
//! let mut registry = TypeRegistry::new();
//! registry.register(TypeDescriptor::new("MyAsset").member(MemberDescriptor::text("MyString")))?;
//!
//! let document = AssetDocument::new(
//!     AssetId::new_random(),
//!     Object::new("MyAsset").with("MyString", "String"),
//! );
//! let text = encode_document(&registry, &document)?;
//! assert!(text.starts_with("!MyAsset\n"));
//! assert_eq!(decode_document(&registry, &text)?, document);
//! # Ok::<(), archetype::Error>(())
//! ```

mod reader;
mod scalar;
mod writer;

use thiserror::Error;

use crate::{
    Result,
    graph::{AssetDocument, GraphContainer},
    ids::AssetId,
    schema::TypeRegistry,
};

/// Errors raised while encoding or decoding documents.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CodecError {
    /// The text does not follow the format
    #[error("Malformed document at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    /// A type tag or declared type is not registered
    #[error("Unknown type: {type_name}")]
    UnknownType { type_name: String },

    /// An entry names a member its type does not declare
    #[error("Type {type_name} has no member {member}")]
    UnknownMember { type_name: String, member: String },

    /// An item header does not start with a valid item id
    #[error("Invalid item id at line {line}: {value}")]
    InvalidItemId { line: usize, value: String },

    /// An asset or object id is not a valid UUID
    #[error("Invalid object id at line {line}: {value}")]
    InvalidObjectId { line: usize, value: String },

    /// A value cannot be represented, or does not fit its declared kind
    #[error("Unsupported value: {reason}")]
    UnsupportedValue { reason: String },
}

impl CodecError {
    /// Check if the text itself is at fault
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            CodecError::Malformed { .. }
                | CodecError::InvalidItemId { .. }
                | CodecError::InvalidObjectId { .. }
        )
    }

    /// Check if this error names a type or member the registry does not know
    pub fn is_unknown_type(&self) -> bool {
        matches!(
            self,
            CodecError::UnknownType { .. } | CodecError::UnknownMember { .. }
        )
    }

    /// Line of the text the error was found at, when decoding.
    pub fn line(&self) -> Option<usize> {
        match self {
            CodecError::Malformed { line, .. }
            | CodecError::InvalidItemId { line, .. }
            | CodecError::InvalidObjectId { line, .. } => Some(*line),
            _ => None,
        }
    }
}

impl From<CodecError> for crate::Error {
    fn from(err: CodecError) -> Self {
        crate::Error::Codec(err)
    }
}

/// Encodes a document to text.
///
/// # Errors
/// [`CodecError::UnknownType`] or [`CodecError::UnknownMember`] when the document uses
/// types the registry does not describe, [`CodecError::UnsupportedValue`] when an item
/// of an identifiable collection has no item id.
pub fn encode_document(registry: &TypeRegistry, document: &AssetDocument) -> Result<String> {
    Ok(writer::Writer::write_document(registry, document)?)
}

/// Decodes a document from text.
///
/// Member values are read against the kinds declared in `registry`. Override markers
/// are collected into [`AssetDocument::overrides`].
pub fn decode_document(registry: &TypeRegistry, text: &str) -> Result<AssetDocument> {
    let document = reader::read_document(registry, text)?;
    tracing::trace!(
        asset = %document.asset_id,
        overrides = document.overrides.len(),
        "document decoded"
    );
    Ok(document)
}

impl GraphContainer {
    /// Encodes an asset of the container.
    ///
    /// Item identifier tables are re-verified first when
    /// [`GraphConfig::repair_item_ids`](crate::config::GraphConfig) is set.
    pub fn encode_asset(&mut self, asset: AssetId) -> Result<String> {
        self.prepare_for_save(asset)?;
        let document = self.to_document(asset)?;
        encode_document(self.registry(), &document)
    }

    /// Encodes an asset together with its base documents.
    pub fn encode_asset_with_inline_base(&mut self, asset: AssetId) -> Result<String> {
        self.prepare_for_save(asset)?;
        let document = self.to_document_with_inline_base(asset)?;
        encode_document(self.registry(), &document)
    }

    /// Decodes a document and loads it into the container.
    ///
    /// # Returns
    /// The id of the loaded asset.
    pub fn decode_asset(&mut self, text: &str) -> Result<AssetId> {
        let document = decode_document(self.registry(), text)?;
        self.load_document(document)
    }
}
