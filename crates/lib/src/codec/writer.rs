//! Document to text.

use std::collections::BTreeMap;

use crate::{
    codec::{
        CodecError,
        scalar::{ItemHeader, format_key, format_text},
    },
    constants::{
        ARCHETYPE_KEY, BASE_ASSET_KEY, BASE_KEY, BASE_LOCATION_KEY, DELETED_MARKER, ID_KEY,
        INDENT, NULL_LITERAL, OVERRIDE_MARKER, REFERENCE_PREFIX, SEQUENCE_ITEM_PREFIX,
        TAG_PREFIX,
    },
    graph::{AssetDocument, AssetPath, OverrideType},
    ids::ItemId,
    schema::{TypeRegistry, ValueKind},
    value::{List, Map, Object, Value},
};

fn indent(level: usize) -> String {
    " ".repeat(level * INDENT)
}

/// Writes one document, line by line.
pub(crate) struct Writer<'a> {
    registry: &'a TypeRegistry,
    overrides: &'a BTreeMap<AssetPath, OverrideType>,
    lines: Vec<String>,
}

impl<'a> Writer<'a> {
    fn new(registry: &'a TypeRegistry, overrides: &'a BTreeMap<AssetPath, OverrideType>) -> Self {
        Self {
            registry,
            overrides,
            lines: Vec::new(),
        }
    }

    /// Encodes a whole document, starting with the root type tag.
    pub(crate) fn write_document(
        registry: &TypeRegistry,
        document: &AssetDocument,
    ) -> Result<String, CodecError> {
        let mut writer = Writer::new(registry, &document.overrides);
        writer.push(0, format!("{TAG_PREFIX}{}", document.root.type_name()));
        writer.write_root_body(0, document)?;
        let mut text = writer.lines.join("\n");
        text.push('\n');
        Ok(text)
    }

    fn push(&mut self, level: usize, line: impl AsRef<str>) {
        self.lines.push(format!("{}{}", indent(level), line.as_ref()));
    }

    fn is_new(&self, path: &AssetPath) -> bool {
        self.overrides
            .get(path)
            .is_some_and(|value| value.is_new())
    }

    fn write_root_body(&mut self, level: usize, document: &AssetDocument) -> Result<(), CodecError> {
        self.push(level, format!("{ID_KEY}: {}", document.asset_id));
        if let Some(archetype) = &document.archetype {
            self.push(
                level,
                format!("{ARCHETYPE_KEY}: {}:{}", archetype.asset, archetype.location),
            );
        }
        self.write_members(level, &document.root, &AssetPath::root())?;

        if let Some(inline) = &document.base {
            self.push(level, format!("{BASE_KEY}:"));
            self.push(
                level + 1,
                format!("{BASE_LOCATION_KEY}: {}", format_text(&inline.location)),
            );
            self.push(
                level + 1,
                format!(
                    "{BASE_ASSET_KEY}: {TAG_PREFIX}{}",
                    inline.document.root.type_name()
                ),
            );
            // The inline base has its own override table
            let mut nested = Writer::new(self.registry, &inline.document.overrides);
            nested.write_root_body(level + 2, &inline.document)?;
            self.lines.append(&mut nested.lines);
        }
        Ok(())
    }

    fn write_members(
        &mut self,
        level: usize,
        object: &Object,
        path: &AssetPath,
    ) -> Result<(), CodecError> {
        let descriptor =
            self.registry
                .get(object.type_name())
                .map_err(|_| CodecError::UnknownType {
                    type_name: object.type_name().to_string(),
                })?;
        if let Some((name, _)) = object
            .members()
            .find(|(name, _)| descriptor.find_member(name).is_none())
        {
            return Err(CodecError::UnknownMember {
                type_name: descriptor.name.clone(),
                member: name.to_string(),
            });
        }
        for member in &descriptor.members {
            let Some(value) = object.get(&member.name) else {
                continue;
            };
            let member_path = path.clone().with_member(&member.name);
            let mut key = member.name.clone();
            if self.is_new(&member_path) {
                key.push(OVERRIDE_MARKER);
            }
            self.write_entry(
                level,
                &key,
                value,
                &member.kind,
                !member.non_identifiable_items,
                &member_path,
            )?;
        }
        Ok(())
    }

    /// Writes `key: value`, or `key:` followed by a block.
    fn write_entry(
        &mut self,
        level: usize,
        key: &str,
        value: &Value,
        kind: &ValueKind,
        identifiable: bool,
        path: &AssetPath,
    ) -> Result<(), CodecError> {
        if let Some(text) = inline(value, kind, identifiable) {
            self.push(level, format!("{key}: {text}"));
            return Ok(());
        }
        match tag(value, kind) {
            Some(tag) => self.push(level, format!("{key}: {tag}")),
            None => self.push(level, format!("{key}:")),
        }
        self.write_block(level + 1, value, kind, identifiable, path)
    }

    /// Writes an item of a non-identifiable list.
    fn write_dash_item(
        &mut self,
        level: usize,
        value: &Value,
        kind: &ValueKind,
        path: &AssetPath,
    ) -> Result<(), CodecError> {
        if let Some(text) = inline(value, kind, true) {
            self.push(level, format!("{SEQUENCE_ITEM_PREFIX}{text}"));
            return Ok(());
        }
        if let Some(tag) = tag(value, kind) {
            self.push(level, format!("{SEQUENCE_ITEM_PREFIX}{tag}"));
            return self.write_block(level + 1, value, kind, true, path);
        }
        // The first block line moves up behind the dash
        let start = self.lines.len();
        self.write_block(level + 1, value, kind, true, path)?;
        if let Some(first) = self.lines.get_mut(start) {
            let body = first.trim_start().to_string();
            *first = format!("{}{SEQUENCE_ITEM_PREFIX}{body}", indent(level));
        }
        Ok(())
    }

    fn write_block(
        &mut self,
        level: usize,
        value: &Value,
        kind: &ValueKind,
        identifiable: bool,
        path: &AssetPath,
    ) -> Result<(), CodecError> {
        match value {
            Value::Object(object) => {
                if let Some(id) = object.id() {
                    self.push(level, format!("{ID_KEY}: {id}"));
                }
                self.write_members(level, object, path)
            }
            Value::List(list) => {
                let element = element_kind(kind, value)?;
                self.write_list(level, list, element, identifiable, path)
            }
            Value::Map(map) => {
                let element = element_kind(kind, value)?;
                self.write_map(level, map, element, identifiable, path)
            }
            _ => Ok(()),
        }
    }

    fn write_list(
        &mut self,
        level: usize,
        list: &List,
        element: &ValueKind,
        identifiable: bool,
        path: &AssetPath,
    ) -> Result<(), CodecError> {
        if !identifiable {
            for (position, item) in list.items().iter().enumerate() {
                self.write_dash_item(level, item, element, &path.clone().with_position(position))?;
            }
            return Ok(());
        }
        for (position, item) in list.items().iter().enumerate() {
            let id = list.id_at(position).ok_or_else(|| CodecError::UnsupportedValue {
                reason: format!("list item {position} at {path} has no item id"),
            })?;
            let item_path = path.clone().with_item(id);
            let header = ItemHeader::format(id, self.is_new(&item_path), None);
            self.write_entry(level, &header, item, element, true, &item_path)?;
        }
        self.write_tombstones(level, list.ids().deleted_items());
        Ok(())
    }

    fn write_map(
        &mut self,
        level: usize,
        map: &Map,
        element: &ValueKind,
        identifiable: bool,
        path: &AssetPath,
    ) -> Result<(), CodecError> {
        if !identifiable {
            for (position, (key, item)) in map.entries().enumerate() {
                let entry_path = path.clone().with_position(position);
                self.write_entry(level, &format_key(key), item, element, true, &entry_path)?;
            }
            return Ok(());
        }
        for (key, item) in map.entries() {
            let id = map.id_of(key).ok_or_else(|| CodecError::UnsupportedValue {
                reason: format!("dictionary entry {key} at {path} has no item id"),
            })?;
            let item_path = path.clone().with_item(id);
            let key_path = path.clone().with_key(id);
            let header = ItemHeader::format(
                id,
                self.is_new(&item_path),
                Some((key, self.is_new(&key_path))),
            );
            self.write_entry(level, &header, item, element, true, &item_path)?;
        }
        self.write_tombstones(level, map.ids().deleted_items());
        Ok(())
    }

    fn write_tombstones(&mut self, level: usize, deleted: impl Iterator<Item = ItemId>) {
        for id in deleted {
            self.push(level, format!("{id}: {DELETED_MARKER}"));
        }
    }
}

/// Tag naming the concrete type of an object stored where another type is declared.
fn tag(value: &Value, kind: &ValueKind) -> Option<String> {
    match (value, kind) {
        (Value::Object(object), ValueKind::Object(declared))
            if object.type_name() == declared =>
        {
            None
        }
        (Value::Object(object), _) => Some(format!("{TAG_PREFIX}{}", object.type_name())),
        _ => None,
    }
}

/// Single-line form of a value, if it has one.
fn inline(value: &Value, kind: &ValueKind, identifiable: bool) -> Option<String> {
    let text = match value {
        Value::Null => NULL_LITERAL.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Text(text) => format_text(text),
        Value::Reference(id) => format!("{REFERENCE_PREFIX} {id}"),
        Value::Object(object) if object.is_empty() && object.id().is_none() => match tag(value, kind) {
            Some(tag) => format!("{tag} {{}}"),
            None => "{}".to_string(),
        },
        Value::List(list) if list.is_empty() && list.ids().deleted_count() == 0 => {
            if identifiable { "{}" } else { "[]" }.to_string()
        }
        Value::Map(map) if map.is_empty() && map.ids().deleted_count() == 0 => "{}".to_string(),
        _ => return None,
    };
    Some(text)
}

fn element_kind<'k>(kind: &'k ValueKind, value: &Value) -> Result<&'k ValueKind, CodecError> {
    kind.element().ok_or_else(|| CodecError::UnsupportedValue {
        reason: format!("{} stored where {kind} is declared", value.type_name()),
    })
}
