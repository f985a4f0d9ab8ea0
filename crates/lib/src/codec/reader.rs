//! Text to document.
//!
//! Decoding runs in two steps. Lines are first lexed into an indentation tree of
//! entries (`key: value`) and sequence items (`-   value`); the tree is then read
//! against the declared kinds of the [`TypeRegistry`], collecting override markers
//! into the document's override table on the way.

use std::collections::BTreeMap;

use crate::{
    codec::{
        CodecError,
        scalar::{ItemHeader, member_name, parse_text, split_entry},
    },
    collection::CollectionItemIds,
    constants::{
        ARCHETYPE_KEY, BASE_ASSET_KEY, BASE_KEY, BASE_LOCATION_KEY, DELETED_MARKER, ID_KEY,
        INDENT, NULL_LITERAL, OVERRIDE_MARKER, REFERENCE_PREFIX, SEQUENCE_ITEM_PREFIX,
        TAG_PREFIX,
    },
    graph::{AssetDocument, AssetPath, BaseReference, InlineBase, OverrideType},
    ids::{AssetId, ObjectId},
    index::Index,
    schema::{TypeRegistry, ValueKind},
    value::{List, Map, Object, Value},
};

// ===== Lexing =====

#[derive(Debug, Clone, PartialEq)]
enum Line {
    Entry { key: String, value: Option<String> },
    /// A sequence item, with its value when it fits on the dash line
    Item { value: Option<String> },
}

#[derive(Debug)]
struct Token {
    number: usize,
    level: usize,
    line: Line,
}

#[derive(Debug)]
struct RawNode {
    number: usize,
    line: Line,
    children: Vec<RawNode>,
}

impl RawNode {
    fn malformed(&self, reason: impl Into<String>) -> CodecError {
        CodecError::Malformed {
            line: self.number,
            reason: reason.into(),
        }
    }
}

/// Splits the text into the root type name and one token per line.
fn lex(text: &str) -> Result<(String, Vec<Token>), CodecError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(n, line)| (n + 1, line))
        .filter(|(_, line)| !line.trim().is_empty());

    let Some((first_number, first)) = lines.next() else {
        return Err(CodecError::Malformed {
            line: 1,
            reason: "empty document".to_string(),
        });
    };
    let Some(root_type) = first.trim_end().strip_prefix(TAG_PREFIX) else {
        return Err(CodecError::Malformed {
            line: first_number,
            reason: "document must start with a type tag".to_string(),
        });
    };

    let mut tokens = Vec::new();
    for (number, raw) in lines {
        let content = raw.trim_start_matches(' ');
        let spaces = raw.len() - content.len();
        if spaces % INDENT != 0 || content.starts_with('\t') {
            return Err(CodecError::Malformed {
                line: number,
                reason: format!("indentation must be a multiple of {INDENT} spaces"),
            });
        }
        let mut level = spaces / INDENT;
        let mut content = content.trim_end();
        loop {
            if let Some(rest) = content
                .strip_prefix(SEQUENCE_ITEM_PREFIX)
                .or_else(|| (content == "-").then_some(""))
            {
                // A dash followed by an entry opens a block whose first line shares
                // the dash line
                if split_entry(rest).is_some() || rest.starts_with(SEQUENCE_ITEM_PREFIX) {
                    tokens.push(Token {
                        number,
                        level,
                        line: Line::Item { value: None },
                    });
                    level += 1;
                    content = rest;
                    continue;
                }
                tokens.push(Token {
                    number,
                    level,
                    line: Line::Item {
                        value: (!rest.is_empty()).then(|| rest.to_string()),
                    },
                });
                break;
            }
            let Some((key, value)) = split_entry(content) else {
                return Err(CodecError::Malformed {
                    line: number,
                    reason: format!("expected `key: value`, found `{content}`"),
                });
            };
            tokens.push(Token {
                number,
                level,
                line: Line::Entry {
                    key: key.to_string(),
                    value: value.map(str::to_string),
                },
            });
            break;
        }
    }
    Ok((root_type.trim().to_string(), tokens))
}

/// Groups tokens at `level` with the deeper tokens that follow them.
fn build_tree(tokens: &[Token], pos: &mut usize, level: usize) -> Result<Vec<RawNode>, CodecError> {
    let mut nodes = Vec::new();
    while let Some(token) = tokens.get(*pos) {
        if token.level < level {
            break;
        }
        if token.level > level {
            return Err(CodecError::Malformed {
                line: token.number,
                reason: "unexpected indentation".to_string(),
            });
        }
        *pos += 1;
        let children = match tokens.get(*pos) {
            Some(next) if next.level > level => build_tree(tokens, pos, level + 1)?,
            _ => Vec::new(),
        };
        nodes.push(RawNode {
            number: token.number,
            line: token.line.clone(),
            children,
        });
    }
    Ok(nodes)
}

// ===== Reading =====

/// Reads one document from text.
pub(crate) fn read_document(registry: &TypeRegistry, text: &str) -> Result<AssetDocument, CodecError> {
    let (root_type, tokens) = lex(text)?;
    let mut pos = 0;
    let nodes = build_tree(&tokens, &mut pos, 0)?;
    read_root(registry, &root_type, &nodes, 1)
}

fn read_root(
    registry: &TypeRegistry,
    root_type: &str,
    nodes: &[RawNode],
    number: usize,
) -> Result<AssetDocument, CodecError> {
    let mut reader = Reader {
        registry,
        overrides: BTreeMap::new(),
    };
    let mut asset_id = None;
    let mut archetype = None;
    let mut base = None;
    let mut members = Vec::new();
    for node in nodes {
        let Line::Entry { key, value } = &node.line else {
            return Err(node.malformed("sequence item at the root of a document"));
        };
        match key.as_str() {
            ID_KEY => asset_id = Some(parse_asset_id(node, value.as_deref())?),
            ARCHETYPE_KEY => archetype = Some(parse_archetype(node, value.as_deref())?),
            BASE_KEY => base = Some(Box::new(read_inline_base(registry, node)?)),
            _ => members.push(node),
        }
    }
    let asset_id = asset_id.ok_or_else(|| CodecError::Malformed {
        line: number,
        reason: format!("document has no {ID_KEY}"),
    })?;
    let root = reader.read_object(root_type, members, &AssetPath::root())?;
    Ok(AssetDocument {
        asset_id,
        root,
        archetype,
        overrides: reader.overrides,
        base,
    })
}

fn parse_asset_id(node: &RawNode, value: Option<&str>) -> Result<AssetId, CodecError> {
    let raw = value.unwrap_or_default();
    raw.parse().map_err(|_| CodecError::InvalidObjectId {
        line: node.number,
        value: raw.to_string(),
    })
}

/// `Archetype: <asset id>:<location>`
fn parse_archetype(node: &RawNode, value: Option<&str>) -> Result<BaseReference, CodecError> {
    let raw = value.unwrap_or_default();
    let Some((asset, location)) = raw.split_once(':') else {
        return Err(node.malformed(format!("expected <asset id>:<location>, found `{raw}`")));
    };
    let asset = asset.parse::<AssetId>().map_err(|_| CodecError::InvalidObjectId {
        line: node.number,
        value: asset.to_string(),
    })?;
    Ok(BaseReference::new(asset, location))
}

fn read_inline_base(registry: &TypeRegistry, node: &RawNode) -> Result<InlineBase, CodecError> {
    let mut location = None;
    let mut document = None;
    for child in &node.children {
        let Line::Entry { key, value } = &child.line else {
            return Err(child.malformed("sequence item in an inline base"));
        };
        match key.as_str() {
            BASE_LOCATION_KEY => {
                location = Some(parse_text(value.as_deref().unwrap_or_default(), child.number)?)
            }
            BASE_ASSET_KEY => {
                let type_name = value
                    .as_deref()
                    .and_then(|v| v.strip_prefix(TAG_PREFIX))
                    .ok_or_else(|| child.malformed("inline base asset must be tagged with its type"))?;
                document = Some(read_root(registry, type_name.trim(), &child.children, child.number)?);
            }
            other => return Err(child.malformed(format!("unexpected inline base entry {other}"))),
        }
    }
    match (location, document) {
        (Some(location), Some(document)) => Ok(InlineBase { location, document }),
        _ => Err(node.malformed(format!(
            "inline base needs {BASE_LOCATION_KEY} and {BASE_ASSET_KEY}"
        ))),
    }
}

struct Reader<'a> {
    registry: &'a TypeRegistry,
    overrides: BTreeMap<AssetPath, OverrideType>,
}

impl Reader<'_> {
    fn mark(&mut self, path: AssetPath) {
        self.overrides.insert(path, OverrideType::New);
    }

    fn read_object<'n>(
        &mut self,
        type_name: &str,
        nodes: impl IntoIterator<Item = &'n RawNode>,
        path: &AssetPath,
    ) -> Result<Object, CodecError> {
        let registry = self.registry;
        let descriptor = registry
            .get(type_name)
            .map_err(|_| CodecError::UnknownType {
                type_name: type_name.to_string(),
            })?;
        let mut object = Object::new(type_name);
        for node in nodes {
            let Line::Entry { key, value } = &node.line else {
                return Err(node.malformed(format!("sequence item inside {type_name}")));
            };
            if key == ID_KEY {
                let raw = value.as_deref().unwrap_or_default();
                let id = raw.parse::<ObjectId>().map_err(|_| CodecError::InvalidObjectId {
                    line: node.number,
                    value: raw.to_string(),
                })?;
                object.set_id(Some(id));
                continue;
            }
            let (name, overridden) = member_name(key);
            if name.contains(OVERRIDE_MARKER) {
                return Err(node.malformed(format!("invalid override marker in {key}")));
            }
            let member = descriptor
                .find_member(name)
                .ok_or_else(|| CodecError::UnknownMember {
                    type_name: type_name.to_string(),
                    member: name.to_string(),
                })?;
            if object.get(name).is_some() {
                return Err(node.malformed(format!("member {name} appears twice")));
            }
            let member_path = path.clone().with_member(name);
            if overridden {
                self.mark(member_path.clone());
            }
            let value = self.read_value(
                node,
                value.as_deref(),
                &member.kind,
                !member.non_identifiable_items,
                &member_path,
            )?;
            object.set(name, value);
        }
        Ok(object)
    }

    fn read_value(
        &mut self,
        node: &RawNode,
        raw: Option<&str>,
        kind: &ValueKind,
        identifiable: bool,
        path: &AssetPath,
    ) -> Result<Value, CodecError> {
        let Some(raw) = raw else {
            return match kind {
                ValueKind::Object(type_name) => {
                    Ok(Value::Object(self.read_object(type_name, &node.children, path)?))
                }
                ValueKind::List(element) => {
                    Ok(Value::List(self.read_list(node, element, path)?))
                }
                ValueKind::Map(element) => {
                    Ok(Value::Map(self.read_map(node, element, identifiable, path)?))
                }
                _ => Err(node.malformed(format!("missing {kind} value"))),
            };
        };

        if let Some(type_name) = raw.strip_prefix(TAG_PREFIX) {
            return match type_name.strip_suffix(" {}") {
                Some(type_name) if node.children.is_empty() => {
                    Ok(Value::Object(self.read_object(type_name.trim(), [], path)?))
                }
                Some(_) => Err(node.malformed("empty object followed by a block")),
                None => Ok(Value::Object(self.read_object(
                    type_name.trim(),
                    &node.children,
                    path,
                )?)),
            };
        }
        if !node.children.is_empty() {
            return Err(node.malformed("value followed by a block"));
        }
        if raw == NULL_LITERAL {
            return Ok(Value::Null);
        }
        if let Some(target) = raw.strip_prefix(REFERENCE_PREFIX) {
            let target = target.trim();
            let id = target.parse::<ObjectId>().map_err(|_| CodecError::InvalidObjectId {
                line: node.number,
                value: target.to_string(),
            })?;
            return Ok(Value::Reference(id));
        }

        let unsupported = || CodecError::UnsupportedValue {
            reason: format!("line {}: `{raw}` is not a valid {kind}", node.number),
        };
        match (kind, raw) {
            (ValueKind::Object(type_name), "{}") => Ok(Value::Object(Object::new(type_name))),
            (ValueKind::List(_), "{}" | "[]") => Ok(Value::List(List::new())),
            (ValueKind::Map(_), "{}") => Ok(Value::Map(Map::new())),
            (ValueKind::Bool, "true") => Ok(Value::Bool(true)),
            (ValueKind::Bool, "false") => Ok(Value::Bool(false)),
            (ValueKind::Int, raw) => raw.parse().map(Value::Int).map_err(|_| unsupported()),
            (ValueKind::Text, raw) => Ok(Value::Text(parse_text(raw, node.number)?)),
            _ => Err(unsupported()),
        }
    }

    fn read_list(
        &mut self,
        node: &RawNode,
        element: &ValueKind,
        path: &AssetPath,
    ) -> Result<List, CodecError> {
        let mut items = Vec::new();
        let mut ids = CollectionItemIds::new();
        let mut dashed = None;
        for child in &node.children {
            let is_dash = matches!(child.line, Line::Item { .. });
            if *dashed.get_or_insert(is_dash) != is_dash {
                return Err(child.malformed("list mixes identified and plain items"));
            }
            match &child.line {
                Line::Item { value } => {
                    let item_path = path.clone().with_position(items.len());
                    items.push(self.read_value(child, value.as_deref(), element, true, &item_path)?);
                }
                Line::Entry { key, value } => {
                    let header = ItemHeader::parse(key, child.number)?;
                    if header.key.is_some() {
                        return Err(child.malformed("dictionary key on a list item"));
                    }
                    if value.as_deref() == Some(DELETED_MARKER) {
                        ids.mark_as_deleted(header.id);
                        continue;
                    }
                    ids.insert(items.len(), header.id)
                        .map_err(|err| child.malformed(err.to_string()))?;
                    let item_path = path.clone().with_item(header.id);
                    if header.overridden {
                        self.mark(item_path.clone());
                    }
                    items.push(self.read_value(child, value.as_deref(), element, true, &item_path)?);
                }
            }
        }
        Ok(List::from_parts(items, ids))
    }

    fn read_map(
        &mut self,
        node: &RawNode,
        element: &ValueKind,
        identifiable: bool,
        path: &AssetPath,
    ) -> Result<Map, CodecError> {
        let mut entries: Vec<(String, Value)> = Vec::new();
        let mut ids = CollectionItemIds::new();
        for child in &node.children {
            let Line::Entry { key: raw_key, value } = &child.line else {
                return Err(child.malformed("sequence item inside a dictionary"));
            };
            let (key, item_path) = if identifiable {
                let header = ItemHeader::parse(raw_key, child.number)?;
                if value.as_deref() == Some(DELETED_MARKER) {
                    ids.mark_as_deleted(header.id);
                    continue;
                }
                let Some((key, key_overridden)) = header.key else {
                    return Err(child.malformed("dictionary item without a key"));
                };
                let item_path = path.clone().with_item(header.id);
                if header.overridden {
                    self.mark(item_path.clone());
                }
                if key_overridden {
                    self.mark(path.clone().with_key(header.id));
                }
                ids.add(Index::Key(key.clone()), header.id)
                    .map_err(|err| child.malformed(err.to_string()))?;
                (key, item_path)
            } else {
                let key = parse_text(raw_key, child.number)?;
                (key, path.clone().with_position(entries.len()))
            };
            if entries.iter().any(|(existing, _)| *existing == key) {
                return Err(child.malformed(format!("duplicate key {key}")));
            }
            let value = self.read_value(child, value.as_deref(), element, true, &item_path)?;
            entries.push((key, value));
        }
        Ok(Map::from_parts(entries, ids))
    }
}
