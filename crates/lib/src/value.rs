//! Plain-data values.
//!
//! [`Value`] is the detached form of graph content: what callers pass to
//! `update`/`add`, what `retrieve` returns, and what the codec reads and writes.
//! Collections carry their [`CollectionItemIds`] table so that item identity survives
//! a round trip through plain data.
//!
//! ```
//! use archetype::value::{List, Object, Value};
//!
//! let asset = Object::new("MyAsset")
//!     .with("MyString", "String")
//!     .with("MyStrings", List::from_values(["String1", "String2"]));
//! assert!(asset.get("MyString").unwrap() == "String");
//! assert_eq!(asset.get("MyStrings").and_then(Value::as_list).map(List::len), Some(2));
//! ```

use crate::{
    collection::{CollectionError, CollectionItemIds},
    ids::{ItemId, ObjectId},
    index::Index,
};

/// A detached value.
///
/// # Value Types
///
/// - [`Value::Null`], [`Value::Bool`], [`Value::Int`], [`Value::Text`] - scalars
/// - [`Value::Object`] - an owned object with named members
/// - [`Value::List`] / [`Value::Map`] - sequences and dictionaries with item identifiers
/// - [`Value::Reference`] - a reference to an identifiable object owned elsewhere
///
/// `Value` compares directly with primitives:
///
/// ```
/// # use archetype::value::Value;
/// assert!(Value::from("hello") == "hello");
/// assert!(Value::Int(42) == 42);
/// assert!(!(Value::Null == "hello"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    /// Null/absent value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Text string value
    Text(String),
    /// Owned object
    Object(Object),
    /// Ordered collection
    List(List),
    /// Keyed collection
    Map(Map),
    /// Reference to an identifiable object by identity
    Reference(ObjectId),
}

impl Value {
    /// Returns true if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true for bool, int and text values
    pub fn is_scalar(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Int(_) | Value::Text(_))
    }

    /// Returns the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Text(_) => "text",
            Value::Object(_) => "object",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Reference(_) => "reference",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut List> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Value::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the identity of the object this value designates, owned or referenced.
    pub fn object_identity(&self) -> Option<ObjectId> {
        match self {
            Value::Object(o) => o.id(),
            Value::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Visits this value and every nested value, depth first.
    pub fn walk_mut(&mut self, f: &mut dyn FnMut(&mut Value)) {
        f(self);
        match self {
            Value::Object(o) => {
                for (_, member) in o.members.iter_mut() {
                    member.walk_mut(f);
                }
            }
            Value::List(l) => {
                for item in l.items.iter_mut() {
                    item.walk_mut(f);
                }
            }
            Value::Map(m) => {
                for (_, item) in m.entries.iter_mut() {
                    item.walk_mut(f);
                }
            }
            _ => {}
        }
    }
}

/// An object: a type name, an optional identity and ordered named members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    type_name: String,
    id: Option<ObjectId>,
    members: Vec<(String, Value)>,
}

impl Object {
    /// Creates an object of the given type with no members.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: None,
            members: Vec::new(),
        }
    }

    /// Builder form of [`Object::set_id`].
    pub fn with_id(mut self, id: ObjectId) -> Self {
        self.id = Some(id);
        self
    }

    /// Builder form of [`Object::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn id(&self) -> Option<ObjectId> {
        self.id
    }

    pub fn set_id(&mut self, id: Option<ObjectId>) {
        self.id = id;
    }

    /// Sets a member, replacing any previous value and keeping its position.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.members.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.members.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.members.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.members
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Removes a member and returns its value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let position = self.members.iter().position(|(n, _)| n == name)?;
        Some(self.members.remove(position).1)
    }

    /// Members in their stored order.
    pub fn members(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.members.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// An ordered collection with per-item identifiers.
///
/// Items pushed without an identifier leave a gap in the table; the graph fills gaps
/// with fresh identifiers when the list is attached.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct List {
    items: Vec<Value>,
    ids: CollectionItemIds,
}

impl List {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a list from values, without identifiers.
    pub fn from_values<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self {
            items: values.into_iter().map(Into::into).collect(),
            ids: CollectionItemIds::new(),
        }
    }

    /// Creates a list from parts. The table is not checked against the items.
    pub fn from_parts(items: Vec<Value>, ids: CollectionItemIds) -> Self {
        Self { items, ids }
    }

    pub fn into_parts(self) -> (Vec<Value>, CollectionItemIds) {
        (self.items, self.ids)
    }

    /// Appends an item without identifier.
    pub fn push(&mut self, value: impl Into<Value>) {
        self.items.push(value.into());
    }

    /// Appends an item with a known identifier.
    pub fn push_with_id(
        &mut self,
        id: ItemId,
        value: impl Into<Value>,
    ) -> Result<(), CollectionError> {
        self.ids.set(Index::Position(self.items.len()), id)?;
        self.items.push(value.into());
        Ok(())
    }

    /// Builder form of [`List::push`].
    pub fn with(mut self, value: impl Into<Value>) -> Self {
        self.push(value);
        self
    }

    pub fn get(&self, position: usize) -> Option<&Value> {
        self.items.get(position)
    }

    pub fn get_mut(&mut self, position: usize) -> Option<&mut Value> {
        self.items.get_mut(position)
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn ids(&self) -> &CollectionItemIds {
        &self.ids
    }

    pub fn ids_mut(&mut self) -> &mut CollectionItemIds {
        &mut self.ids
    }

    /// Identifier of the item at `position`, if assigned.
    pub fn id_at(&self, position: usize) -> Option<ItemId> {
        self.ids.get(&Index::Position(position))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Removes every item and tombstone.
    pub fn clear(&mut self) {
        self.items.clear();
        self.ids.clear();
    }

    /// Replaces the item list, dropping all identifiers.
    pub fn set_items(&mut self, items: Vec<Value>) {
        self.items = items;
        self.ids.clear();
    }
}

/// A keyed collection with per-entry identifiers, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Map {
    entries: Vec<(String, Value)>,
    ids: CollectionItemIds,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map from parts. The table is not checked against the entries.
    pub fn from_parts(entries: Vec<(String, Value)>, ids: CollectionItemIds) -> Self {
        Self { entries, ids }
    }

    pub fn into_parts(self) -> (Vec<(String, Value)>, CollectionItemIds) {
        (self.entries, self.ids)
    }

    /// Inserts or replaces an entry. A new key has no identifier yet.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Inserts an entry with a known identifier.
    pub fn insert_with_id(
        &mut self,
        key: impl Into<String>,
        id: ItemId,
        value: impl Into<Value>,
    ) -> Result<(), CollectionError> {
        let key = key.into();
        self.ids.set(Index::Key(key.clone()), id)?;
        self.insert(key, value);
        Ok(())
    }

    /// Builder form of [`Map::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn ids(&self) -> &CollectionItemIds {
        &self.ids
    }

    pub fn ids_mut(&mut self) -> &mut CollectionItemIds {
        &mut self.ids
    }

    /// Identifier of the entry with `key`, if assigned.
    pub fn id_of(&self, key: &str) -> Option<ItemId> {
        self.ids.get(&Index::key(key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Object(value)
    }
}

impl From<List> for Value {
    fn from(value: List) -> Self {
        Value::List(value)
    }
}

impl From<Map> for Value {
    fn from(value: Map) -> Self {
        Value::Map(value)
    }
}

impl From<ObjectId> for Value {
    fn from(value: ObjectId) -> Self {
        Value::Reference(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl PartialEq<str> for Value {
    fn eq(&self, other: &str) -> bool {
        match self {
            Value::Text(s) => s == other,
            _ => false,
        }
    }
}

impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl PartialEq<i64> for Value {
    fn eq(&self, other: &i64) -> bool {
        match self {
            Value::Int(n) => n == other,
            _ => false,
        }
    }
}

impl PartialEq<i32> for Value {
    fn eq(&self, other: &i32) -> bool {
        match self {
            Value::Int(n) => *n == *other as i64,
            _ => false,
        }
    }
}

impl PartialEq<bool> for Value {
    fn eq(&self, other: &bool) -> bool {
        match self {
            Value::Bool(b) => b == other,
            _ => false,
        }
    }
}
