//! Explicit type descriptions.
//!
//! The graph does not reflect over Rust types. Every object type that can appear in an
//! asset is described once by a [`TypeDescriptor`]: its ordered members, their kinds and
//! default values, and the annotations that change override behaviour
//! (`non_overridable`, `non_identifiable_items`). Descriptors are registered in a
//! [`TypeRegistry`] which the graph and the codec consult.
//!
//! ```
//! use archetype::schema::{MemberDescriptor, TypeDescriptor, TypeRegistry, ValueKind};
//!
//! let mut registry = TypeRegistry::new();
//! registry.register(
//!     TypeDescriptor::new("MyAsset")
//!         .member(MemberDescriptor::text("MyString"))
//!         .member(MemberDescriptor::new("MyStrings", ValueKind::list(ValueKind::Text))),
//! )?;
//! let asset = registry.instantiate("MyAsset")?;
//! assert!(asset.get("MyString").unwrap().is_null());
//! # Ok::<(), archetype::schema::SchemaError>(())
//! ```

use std::{collections::HashMap, fmt};

use thiserror::Error;

use crate::value::{List, Map, Object, Value};

/// Errors raised while describing or checking types.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The type name is not registered
    #[error("Unknown type: {name}")]
    UnknownType { name: String },

    /// The type has no member with this name
    #[error("Type {type_name} has no member {member}")]
    UnknownMember { type_name: String, member: String },

    /// A type with this name is already registered
    #[error("Type {name} is already registered")]
    DuplicateType { name: String },

    /// A value does not fit the declared kind of a member
    #[error("Member {member} expects {expected}, found {actual}")]
    KindMismatch {
        member: String,
        expected: String,
        actual: String,
    },
}

impl SchemaError {
    /// Check if this error is a lookup failure
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SchemaError::UnknownType { .. } | SchemaError::UnknownMember { .. }
        )
    }

    /// Check if this error is a kind mismatch
    pub fn is_type_error(&self) -> bool {
        matches!(self, SchemaError::KindMismatch { .. })
    }
}

/// The declared kind of a member or collection element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Int,
    Text,
    /// An object of the named type. Any registered type may be stored; a concrete type
    /// different from the declared one is tagged in the text encoding.
    Object(String),
    /// A sequence of the inner kind
    List(Box<ValueKind>),
    /// A text-keyed dictionary of the inner kind
    Map(Box<ValueKind>),
}

impl ValueKind {
    pub fn object(type_name: impl Into<String>) -> Self {
        ValueKind::Object(type_name.into())
    }

    pub fn list(inner: ValueKind) -> Self {
        ValueKind::List(Box::new(inner))
    }

    pub fn map(inner: ValueKind) -> Self {
        ValueKind::Map(Box::new(inner))
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, ValueKind::Bool | ValueKind::Int | ValueKind::Text)
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, ValueKind::List(_) | ValueKind::Map(_))
    }

    /// Element kind of a collection.
    pub fn element(&self) -> Option<&ValueKind> {
        match self {
            ValueKind::List(inner) | ValueKind::Map(inner) => Some(inner),
            _ => None,
        }
    }

    /// The value a member of this kind holds when nothing else is specified.
    pub fn default_value(&self) -> Value {
        match self {
            ValueKind::Bool => Value::Bool(false),
            ValueKind::Int => Value::Int(0),
            ValueKind::Text | ValueKind::Object(_) => Value::Null,
            ValueKind::List(_) => Value::List(List::new()),
            ValueKind::Map(_) => Value::Map(Map::new()),
        }
    }

    /// Returns true if `value` can be stored in a slot of this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (ValueKind::Bool, Value::Bool(_))
                | (ValueKind::Int, Value::Int(_))
                | (ValueKind::Text, Value::Text(_))
                | (ValueKind::Object(_), Value::Object(_) | Value::Reference(_))
                | (ValueKind::List(_), Value::List(_))
                | (ValueKind::Map(_), Value::Map(_))
        )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Bool => write!(f, "bool"),
            ValueKind::Int => write!(f, "int"),
            ValueKind::Text => write!(f, "text"),
            ValueKind::Object(name) => write!(f, "{name}"),
            ValueKind::List(inner) => write!(f, "List<{inner}>"),
            ValueKind::Map(inner) => write!(f, "Map<{inner}>"),
        }
    }
}

/// Description of one member of a type.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberDescriptor {
    pub name: String,
    pub kind: ValueKind,
    pub default: Option<Value>,
    /// The member never carries an override. Its value belongs to each asset on its
    /// own: base changes are neither propagated into it nor reconciled.
    pub non_overridable: bool,
    /// The member's collection has no per-item identifiers.
    pub non_identifiable_items: bool,
}

impl MemberDescriptor {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            non_overridable: false,
            non_identifiable_items: false,
        }
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::Bool)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::Int)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::Text)
    }

    pub fn object(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::object(type_name))
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn non_overridable(mut self) -> Self {
        self.non_overridable = true;
        self
    }

    pub fn non_identifiable_items(mut self) -> Self {
        self.non_identifiable_items = true;
        self
    }

    pub fn default_value(&self) -> Value {
        self.default
            .clone()
            .unwrap_or_else(|| self.kind.default_value())
    }
}

/// Description of an object type: its name, whether instances carry an identity, and
/// its members in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    pub name: String,
    pub identifiable: bool,
    pub members: Vec<MemberDescriptor>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifiable: false,
            members: Vec::new(),
        }
    }

    /// Instances carry an [`ObjectId`](crate::ids::ObjectId) and can be referenced.
    pub fn identifiable(mut self) -> Self {
        self.identifiable = true;
        self
    }

    pub fn member(mut self, member: MemberDescriptor) -> Self {
        self.members.push(member);
        self
    }

    pub fn find_member(&self, name: &str) -> Option<&MemberDescriptor> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Creates an object holding every member's default value.
    pub fn instantiate(&self) -> Object {
        self.members
            .iter()
            .fold(Object::new(&self.name), |object, member| {
                object.with(&member.name, member.default_value())
            })
    }
}

/// Types that describe themselves.
///
/// # Example
///
/// ```
/// use archetype::schema::{AssetSchema, MemberDescriptor, TypeDescriptor};
///
/// struct Label;
///
/// impl AssetSchema for Label {
///     fn type_name() -> &'static str {
///         "Label"
///     }
///
///     fn describe() -> TypeDescriptor {
///         TypeDescriptor::new(Self::type_name()).member(MemberDescriptor::text("Text"))
///     }
/// }
///
/// assert_eq!(Label::describe().members.len(), 1);
/// ```
pub trait AssetSchema {
    /// Returns the registered name of this type.
    fn type_name() -> &'static str;

    /// Builds the descriptor of this type.
    fn describe() -> TypeDescriptor;
}

/// The set of known object types.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDescriptor>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor. Names are unique.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Result<(), SchemaError> {
        if self.types.contains_key(&descriptor.name) {
            return Err(SchemaError::DuplicateType {
                name: descriptor.name,
            });
        }
        self.types.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Registers the descriptor of a self-describing type.
    pub fn register_schema<T: AssetSchema>(&mut self) -> Result<(), SchemaError> {
        self.register(T::describe())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&TypeDescriptor, SchemaError> {
        self.types
            .get(name)
            .ok_or_else(|| SchemaError::UnknownType {
                name: name.to_string(),
            })
    }

    pub fn member(&self, type_name: &str, member: &str) -> Result<&MemberDescriptor, SchemaError> {
        self.get(type_name)?
            .find_member(member)
            .ok_or_else(|| SchemaError::UnknownMember {
                type_name: type_name.to_string(),
                member: member.to_string(),
            })
    }

    /// Creates a default instance of a registered type.
    pub fn instantiate(&self, name: &str) -> Result<Object, SchemaError> {
        Ok(self.get(name)?.instantiate())
    }

    /// Checks an object and everything it contains against the registered descriptors.
    pub fn check(&self, object: &Object) -> Result<(), SchemaError> {
        let descriptor = self.get(object.type_name())?;
        for (name, value) in object.members() {
            let member =
                descriptor
                    .find_member(name)
                    .ok_or_else(|| SchemaError::UnknownMember {
                        type_name: descriptor.name.clone(),
                        member: name.to_string(),
                    })?;
            self.check_value(&member.name, &member.kind, value)?;
        }
        Ok(())
    }

    /// Checks a value written to a slot of the given kind, including everything nested
    /// in it.
    pub fn check_value(
        &self,
        member: &str,
        kind: &ValueKind,
        value: &Value,
    ) -> Result<(), SchemaError> {
        if !kind.accepts(value) {
            return Err(SchemaError::KindMismatch {
                member: member.to_string(),
                expected: kind.to_string(),
                actual: value.type_name().to_string(),
            });
        }
        match (kind, value) {
            (_, Value::Object(object)) => self.check(object),
            (ValueKind::List(inner), Value::List(list)) => list
                .items()
                .iter()
                .try_for_each(|item| self.check_value(member, inner, item)),
            (ValueKind::Map(inner), Value::Map(map)) => map
                .entries()
                .try_for_each(|(_, item)| self.check_value(member, inner, item)),
            _ => Ok(()),
        }
    }
}
