//! Type metadata: wire tags, type identities, pooled descriptors, and the
//! resolver capability that enumerates members and materializes instances.

use crate::item::{Item, ListItem, MapItem, RecordItem};
use crate::{EncoderError, Result};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Wire tag identifying the shape of an encoded value.
///
/// Tag values are stable and part of the wire format. `Dynamic` is reserved
/// and never produced; decoding it fails with
/// [`EncoderError::UnsupportedType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    Null = 0,
    I8 = 1,
    U8 = 2,
    I16 = 3,
    U16 = 4,
    I32 = 5,
    U32 = 6,
    I64 = 7,
    U64 = 8,
    F32 = 9,
    F64 = 10,
    Decimal = 11,
    Bool = 12,
    Char = 13,
    Str = 14,
    Date = 15,
    Array = 16,
    List = 17,
    Map = 18,
    Dynamic = 19,
    Record = 20,
}

impl TypeTag {
    /// A final tag carries no nested polymorphism: its payload is fully
    /// determined by the tag alone. Elements of a homogeneous sequence whose
    /// declared element tag is final are written without per-element tags.
    pub fn is_final(self) -> bool {
        !matches!(
            self,
            TypeTag::Array | TypeTag::List | TypeTag::Map | TypeTag::Dynamic | TypeTag::Record
        )
    }

    pub fn from_u8(b: u8) -> Result<Self> {
        Ok(match b {
            0 => TypeTag::Null,
            1 => TypeTag::I8,
            2 => TypeTag::U8,
            3 => TypeTag::I16,
            4 => TypeTag::U16,
            5 => TypeTag::I32,
            6 => TypeTag::U32,
            7 => TypeTag::I64,
            8 => TypeTag::U64,
            9 => TypeTag::F32,
            10 => TypeTag::F64,
            11 => TypeTag::Decimal,
            12 => TypeTag::Bool,
            13 => TypeTag::Char,
            14 => TypeTag::Str,
            15 => TypeTag::Date,
            16 => TypeTag::Array,
            17 => TypeTag::List,
            18 => TypeTag::Map,
            19 => TypeTag::Dynamic,
            20 => TypeTag::Record,
            other => {
                return Err(EncoderError::UnsupportedType(format!(
                    "unknown tag byte {}",
                    other
                )))
            }
        })
    }
}

/// A type identity: name plus a namespace qualifier.
///
/// The qualifier plays the role an assembly name plays in other runtimes;
/// for derived Rust types it defaults to the defining `module_path!()`.
/// Two descriptors with the same key are the same type, whatever their
/// member lists say.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeKey {
    pub name: String,
    pub qualifier: String,
}

impl TypeKey {
    pub fn new(name: impl Into<String>, qualifier: impl Into<String>) -> Self {
        TypeKey {
            name: name.into(),
            qualifier: qualifier.into(),
        }
    }

    /// Built-in identity of a primitive scalar type.
    pub fn primitive(name: &str) -> Self {
        TypeKey::new(name, "core")
    }

    /// Built-in identity for undeclared (polymorphic) element slots.
    pub fn any() -> Self {
        TypeKey::new("any", "core")
    }

    pub fn string() -> Self {
        TypeKey::new("string", "alloc")
    }

    pub fn vec() -> Self {
        TypeKey::new("vec", "alloc")
    }

    pub fn hash_map() -> Self {
        TypeKey::new("hash_map", "std")
    }

    pub fn btree_map() -> Self {
        TypeKey::new("btree_map", "std")
    }

    pub fn datetime() -> Self {
        TypeKey::new("datetime", "chrono")
    }

    pub fn decimal() -> Self {
        TypeKey::new("decimal", "rust_decimal")
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.qualifier, self.name)
    }
}

/// Pooled, wire-level descriptor of a record or collection type. All
/// identity and member strings are references into the string pool.
///
/// Equality and hashing cover the name and qualifier references only: the
/// member list does not participate in identity, so the first registered
/// member list for a given identity wins for the whole encode pass.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub name: u32,
    pub qualifier: u32,
    pub is_value_kind: bool,
    pub members: Vec<u32>,
}

impl TypeDescriptor {
    /// A member-less descriptor used to probe the type pool before the
    /// member list has been computed.
    pub fn probe(name: u32, qualifier: u32) -> Self {
        TypeDescriptor {
            name,
            qualifier,
            is_value_kind: false,
            members: Vec::new(),
        }
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.qualifier == other.qualifier
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.qualifier.hash(state);
    }
}

/// Resolver-side description of a type: identity, kind flag, and the
/// serializable member names in a stable, deterministic order. The member
/// order is part of the wire contract — record values are aligned with it
/// positionally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub key: TypeKey,
    pub is_value_kind: bool,
    pub members: Vec<String>,
}

/// Container shape the decoder expects an instance of. Known from the tag
/// byte that preceded the type reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeShape {
    List,
    Map,
    Record,
}

/// The external capability the codec consumes for everything type-related
/// it cannot know itself: member enumeration during encode, and instance
/// construction, member assignment, and collection insertion during decode.
///
/// The codec holds no state across calls, so a resolver shared between
/// threads only needs to be reentrant for encode/decode calls to run in
/// parallel.
pub trait TypeResolver {
    /// Describes a type identity for encoding. The returned member order
    /// must be identical between runs.
    fn describe(&self, key: &TypeKey) -> Result<TypeInfo>;

    /// Materializes an empty instance of the given shape.
    fn construct(&self, key: &TypeKey, shape: TypeShape) -> Result<Item>;

    /// Reads a named member's value from an instance.
    fn get_member(&self, instance: &Item, name: &str) -> Result<Item>;

    /// Assigns a named member's value on an instance.
    fn set_member(&self, instance: &mut Item, name: &str, value: Item) -> Result<()>;

    /// Appends an element to a list instance.
    fn insert_element(&self, list: &mut Item, value: Item) -> Result<()>;

    /// Inserts a key/value pair into a map instance.
    fn insert_entry(&self, map: &mut Item, key: Item, value: Item) -> Result<()>;
}

/// Static type metadata implemented by `#[derive(Reflect)]`.
pub trait Reflect {
    /// The type's wire identity.
    fn type_key() -> TypeKey;

    /// Whether the descriptor carries the value-kind flag.
    fn is_value_kind() -> bool {
        false
    }

    /// Serializable member names in declaration order.
    fn members() -> &'static [&'static str];
}

#[derive(Debug, Clone)]
enum Schema {
    Record {
        is_value_kind: bool,
        members: Vec<String>,
    },
    List {
        elem_tag: TypeTag,
        members: Vec<String>,
    },
    Map {
        members: Vec<String>,
    },
}

impl Schema {
    fn members(&self) -> &[String] {
        match self {
            Schema::Record { members, .. } => members,
            Schema::List { members, .. } => members,
            Schema::Map { members } => members,
        }
    }
}

/// The shipped [`TypeResolver`]: a registry of record and collection
/// schemas keyed by type identity, operating on the dynamic [`Item`] model.
///
/// Built-in identities (primitives, `alloc::string`, `alloc::vec`,
/// `std::hash_map`, `std::btree_map`, `chrono::datetime`,
/// `rust_decimal::decimal`, `core::any`) resolve without registration.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<TypeKey, Schema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        SchemaRegistry::default()
    }

    /// Registers a derived record type.
    pub fn register<T: Reflect>(&mut self) {
        self.register_record(
            T::type_key(),
            T::is_value_kind(),
            T::members().iter().map(|m| m.to_string()).collect(),
        );
    }

    /// Registers a record type with an explicit member list. The member
    /// order given here is the wire order.
    pub fn register_record(&mut self, key: TypeKey, is_value_kind: bool, members: Vec<String>) {
        self.schemas.insert(
            key,
            Schema::Record {
                is_value_kind,
                members,
            },
        );
    }

    /// Registers a list type with its declared element tag and any
    /// serializable members the collection type itself carries.
    pub fn register_list(&mut self, key: TypeKey, elem_tag: TypeTag, members: Vec<String>) {
        self.schemas.insert(key, Schema::List { elem_tag, members });
    }

    /// Registers a map type, with any extra serializable members.
    pub fn register_map(&mut self, key: TypeKey, members: Vec<String>) {
        self.schemas.insert(key, Schema::Map { members });
    }
}

/// Description of a built-in identity, or `None` if the key is not one.
fn builtin_info(key: &TypeKey) -> Option<TypeInfo> {
    let is_value_kind = match (key.qualifier.as_str(), key.name.as_str()) {
        (
            "core",
            "i8" | "u8" | "i16" | "u16" | "i32" | "u32" | "i64" | "u64" | "f32" | "f64" | "bool"
            | "char",
        ) => true,
        ("chrono", "datetime") | ("rust_decimal", "decimal") => true,
        ("core", "any") | ("alloc", "string" | "vec") | ("std", "hash_map" | "btree_map") => false,
        _ => return None,
    };
    Some(TypeInfo {
        key: key.clone(),
        is_value_kind,
        members: Vec::new(),
    })
}

impl TypeResolver for SchemaRegistry {
    fn describe(&self, key: &TypeKey) -> Result<TypeInfo> {
        if let Some(schema) = self.schemas.get(key) {
            let is_value_kind = match schema {
                Schema::Record { is_value_kind, .. } => *is_value_kind,
                _ => false,
            };
            return Ok(TypeInfo {
                key: key.clone(),
                is_value_kind,
                members: schema.members().to_vec(),
            });
        }
        builtin_info(key).ok_or_else(|| EncoderError::TypeNotFound(key.clone()))
    }

    fn construct(&self, key: &TypeKey, shape: TypeShape) -> Result<Item> {
        let schema = self.schemas.get(key);
        match (shape, schema) {
            (TypeShape::Record, Some(Schema::Record { .. })) => {
                Ok(Item::Record(RecordItem::new(key.clone())))
            }
            (TypeShape::List, Some(Schema::List { elem_tag, .. })) => {
                Ok(Item::List(ListItem::new(key.clone(), *elem_tag)))
            }
            (TypeShape::List, None) if *key == TypeKey::vec() => {
                Ok(Item::List(ListItem::new(key.clone(), TypeTag::Record)))
            }
            (TypeShape::Map, Some(Schema::Map { .. })) => Ok(Item::Map(MapItem::new(key.clone()))),
            (TypeShape::Map, None) if *key == TypeKey::hash_map() || *key == TypeKey::btree_map() => {
                Ok(Item::Map(MapItem::new(key.clone())))
            }
            (_, Some(_)) => Err(EncoderError::Decode(format!(
                "type {} is not registered as a {:?}",
                key, shape
            ))),
            (_, None) => Err(EncoderError::TypeNotFound(key.clone())),
        }
    }

    fn get_member(&self, instance: &Item, name: &str) -> Result<Item> {
        let found = match instance {
            Item::Record(r) => r.fields.get(name),
            Item::List(l) => l.extra.get(name),
            Item::Map(m) => m.extra.get(name),
            other => {
                return Err(EncoderError::Encode(format!(
                    "{:?} values have no members",
                    other.tag()
                )))
            }
        };
        found.cloned().ok_or_else(|| {
            EncoderError::Encode(format!("member '{}' missing on instance", name))
        })
    }

    fn set_member(&self, instance: &mut Item, name: &str, value: Item) -> Result<()> {
        match instance {
            Item::Record(r) => {
                r.fields.insert(name.to_string(), value);
            }
            Item::List(l) => {
                l.extra.insert(name.to_string(), value);
            }
            Item::Map(m) => {
                m.extra.insert(name.to_string(), value);
            }
            other => {
                return Err(EncoderError::Decode(format!(
                    "{:?} values have no members",
                    other.tag()
                )))
            }
        }
        Ok(())
    }

    fn insert_element(&self, list: &mut Item, value: Item) -> Result<()> {
        match list {
            Item::List(l) => {
                l.items.push(value);
                Ok(())
            }
            other => Err(EncoderError::Decode(format!(
                "cannot append an element to a {:?} value",
                other.tag()
            ))),
        }
    }

    fn insert_entry(&self, map: &mut Item, key: Item, value: Item) -> Result<()> {
        match map {
            Item::Map(m) => {
                m.entries.push((key, value));
                Ok(())
            }
            other => Err(EncoderError::Decode(format!(
                "cannot insert an entry into a {:?} value",
                other.tag()
            ))),
        }
    }
}
