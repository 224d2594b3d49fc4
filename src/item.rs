//! The dynamic object-graph model walked by the encoder and produced by the
//! decoder, plus conversions between native Rust values and the model.

use crate::schema::{TypeKey, TypeTag};
use crate::{EncoderError, Result};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// A tagged value covering every shape the format can encode.
///
/// Scalars hold their value inline; containers hold a payload struct that
/// carries the concrete type identity the decoder needs to rebuild them.
/// Ownership is strictly tree-shaped — the format has no back-references
/// within the value tree, only pool ids behind the scenes.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Null,
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Bool(bool),
    Char(char),
    Str(String),
    Date(NaiveDateTime),
    Array(ArrayItem),
    List(ListItem),
    Map(MapItem),
    Record(RecordItem),
}

impl Item {
    /// Classifies the value's wire tag by shape.
    pub fn tag(&self) -> TypeTag {
        match self {
            Item::Null => TypeTag::Null,
            Item::I8(_) => TypeTag::I8,
            Item::U8(_) => TypeTag::U8,
            Item::I16(_) => TypeTag::I16,
            Item::U16(_) => TypeTag::U16,
            Item::I32(_) => TypeTag::I32,
            Item::U32(_) => TypeTag::U32,
            Item::I64(_) => TypeTag::I64,
            Item::U64(_) => TypeTag::U64,
            Item::F32(_) => TypeTag::F32,
            Item::F64(_) => TypeTag::F64,
            Item::Decimal(_) => TypeTag::Decimal,
            Item::Bool(_) => TypeTag::Bool,
            Item::Char(_) => TypeTag::Char,
            Item::Str(_) => TypeTag::Str,
            Item::Date(_) => TypeTag::Date,
            Item::Array(_) => TypeTag::Array,
            Item::List(_) => TypeTag::List,
            Item::Map(_) => TypeTag::Map,
            Item::Record(_) => TypeTag::Record,
        }
    }
}

/// Fixed-length homogeneous sequence with a declared element type.
///
/// The element identity is registered in the type pool even for primitive
/// tags so a decoder can allocate a strongly-typed buffer where its host
/// language requires one.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayItem {
    pub elem: TypeKey,
    pub elem_tag: TypeTag,
    pub items: Vec<Item>,
}

impl ArrayItem {
    pub fn new(elem: TypeKey, elem_tag: TypeTag) -> Self {
        ArrayItem {
            elem,
            elem_tag,
            items: Vec::new(),
        }
    }
}

/// Ordered collection instance. `extra` holds serializable members declared
/// on the concrete collection type itself, beyond the element storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub key: TypeKey,
    pub elem_tag: TypeTag,
    pub extra: IndexMap<String, Item>,
    pub items: Vec<Item>,
}

impl ListItem {
    pub fn new(key: TypeKey, elem_tag: TypeTag) -> Self {
        ListItem {
            key,
            elem_tag,
            extra: IndexMap::new(),
            items: Vec::new(),
        }
    }
}

/// Key/value collection instance. Entry order is preserved through a
/// round trip: keys are written first, values after, paired by index.
#[derive(Debug, Clone, PartialEq)]
pub struct MapItem {
    pub key: TypeKey,
    pub extra: IndexMap<String, Item>,
    pub entries: Vec<(Item, Item)>,
}

impl MapItem {
    pub fn new(key: TypeKey) -> Self {
        MapItem {
            key,
            extra: IndexMap::new(),
            entries: Vec::new(),
        }
    }
}

/// User-defined record instance: a type identity plus named member values.
/// On the wire the values are aligned positionally with the type's pooled
/// member list.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordItem {
    pub key: TypeKey,
    pub fields: IndexMap<String, Item>,
}

impl RecordItem {
    pub fn new(key: TypeKey) -> Self {
        RecordItem {
            key,
            fields: IndexMap::new(),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: Item) {
        self.fields.insert(name.into(), value);
    }
}

/// Converts a native Rust value into the dynamic [`Item`] model.
///
/// Implementations also report the tag and type identity the value
/// contributes when used as a declared container element, which is what
/// lets homogeneous containers apply the final-type shortcut.
pub trait ToItem {
    fn to_item(&self) -> Result<Item>;

    /// Declared element tag when `Self` is a container's element type.
    fn element_tag() -> TypeTag
    where
        Self: Sized;

    /// Type identity registered for array element types.
    fn element_key() -> TypeKey
    where
        Self: Sized;
}

/// Reconstructs a native Rust value from the dynamic [`Item`] model.
pub trait FromItem: Sized {
    fn from_item(item: Item) -> Result<Self>;
}

macro_rules! scalar_item {
    ($ty:ty, $variant:ident, $tag:ident, $name:literal) => {
        impl ToItem for $ty {
            fn to_item(&self) -> Result<Item> {
                Ok(Item::$variant(*self))
            }

            fn element_tag() -> TypeTag {
                TypeTag::$tag
            }

            fn element_key() -> TypeKey {
                TypeKey::primitive($name)
            }
        }

        impl FromItem for $ty {
            fn from_item(item: Item) -> Result<Self> {
                match item {
                    Item::$variant(v) => Ok(v),
                    other => Err(EncoderError::Decode(format!(
                        concat!("expected ", $name, ", got a {:?} value"),
                        other.tag()
                    ))),
                }
            }
        }
    };
}

scalar_item!(i8, I8, I8, "i8");
scalar_item!(u8, U8, U8, "u8");
scalar_item!(i16, I16, I16, "i16");
scalar_item!(u16, U16, U16, "u16");
scalar_item!(i32, I32, I32, "i32");
scalar_item!(u32, U32, U32, "u32");
scalar_item!(i64, I64, I64, "i64");
scalar_item!(u64, U64, U64, "u64");
scalar_item!(f32, F32, F32, "f32");
scalar_item!(f64, F64, F64, "f64");
scalar_item!(bool, Bool, Bool, "bool");
scalar_item!(char, Char, Char, "char");

impl ToItem for String {
    fn to_item(&self) -> Result<Item> {
        Ok(Item::Str(self.clone()))
    }

    fn element_tag() -> TypeTag {
        TypeTag::Str
    }

    fn element_key() -> TypeKey {
        TypeKey::string()
    }
}

impl FromItem for String {
    fn from_item(item: Item) -> Result<Self> {
        match item {
            Item::Str(v) => Ok(v),
            other => Err(EncoderError::Decode(format!(
                "expected a string, got a {:?} value",
                other.tag()
            ))),
        }
    }
}

impl ToItem for &str {
    fn to_item(&self) -> Result<Item> {
        Ok(Item::Str(self.to_string()))
    }

    fn element_tag() -> TypeTag {
        TypeTag::Str
    }

    fn element_key() -> TypeKey {
        TypeKey::string()
    }
}

impl ToItem for Decimal {
    fn to_item(&self) -> Result<Item> {
        Ok(Item::Decimal(*self))
    }

    fn element_tag() -> TypeTag {
        TypeTag::Decimal
    }

    fn element_key() -> TypeKey {
        TypeKey::decimal()
    }
}

impl FromItem for Decimal {
    fn from_item(item: Item) -> Result<Self> {
        match item {
            Item::Decimal(v) => Ok(v),
            other => Err(EncoderError::Decode(format!(
                "expected a decimal, got a {:?} value",
                other.tag()
            ))),
        }
    }
}

impl ToItem for NaiveDateTime {
    fn to_item(&self) -> Result<Item> {
        Ok(Item::Date(*self))
    }

    fn element_tag() -> TypeTag {
        TypeTag::Date
    }

    fn element_key() -> TypeKey {
        TypeKey::datetime()
    }
}

impl FromItem for NaiveDateTime {
    fn from_item(item: Item) -> Result<Self> {
        match item {
            Item::Date(v) => Ok(v),
            other => Err(EncoderError::Decode(format!(
                "expected a date, got a {:?} value",
                other.tag()
            ))),
        }
    }
}

/// Identity conversion; lets `Vec<Item>` express heterogeneous collections.
impl ToItem for Item {
    fn to_item(&self) -> Result<Item> {
        Ok(self.clone())
    }

    fn element_tag() -> TypeTag {
        // Undeclared slots must self-describe.
        TypeTag::Record
    }

    fn element_key() -> TypeKey {
        TypeKey::any()
    }
}

impl FromItem for Item {
    fn from_item(item: Item) -> Result<Self> {
        Ok(item)
    }
}

/// `None` maps to the Null tag; `Some` encodes the inner value directly.
impl<T: ToItem> ToItem for Option<T> {
    fn to_item(&self) -> Result<Item> {
        match self {
            Some(v) => v.to_item(),
            None => Ok(Item::Null),
        }
    }

    fn element_tag() -> TypeTag {
        // Nullable slots must self-describe.
        TypeTag::Record
    }

    fn element_key() -> TypeKey {
        TypeKey::any()
    }
}

impl<T: FromItem> FromItem for Option<T> {
    fn from_item(item: Item) -> Result<Self> {
        match item {
            Item::Null => Ok(None),
            other => Ok(Some(T::from_item(other)?)),
        }
    }
}

impl<T: ToItem> ToItem for Vec<T> {
    fn to_item(&self) -> Result<Item> {
        let mut list = ListItem::new(TypeKey::vec(), T::element_tag());
        for v in self {
            list.items.push(v.to_item()?);
        }
        Ok(Item::List(list))
    }

    fn element_tag() -> TypeTag {
        TypeTag::List
    }

    fn element_key() -> TypeKey {
        TypeKey::vec()
    }
}

impl<T: FromItem> FromItem for Vec<T> {
    fn from_item(item: Item) -> Result<Self> {
        let items = match item {
            Item::List(l) => l.items,
            Item::Array(a) => a.items,
            other => {
                return Err(EncoderError::Decode(format!(
                    "expected a sequence, got a {:?} value",
                    other.tag()
                )))
            }
        };
        items.into_iter().map(T::from_item).collect()
    }
}

impl<T: ToItem, const N: usize> ToItem for [T; N] {
    fn to_item(&self) -> Result<Item> {
        let mut array = ArrayItem::new(T::element_key(), T::element_tag());
        for v in self {
            array.items.push(v.to_item()?);
        }
        Ok(Item::Array(array))
    }

    fn element_tag() -> TypeTag {
        TypeTag::Array
    }

    fn element_key() -> TypeKey {
        TypeKey::any()
    }
}

impl<T: FromItem, const N: usize> FromItem for [T; N] {
    fn from_item(item: Item) -> Result<Self> {
        let items = match item {
            Item::Array(a) => a.items,
            Item::List(l) => l.items,
            other => {
                return Err(EncoderError::Decode(format!(
                    "expected a sequence, got a {:?} value",
                    other.tag()
                )))
            }
        };
        if items.len() != N {
            return Err(EncoderError::Decode(format!(
                "expected {} elements, got {}",
                N,
                items.len()
            )));
        }
        let values = items
            .into_iter()
            .map(T::from_item)
            .collect::<Result<Vec<T>>>()?;
        values
            .try_into()
            .map_err(|_| EncoderError::Decode("sequence length changed during conversion".into()))
    }
}

impl<K: ToItem, V: ToItem> ToItem for HashMap<K, V> {
    fn to_item(&self) -> Result<Item> {
        let mut map = MapItem::new(TypeKey::hash_map());
        for (k, v) in self {
            map.entries.push((k.to_item()?, v.to_item()?));
        }
        Ok(Item::Map(map))
    }

    fn element_tag() -> TypeTag {
        TypeTag::Map
    }

    fn element_key() -> TypeKey {
        TypeKey::hash_map()
    }
}

impl<K: FromItem + Eq + Hash, V: FromItem> FromItem for HashMap<K, V> {
    fn from_item(item: Item) -> Result<Self> {
        match item {
            Item::Map(m) => m
                .entries
                .into_iter()
                .map(|(k, v)| Ok((K::from_item(k)?, V::from_item(v)?)))
                .collect(),
            other => Err(EncoderError::Decode(format!(
                "expected a map, got a {:?} value",
                other.tag()
            ))),
        }
    }
}

impl<K: ToItem, V: ToItem> ToItem for BTreeMap<K, V> {
    fn to_item(&self) -> Result<Item> {
        let mut map = MapItem::new(TypeKey::btree_map());
        for (k, v) in self {
            map.entries.push((k.to_item()?, v.to_item()?));
        }
        Ok(Item::Map(map))
    }

    fn element_tag() -> TypeTag {
        TypeTag::Map
    }

    fn element_key() -> TypeKey {
        TypeKey::btree_map()
    }
}

impl<K: FromItem + Ord, V: FromItem> FromItem for BTreeMap<K, V> {
    fn from_item(item: Item) -> Result<Self> {
        match item {
            Item::Map(m) => m
                .entries
                .into_iter()
                .map(|(k, v)| Ok((K::from_item(k)?, V::from_item(v)?)))
                .collect(),
            other => Err(EncoderError::Decode(format!(
                "expected a map, got a {:?} value",
                other.tag()
            ))),
        }
    }
}
