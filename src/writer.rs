//! Encoder: converts an [`Item`] graph into the pooled CBF wire format.
//!
//! Encoding is two-phase. A conversion pass walks the graph depth-first,
//! classifies each value's tag by shape, interns every scalar and type it
//! meets into the pools, and builds an internal value tree. A serialization
//! pass then writes the header, the pool tables, and the tree. The split
//! exists because the pool tables precede the root value on the wire, so
//! every pool must be complete before the first tree byte is written.

use crate::item::{ArrayItem, Item, ListItem, MapItem, RecordItem};
use crate::pool::Pool;
use crate::schema::{TypeDescriptor, TypeKey, TypeResolver, TypeTag};
use crate::varint::{write_vint, write_vsint};
use crate::{EncoderError, Result, FORMAT_VERSION, MAGIC};
use bytes::{BufMut, Bytes, BytesMut};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;

/// Pool-presence bits in the stream header, low to high. A pool's count and
/// contents appear in the stream only when its bit is set; 0x40 and 0x80
/// are reserved and never written.
pub const POOL_STRINGS: u8 = 0x01;
pub const POOL_FLOATS: u8 = 0x02;
pub const POOL_DOUBLES: u8 = 0x04;
pub const POOL_DECIMALS: u8 = 0x08;
pub const POOL_DATES: u8 = 0x10;
pub const POOL_TYPES: u8 = 0x20;

/// Encoder-internal value tree. Pooled scalars hold their pool id instead
/// of the value; containers hold their wire payload shape.
#[derive(Debug)]
enum Node {
    Null,
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(u32),
    F64(u32),
    Decimal(u32),
    Bool(bool),
    Char(char),
    Str(u32),
    Date(u32),
    Array(ArrayNode),
    List(ListNode),
    Map(MapNode),
    Record(RecordNode),
}

#[derive(Debug)]
struct ArrayNode {
    elem_tag: TypeTag,
    elem_type: u32,
    items: Vec<Node>,
}

#[derive(Debug)]
struct ListNode {
    ty: u32,
    extra: Vec<Node>,
    elem_tag: TypeTag,
    items: Vec<Node>,
}

#[derive(Debug)]
struct MapNode {
    ty: u32,
    extra: Vec<Node>,
    keys: Vec<Node>,
    values: Vec<Node>,
}

#[derive(Debug)]
struct RecordNode {
    ty: u32,
    values: Vec<Node>,
}

impl Node {
    fn tag(&self) -> TypeTag {
        match self {
            Node::Null => TypeTag::Null,
            Node::I8(_) => TypeTag::I8,
            Node::U8(_) => TypeTag::U8,
            Node::I16(_) => TypeTag::I16,
            Node::U16(_) => TypeTag::U16,
            Node::I32(_) => TypeTag::I32,
            Node::U32(_) => TypeTag::U32,
            Node::I64(_) => TypeTag::I64,
            Node::U64(_) => TypeTag::U64,
            Node::F32(_) => TypeTag::F32,
            Node::F64(_) => TypeTag::F64,
            Node::Decimal(_) => TypeTag::Decimal,
            Node::Bool(_) => TypeTag::Bool,
            Node::Char(_) => TypeTag::Char,
            Node::Str(_) => TypeTag::Str,
            Node::Date(_) => TypeTag::Date,
            Node::Array(_) => TypeTag::Array,
            Node::List(_) => TypeTag::List,
            Node::Map(_) => TypeTag::Map,
            Node::Record(_) => TypeTag::Record,
        }
    }
}

/// Single-use encoder. Owns its pools for the duration of one encode call;
/// independent calls share nothing and may run in parallel as long as the
/// resolver is reentrant.
pub struct Writer<'a, R: TypeResolver> {
    resolver: &'a R,
    strings: Pool<String>,
    // IEEE 754 bit patterns; dedup is bit-exact, so NaN pools but -0.0 != 0.0.
    floats: Pool<u32>,
    doubles: Pool<u64>,
    decimals: Pool<Decimal>,
    dates: Pool<NaiveDateTime>,
    types: Pool<TypeDescriptor>,
}

impl<'a, R: TypeResolver> Writer<'a, R> {
    pub fn new(resolver: &'a R) -> Self {
        Writer {
            resolver,
            strings: Pool::new(),
            floats: Pool::new(),
            doubles: Pool::new(),
            decimals: Pool::new(),
            dates: Pool::new(),
            types: Pool::new(),
        }
    }

    /// Encodes `root` into a complete CBF stream.
    pub fn encode(mut self, root: &Item) -> Result<Bytes> {
        let tree = self.convert(root)?;

        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u8(FORMAT_VERSION);
        let flags = self.pool_flags();
        buf.put_u8(flags);

        if flags & POOL_STRINGS != 0 {
            write_vint(&mut buf, self.strings.len() as u64);
        }
        if flags & POOL_FLOATS != 0 {
            write_vint(&mut buf, self.floats.len() as u64);
        }
        if flags & POOL_DOUBLES != 0 {
            write_vint(&mut buf, self.doubles.len() as u64);
        }
        if flags & POOL_DECIMALS != 0 {
            write_vint(&mut buf, self.decimals.len() as u64);
        }
        if flags & POOL_DATES != 0 {
            write_vint(&mut buf, self.dates.len() as u64);
        }
        if flags & POOL_TYPES != 0 {
            write_vint(&mut buf, self.types.len() as u64);
        }

        if flags & POOL_STRINGS != 0 {
            for s in self.strings.iter() {
                write_vint(&mut buf, s.len() as u64);
                buf.put_slice(s.as_bytes());
            }
        }
        if flags & POOL_FLOATS != 0 {
            for bits in self.floats.iter() {
                buf.put_u32_le(*bits);
            }
        }
        if flags & POOL_DOUBLES != 0 {
            for bits in self.doubles.iter() {
                buf.put_u64_le(*bits);
            }
        }
        if flags & POOL_DECIMALS != 0 {
            for d in self.decimals.iter() {
                buf.put_slice(&d.serialize());
            }
        }
        if flags & POOL_DATES != 0 {
            for d in self.dates.iter() {
                write_vsint(&mut buf, d.and_utc().timestamp_micros());
            }
        }
        if flags & POOL_TYPES != 0 {
            for t in self.types.iter() {
                write_vint(&mut buf, t.name as u64);
                write_vint(&mut buf, t.qualifier as u64);
                buf.put_u8(t.is_value_kind as u8);
                write_vint(&mut buf, t.members.len() as u64);
                for m in &t.members {
                    write_vint(&mut buf, *m as u64);
                }
            }
        }

        self.write_node(&mut buf, &tree, true)?;
        Ok(buf.freeze())
    }

    fn pool_flags(&self) -> u8 {
        let mut flags = 0;
        if !self.strings.is_empty() {
            flags |= POOL_STRINGS;
        }
        if !self.floats.is_empty() {
            flags |= POOL_FLOATS;
        }
        if !self.doubles.is_empty() {
            flags |= POOL_DOUBLES;
        }
        if !self.decimals.is_empty() {
            flags |= POOL_DECIMALS;
        }
        if !self.dates.is_empty() {
            flags |= POOL_DATES;
        }
        if !self.types.is_empty() {
            flags |= POOL_TYPES;
        }
        flags
    }

    /// Depth-first, pre-order conversion in the same order the decoder will
    /// later reconstruct values.
    fn convert(&mut self, item: &Item) -> Result<Node> {
        Ok(match item {
            Item::Null => Node::Null,
            Item::I8(v) => Node::I8(*v),
            Item::U8(v) => Node::U8(*v),
            Item::I16(v) => Node::I16(*v),
            Item::U16(v) => Node::U16(*v),
            Item::I32(v) => Node::I32(*v),
            Item::U32(v) => Node::U32(*v),
            Item::I64(v) => Node::I64(*v),
            Item::U64(v) => Node::U64(*v),
            Item::F32(v) => Node::F32(self.floats.get_or_insert(v.to_bits())),
            Item::F64(v) => Node::F64(self.doubles.get_or_insert(v.to_bits())),
            Item::Decimal(v) => Node::Decimal(self.decimals.get_or_insert(*v)),
            Item::Bool(v) => Node::Bool(*v),
            Item::Char(v) => Node::Char(*v),
            Item::Str(v) => Node::Str(self.strings.get_or_insert(v.clone())),
            Item::Date(v) => Node::Date(self.dates.get_or_insert(*v)),
            Item::Array(a) => Node::Array(self.convert_array(a)?),
            Item::List(l) => Node::List(self.convert_list(item, l)?),
            Item::Map(m) => Node::Map(self.convert_map(item, m)?),
            Item::Record(r) => Node::Record(self.convert_record(item, r)?),
        })
    }

    /// Interns a type identity, asking the resolver for its member list only
    /// on first registration. The pooled member list wins for the rest of
    /// the pass; the names returned here come from the pool.
    fn intern_type(&mut self, key: &TypeKey) -> Result<(u32, Vec<String>)> {
        let name = self.strings.get_or_insert(key.name.clone());
        let qualifier = self.strings.get_or_insert(key.qualifier.clone());
        if let Some(id) = self.types.lookup(&TypeDescriptor::probe(name, qualifier)) {
            return Ok((id, self.member_names(id)?));
        }
        let info = self.resolver.describe(key)?;
        let members = info
            .members
            .iter()
            .map(|m| self.strings.get_or_insert(m.clone()))
            .collect();
        let id = self.types.get_or_insert(TypeDescriptor {
            name,
            qualifier,
            is_value_kind: info.is_value_kind,
            members,
        });
        Ok((id, info.members))
    }

    fn member_names(&self, ty: u32) -> Result<Vec<String>> {
        let descriptor = self
            .types
            .get(ty)
            .ok_or_else(|| EncoderError::Encode(format!("unknown type ref {}", ty)))?;
        descriptor
            .members
            .iter()
            .map(|m| {
                self.strings
                    .get(*m)
                    .cloned()
                    .ok_or_else(|| EncoderError::Encode(format!("unknown string ref {}", m)))
            })
            .collect()
    }

    fn convert_array(&mut self, array: &ArrayItem) -> Result<ArrayNode> {
        let (elem_type, _) = self.intern_type(&array.elem)?;
        let mut items = Vec::with_capacity(array.items.len());
        for item in &array.items {
            items.push(self.convert(item)?);
        }
        Ok(ArrayNode {
            elem_tag: array.elem_tag,
            elem_type,
            items,
        })
    }

    fn convert_list(&mut self, instance: &Item, list: &ListItem) -> Result<ListNode> {
        let (ty, members) = self.intern_type(&list.key)?;
        let mut extra = Vec::with_capacity(members.len());
        for name in &members {
            let value = self.resolver.get_member(instance, name)?;
            extra.push(self.convert(&value)?);
        }
        let mut items = Vec::with_capacity(list.items.len());
        for item in &list.items {
            items.push(self.convert(item)?);
        }
        Ok(ListNode {
            ty,
            extra,
            elem_tag: list.elem_tag,
            items,
        })
    }

    fn convert_map(&mut self, instance: &Item, map: &MapItem) -> Result<MapNode> {
        let (ty, members) = self.intern_type(&map.key)?;
        let mut extra = Vec::with_capacity(members.len());
        for name in &members {
            let value = self.resolver.get_member(instance, name)?;
            extra.push(self.convert(&value)?);
        }
        let mut keys = Vec::with_capacity(map.entries.len());
        let mut values = Vec::with_capacity(map.entries.len());
        for (k, v) in &map.entries {
            keys.push(self.convert(k)?);
            values.push(self.convert(v)?);
        }
        Ok(MapNode {
            ty,
            extra,
            keys,
            values,
        })
    }

    fn convert_record(&mut self, instance: &Item, record: &RecordItem) -> Result<RecordNode> {
        let (ty, members) = self.intern_type(&record.key)?;
        let mut values = Vec::with_capacity(members.len());
        for name in &members {
            let value = self.resolver.get_member(instance, name)?;
            values.push(self.convert(&value)?);
        }
        Ok(RecordNode { ty, values })
    }

    fn write_node(&self, buf: &mut BytesMut, node: &Node, tagged: bool) -> Result<()> {
        if tagged {
            buf.put_u8(node.tag() as u8);
        }
        match node {
            Node::Null => {}
            Node::I8(v) => buf.put_i8(*v),
            Node::U8(v) => buf.put_u8(*v),
            Node::I16(v) => write_vsint(buf, *v as i64),
            Node::U16(v) => write_vint(buf, *v as u64),
            Node::I32(v) => write_vsint(buf, *v as i64),
            Node::U32(v) => write_vint(buf, *v as u64),
            Node::I64(v) => write_vsint(buf, *v),
            Node::U64(v) => write_vint(buf, *v),
            Node::Bool(v) => buf.put_u8(*v as u8),
            Node::Char(v) => write_vint(buf, *v as u64),
            Node::F32(id) | Node::F64(id) | Node::Decimal(id) | Node::Str(id) | Node::Date(id) => {
                write_vint(buf, *id as u64)
            }
            Node::Array(a) => {
                buf.put_u8(a.elem_tag as u8);
                write_vint(buf, a.elem_type as u64);
                write_vint(buf, a.items.len() as u64);
                self.write_elements(buf, &a.items, a.elem_tag)?;
            }
            Node::List(l) => {
                write_vint(buf, l.ty as u64);
                for m in &l.extra {
                    self.write_node(buf, m, true)?;
                }
                buf.put_u8(l.elem_tag as u8);
                write_vint(buf, l.items.len() as u64);
                self.write_elements(buf, &l.items, l.elem_tag)?;
            }
            Node::Map(m) => {
                write_vint(buf, m.ty as u64);
                for v in &m.extra {
                    self.write_node(buf, v, true)?;
                }
                write_vint(buf, m.keys.len() as u64);
                // All keys first, then all values; the decoder pairs by index.
                for k in &m.keys {
                    self.write_node(buf, k, true)?;
                }
                for v in &m.values {
                    self.write_node(buf, v, true)?;
                }
            }
            Node::Record(r) => {
                write_vint(buf, r.ty as u64);
                for v in &r.values {
                    self.write_node(buf, v, true)?;
                }
            }
        }
        Ok(())
    }

    /// Applies the final-type shortcut: a final declared element tag means
    /// bare payloads, anything else means tag+payload per element.
    fn write_elements(&self, buf: &mut BytesMut, items: &[Node], elem_tag: TypeTag) -> Result<()> {
        let tagged = !elem_tag.is_final();
        for item in items {
            if !tagged && item.tag() != elem_tag {
                return Err(EncoderError::UnsupportedType(format!(
                    "sequence declared as {:?} holds a {:?} element",
                    elem_tag,
                    item.tag()
                )));
            }
            self.write_node(buf, item, tagged)?;
        }
        Ok(())
    }
}
