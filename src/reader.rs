//! Decoder: validates the header, loads the pool tables, then recursively
//! rebuilds the object graph through the resolver.

use crate::item::{ArrayItem, Item};
use crate::schema::{TypeDescriptor, TypeKey, TypeResolver, TypeShape, TypeTag};
use crate::varint::{read_vint, read_vsint};
use crate::writer::{
    POOL_DATES, POOL_DECIMALS, POOL_DOUBLES, POOL_FLOATS, POOL_STRINGS, POOL_TYPES,
};
use crate::{EncoderError, Result, FORMAT_VERSION, MAGIC};
use bytes::{Buf, Bytes};
use chrono::{DateTime, NaiveDateTime};
use rust_decimal::Decimal;

fn pool_entry<T: Clone>(pool: &[T], id: u64, what: &str) -> Result<T> {
    pool.get(id as usize)
        .cloned()
        .ok_or_else(|| EncoderError::Decode(format!("{} ref {} out of range", what, id)))
}

/// Single-use decoder. Advances the given buffer past the stream it reads;
/// pools are rebuilt fresh per call, so independent decodes share nothing.
pub struct Reader<'a, R: TypeResolver> {
    buf: &'a mut Bytes,
    resolver: &'a R,
    strings: Vec<String>,
    floats: Vec<f32>,
    doubles: Vec<f64>,
    decimals: Vec<Decimal>,
    dates: Vec<NaiveDateTime>,
    types: Vec<TypeDescriptor>,
}

impl<'a, R: TypeResolver> Reader<'a, R> {
    pub fn new(buf: &'a mut Bytes, resolver: &'a R) -> Self {
        Reader {
            buf,
            resolver,
            strings: Vec::new(),
            floats: Vec::new(),
            doubles: Vec::new(),
            decimals: Vec::new(),
            dates: Vec::new(),
            types: Vec::new(),
        }
    }

    /// Decodes one complete stream and returns its root value.
    pub fn decode(mut self) -> Result<Item> {
        self.need(MAGIC.len() + 2)?;
        let mut magic = [0u8; 4];
        self.buf.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(EncoderError::UnsupportedFormat);
        }
        let version = self.buf.get_u8();
        if version != FORMAT_VERSION {
            return Err(EncoderError::UnsupportedVersion(version));
        }
        // Reserved bits 0x40/0x80 are ignored.
        let flags = self.buf.get_u8();

        // Counts first, then contents, in the fixed pool order. The order is
        // part of the wire contract shared with the encoder.
        let n_strings = self.pool_count(flags, POOL_STRINGS)?;
        let n_floats = self.pool_count(flags, POOL_FLOATS)?;
        let n_doubles = self.pool_count(flags, POOL_DOUBLES)?;
        let n_decimals = self.pool_count(flags, POOL_DECIMALS)?;
        let n_dates = self.pool_count(flags, POOL_DATES)?;
        let n_types = self.pool_count(flags, POOL_TYPES)?;

        for _ in 0..n_strings {
            let s = self.read_string()?;
            self.strings.push(s);
        }
        for _ in 0..n_floats {
            self.need(4)?;
            self.floats.push(self.buf.get_f32_le());
        }
        for _ in 0..n_doubles {
            self.need(8)?;
            self.doubles.push(self.buf.get_f64_le());
        }
        for _ in 0..n_decimals {
            self.need(16)?;
            let mut raw = [0u8; 16];
            self.buf.copy_to_slice(&mut raw);
            self.decimals.push(Decimal::deserialize(raw));
        }
        for _ in 0..n_dates {
            let micros = read_vsint(self.buf)?;
            let date = DateTime::from_timestamp_micros(micros)
                .ok_or_else(|| {
                    EncoderError::Decode(format!("date value {} out of range", micros))
                })?
                .naive_utc();
            self.dates.push(date);
        }
        for _ in 0..n_types {
            let t = self.read_type_descriptor()?;
            self.types.push(t);
        }

        self.read_value()
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            Err(EncoderError::TruncatedInput)
        } else {
            Ok(())
        }
    }

    fn pool_count(&mut self, flags: u8, bit: u8) -> Result<usize> {
        if flags & bit != 0 {
            Ok(read_vint(self.buf)? as usize)
        } else {
            Ok(0)
        }
    }

    fn read_string(&mut self) -> Result<String> {
        let len = read_vint(self.buf)? as usize;
        self.need(len)?;
        let raw = self.buf.copy_to_bytes(len);
        String::from_utf8(raw.to_vec())
            .map_err(|e| EncoderError::Decode(format!("invalid UTF-8 in string pool: {}", e)))
    }

    fn read_type_descriptor(&mut self) -> Result<TypeDescriptor> {
        let name = read_vint(self.buf)? as u32;
        let qualifier = read_vint(self.buf)? as u32;
        self.need(1)?;
        let is_value_kind = self.buf.get_u8() != 0;
        let count = read_vint(self.buf)? as usize;
        let mut members = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            members.push(read_vint(self.buf)? as u32);
        }
        Ok(TypeDescriptor {
            name,
            qualifier,
            is_value_kind,
            members,
        })
    }

    /// Resolves a wire type reference to its identity and pooled member
    /// names.
    fn type_key(&self, ty: u64) -> Result<(TypeKey, Vec<String>)> {
        let descriptor = pool_entry(&self.types, ty, "type")?;
        let name = pool_entry(&self.strings, descriptor.name as u64, "string")?;
        let qualifier = pool_entry(&self.strings, descriptor.qualifier as u64, "string")?;
        let members = descriptor
            .members
            .iter()
            .map(|m| pool_entry(&self.strings, *m as u64, "string"))
            .collect::<Result<Vec<_>>>()?;
        Ok((TypeKey { name, qualifier }, members))
    }

    fn read_value(&mut self) -> Result<Item> {
        self.need(1)?;
        let tag = TypeTag::from_u8(self.buf.get_u8())?;
        self.read_payload(tag)
    }

    fn read_payload(&mut self, tag: TypeTag) -> Result<Item> {
        Ok(match tag {
            TypeTag::Null => Item::Null,
            TypeTag::I8 => {
                self.need(1)?;
                Item::I8(self.buf.get_i8())
            }
            TypeTag::U8 => {
                self.need(1)?;
                Item::U8(self.buf.get_u8())
            }
            TypeTag::I16 => Item::I16(read_vsint(self.buf)? as i16),
            TypeTag::U16 => Item::U16(read_vint(self.buf)? as u16),
            TypeTag::I32 => Item::I32(read_vsint(self.buf)? as i32),
            TypeTag::U32 => Item::U32(read_vint(self.buf)? as u32),
            TypeTag::I64 => Item::I64(read_vsint(self.buf)?),
            TypeTag::U64 => Item::U64(read_vint(self.buf)?),
            TypeTag::F32 => {
                let id = read_vint(self.buf)?;
                Item::F32(pool_entry(&self.floats, id, "float")?)
            }
            TypeTag::F64 => {
                let id = read_vint(self.buf)?;
                Item::F64(pool_entry(&self.doubles, id, "double")?)
            }
            TypeTag::Decimal => {
                let id = read_vint(self.buf)?;
                Item::Decimal(pool_entry(&self.decimals, id, "decimal")?)
            }
            TypeTag::Bool => {
                self.need(1)?;
                Item::Bool(self.buf.get_u8() != 0)
            }
            TypeTag::Char => {
                let v = read_vint(self.buf)?;
                let c = char::from_u32(v as u32).ok_or_else(|| {
                    EncoderError::Decode(format!("invalid char scalar value {}", v))
                })?;
                Item::Char(c)
            }
            TypeTag::Str => {
                let id = read_vint(self.buf)?;
                Item::Str(pool_entry(&self.strings, id, "string")?)
            }
            TypeTag::Date => {
                let id = read_vint(self.buf)?;
                Item::Date(pool_entry(&self.dates, id, "date")?)
            }
            TypeTag::Array => self.read_array()?,
            TypeTag::List => self.read_list()?,
            TypeTag::Map => self.read_map()?,
            TypeTag::Record => self.read_record()?,
            TypeTag::Dynamic => {
                return Err(EncoderError::UnsupportedType(
                    "dynamic values are not supported".into(),
                ))
            }
        })
    }

    fn read_array(&mut self) -> Result<Item> {
        self.need(1)?;
        let elem_tag = TypeTag::from_u8(self.buf.get_u8())?;
        let ty = read_vint(self.buf)?;
        let (elem, _) = self.type_key(ty)?;
        // Surfaces TypeNotFound before any element is consumed.
        self.resolver.describe(&elem)?;
        let len = read_vint(self.buf)? as usize;
        let mut array = ArrayItem::new(elem, elem_tag);
        if elem_tag.is_final() {
            for _ in 0..len {
                let v = self.read_payload(elem_tag)?;
                array.items.push(v);
            }
        } else {
            for _ in 0..len {
                let v = self.read_value()?;
                array.items.push(v);
            }
        }
        Ok(Item::Array(array))
    }

    fn read_list(&mut self) -> Result<Item> {
        let ty = read_vint(self.buf)?;
        let (key, members) = self.type_key(ty)?;
        let mut instance = self.resolver.construct(&key, TypeShape::List)?;
        for name in &members {
            let value = self.read_value()?;
            self.resolver.set_member(&mut instance, name, value)?;
        }
        self.need(1)?;
        let elem_tag = TypeTag::from_u8(self.buf.get_u8())?;
        if let Item::List(list) = &mut instance {
            // The stream's declared element tag wins over the schema's.
            list.elem_tag = elem_tag;
        }
        let len = read_vint(self.buf)? as usize;
        if elem_tag.is_final() {
            for _ in 0..len {
                let v = self.read_payload(elem_tag)?;
                self.resolver.insert_element(&mut instance, v)?;
            }
        } else {
            for _ in 0..len {
                let v = self.read_value()?;
                self.resolver.insert_element(&mut instance, v)?;
            }
        }
        Ok(instance)
    }

    fn read_map(&mut self) -> Result<Item> {
        let ty = read_vint(self.buf)?;
        let (key, members) = self.type_key(ty)?;
        let mut instance = self.resolver.construct(&key, TypeShape::Map)?;
        for name in &members {
            let value = self.read_value()?;
            self.resolver.set_member(&mut instance, name, value)?;
        }
        let count = read_vint(self.buf)? as usize;
        let mut keys = Vec::new();
        for _ in 0..count {
            keys.push(self.read_value()?);
        }
        for k in keys {
            let v = self.read_value()?;
            self.resolver.insert_entry(&mut instance, k, v)?;
        }
        Ok(instance)
    }

    fn read_record(&mut self) -> Result<Item> {
        let ty = read_vint(self.buf)?;
        let (key, members) = self.type_key(ty)?;
        let mut instance = self.resolver.construct(&key, TypeShape::Record)?;
        for name in &members {
            let value = self.read_value()?;
            self.resolver.set_member(&mut instance, name, value)?;
        }
        Ok(instance)
    }
}
