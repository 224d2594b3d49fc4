//! # cbf-encoder
//!
//! A compact binary object-serialization format (CBF) for Rust.
//!
//! CBF converts an in-memory object graph — primitives, arrays, ordered
//! collections, key/value collections, and user-defined record types — into a
//! dense byte stream and back. Repeated scalar values (strings, floats,
//! doubles, decimals, dates) and type metadata are deduplicated through
//! insertion-ordered pools, so a graph containing the same string a thousand
//! times stores it once and references it by id.
//!
//! - Variable-length integer codecs ([`varint`]) keep small numbers small
//! - Pools ([`pool`]) assign stable ids to repeated scalars and type descriptors
//! - A tagged value model ([`item::Item`]) describes any encodable graph
//! - Record and collection types are materialized through an injected
//!   [`TypeResolver`] capability; [`SchemaRegistry`] is the shipped
//!   implementation
//! - `#[derive(Reflect)]` generates the type metadata and `Item` conversions
//!   for named-field structs
//!
//! ## Attribute Macros
//!
//! Field and struct behavior can be controlled with `#[cbf(...)]`:
//!
//! - `#[cbf(skip)]` — The field is excluded from the serializable member list
//!   and the wire; on decode it is set to `Default::default()`.
//! - `#[cbf(rename = "Name")]` — Use the given string as the wire member name
//!   while keeping the Rust field name.
//! - `#[cbf(value_kind)]` — Struct-level; marks the type descriptor as a
//!   value kind in the stream.
//! - `#[cbf(qualifier = "ns")]` — Struct-level; overrides the namespace
//!   qualifier (defaults to `module_path!()`).
//!
//! ## Limitations
//!
//! The format is tree-shaped: reference cycles and shared sub-objects are not
//! representable (pool ids are the only sharing mechanism). Decoding is
//! eager and performs no cycle detection; a hand-crafted self-referential
//! stream, which this encoder can never produce, would not terminate.

pub mod item;
pub mod pool;
pub mod reader;
pub mod schema;
pub mod varint;
pub mod writer;

use bytes::Bytes;
pub use cbf_encoder_derive::Reflect;
pub use item::{ArrayItem, FromItem, Item, ListItem, MapItem, RecordItem, ToItem};
pub use reader::Reader;
pub use schema::{
    Reflect, SchemaRegistry, TypeDescriptor, TypeInfo, TypeKey, TypeResolver, TypeShape, TypeTag,
};
pub use writer::Writer;

use std::path::Path;

/// The four magic bytes every CBF stream starts with.
pub const MAGIC: [u8; 4] = *b"CBF1";

/// The single supported format version. There is no forward or backward
/// compatibility across versions; the version byte gates decoding.
pub const FORMAT_VERSION: u8 = 1;

/// Errors that can occur during encoding or decoding operations.
///
/// All failures are fatal to the current call: nothing is retried and there
/// is no partial-result mode. Callers must discard partial output on error.
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    /// The stream does not start with the CBF magic number.
    #[error("unrecognized magic number")]
    UnsupportedFormat,
    /// The stream was written by an incompatible format version.
    #[error("format version {} is not supported (supported: {})", .0, FORMAT_VERSION)]
    UnsupportedVersion(u8),
    /// A tag byte or runtime shape the codec does not recognize.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),
    /// The resolver cannot materialize a type referenced in the stream.
    #[error("type not found: {0}")]
    TypeNotFound(TypeKey),
    /// The stream ended in the middle of a structure.
    #[error("insufficient data in buffer")]
    TruncatedInput,
    /// The value could not be encoded (resolver or conversion failure).
    #[error("encode error: {0}")]
    Encode(String),
    /// The value could not be decoded (malformed pool reference or payload).
    #[error("decode error: {0}")]
    Decode(String),
    /// Underlying I/O failure from the file convenience calls.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The result type used throughout this crate for encode/decode operations.
pub type Result<T> = std::result::Result<T, EncoderError>;

/// Encodes an [`Item`] graph into a CBF byte stream.
///
/// The resolver supplies member enumeration for record and collection types
/// encountered during the walk.
///
/// # Example
/// ```rust
/// use cbf_encoder::{encode, decode, Item, SchemaRegistry};
///
/// let registry = SchemaRegistry::new();
/// let buf = encode(&Item::I32(42), &registry).unwrap();
/// let mut reader = buf;
/// assert_eq!(decode(&mut reader, &registry).unwrap(), Item::I32(42));
/// ```
pub fn encode(root: &Item, resolver: &impl TypeResolver) -> Result<Bytes> {
    Writer::new(resolver).encode(root)
}

/// Decodes a CBF byte stream back into an [`Item`] graph.
///
/// The resolver materializes record and collection instances referenced by
/// the stream; unknown type identities fail with
/// [`EncoderError::TypeNotFound`].
pub fn decode(reader: &mut Bytes, resolver: &impl TypeResolver) -> Result<Item> {
    Reader::new(reader, resolver).decode()
}

/// Encodes any [`ToItem`] value. Convenience over [`encode`].
pub fn encode_value<T: ToItem>(value: &T, resolver: &impl TypeResolver) -> Result<Bytes> {
    encode(&value.to_item()?, resolver)
}

/// Decodes a stream and coerces the root to a [`FromItem`] type.
/// Convenience over [`decode`].
pub fn decode_value<T: FromItem>(reader: &mut Bytes, resolver: &impl TypeResolver) -> Result<T> {
    T::from_item(decode(reader, resolver)?)
}

/// Encodes `root` and writes the stream to a file. The file handle is owned
/// by this call and closed on every exit path.
pub fn write_file(path: impl AsRef<Path>, root: &Item, resolver: &impl TypeResolver) -> Result<()> {
    let buf = encode(root, resolver)?;
    std::fs::write(path, &buf)?;
    Ok(())
}

/// Reads a CBF file and decodes its root value.
pub fn read_file(path: impl AsRef<Path>, resolver: &impl TypeResolver) -> Result<Item> {
    let mut reader = Bytes::from(std::fs::read(path)?);
    decode(&mut reader, resolver)
}
