//! Canonical encoding for reproducible fingerprints.
//!
//! Any `Serialize` value is lowered into a restricted tree (null, bool,
//! finite number, string, array, string-keyed object) and written as compact
//! JSON with object keys sorted. Anything outside that universe is a hard
//! [`EncodeError`], never a silent coercion:
//!
//! - non-finite floats
//! - a bare `None` (an absent value has no canonical form; optional struct
//!   fields must use `skip_serializing_if`)
//! - byte buffers and 128-bit integers
//! - map keys that are not strings
//!
//! Arrays keep their order. Integral floats below 2^53 print as integers so
//! `2.0` and `2` fingerprint identically.

use crate::hash::Hash;
use serde::Serialize;
use serde::ser;
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Largest float magnitude that is still printed as an integer.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Errors raised while canonically encoding a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// NaN or an infinity
    #[error("non-finite number has no canonical encoding")]
    NonFinite,
    /// An absent value (`None` outside of a skipped field)
    #[error("undefined value has no canonical encoding")]
    Undefined,
    /// A serde type outside the canonical universe
    #[error("unsupported type: {0}")]
    Unsupported(&'static str),
    /// Object key that does not serialize to a string
    #[error("object keys must be strings")]
    NonStringKey,
    /// Short-hash length outside 1..=64
    #[error("invalid short hash length: {0} (expected 1..=64)")]
    InvalidLength(usize),
    /// Error reported by a `Serialize` impl
    #[error("{0}")]
    Custom(String),
}

impl ser::Error for EncodeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}

/// Encode a value into its canonical text form.
///
/// # Errors
///
/// Returns error if the value (or anything nested in it) falls outside
/// the canonical universe.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, EncodeError> {
    let node = value.serialize(NodeSerializer)?;
    let mut out = String::new();
    node.write(&mut out)?;
    Ok(out)
}

/// SHA-256 digest of the canonical encoding
///
/// # Errors
///
/// Returns error if the value cannot be encoded
pub fn digest<T: Serialize + ?Sized>(value: &T) -> Result<Hash, EncodeError> {
    encode(value).map(|text| Hash::compute(text.as_bytes()))
}

/// SHA-256 of the canonical encoding as 64 lowercase hex characters
///
/// # Errors
///
/// Returns error if the value cannot be encoded
pub fn hash<T: Serialize + ?Sized>(value: &T) -> Result<String, EncodeError> {
    digest(value).map(|h| h.to_hex())
}

/// First `len` hex characters of [`hash`]
///
/// # Errors
///
/// Returns error if the value cannot be encoded or `len` is outside 1..=64
pub fn short_hash<T: Serialize + ?Sized>(value: &T, len: usize) -> Result<String, EncodeError> {
    if len == 0 || len > Hash::HEX_LEN {
        return Err(EncodeError::InvalidLength(len));
    }
    let mut hex = hash(value)?;
    hex.truncate(len);
    Ok(hex)
}

/// Lower a value into a JSON value in canonical form.
///
/// `serde_json::to_value` and `json!` turn NaN and the infinities into
/// `null`; this rejects them instead. Integral floats below 2^53 come out as
/// integers, so the result encodes to the same text as `value`.
///
/// # Errors
///
/// Returns error if the value (or anything nested in it) falls outside
/// the canonical universe.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, EncodeError> {
    value.serialize(NodeSerializer).map(Node::into_value)
}

/// Restricted value tree every encodable value lowers into.
#[derive(Debug, Clone, PartialEq)]
enum Node {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Array(Vec<Node>),
    Object(BTreeMap<String, Node>),
}

impl Node {
    fn into_value(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(b),
            Self::Int(i) => Value::from(i),
            Self::UInt(u) => Value::from(u),
            Self::Float(f) if f.fract() == 0.0 && f.abs() < MAX_SAFE_INTEGER => {
                Value::from(f as i64)
            }
            // Floats in the tree are finite, so from_f64 always succeeds
            Self::Float(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
            Self::Str(s) => Value::String(s),
            Self::Array(items) => Value::Array(items.into_iter().map(Self::into_value).collect()),
            Self::Object(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(key, node)| (key, node.into_value()))
                    .collect(),
            ),
        }
    }

    fn write(&self, out: &mut String) -> Result<(), EncodeError> {
        match self {
            Self::Null => out.push_str("null"),
            Self::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::Int(i) => out.push_str(&i.to_string()),
            Self::UInt(u) => out.push_str(&u.to_string()),
            Self::Float(f) => write_float(*f, out)?,
            Self::Str(s) => write_str(s, out)?,
            Self::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write(out)?;
                }
                out.push(']');
            }
            Self::Object(entries) => {
                out.push('{');
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_str(key, out)?;
                    out.push(':');
                    value.write(out)?;
                }
                out.push('}');
            }
        }
        Ok(())
    }
}

fn write_str(s: &str, out: &mut String) -> Result<(), EncodeError> {
    let quoted = serde_json::to_string(s).map_err(|e| EncodeError::Custom(e.to_string()))?;
    out.push_str(&quoted);
    Ok(())
}

fn write_float(f: f64, out: &mut String) -> Result<(), EncodeError> {
    if !f.is_finite() {
        return Err(EncodeError::NonFinite);
    }
    if f.fract() == 0.0 && f.abs() < MAX_SAFE_INTEGER {
        // -0.0 lands here and prints as 0
        out.push_str(&(f as i64).to_string());
        return Ok(());
    }
    let text = serde_json::to_string(&f).map_err(|e| EncodeError::Custom(e.to_string()))?;
    out.push_str(&text);
    Ok(())
}

struct NodeSerializer;

impl ser::Serializer for NodeSerializer {
    type Ok = Node;
    type Error = EncodeError;
    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantSeqBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = VariantMapBuilder;

    fn serialize_bool(self, v: bool) -> Result<Node, EncodeError> {
        Ok(Node::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Node, EncodeError> {
        Ok(Node::Int(i64::from(v)))
    }

    fn serialize_i16(self, v: i16) -> Result<Node, EncodeError> {
        Ok(Node::Int(i64::from(v)))
    }

    fn serialize_i32(self, v: i32) -> Result<Node, EncodeError> {
        Ok(Node::Int(i64::from(v)))
    }

    fn serialize_i64(self, v: i64) -> Result<Node, EncodeError> {
        Ok(Node::Int(v))
    }

    fn serialize_i128(self, _v: i128) -> Result<Node, EncodeError> {
        Err(EncodeError::Unsupported("i128"))
    }

    fn serialize_u8(self, v: u8) -> Result<Node, EncodeError> {
        Ok(Node::UInt(u64::from(v)))
    }

    fn serialize_u16(self, v: u16) -> Result<Node, EncodeError> {
        Ok(Node::UInt(u64::from(v)))
    }

    fn serialize_u32(self, v: u32) -> Result<Node, EncodeError> {
        Ok(Node::UInt(u64::from(v)))
    }

    fn serialize_u64(self, v: u64) -> Result<Node, EncodeError> {
        Ok(Node::UInt(v))
    }

    fn serialize_u128(self, _v: u128) -> Result<Node, EncodeError> {
        Err(EncodeError::Unsupported("u128"))
    }

    fn serialize_f32(self, v: f32) -> Result<Node, EncodeError> {
        if !v.is_finite() {
            return Err(EncodeError::NonFinite);
        }
        // Widen through the shortest decimal form so 0.1f32 stays 0.1
        let widened = v.to_string().parse::<f64>().unwrap_or(f64::from(v));
        Ok(Node::Float(widened))
    }

    fn serialize_f64(self, v: f64) -> Result<Node, EncodeError> {
        if !v.is_finite() {
            return Err(EncodeError::NonFinite);
        }
        Ok(Node::Float(v))
    }

    fn serialize_char(self, v: char) -> Result<Node, EncodeError> {
        Ok(Node::Str(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Node, EncodeError> {
        Ok(Node::Str(v.to_string()))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<Node, EncodeError> {
        Err(EncodeError::Unsupported("bytes"))
    }

    fn serialize_none(self) -> Result<Node, EncodeError> {
        Err(EncodeError::Undefined)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Node, EncodeError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Node, EncodeError> {
        Ok(Node::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Node, EncodeError> {
        Ok(Node::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Node, EncodeError> {
        Ok(Node::Str(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Node, EncodeError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Node, EncodeError> {
        let mut entries = BTreeMap::new();
        entries.insert(variant.to_string(), value.serialize(NodeSerializer)?);
        Ok(Node::Object(entries))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder, EncodeError> {
        Ok(SeqBuilder {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder, EncodeError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqBuilder, EncodeError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantSeqBuilder, EncodeError> {
        Ok(VariantSeqBuilder {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapBuilder, EncodeError> {
        Ok(MapBuilder::default())
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<MapBuilder, EncodeError> {
        Ok(MapBuilder::default())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<VariantMapBuilder, EncodeError> {
        Ok(VariantMapBuilder {
            variant,
            map: MapBuilder::default(),
        })
    }
}

struct SeqBuilder {
    items: Vec<Node>,
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Node;
    type Error = EncodeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        self.items.push(value.serialize(NodeSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Node, EncodeError> {
        Ok(Node::Array(self.items))
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Node;
    type Error = EncodeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Node, EncodeError> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Node;
    type Error = EncodeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Node, EncodeError> {
        ser::SerializeSeq::end(self)
    }
}

struct VariantSeqBuilder {
    variant: &'static str,
    items: Vec<Node>,
}

impl ser::SerializeTupleVariant for VariantSeqBuilder {
    type Ok = Node;
    type Error = EncodeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        self.items.push(value.serialize(NodeSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Node, EncodeError> {
        let mut entries = BTreeMap::new();
        entries.insert(self.variant.to_string(), Node::Array(self.items));
        Ok(Node::Object(entries))
    }
}

#[derive(Default)]
struct MapBuilder {
    entries: BTreeMap<String, Node>,
    pending_key: Option<String>,
}

impl MapBuilder {
    fn insert<T: Serialize + ?Sized>(&mut self, key: String, value: &T) -> Result<(), EncodeError> {
        self.entries.insert(key, value.serialize(NodeSerializer)?);
        Ok(())
    }
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Node;
    type Error = EncodeError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), EncodeError> {
        match key.serialize(NodeSerializer)? {
            Node::Str(s) => {
                self.pending_key = Some(s);
                Ok(())
            }
            _ => Err(EncodeError::NonStringKey),
        }
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| EncodeError::Custom("map value without a key".to_string()))?;
        self.insert(key, value)
    }

    fn end(self) -> Result<Node, EncodeError> {
        Ok(Node::Object(self.entries))
    }
}

impl ser::SerializeStruct for MapBuilder {
    type Ok = Node;
    type Error = EncodeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), EncodeError> {
        self.insert(key.to_string(), value)
    }

    fn end(self) -> Result<Node, EncodeError> {
        Ok(Node::Object(self.entries))
    }
}

struct VariantMapBuilder {
    variant: &'static str,
    map: MapBuilder,
}

impl ser::SerializeStructVariant for VariantMapBuilder {
    type Ok = Node;
    type Error = EncodeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), EncodeError> {
        self.map.insert(key.to_string(), value)
    }

    fn end(self) -> Result<Node, EncodeError> {
        let mut entries = BTreeMap::new();
        entries.insert(self.variant.to_string(), Node::Object(self.map.entries));
        Ok(Node::Object(entries))
    }
}
