//! [`Value`]: the dynamic decode target, any MessagePack value.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value as JsonValue;

use packstream_util::sort_by_bytes;

use crate::codec::{sort_key, Decode, Encode};
use crate::decoder::{Decoder, MAX_PREALLOC_ITEMS};
use crate::encoder::Encoder;
use crate::error::Result;

const BIN_URI_START: &str = "data:application/octet-stream;base64,";
const EXT_URI_START: &str = "data:application/msgpack;base64;ext=";

/// Any MessagePack value.
///
/// Positive fixints and the signed families decode to [`Value::Integer`];
/// the unsigned families decode to [`Value::UInteger`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Integer(i64),
    UInteger(u64),
    Float32(f32),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    /// Entries in wire order.
    Map(Vec<(Value, Value)>),
    Extension(ExtValue),
}

/// An extension record. When the id is registered, `decoded` holds the
/// registered decoder's result.
#[derive(Clone)]
pub struct ExtValue {
    pub id: i8,
    pub data: Vec<u8>,
    decoded: Option<Arc<dyn Any + Send + Sync>>,
}

impl ExtValue {
    pub fn new(id: i8, data: Vec<u8>) -> Self {
        Self {
            id,
            data,
            decoded: None,
        }
    }

    pub fn with_decoded(id: i8, data: Vec<u8>, decoded: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            id,
            data,
            decoded: Some(decoded),
        }
    }

    /// The registered decoder's result, if it is a `T`.
    pub fn decoded<T: Any>(&self) -> Option<&T> {
        self.decoded.as_deref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for ExtValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtValue")
            .field("id", &self.id)
            .field("data", &self.data)
            .field("decoded", &self.decoded.is_some())
            .finish()
    }
}

impl PartialEq for ExtValue {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.data == other.data
    }
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::UInteger(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Integer(i) => u64::try_from(*i).ok(),
            Value::UInteger(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(f) => Some(f64::from(*f)),
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            Value::UInteger(u) => Some(*u as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Looks up a string key in a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    /// Converts to JSON. Bytes and extensions become data URI strings;
    /// non-string map keys are rendered as their JSON text.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Nil => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Integer(i) => JsonValue::from(*i),
            Value::UInteger(u) => JsonValue::from(*u),
            Value::Float32(f) => float_to_json(f64::from(*f)),
            Value::Float(f) => float_to_json(*f),
            Value::Str(s) => JsonValue::String(s.clone()),
            Value::Bytes(b) => JsonValue::String(format!("{BIN_URI_START}{}", STANDARD.encode(b))),
            Value::Extension(ext) => JsonValue::String(format!(
                "{EXT_URI_START}{},{}",
                ext.id,
                STANDARD.encode(&ext.data)
            )),
            Value::Array(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(pairs) => JsonValue::Object(
                pairs
                    .iter()
                    .map(|(k, v)| {
                        let key = match k {
                            Value::Str(s) => s.clone(),
                            other => other.to_json().to_string(),
                        };
                        (key, v.to_json())
                    })
                    .collect(),
            ),
        }
    }

    /// Converts from JSON, turning data URI strings back into bytes and
    /// extensions.
    pub fn from_json(json: JsonValue) -> Value {
        match json {
            JsonValue::Null => Value::Nil,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInteger(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => unwrap_data_uri(&s).unwrap_or(Value::Str(s)),
            JsonValue::Array(items) => Value::Array(items.into_iter().map(Value::from_json).collect()),
            JsonValue::Object(obj) => Value::Map(
                obj.into_iter()
                    .map(|(k, v)| (Value::Str(k), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

fn float_to_json(f: f64) -> JsonValue {
    serde_json::Number::from_f64(f)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

fn unwrap_data_uri(s: &str) -> Option<Value> {
    if let Some(b64) = s.strip_prefix(BIN_URI_START) {
        return STANDARD.decode(b64).ok().map(Value::Bytes);
    }
    let rest = s.strip_prefix(EXT_URI_START)?;
    let (id, b64) = rest.split_once(',')?;
    let id = id.parse::<i8>().ok()?;
    let data = STANDARD.decode(b64).ok()?;
    Some(Value::Extension(ExtValue::new(id, data)))
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        Value::from_json(json)
    }
}

impl From<Value> for JsonValue {
    fn from(value: Value) -> Self {
        value.to_json()
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! from_int {
    ($variant:ident as $wide:ty: $($ty:ty),*) => {$(
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(<$wide>::from(v))
            }
        }
    )*};
}

from_int!(Integer as i64: i8, i16, i32, i64);
from_int!(UInteger as u64: u8, u16, u32, u64);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<ExtValue> for Value {
    fn from(v: ExtValue) -> Self {
        Value::Extension(v)
    }
}

impl Encode for Value {
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
        match self {
            Value::Nil => enc.encode_nil(),
            Value::Bool(b) => enc.encode_bool(*b),
            Value::Integer(i) => enc.encode_int(*i),
            Value::UInteger(u) => enc.encode_uint(*u),
            Value::Float32(f) => enc.encode_float32(*f),
            Value::Float(f) => enc.encode_float64(*f),
            Value::Str(s) => enc.encode_string(s),
            Value::Bytes(b) => enc.encode_bytes(b),
            Value::Array(items) => {
                enc.encode_array_len(items.len())?;
                for item in items {
                    item.encode(enc)?;
                }
                Ok(())
            }
            Value::Map(pairs) => encode_pairs(enc, pairs),
            Value::Extension(ext) => enc.encode_ext(ext.id, &ext.data),
        }
    }

    fn is_empty_value(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::Bool(b) => !*b,
            Value::Integer(i) => *i == 0,
            Value::UInteger(u) => *u == 0,
            Value::Float32(f) => *f == 0.0,
            Value::Float(f) => *f == 0.0,
            Value::Str(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Map(pairs) => pairs.is_empty(),
            Value::Extension(_) => false,
        }
    }

    fn key_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Str(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

fn encode_pairs(enc: &mut Encoder<'_>, pairs: &[(Value, Value)]) -> Result<()> {
    enc.encode_map_len(pairs.len())?;
    if !enc.options().sort_map_keys {
        for (k, v) in pairs {
            k.encode(enc)?;
            v.encode(enc)?;
        }
        return Ok(());
    }
    let mut sorted = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let key = match pair.0.key_bytes() {
            Some(bytes) => bytes.to_vec(),
            None => sort_key(&pair.0)?,
        };
        sorted.push((key, pair));
    }
    sort_by_bytes(&mut sorted, |entry| &entry.0[..]);
    for (_, (k, v)) in sorted {
        k.encode(enc)?;
        v.encode(enc)?;
    }
    Ok(())
}

impl Decode for Value {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.decode_dynamic()
    }
}

/// A map hook for [`DecoderOptions::custom_map_decoder`] that only accepts
/// string keys.
///
/// [`DecoderOptions::custom_map_decoder`]: crate::DecoderOptions::custom_map_decoder
pub fn string_keyed_map(dec: &mut Decoder<'_>) -> Result<Value> {
    let len = dec.decode_map_len()?.unwrap_or(0);
    let mut pairs = Vec::with_capacity(len.min(MAX_PREALLOC_ITEMS));
    for _ in 0..len {
        let key = dec.decode_string()?;
        pairs.push((Value::Str(key), dec.decode_dynamic()?));
    }
    Ok(Value::Map(pairs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::options::{DecoderOptions, EncoderOptions};
    use crate::util::{from_slice, from_slice_with, to_vec, to_vec_with};
    use serde_json::json;

    #[test]
    fn json_round_trip() {
        let doc = json!({"a": [1, -2, 3.5, null, true], "b": {"c": "d"}, "big": u64::MAX});
        let value = Value::from(doc.clone());
        let back: Value = from_slice(&to_vec(&value).unwrap()).unwrap();
        assert_eq!(JsonValue::from(back), doc);
    }

    #[test]
    fn bytes_and_ext_as_data_uris() {
        let value = Value::Array(vec![
            Value::Bytes(vec![1, 2, 3]),
            Value::Extension(ExtValue::new(-3, vec![0xff])),
        ]);
        let json = value.to_json();
        assert_eq!(
            json,
            json!([
                "data:application/octet-stream;base64,AQID",
                "data:application/msgpack;base64;ext=-3,/w=="
            ])
        );
        assert_eq!(Value::from_json(json), value);
    }

    #[test]
    fn non_string_keys_render_as_json_text() {
        let value = Value::Map(vec![(Value::Integer(1), Value::Nil)]);
        assert_eq!(value.to_json(), json!({"1": null}));
    }

    #[test]
    fn sorted_map_encoding() {
        let value = Value::Map(vec![
            (Value::from("b"), Value::from(1u8)),
            (Value::from("a"), Value::from(2u8)),
        ]);
        let opts = EncoderOptions::default().sort_map_keys(true);
        assert_eq!(
            to_vec_with(&value, opts).unwrap(),
            [0x82, 0xa1, b'a', 0x02, 0xa1, b'b', 0x01]
        );
        assert_eq!(
            to_vec(&value).unwrap(),
            [0x82, 0xa1, b'b', 0x01, 0xa1, b'a', 0x02]
        );
    }

    #[test]
    fn unregistered_ext_values_still_encode() {
        let value = Value::Extension(ExtValue::new(9, vec![1, 2]));
        assert_eq!(to_vec(&value).unwrap(), [0xd5, 0x09, 1, 2]);
    }

    #[test]
    fn string_keyed_hook() {
        let opts = DecoderOptions::default().custom_map_decoder(string_keyed_map);
        let value: Value = from_slice_with(&[0x81, 0xa1, b'k', 0x07], opts.clone()).unwrap();
        assert_eq!(value.get("k"), Some(&Value::Integer(7)));
        assert!(matches!(
            from_slice_with::<Value>(&[0x81, 0x01, 0x07], opts),
            Err(Error::InvalidCode { code: 0x01, .. })
        ));
    }

    #[test]
    fn accessors() {
        assert_eq!(Value::UInteger(5).as_i64(), Some(5));
        assert_eq!(Value::Integer(-1).as_u64(), None);
        assert_eq!(Value::Float32(0.5).as_f64(), Some(0.5));
        assert!(Value::default().is_nil());
        assert!(Value::Array(vec![]).is_empty_value());
    }
}
