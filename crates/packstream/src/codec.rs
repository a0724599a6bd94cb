//! The [`Encode`] / [`Decode`] traits and their std impls.
//!
//! A type's impl is its codec strategy: monomorphisation picks it once per
//! type at compile time. [`Encoder::encode_value`] and
//! [`Decoder::decode_value`] put the extension registry in front of it.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};
use std::rc::Rc;
use std::sync::Arc;

use packstream_util::sort_by_bytes;

use crate::codes::{is_array, NIL};
use crate::decoder::{Decoder, MAX_PREALLOC_ITEMS};
use crate::encoder::Encoder;
use crate::error::{Error, Result};

/// A value that can be written as MessagePack.
pub trait Encode {
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()>;

    /// Whether an `omitempty` field holding this value is dropped.
    fn is_empty_value(&self) -> bool {
        false
    }

    /// Encodes a slice of `Self`. Bytes and strings override this.
    #[doc(hidden)]
    fn encode_slice(items: &[Self], enc: &mut Encoder<'_>) -> Result<()>
    where
        Self: Sized + 'static,
    {
        enc.encode_array_len(items.len())?;
        for item in items {
            enc.encode_value(item)?;
        }
        Ok(())
    }

    /// Raw bytes used to order this value as a map key, when it is a string.
    #[doc(hidden)]
    fn key_bytes(&self) -> Option<&[u8]> {
        None
    }
}

/// A value that can be read from MessagePack.
pub trait Decode: Sized {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self>;

    /// Decodes a sequence of `Self`. Bytes and strings override this.
    #[doc(hidden)]
    fn decode_vec(dec: &mut Decoder<'_>) -> Result<Vec<Self>>
    where
        Self: 'static,
    {
        decode_seq(dec)
    }
}

fn decode_seq<T: Decode + 'static>(dec: &mut Decoder<'_>) -> Result<Vec<T>> {
    let Some(len) = dec.decode_array_len()? else {
        return Ok(Vec::new());
    };
    let mut out = Vec::with_capacity(len.min(MAX_PREALLOC_ITEMS));
    for _ in 0..len {
        out.push(dec.decode_value::<T>()?);
    }
    Ok(out)
}

/// Object-safe face of [`Encode`], used by [`Encoder::encode_many`].
pub trait AnyEncode {
    fn encode_dyn(&self, enc: &mut Encoder<'_>) -> Result<()>;
}

impl<T: Encode + 'static> AnyEncode for T {
    fn encode_dyn(&self, enc: &mut Encoder<'_>) -> Result<()> {
        enc.encode_value(self)
    }
}

/// Object-safe face of [`Decode`], used by [`Decoder::decode_many`].
pub trait AnyDecode {
    fn decode_into(&mut self, dec: &mut Decoder<'_>) -> Result<()>;
}

impl<T: Decode + 'static> AnyDecode for T {
    fn decode_into(&mut self, dec: &mut Decoder<'_>) -> Result<()> {
        *self = dec.decode_value::<T>()?;
        Ok(())
    }
}

impl Encode for bool {
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
        enc.encode_bool(*self)
    }

    fn is_empty_value(&self) -> bool {
        !*self
    }
}

impl Decode for bool {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.decode_bool()
    }
}

macro_rules! impl_signed {
    ($($ty:ty => $name:literal),* $(,)?) => {$(
        impl Encode for $ty {
            fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
                enc.encode_int(*self as i64)
            }

            fn is_empty_value(&self) -> bool {
                *self == 0
            }
        }

        impl Decode for $ty {
            fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
                let v = dec.decode_int()?;
                <$ty>::try_from(v).map_err(|_| Error::Overflow($name))
            }
        }
    )*};
}

macro_rules! impl_unsigned {
    ($($ty:ty => $name:literal),* $(,)?) => {$(
        impl Encode for $ty {
            fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
                enc.encode_uint(*self as u64)
            }

            fn is_empty_value(&self) -> bool {
                *self == 0
            }
        }

        impl Decode for $ty {
            fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
                let v = dec.decode_uint()?;
                <$ty>::try_from(v).map_err(|_| Error::Overflow($name))
            }
        }
    )*};
}

impl_signed!(i16 => "i16", i32 => "i32", i64 => "i64", isize => "isize");
impl_unsigned!(u16 => "u16", u32 => "u32", u64 => "u64", usize => "usize");

impl Encode for i8 {
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
        enc.encode_int(i64::from(*self))
    }

    fn is_empty_value(&self) -> bool {
        *self == 0
    }
}

impl Decode for i8 {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        i8::try_from(dec.decode_int()?).map_err(|_| Error::Overflow("i8"))
    }
}

/// `u8` sequences travel as bin.
impl Encode for u8 {
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
        enc.encode_uint(u64::from(*self))
    }

    fn is_empty_value(&self) -> bool {
        *self == 0
    }

    fn encode_slice(items: &[Self], enc: &mut Encoder<'_>) -> Result<()> {
        enc.encode_bytes(items)
    }
}

impl Decode for u8 {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        u8::try_from(dec.decode_uint()?).map_err(|_| Error::Overflow("u8"))
    }

    fn decode_vec(dec: &mut Decoder<'_>) -> Result<Vec<Self>> {
        if is_array(dec.peek_code()?) {
            return decode_seq(dec);
        }
        dec.decode_bytes()
    }
}

impl Encode for f32 {
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
        enc.encode_float32(*self)
    }

    fn is_empty_value(&self) -> bool {
        *self == 0.0
    }
}

impl Decode for f32 {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.decode_float32()
    }
}

impl Encode for f64 {
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
        enc.encode_float64(*self)
    }

    fn is_empty_value(&self) -> bool {
        *self == 0.0
    }
}

impl Decode for f64 {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.decode_float64()
    }
}

impl Encode for char {
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
        let mut buf = [0u8; 4];
        enc.encode_string(self.encode_utf8(&mut buf))
    }
}

impl Decode for char {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let s = dec.decode_string()?;
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(Error::LengthMismatch {
                expected: 1,
                found: s.chars().count(),
            }),
        }
    }
}

impl Encode for str {
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
        enc.encode_string(self)
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }

    fn key_bytes(&self) -> Option<&[u8]> {
        Some(self.as_bytes())
    }
}

/// `String` sequences skip the per-element registry lookup.
impl Encode for String {
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
        enc.encode_string(self)
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }

    fn encode_slice(items: &[Self], enc: &mut Encoder<'_>) -> Result<()> {
        enc.encode_array_len(items.len())?;
        for item in items {
            enc.encode_string(item)?;
        }
        Ok(())
    }

    fn key_bytes(&self) -> Option<&[u8]> {
        Some(self.as_bytes())
    }
}

impl Decode for String {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.decode_string()
    }

    fn decode_vec(dec: &mut Decoder<'_>) -> Result<Vec<Self>> {
        let Some(len) = dec.decode_array_len()? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(len.min(MAX_PREALLOC_ITEMS));
        for _ in 0..len {
            out.push(dec.decode_string()?);
        }
        Ok(out)
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
        (**self).encode(enc)
    }

    fn is_empty_value(&self) -> bool {
        (**self).is_empty_value()
    }

    fn key_bytes(&self) -> Option<&[u8]> {
        (**self).key_bytes()
    }
}

impl<T: Encode + 'static> Encode for [T] {
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
        T::encode_slice(self, enc)
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Encode + 'static> Encode for Vec<T> {
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
        T::encode_slice(self, enc)
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Decode + 'static> Decode for Vec<T> {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        T::decode_vec(dec)
    }
}

impl<T: Encode + 'static, const N: usize> Encode for [T; N] {
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
        T::encode_slice(self, enc)
    }

    fn is_empty_value(&self) -> bool {
        N == 0
    }
}

impl<T: Decode + 'static, const N: usize> Decode for [T; N] {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let items = T::decode_vec(dec)?;
        let found = items.len();
        items.try_into().map_err(|_| Error::LengthMismatch {
            expected: N,
            found,
        })
    }
}

impl<T: Encode + 'static> Encode for Option<T> {
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
        match self {
            Some(v) => enc.encode_value(v),
            None => enc.encode_nil(),
        }
    }

    fn is_empty_value(&self) -> bool {
        self.is_none()
    }
}

impl<T: Decode + 'static> Decode for Option<T> {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        if dec.peek_code()? == NIL {
            dec.decode_nil()?;
            return Ok(None);
        }
        dec.decode_value::<T>().map(Some)
    }
}

macro_rules! impl_pointer {
    ($($ptr:ident),*) => {$(
        impl<T: Encode + 'static> Encode for $ptr<T> {
            fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
                enc.encode_value::<T>(self)
            }

            /// Only a nil pointer is empty, and these are never nil.
            fn is_empty_value(&self) -> bool {
                false
            }

            fn key_bytes(&self) -> Option<&[u8]> {
                (**self).key_bytes()
            }
        }

        impl<T: Decode + 'static> Decode for $ptr<T> {
            fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
                dec.decode_value::<T>().map($ptr::new)
            }
        }
    )*};
}

impl_pointer!(Box, Arc, Rc);

/// Writes a map header and its entries, sorted by key bytes when the
/// encoder asks for it. String keys sort by their raw bytes; other keys by
/// their MessagePack encoding.
pub(crate) fn encode_entries<'m, K, V, I>(enc: &mut Encoder<'_>, len: usize, entries: I) -> Result<()>
where
    K: Encode + 'static,
    V: Encode + 'static,
    I: Iterator<Item = (&'m K, &'m V)>,
{
    enc.encode_map_len(len)?;
    if !enc.options().sort_map_keys {
        for (k, v) in entries {
            enc.encode_value(k)?;
            enc.encode_value(v)?;
        }
        return Ok(());
    }
    let mut sorted = Vec::with_capacity(len);
    for (k, v) in entries {
        let key = match k.key_bytes() {
            Some(bytes) => Cow::Borrowed(bytes),
            None => Cow::Owned(sort_key(k)?),
        };
        sorted.push((key, k, v));
    }
    sort_by_bytes(&mut sorted, |entry| &entry.0[..]);
    for (_, k, v) in sorted {
        enc.encode_value(k)?;
        enc.encode_value(v)?;
    }
    Ok(())
}

pub(crate) fn sort_key<K: Encode + ?Sized>(key: &K) -> Result<Vec<u8>> {
    let mut enc = Encoder::buffered();
    key.encode(&mut enc)?;
    Ok(enc.into_bytes())
}

impl<K, V, S> Encode for HashMap<K, V, S>
where
    K: Encode + 'static,
    V: Encode + 'static,
{
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
        encode_entries(enc, self.len(), self.iter())
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V, S> Decode for HashMap<K, V, S>
where
    K: Decode + Eq + Hash + 'static,
    V: Decode + 'static,
    S: BuildHasher + Default,
{
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let Some(len) = dec.decode_map_len()? else {
            return Ok(HashMap::default());
        };
        let mut map = HashMap::with_capacity_and_hasher(len.min(MAX_PREALLOC_ITEMS), S::default());
        for _ in 0..len {
            let k = dec.decode_value::<K>()?;
            let v = dec.decode_value::<V>()?;
            map.insert(k, v);
        }
        Ok(map)
    }
}

impl<K, V> Encode for BTreeMap<K, V>
where
    K: Encode + 'static,
    V: Encode + 'static,
{
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
        encode_entries(enc, self.len(), self.iter())
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> Decode for BTreeMap<K, V>
where
    K: Decode + Ord + 'static,
    V: Decode + 'static,
{
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let Some(len) = dec.decode_map_len()? else {
            return Ok(BTreeMap::new());
        };
        let mut map = BTreeMap::new();
        for _ in 0..len {
            let k = dec.decode_value::<K>()?;
            let v = dec.decode_value::<V>()?;
            map.insert(k, v);
        }
        Ok(map)
    }
}

impl Encode for () {
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
        enc.encode_nil()
    }

    fn is_empty_value(&self) -> bool {
        true
    }
}

impl Decode for () {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.decode_nil()
    }
}

macro_rules! impl_tuple {
    ($len:literal => $($name:ident $idx:tt),+) => {
        impl<$($name: Encode + 'static),+> Encode for ($($name,)+) {
            fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
                enc.encode_array_len($len)?;
                $(enc.encode_value(&self.$idx)?;)+
                Ok(())
            }
        }

        impl<$($name: Decode + 'static),+> Decode for ($($name,)+) {
            fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
                let found = match dec.decode_array_len()? {
                    Some(n) => n,
                    None => {
                        return Err(Error::InvalidCode {
                            code: NIL,
                            target: "tuple",
                        })
                    }
                };
                if found != $len {
                    return Err(Error::LengthMismatch { expected: $len, found });
                }
                Ok(($(dec.decode_value::<$name>()?,)+))
            }
        }
    };
}

impl_tuple!(1 => A 0);
impl_tuple!(2 => A 0, B 1);
impl_tuple!(3 => A 0, B 1, C 2);
impl_tuple!(4 => A 0, B 1, C 2, D 3);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::EncoderOptions;
    use crate::util::{from_slice, to_vec, to_vec_with};

    #[test]
    fn byte_vectors_use_bin() {
        assert_eq!(to_vec(&vec![1u8, 2, 3]).unwrap(), [0xc4, 0x03, 1, 2, 3]);
        assert_eq!(to_vec(&[7u8; 2]).unwrap(), [0xc4, 0x02, 7, 7]);
        let back: Vec<u8> = from_slice(&[0x93, 1, 2, 3]).unwrap();
        assert_eq!(back, [1, 2, 3]);
    }

    #[test]
    fn string_vectors() {
        let v = vec!["ab".to_string(), "c".to_string()];
        let bytes = to_vec(&v).unwrap();
        assert_eq!(bytes, [0x92, 0xa2, b'a', b'b', 0xa1, b'c']);
        let back: Vec<String> = from_slice(&bytes).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn option_and_pointers() {
        assert_eq!(to_vec(&None::<u32>).unwrap(), [0xc0]);
        assert_eq!(to_vec(&Some(Box::new(5u16))).unwrap(), [0x05]);
        let v: Option<Arc<String>> = from_slice(&[0xa1, b'z']).unwrap();
        assert_eq!(v.as_deref().map(String::as_str), Some("z"));
        let v: Option<Rc<u8>> = from_slice(&[0xc0]).unwrap();
        assert!(v.is_none());
    }

    #[test]
    fn integer_overflow_on_narrow_target() {
        assert!(matches!(
            from_slice::<u8>(&[0xcd, 0x01, 0x00]),
            Err(Error::Overflow("u8"))
        ));
        assert!(matches!(
            from_slice::<i16>(&[0xce, 0x00, 0x01, 0x00, 0x00]),
            Err(Error::Overflow("i16"))
        ));
        assert_eq!(from_slice::<i16>(&[0xcc, 0xff]).unwrap(), 255);
    }

    #[test]
    fn fixed_arrays_check_length() {
        let v: [u32; 2] = from_slice(&[0x92, 1, 2]).unwrap();
        assert_eq!(v, [1, 2]);
        assert!(matches!(
            from_slice::<[u32; 3]>(&[0x92, 1, 2]),
            Err(Error::LengthMismatch { expected: 3, found: 2 })
        ));
    }

    #[test]
    fn tuples_are_arrays() {
        let bytes = to_vec(&(1u8, "x", true)).unwrap();
        assert_eq!(bytes, [0x93, 0x01, 0xa1, b'x', 0xc3]);
        let back: (u8, String, bool) = from_slice(&bytes).unwrap();
        assert_eq!(back, (1, "x".to_string(), true));
    }

    #[test]
    fn sorted_maps() {
        let mut map = HashMap::new();
        for key in ["b", "aa", "a", "ab"] {
            map.insert(key.to_string(), 1u8);
        }
        let bytes = to_vec_with(&map, EncoderOptions::default().sort_map_keys(true)).unwrap();
        assert_eq!(
            bytes,
            [
                0x84, 0xa1, b'a', 1, 0xa2, b'a', b'a', 1, 0xa2, b'a', b'b', 1, 0xa1, b'b', 1
            ]
        );
    }

    #[test]
    fn maps_round_trip() {
        let mut map = BTreeMap::new();
        map.insert(3u32, vec![true]);
        map.insert(1u32, vec![]);
        let back: BTreeMap<u32, Vec<bool>> = from_slice(&to_vec(&map).unwrap()).unwrap();
        assert_eq!(back, map);
        let nil: HashMap<String, u8> = from_slice(&[0xc0]).unwrap();
        assert!(nil.is_empty());
    }

    #[test]
    fn chars() {
        assert_eq!(from_slice::<char>(&to_vec(&'é').unwrap()).unwrap(), 'é');
        assert!(matches!(
            from_slice::<char>(&[0xa2, b'a', b'b']),
            Err(Error::LengthMismatch { expected: 1, found: 2 })
        ));
    }

    #[test]
    fn empty_values() {
        assert!(0u32.is_empty_value());
        assert!(!1i8.is_empty_value());
        assert!(String::new().is_empty_value());
        assert!(None::<u8>.is_empty_value());
        assert!(Vec::<u8>::new().is_empty_value());
        assert!(!true.is_empty_value() && false.is_empty_value());
        assert!(!Box::new(0.0f64).is_empty_value());
        assert!(!Arc::new(String::new()).is_empty_value());
        assert!(!Rc::new(0u8).is_empty_value());
        assert!(!Some(0u8).is_empty_value());
    }
}
