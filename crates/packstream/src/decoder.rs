//! Streaming MessagePack decoder.

use std::any::{type_name, Any, TypeId};
use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;

use packstream_buffers::StreamReader;
use tracing::trace;

use crate::codec::{AnyDecode, Decode};
use crate::codes::*;
use crate::encoder::{MAX_DICT_LEN, MIN_INTERN_LEN};
use crate::error::{Error, Result};
use crate::ext::{ExtEntry, ExtRegistry, INTERN_EXT_ID};
use crate::options::DecoderOptions;
use crate::raw::RawMessage;
use crate::value::{ExtValue, Value};

/// Upper bound on elements reserved up front for a decoded collection.
pub(crate) const MAX_PREALLOC_ITEMS: usize = 1024;

#[derive(Debug, Clone, Copy)]
enum Int {
    Signed(i64),
    Unsigned(u64),
}

/// A str, bin, or interned payload.
enum Text {
    Nil,
    Str(String),
    /// str-framed bytes that are not UTF-8.
    BadStr(Vec<u8>),
    Bin(Vec<u8>),
}

/// Reads MessagePack values from a [`Read`] source or a byte slice.
///
/// ```
/// use packstream::Decoder;
///
/// let mut dec = Decoder::from_slice(&[0x92, 0x01, 0xcd, 0x01, 0x2c]);
/// let v: Vec<u32> = dec.decode_value().unwrap();
/// assert_eq!(v, [1, 300]);
/// assert_eq!(dec.position(), 5);
/// ```
pub struct Decoder<'a> {
    reader: StreamReader<'a>,
    opts: DecoderOptions,
    registry: Arc<ExtRegistry>,
    dict: Vec<String>,
    intern_scope: bool,
    depth: usize,
}

impl<'a> Decoder<'a> {
    pub fn new<R: Read + 'a>(reader: R) -> Self {
        Self::with_options(reader, DecoderOptions::default())
    }

    pub fn with_options<R: Read + 'a>(reader: R, opts: DecoderOptions) -> Self {
        Self::from_buf_read(BufReader::new(reader), opts)
    }

    pub fn from_buf_read<R: BufRead + 'a>(reader: R, opts: DecoderOptions) -> Self {
        let registry = opts
            .registry
            .clone()
            .unwrap_or_else(|| ExtRegistry::global().clone());
        Self {
            reader: StreamReader::new(Box::new(reader)),
            opts,
            registry,
            dict: Vec::new(),
            intern_scope: false,
            depth: 0,
        }
    }

    pub fn from_slice(data: &'a [u8]) -> Self {
        Self::from_slice_with(data, DecoderOptions::default())
    }

    pub fn from_slice_with(data: &'a [u8], opts: DecoderOptions) -> Self {
        Self::from_buf_read(data, opts)
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.opts
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    /// Switches to a new source and clears the dictionary.
    pub fn reset<R: Read + 'a>(&mut self, reader: R) {
        self.reader.reset(Box::new(BufReader::new(reader)));
        self.dict.clear();
        self.intern_scope = false;
        self.depth = 0;
        trace!("decoder reset");
    }

    /// Replaces the dictionary with `seed`, keeping index positions.
    /// Entries past [`MAX_DICT_LEN`] are dropped.
    pub fn reset_dictionary<I, S>(&mut self, seed: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dict = seed.into_iter().take(MAX_DICT_LEN).map(Into::into).collect();
        trace!(entries = self.dict.len(), "decoder dictionary reset");
    }

    /// Interned strings in index order.
    pub fn dictionary(&self) -> &[String] {
        &self.dict
    }

    /// Runs `f` one container level deeper, failing once
    /// [`DecoderOptions::max_depth`] levels are open.
    pub(crate) fn nested<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        if self.depth >= self.opts.max_depth {
            return Err(Error::DepthLimitExceeded(self.opts.max_depth));
        }
        self.depth += 1;
        let res = f(self);
        self.depth -= 1;
        res
    }

    pub fn peek_code(&mut self) -> Result<u8> {
        Ok(self.reader.peek()?)
    }

    #[inline]
    fn read_code(&mut self) -> Result<u8> {
        Ok(self.reader.u8()?)
    }

    fn invalid(code: u8, target: &'static str) -> Error {
        if Family::of(code) == Family::Unknown {
            Error::UnknownCode(code)
        } else {
            Error::InvalidCode { code, target }
        }
    }

    /// Decodes into `T`, going through the extension registry when `T` is
    /// registered.
    pub fn decode_value<T: Decode + 'static>(&mut self) -> Result<T> {
        if let Some(entry) = self.registry.entry_for_type(TypeId::of::<T>()) {
            if self.peek_code()? != NIL {
                return self.decode_with_entry(&entry);
            }
        }
        T::decode(self)
    }

    /// Decodes into each target in order, stopping at the first failure.
    pub fn decode_many(&mut self, targets: &mut [&mut dyn AnyDecode]) -> Result<()> {
        for target in targets.iter_mut() {
            target.decode_into(self)?;
        }
        Ok(())
    }

    /// Decodes `T` through its extension registration.
    pub fn decode_registered<T: Any>(&mut self) -> Result<T> {
        let entry = self
            .registry
            .entry_for_type(TypeId::of::<T>())
            .ok_or(Error::UnregisteredType(type_name::<T>()))?;
        self.decode_with_entry(&entry)
    }

    fn decode_with_entry<T: Any>(&mut self, entry: &ExtEntry) -> Result<T> {
        let (id, len) = self.decode_ext_header()?;
        if id != entry.id {
            return Err(Error::ExtIdMismatch {
                expected: entry.id,
                found: id,
            });
        }
        let payload = self.reader.buf(len)?;
        entry
            .decode_payload(&payload)?
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| Error::UnregisteredType(type_name::<T>()))
    }

    /// Consumes a nil.
    pub fn decode_nil(&mut self) -> Result<()> {
        match self.read_code()? {
            NIL => Ok(()),
            code => Err(Self::invalid(code, "nil")),
        }
    }

    pub fn decode_bool(&mut self) -> Result<bool> {
        match self.read_code()? {
            TRUE => Ok(true),
            FALSE | NIL => Ok(false),
            code => Err(Self::invalid(code, "bool")),
        }
    }

    /// Reads the payload of an integer code that was already consumed.
    fn int_payload(&mut self, code: u8) -> Result<Option<Int>> {
        let r = &mut self.reader;
        Ok(Some(match code {
            0x00..=POS_FIXINT_MAX => Int::Unsigned(u64::from(code)),
            NEG_FIXINT_MIN..=0xff => Int::Signed(i64::from(code as i8)),
            UINT8 => Int::Unsigned(u64::from(r.u8()?)),
            UINT16 => Int::Unsigned(u64::from(r.u16()?)),
            UINT32 => Int::Unsigned(u64::from(r.u32()?)),
            UINT64 => Int::Unsigned(r.u64()?),
            INT8 => Int::Signed(i64::from(r.i8()?)),
            INT16 => Int::Signed(i64::from(r.i16()?)),
            INT32 => Int::Signed(i64::from(r.i32()?)),
            INT64 => Int::Signed(r.i64()?),
            _ => return Ok(None),
        }))
    }

    fn read_int(&mut self, target: &'static str) -> Result<Int> {
        let code = self.read_code()?;
        if code == NIL {
            return Ok(Int::Unsigned(0));
        }
        self.int_payload(code)?
            .ok_or_else(|| Self::invalid(code, target))
    }

    /// Decodes any integer form that fits in `i64`.
    pub fn decode_int(&mut self) -> Result<i64> {
        match self.read_int("int")? {
            Int::Signed(v) => Ok(v),
            Int::Unsigned(v) => i64::try_from(v).map_err(|_| Error::Overflow("i64")),
        }
    }

    /// Decodes any non-negative integer form.
    pub fn decode_uint(&mut self) -> Result<u64> {
        match self.read_int("uint")? {
            Int::Unsigned(v) => Ok(v),
            Int::Signed(v) => u64::try_from(v).map_err(|_| Error::Overflow("u64")),
        }
    }

    /// Decodes an integer and checks it fits a signed `width`.
    pub fn decode_int_width(&mut self, width: Width) -> Result<i64> {
        let v = self.decode_int()?;
        let fits = match width {
            Width::W8 => i8::try_from(v).is_ok(),
            Width::W16 => i16::try_from(v).is_ok(),
            Width::W32 => i32::try_from(v).is_ok(),
            Width::W64 => true,
        };
        if fits {
            Ok(v)
        } else {
            Err(Error::Overflow(signed_name(width)))
        }
    }

    /// Decodes an integer and checks it fits an unsigned `width`.
    pub fn decode_uint_width(&mut self, width: Width) -> Result<u64> {
        let v = self.decode_uint()?;
        let fits = match width {
            Width::W8 => u8::try_from(v).is_ok(),
            Width::W16 => u16::try_from(v).is_ok(),
            Width::W32 => u32::try_from(v).is_ok(),
            Width::W64 => true,
        };
        if fits {
            Ok(v)
        } else {
            Err(Error::Overflow(unsigned_name(width)))
        }
    }

    pub fn decode_float64(&mut self) -> Result<f64> {
        let code = self.read_code()?;
        match code {
            FLOAT => Ok(f64::from(self.reader.f32()?)),
            DOUBLE => Ok(self.reader.f64()?),
            NIL => Ok(0.0),
            _ => match self.int_payload(code)? {
                Some(Int::Signed(v)) => Ok(v as f64),
                Some(Int::Unsigned(v)) => Ok(v as f64),
                None => Err(Self::invalid(code, "f64")),
            },
        }
    }

    pub fn decode_float32(&mut self) -> Result<f32> {
        let code = self.read_code()?;
        match code {
            FLOAT => Ok(self.reader.f32()?),
            DOUBLE => Ok(self.reader.f64()? as f32),
            NIL => Ok(0.0),
            _ => match self.int_payload(code)? {
                Some(Int::Signed(v)) => Ok(v as f32),
                Some(Int::Unsigned(v)) => Ok(v as f32),
                None => Err(Self::invalid(code, "f32")),
            },
        }
    }

    #[inline]
    fn interning(&self) -> bool {
        self.opts.use_interned_strings || self.intern_scope
    }

    fn remember(&mut self, s: &str) {
        if !self.interning() || s.len() < MIN_INTERN_LEN {
            return;
        }
        if self.dict.len() < MAX_DICT_LEN {
            self.dict.push(s.to_owned());
        } else {
            trace!(len = s.len(), "intern dictionary full");
        }
    }

    fn str_len(&mut self, code: u8) -> Result<Option<usize>> {
        Ok(Some(match code {
            FIXSTR..=FIXSTR_MAX => usize::from(code & FIXSTR_MASK),
            STR8 => usize::from(self.reader.u8()?),
            STR16 => usize::from(self.reader.u16()?),
            STR32 => self.reader.u32()? as usize,
            _ => return Ok(None),
        }))
    }

    fn bin_len(&mut self, code: u8) -> Result<Option<usize>> {
        Ok(Some(match code {
            BIN8 => usize::from(self.reader.u8()?),
            BIN16 => usize::from(self.reader.u16()?),
            BIN32 => self.reader.u32()? as usize,
            _ => return Ok(None),
        }))
    }

    fn ext_len(&mut self, code: u8) -> Result<Option<usize>> {
        Ok(Some(match code {
            FIXEXT1 => 1,
            FIXEXT2 => 2,
            FIXEXT4 => 4,
            FIXEXT8 => 8,
            FIXEXT16 => 16,
            EXT8 => usize::from(self.reader.u8()?),
            EXT16 => usize::from(self.reader.u16()?),
            EXT32 => self.reader.u32()? as usize,
            _ => return Ok(None),
        }))
    }

    /// Reads a dictionary reference whose ext header was already consumed.
    fn resolve_interned(&mut self, len: usize) -> Result<String> {
        let idx = match len {
            1 => u32::from(self.reader.u8()?),
            2 => u32::from(self.reader.u16()?),
            4 => self.reader.u32()?,
            _ => {
                return Err(Error::InvalidCode {
                    code: ext_header_code(len),
                    target: "interned string",
                })
            }
        };
        self.dict
            .get(idx as usize)
            .cloned()
            .ok_or(Error::InternIndexOutOfRange(idx))
    }

    fn read_text(&mut self, target: &'static str) -> Result<Text> {
        let code = self.read_code()?;
        if code == NIL {
            return Ok(Text::Nil);
        }
        if let Some(len) = self.str_len(code)? {
            let bytes = self.reader.buf(len)?;
            return Ok(match String::from_utf8(bytes) {
                Ok(s) => {
                    self.remember(&s);
                    Text::Str(s)
                }
                Err(err) => Text::BadStr(err.into_bytes()),
            });
        }
        if let Some(len) = self.bin_len(code)? {
            return Ok(Text::Bin(self.reader.buf(len)?));
        }
        if let Some(len) = self.ext_len(code)? {
            let id = self.reader.i8()?;
            if id == INTERN_EXT_ID {
                return Ok(Text::Str(self.resolve_interned(len)?));
            }
        }
        Err(Self::invalid(code, target))
    }

    /// Decodes a string. bin-framed payloads are accepted when they hold
    /// UTF-8.
    pub fn decode_string(&mut self) -> Result<String> {
        match self.read_text("string")? {
            Text::Nil => Ok(String::new()),
            Text::Str(s) => Ok(s),
            Text::BadStr(_) => Err(Error::InvalidUtf8),
            Text::Bin(b) => String::from_utf8(b).map_err(|_| Error::InvalidUtf8),
        }
    }

    /// Record keys ignore per-field intern tags.
    pub(crate) fn decode_key(&mut self) -> Result<String> {
        let scope = std::mem::replace(&mut self.intern_scope, false);
        let res = self.decode_string();
        self.intern_scope = scope;
        res
    }

    pub(crate) fn with_intern_scope<R>(
        &mut self,
        on: bool,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        let prev = self.intern_scope;
        self.intern_scope = prev || on;
        let res = f(self);
        self.intern_scope = prev;
        res
    }

    /// Decodes a byte string. str-framed payloads are accepted as well.
    pub fn decode_bytes(&mut self) -> Result<Vec<u8>> {
        Ok(match self.read_text("bytes")? {
            Text::Nil => Vec::new(),
            Text::Str(s) => s.into_bytes(),
            Text::BadStr(b) | Text::Bin(b) => b,
        })
    }

    /// Reads an array header; nil yields `None`.
    pub fn decode_array_len(&mut self) -> Result<Option<usize>> {
        let code = self.read_code()?;
        Ok(Some(match code {
            FIXARRAY..=FIXARRAY_MAX => usize::from(code & FIXARRAY_MASK),
            ARRAY16 => usize::from(self.reader.u16()?),
            ARRAY32 => self.reader.u32()? as usize,
            NIL => return Ok(None),
            _ => return Err(Self::invalid(code, "array")),
        }))
    }

    /// Reads a map header; nil yields `None`.
    pub fn decode_map_len(&mut self) -> Result<Option<usize>> {
        let code = self.read_code()?;
        Ok(Some(match code {
            FIXMAP..=FIXMAP_MAX => usize::from(code & FIXMAP_MASK),
            MAP16 => usize::from(self.reader.u16()?),
            MAP32 => self.reader.u32()? as usize,
            NIL => return Ok(None),
            _ => return Err(Self::invalid(code, "map")),
        }))
    }

    /// Reads an extension header and returns `(id, payload length)`.
    pub fn decode_ext_header(&mut self) -> Result<(i8, usize)> {
        let code = self.read_code()?;
        let len = self
            .ext_len(code)?
            .ok_or_else(|| Self::invalid(code, "ext"))?;
        Ok((self.reader.i8()?, len))
    }

    /// Reads a whole extension record without interpreting it.
    pub fn decode_ext(&mut self) -> Result<(i8, Vec<u8>)> {
        let (id, len) = self.decode_ext_header()?;
        Ok((id, self.reader.buf(len)?))
    }

    /// Decodes any value into a [`Value`].
    pub fn decode_dynamic(&mut self) -> Result<Value> {
        let code = self.peek_code()?;
        match Family::of(code) {
            Family::Nil => {
                self.read_code()?;
                Ok(Value::Nil)
            }
            Family::Bool => Ok(Value::Bool(self.decode_bool()?)),
            Family::Int | Family::Uint => {
                self.read_code()?;
                match self.int_payload(code)? {
                    Some(Int::Signed(v)) => Ok(Value::Integer(v)),
                    Some(Int::Unsigned(v)) if code <= POS_FIXINT_MAX => {
                        Ok(Value::Integer(v as i64))
                    }
                    Some(Int::Unsigned(v)) => Ok(Value::UInteger(v)),
                    None => Err(Self::invalid(code, "value")),
                }
            }
            Family::Float if code == FLOAT => {
                self.read_code()?;
                Ok(Value::Float32(self.reader.f32()?))
            }
            Family::Float => {
                self.read_code()?;
                Ok(Value::Float(self.reader.f64()?))
            }
            Family::Str | Family::Bin => Ok(match self.read_text("value")? {
                Text::Nil => Value::Nil,
                Text::Str(s) => Value::Str(s),
                Text::BadStr(b) | Text::Bin(b) => Value::Bytes(b),
            }),
            Family::Array => self.nested(|dec| {
                let len = dec.decode_array_len()?.unwrap_or(0);
                let mut items = Vec::with_capacity(len.min(MAX_PREALLOC_ITEMS));
                for _ in 0..len {
                    items.push(dec.decode_dynamic()?);
                }
                Ok(Value::Array(items))
            }),
            Family::Map => self.nested(|dec| match dec.opts.custom_map_decoder {
                Some(hook) => hook(dec),
                None => dec.decode_dynamic_map(),
            }),
            Family::Ext => {
                let (id, len) = self.decode_ext_header()?;
                if id == INTERN_EXT_ID {
                    return Ok(Value::Str(self.resolve_interned(len)?));
                }
                let entry = self.registry.entry(id).ok_or(Error::UnregisteredExt(id))?;
                let data = self.reader.buf(len)?;
                let decoded = entry.decode_payload(&data)?;
                Ok(Value::Extension(ExtValue::with_decoded(id, data, Arc::from(decoded))))
            }
            Family::Unknown => Err(Error::UnknownCode(code)),
        }
    }

    /// Default construction of a dynamic map: keys and values are both
    /// [`Value`]s. Keys that are maps or arrays are rejected.
    pub fn decode_dynamic_map(&mut self) -> Result<Value> {
        let len = self.decode_map_len()?.unwrap_or(0);
        let mut pairs = Vec::with_capacity(len.min(MAX_PREALLOC_ITEMS));
        for _ in 0..len {
            let key_code = self.peek_code()?;
            match Family::of(key_code) {
                Family::Map => return Err(Error::UnsupportedMapKey("map")),
                Family::Array => return Err(Error::UnsupportedMapKey("array")),
                _ => {}
            }
            let key = self.decode_dynamic()?;
            let value = self.decode_dynamic()?;
            pairs.push((key, value));
        }
        Ok(Value::Map(pairs))
    }

    /// Consumes exactly one value without building it.
    pub fn skip(&mut self) -> Result<()> {
        let code = self.read_code()?;
        match code {
            0x00..=POS_FIXINT_MAX | NEG_FIXINT_MIN..=0xff | NIL | FALSE | TRUE => Ok(()),
            FIXMAP..=FIXMAP_MAX => self.skip_pairs(usize::from(code & FIXMAP_MASK)),
            FIXARRAY..=FIXARRAY_MAX => self.skip_items(usize::from(code & FIXARRAY_MASK)),
            FIXSTR..=FIXSTR_MAX | STR8 | STR16 | STR32 => {
                let len = self.str_len(code)?.unwrap_or(0);
                self.skip_str(len)
            }
            BIN8 | BIN16 | BIN32 => {
                let len = self.bin_len(code)?.unwrap_or(0);
                Ok(self.reader.skip(len)?)
            }
            FIXEXT1..=FIXEXT16 | EXT8 | EXT16 | EXT32 => {
                let len = self.ext_len(code)?.unwrap_or(0);
                Ok(self.reader.skip(1 + len)?)
            }
            UINT8 | INT8 => Ok(self.reader.skip(1)?),
            UINT16 | INT16 => Ok(self.reader.skip(2)?),
            FLOAT | UINT32 | INT32 => Ok(self.reader.skip(4)?),
            DOUBLE | UINT64 | INT64 => Ok(self.reader.skip(8)?),
            ARRAY16 => {
                let len = usize::from(self.reader.u16()?);
                self.skip_items(len)
            }
            ARRAY32 => {
                let len = self.reader.u32()? as usize;
                self.skip_items(len)
            }
            MAP16 => {
                let len = usize::from(self.reader.u16()?);
                self.skip_pairs(len)
            }
            MAP32 => {
                let len = self.reader.u32()? as usize;
                self.skip_pairs(len)
            }
            UNUSED => Err(Error::UnknownCode(code)),
        }
    }

    fn skip_items(&mut self, len: usize) -> Result<()> {
        self.nested(|dec| {
            for _ in 0..len {
                dec.skip()?;
            }
            Ok(())
        })
    }

    fn skip_pairs(&mut self, len: usize) -> Result<()> {
        self.nested(|dec| {
            for _ in 0..len {
                dec.skip()?;
                dec.skip()?;
            }
            Ok(())
        })
    }

    /// Skipped strings still feed the dictionary so later references resolve.
    fn skip_str(&mut self, len: usize) -> Result<()> {
        if self.interning() && len >= MIN_INTERN_LEN {
            let bytes = self.reader.buf(len)?;
            if let Ok(s) = std::str::from_utf8(&bytes) {
                self.remember(s);
            }
            return Ok(());
        }
        Ok(self.reader.skip(len)?)
    }

    /// Captures the bytes of exactly one value.
    ///
    /// Strings inside the value still feed the dictionary, as with
    /// [`Decoder::skip`]. Interned references are captured as written.
    pub fn decode_raw(&mut self) -> Result<RawMessage> {
        self.reader.start_capture();
        let res = self.skip();
        let bytes = self.reader.take_capture();
        res?;
        Ok(RawMessage::new(bytes))
    }
}

fn signed_name(width: Width) -> &'static str {
    match width {
        Width::W8 => "i8",
        Width::W16 => "i16",
        Width::W32 => "i32",
        Width::W64 => "i64",
    }
}

fn unsigned_name(width: Width) -> &'static str {
    match width {
        Width::W8 => "u8",
        Width::W16 => "u16",
        Width::W32 => "u32",
        Width::W64 => "u64",
    }
}

fn ext_header_code(len: usize) -> u8 {
    crate::ext::ext_header(len).0
}
