//! Streaming MessagePack encoder.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use packstream_buffers::Writer;
use tracing::trace;

use crate::codec::{AnyEncode, Encode};
use crate::codes::*;
use crate::decoder::Decoder;
use crate::error::{Direction, Error, Result};
use crate::ext::{ext_header, ExtRegistry, INTERN_EXT_ID};
use crate::options::{DecoderOptions, EncoderOptions};

/// Strings shorter than this are never interned.
pub const MIN_INTERN_LEN: usize = 3;
/// Upper bound on the interned-string dictionary.
pub const MAX_DICT_LEN: usize = 65_535;

/// Pending output above this size is handed to the sink mid-value.
const HIGH_WATER: usize = 8 * 1024;

fn len_u32(len: usize, kind: &'static str) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::Unsupported {
        kind,
        direction: Direction::Encode,
    })
}

/// Writes MessagePack values to a [`Write`] sink or to memory.
///
/// Output is staged in a [`Writer`] and handed to the sink once a top-level
/// value is complete, or earlier for large values.
///
/// ```
/// use packstream::Encoder;
///
/// let mut out = Vec::new();
/// let mut enc = Encoder::new(&mut out);
/// enc.encode_value(&vec![1u32, 300]).unwrap();
/// drop(enc);
/// assert_eq!(out, [0x92, 0x01, 0xcd, 0x01, 0x2c]);
/// ```
pub struct Encoder<'a> {
    sink: Option<Box<dyn Write + 'a>>,
    writer: Writer,
    depth: usize,
    opts: EncoderOptions,
    registry: Arc<ExtRegistry>,
    dict: HashMap<String, u32>,
    slots: Vec<String>,
    intern_scope: bool,
}

impl<'a> Encoder<'a> {
    pub fn new<W: Write + 'a>(sink: W) -> Self {
        Self::with_options(sink, EncoderOptions::default())
    }

    pub fn with_options<W: Write + 'a>(sink: W, opts: EncoderOptions) -> Self {
        Self::build(Some(Box::new(sink)), opts)
    }

    /// An encoder that keeps its output in memory.
    pub fn buffered() -> Self {
        Self::buffered_with(EncoderOptions::default())
    }

    pub fn buffered_with(opts: EncoderOptions) -> Self {
        Self::build(None, opts)
    }

    fn build(sink: Option<Box<dyn Write + 'a>>, opts: EncoderOptions) -> Self {
        let registry = opts
            .registry
            .clone()
            .unwrap_or_else(|| ExtRegistry::global().clone());
        Self {
            sink,
            writer: Writer::new(),
            depth: 0,
            opts,
            registry,
            dict: HashMap::new(),
            slots: Vec::new(),
            intern_scope: false,
        }
    }

    pub fn options(&self) -> &EncoderOptions {
        &self.opts
    }

    /// Points the encoder at a new sink and clears the dictionary.
    pub fn reset<W: Write + 'a>(&mut self, sink: W) {
        self.sink = Some(Box::new(sink));
        self.writer.clear();
        self.depth = 0;
        self.intern_scope = false;
        self.dict.clear();
        self.slots.clear();
        trace!("encoder reset");
    }

    /// Replaces the dictionary with `seed`, keeping index positions.
    ///
    /// A repeated seed entry still occupies its slot; lookups resolve to its
    /// first index. Entries past [`MAX_DICT_LEN`] are dropped.
    pub fn reset_dictionary<I, S>(&mut self, seed: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dict.clear();
        self.slots = seed.into_iter().take(MAX_DICT_LEN).map(Into::into).collect();
        for (idx, s) in self.slots.iter().enumerate() {
            self.dict.entry(s.clone()).or_insert(idx as u32);
        }
        trace!(entries = self.slots.len(), "encoder dictionary reset");
    }

    /// Interned strings in index order.
    pub fn dictionary(&self) -> &[String] {
        &self.slots
    }

    /// Writes pending bytes to the sink and flushes it.
    pub fn flush(&mut self) -> Result<()> {
        self.drain()?;
        if let Some(sink) = self.sink.as_mut() {
            sink.flush()?;
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        if let Some(sink) = self.sink.as_mut() {
            self.writer.write_to(sink.as_mut())?;
        }
        Ok(())
    }

    #[inline]
    fn commit(&mut self) -> Result<()> {
        if self.depth == 0 || self.writer.len() >= HIGH_WATER {
            self.drain()?;
        }
        Ok(())
    }

    /// Consumes the encoder and returns the bytes not yet handed to a sink.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.writer.flush()
    }

    /// Returns the bytes not yet handed to a sink.
    pub fn take_bytes(&mut self) -> Vec<u8> {
        self.writer.flush()
    }

    /// Encodes `value`, framing it as an extension when its type is
    /// registered.
    pub fn encode_value<T: Encode + 'static>(&mut self, value: &T) -> Result<()> {
        self.depth += 1;
        let res = match self.registry.entry_for_type(TypeId::of::<T>()) {
            Some(entry) => entry
                .encode_payload(value)
                .and_then(|payload| self.write_ext(entry.id, &payload)),
            None => value.encode(self),
        };
        self.depth -= 1;
        res?;
        self.commit()
    }

    /// Encodes each value in order, stopping at the first failure.
    pub fn encode_many(&mut self, values: &[&dyn AnyEncode]) -> Result<()> {
        for value in values {
            value.encode_dyn(self)?;
        }
        Ok(())
    }

    /// Encodes `value` through its extension registration.
    ///
    /// Meant for hand-written [`Encode`] impls of registered types.
    pub fn encode_registered<T: Any>(&mut self, value: &T) -> Result<()> {
        let entry = self
            .registry
            .entry_for_type(TypeId::of::<T>())
            .ok_or(Error::UnregisteredType(type_name::<T>()))?;
        let payload = entry.encode_payload(value)?;
        self.write_ext(entry.id, &payload)?;
        self.commit()
    }

    pub fn encode_nil(&mut self) -> Result<()> {
        self.writer.u8(NIL);
        self.commit()
    }

    pub fn encode_bool(&mut self, v: bool) -> Result<()> {
        self.writer.u8(if v { TRUE } else { FALSE });
        self.commit()
    }

    /// Encodes a signed integer in the narrowest form.
    ///
    /// Non-negative values use the unsigned families.
    pub fn encode_int(&mut self, v: i64) -> Result<()> {
        if v >= 0 {
            return self.encode_uint(v as u64);
        }
        if v >= -32 {
            self.writer.i8(v as i8);
        } else if v >= i64::from(i8::MIN) {
            self.writer.u8(INT8);
            self.writer.i8(v as i8);
        } else if v >= i64::from(i16::MIN) {
            self.writer.u8(INT16);
            self.writer.i16(v as i16);
        } else if v >= i64::from(i32::MIN) {
            self.writer.u8(INT32);
            self.writer.i32(v as i32);
        } else {
            self.writer.u8(INT64);
            self.writer.i64(v);
        }
        self.commit()
    }

    /// Encodes an unsigned integer in the narrowest form.
    pub fn encode_uint(&mut self, v: u64) -> Result<()> {
        if v <= u64::from(POS_FIXINT_MAX) {
            self.writer.u8(v as u8);
        } else if v <= u64::from(u8::MAX) {
            self.writer.u8u8(UINT8, v as u8);
        } else if v <= u64::from(u16::MAX) {
            self.writer.u8u16(UINT16, v as u16);
        } else if v <= u64::from(u32::MAX) {
            self.writer.u8u32(UINT32, v as u32);
        } else {
            self.writer.u8u64(UINT64, v);
        }
        self.commit()
    }

    /// Always emits the `Int<w>` code for `width`.
    pub fn encode_int_width(&mut self, v: i64, width: Width) -> Result<()> {
        match width {
            Width::W8 => {
                let v = i8::try_from(v).map_err(|_| Error::Overflow("i8"))?;
                self.writer.u8(INT8);
                self.writer.i8(v);
            }
            Width::W16 => {
                let v = i16::try_from(v).map_err(|_| Error::Overflow("i16"))?;
                self.writer.u8(INT16);
                self.writer.i16(v);
            }
            Width::W32 => {
                let v = i32::try_from(v).map_err(|_| Error::Overflow("i32"))?;
                self.writer.u8(INT32);
                self.writer.i32(v);
            }
            Width::W64 => {
                self.writer.u8(INT64);
                self.writer.i64(v);
            }
        }
        self.commit()
    }

    /// Always emits the `Uint<w>` code for `width`.
    pub fn encode_uint_width(&mut self, v: u64, width: Width) -> Result<()> {
        match width {
            Width::W8 => {
                let v = u8::try_from(v).map_err(|_| Error::Overflow("u8"))?;
                self.writer.u8u8(UINT8, v);
            }
            Width::W16 => {
                let v = u16::try_from(v).map_err(|_| Error::Overflow("u16"))?;
                self.writer.u8u16(UINT16, v);
            }
            Width::W32 => {
                let v = u32::try_from(v).map_err(|_| Error::Overflow("u32"))?;
                self.writer.u8u32(UINT32, v);
            }
            Width::W64 => self.writer.u8u64(UINT64, v),
        }
        self.commit()
    }

    pub fn encode_float32(&mut self, v: f32) -> Result<()> {
        self.writer.u8f32(FLOAT, v);
        self.commit()
    }

    pub fn encode_float64(&mut self, v: f64) -> Result<()> {
        self.writer.u8f64(DOUBLE, v);
        self.commit()
    }

    /// Encodes a string, interning it when interning applies.
    pub fn encode_string(&mut self, s: &str) -> Result<()> {
        if self.interning() && s.len() >= MIN_INTERN_LEN {
            self.write_interned(s)?;
        } else {
            self.write_str(s)?;
        }
        self.commit()
    }

    /// Record keys ignore per-field intern tags.
    pub(crate) fn encode_key(&mut self, key: &str) -> Result<()> {
        let scope = std::mem::replace(&mut self.intern_scope, false);
        let res = self.encode_string(key);
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

    #[inline]
    fn interning(&self) -> bool {
        self.opts.use_interned_strings || self.intern_scope
    }

    fn write_interned(&mut self, s: &str) -> Result<()> {
        if let Some(&idx) = self.dict.get(s) {
            self.write_intern_ref(idx);
            return Ok(());
        }
        if self.slots.len() < MAX_DICT_LEN {
            let idx = self.slots.len() as u32;
            self.dict.insert(s.to_owned(), idx);
            self.slots.push(s.to_owned());
        } else {
            trace!(len = s.len(), "intern dictionary full");
        }
        self.write_str(s)
    }

    fn write_intern_ref(&mut self, idx: u32) {
        let id = INTERN_EXT_ID as u8;
        if idx <= u32::from(u8::MAX) {
            self.writer.u8u8(FIXEXT1, id);
            self.writer.u8(idx as u8);
        } else if idx <= u32::from(u16::MAX) {
            self.writer.u8u8(FIXEXT2, id);
            self.writer.u16(idx as u16);
        } else {
            self.writer.u8u8(FIXEXT4, id);
            self.writer.u32(idx);
        }
    }

    fn write_str(&mut self, s: &str) -> Result<()> {
        let len = s.len();
        if len <= usize::from(FIXSTR_MASK) {
            self.writer.u8(FIXSTR | len as u8);
        } else if len <= usize::from(u8::MAX) {
            self.writer.u8u8(STR8, len as u8);
        } else if len <= usize::from(u16::MAX) {
            self.writer.u8u16(STR16, len as u16);
        } else {
            self.writer.u8u32(STR32, len_u32(len, "str longer than u32::MAX")?);
        }
        self.writer.utf8(s);
        Ok(())
    }

    pub fn encode_bytes(&mut self, b: &[u8]) -> Result<()> {
        let len = b.len();
        if len <= usize::from(u8::MAX) {
            self.writer.u8u8(BIN8, len as u8);
        } else if len <= usize::from(u16::MAX) {
            self.writer.u8u16(BIN16, len as u16);
        } else {
            self.writer.u8u32(BIN32, len_u32(len, "bin longer than u32::MAX")?);
        }
        self.writer.buf(b);
        self.commit()
    }

    pub fn encode_array_len(&mut self, len: usize) -> Result<()> {
        if len <= usize::from(FIXARRAY_MASK) {
            self.writer.u8(FIXARRAY | len as u8);
        } else if len <= usize::from(u16::MAX) {
            self.writer.u8u16(ARRAY16, len as u16);
        } else {
            self.writer
                .u8u32(ARRAY32, len_u32(len, "array longer than u32::MAX")?);
        }
        self.commit()
    }

    pub fn encode_map_len(&mut self, len: usize) -> Result<()> {
        if len <= usize::from(FIXMAP_MASK) {
            self.writer.u8(FIXMAP | len as u8);
        } else if len <= usize::from(u16::MAX) {
            self.writer.u8u16(MAP16, len as u16);
        } else {
            self.writer.u8u32(MAP32, len_u32(len, "map longer than u32::MAX")?);
        }
        self.commit()
    }

    /// Writes an extension record, choosing fixext framing when the payload
    /// length allows it.
    pub fn encode_ext(&mut self, id: i8, payload: &[u8]) -> Result<()> {
        self.write_ext(id, payload)?;
        self.commit()
    }

    fn write_ext(&mut self, id: i8, payload: &[u8]) -> Result<()> {
        let len = payload.len();
        match ext_header(len) {
            (code, 0) => self.writer.u8(code),
            (code, 1) => self.writer.u8u8(code, len as u8),
            (code, 2) => self.writer.u8u16(code, len as u16),
            (code, _) => self
                .writer
                .u8u32(code, len_u32(len, "ext longer than u32::MAX")?),
        }
        self.writer.i8(id);
        self.writer.buf(payload);
        Ok(())
    }

    /// Copies pre-encoded bytes verbatim.
    ///
    /// While interning, the plain strings inside `bytes` enter the
    /// dictionary just as a reader skipping or capturing them records them.
    /// Interned references inside `bytes` are copied as they are, so they
    /// must refer to this stream's dictionary.
    pub fn encode_raw(&mut self, bytes: &[u8]) -> Result<()> {
        if self.interning() {
            self.learn_strings(bytes)?;
        }
        self.writer.buf(bytes);
        self.commit()
    }

    fn learn_strings(&mut self, bytes: &[u8]) -> Result<()> {
        let opts = DecoderOptions::default().use_interned_strings(true);
        let mut scan = Decoder::from_slice_with(bytes, opts);
        while scan.position() < bytes.len() as u64 {
            scan.skip()?;
        }
        for s in scan.dictionary() {
            if self.slots.len() >= MAX_DICT_LEN {
                trace!(len = s.len(), "intern dictionary full");
                break;
            }
            let idx = self.slots.len() as u32;
            self.dict.entry(s.clone()).or_insert(idx);
            self.slots.push(s.clone());
        }
        Ok(())
    }
}
