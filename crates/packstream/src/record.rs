//! Struct mapper: named records encoded as maps (or positional arrays).
//!
//! Each [`Record`] type describes its fields once through a
//! [`RecordBuilder`]. The resulting [`FieldTable`] is cached per type for
//! the life of the process. `#[derive(Record)]` writes the description; a
//! hand-written one looks like this:
//!
//! ```
//! use packstream::record::{decode_record, encode_record, Record, RecordBuilder};
//! use packstream::{Decode, Decoder, Encode, Encoder, Result};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Point {
//!     x: i32,
//!     y: i32,
//! }
//!
//! impl Record for Point {
//!     fn describe(table: &mut RecordBuilder<Self>) {
//!         table
//!             .field::<i32>("x", "", |p| &p.x, |p| &mut p.x)
//!             .field::<i32>("y", ",omitempty", |p| &p.y, |p| &mut p.y);
//!     }
//! }
//!
//! impl Encode for Point {
//!     fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
//!         encode_record(self, enc)
//!     }
//! }
//!
//! impl Decode for Point {
//!     fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
//!         decode_record(dec)
//!     }
//! }
//!
//! let bytes = packstream::to_vec(&Point { x: 1, y: 0 }).unwrap();
//! assert_eq!(bytes, [0x81, 0xa1, b'x', 0x01]);
//! ```

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::debug;

use crate::codec::{Decode, Encode};
use crate::codes::{is_array, NIL};
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{Error, Result};
use crate::ext::ExtRegistry;

/// A struct with a described field layout.
pub trait Record: Default + 'static {
    fn describe(table: &mut RecordBuilder<Self>);
}

/// Parsed `name,opt,opt` tag string.
///
/// An empty name means "use the declared name"; a lone `-` excludes the
/// field. Unknown options are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldTag {
    pub name: Option<String>,
    pub skip: bool,
    pub omit_empty: bool,
    pub intern: bool,
    pub as_array: bool,
}

impl FieldTag {
    pub fn parse(tag: &str) -> FieldTag {
        let mut parts = tag.split(',');
        let name = parts.next().unwrap_or_default();
        let mut out = FieldTag::default();
        if tag == "-" {
            out.skip = true;
            return out;
        }
        if !name.is_empty() {
            out.name = Some(name.to_owned());
        }
        for opt in parts {
            match opt.trim() {
                "omitempty" => out.omit_empty = true,
                "intern" => out.intern = true,
                "asArray" => out.as_array = true,
                _ => {}
            }
        }
        out
    }
}

type EncodeField<S> = dyn Fn(&S, &mut Encoder<'_>) -> Result<()> + Send + Sync;
type DecodeField<S> = dyn Fn(&mut S, &mut Decoder<'_>) -> Result<()> + Send + Sync;
type EmptyField<S> = dyn Fn(&S) -> bool + Send + Sync;

/// One named field of a record, possibly reached through inlined records.
pub struct FieldDescriptor<S> {
    name: String,
    path: Vec<usize>,
    omit_empty: bool,
    intern: bool,
    encode: Arc<EncodeField<S>>,
    decode: Arc<DecodeField<S>>,
    is_empty: Arc<EmptyField<S>>,
}

impl<S> FieldDescriptor<S> {
    /// External name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declaration indices from the outer record down to this field.
    pub fn path(&self) -> &[usize] {
        &self.path
    }

    pub fn omit_empty(&self) -> bool {
        self.omit_empty
    }

    pub fn intern(&self) -> bool {
        self.intern
    }
}

/// Collects field descriptions for a record type.
pub struct RecordBuilder<S> {
    fields: Vec<FieldDescriptor<S>>,
    tag: FieldTag,
    private_state: bool,
    next_index: usize,
}

impl<S: 'static> RecordBuilder<S> {
    fn new() -> Self {
        Self {
            fields: Vec::new(),
            tag: FieldTag::default(),
            private_state: false,
            next_index: 0,
        }
    }

    fn claim_index(&mut self) -> usize {
        let idx = self.next_index;
        self.next_index += 1;
        idx
    }

    /// Adds a field. `tag` follows the `name,opt,opt` grammar.
    pub fn field<T>(
        &mut self,
        declared: &str,
        tag: &str,
        get: fn(&S) -> &T,
        get_mut: fn(&mut S) -> &mut T,
    ) -> &mut Self
    where
        T: Encode + Decode + 'static,
    {
        let idx = self.claim_index();
        let tag = FieldTag::parse(tag);
        if tag.skip {
            return self;
        }
        self.fields.push(FieldDescriptor {
            name: tag.name.unwrap_or_else(|| declared.to_owned()),
            path: vec![idx],
            omit_empty: tag.omit_empty,
            intern: tag.intern,
            encode: Arc::new(move |s: &S, enc: &mut Encoder<'_>| enc.encode_value(get(s))),
            decode: Arc::new(move |s: &mut S, dec: &mut Decoder<'_>| {
                *get_mut(s) = dec.decode_value::<T>()?;
                Ok(())
            }),
            is_empty: Arc::new(move |s: &S| get(s).is_empty_value()),
        });
        self
    }

    /// Splices the fields of an embedded record into this one.
    ///
    /// An explicit tag name, or an extension registration for `T`, keeps it
    /// as a single named field instead.
    pub fn inline<T>(
        &mut self,
        declared: &str,
        tag: &str,
        get: fn(&S) -> &T,
        get_mut: fn(&mut S) -> &mut T,
    ) -> &mut Self
    where
        T: Record + Encode + Decode,
    {
        let parsed = FieldTag::parse(tag);
        let registered = ExtRegistry::global()
            .entry_for_type(TypeId::of::<T>())
            .is_some();
        if parsed.skip || parsed.name.is_some() || registered {
            return self.field(declared, tag, get, get_mut);
        }
        let idx = self.claim_index();
        let mut inner = RecordBuilder::<T>::new();
        T::describe(&mut inner);
        self.private_state |= inner.private_state;
        for field in resolve(inner.fields) {
            let encode = field.encode;
            let decode = field.decode;
            let is_empty = field.is_empty;
            let mut path = Vec::with_capacity(field.path.len() + 1);
            path.push(idx);
            path.extend_from_slice(&field.path);
            self.fields.push(FieldDescriptor {
                name: field.name,
                path,
                omit_empty: field.omit_empty,
                intern: field.intern,
                encode: Arc::new(move |s: &S, enc: &mut Encoder<'_>| encode(get(s), enc)),
                decode: Arc::new(move |s: &mut S, dec: &mut Decoder<'_>| decode(get_mut(s), dec)),
                is_empty: Arc::new(move |s: &S| is_empty(get(s))),
            });
        }
        self
    }

    /// Record-level options, e.g. `",asArray"` or `",omitempty"`.
    pub fn record_tag(&mut self, tag: &str) -> &mut Self {
        self.tag = FieldTag::parse(tag);
        self
    }

    /// Marks the record as holding fields outside the table. Such records
    /// are never empty.
    pub fn private_state(&mut self) -> &mut Self {
        self.private_state = true;
        self
    }
}

/// Drops names hidden by a shallower field with the same name.
fn resolve<S>(fields: Vec<FieldDescriptor<S>>) -> Vec<FieldDescriptor<S>> {
    let mut winner: HashMap<String, (usize, usize)> = HashMap::new();
    for (pos, field) in fields.iter().enumerate() {
        let depth = field.path.len();
        winner
            .entry(field.name.clone())
            .and_modify(|best| {
                if depth < best.1 {
                    *best = (pos, depth);
                }
            })
            .or_insert((pos, depth));
    }
    fields
        .into_iter()
        .enumerate()
        .filter(|(pos, field)| winner.get(&field.name).map(|w| w.0) == Some(*pos))
        .map(|(_, field)| field)
        .collect()
}

/// Resolved field layout of a record type.
pub struct FieldTable<S> {
    record: &'static str,
    fields: Vec<FieldDescriptor<S>>,
    index: HashMap<String, usize>,
    as_array: bool,
    omit_all: bool,
    private_state: bool,
}

impl<S: Record> FieldTable<S> {
    fn build() -> Self {
        let mut builder = RecordBuilder::<S>::new();
        S::describe(&mut builder);
        let fields = resolve(builder.fields);
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        debug!(
            record = type_name::<S>(),
            fields = fields.len(),
            as_array = builder.tag.as_array,
            "built field table"
        );
        Self {
            record: type_name::<S>(),
            fields,
            index,
            as_array: builder.tag.as_array,
            omit_all: builder.tag.omit_empty,
            private_state: builder.private_state,
        }
    }

    pub fn fields(&self) -> &[FieldDescriptor<S>] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor<S>> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn as_array(&self) -> bool {
        self.as_array
    }

    fn omittable(&self, field: &FieldDescriptor<S>, omit_default: bool) -> bool {
        field.omit_empty || self.omit_all || omit_default
    }

    fn required(&self, field: &FieldDescriptor<S>) -> bool {
        !(field.omit_empty || self.omit_all)
    }
}

type TableCache = RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>;

fn table_cache() -> &'static TableCache {
    static CACHE: OnceLock<TableCache> = OnceLock::new();
    CACHE.get_or_init(Default::default)
}

/// The cached field table for `S`, built on first use.
pub fn field_table<S: Record>() -> Arc<FieldTable<S>> {
    let key = TypeId::of::<S>();
    let cached = table_cache().read().get(&key).cloned();
    if let Some(table) = cached.and_then(|t| t.downcast::<FieldTable<S>>().ok()) {
        return table;
    }
    let built = Arc::new(FieldTable::<S>::build());
    let mut cache = table_cache().write();
    let entry = cache
        .entry(key)
        .or_insert_with(|| built.clone() as Arc<dyn Any + Send + Sync>)
        .clone();
    entry.downcast::<FieldTable<S>>().unwrap_or(built)
}

/// Writes `value` as a map of its non-omitted fields, or as an array when
/// the record is tagged `asArray`.
///
/// The array form keeps positions, so only a trailing run of empty
/// omittable fields is dropped from it.
pub fn encode_record<S: Record>(value: &S, enc: &mut Encoder<'_>) -> Result<()> {
    let table = field_table::<S>();
    let omit_default = enc.options().omit_empty_default;
    let omitted =
        |field: &FieldDescriptor<S>| table.omittable(field, omit_default) && (field.is_empty)(value);

    if table.as_array {
        let mut len = table.fields.len();
        while len > 0 && omitted(&table.fields[len - 1]) {
            len -= 1;
        }
        enc.encode_array_len(len)?;
        for field in &table.fields[..len] {
            enc.with_intern_scope(field.intern, |enc| (field.encode)(value, enc))?;
        }
        return Ok(());
    }

    let keep: Vec<&FieldDescriptor<S>> = table.fields.iter().filter(|&f| !omitted(f)).collect();
    enc.encode_map_len(keep.len())?;
    for field in keep {
        enc.encode_key(&field.name)?;
        enc.with_intern_scope(field.intern, |enc| (field.encode)(value, enc))?;
    }
    Ok(())
}

/// Reads a record from either the map or the array form. Unknown keys and
/// surplus elements are skipped; nil yields `S::default()`.
pub fn decode_record<S: Record>(dec: &mut Decoder<'_>) -> Result<S> {
    dec.nested(read_record::<S>)
}

fn read_record<S: Record>(dec: &mut Decoder<'_>) -> Result<S> {
    let table = field_table::<S>();
    let mut out = S::default();
    let code = dec.peek_code()?;
    if code == NIL {
        dec.decode_nil()?;
        return Ok(out);
    }

    let mut seen = vec![false; table.fields.len()];
    if is_array(code) {
        let len = dec.decode_array_len()?.unwrap_or(0);
        for i in 0..len {
            match table.fields.get(i) {
                Some(field) => {
                    dec.with_intern_scope(field.intern, |dec| (field.decode)(&mut out, dec))?;
                    seen[i] = true;
                }
                None => dec.skip()?,
            }
        }
    } else {
        let len = dec.decode_map_len()?.unwrap_or(0);
        for _ in 0..len {
            let key = dec.decode_key()?;
            match table.index.get(key.as_str()) {
                Some(&i) => {
                    let field = &table.fields[i];
                    dec.with_intern_scope(field.intern, |dec| (field.decode)(&mut out, dec))?;
                    seen[i] = true;
                }
                None => dec.skip()?,
            }
        }
    }

    if dec.options().strict_mode {
        let missing = table
            .fields
            .iter()
            .zip(&seen)
            .find(|(field, present)| !**present && table.required(field));
        if let Some((field, _)) = missing {
            return Err(Error::MissingRequiredField {
                record: table.record,
                name: field.name.clone(),
            });
        }
    }
    Ok(out)
}

/// Whether every field of `value` is empty. Records with private state are
/// never empty.
pub fn is_empty_record<S: Record>(value: &S) -> bool {
    let table = field_table::<S>();
    !table.private_state && table.fields.iter().all(|field| (field.is_empty)(value))
}
