//! Extension type registry.
//!
//! Maps ext ids in `[-128, 127]` to a type plus a pair of payload functions.
//! Readers load an immutable snapshot; writers publish a modified copy, so a
//! lookup never observes a half-updated slot. Id [`INTERN_EXT_ID`] belongs to
//! the interned-string extension and cannot be registered.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::debug;

use crate::codec::{Decode, Encode};
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{Error, Result};
use crate::marshal::BinaryMarshal;

/// Ext id carrying interned-string dictionary references.
pub const INTERN_EXT_ID: i8 = -128;

type EncodeFn = dyn Fn(&dyn Any) -> Result<Vec<u8>> + Send + Sync;
type DecodeFn = dyn Fn(&[u8]) -> Result<Box<dyn Any + Send + Sync>> + Send + Sync;

pub(crate) struct ExtEntry {
    pub(crate) id: i8,
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    encode: Box<EncodeFn>,
    decode: Box<DecodeFn>,
}

impl ExtEntry {
    pub(crate) fn encode_payload(&self, value: &dyn Any) -> Result<Vec<u8>> {
        (self.encode)(value)
    }

    pub(crate) fn decode_payload(&self, payload: &[u8]) -> Result<Box<dyn Any + Send + Sync>> {
        (self.decode)(payload)
    }
}

#[derive(Clone)]
struct ExtTable {
    slots: Vec<Option<Arc<ExtEntry>>>,
    by_type: HashMap<TypeId, i8>,
}

impl ExtTable {
    fn empty() -> Self {
        Self {
            slots: vec![None; 256],
            by_type: HashMap::new(),
        }
    }
}

#[inline]
fn slot(id: i8) -> usize {
    id as u8 as usize
}

/// Registry behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtRegistryConfig {
    /// Fail with [`Error::DuplicateExtId`] instead of overwriting a slot.
    pub reject_overwrites: bool,
}

/// Table of user extension types.
///
/// # Example
///
/// ```
/// use packstream::ExtRegistry;
/// use std::sync::Arc;
///
/// #[derive(Debug, PartialEq)]
/// struct Rgb(u8, u8, u8);
///
/// let registry = Arc::new(ExtRegistry::new());
/// registry
///     .register::<Rgb, _, _>(
///         5,
///         |c| Ok(vec![c.0, c.1, c.2]),
///         |b| Ok(Rgb(b[0], b[1], b[2])),
///     )
///     .unwrap();
/// assert_eq!(registry.id_of::<Rgb>(), Some(5));
/// ```
pub struct ExtRegistry {
    table: ArcSwap<ExtTable>,
    writer: Mutex<()>,
    config: ExtRegistryConfig,
}

impl Default for ExtRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExtRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.load();
        let mut map = f.debug_map();
        for entry in table.slots.iter().flatten() {
            map.entry(&entry.id, &entry.type_name);
        }
        map.finish()
    }
}

impl ExtRegistry {
    pub fn new() -> Self {
        Self::with_config(ExtRegistryConfig::default())
    }

    pub fn with_config(config: ExtRegistryConfig) -> Self {
        Self {
            table: ArcSwap::from_pointee(ExtTable::empty()),
            writer: Mutex::new(()),
            config,
        }
    }

    /// Process-wide registry used by streams without an override.
    pub fn global() -> &'static Arc<ExtRegistry> {
        static GLOBAL: OnceLock<Arc<ExtRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(ExtRegistry::new()))
    }

    pub fn config(&self) -> ExtRegistryConfig {
        self.config
    }

    /// Registers `T` under `id` with explicit payload functions.
    ///
    /// A type maps to a single id: registering it again moves it.
    pub fn register<T, E, D>(&self, id: i8, encode: E, decode: D) -> Result<()>
    where
        T: Send + Sync + 'static,
        E: Fn(&T) -> Result<Vec<u8>> + Send + Sync + 'static,
        D: Fn(&[u8]) -> Result<T> + Send + Sync + 'static,
    {
        let encode_any = move |value: &dyn Any| match value.downcast_ref::<T>() {
            Some(value) => encode(value),
            None => Err(Error::UnregisteredType(type_name::<T>())),
        };
        let decode_any = move |payload: &[u8]| -> Result<Box<dyn Any + Send + Sync>> {
            Ok(Box::new(decode(payload)?))
        };
        self.insert(ExtEntry {
            id,
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            encode: Box::new(encode_any),
            decode: Box::new(decode_any),
        })
    }

    /// Registers `T` with its own MessagePack encoding as the payload.
    pub fn register_codec<T>(&self, id: i8) -> Result<()>
    where
        T: Encode + Decode + Send + Sync + 'static,
    {
        self.register::<T, _, _>(
            id,
            |value| {
                let mut enc = Encoder::buffered();
                value.encode(&mut enc)?;
                Ok(enc.into_bytes())
            },
            |payload| T::decode(&mut Decoder::from_slice(payload)),
        )
    }

    /// Registers `T` with its [`BinaryMarshal`] bytes as the payload.
    pub fn register_binary<T>(&self, id: i8) -> Result<()>
    where
        T: BinaryMarshal + Send + Sync + 'static,
    {
        self.register::<T, _, _>(id, |value| value.marshal_binary(), |payload| {
            T::unmarshal_binary(payload)
        })
    }

    fn insert(&self, entry: ExtEntry) -> Result<()> {
        let id = entry.id;
        if id == INTERN_EXT_ID {
            return Err(Error::ReservedExtId(id));
        }
        let _guard = self.writer.lock();
        let mut next = ExtTable::clone(&self.table.load());
        if let Some(prev) = next.slots[slot(id)].take() {
            if self.config.reject_overwrites {
                return Err(Error::DuplicateExtId(id));
            }
            next.by_type.remove(&prev.type_id);
            debug!(id, previous = prev.type_name, "overwriting ext registration");
        }
        if let Some(old_id) = next.by_type.insert(entry.type_id, id) {
            next.slots[slot(old_id)] = None;
        }
        debug!(id, type_name = entry.type_name, "registered ext type");
        next.slots[slot(id)] = Some(Arc::new(entry));
        self.table.store(Arc::new(next));
        Ok(())
    }

    /// Clears the slot for `id`. Returns whether anything was registered.
    pub fn unregister(&self, id: i8) -> bool {
        let _guard = self.writer.lock();
        let mut next = ExtTable::clone(&self.table.load());
        let Some(prev) = next.slots[slot(id)].take() else {
            return false;
        };
        next.by_type.remove(&prev.type_id);
        self.table.store(Arc::new(next));
        debug!(id, type_name = prev.type_name, "unregistered ext type");
        true
    }

    pub fn is_registered(&self, id: i8) -> bool {
        self.table.load().slots[slot(id)].is_some()
    }

    pub fn id_of<T: 'static>(&self) -> Option<i8> {
        self.table.load().by_type.get(&TypeId::of::<T>()).copied()
    }

    pub fn type_name(&self, id: i8) -> Option<&'static str> {
        self.table.load().slots[slot(id)]
            .as_ref()
            .map(|entry| entry.type_name)
    }

    pub(crate) fn entry(&self, id: i8) -> Option<Arc<ExtEntry>> {
        self.table.load().slots[slot(id)].clone()
    }

    pub(crate) fn entry_for_type(&self, type_id: TypeId) -> Option<Arc<ExtEntry>> {
        let table = self.table.load();
        if table.by_type.is_empty() {
            return None;
        }
        let id = *table.by_type.get(&type_id)?;
        table.slots[slot(id)].clone()
    }
}

/// Header size and code for an ext payload of `len` bytes.
pub(crate) fn ext_header(len: usize) -> (u8, usize) {
    use crate::codes::*;
    match len {
        1 => (FIXEXT1, 0),
        2 => (FIXEXT2, 0),
        4 => (FIXEXT4, 0),
        8 => (FIXEXT8, 0),
        16 => (FIXEXT16, 0),
        0..=0xff => (EXT8, 1),
        0x100..=0xffff => (EXT16, 2),
        _ => (EXT32, 4),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Tagged(u32);

    fn register_tagged(registry: &ExtRegistry, id: i8) -> Result<()> {
        registry.register::<Tagged, _, _>(
            id,
            |t| Ok(t.0.to_be_bytes().to_vec()),
            |b| {
                let raw: [u8; 4] = b.try_into().map_err(|_| Error::custom("bad payload"))?;
                Ok(Tagged(u32::from_be_bytes(raw)))
            },
        )
    }

    #[test]
    fn register_and_lookup() {
        let registry = ExtRegistry::new();
        register_tagged(&registry, 3).unwrap();
        assert!(registry.is_registered(3));
        assert_eq!(registry.id_of::<Tagged>(), Some(3));
        let entry = registry.entry_for_type(TypeId::of::<Tagged>()).unwrap();
        assert_eq!(entry.encode_payload(&Tagged(1)).unwrap(), vec![0, 0, 0, 1]);
        let back = entry.decode_payload(&[0, 0, 1, 0]).unwrap();
        assert_eq!(back.downcast_ref::<Tagged>(), Some(&Tagged(256)));
    }

    #[test]
    fn reserved_id_is_rejected() {
        let registry = ExtRegistry::new();
        assert!(matches!(
            register_tagged(&registry, INTERN_EXT_ID),
            Err(Error::ReservedExtId(-128))
        ));
    }

    #[test]
    fn overwrite_policy() {
        let registry = ExtRegistry::new();
        register_tagged(&registry, 1).unwrap();
        registry
            .register::<String, _, _>(1, |s| Ok(s.as_bytes().to_vec()), |b| {
                Ok(String::from_utf8_lossy(b).into_owned())
            })
            .unwrap();
        assert_eq!(registry.id_of::<Tagged>(), None);
        assert_eq!(registry.id_of::<String>(), Some(1));

        let strict = ExtRegistry::with_config(ExtRegistryConfig {
            reject_overwrites: true,
        });
        register_tagged(&strict, 1).unwrap();
        assert!(matches!(
            register_tagged(&strict, 1),
            Err(Error::DuplicateExtId(1))
        ));
    }

    #[test]
    fn moving_a_type_clears_its_old_slot() {
        let registry = ExtRegistry::new();
        register_tagged(&registry, 1).unwrap();
        register_tagged(&registry, 2).unwrap();
        assert!(!registry.is_registered(1));
        assert_eq!(registry.id_of::<Tagged>(), Some(2));
    }

    #[test]
    fn unregister_clears_slot() {
        let registry = ExtRegistry::new();
        register_tagged(&registry, -5).unwrap();
        assert!(registry.unregister(-5));
        assert!(!registry.unregister(-5));
        assert_eq!(registry.type_name(-5), None);
        assert!(registry.entry_for_type(TypeId::of::<Tagged>()).is_none());
    }

    #[test]
    fn header_selection() {
        use crate::codes::*;
        assert_eq!(ext_header(1), (FIXEXT1, 0));
        assert_eq!(ext_header(16), (FIXEXT16, 0));
        assert_eq!(ext_header(0), (EXT8, 1));
        assert_eq!(ext_header(3), (EXT8, 1));
        assert_eq!(ext_header(255), (EXT8, 1));
        assert_eq!(ext_header(256), (EXT16, 2));
        assert_eq!(ext_header(65536), (EXT32, 4));
    }
}
