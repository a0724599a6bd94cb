//! packstream - a streaming MessagePack codec.
//!
//! Values are written by [`Encoder`] and read by [`Decoder`], each owning one
//! stream. A type's [`Encode`] / [`Decode`] impls pick its wire form; records
//! get theirs from `#[derive(Record)]`. Types registered in an
//! [`ExtRegistry`] travel as extension records, and repeated strings can be
//! interned into per-stream dictionary references (ext id `-128`).
//!
//! ```
//! use packstream::{from_slice, to_vec, Record};
//!
//! #[derive(Debug, Default, PartialEq, Record)]
//! pub struct Greeting {
//!     #[msgpack(tag = "Foo")]
//!     pub foo: String,
//!     #[msgpack(tag = ",omitempty")]
//!     pub count: u32,
//! }
//!
//! let g = Greeting { foo: "bar".into(), count: 0 };
//! let bytes = to_vec(&g).unwrap();
//! assert_eq!(bytes, b"\x81\xa3Foo\xa3bar");
//! assert_eq!(from_slice::<Greeting>(&bytes).unwrap(), g);
//! ```

extern crate self as packstream;

pub mod codec;
pub mod codes;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod ext;
pub mod marshal;
pub mod options;
pub mod raw;
pub mod record;
pub mod util;
pub mod value;

pub use codec::{AnyDecode, AnyEncode, Decode, Encode};
pub use codes::Width;
pub use decoder::Decoder;
pub use encoder::{Encoder, MAX_DICT_LEN, MIN_INTERN_LEN};
pub use error::{Direction, Error, Result};
pub use ext::{ExtRegistry, ExtRegistryConfig, INTERN_EXT_ID};
pub use marshal::BinaryMarshal;
pub use options::{DecoderOptions, EncoderOptions, MapDecoderFn, DEFAULT_MAX_DEPTH};
pub use raw::RawMessage;
pub use record::{FieldTag, Record, RecordBuilder};
pub use util::{from_reader, from_slice, from_slice_with, to_vec, to_vec_with, to_writer, validate};
pub use value::{string_keyed_map, ExtValue, Value};

pub use packstream_derive::Record;
