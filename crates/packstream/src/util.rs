//! One-shot helpers over a single value.

use std::io::{Read, Write};

use crate::codec::{Decode, Encode};
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{Error, Result};
use crate::options::{DecoderOptions, EncoderOptions};

pub fn to_vec<T: Encode + 'static>(value: &T) -> Result<Vec<u8>> {
    to_vec_with(value, EncoderOptions::default())
}

pub fn to_vec_with<T: Encode + 'static>(value: &T, opts: EncoderOptions) -> Result<Vec<u8>> {
    let mut enc = Encoder::buffered_with(opts);
    enc.encode_value(value)?;
    Ok(enc.into_bytes())
}

/// Encodes `value` into `sink` and flushes it.
pub fn to_writer<W: Write, T: Encode + 'static>(sink: W, value: &T) -> Result<()> {
    let mut enc = Encoder::new(sink);
    enc.encode_value(value)?;
    enc.flush()
}

/// Decodes one value from the start of `data`. Trailing bytes are ignored.
pub fn from_slice<T: Decode + 'static>(data: &[u8]) -> Result<T> {
    from_slice_with(data, DecoderOptions::default())
}

pub fn from_slice_with<T: Decode + 'static>(data: &[u8], opts: DecoderOptions) -> Result<T> {
    Decoder::from_slice_with(data, opts).decode_value()
}

pub fn from_reader<R: Read, T: Decode + 'static>(reader: R) -> Result<T> {
    Decoder::new(reader).decode_value()
}

/// Checks that `data` holds exactly one well-formed value.
pub fn validate(data: &[u8]) -> Result<()> {
    let mut dec = Decoder::from_slice(data);
    dec.skip()?;
    let consumed = dec.position() as usize;
    match data.len() - consumed {
        0 => Ok(()),
        rest => Err(Error::TrailingBytes(rest)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_and_reader() {
        let mut out = Vec::new();
        to_writer(&mut out, &vec!["a".to_string()]).unwrap();
        let back: Vec<String> = from_reader(out.as_slice()).unwrap();
        assert_eq!(back, ["a"]);
    }

    #[test]
    fn validation() {
        assert!(validate(&[0x91, 0xc0]).is_ok());
        assert!(matches!(validate(&[0x91]), Err(Error::UnexpectedEof)));
        assert!(matches!(validate(&[0x01, 0x02]), Err(Error::TrailingBytes(1))));
        assert!(matches!(validate(&[0xc1]), Err(Error::UnknownCode(0xc1))));
    }
}
