use crate::codec::{Decode, Encode};
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::Result;

/// One pre-encoded MessagePack value.
///
/// Encoding copies the bytes verbatim; an empty message encodes as nil.
/// Decoding captures exactly one value from the stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage(Vec<u8>);

impl RawMessage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl Encode for RawMessage {
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
        if self.0.is_empty() {
            return enc.encode_nil();
        }
        enc.encode_raw(&self.0)
    }

    fn is_empty_value(&self) -> bool {
        self.0.is_empty()
    }
}

impl Decode for RawMessage {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.decode_raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{from_slice, to_vec};

    #[test]
    fn nested_raw_is_copied() {
        let inner = RawMessage::new(vec![0x92, 0x01, 0x02]);
        let bytes = to_vec(&(inner.clone(), 7u8)).unwrap();
        assert_eq!(bytes, [0x92, 0x92, 0x01, 0x02, 0x07]);
        let (raw, n): (RawMessage, u8) = from_slice(&bytes).unwrap();
        assert_eq!(raw, inner);
        assert_eq!(n, 7);
    }

    #[test]
    fn empty_encodes_nil() {
        assert_eq!(to_vec(&RawMessage::default()).unwrap(), [0xc0]);
    }
}
