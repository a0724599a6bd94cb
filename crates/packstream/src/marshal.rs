//! Types that carry their own byte representation.
//!
//! A [`BinaryMarshal`] type becomes a bin blob through [`impl_binary_codec!`],
//! or an extension record through [`ExtRegistry::register_binary`].
//!
//! [`ExtRegistry::register_binary`]: crate::ExtRegistry::register_binary

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{Error, Result};

pub trait BinaryMarshal: Sized {
    fn marshal_binary(&self) -> Result<Vec<u8>>;
    fn unmarshal_binary(data: &[u8]) -> Result<Self>;
}

/// Implements `Encode` and `Decode` for [`BinaryMarshal`] types by wrapping
/// their bytes in a bin blob.
///
/// ```
/// use packstream::{impl_binary_codec, BinaryMarshal, Result};
///
/// #[derive(Debug, PartialEq)]
/// struct Flags(u16);
///
/// impl BinaryMarshal for Flags {
///     fn marshal_binary(&self) -> Result<Vec<u8>> {
///         Ok(self.0.to_le_bytes().to_vec())
///     }
///
///     fn unmarshal_binary(data: &[u8]) -> Result<Self> {
///         let raw = data.try_into().map_err(|_| packstream::Error::custom("want 2 bytes"))?;
///         Ok(Flags(u16::from_le_bytes(raw)))
///     }
/// }
///
/// impl_binary_codec!(Flags);
///
/// let bytes = packstream::to_vec(&Flags(1)).unwrap();
/// assert_eq!(bytes, [0xc4, 0x02, 0x01, 0x00]);
/// assert_eq!(packstream::from_slice::<Flags>(&bytes).unwrap(), Flags(1));
/// ```
#[macro_export]
macro_rules! impl_binary_codec {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::Encode for $ty {
            fn encode(&self, enc: &mut $crate::Encoder<'_>) -> $crate::Result<()> {
                let bytes = $crate::BinaryMarshal::marshal_binary(self)?;
                enc.encode_bytes(&bytes)
            }
        }

        impl $crate::Decode for $ty {
            fn decode(dec: &mut $crate::Decoder<'_>) -> $crate::Result<Self> {
                let bytes = dec.decode_bytes()?;
                <$ty as $crate::BinaryMarshal>::unmarshal_binary(&bytes)
            }
        }
    )+};
}

impl BinaryMarshal for Ipv4Addr {
    fn marshal_binary(&self) -> Result<Vec<u8>> {
        Ok(self.octets().to_vec())
    }

    fn unmarshal_binary(data: &[u8]) -> Result<Self> {
        let octets: [u8; 4] = data.try_into().map_err(|_| Error::LengthMismatch {
            expected: 4,
            found: data.len(),
        })?;
        Ok(Ipv4Addr::from(octets))
    }
}

impl BinaryMarshal for Ipv6Addr {
    fn marshal_binary(&self) -> Result<Vec<u8>> {
        Ok(self.octets().to_vec())
    }

    fn unmarshal_binary(data: &[u8]) -> Result<Self> {
        let octets: [u8; 16] = data.try_into().map_err(|_| Error::LengthMismatch {
            expected: 16,
            found: data.len(),
        })?;
        Ok(Ipv6Addr::from(octets))
    }
}

/// Four bytes for v4, sixteen for v6.
impl BinaryMarshal for IpAddr {
    fn marshal_binary(&self) -> Result<Vec<u8>> {
        match self {
            IpAddr::V4(addr) => addr.marshal_binary(),
            IpAddr::V6(addr) => addr.marshal_binary(),
        }
    }

    fn unmarshal_binary(data: &[u8]) -> Result<Self> {
        match data.len() {
            4 => Ipv4Addr::unmarshal_binary(data).map(IpAddr::V4),
            _ => Ipv6Addr::unmarshal_binary(data).map(IpAddr::V6),
        }
    }
}

crate::impl_binary_codec!(Ipv4Addr, Ipv6Addr, IpAddr);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{from_slice, to_vec};

    #[test]
    fn addresses_travel_as_bin() {
        let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let bytes = to_vec(&addr).unwrap();
        assert_eq!(bytes, [0xc4, 0x04, 10, 0, 0, 1]);
        assert_eq!(from_slice::<IpAddr>(&bytes).unwrap(), addr);

        let v6 = Ipv6Addr::LOCALHOST;
        assert_eq!(from_slice::<Ipv6Addr>(&to_vec(&v6).unwrap()).unwrap(), v6);
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(matches!(
            from_slice::<Ipv4Addr>(&[0xc4, 0x02, 1, 2]),
            Err(Error::LengthMismatch { expected: 4, found: 2 })
        ));
    }
}
