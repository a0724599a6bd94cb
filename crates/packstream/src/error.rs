use std::fmt;
use std::io;

use packstream_buffers::BufferError;
use thiserror::Error;

/// Which side of the codec raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encode,
    Decode,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Encode => f.write_str("encode"),
            Direction::Decode => f.write_str("decode"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid code {code:#04x} decoding {target}")]
    InvalidCode { code: u8, target: &'static str },
    #[error("unknown code {0:#04x}")]
    UnknownCode(u8),
    #[error("value does not fit in {0}")]
    Overflow(&'static str),
    #[error("{kind} is not supported on {direction}")]
    Unsupported {
        kind: &'static str,
        direction: Direction,
    },
    #[error("ext id {0} is already registered")]
    DuplicateExtId(i8),
    #[error("ext id {0} is reserved")]
    ReservedExtId(i8),
    #[error("unknown ext id {0}")]
    UnregisteredExt(i8),
    #[error("type {0} is not registered as an ext")]
    UnregisteredType(&'static str),
    #[error("expected ext id {expected}, found {found}")]
    ExtIdMismatch { expected: i8, found: i8 },
    #[error("no such intern index {0}")]
    InternIndexOutOfRange(u32),
    #[error("{record}: missing required field {name:?}")]
    MissingRequiredField { record: &'static str, name: String },
    #[error("unsupported map key: {0}")]
    UnsupportedMapKey(&'static str),
    #[error("expected {expected} elements, found {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("invalid utf-8 in str payload")]
    InvalidUtf8,
    #[error("nesting deeper than {0} levels")]
    DepthLimitExceeded(usize),
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
    #[error("{0}")]
    Custom(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub fn custom(msg: impl fmt::Display) -> Self {
        Error::Custom(msg.to_string())
    }
}

impl From<BufferError> for Error {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::EndOfBuffer => Error::UnexpectedEof,
            BufferError::Io(err) => Error::Io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let err = Error::InvalidCode {
            code: 0xc1,
            target: "bool",
        };
        assert_eq!(err.to_string(), "invalid code 0xc1 decoding bool");
        assert_eq!(Error::UnregisteredExt(7).to_string(), "unknown ext id 7");
        let err = Error::MissingRequiredField {
            record: "Person",
            name: "age".into(),
        };
        assert_eq!(err.to_string(), "Person: missing required field \"age\"");
    }

    #[test]
    fn buffer_errors_convert() {
        assert!(matches!(
            Error::from(BufferError::EndOfBuffer),
            Error::UnexpectedEof
        ));
        let io = io::Error::new(io::ErrorKind::BrokenPipe, "closed");
        assert!(matches!(Error::from(BufferError::Io(io)), Error::Io(_)));
    }
}
