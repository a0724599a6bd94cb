//! packstream-buffers - byte-level framing primitives.
//!
//! [`Writer`] accumulates big-endian output in a growable buffer that is
//! drained to a sink in one write. [`StreamReader`] pulls big-endian values
//! from any [`std::io::BufRead`] with bounds checking and an optional capture
//! of the consumed bytes.

mod reader;
mod writer;

pub use reader::{StreamReader, MAX_PREALLOC};
pub use writer::Writer;

use thiserror::Error;

/// Errors produced by [`StreamReader`].
#[derive(Debug, Error)]
pub enum BufferError {
    /// The underlying reader ran dry before the requested bytes arrived.
    #[error("unexpected end of buffer")]
    EndOfBuffer,
    /// The underlying reader failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
