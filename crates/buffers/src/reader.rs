//! Streaming reader with cursor tracking.

use std::io::{self, BufRead};

use crate::BufferError;

/// Upper bound on the capacity reserved up front by [`StreamReader::buf`].
///
/// Length prefixes come from untrusted input; larger payloads grow the
/// output vector as bytes actually arrive.
pub const MAX_PREALLOC: usize = 64 * 1024;

/// A reader that pulls big-endian values from a [`BufRead`] source.
///
/// Every read is bounds-checked: running out of input yields
/// [`BufferError::EndOfBuffer`] instead of panicking.
///
/// # Example
///
/// ```
/// use packstream_buffers::StreamReader;
///
/// let data = [0x01, 0x02, 0x03];
/// let mut reader = StreamReader::new(Box::new(&data[..]));
///
/// assert_eq!(reader.peek().unwrap(), 0x01);
/// assert_eq!(reader.u8().unwrap(), 0x01);
/// assert_eq!(reader.u16().unwrap(), 0x0203);
/// assert!(reader.u8().is_err());
/// ```
pub struct StreamReader<'a> {
    inner: Box<dyn BufRead + 'a>,
    /// Number of bytes consumed so far.
    x: u64,
    capture: Option<Vec<u8>>,
}

impl<'a> StreamReader<'a> {
    pub fn new(inner: Box<dyn BufRead + 'a>) -> Self {
        Self {
            inner,
            x: 0,
            capture: None,
        }
    }

    /// Replaces the source and resets the cursor.
    pub fn reset(&mut self, inner: Box<dyn BufRead + 'a>) {
        self.inner = inner;
        self.x = 0;
        self.capture = None;
    }

    /// Number of bytes consumed since construction or the last reset.
    pub fn position(&self) -> u64 {
        self.x
    }

    /// Starts copying every consumed byte into a side buffer.
    pub fn start_capture(&mut self) {
        self.capture = Some(Vec::new());
    }

    /// Stops capturing and returns the bytes consumed since
    /// [`StreamReader::start_capture`].
    pub fn take_capture(&mut self) -> Vec<u8> {
        self.capture.take().unwrap_or_default()
    }

    fn fill<'s>(inner: &'s mut Box<dyn BufRead + 'a>) -> Result<&'s [u8], BufferError> {
        loop {
            match inner.fill_buf() {
                Ok([]) => return Err(BufferError::EndOfBuffer),
                Ok(_) => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        // The buffer is non-empty now, so this second call performs no I/O.
        Ok(inner.fill_buf()?)
    }

    fn advance(&mut self, n: usize) {
        self.inner.consume(n);
        self.x += n as u64;
    }

    /// Peeks at the next byte without advancing.
    pub fn peek(&mut self) -> Result<u8, BufferError> {
        Ok(Self::fill(&mut self.inner)?[0])
    }

    /// Fills `dst` completely from the source.
    pub fn read_into(&mut self, dst: &mut [u8]) -> Result<(), BufferError> {
        let mut filled = 0;
        while filled < dst.len() {
            let chunk = Self::fill(&mut self.inner)?;
            let n = chunk.len().min(dst.len() - filled);
            dst[filled..filled + n].copy_from_slice(&chunk[..n]);
            if let Some(capture) = self.capture.as_mut() {
                capture.extend_from_slice(&dst[filled..filled + n]);
            }
            self.advance(n);
            filled += n;
        }
        Ok(())
    }

    #[inline]
    fn array<const N: usize>(&mut self) -> Result<[u8; N], BufferError> {
        let mut out = [0u8; N];
        self.read_into(&mut out)?;
        Ok(out)
    }

    /// Reads an unsigned 8-bit integer.
    #[inline]
    pub fn u8(&mut self) -> Result<u8, BufferError> {
        let [b] = self.array::<1>()?;
        Ok(b)
    }

    /// Reads a signed 8-bit integer.
    #[inline]
    pub fn i8(&mut self) -> Result<i8, BufferError> {
        Ok(self.u8()? as i8)
    }

    /// Reads an unsigned 16-bit integer (big-endian).
    #[inline]
    pub fn u16(&mut self) -> Result<u16, BufferError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    /// Reads a signed 16-bit integer (big-endian).
    #[inline]
    pub fn i16(&mut self) -> Result<i16, BufferError> {
        Ok(i16::from_be_bytes(self.array()?))
    }

    /// Reads an unsigned 32-bit integer (big-endian).
    #[inline]
    pub fn u32(&mut self) -> Result<u32, BufferError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    /// Reads a signed 32-bit integer (big-endian).
    #[inline]
    pub fn i32(&mut self) -> Result<i32, BufferError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    /// Reads an unsigned 64-bit integer (big-endian).
    #[inline]
    pub fn u64(&mut self) -> Result<u64, BufferError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    /// Reads a signed 64-bit integer (big-endian).
    #[inline]
    pub fn i64(&mut self) -> Result<i64, BufferError> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    /// Reads a 32-bit floating point number (big-endian).
    #[inline]
    pub fn f32(&mut self) -> Result<f32, BufferError> {
        Ok(f32::from_bits(self.u32()?))
    }

    /// Reads a 64-bit floating point number (big-endian).
    #[inline]
    pub fn f64(&mut self) -> Result<f64, BufferError> {
        Ok(f64::from_bits(self.u64()?))
    }

    /// Reads exactly `size` bytes into a new vector.
    ///
    /// At most [`MAX_PREALLOC`] bytes are reserved before data arrives.
    pub fn buf(&mut self, size: usize) -> Result<Vec<u8>, BufferError> {
        let mut out = Vec::with_capacity(size.min(MAX_PREALLOC));
        let mut rest = size;
        while rest > 0 {
            let chunk = Self::fill(&mut self.inner)?;
            let n = chunk.len().min(rest);
            out.extend_from_slice(&chunk[..n]);
            if let Some(capture) = self.capture.as_mut() {
                capture.extend_from_slice(&out[out.len() - n..]);
            }
            self.advance(n);
            rest -= n;
        }
        Ok(out)
    }

    /// Discards exactly `size` bytes without materializing them.
    pub fn skip(&mut self, size: usize) -> Result<(), BufferError> {
        let mut rest = size;
        while rest > 0 {
            let chunk = Self::fill(&mut self.inner)?;
            let n = chunk.len().min(rest);
            if let Some(capture) = self.capture.as_mut() {
                capture.extend_from_slice(&chunk[..n]);
            }
            self.advance(n);
            rest -= n;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    fn reader(data: &[u8]) -> StreamReader<'_> {
        StreamReader::new(Box::new(data))
    }

    #[test]
    fn test_u8_and_position() {
        let mut r = reader(&[1, 2, 3]);
        assert_eq!(r.u8().unwrap(), 1);
        assert_eq!(r.u8().unwrap(), 2);
        assert_eq!(r.position(), 2);
    }

    #[test]
    fn test_u32() {
        let mut r = reader(&[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(r.u32().unwrap(), 0x01020304);
    }

    #[test]
    fn test_i16_negative() {
        let mut r = reader(&[0xfc, 0x18]);
        assert_eq!(r.i16().unwrap(), -1000);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let mut r = reader(&[42, 43]);
        assert_eq!(r.peek().unwrap(), 42);
        assert_eq!(r.u8().unwrap(), 42);
        assert_eq!(r.peek().unwrap(), 43);
    }

    #[test]
    fn test_end_of_buffer() {
        let mut r = reader(&[1]);
        assert!(matches!(r.u16(), Err(BufferError::EndOfBuffer)));
    }

    #[test]
    fn test_buf_across_small_chunks() {
        let data: Vec<u8> = (0..100).collect();
        let inner = BufReader::with_capacity(7, &data[..]);
        let mut r = StreamReader::new(Box::new(inner));
        r.skip(3).unwrap();
        let out = r.buf(90).unwrap();
        assert_eq!(out, (3..93).collect::<Vec<u8>>());
        assert_eq!(r.position(), 93);
    }

    #[test]
    fn test_buf_short_input() {
        let mut r = reader(&[1, 2, 3]);
        assert!(matches!(r.buf(4), Err(BufferError::EndOfBuffer)));
    }

    #[test]
    fn test_capture_records_consumed_bytes() {
        let mut r = reader(&[9, 1, 2, 3, 4, 5]);
        r.u8().unwrap();
        r.start_capture();
        r.u16().unwrap();
        r.skip(1).unwrap();
        let _ = r.buf(1).unwrap();
        assert_eq!(r.take_capture(), vec![1, 2, 3, 4]);
        assert_eq!(r.u8().unwrap(), 5);
    }
}
