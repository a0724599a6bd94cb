//! Binary buffer writer with auto-growing capacity.

use std::io::{self, Write};

/// A binary buffer writer that grows automatically as needed.
///
/// Bytes between `start` and `pos` are pending: they have been written but not yet
/// drained with [`Writer::write_to`] or [`Writer::flush`].
///
/// # Example
///
/// ```
/// use packstream_buffers::Writer;
///
/// let mut writer = Writer::new();
/// writer.u8(0xcd);
/// writer.u16(0x0203);
/// let data = writer.flush();
/// assert_eq!(data, [0xcd, 0x02, 0x03]);
/// ```
pub struct Writer {
    /// The underlying byte buffer.
    bytes: Vec<u8>,
    /// Position where the last drain happened.
    start: usize,
    /// Current cursor position.
    pos: usize,
    /// Allocation size when buffer needs to grow.
    alloc_size: usize,
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

impl Writer {
    /// Creates a new writer with the default allocation size (4KB).
    pub fn new() -> Self {
        Self::with_alloc_size(4 * 1024)
    }

    /// Creates a new writer with custom allocation size.
    pub fn with_alloc_size(alloc_size: usize) -> Self {
        Self {
            bytes: vec![0u8; alloc_size],
            start: 0,
            pos: 0,
            alloc_size,
        }
    }

    /// Number of pending bytes.
    pub fn len(&self) -> usize {
        self.pos - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.pos == self.start
    }

    /// Pending bytes as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[self.start..self.pos]
    }

    /// Ensures the buffer has at least `capacity` bytes available.
    pub fn ensure_capacity(&mut self, capacity: usize) {
        let remaining = self.bytes.len() - self.pos;
        if remaining < capacity {
            let total = self.bytes.len() - self.start;
            let required = capacity - remaining;
            let total_required = total + required;
            let new_size = if total_required <= self.alloc_size {
                self.alloc_size
            } else {
                total_required * 2
            };
            self.grow(new_size);
        }
    }

    fn grow(&mut self, new_size: usize) {
        let pending = self.pos - self.start;
        let mut new_buf = vec![0u8; new_size];
        new_buf[..pending].copy_from_slice(&self.bytes[self.start..self.pos]);
        self.bytes = new_buf;
        self.pos = pending;
        self.start = 0;
    }

    /// Drops every pending byte.
    pub fn clear(&mut self) {
        self.pos = 0;
        self.start = 0;
    }

    /// Returns the pending bytes and rewinds the buffer.
    pub fn flush(&mut self) -> Vec<u8> {
        let result = self.bytes[self.start..self.pos].to_vec();
        self.clear();
        result
    }

    /// Writes the pending bytes to `sink` and rewinds the buffer.
    ///
    /// On failure the pending bytes are discarded as well: the stream is
    /// already in an unknown state.
    pub fn write_to(&mut self, sink: &mut dyn Write) -> io::Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let res = sink.write_all(&self.bytes[self.start..self.pos]);
        self.clear();
        res
    }

    /// Writes an unsigned 8-bit integer.
    #[inline]
    pub fn u8(&mut self, val: u8) {
        self.ensure_capacity(1);
        self.bytes[self.pos] = val;
        self.pos += 1;
    }

    /// Writes a signed 8-bit integer.
    #[inline]
    pub fn i8(&mut self, val: i8) {
        self.u8(val as u8);
    }

    /// Writes an unsigned 16-bit integer (big-endian).
    #[inline]
    pub fn u16(&mut self, val: u16) {
        self.raw(&val.to_be_bytes());
    }

    /// Writes a signed 16-bit integer (big-endian).
    #[inline]
    pub fn i16(&mut self, val: i16) {
        self.raw(&val.to_be_bytes());
    }

    /// Writes an unsigned 32-bit integer (big-endian).
    #[inline]
    pub fn u32(&mut self, val: u32) {
        self.raw(&val.to_be_bytes());
    }

    /// Writes a signed 32-bit integer (big-endian).
    #[inline]
    pub fn i32(&mut self, val: i32) {
        self.raw(&val.to_be_bytes());
    }

    /// Writes an unsigned 64-bit integer (big-endian).
    #[inline]
    pub fn u64(&mut self, val: u64) {
        self.raw(&val.to_be_bytes());
    }

    /// Writes a signed 64-bit integer (big-endian).
    #[inline]
    pub fn i64(&mut self, val: i64) {
        self.raw(&val.to_be_bytes());
    }

    /// Writes a u8 code followed by a u8 payload.
    #[inline]
    pub fn u8u8(&mut self, code: u8, val: u8) {
        self.raw(&[code, val]);
    }

    /// Writes a u8 code followed by a u16 (big-endian).
    pub fn u8u16(&mut self, code: u8, val: u16) {
        let b = val.to_be_bytes();
        self.raw(&[code, b[0], b[1]]);
    }

    /// Writes a u8 code followed by a u32 (big-endian).
    pub fn u8u32(&mut self, code: u8, val: u32) {
        let b = val.to_be_bytes();
        self.raw(&[code, b[0], b[1], b[2], b[3]]);
    }

    /// Writes a u8 code followed by a u64 (big-endian).
    pub fn u8u64(&mut self, code: u8, val: u64) {
        self.ensure_capacity(9);
        self.bytes[self.pos] = code;
        self.bytes[self.pos + 1..self.pos + 9].copy_from_slice(&val.to_be_bytes());
        self.pos += 9;
    }

    /// Writes a u8 code followed by a f32 (big-endian).
    pub fn u8f32(&mut self, code: u8, val: f32) {
        self.u8u32(code, val.to_bits());
    }

    /// Writes a u8 code followed by a f64 (big-endian).
    pub fn u8f64(&mut self, code: u8, val: f64) {
        self.u8u64(code, val.to_bits());
    }

    /// Writes a byte slice.
    pub fn buf(&mut self, buf: &[u8]) {
        self.raw(buf);
    }

    /// Writes a UTF-8 string. Returns the number of bytes written.
    pub fn utf8(&mut self, s: &str) -> usize {
        self.raw(s.as_bytes());
        s.len()
    }

    #[inline]
    fn raw(&mut self, bytes: &[u8]) {
        let length = bytes.len();
        self.ensure_capacity(length);
        self.bytes[self.pos..self.pos + length].copy_from_slice(bytes);
        self.pos += length;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u8() {
        let mut writer = Writer::new();
        writer.u8(0x01);
        writer.u8(0x02);
        assert_eq!(writer.flush(), [0x01, 0x02]);
    }

    #[test]
    fn test_u8u16_header() {
        let mut writer = Writer::new();
        writer.u8u16(0xdc, 0x0010);
        assert_eq!(writer.flush(), [0xdc, 0x00, 0x10]);
    }

    #[test]
    fn test_u8u32_header() {
        let mut writer = Writer::new();
        writer.u8u32(0xce, 0x8000_0000);
        assert_eq!(writer.flush(), [0xce, 0x80, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_u8f64() {
        let mut writer = Writer::new();
        writer.u8f64(0xcb, 1.5);
        let data = writer.flush();
        assert_eq!(data[0], 0xcb);
        assert_eq!(f64::from_be_bytes(data[1..].try_into().unwrap()), 1.5);
    }

    #[test]
    fn test_i8_negative() {
        let mut writer = Writer::new();
        writer.i8(-1i8);
        assert_eq!(writer.flush(), [0xff]);
    }

    #[test]
    fn test_grows_past_alloc_size() {
        let mut writer = Writer::with_alloc_size(4);
        writer.buf(&[1, 2, 3]);
        writer.buf(&[4, 5, 6, 7, 8]);
        assert_eq!(writer.len(), 8);
        assert_eq!(writer.flush(), [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_write_to_drains() {
        let mut writer = Writer::new();
        let mut sink = Vec::new();
        writer.utf8("abc");
        writer.write_to(&mut sink).unwrap();
        assert!(writer.is_empty());
        writer.u8(b'd');
        writer.write_to(&mut sink).unwrap();
        assert_eq!(sink, b"abcd");
    }

    #[test]
    fn test_flush_multiple() {
        let mut writer = Writer::new();
        writer.u8(0x01);
        assert_eq!(writer.flush(), [0x01]);
        writer.u8(0x02);
        assert_eq!(writer.flush(), [0x02]);
    }
}
