use std::str::Utf8Error;
use thiserror::Error;

/// The error type for [`Reader`] operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("unexpected end of input at offset {offset:#x} (wanted {wanted} more byte(s))")]
    UnexpectedEof { offset: usize, wanted: usize },

    #[error("invalid UTF-8 string at offset {offset:#x}")]
    InvalidUtf8 {
        offset: usize,
        #[source]
        source: Utf8Error,
    },
}

/// The result type for [`Reader`] operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A cursor over an in-memory byte buffer. All multi-byte integers are little-endian.
///
/// This mirrors the shape of a typical tracker-format bitstream reader: a flat buffer, an
/// advancing position, and a handful of fixed-width primitive reads plus a NUL-terminated
/// string read. `Reader` is built for formats that repeatedly seek backwards to follow pointer
/// tables, rather than composing over `std::io::Read`.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Wraps `data` in a new reader positioned at the start.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// The current cursor offset.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// The total length of the underlying buffer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the cursor is at or past the end of the buffer.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Moves the cursor to an absolute offset. Out-of-range offsets are allowed; they only fail
    /// once something attempts to read from them.
    pub fn seek(&mut self, offset: usize) {
        self.pos = offset;
    }

    fn require(&self, len: usize) -> Result<()> {
        if self.pos.checked_add(len).map_or(true, |end| end > self.data.len()) {
            return Err(Error::UnexpectedEof { offset: self.pos, wanted: len });
        }
        Ok(())
    }

    /// Reads `n` raw bytes and advances the cursor.
    pub fn read(&mut self, n: usize) -> Result<&'a [u8]> {
        self.require(n)?;
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Reads a single unsigned byte.
    pub fn u1(&mut self) -> Result<u8> {
        Ok(self.read(1)?[0])
    }

    /// Reads a little-endian unsigned 16-bit integer.
    pub fn u2(&mut self) -> Result<u16> {
        let b = self.read(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Reads a little-endian unsigned 32-bit integer.
    pub fn u4(&mut self) -> Result<u32> {
        let b = self.read(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a little-endian signed 32-bit integer.
    pub fn s4(&mut self) -> Result<i32> {
        Ok(self.u4()? as i32)
    }

    /// Reads a little-endian IEEE-754 single-precision float.
    pub fn f4(&mut self) -> Result<f32> {
        let b = self.read(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a NUL-terminated UTF-8 string, consuming the terminator.
    pub fn ustr(&mut self) -> Result<String> {
        let start = self.pos;
        let mut end = start;
        loop {
            if end >= self.data.len() {
                return Err(Error::UnexpectedEof { offset: end, wanted: 1 });
            }
            if self.data[end] == 0 {
                break;
            }
            end += 1;
        }
        let bytes = &self.data[start..end];
        self.pos = end + 1;
        let s = std::str::from_utf8(bytes)
            .map_err(|source| Error::InvalidUtf8 { offset: start, source })?;
        Ok(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc];
        let mut r = Reader::new(&data);
        assert_eq!(r.u1().unwrap(), 0x12);
        assert_eq!(r.u2().unwrap(), 0x5634);
        assert_eq!(r.pos(), 3);
        r.seek(0);
        assert_eq!(r.u4().unwrap(), 0x7856_3412);
    }

    #[test]
    fn test_ustr() {
        let data = b"hello\0world";
        let mut r = Reader::new(data);
        assert_eq!(r.ustr().unwrap(), "hello");
        assert_eq!(r.read(5).unwrap(), b"world");
    }

    #[test]
    fn test_eof() {
        let data = [0u8; 2];
        let mut r = Reader::new(&data);
        assert!(r.u4().is_err());
    }

    #[test]
    fn test_seek_past_end_fails_on_read() {
        let data = [0u8; 4];
        let mut r = Reader::new(&data);
        r.seek(100);
        assert!(r.u1().is_err());
    }
}
