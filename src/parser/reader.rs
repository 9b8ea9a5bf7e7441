use byteorder::{ByteOrder, LittleEndian};

/// Why a read from a [`Reader`] could not produce a value. Either way the
/// cursor position afterwards is unspecified and no later field can be
/// located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    #[error("unexpected end of input")]
    EndOfInput,
    #[error("integer representation too long or too large")]
    Overflow,
}

/// A cursor over a borrowed byte range. The position never moves past the
/// end of the range.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Reader<'a> {
        Reader { bytes, pos: 0 }
    }
}

impl<'a> Reader<'a> {
    // Basic operations --------------------------------------------------------
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Move to an absolute position, clamped to the end of the range.
    pub fn skip_to(&mut self, pos: usize) {
        self.pos = pos.min(self.bytes.len());
    }

    pub fn read_byte(&mut self) -> Result<u8, ReadError> {
        let byte = *self.bytes.get(self.pos).ok_or(ReadError::EndOfInput)?;
        self.pos += 1;
        Ok(byte)
    }

    /// Borrow the next `len` bytes. `len` is compared against what remains
    /// before any position arithmetic happens.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ReadError> {
        if len > self.remaining() {
            return Err(ReadError::EndOfInput);
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    // Read and interpret types ------------------------------------------------

    // le
    pub fn read_u32(&mut self) -> Result<u32, ReadError> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_vu32(&mut self) -> Result<u32, ReadError> {
        read_vu32(&mut || self.read_byte())
    }
}

/// Unsigned LEB128, at most five bytes. The unused high bits of a fifth
/// byte must be zero.
pub fn read_vu32<F>(reader: &mut F) -> Result<u32, ReadError>
where
    F: FnMut() -> Result<u8, ReadError>,
{
    let mut result: u32 = 0;

    for i in 0..5 {
        let b = reader()?;
        if i == 4 && b & 0xF0 != 0 {
            return Err(ReadError::Overflow);
        }
        result |= u32::from(b & 0x7F) << (7 * i);
        if b & 0x80 == 0 {
            return Ok(result);
        }
    }

    Err(ReadError::Overflow)
}

/// Shortest unsigned LEB128 encoding of `v`, appended to `out`.
pub fn write_vu32(out: &mut Vec<u8>, v: u32) {
    let mut value = v;
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

#[test]
fn test_read_byte() {
    let mut reader = Reader::new(&[0x01, 0xFF]);
    assert_eq!(reader.read_byte(), Ok(1));
    assert_eq!(reader.read_byte(), Ok(255));
    assert_eq!(reader.read_byte(), Err(ReadError::EndOfInput));
    assert_eq!(reader.pos(), 2);
}

#[test]
fn test_read_u32() {
    let read = |v: &[u8]| Reader::new(v).read_u32();

    assert_eq!(read(&[0x00, 0x61, 0x73, 0x6D]), Ok(0x6D73_6100));
    assert_eq!(read(&[0x01, 0x00, 0x00, 0x00]), Ok(1));
    assert_eq!(read(&[0xFF, 0xFF, 0xFF, 0xFF]), Ok(u32::MAX));
    assert_eq!(read(&[0x01, 0x00, 0x00]), Err(ReadError::EndOfInput));
}

#[test]
fn test_read_vu32() {
    let read = |v: &[u8]| Reader::new(v).read_vu32();

    assert_eq!(read(&[0b00000000]), Ok(0));
    assert_eq!(read(&[0b01111111]), Ok(127));
    assert_eq!(read(&[0b10000000, 0b00000001]), Ok(128));
    assert_eq!(read(&[0b11100101, 0b10001110, 0b00100110]), Ok(624485));
    assert_eq!(read(&[0x80, 0x80, 0x80, 0x80, 0x00]), Ok(0));
    assert_eq!(read(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]), Ok(u32::MAX));
}

#[test]
fn test_read_vu32_errors() {
    let read = |v: &[u8]| Reader::new(v).read_vu32();

    assert_eq!(read(&[]), Err(ReadError::EndOfInput));
    assert_eq!(read(&[0x80]), Err(ReadError::EndOfInput));
    assert_eq!(read(&[0xFF, 0xFF, 0xFF, 0xFF]), Err(ReadError::EndOfInput));
    assert_eq!(read(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F]), Err(ReadError::Overflow));
    assert_eq!(read(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x00]), Err(ReadError::Overflow));
}

#[test]
fn test_read_bytes_never_passes_end() {
    let mut reader = Reader::new(b"abcdef");
    assert_eq!(reader.read_bytes(2), Ok(&b"ab"[..]));
    assert_eq!(reader.read_bytes(usize::MAX), Err(ReadError::EndOfInput));
    assert_eq!(reader.read_bytes(4), Ok(&b"cdef"[..]));
    assert!(reader.is_empty());
    reader.skip_to(100);
    assert_eq!(reader.pos(), 6);
}

#[test]
fn test_write_vu32() {
    let emit = |v: u32| {
        let mut out = vec![];
        write_vu32(&mut out, v);
        out
    };

    assert_eq!(emit(0), vec![0x00]);
    assert_eq!(emit(127), vec![0x7F]);
    assert_eq!(emit(128), vec![0x80, 0x01]);
    assert_eq!(emit(624485), vec![0xE5, 0x8E, 0x26]);
    assert_eq!(emit(u32::MAX), vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
}
