// Bounds-checked reading of little-endian header fields

/// Cursor over a header packet; every read checks the remaining length
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Take the next `len` bytes, or None if fewer are left
    pub fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        if len > self.remaining() {
            return None;
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Some(slice)
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    /// Read little-endian 16-bit integer
    pub fn read_le_u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read little-endian signed 16-bit integer
    pub fn read_le_i16(&mut self) -> Option<i16> {
        self.read_le_u16().map(|v| v as i16)
    }

    /// Read little-endian 32-bit integer
    pub fn read_le_u32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Consume `signature` if the data continues with it
    pub fn check_signature(&mut self, signature: &[u8]) -> bool {
        if self.data[self.pos..].starts_with(signature) {
            self.pos += signature.len();
            true
        } else {
            false
        }
    }
}
