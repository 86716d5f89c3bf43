use crate::error::{DecodeError, DecodeResult};

#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    // Absolute offset of `data[0]` in the enclosing input, for error reports.
    base: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            base: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn bytes(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(DecodeError::Truncated {
                offset: self.base + self.pos,
                needed: len,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Splits off the next `len` bytes as an independent reader and advances
    /// past them.
    pub fn sub(&mut self, len: usize) -> DecodeResult<ByteReader<'a>> {
        let start = self.base + self.pos;
        let data = self.bytes(len)?;
        Ok(ByteReader {
            data,
            pos: 0,
            base: start,
        })
    }

    pub fn skip(&mut self, len: usize) -> DecodeResult<()> {
        self.bytes(len).map(|_| ())
    }

    pub fn u8(&mut self) -> DecodeResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16(&mut self) -> DecodeResult<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> DecodeResult<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i8(&mut self) -> DecodeResult<i8> {
        Ok(self.u8()? as i8)
    }

    pub fn i16(&mut self) -> DecodeResult<i16> {
        Ok(self.u16()? as i16)
    }

    pub fn i32(&mut self) -> DecodeResult<i32> {
        Ok(self.u32()? as i32)
    }

    pub fn u64(&mut self) -> DecodeResult<u64> {
        let hi = self.u32()? as u64;
        let lo = self.u32()? as u64;
        Ok((hi << 32) | lo)
    }

    /// Reads a `u16` count followed by that many items.
    pub fn list<T>(
        &mut self,
        mut item: impl FnMut(&mut Self) -> DecodeResult<T>,
    ) -> DecodeResult<Vec<T>> {
        let count = self.u16()? as usize;
        let mut out = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            out.push(item(self)?);
        }
        Ok(out)
    }
}
