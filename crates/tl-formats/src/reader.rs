//! Bounds-checked cursor over module bytes.

use crate::FormatError;

/// Read cursor that never indexes past the end of its buffer.
///
/// Every accessor checks the requested span first and reports
/// [`FormatError::UnexpectedEof`] with the absolute offset on failure.
#[derive(Clone)]
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Move to an absolute offset. Seeking exactly to the end is allowed.
    pub fn seek(&mut self, offset: usize) -> Result<(), FormatError> {
        if offset > self.data.len() {
            return Err(FormatError::UnexpectedEof {
                offset,
                needed: offset - self.data.len(),
            });
        }
        self.pos = offset;
        Ok(())
    }

    pub fn skip(&mut self, len: usize) -> Result<(), FormatError> {
        self.bytes(len).map(|_| ())
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], FormatError> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.data.len());
        match end {
            Some(end) => {
                let slice = &self.data[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(FormatError::UnexpectedEof {
                offset: self.pos,
                needed: len,
            }),
        }
    }

    /// Up to `len` bytes; shorter if the buffer ends first.
    pub fn bytes_truncated(&mut self, len: usize) -> &'a [u8] {
        let len = len.min(self.remaining());
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        slice
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn i8(&mut self) -> Result<i8, FormatError> {
        Ok(self.u8()? as i8)
    }

    pub fn u16_le(&mut self) -> Result<u16, FormatError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u16_be(&mut self) -> Result<u16, FormatError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub fn u32_le(&mut self) -> Result<u32, FormatError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    /// Fixed-width, NUL-padded text field.
    pub fn string(&mut self, len: usize) -> Result<String, FormatError> {
        Ok(parse_string(self.bytes(len)?))
    }
}

/// Parse a NUL-terminated, space-padded string from bytes.
pub(crate) fn parse_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    data[..end]
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { ' ' })
        .collect::<String>()
        .trim_end()
        .to_string()
}
