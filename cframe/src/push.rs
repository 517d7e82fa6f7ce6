use byteorder::{ByteOrder, LittleEndian};

use crate::FrameError;
use crate::{MAX_DIRECT_PUSH, PUSH_U16, PUSH_U32, PUSH_U8};

/// Append `data` to `out` as a single push, returns the number of bytes written.
pub fn write_push(out: &mut Vec<u8>, data: &[u8]) -> Result<usize, FrameError> {
    let len = data.len();
    let start = out.len();

    if len <= MAX_DIRECT_PUSH {
        out.push(len as u8);
    } else if len <= u8::MAX as usize {
        out.push(PUSH_U8);
        out.push(len as u8);
    } else if len <= u16::MAX as usize {
        out.push(PUSH_U16);
        out.extend_from_slice(&(len as u16).to_le_bytes());
    } else if len <= u32::MAX as usize {
        out.push(PUSH_U32);
        out.extend_from_slice(&(len as u32).to_le_bytes());
    } else {
        return Err(FrameError::FieldTooLarge(len));
    }
    out.extend_from_slice(data);

    Ok(out.len() - start)
}

/// Walks a byte slice one push at a time.
///
/// Stops at the end of the input. The first error is yielded once and ends
/// the iteration, there is no resynchronising after a bad header.
pub struct PushReader<'a> {
    inner: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> PushReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        PushReader::at(buf, 0)
    }

    pub fn at(buf: &'a [u8], offset: usize) -> Self {
        PushReader {
            inner: buf,
            offset,
            failed: false,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    // Returns (payload length, header length)
    fn read_header(&self) -> Result<(usize, usize), FrameError> {
        let offset = self.offset;
        let marker = self.inner[offset];
        let rest = &self.inner[offset + 1..];

        let (width, len) = match marker {
            x if x as usize <= MAX_DIRECT_PUSH => return Ok((x as usize, 1)),
            PUSH_U8 => (1, rest.first().map(|b| *b as usize)),
            PUSH_U16 => (2, rest.get(..2).map(|b| LittleEndian::read_u16(b) as usize)),
            PUSH_U32 => (4, rest.get(..4).map(|b| LittleEndian::read_u32(b) as usize)),
            byte => return Err(FrameError::Malformed { offset, byte }),
        };

        match len {
            Some(len) => Ok((len, 1 + width)),
            // Cut off inside the length itself
            None => Err(FrameError::Truncated {
                offset,
                declared: width,
                available: rest.len(),
            }),
        }
    }

    fn read_push(&mut self) -> Result<&'a [u8], FrameError> {
        let (len, header) = self.read_header()?;
        let start = self.offset + header;
        let available = self.inner.len() - start;

        if len > available {
            return Err(FrameError::Truncated {
                offset: self.offset,
                declared: len,
                available,
            });
        }

        self.offset = start + len;
        Ok(&self.inner[start..start + len])
    }
}

impl<'a> Iterator for PushReader<'a> {
    type Item = Result<&'a [u8], FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.inner.len() {
            return None;
        }

        let ret = self.read_push();
        if ret.is_err() {
            self.failed = true;
        }
        Some(ret)
    }
}
