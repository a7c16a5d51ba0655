/// Positional byte reader/writer shared by the record and envelope codecs.
use crate::error::{DexError, Result};

pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(DexError::MalformedRecord {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.take(N)?);
        Ok(arr)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i64_be(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn read_i32_be(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_bytes32(&mut self) -> Result<[u8; 32]> {
        self.take_array()
    }

    /// Bitcoin compact-size integer (little-endian after the marker byte).
    pub fn read_compact_size(&mut self) -> Result<u64> {
        match self.read_u8()? {
            0xfd => Ok(u16::from_le_bytes(self.take_array()?) as u64),
            0xfe => Ok(u32::from_le_bytes(self.take_array()?) as u64),
            0xff => Ok(u64::from_le_bytes(self.take_array()?)),
            n => Ok(n as u64),
        }
    }

    /// Compact-size length followed by that many bytes.
    pub fn read_var_slice(&mut self) -> Result<&'a [u8]> {
        let len = self.read_compact_size()?;
        let len = usize::try_from(len).map_err(|_| DexError::MalformedRecord {
            offset: self.pos,
            needed: usize::MAX,
            available: self.remaining(),
        })?;
        self.take(len)
    }
}

pub fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        out.push(n as u8);
    } else if n <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&n.to_le_bytes());
    }
}

pub fn write_var_slice(out: &mut Vec<u8>, data: &[u8]) {
    write_compact_size(out, data.len() as u64);
    out.extend_from_slice(data);
}
