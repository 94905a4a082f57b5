//! Fixed-width choice coders.

use std::io::Read;

use crate::bitstream::{BitReader, BitWriter};
use crate::{Error, Result};

/// Smallest bit width for `limit` values: ceil(log2(limit)).
pub fn bit_width(limit: u32) -> u8 {
    if limit <= 1 {
        return 0;
    }
    (u32::BITS - (limit - 1).leading_zeros()) as u8
}

/// Writes every choice with `ceil(log2(limit))` bits.
///
/// Decoding rejects bit patterns `>= limit`, which exist whenever the limit
/// is not a power of two.
#[derive(Debug, Clone)]
pub struct FixedChoiceCoder {
    limit: u32,
    id: usize,
    bits: u8,
}

impl FixedChoiceCoder {
    pub fn new(limit: u32, id: usize) -> Self {
        Self::with_width(limit, id, bit_width(limit))
    }

    fn with_width(limit: u32, id: usize, bits: u8) -> Self {
        Self { limit, id, bits }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Bits per choice.
    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn encode(&self, choice: u32, out: &mut BitWriter) -> Result<()> {
        if choice >= self.limit {
            return Err(Error::InvalidChoice { choice: u64::from(choice), limit: self.limit });
        }
        out.write_bits(u64::from(choice), self.bits);
        Ok(())
    }

    pub fn decode<R: Read>(&self, input: &mut BitReader<R>) -> Result<u32> {
        let choice = input.read_bits(self.bits)?;
        if choice >= u64::from(self.limit) {
            return Err(Error::InvalidChoice { choice, limit: self.limit });
        }
        Ok(choice as u32)
    }
}

/// Byte-aligned widths: 8 bits up to 256 choices, 16 bits above.
#[derive(Debug, Clone)]
pub struct ByteChoiceCoder {
    inner: FixedChoiceCoder,
}

impl ByteChoiceCoder {
    /// Largest supported limit.
    pub const MAX_LIMIT: u32 = 1 << 16;

    pub fn new(limit: u32, id: usize) -> Result<Self> {
        if limit > Self::MAX_LIMIT {
            return Err(Error::InvalidChoice { choice: u64::from(limit), limit: Self::MAX_LIMIT });
        }
        let bits = if limit > 256 { 16 } else { 8 };
        Ok(Self { inner: FixedChoiceCoder::with_width(limit, id, bits) })
    }

    pub fn limit(&self) -> u32 {
        self.inner.limit()
    }

    pub fn id(&self) -> usize {
        self.inner.id()
    }

    pub fn encode(&self, choice: u32, out: &mut BitWriter) -> Result<()> {
        self.inner.encode(choice, out)
    }

    pub fn decode<R: Read>(&self, input: &mut BitReader<R>) -> Result<u32> {
        self.inner.decode(input)
    }
}
