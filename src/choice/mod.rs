//! Choice coders: integer choice `0..limit` ↔ bit sequence.
//!
//! Three strategies exist: trivial (limit 1, zero bits), fixed-width and
//! adaptive. [`BitCoding`] is the factory that picks one per choice point;
//! the selected factory is part of the stream settings.

pub mod adaptive;
pub mod fixed;

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use crate::bitstream::{BitReader, BitWriter};
use crate::{Error, Result};

pub use adaptive::AdaptiveChoiceCoder;
pub use fixed::{ByteChoiceCoder, FixedChoiceCoder, bit_width};

/// A coder for one choice point.
#[derive(Debug, Clone)]
pub enum ChoiceCoder {
    /// Limit 1: nothing to encode.
    Trivial { id: usize },
    Fixed(FixedChoiceCoder),
    Byte(ByteChoiceCoder),
    Adaptive(AdaptiveChoiceCoder),
}

impl ChoiceCoder {
    /// Number of distinct choices.
    pub fn limit(&self) -> u32 {
        match self {
            Self::Trivial { .. } => 1,
            Self::Fixed(c) => c.limit(),
            Self::Byte(c) => c.limit(),
            Self::Adaptive(c) => c.limit(),
        }
    }

    /// Debug identifier of the choice point.
    pub fn id(&self) -> usize {
        match self {
            Self::Trivial { id } => *id,
            Self::Fixed(c) => c.id(),
            Self::Byte(c) => c.id(),
            Self::Adaptive(c) => c.id(),
        }
    }

    pub fn encode(&mut self, choice: u32, out: &mut BitWriter) -> Result<()> {
        match self {
            Self::Trivial { .. } => {
                if choice != 0 {
                    return Err(Error::InvalidChoice { choice: u64::from(choice), limit: 1 });
                }
                Ok(())
            }
            Self::Fixed(c) => c.encode(choice, out),
            Self::Byte(c) => c.encode(choice, out),
            Self::Adaptive(c) => c.encode(choice, out),
        }
    }

    pub fn decode<R: Read>(&mut self, input: &mut BitReader<R>) -> Result<u32> {
        match self {
            Self::Trivial { .. } => Ok(0),
            Self::Fixed(c) => c.decode(input),
            Self::Byte(c) => c.decode(input),
            Self::Adaptive(c) => c.decode(input),
        }
    }
}

impl fmt::Display for ChoiceCoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Trivial { .. } => "trivial",
            Self::Fixed(_) => "fixed",
            Self::Byte(_) => "byte",
            Self::Adaptive(_) => "adaptive",
        };
        write!(f, "{kind}#{}/{}", self.id(), self.limit())
    }
}

/// Choice coding strategy, selected per session (settings byte 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BitCoding {
    /// Always fixed-width (trivial for limit 1).
    Fixed,
    /// Adaptive tree where it pays off: trivial for 1, fixed for 2, adaptive above.
    #[default]
    Huffman,
    /// Whole bytes per choice.
    Byte,
}

impl BitCoding {
    pub const ALL: [BitCoding; 3] = [BitCoding::Fixed, BitCoding::Huffman, BitCoding::Byte];

    /// Index in the settings record.
    pub fn index(self) -> u8 {
        match self {
            Self::Fixed => 0,
            Self::Huffman => 1,
            Self::Byte => 2,
        }
    }

    pub fn from_index(idx: u8) -> Result<Self> {
        Self::ALL.get(usize::from(idx)).copied().ok_or(Error::UnknownCoding(idx))
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Huffman => "huffman",
            Self::Byte => "byte",
        }
    }

    /// Creates the coder for a choice point with `limit` choices.
    pub fn make_coder(self, limit: u32, id: usize) -> Result<ChoiceCoder> {
        if limit == 0 {
            return Err(Error::InvalidChoice { choice: 0, limit: 0 });
        }
        if limit == 1 {
            return Ok(ChoiceCoder::Trivial { id });
        }
        Ok(match self {
            Self::Fixed => ChoiceCoder::Fixed(FixedChoiceCoder::new(limit, id)),
            Self::Huffman if limit == 2 => ChoiceCoder::Fixed(FixedChoiceCoder::new(limit, id)),
            Self::Huffman => ChoiceCoder::Adaptive(AdaptiveChoiceCoder::new(limit, id)),
            Self::Byte => ChoiceCoder::Byte(ByteChoiceCoder::new(limit, id)?),
        })
    }
}

impl fmt::Display for BitCoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BitCoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" | "simple" => Ok(Self::Fixed),
            "huffman" | "adaptive" => Ok(Self::Huffman),
            "byte" => Ok(Self::Byte),
            _ => Err(Error::UnknownBitCoder(s.to_string())),
        }
    }
}
