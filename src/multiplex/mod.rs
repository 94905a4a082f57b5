//! Multiplexed block stream.
//!
//! Several logical byte streams share one physical stream:
//!
//! ```text
//! [MAGIC "MuX\x01"][client magic]([block header][payload])*
//! ```
//!
//! A block header packs the stream id and payload length into two to four
//! bytes. Small ids and short blocks get the shortest headers:
//!
//! | stream id | first byte  | length bits      |
//! |-----------|-------------|------------------|
//! | 0         | `0xxxxxxx`  | 14 / 21 / 29     |
//! | 1..=4     | `10yyxxxx`  | 11 / 18 / 26     |
//! | 5..=63    | `11yyyyyy`  | 15 / 23          |
//!
//! The high bit of each following length byte says whether another byte
//! follows; the last byte of the longest form carries a full eight bits.

mod reader;
mod writer;

use std::io::Read;

use crate::{Error, Result};

pub use reader::{MultiplexReader, StreamReader};
pub use writer::{MultiplexWriter, StreamWriter};
pub(crate) use writer::to_io_error;

/// Outer magic number: "MuX" + format version 1.
pub const MAGIC: u32 = 0x4D75_5801;
/// Block payloads are always smaller than this.
pub const MAX_BLOCK_SIZE: usize = 1 << 23;
/// Stream ids range over `0..MAX_STREAM_ID`.
pub const MAX_STREAM_ID: u8 = 64;
/// Default buffering threshold of the writer.
pub const DEFAULT_CAPACITY: usize = 32 * 1024;

pub(crate) fn check_stream_id(id: u8) -> Result<()> {
    if id >= MAX_STREAM_ID {
        return Err(Error::InvalidBlockHeader);
    }
    Ok(())
}

// ============================================================================
// Block header
// ============================================================================

/// Writes `mask | size >> k` and keeps the lower k bits.
fn put(out: &mut Vec<u8>, size: &mut usize, k: u32, mask: u8) {
    out.push(mask | (*size >> k) as u8);
    *size &= (1usize << k) - 1;
}

/// Appends the header for a block of `size` bytes on stream `id`.
pub fn encode_block_header(id: u8, size: usize, out: &mut Vec<u8>) -> Result<()> {
    check_stream_id(id)?;
    if size >= MAX_BLOCK_SIZE {
        return Err(Error::InvalidBlockHeader);
    }
    let mut size = size;
    match id {
        0 => {
            if size < 1 << 14 {
                put(out, &mut size, 7, 0x00);
                put(out, &mut size, 0, 0x00);
            } else if size < 1 << 21 {
                put(out, &mut size, 14, 0x00);
                put(out, &mut size, 7, 0x80);
                put(out, &mut size, 0, 0x00);
            } else {
                put(out, &mut size, 22, 0x00);
                put(out, &mut size, 15, 0x80);
                put(out, &mut size, 8, 0x80);
                put(out, &mut size, 0, 0x00);
            }
        }
        1..=4 => {
            let mask = 0x80 | ((id - 1) << 4);
            if size < 1 << 11 {
                put(out, &mut size, 7, mask);
                put(out, &mut size, 0, 0x00);
            } else if size < 1 << 18 {
                put(out, &mut size, 14, mask);
                put(out, &mut size, 7, 0x80);
                put(out, &mut size, 0, 0x00);
            } else {
                put(out, &mut size, 22, mask);
                put(out, &mut size, 15, 0x80);
                put(out, &mut size, 8, 0x80);
                put(out, &mut size, 0, 0x00);
            }
        }
        _ => {
            out.push(0xC0 | id);
            if size < 1 << 15 {
                put(out, &mut size, 7, 0x00);
                put(out, &mut size, 0, 0x00);
            } else {
                put(out, &mut size, 15, 0x00);
                put(out, &mut size, 8, 0x80);
                put(out, &mut size, 0, 0x00);
            }
        }
    }
    Ok(())
}

fn read_byte(input: &mut impl Read) -> Result<Option<u8>> {
    let mut b = [0u8; 1];
    loop {
        match input.read(&mut b) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(b[0])),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
}

fn require_byte(input: &mut impl Read) -> Result<u8> {
    read_byte(input)?.ok_or(Error::PrematureEndOfStream)
}

/// Reads up to `max` length bytes; the last of them carries a full 8 bits.
fn read_length_bytes(input: &mut impl Read, mut size: usize, mut max: u32) -> Result<usize> {
    let mut more = true;
    while more && max > 1 {
        let mut b = require_byte(input)?;
        if b & 0x80 == 0 {
            more = false;
        } else {
            b &= 0x7F;
        }
        size = usize::from(b) | size << 7;
        max -= 1;
    }
    if more {
        let b = require_byte(input)?;
        size = usize::from(b) | size << 8;
    }
    Ok(size)
}

/// Reads one block header. Returns `None` at a clean end of stream (no
/// byte of a new header available); a header cut off midway is an error.
pub fn decode_block_header(input: &mut impl Read) -> Result<Option<(u8, usize)>> {
    let Some(b0) = read_byte(input)? else {
        return Ok(None);
    };
    let header = if b0 & 0x80 == 0 {
        // 0xxx xxxx
        (0, read_length_bytes(input, usize::from(b0), 3)?)
    } else if b0 & 0x40 == 0 {
        // 10yy xxxx
        let id = ((b0 >> 4) & 0x03) + 1;
        (id, read_length_bytes(input, usize::from(b0 & 0x0F), 3)?)
    } else {
        // 11yy yyyy
        let id = b0 & 0x3F;
        let first = usize::from(require_byte(input)?);
        (id, read_length_bytes(input, first, 2)?)
    };
    Ok(Some(header))
}
