//! Variable-length 7-bit unsigned integers on byte streams.
//!
//! Each octet has a continuation bit (MSB) and 7 data bits. The least
//! significant group is written first. The last octet has continuation = 0.
//! Used for string lengths on the data channel.

use std::io::{Read, Write};

use crate::{Error, Result};

/// Encodes a `u64` as a variable-length unsigned integer.
pub fn write(writer: &mut impl Write, value: u64) -> Result<()> {
    if value < 128 {
        // Fast-Path: Single-Byte (häufigster Fall, kurze Strings)
        writer.write_all(&[value as u8])?;
        return Ok(());
    }
    let mut buf = [0u8; 10];
    let mut len = 0;
    let mut v = value;
    loop {
        let low7 = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            buf[len] = low7;
            len += 1;
            break;
        }
        buf[len] = 0x80 | low7;
        len += 1;
    }
    writer.write_all(&buf[..len])?;
    Ok(())
}

/// Decodes a variable-length unsigned integer.
pub fn read(reader: &mut impl Read) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        let byte = byte[0];
        let data = u64::from(byte & 0x7F);
        // Bei shift 63 (10. Byte) ist nur Daten-Bit 0 gültig, kein Continuation-Byte.
        if shift == 63 && (data > 1 || byte & 0x80 != 0) {
            return Err(Error::MalformedContent("length prefix overflows 64 bits".into()));
        }
        result |= data << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}
