//! Bit packing for the tree channel.
//!
//! Choice coders emit codes of 0 to [`MAX_WIDTH`] bits; the adaptive coder
//! and the PPM arithmetic coder emit single bits. Codes are packed back to
//! back, most significant bit first, with no alignment between them. The
//! final partial byte is padded with zero bits, so a reader sees every
//! written code followed by at most seven zero bits.

use std::io::{ErrorKind, Read, Write};

use crate::{Error, Result};

/// Widest code a single call can write or read. Fixed choice codes need
/// at most 32 bits (`limit` is a `u32`); byte-aligned codes use 8 or 16.
pub const MAX_WIDTH: u8 = 32;

/// Mask of the lowest `width` bits.
#[inline]
fn low_bits(width: u32) -> u64 {
    (1u64 << width) - 1
}

/// Packs codes into bytes, MSB first.
///
/// Complete bytes collect in a buffer that the owner drains into the
/// channel from time to time; the trailing partial byte stays behind until
/// [`close_into`](Self::close_into) or [`into_vec`](Self::into_vec).
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    /// Bits not yet forming a whole byte, right-aligned; fewer than eight
    /// between calls.
    partial: u64,
    partial_len: u32,
    /// Bytes already handed out by `drain_to`.
    drained: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// One bit, as written by the adaptive and arithmetic coders.
    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        self.write_bits(u64::from(bit), 1);
    }

    /// The lowest `width` bits of `code`. Width 0 is a choice point with a
    /// single alternative and writes nothing.
    #[inline]
    pub fn write_bits(&mut self, code: u64, width: u8) {
        debug_assert!(width <= MAX_WIDTH, "code width {width} exceeds {MAX_WIDTH}");
        let width = u32::from(width);
        if width == 0 {
            return;
        }
        self.partial = (self.partial << width) | (code & low_bits(width));
        self.partial_len += width;
        while self.partial_len >= 8 {
            self.partial_len -= 8;
            self.bytes.push((self.partial >> self.partial_len) as u8);
        }
        self.partial &= low_bits(self.partial_len);
    }

    /// Bits written so far, drained bytes included.
    pub fn bit_position(&self) -> usize {
        (self.drained + self.bytes.len()) * 8 + self.partial_len as usize
    }

    /// Complete bytes waiting in the buffer.
    pub fn buf_len(&self) -> usize {
        self.bytes.len()
    }

    /// Hands the complete bytes to `writer`; the partial byte stays.
    pub fn drain_to(&mut self, writer: &mut impl Write) -> std::io::Result<()> {
        if self.bytes.is_empty() {
            return Ok(());
        }
        writer.write_all(&self.bytes)?;
        self.drained += self.bytes.len();
        self.bytes.clear();
        Ok(())
    }

    /// Pads the partial byte with zeros and drains everything into `writer`.
    pub fn close_into(&mut self, writer: &mut impl Write) -> std::io::Result<()> {
        self.pad();
        self.drain_to(writer)
    }

    /// Pads the partial byte with zeros and returns the undrained bytes.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.pad();
        self.bytes
    }

    fn pad(&mut self) {
        if self.partial_len > 0 {
            self.bytes.push((self.partial << (8 - self.partial_len)) as u8);
            self.partial = 0;
            self.partial_len = 0;
        }
    }
}

/// Unpacks codes written by a [`BitWriter`].
///
/// Bytes are pulled from the inner reader one at a time and only when a
/// code needs them, so the reader never runs ahead of the channel it sits
/// on.
pub struct BitReader<R> {
    inner: R,
    /// Fetched but unread bits, right-aligned.
    held: u64,
    held_len: u32,
    exhausted: bool,
}

impl<R: Read> BitReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, held: 0, held_len: 0, exhausted: false }
    }

    /// Pulls bytes until `width` bits are held or the input ends.
    fn fetch(&mut self, width: u32) -> Result<()> {
        let mut byte = [0u8; 1];
        while self.held_len < width && !self.exhausted {
            match self.inner.read(&mut byte) {
                Ok(0) => self.exhausted = true,
                Ok(_) => {
                    self.held = (self.held << 8) | u64::from(byte[0]);
                    self.held_len += 8;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    #[inline]
    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    /// Next code of `width` bits. Fails without consuming anything when
    /// fewer bits are left.
    pub fn read_bits(&mut self, width: u8) -> Result<u64> {
        debug_assert!(width <= MAX_WIDTH, "code width {width} exceeds {MAX_WIDTH}");
        let width = u32::from(width);
        if width == 0 {
            return Ok(0);
        }
        self.fetch(width)?;
        if self.held_len < width {
            return Err(Error::PrematureEndOfStream);
        }
        self.held_len -= width;
        let code = self.held >> self.held_len;
        self.held &= low_bits(self.held_len);
        Ok(code)
    }
}
