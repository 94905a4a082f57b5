//! PPM filter: an adaptive order-N context model driving an arithmetic coder.
//!
//! Each byte is coded in the longest context (the preceding N bytes down to
//! none) that has seen it before; unseen bytes escape to shorter contexts and
//! finally to a uniform order -1 model over all bytes plus an end symbol.
//! Escape frequency is the number of distinct symbols in a context.
//! Encoder and decoder update the model identically after every symbol.
//!
//! The contextual variant (`hpm4`/`hpm5`) additionally primes the model with
//! a context byte before each data item, see [`PpmWriter::note_context`].
//! Priming updates the model as if the byte had been coded but emits no bits,
//! so both sides must prime at the same positions.

use std::io::{self, Read, Write};

use crate::bitstream::{BitReader, BitWriter};
use crate::multiplex::to_io_error;
use crate::{Error, FastHashMap, Result};

/// End symbol, codable only in the order -1 model.
const END_SYMBOL: u16 = 256;
/// Alphabet of the order -1 model: 256 bytes plus end.
const ORDER_MINUS_ONE_TOTAL: u32 = 257;
/// A context halves its counts once their sum exceeds this.
const MAX_TOTAL: u32 = 1 << 14;
/// Buffered bytes at which the coder output is drained.
const DRAIN_THRESHOLD: usize = 4096;

const TOP: u64 = 0xFFFF_FFFF;
const HALF: u64 = 0x8000_0000;
const QUARTER: u64 = 0x4000_0000;
/// Padding bits past the end a valid stream may need.
const MAX_PADDING_BITS: u32 = 64;

// ============================================================================
// Arithmetic coder (32-bit, bit-oriented, pending bits)
// ============================================================================

struct ArithmeticEncoder {
    low: u64,
    high: u64,
    pending: u64,
    out: BitWriter,
}

impl ArithmeticEncoder {
    fn new() -> Self {
        Self { low: 0, high: TOP, pending: 0, out: BitWriter::new() }
    }

    fn emit(&mut self, bit: bool) {
        self.out.write_bit(bit);
        while self.pending > 0 {
            self.out.write_bit(!bit);
            self.pending -= 1;
        }
    }

    /// Codes the interval [cum_low, cum_high) of `total`.
    fn encode(&mut self, cum_low: u32, cum_high: u32, total: u32) {
        let range = self.high - self.low + 1;
        self.high = self.low + range * u64::from(cum_high) / u64::from(total) - 1;
        self.low += range * u64::from(cum_low) / u64::from(total);
        loop {
            if self.high < HALF {
                self.emit(false);
            } else if self.low >= HALF {
                self.emit(true);
                self.low -= HALF;
                self.high -= HALF;
            } else if self.low >= QUARTER && self.high < HALF + QUARTER {
                self.pending += 1;
                self.low -= QUARTER;
                self.high -= QUARTER;
            } else {
                break;
            }
            self.low <<= 1;
            self.high = (self.high << 1) | 1;
        }
    }

    fn finish(&mut self) {
        self.pending += 1;
        let bit = self.low >= QUARTER;
        self.emit(bit);
    }
}

struct ArithmeticDecoder<R> {
    low: u64,
    high: u64,
    value: u64,
    input: BitReader<R>,
    padding: u32,
}

impl<R: Read> ArithmeticDecoder<R> {
    fn new(inner: R) -> Result<Self> {
        let mut dec = Self { low: 0, high: TOP, value: 0, input: BitReader::new(inner), padding: 0 };
        for _ in 0..32 {
            dec.value = (dec.value << 1) | dec.next_bit()?;
        }
        Ok(dec)
    }

    /// Next input bit; past the end the decoder reads zeros, but only as
    /// many as a terminated stream can need.
    fn next_bit(&mut self) -> Result<u64> {
        match self.input.read_bit() {
            Ok(bit) => Ok(u64::from(bit)),
            Err(Error::PrematureEndOfStream) if self.padding < MAX_PADDING_BITS => {
                self.padding += 1;
                Ok(0)
            }
            Err(Error::PrematureEndOfStream) => {
                Err(Error::CompressionError("PPM stream ends without end symbol".into()))
            }
            Err(e) => Err(e),
        }
    }

    /// Position of the current value within `total`.
    fn target(&self, total: u32) -> Result<u32> {
        let range = self.high - self.low + 1;
        let target = ((self.value - self.low + 1) * u64::from(total) - 1) / range;
        if target >= u64::from(total) {
            return Err(Error::CompressionError("corrupt PPM stream".into()));
        }
        Ok(target as u32)
    }

    fn consume(&mut self, cum_low: u32, cum_high: u32, total: u32) -> Result<()> {
        let range = self.high - self.low + 1;
        self.high = self.low + range * u64::from(cum_high) / u64::from(total) - 1;
        self.low += range * u64::from(cum_low) / u64::from(total);
        loop {
            if self.high < HALF {
                // nichts abzuziehen
            } else if self.low >= HALF {
                self.value -= HALF;
                self.low -= HALF;
                self.high -= HALF;
            } else if self.low >= QUARTER && self.high < HALF + QUARTER {
                self.value -= QUARTER;
                self.low -= QUARTER;
                self.high -= QUARTER;
            } else {
                break;
            }
            self.low <<= 1;
            self.high = (self.high << 1) | 1;
            self.value = (self.value << 1) | self.next_bit()?;
        }
        Ok(())
    }
}

// ============================================================================
// Context model
// ============================================================================

#[derive(Default)]
struct Context {
    /// (symbol, frequency) in insertion order.
    symbols: Vec<(u16, u32)>,
    total: u32,
}

impl Context {
    fn lookup(&self, symbol: u16) -> Option<(u32, u32)> {
        let mut low = 0;
        for &(s, freq) in &self.symbols {
            if s == symbol {
                return Some((low, freq));
            }
            low += freq;
        }
        None
    }

    fn find(&self, target: u32) -> Option<(u16, u32, u32)> {
        let mut low = 0;
        for &(s, freq) in &self.symbols {
            if target < low + freq {
                return Some((s, low, freq));
            }
            low += freq;
        }
        None
    }

    fn add(&mut self, symbol: u16) {
        match self.symbols.iter_mut().find(|(s, _)| *s == symbol) {
            Some((_, freq)) => *freq += 1,
            None => self.symbols.push((symbol, 1)),
        }
        self.total += 1;
        if self.total > MAX_TOTAL {
            self.total = 0;
            for (_, freq) in &mut self.symbols {
                *freq = (*freq / 2).max(1);
                self.total += *freq;
            }
        }
    }
}

struct PpmModel {
    order: usize,
    contexts: FastHashMap<u64, Context>,
    history: Vec<u8>,
}

impl PpmModel {
    fn new(order: usize) -> Self {
        debug_assert!(order <= 7, "context key holds at most 7 bytes");
        Self { order, contexts: FastHashMap::default(), history: Vec::with_capacity(order + 1) }
    }

    /// Key of the context of the last `k` bytes (length in the top byte).
    fn key(&self, k: usize) -> u64 {
        let start = self.history.len() - k;
        let packed = self.history[start..].iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
        packed | (k as u64) << 56
    }

    fn max_order(&self) -> usize {
        self.order.min(self.history.len())
    }

    fn encode(&mut self, symbol: u16, enc: &mut ArithmeticEncoder) {
        for k in (0..=self.max_order()).rev() {
            if let Some(ctx) = self.contexts.get(&self.key(k)) {
                let total = ctx.total + ctx.symbols.len() as u32;
                if let Some((low, freq)) = ctx.lookup(symbol) {
                    enc.encode(low, low + freq, total);
                    self.update(symbol);
                    return;
                }
                enc.encode(ctx.total, total, total);
            }
        }
        let s = u32::from(symbol);
        enc.encode(s, s + 1, ORDER_MINUS_ONE_TOTAL);
        self.update(symbol);
    }

    fn decode<R: Read>(&mut self, dec: &mut ArithmeticDecoder<R>) -> Result<u16> {
        for k in (0..=self.max_order()).rev() {
            if let Some(ctx) = self.contexts.get(&self.key(k)) {
                let total = ctx.total + ctx.symbols.len() as u32;
                let target = dec.target(total)?;
                if target < ctx.total {
                    let (symbol, low, freq) = ctx
                        .find(target)
                        .ok_or_else(|| Error::CompressionError("corrupt PPM stream".into()))?;
                    dec.consume(low, low + freq, total)?;
                    self.update(symbol);
                    return Ok(symbol);
                }
                dec.consume(ctx.total, total, total)?;
            }
        }
        let target = dec.target(ORDER_MINUS_ONE_TOTAL)?;
        dec.consume(target, target + 1, ORDER_MINUS_ONE_TOTAL)?;
        let symbol = target as u16;
        self.update(symbol);
        Ok(symbol)
    }

    /// Uncoded symbol: only the statistics and the history see it.
    fn note(&mut self, byte: u8) {
        self.update(u16::from(byte));
    }

    fn update(&mut self, symbol: u16) {
        if symbol == END_SYMBOL {
            return;
        }
        for k in 0..=self.max_order() {
            let key = self.key(k);
            self.contexts.entry(key).or_default().add(symbol);
        }
        if self.history.len() == self.order {
            if self.order == 0 {
                return;
            }
            self.history.remove(0);
        }
        self.history.push(symbol as u8);
    }
}

// ============================================================================
// Stream adapters
// ============================================================================

/// Compressing `Write` adapter. [`PpmWriter::finish`] must be called to
/// write the end symbol.
pub struct PpmWriter<W: Write> {
    inner: W,
    model: PpmModel,
    enc: ArithmeticEncoder,
}

impl<W: Write> PpmWriter<W> {
    pub fn new(inner: W, order: usize) -> Self {
        Self { inner, model: PpmModel::new(order), enc: ArithmeticEncoder::new() }
    }

    /// Primes the model with `key` before the next written bytes.
    pub fn note_context(&mut self, key: u8) {
        self.model.note(key);
    }

    /// Codes the end symbol, flushes the coder and returns the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.model.encode(END_SYMBOL, &mut self.enc);
        self.enc.finish();
        self.enc.out.close_into(&mut self.inner)?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for PpmWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &b in buf {
            self.model.encode(u16::from(b), &mut self.enc);
        }
        if self.enc.out.buf_len() >= DRAIN_THRESHOLD {
            self.enc.out.drain_to(&mut self.inner)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.enc.out.drain_to(&mut self.inner)?;
        self.inner.flush()
    }
}

/// Decompressing `Read` adapter.
pub struct PpmReader<R: Read> {
    model: PpmModel,
    dec: Option<ArithmeticDecoder<R>>,
    inner: Option<R>,
    done: bool,
}

impl<R: Read> PpmReader<R> {
    pub fn new(inner: R, order: usize) -> Self {
        // Der Decoder liest 32 Bits vorab; das geschieht erst beim ersten read().
        Self { model: PpmModel::new(order), dec: None, inner: Some(inner), done: false }
    }

    /// Primes the model with `key` before the next read bytes; mirrors
    /// [`PpmWriter::note_context`]. Reads decode lazily, so nothing of the
    /// following item has been decoded yet.
    pub fn note_context(&mut self, key: u8) {
        self.model.note(key);
    }

    fn read_symbols(&mut self, buf: &mut [u8]) -> Result<usize> {
        if let Some(inner) = self.inner.take() {
            self.dec = Some(ArithmeticDecoder::new(inner)?);
        }
        let Some(dec) = self.dec.as_mut() else {
            return Ok(0);
        };
        let mut n = 0;
        while n < buf.len() && !self.done {
            let symbol = self.model.decode(dec)?;
            if symbol == END_SYMBOL {
                self.done = true;
            } else {
                buf[n] = symbol as u8;
                n += 1;
            }
        }
        Ok(n)
    }
}

impl<R: Read> Read for PpmReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_symbols(buf).map_err(to_io_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compress(data: &[u8], order: usize) -> Vec<u8> {
        let mut w = PpmWriter::new(Vec::new(), order);
        w.write_all(data).unwrap();
        w.finish().unwrap()
    }

    fn decompress(data: &[u8], order: usize) -> Vec<u8> {
        let mut r = PpmReader::new(data, order);
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn empty_input() {
        let packed = compress(b"", 4);
        assert!(!packed.is_empty());
        assert_eq!(decompress(&packed, 4), b"");
    }

    #[test]
    fn round_trip_text() {
        let text = b"the quick brown fox jumps over the lazy dog; the quick brown fox again";
        for order in [0, 1, 4, 5] {
            let packed = compress(text, order);
            assert_eq!(decompress(&packed, order), text.to_vec(), "order {order}");
        }
    }

    #[test]
    fn round_trip_all_bytes() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 256) as u8).collect();
        let packed = compress(&data, 4);
        assert_eq!(decompress(&packed, 4), data);
    }

    #[test]
    fn repetitive_input_shrinks() {
        let data = b"abcabcabcabc".repeat(200);
        let packed = compress(&data, 4);
        assert!(packed.len() * 10 < data.len(), "{} vs {}", packed.len(), data.len());
        assert_eq!(decompress(&packed, 4), data);
    }

    #[test]
    fn rescaling_keeps_round_trip() {
        // Mehr als MAX_TOTAL Symbole in einem Kontext
        let data = vec![b'a'; 40_000];
        let packed = compress(&data, 2);
        assert_eq!(decompress(&packed, 2), data);
    }

    #[test]
    fn truncated_stream_terminates() {
        let text = b"some text that will be cut short, some text that will be cut short";
        let packed = compress(text, 4);
        let mut r = PpmReader::new(&packed[..packed.len() / 2], 4);
        let mut out = Vec::new();
        // Ergebnis egal, Hauptsache kein Endlos-Dekodieren
        let _ = r.read_to_end(&mut out);
        assert!(out.len() < 100_000);
    }

    #[test]
    fn primed_items_round_trip() {
        let items: [(u8, &[u8]); 4] = [(7, b"alpha"), (9, b"1999-02-03"), (7, b"alphabet"), (9, b"2001-12-24")];
        let mut w = PpmWriter::new(Vec::new(), 4);
        for (key, item) in items {
            w.note_context(key);
            w.write_all(item).unwrap();
        }
        let packed = w.finish().unwrap();
        assert_ne!(packed, compress(&items.iter().flat_map(|(_, i)| i.to_vec()).collect::<Vec<_>>(), 4));

        let mut r = PpmReader::new(&packed[..], 4);
        for (key, item) in items {
            r.note_context(key);
            let mut buf = vec![0; item.len()];
            r.read_exact(&mut buf).unwrap();
            assert_eq!(buf, item);
        }
        let mut rest = Vec::new();
        r.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
    }

    #[test]
    fn priming_moves_the_history() {
        let mut model = PpmModel::new(2);
        model.note(b'x');
        model.note(b'y');
        model.note(b'z');
        assert_eq!(model.history, b"yz");
        assert!(model.contexts.contains_key(&model.key(0)));
    }

    #[test]
    fn context_key_distinguishes_lengths() {
        let mut model = PpmModel::new(4);
        model.history = vec![0, 0, 1];
        assert_ne!(model.key(1), model.key(2));
        assert_ne!(model.key(0), model.key(1));
        assert_eq!(model.key(0), 0);
    }
}
