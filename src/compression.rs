//! Channel filters: optional general-purpose compression applied to the
//! tree (bit) channel and the data channel before they reach the
//! multiplexer.
//!
//! ```text
//! choices → BitWriter ─→ [filter] → StreamWriter(0) ─┐
//! strings → varint+UTF-8 → [filter] → StreamWriter(2) ─┼→ MultiplexWriter
//! settings ─────────────────────────→ StreamWriter(1) ─┘
//! ```
//!
//! - `none`: bytes pass through
//! - `gz`: gzip container (flate2 crate)
//! - `bz2`: bzip2 (bzip2 crate)
//! - `ppm4` / `ppm5`: in-crate PPM model of order 4 or 5, see [`crate::ppm`]
//! - `hpm4` / `hpm5`: the same PPM models, primed before every data item
//!   with a byte hashed from the item's context (enclosing element name, or
//!   `@` plus the attribute name). On the tree channel they behave like
//!   `ppm4` / `ppm5`.

use core::fmt;
use core::str::FromStr;
use std::io::{self, Read, Write};

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use xxhash_rust::xxh64::xxh64;

use crate::ppm::{PpmReader, PpmWriter};
use crate::{Error, Result};

/// Stream compressor selectable for each channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataCompression {
    /// No compression.
    None,
    /// gzip (DEFLATE with gzip header).
    #[default]
    Gzip,
    /// bzip2 at the largest block size.
    Bzip2,
    /// PPM of order 4.
    Ppm4,
    /// PPM of order 5.
    Ppm5,
    /// Context-primed PPM of order 4.
    Hpm4,
    /// Context-primed PPM of order 5.
    Hpm5,
}

impl DataCompression {
    /// All compressors in index order.
    pub const ALL: [DataCompression; 7] =
        [Self::None, Self::Gzip, Self::Bzip2, Self::Ppm4, Self::Ppm5, Self::Hpm4, Self::Hpm5];

    /// Index stored in the settings record.
    pub fn index(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Gzip => 1,
            Self::Bzip2 => 2,
            Self::Ppm4 => 3,
            Self::Ppm5 => 4,
            Self::Hpm4 => 5,
            Self::Hpm5 => 6,
        }
    }

    /// Inverse of [`index`](Self::index).
    pub fn from_index(index: u8) -> Result<Self> {
        Self::ALL
            .get(usize::from(index))
            .copied()
            .ok_or(Error::UnknownCoding(index))
    }

    /// Canonical short name, as printed by `identify`.
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gz",
            Self::Bzip2 => "bz2",
            Self::Ppm4 => "ppm4",
            Self::Ppm5 => "ppm5",
            Self::Hpm4 => "hpm4",
            Self::Hpm5 => "hpm5",
        }
    }

    /// Wraps `inner` in the compressing side of this filter.
    pub fn encoder<W: Write>(self, inner: W) -> ChannelEncoder<W> {
        match self {
            Self::None => ChannelEncoder::Plain(inner),
            Self::Gzip => ChannelEncoder::Gzip(GzEncoder::new(inner, flate2::Compression::default())),
            Self::Bzip2 => ChannelEncoder::Bzip2(BzEncoder::new(inner, bzip2::Compression::best())),
            Self::Ppm4 => ChannelEncoder::Ppm(PpmWriter::new(inner, 4)),
            Self::Ppm5 => ChannelEncoder::Ppm(PpmWriter::new(inner, 5)),
            Self::Hpm4 => ChannelEncoder::Hpm(PpmWriter::new(inner, 4)),
            Self::Hpm5 => ChannelEncoder::Hpm(PpmWriter::new(inner, 5)),
        }
    }

    /// Wraps `inner` in the decompressing side of this filter.
    pub fn decoder<R: Read>(self, inner: R) -> ChannelDecoder<R> {
        match self {
            Self::None => ChannelDecoder::Plain(inner),
            Self::Gzip => ChannelDecoder::Gzip(GzDecoder::new(inner)),
            Self::Bzip2 => ChannelDecoder::Bzip2(BzDecoder::new(inner)),
            Self::Ppm4 => ChannelDecoder::Ppm(PpmReader::new(inner, 4)),
            Self::Ppm5 => ChannelDecoder::Ppm(PpmReader::new(inner, 5)),
            Self::Hpm4 => ChannelDecoder::Hpm(PpmReader::new(inner, 4)),
            Self::Hpm5 => ChannelDecoder::Hpm(PpmReader::new(inner, 5)),
        }
    }
}

impl fmt::Display for DataCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataCompression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "gz" | "gzip" => Ok(Self::Gzip),
            "bz2" | "bzip2" => Ok(Self::Bzip2),
            "ppm" | "ppm4" => Ok(Self::Ppm4),
            "ppm5" => Ok(Self::Ppm5),
            "hpm" | "hpm4" => Ok(Self::Hpm4),
            "hpm5" => Ok(Self::Hpm5),
            _ => Err(Error::UnknownCompressor(s.to_string())),
        }
    }
}

// ============================================================================
// Encoder / Decoder
// ============================================================================

/// Compressing side of a channel filter.
pub enum ChannelEncoder<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
    Bzip2(BzEncoder<W>),
    Ppm(PpmWriter<W>),
    Hpm(PpmWriter<W>),
}

impl<W: Write> ChannelEncoder<W> {
    /// Announces the context of the next data item. Only the contextual
    /// PPM filter uses it; `None` leaves the model untouched.
    pub fn note_context(&mut self, context: Option<&str>) {
        if let (Self::Hpm(e), Some(cx)) = (self, context) {
            e.note_context(context_key(cx));
        }
    }

    /// Writes the compressor trailer and returns the inner writer.
    pub fn finish(self) -> Result<W> {
        let inner = match self {
            Self::Plain(w) => w,
            Self::Gzip(e) => e.finish().map_err(compression_error)?,
            Self::Bzip2(e) => e.finish().map_err(compression_error)?,
            Self::Ppm(e) | Self::Hpm(e) => e.finish().map_err(compression_error)?,
        };
        Ok(inner)
    }
}

impl<W: Write> Write for ChannelEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Gzip(e) => e.write(buf),
            Self::Bzip2(e) => e.write(buf),
            Self::Ppm(e) | Self::Hpm(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Gzip(e) => e.flush(),
            Self::Bzip2(e) => e.flush(),
            Self::Ppm(e) | Self::Hpm(e) => e.flush(),
        }
    }
}

/// Decompressing side of a channel filter.
pub enum ChannelDecoder<R: Read> {
    Plain(R),
    Gzip(GzDecoder<R>),
    Bzip2(BzDecoder<R>),
    Ppm(PpmReader<R>),
    Hpm(PpmReader<R>),
}

impl<R: Read> ChannelDecoder<R> {
    /// Decoding counterpart of [`ChannelEncoder::note_context`].
    pub fn note_context(&mut self, context: Option<&str>) {
        if let (Self::Hpm(d), Some(cx)) = (self, context) {
            d.note_context(context_key(cx));
        }
    }
}

impl<R: Read> Read for ChannelDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(r) => r.read(buf),
            Self::Gzip(d) => d.read(buf),
            Self::Bzip2(d) => d.read(buf),
            Self::Ppm(d) | Self::Hpm(d) => d.read(buf),
        }
    }
}

/// Priming byte for a data context. xxh64 keeps it identical across
/// platforms and releases.
pub fn context_key(context: &str) -> u8 {
    xxh64(context.as_bytes(), 0) as u8
}

/// I/O error of a channel filter; tunnelled crate errors keep their kind.
fn compression_error(e: io::Error) -> Error {
    match Error::from(e) {
        Error::IoError(msg) => Error::CompressionError(msg),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(method: DataCompression, data: &[u8]) -> Vec<u8> {
        let mut enc = method.encoder(Vec::new());
        enc.write_all(data).unwrap();
        let packed = enc.finish().unwrap();
        let mut out = Vec::new();
        method.decoder(&packed[..]).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn every_filter_round_trips() {
        let data = b"<doc><item>alpha</item><item>beta</item><item>alpha</item></doc>".repeat(20);
        for method in DataCompression::ALL {
            assert_eq!(round_trip(method, &data), data, "{method}");
        }
    }

    #[test]
    fn every_filter_handles_empty_channel() {
        for method in DataCompression::ALL {
            assert!(round_trip(method, b"").is_empty(), "{method}");
        }
    }

    #[test]
    fn plain_is_identity() {
        let mut enc = DataCompression::None.encoder(Vec::new());
        enc.write_all(b"abc").unwrap();
        assert_eq!(enc.finish().unwrap(), b"abc");
    }

    #[test]
    fn gzip_writes_gzip_magic() {
        let mut enc = DataCompression::Gzip.encoder(Vec::new());
        enc.write_all(b"hello").unwrap();
        let packed = enc.finish().unwrap();
        assert_eq!(&packed[..2], &[0x1F, 0x8B]);
    }

    #[test]
    fn bzip2_writes_bzip2_magic() {
        let mut enc = DataCompression::Bzip2.encoder(Vec::new());
        enc.write_all(b"hello").unwrap();
        let packed = enc.finish().unwrap();
        assert_eq!(&packed[..3], b"BZh");
    }

    #[test]
    fn index_mapping() {
        for method in DataCompression::ALL {
            assert_eq!(DataCompression::from_index(method.index()).unwrap(), method);
        }
        assert_eq!(DataCompression::Gzip.index(), 1);
        assert_eq!(DataCompression::Ppm5.index(), 4);
        assert_eq!(DataCompression::Hpm4.index(), 5);
        assert_eq!(DataCompression::Hpm5.index(), 6);
        assert_eq!(DataCompression::from_index(9), Err(Error::UnknownCoding(9)));
    }

    #[test]
    fn names_parse() {
        assert_eq!("gz".parse::<DataCompression>().unwrap(), DataCompression::Gzip);
        assert_eq!("GZIP".parse::<DataCompression>().unwrap(), DataCompression::Gzip);
        assert_eq!("bzip2".parse::<DataCompression>().unwrap(), DataCompression::Bzip2);
        assert_eq!("ppm".parse::<DataCompression>().unwrap(), DataCompression::Ppm4);
        assert_eq!("none".parse::<DataCompression>().unwrap(), DataCompression::None);
        assert_eq!("hpm".parse::<DataCompression>().unwrap(), DataCompression::Hpm4);
        assert_eq!("hpm5".parse::<DataCompression>().unwrap(), DataCompression::Hpm5);
        assert_eq!(
            "lzma".parse::<DataCompression>(),
            Err(Error::UnknownCompressor("lzma".into()))
        );
    }

    fn contextual_round_trip(method: DataCompression, items: &[(Option<&str>, &str)]) -> Vec<u8> {
        let mut enc = method.encoder(Vec::new());
        for (cx, item) in items {
            enc.note_context(*cx);
            enc.write_all(item.as_bytes()).unwrap();
        }
        let packed = enc.finish().unwrap();
        let mut dec = method.decoder(&packed[..]);
        for (cx, item) in items {
            dec.note_context(*cx);
            let mut buf = vec![0; item.len()];
            dec.read_exact(&mut buf).unwrap();
            assert_eq!(buf, item.as_bytes(), "{method}");
        }
        packed
    }

    #[test]
    fn contexts_only_affect_hpm() {
        let items = [(Some("name"), "John Smith"), (Some("@id"), "1"), (None, "{urn:x}any"), (Some("name"), "Jane")];
        let joined: String = items.iter().map(|(_, i)| *i).collect();
        for method in DataCompression::ALL {
            let packed = contextual_round_trip(method, &items);
            // Byteweise Filter: Ausgabe unabhängig von der Aufteilung der Writes.
            if matches!(method, DataCompression::None | DataCompression::Ppm4 | DataCompression::Ppm5) {
                let mut plain = method.encoder(Vec::new());
                plain.write_all(joined.as_bytes()).unwrap();
                assert_eq!(packed, plain.finish().unwrap(), "{method}");
            }
        }
    }

    #[test]
    fn context_key_is_stable() {
        assert_eq!(context_key("name"), context_key("name"));
        assert_eq!(context_key(""), xxh64(b"", 0) as u8);
    }

    #[test]
    fn corrupt_gzip_is_an_error() {
        let mut out = Vec::new();
        let result = DataCompression::Gzip.decoder(&b"not gzip at all"[..]).read_to_end(&mut out);
        assert!(result.is_err());
    }
}
