//! The rngzip container: settings, tree channel and data channel over one
//! multiplexed byte stream.
//!
//! ```text
//! [outer magic][inner magic]
//!   stream 1: settings record
//!   stream 0: choice bits            (tree filter)
//!   stream 2: schema ref, checksum?, (data filter)
//!             then one length-prefixed string per content item
//! ```

use core::fmt;
use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::Rc;

use crate::bitstream::{BitReader, BitWriter};
use crate::choice::ChoiceCoder;
use crate::compression::{ChannelDecoder, ChannelEncoder};
use crate::config::{CompressConfig, TraceConfig};
use crate::multiplex::{MultiplexReader, MultiplexWriter, StreamReader, StreamWriter};
use crate::qname::QName;
use crate::settings::{BIT_STREAM, DATA_STREAM, SETTINGS_MAGIC, Settings};
use crate::{Error, Result, unsigned_integer};

/// Buffered choice bytes at which they are drained into the tree channel.
const BIT_DRAIN_THRESHOLD: usize = 4096;

/// Destination of the compressor's committed output.
///
/// Choice coders are created through the output so that a trace output can
/// substitute its own bookkeeping.
pub trait RnzOutput {
    /// Coder for a choice point with `limit` alternatives.
    fn make_coder(&self, limit: u32, id: usize) -> Result<ChoiceCoder>;
    /// Writes one choice with the given coder.
    fn write_choice(&mut self, coder: &mut ChoiceCoder, choice: u32) -> Result<()>;
    /// Writes one content string. `context` names what the string belongs
    /// to (element name, or `@` plus attribute name) and is `None` for
    /// wildcard names.
    fn write_content(&mut self, context: Option<&str>, content: &str) -> Result<()>;
}

/// Data context of element text: the element's Clark name.
pub fn element_context(name: &QName) -> String {
    name.to_clark()
}

/// Data context of an attribute value: `@` plus the attribute's Clark name.
pub fn attribute_context(name: &QName) -> String {
    format!("@{}", name.to_clark())
}

// ============================================================================
// Writer
// ============================================================================

/// Writes the rngzip container.
pub struct RnzWriter<W: Write> {
    mux: Rc<RefCell<MultiplexWriter<W>>>,
    settings: Settings,
    bits: BitWriter,
    tree: ChannelEncoder<StreamWriter<W>>,
    data: ChannelEncoder<StreamWriter<W>>,
    trace_choices: bool,
    choices: u64,
    strings: u64,
}

impl<W: Write> RnzWriter<W> {
    /// Opens the container and writes settings and the data channel header.
    ///
    /// The checksum is only stored when `schema_ref` is non-empty.
    pub fn new(out: W, config: &CompressConfig, schema_ref: &str, checksum: u64) -> Result<Self> {
        let mux = MultiplexWriter::new(out, SETTINGS_MAGIC)?
            .with_capacity(config.block_capacity)
            .with_block_trace(config.trace.blocks);
        let mux = Rc::new(RefCell::new(mux));
        let settings = config.settings;
        settings.write_to(&mux)?;
        let tree = settings.tree.encoder(MultiplexWriter::open(&mux, BIT_STREAM)?);
        let data = settings.data.encoder(MultiplexWriter::open(&mux, DATA_STREAM)?);
        let mut writer = Self {
            mux,
            settings,
            bits: BitWriter::new(),
            tree,
            data,
            trace_choices: config.trace.choices,
            choices: 0,
            strings: 0,
        };
        write_string(&mut writer.data, schema_ref)?;
        if !schema_ref.is_empty() {
            writer.data.write_all(&checksum.to_be_bytes())?;
        }
        Ok(writer)
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Finishes both channel filters, flushes the multiplexer and returns the
    /// underlying writer.
    pub fn finish(self) -> Result<W> {
        let Self { mux, mut bits, mut tree, data, choices, strings, .. } = self;
        bits.close_into(&mut tree)?;
        drop(tree.finish()?);
        drop(data.finish()?);
        log::debug!("rnz: {choices} choices, {strings} strings");
        let mux = Rc::try_unwrap(mux)
            .map_err(|_| Error::IoError("multiplexed stream still has open channels".into()))?
            .into_inner();
        mux.finish()
    }
}

impl<W: Write> RnzOutput for RnzWriter<W> {
    fn make_coder(&self, limit: u32, id: usize) -> Result<ChoiceCoder> {
        self.settings.make_coder(limit, id)
    }

    fn write_choice(&mut self, coder: &mut ChoiceCoder, choice: u32) -> Result<()> {
        if self.trace_choices {
            log::trace!("choice {choice} at {coder}");
        }
        coder.encode(choice, &mut self.bits)?;
        self.choices += 1;
        if self.bits.buf_len() >= BIT_DRAIN_THRESHOLD {
            self.bits.drain_to(&mut self.tree)?;
        }
        Ok(())
    }

    fn write_content(&mut self, context: Option<&str>, content: &str) -> Result<()> {
        if self.trace_choices {
            log::trace!("data [{}] {}", context.unwrap_or(""), abbreviate(content));
        }
        self.strings += 1;
        self.data.note_context(context);
        write_string(&mut self.data, content)
    }
}

fn write_string(out: &mut impl Write, s: &str) -> Result<()> {
    unsigned_integer::write(out, s.len() as u64)?;
    out.write_all(s.as_bytes())?;
    Ok(())
}

// ============================================================================
// Reader
// ============================================================================

/// Reads the rngzip container.
pub struct RnzReader<R: Read> {
    settings: Settings,
    bits: BitReader<ChannelDecoder<StreamReader<R>>>,
    data: ChannelDecoder<StreamReader<R>>,
    schema_ref: String,
    checksum: Option<u64>,
    trace_choices: bool,
}

impl<R: Read> RnzReader<R> {
    /// Opens the container and reads settings and the data channel header.
    pub fn new(input: R, trace: TraceConfig) -> Result<Self> {
        let mux = MultiplexReader::new(input)?.with_block_trace(trace.blocks);
        let mux = Rc::new(RefCell::new(mux));
        let settings = Settings::read_from(&mux)?;
        let bits = BitReader::new(settings.tree.decoder(MultiplexReader::open(&mux, BIT_STREAM)?));
        let mut data = settings.data.decoder(MultiplexReader::open(&mux, DATA_STREAM)?);
        let schema_ref = read_string(&mut data)?;
        let checksum = if schema_ref.is_empty() {
            None
        } else {
            let mut buf = [0u8; 8];
            data.read_exact(&mut buf)?;
            Some(u64::from_be_bytes(buf))
        };
        Ok(Self { settings, bits, data, schema_ref, checksum, trace_choices: trace.choices })
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Schema reference stored by the compressor (empty if none).
    pub fn schema_ref(&self) -> &str {
        &self.schema_ref
    }

    /// Schema checksum, present iff a schema reference is stored.
    pub fn checksum(&self) -> Option<u64> {
        self.checksum
    }

    pub fn make_coder(&self, limit: u32, id: usize) -> Result<ChoiceCoder> {
        self.settings.make_coder(limit, id)
    }

    pub fn read_choice(&mut self, coder: &mut ChoiceCoder) -> Result<u32> {
        let choice = coder.decode(&mut self.bits)?;
        if self.trace_choices {
            log::trace!("choice {choice} at {coder}");
        }
        Ok(choice)
    }

    /// Reads one content string; `context` must match what the compressor
    /// passed to [`RnzOutput::write_content`].
    pub fn read_content(&mut self, context: Option<&str>) -> Result<String> {
        self.data.note_context(context);
        let s = read_string(&mut self.data)?;
        if self.trace_choices {
            log::trace!("data [{}] {}", context.unwrap_or(""), abbreviate(&s));
        }
        Ok(s)
    }
}

fn read_string(input: &mut impl Read) -> Result<String> {
    let len = unsigned_integer::read(input)?;
    let mut bytes = Vec::new();
    let read = input.take(len).read_to_end(&mut bytes)?;
    if read as u64 != len {
        return Err(Error::PrematureEndOfStream);
    }
    String::from_utf8(bytes).map_err(|_| Error::MalformedContent("content is not valid UTF-8".into()))
}

/// Shortens content for trace output.
fn abbreviate(s: &str) -> String {
    let flat: String = s.chars().map(|c| if c.is_whitespace() { ' ' } else { c }).collect();
    match flat.char_indices().nth(64) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

// ============================================================================
// Recording output
// ============================================================================

/// One write seen by a [`RecordingOutput`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Choice { choice: u32, limit: u32, id: usize },
    Content(String),
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Choice { choice, limit, id } => write!(f, "choice: {choice} of {limit} at #{id}"),
            Self::Content(s) => write!(f, "data: {}", abbreviate(s)),
        }
    }
}

/// Output that records choices and content instead of encoding them.
///
/// Used to inspect what the compressor commits, e.g. for `--debug`-style
/// listings and in tests.
#[derive(Debug, Default)]
pub struct RecordingOutput {
    settings: Settings,
    records: Vec<Record>,
}

impl RecordingOutput {
    pub fn new(settings: Settings) -> Self {
        Self { settings, records: Vec::new() }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl RnzOutput for RecordingOutput {
    fn make_coder(&self, limit: u32, id: usize) -> Result<ChoiceCoder> {
        self.settings.make_coder(limit, id)
    }

    fn write_choice(&mut self, coder: &mut ChoiceCoder, choice: u32) -> Result<()> {
        let limit = coder.limit();
        if choice >= limit {
            return Err(Error::InvalidChoice { choice: u64::from(choice), limit });
        }
        self.records.push(Record::Choice { choice, limit, id: coder.id() });
        Ok(())
    }

    fn write_content(&mut self, _context: Option<&str>, content: &str) -> Result<()> {
        self.records.push(Record::Content(content.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::choice::BitCoding;
    use crate::compression::DataCompression;

    fn config(coding: BitCoding, tree: DataCompression, data: DataCompression) -> CompressConfig {
        CompressConfig::with_settings(Settings::new(coding, tree, data))
    }

    #[test]
    fn header_without_schema_ref() {
        let cfg = config(BitCoding::Fixed, DataCompression::None, DataCompression::None);
        let w = RnzWriter::new(Vec::new(), &cfg, "", 0xDEAD).unwrap();
        let bytes = w.finish().unwrap();
        let r = RnzReader::new(&bytes[..], TraceConfig::default()).unwrap();
        assert_eq!(r.schema_ref(), "");
        assert_eq!(r.checksum(), None);
        assert_eq!(r.settings(), cfg.settings);
    }

    #[test]
    fn header_with_schema_ref_and_checksum() {
        let cfg = CompressConfig::default();
        let w = RnzWriter::new(Vec::new(), &cfg, "file:doc.json", 0x0102_0304_0506_0708).unwrap();
        let bytes = w.finish().unwrap();
        let r = RnzReader::new(&bytes[..], TraceConfig::default()).unwrap();
        assert_eq!(r.schema_ref(), "file:doc.json");
        assert_eq!(r.checksum(), Some(0x0102_0304_0506_0708));
    }

    #[test]
    fn choices_and_content_round_trip() {
        for (tree, data) in [
            (DataCompression::None, DataCompression::None),
            (DataCompression::Gzip, DataCompression::Bzip2),
            (DataCompression::Ppm4, DataCompression::Ppm5),
            (DataCompression::Hpm4, DataCompression::Hpm5),
        ] {
            let cfg = config(BitCoding::Huffman, tree, data);
            let items = [(Some("name"), "alpha"), (Some("@id"), ""), (None, "gamma ünïcode")];
            let mut w = RnzWriter::new(Vec::new(), &cfg, "s.json", 9).unwrap();
            let mut enc = w.make_coder(5, 7).unwrap();
            for (i, (cx, s)) in items.iter().enumerate() {
                w.write_choice(&mut enc, i as u32).unwrap();
                w.write_content(*cx, s).unwrap();
            }
            let bytes = w.finish().unwrap();

            let mut r = RnzReader::new(&bytes[..], TraceConfig::default()).unwrap();
            assert_eq!(r.schema_ref(), "s.json");
            let mut dec = r.make_coder(5, 7).unwrap();
            for (i, (cx, s)) in items.iter().enumerate() {
                assert_eq!(r.read_choice(&mut dec).unwrap(), i as u32);
                assert_eq!(r.read_content(*cx).unwrap(), *s);
            }
        }
    }

    #[test]
    fn reading_past_content_fails() {
        let cfg = config(BitCoding::Fixed, DataCompression::None, DataCompression::None);
        let bytes = RnzWriter::new(Vec::new(), &cfg, "", 0).unwrap().finish().unwrap();
        let mut r = RnzReader::new(&bytes[..], TraceConfig::default()).unwrap();
        assert_eq!(r.read_content(None), Err(Error::PrematureEndOfStream));
    }

    #[test]
    fn not_an_rnz_stream() {
        assert!(matches!(RnzReader::new(&b"<xml/>"[..], TraceConfig::default()), Err(Error::BadMagic)));
    }

    #[test]
    fn recording_output_lists_writes() {
        let mut out = RecordingOutput::new(Settings::default());
        let mut coder = out.make_coder(3, 4).unwrap();
        out.write_choice(&mut coder, 2).unwrap();
        out.write_content(Some("e"), "x").unwrap();
        assert_eq!(out.records(), &[Record::Choice { choice: 2, limit: 3, id: 4 }, Record::Content("x".into())]);
        assert_eq!(out.records()[0].to_string(), "choice: 2 of 3 at #4");
        assert!(out.write_choice(&mut coder, 3).is_err());
    }

    #[test]
    fn data_contexts() {
        assert_eq!(element_context(&QName::local("name")), "name");
        assert_eq!(attribute_context(&QName::new("urn:x", "id")), "@{urn:x}id");
    }

    #[test]
    fn abbreviate_long_content() {
        let long = "a\nb".repeat(40);
        let short = abbreviate(&long);
        assert!(short.ends_with("..."));
        assert!(!short.contains('\n'));
    }
}
