//! Whole-document entry points.
//!
//! `compress*` buffers the complete compressed form before touching the
//! destination writer, so a rejected document leaves the destination
//! untouched.

use std::io::{Read, Write};

use crate::automaton::Automaton;
use crate::compressor::Compressor;
use crate::config::{CompressConfig, DecompressConfig, TraceConfig};
use crate::decompressor::Decompressor;
use crate::event::Event;
use crate::rnz::{Record, RecordingOutput, RnzReader, RnzWriter};
use crate::settings::Settings;
use crate::xml::emit_xml_events;
use crate::xml_serializer::XmlWriter;
use crate::{Error, Result};

/// Compresses an event sequence and writes the result to `writer`.
///
/// `schema_ref` is stored in the header; when non-empty it is accompanied
/// by the automaton checksum.
pub fn compress<W: Write>(
    events: &[Event],
    automaton: &Automaton,
    schema_ref: &str,
    config: &CompressConfig,
    writer: W,
) -> Result<W> {
    let out = RnzWriter::new(Vec::new(), config, schema_ref, automaton.checksum())?;
    let mut compressor = Compressor::new(automaton, out, config.trace)?;
    for event in events {
        compressor.handle(event)?;
    }
    let bytes = compressor.finish()?.finish()?;
    write_all(writer, &bytes)
}

/// Parses XML from `input` and compresses it, streaming parser events
/// straight into the compressor.
pub fn compress_xml<W: Write>(
    input: impl Read,
    automaton: &Automaton,
    schema_ref: &str,
    config: &CompressConfig,
    writer: W,
) -> Result<W> {
    let out = RnzWriter::new(Vec::new(), config, schema_ref, automaton.checksum())?;
    let mut compressor = Compressor::new(automaton, out, config.trace)?;
    emit_xml_events(input, |event| compressor.handle(&event))?;
    let bytes = compressor.finish()?.finish()?;
    write_all(writer, &bytes)
}

/// Runs the compressor over XML from `input` without encoding anything and
/// returns the committed choices and content in write order.
pub fn list_xml(input: impl Read, automaton: &Automaton, config: &CompressConfig) -> Result<Vec<Record>> {
    let out = RecordingOutput::new(config.settings);
    let mut compressor = Compressor::new(automaton, out, config.trace)?;
    emit_xml_events(input, |event| compressor.handle(&event))?;
    Ok(compressor.finish()?.into_records())
}

fn write_all<W: Write>(mut writer: W, bytes: &[u8]) -> Result<W> {
    writer.write_all(bytes).map_err(Error::from)?;
    writer.flush().map_err(Error::from)?;
    Ok(writer)
}

/// Decompresses one document, passing each event to `emit`.
pub fn decompress(
    input: impl Read,
    automaton: &Automaton,
    config: DecompressConfig,
    emit: impl FnMut(Event) -> Result<()>,
) -> Result<()> {
    let reader = RnzReader::new(input, config.trace)?;
    Decompressor::new(automaton, reader, config)?.run(emit)
}

/// Decompresses one document to XML; `indent` enables pretty printing.
pub fn decompress_to_xml<W: Write>(
    input: impl Read,
    automaton: &Automaton,
    config: DecompressConfig,
    indent: Option<usize>,
    writer: W,
) -> Result<W> {
    let mut xml = XmlWriter::new(writer, indent);
    decompress(input, automaton, config, |event| xml.write_event(&event))?;
    xml.finish()
}

/// Header information of a compressed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub settings: Settings,
    pub schema_ref: String,
    /// Automaton checksum, present when a schema reference is stored.
    pub checksum: Option<u64>,
}

/// Reads the settings and the schema reference without decoding the
/// document.
pub fn identify(input: impl Read) -> Result<StreamInfo> {
    let reader = RnzReader::new(input, TraceConfig::default())?;
    Ok(StreamInfo {
        settings: reader.settings(),
        schema_ref: reader.schema_ref().to_string(),
        checksum: reader.checksum(),
    })
}
