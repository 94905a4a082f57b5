//! XML parsing to document events.
//!
//! Uses quick-xml's namespace-aware reader. The compressed form keeps
//! elements, attributes and text only, so comments, processing
//! instructions and the document type declaration are dropped (entities
//! declared in the internal subset are still resolved). Namespace
//! declarations never show up as attributes.

use std::io::Read;
use std::path::Path;

use crate::event::Event;
use crate::{Error, Result};

mod entities;
mod reader;

pub(crate) use reader::emit_xml_events;

/// Parses XML from `input`, calling `emit` for every event (streaming).
pub fn parse_xml(input: impl Read, emit: impl FnMut(Event) -> Result<()>) -> Result<()> {
    emit_xml_events(input, emit)
}

/// Parses an XML string into events.
pub fn parse_xml_str(xml: &str) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    emit_xml_events(xml.as_bytes(), |e| {
        events.push(e);
        Ok(())
    })?;
    Ok(events)
}

/// Parses an XML file into events.
pub fn parse_xml_file(path: &Path) -> Result<Vec<Event>> {
    let file = std::fs::File::open(path)
        .map_err(|e| Error::IoError(format!("{}: {e}", path.display())))?;
    let mut events = Vec::new();
    emit_xml_events(file, |e| {
        events.push(e);
        Ok(())
    })?;
    Ok(events)
}
