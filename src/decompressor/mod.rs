//! Automaton-driven decompressor.
//!
//! Replays the choices recorded by the compressor. No forking is needed:
//! the compressed stream names the transition taken at every choice point,
//! so a plain stack of state ids drives the reconstruction.
//!
//! Open elements and attributes share one stack; an attribute entry
//! collects its value until the value state stops, then becomes an
//! `Attribute` event. Each entry also keeps the data context its text is
//! read under, mirroring what the compressor announced.

use std::io::Read;
use std::rc::Rc;

use crate::automaton::{Alphabet, Automaton, NameClass, StateId};
use crate::choice::ChoiceCoder;
use crate::config::DecompressConfig;
use crate::event::{AtContent, ChContent, Event};
use crate::qname::QName;
use crate::rnz::{RnzReader, attribute_context, element_context};
use crate::{Error, FastHashMap, Result};

/// Entry of the open-construct stack.
#[derive(Debug)]
enum Open {
    Element { context: String },
    Attribute { qname: Rc<QName>, context: String, value: String },
}

impl Open {
    fn element(qname: &QName) -> Self {
        Self::Element { context: element_context(qname) }
    }

    fn attribute(qname: Rc<QName>) -> Self {
        let context = attribute_context(&qname);
        Self::Attribute { qname, context, value: String::new() }
    }

    fn context(&self) -> &str {
        match self {
            Self::Element { context } | Self::Attribute { context, .. } => context,
        }
    }
}

/// Rebuilds the event stream of one compressed document.
pub struct Decompressor<'a, R: Read> {
    automaton: &'a Automaton,
    input: RnzReader<R>,
    coders: Vec<Option<ChoiceCoder>>,
    /// Shared names from the name table, by code.
    names: FastHashMap<u32, Rc<QName>>,
    trace_choices: bool,
}

impl<'a, R: Read> Decompressor<'a, R> {
    /// Checks the stored schema checksum and prepares the choice coders.
    pub fn new(automaton: &'a Automaton, input: RnzReader<R>, config: DecompressConfig) -> Result<Self> {
        if let Some(stored) = input.checksum() {
            let actual = automaton.checksum();
            if stored != actual {
                if !config.ignore_checksum {
                    return Err(Error::ChecksumMismatch { stored, actual });
                }
                log::warn!("schema checksum mismatch ignored: stream has {stored:016x}, schema has {actual:016x}");
            }
        }
        let mut coders = Vec::with_capacity(automaton.state_count());
        for state in 0..automaton.state_count() {
            let limit = automaton.choice_count(state as StateId);
            coders.push(if limit > 1 { Some(input.make_coder(limit, state)?) } else { None });
        }
        Ok(Self { automaton, input, coders, names: FastHashMap::default(), trace_choices: config.trace.choices })
    }

    /// Schema reference stored by the compressor.
    pub fn schema_ref(&self) -> &str {
        self.input.schema_ref()
    }

    /// Decodes the document, passing each event to `emit`.
    pub fn run(mut self, mut emit: impl FnMut(Event) -> Result<()>) -> Result<()> {
        let a = self.automaton;
        let mut stack: Vec<StateId> = vec![a.initial_state()];
        let mut open: Vec<Open> = Vec::new();
        let mut events: u64 = 0;
        emit(Event::StartDocument)?;

        while let Some(state) = stack.pop() {
            if a.is_null(state) {
                continue;
            }
            let limit = a.choice_count(state);
            let choice = self.read_choice(state, limit)?;

            if a.is_final(state) && choice == limit - 1 {
                match open.pop() {
                    Some(Open::Attribute { qname, value, .. }) => {
                        emit(Event::Attribute(AtContent { qname, value: value.into() }))?;
                    }
                    Some(Open::Element { .. }) => emit(Event::EndElement)?,
                    None => {
                        if !stack.is_empty() {
                            return Err(Error::MalformedContent("content after end of document".into()));
                        }
                        emit(Event::EndDocument)?;
                        log::debug!("decompressor: {} events", events + 2);
                        return Ok(());
                    }
                }
                events += 1;
                continue;
            }

            let t = choice as usize;
            match a.alphabet(state, t) {
                Alphabet::Element { name } => {
                    let qname = self.read_name(name)?;
                    open.push(Open::element(&qname));
                    emit(Event::StartElement(qname))?;
                }
                Alphabet::Attribute { name } => {
                    let qname = self.read_name(name)?;
                    open.push(Open::attribute(qname));
                }
                Alphabet::NonExistentAttribute { .. } => {}
                Alphabet::Data { .. } => {
                    let text = self.input.read_content(open.last().map(Open::context))?;
                    text_event(&mut open, &text, &mut emit)?;
                }
                Alphabet::Value { value } => text_event(&mut open, value, &mut emit)?,
                Alphabet::Interleave => return Err(Error::UnsupportedAlphabet("interleave")),
                Alphabet::List => return Err(Error::UnsupportedAlphabet("list")),
            }
            events += 1;

            stack.push(a.sibling_of(state, t));
            if let Some(child) = a.child_of(state, t) {
                stack.push(child);
            } else if matches!(a.alphabet(state, t), Alphabet::Element { .. } | Alphabet::Attribute { .. }) {
                return Err(Error::MalformedContent(format!("transition {t} of state #{state} has no content").into()));
            }
        }
        Err(Error::MalformedContent("stream ended inside the document".into()))
    }

    fn read_choice(&mut self, state: StateId, limit: u32) -> Result<u32> {
        if limit <= 1 {
            return Ok(0);
        }
        let Some(coder) = self.coders.get_mut(state as usize).and_then(Option::as_mut) else {
            return Err(Error::invalid_automaton(format!("state #{state} is not a choice point")));
        };
        let choice = self.input.read_choice(coder)?;
        if choice >= limit {
            return Err(Error::InvalidChoice { choice: u64::from(choice), limit });
        }
        if self.trace_choices {
            log::trace!("state #{state}: choice {choice} of {limit}");
        }
        Ok(choice)
    }

    /// Name of an element or attribute: from the name table, or from the
    /// data channel for wildcard classes.
    fn read_name(&mut self, class: &NameClass) -> Result<Rc<QName>> {
        match class {
            NameClass::Name(code) => {
                if let Some(q) = self.names.get(code) {
                    return Ok(Rc::clone(q));
                }
                let q = self
                    .automaton
                    .decode_name(*code)
                    .ok_or_else(|| Error::invalid_automaton(format!("unknown name code {code}")))?;
                let q = Rc::new(q.clone());
                self.names.insert(*code, Rc::clone(&q));
                Ok(q)
            }
            _ => {
                let clark = self.input.read_content(None)?;
                Ok(Rc::new(QName::from_clark(&clark)?))
            }
        }
    }
}

/// Text either completes the open attribute's value or is element content.
fn text_event(open: &mut [Open], text: &str, emit: &mut impl FnMut(Event) -> Result<()>) -> Result<()> {
    match open.last_mut() {
        Some(Open::Attribute { value, .. }) => {
            value.push_str(text);
            Ok(())
        }
        _ if text.is_empty() => Ok(()),
        _ => emit(Event::Characters(ChContent { value: text.into() })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::{AutomatonBuilder, Datatype};
    use crate::compressor::Compressor;
    use crate::config::{CompressConfig, TraceConfig};
    use crate::rnz::RnzWriter;

    fn automaton() -> Automaton {
        // element e { attribute a {text}?, (element i {integer} | text)* }
        let mut b = AutomatonBuilder::new();
        let s0 = b.state(false);
        let s1 = b.state(false);
        let body = b.state(true);
        let value = b.state(false);
        let value_end = b.state(true);
        let leaf = b.state(false);
        let leaf_end = b.state(true);
        let end = b.state(true);
        b.element(s0, "e", Some(s1), end);
        b.attribute(s1, "a", value, body);
        b.absent_attribute(s1, "a", body);
        b.data(value, Datatype::String, value_end);
        b.element(body, "i", Some(leaf), body);
        b.data(body, Datatype::String, body);
        b.data(leaf, Datatype::Integer, leaf_end);
        b.build().unwrap()
    }

    fn compress(a: &Automaton, events: &[Event], schema_ref: &str) -> Vec<u8> {
        let config = CompressConfig::default();
        let out = RnzWriter::new(Vec::new(), &config, schema_ref, a.checksum()).unwrap();
        let mut c = Compressor::new(a, out, TraceConfig::default()).unwrap();
        for e in events {
            c.handle(e).unwrap();
        }
        c.finish().unwrap().finish().unwrap()
    }

    fn decompress(a: &Automaton, bytes: &[u8], config: DecompressConfig) -> Result<Vec<Event>> {
        let input = RnzReader::new(bytes, config.trace)?;
        let d = Decompressor::new(a, input, config)?;
        let mut events = Vec::new();
        d.run(|e| {
            events.push(e);
            Ok(())
        })?;
        Ok(events)
    }

    fn sample() -> Vec<Event> {
        vec![
            Event::StartDocument,
            Event::start(QName::local("e")),
            Event::attribute(QName::local("a"), "x"),
            Event::characters("hi"),
            Event::start(QName::local("i")),
            Event::characters("7"),
            Event::EndElement,
            Event::EndElement,
            Event::EndDocument,
        ]
    }

    #[test]
    fn reproduces_events() {
        let a = automaton();
        let bytes = compress(&a, &sample(), "");
        assert_eq!(decompress(&a, &bytes, DecompressConfig::default()).unwrap(), sample());
    }

    #[test]
    fn checksum_mismatch_is_detected() {
        let a = automaton();
        let bytes = compress(&a, &sample(), "e.json");

        let mut other = AutomatonBuilder::new();
        let s = other.state(false);
        let c = other.state(true);
        other.element(s, "e", Some(c), c);
        let other = other.build().unwrap();
        let err = decompress(&other, &bytes, DecompressConfig::default()).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }), "{err}");
    }

    #[test]
    fn ignored_checksum_decodes_with_same_automaton() {
        let a = automaton();
        let bytes = compress(&a, &sample(), "e.json");
        let config = DecompressConfig { ignore_checksum: true, ..DecompressConfig::default() };
        assert_eq!(decompress(&a, &bytes, config).unwrap(), sample());
    }

    #[test]
    fn truncated_stream_fails() {
        let a = automaton();
        let bytes = compress(&a, &sample(), "");
        assert!(decompress(&a, &bytes[..bytes.len() / 2], DecompressConfig::default()).is_err());
    }

    #[test]
    fn text_event_targets_open_attribute() {
        let mut open = vec![Open::element(&QName::local("e")), Open::attribute(Rc::new(QName::local("a")))];
        assert_eq!(open[1].context(), "@a");
        let mut seen = Vec::new();
        text_event(&mut open, "v", &mut |e| {
            seen.push(e);
            Ok(())
        })
        .unwrap();
        assert!(seen.is_empty());
        let Some(Open::Attribute { value, .. }) = open.last() else {
            panic!("attribute expected");
        };
        assert_eq!(value, "v");
    }
}
