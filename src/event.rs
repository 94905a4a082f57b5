//! Document event model shared by compressor input and decompressor output.
//!
//! A document is `StartDocument`, one root element, `EndDocument`. Each
//! `StartElement` is directly followed by that element's `Attribute`
//! events, then by its content.

use std::fmt;
use std::rc::Rc;

use crate::qname::QName;

/// Content for Attribute events: qname + value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtContent {
    /// The qualified name of the attribute.
    pub qname: Rc<QName>,
    /// The attribute value.
    pub value: Rc<str>,
}

/// Content for Characters events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChContent {
    /// The character data.
    pub value: Rc<str>,
}

/// Document events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Start Document.
    StartDocument,
    /// End Document.
    EndDocument,
    /// Start Element - begins an element with the given qname.
    StartElement(Rc<QName>),
    /// End Element - closes the current element.
    EndElement,
    /// Attribute of the most recently started element.
    Attribute(AtContent),
    /// Character data.
    Characters(ChContent),
}

impl Event {
    /// Shorthand for a start-element event.
    pub fn start(qname: QName) -> Self {
        Self::StartElement(Rc::new(qname))
    }

    /// Shorthand for an attribute event.
    pub fn attribute(qname: QName, value: &str) -> Self {
        Self::Attribute(AtContent { qname: Rc::new(qname), value: value.into() })
    }

    /// Shorthand for a characters event.
    pub fn characters(value: &str) -> Self {
        Self::Characters(ChContent { value: value.into() })
    }
}

/// Compact form for trace output.
impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartDocument => f.write_str("SD"),
            Self::EndDocument => f.write_str("ED"),
            Self::StartElement(q) => write!(f, "SE <{q}>"),
            Self::EndElement => f.write_str("EE"),
            Self::Attribute(at) => write!(f, "AT @{}=\"{}\"", at.qname, at.value),
            Self::Characters(ch) => write!(f, "CH \"{}\"", ch.value),
        }
    }
}

/// Merges adjacent characters events.
///
/// Parsers may split text at entity references or buffer boundaries; the
/// compressor sees one characters event per text node.
pub fn coalesce_characters(events: Vec<Event>) -> Vec<Event> {
    let mut out: Vec<Event> = Vec::with_capacity(events.len());
    for event in events {
        if let Event::Characters(ch) = &event {
            if let Some(Event::Characters(prev)) = out.last_mut() {
                let mut joined = String::with_capacity(prev.value.len() + ch.value.len());
                joined.push_str(&prev.value);
                joined.push_str(&ch.value);
                prev.value = joined.into();
                continue;
            }
            if ch.value.is_empty() {
                continue;
            }
        }
        out.push(event);
    }
    out
}
