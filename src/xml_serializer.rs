//! Document events → XML.
//!
//! The compressed form carries no namespace prefixes and no namespace
//! declarations, so the writer synthesizes them: element names go into the
//! default namespace (or keep their prefix when the event has one), and
//! namespaced attributes get a bound prefix or a fresh `ns{n}` binding.
//!
//! Start tags are buffered until the first non-attribute event, so an
//! element without content is written self-closing.

use std::io::Write;
use std::rc::Rc;

use crate::error::Error;
use crate::event::{AtContent, Event};
use crate::qname::QName;
use crate::Result;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Serializes events as an XML string; `indent` enables pretty printing.
pub fn events_to_xml(events: &[Event], indent: Option<usize>) -> Result<String> {
    let buf = events_to_xml_writer(events, indent, Vec::new())?;
    String::from_utf8(buf).map_err(|_| Error::IoError("XML output is not valid UTF-8".into()))
}

/// Serializes events directly into a writer.
pub fn events_to_xml_writer<W: Write>(events: &[Event], indent: Option<usize>, writer: W) -> Result<W> {
    let mut ser = XmlWriter::new(writer, indent);
    for event in events {
        ser.write_event(event)?;
    }
    ser.finish()
}

// ============================================================================
// Hilfsfunktionen
// ============================================================================

fn io_err(e: std::io::Error) -> Error {
    Error::IoError(e.to_string())
}

#[inline]
fn w(writer: &mut impl Write, s: &str) -> Result<()> {
    writer.write_all(s.as_bytes()).map_err(io_err)
}

/// Escapes with memchr3, searching for three bytes at once; runs without
/// special characters are written in one piece.
fn write_escaped_memchr3(w: &mut impl Write, s: &str, needle: [u8; 3], replacement: [&[u8]; 3]) -> Result<()> {
    let bytes = s.as_bytes();
    let mut start = 0;
    while let Some(offset) = memchr::memchr3(needle[0], needle[1], needle[2], &bytes[start..]) {
        let pos = start + offset;
        w.write_all(&bytes[start..pos]).map_err(io_err)?;
        let repl = match bytes[pos] {
            b if b == needle[0] => replacement[0],
            b if b == needle[1] => replacement[1],
            _ => replacement[2],
        };
        w.write_all(repl).map_err(io_err)?;
        start = pos + 1;
    }
    w.write_all(&bytes[start..]).map_err(io_err)
}

/// Text content: & < > → &amp; &lt; &gt;
fn write_escaped_text(w: &mut impl Write, s: &str) -> Result<()> {
    write_escaped_memchr3(w, s, [b'&', b'<', b'>'], [b"&amp;", b"&lt;", b"&gt;"])
}

/// Attribute values: & < " → &amp; &lt; &quot;, whitespace as character
/// references so it survives attribute value normalization.
fn write_escaped_attr(w: &mut impl Write, s: &str) -> Result<()> {
    let mut rest = s;
    while let Some(pos) = rest.find(['\t', '\n', '\r']) {
        write_escaped_memchr3(w, &rest[..pos], [b'&', b'<', b'"'], [b"&amp;", b"&lt;", b"&quot;"])?;
        let repl = match rest.as_bytes()[pos] {
            b'\t' => "&#9;",
            b'\n' => "&#10;",
            _ => "&#13;",
        };
        self::w(w, repl)?;
        rest = &rest[pos + 1..];
    }
    write_escaped_memchr3(w, rest, [b'&', b'<', b'"'], [b"&amp;", b"&lt;", b"&quot;"])
}

// ============================================================================
// Namespace-Scopes
// ============================================================================

/// Namespace state introduced by one element.
#[derive(Debug, Clone, Default)]
struct Scope {
    default_ns: Rc<str>,
    default_declared: bool,
    /// Prefix bindings declared by this element.
    bindings: Vec<(Rc<str>, Rc<str>)>,
}

#[derive(Debug)]
struct OpenElement {
    name: String,
    scope: Scope,
    has_text: bool,
    has_child: bool,
}

/// URI bound to `prefix`, innermost binding first.
fn bound_uri<'s>(stack: &'s [OpenElement], scope: &'s Scope, prefix: &str) -> Option<&'s str> {
    if prefix == "xml" {
        return Some(XML_NS);
    }
    scope
        .bindings
        .iter()
        .rev()
        .chain(stack.iter().rev().flat_map(|e| e.scope.bindings.iter().rev()))
        .find(|(p, _)| &**p == prefix)
        .map(|(_, uri)| &**uri)
}

/// A prefix currently bound to `uri` (not shadowed by an inner binding).
fn prefix_for_uri(stack: &[OpenElement], scope: &Scope, uri: &str) -> Option<Rc<str>> {
    scope
        .bindings
        .iter()
        .rev()
        .chain(stack.iter().rev().flat_map(|e| e.scope.bindings.iter().rev()))
        .find(|(p, u)| &**u == uri && bound_uri(stack, scope, p) == Some(uri))
        .map(|(p, _)| Rc::clone(p))
}

fn usable_prefix(q: &QName) -> Option<&Rc<str>> {
    q.prefix.as_ref().filter(|p| !p.is_empty() && !q.uri.is_empty() && &***p != "xmlns" && &***p != "xml")
}

fn element_name(stack: &[OpenElement], scope: &mut Scope, q: &QName) -> String {
    if let Some(p) = usable_prefix(q) {
        if bound_uri(stack, scope, p) != Some(&*q.uri) {
            scope.bindings.push((Rc::clone(p), Rc::clone(&q.uri)));
        }
        return format!("{p}:{}", q.local_name);
    }
    if scope.default_ns != q.uri {
        scope.default_ns = Rc::clone(&q.uri);
        scope.default_declared = true;
    }
    q.local_name.to_string()
}

fn attribute_name(stack: &[OpenElement], scope: &mut Scope, counter: &mut usize, q: &QName) -> String {
    if q.uri.is_empty() {
        return q.local_name.to_string();
    }
    if &*q.uri == XML_NS {
        return format!("xml:{}", q.local_name);
    }
    if let Some(p) = prefix_for_uri(stack, scope, &q.uri) {
        return format!("{p}:{}", q.local_name);
    }
    if let Some(p) = usable_prefix(q).filter(|p| !scope.bindings.iter().any(|(b, _)| b == *p)) {
        scope.bindings.push((Rc::clone(p), Rc::clone(&q.uri)));
        return format!("{p}:{}", q.local_name);
    }
    loop {
        *counter += 1;
        let p: Rc<str> = format!("ns{counter}").into();
        if bound_uri(stack, scope, &p).is_none() {
            let name = format!("{p}:{}", q.local_name);
            scope.bindings.push((p, Rc::clone(&q.uri)));
            return name;
        }
    }
}

// ============================================================================
// XmlWriter
// ============================================================================

/// Streaming XML writer, compact or indented.
pub struct XmlWriter<W: Write> {
    writer: W,
    indent: Option<usize>,
    stack: Vec<OpenElement>,
    pending_start: Option<Rc<QName>>,
    pending_attrs: Vec<AtContent>,
    pending_indent: bool,
    last_was_text: bool,
    synthetic_ns_counter: usize,
}

impl<W: Write> XmlWriter<W> {
    /// `indent`: spaces per nesting level, `None` for compact output.
    pub fn new(writer: W, indent: Option<usize>) -> Self {
        Self {
            writer,
            indent,
            stack: Vec::new(),
            pending_start: None,
            pending_attrs: Vec::new(),
            pending_indent: false,
            last_was_text: false,
            synthetic_ns_counter: 0,
        }
    }

    pub fn write_event(&mut self, event: &Event) -> Result<()> {
        match event {
            Event::StartDocument => {}
            Event::EndDocument => {
                self.flush_pending_start(false)?;
                if !self.stack.is_empty() {
                    return Err(Error::XmlParseError("end of document with open elements".into()));
                }
                if self.indent.is_some() {
                    w(&mut self.writer, "\n")?;
                }
            }
            Event::StartElement(qname) => {
                self.flush_pending_start(false)?;
                self.pending_indent = !self.stack.is_empty() && !self.last_was_text;
                if let Some(parent) = self.stack.last_mut() {
                    parent.has_child = true;
                }
                self.pending_start = Some(Rc::clone(qname));
                self.last_was_text = false;
            }
            Event::Attribute(at) => {
                if self.pending_start.is_none() {
                    return Err(Error::XmlParseError(format!("attribute {} outside a start tag", at.qname)));
                }
                self.pending_attrs.push(at.clone());
            }
            Event::EndElement => {
                if self.pending_start.is_some() {
                    self.flush_pending_start(true)?;
                } else {
                    let elem = self
                        .stack
                        .pop()
                        .ok_or_else(|| Error::XmlParseError("end element without open element".into()))?;
                    if elem.has_child && !elem.has_text {
                        self.write_indent(self.stack.len())?;
                    }
                    w(&mut self.writer, "</")?;
                    w(&mut self.writer, &elem.name)?;
                    w(&mut self.writer, ">")?;
                }
                self.last_was_text = false;
            }
            Event::Characters(ch) => {
                self.flush_pending_start(false)?;
                if let Some(curr) = self.stack.last_mut() {
                    curr.has_text = true;
                }
                write_escaped_text(&mut self.writer, &ch.value)?;
                self.last_was_text = true;
            }
        }
        Ok(())
    }

    /// Flushes buffered output and returns the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.flush_pending_start(false)?;
        self.writer.flush().map_err(io_err)?;
        Ok(self.writer)
    }

    /// Newline plus indentation, pretty mode only.
    fn write_indent(&mut self, depth: usize) -> Result<()> {
        let Some(indent) = self.indent else {
            return Ok(());
        };
        const SPACES: &[u8; 128] = &[b' '; 128];
        w(&mut self.writer, "\n")?;
        let mut remaining = indent * depth;
        while remaining > 0 {
            let chunk = remaining.min(SPACES.len());
            self.writer.write_all(&SPACES[..chunk]).map_err(io_err)?;
            remaining -= chunk;
        }
        Ok(())
    }

    /// Writes the buffered start tag and pushes the element.
    fn flush_pending_start(&mut self, self_closing: bool) -> Result<()> {
        let Some(qname) = self.pending_start.take() else {
            return Ok(());
        };
        let attrs = std::mem::take(&mut self.pending_attrs);

        let mut scope = Scope {
            default_ns: self.stack.last().map_or_else(|| Rc::from(""), |e| Rc::clone(&e.scope.default_ns)),
            ..Scope::default()
        };
        let name = element_name(&self.stack, &mut scope, &qname);
        let attr_names: Vec<String> = attrs
            .iter()
            .map(|at| attribute_name(&self.stack, &mut scope, &mut self.synthetic_ns_counter, &at.qname))
            .collect();

        if self.pending_indent {
            self.write_indent(self.stack.len())?;
        }
        self.pending_indent = false;

        w(&mut self.writer, "<")?;
        w(&mut self.writer, &name)?;
        if scope.default_declared {
            w(&mut self.writer, " xmlns=\"")?;
            write_escaped_attr(&mut self.writer, &scope.default_ns)?;
            w(&mut self.writer, "\"")?;
        }
        for (prefix, uri) in &scope.bindings {
            w(&mut self.writer, " xmlns:")?;
            w(&mut self.writer, prefix)?;
            w(&mut self.writer, "=\"")?;
            write_escaped_attr(&mut self.writer, uri)?;
            w(&mut self.writer, "\"")?;
        }
        for (at, attr_name) in attrs.iter().zip(&attr_names) {
            w(&mut self.writer, " ")?;
            w(&mut self.writer, attr_name)?;
            w(&mut self.writer, "=\"")?;
            write_escaped_attr(&mut self.writer, &at.value)?;
            w(&mut self.writer, "\"")?;
        }

        if self_closing {
            w(&mut self.writer, "/>")?;
        } else {
            w(&mut self.writer, ">")?;
            self.stack.push(OpenElement { name, scope, has_text: false, has_child: false });
        }
        Ok(())
    }
}
