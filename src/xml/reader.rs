use std::borrow::Cow;
use std::io::{BufReader, Read};
use std::rc::Rc;

use memchr::memchr;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::name::{QName as XmlQName, ResolveResult};
use quick_xml::reader::NsReader;

use super::entities::{self, EntityMap};
use crate::event::{AtContent, ChContent, Event};
use crate::qname::QName;
use crate::{Error, FastHashMap, Result};

/// Drives quick-xml over `input` and emits the document's events.
pub(crate) fn emit_xml_events(input: impl Read, mut emit: impl FnMut(Event) -> Result<()>) -> Result<()> {
    let mut reader = NsReader::from_reader(BufReader::new(input));
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut depth: usize = 0;
    let mut seen_root = false;
    // CH-Coalescing: gepufferter Text wird vor jedem Nicht-CH-Event geflusht.
    let mut pending_ch: Option<String> = None;
    let mut entities = EntityMap::default();
    let mut names = NamePool::default();

    emit(Event::StartDocument)?;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            Error::XmlParseError(format!("at byte {}: {e}", reader.buffer_position()))
        })?;
        match event {
            XmlEvent::Start(e) | XmlEvent::Empty(e) if depth == 0 && seen_root => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                return Err(Error::XmlParseError(format!("second root element <{name}>")));
            }
            XmlEvent::Start(e) => {
                flush_pending_ch(&mut pending_ch, &mut emit)?;
                emit_start(&reader, &e, &entities, &mut names, &mut emit)?;
                depth += 1;
                seen_root = true;
            }
            XmlEvent::Empty(e) => {
                flush_pending_ch(&mut pending_ch, &mut emit)?;
                emit_start(&reader, &e, &entities, &mut names, &mut emit)?;
                emit(Event::EndElement)?;
                seen_root = true;
            }
            XmlEvent::End(_) => {
                flush_pending_ch(&mut pending_ch, &mut emit)?;
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| Error::XmlParseError("end tag without start tag".into()))?;
                emit(Event::EndElement)?;
            }
            XmlEvent::Text(e) => {
                let raw = utf8(&e)?;
                text(&mut pending_ch, depth, &normalize_line_endings(raw))?;
            }
            XmlEvent::CData(e) => {
                let raw = utf8(&e)?;
                text(&mut pending_ch, depth, &normalize_line_endings(raw))?;
            }
            XmlEvent::GeneralRef(e) => {
                let name = utf8(e.as_ref())?;
                let value = entities::resolve(name, &entities)?;
                text(&mut pending_ch, depth, &value)?;
            }
            XmlEvent::DocType(e) => {
                entities::parse_internal_entities(utf8(e.as_ref())?, &mut entities)?;
            }
            // Kommentare und PIs unterbrechen das Coalescing nicht.
            XmlEvent::Comment(_) | XmlEvent::PI(_) | XmlEvent::Decl(_) => {}
            XmlEvent::Eof => break,
        }
        buf.clear();
    }

    if depth > 0 {
        return Err(Error::XmlParseError(format!("{depth} unclosed element(s) at end of input")));
    }
    if !seen_root {
        return Err(Error::XmlParseError("no root element".into()));
    }
    flush_pending_ch(&mut pending_ch, &mut emit)?;
    emit(Event::EndDocument)
}

/// Appends text inside the root; outside only whitespace is expected.
fn text(pending_ch: &mut Option<String>, depth: usize, value: &str) -> Result<()> {
    if depth == 0 {
        if !value.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n')) {
            log::warn!("ignoring text outside the root element");
        }
        return Ok(());
    }
    if !value.is_empty() {
        pending_ch.get_or_insert_with(String::new).push_str(value);
    }
    Ok(())
}

/// Emits buffered character data as one characters event.
fn flush_pending_ch(pending_ch: &mut Option<String>, emit: &mut impl FnMut(Event) -> Result<()>) -> Result<()> {
    if let Some(text) = pending_ch.take() {
        emit(Event::Characters(ChContent { value: text.into() }))?;
    }
    Ok(())
}

fn emit_start(
    reader: &NsReader<impl std::io::BufRead>,
    e: &BytesStart<'_>,
    entities: &EntityMap,
    names: &mut NamePool,
    emit: &mut impl FnMut(Event) -> Result<()>,
) -> Result<()> {
    let (ns, local) = reader.resolver().resolve_element(e.name());
    let elem = names.get(ns, local.as_ref(), e.name())?;
    emit(Event::StartElement(elem))?;

    for attr in e.attributes().with_checks(true) {
        let attr = attr.map_err(|er| Error::XmlParseError(er.to_string()))?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let (ns, local) = reader.resolver().resolve_attribute(attr.key);
        let qname = names.get(ns, local.as_ref(), attr.key)?;
        let value = normalize_attribute(utf8(attr.value.as_ref())?, entities)?;
        emit(Event::Attribute(AtContent { qname, value: value.into() }))?;
    }
    Ok(())
}

/// XML 1.0 3.3.3: literal whitespace becomes a space, then references are
/// expanded.
fn normalize_attribute(raw: &str, entities: &EntityMap) -> Result<String> {
    let spaced: Cow<'_, str> = if raw.bytes().any(|b| matches!(b, b'\t' | b'\n' | b'\r')) {
        Cow::Owned(raw.replace("\r\n", " ").replace(['\t', '\n', '\r'], " "))
    } else {
        Cow::Borrowed(raw)
    };
    if memchr(b'&', spaced.as_bytes()).is_none() {
        return Ok(spaced.into_owned());
    }
    entities::expand(&spaced, entities)
}

/// XML 1.0 2.11: \r\n -> \n, lone \r -> \n
fn normalize_line_endings(s: &str) -> Cow<'_, str> {
    if memchr(b'\r', s.as_bytes()).is_none() {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.replace("\r\n", "\n").replace('\r', "\n"))
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| Error::XmlParseError(e.to_string()))
}

// ============================================================================
// Name pool
// ============================================================================

/// Caches recurring names so events share one `Rc` per name.
#[derive(Default)]
struct NamePool {
    names: FastHashMap<String, Rc<QName>>,
    key: String,
}

impl NamePool {
    fn get(&mut self, ns: ResolveResult<'_>, local: &[u8], raw: XmlQName<'_>) -> Result<Rc<QName>> {
        let uri = match ns {
            ResolveResult::Bound(ns) => utf8(ns.0)?,
            ResolveResult::Unbound => "",
            ResolveResult::Unknown(prefix) => {
                return Err(Error::XmlParseError(format!(
                    "unbound namespace prefix '{}'",
                    String::from_utf8_lossy(&prefix)
                )));
            }
        };
        let raw = utf8(raw.0)?;
        self.key.clear();
        self.key.push_str(uri);
        self.key.push('\0');
        self.key.push_str(raw);
        if let Some(q) = self.names.get(self.key.as_str()) {
            return Ok(Rc::clone(q));
        }
        let local = utf8(local)?;
        let qname = match raw.split_once(':') {
            Some((prefix, _)) => QName::with_prefix(uri, local, prefix),
            None => QName::new(uri, local),
        };
        let qname = Rc::new(qname);
        self.names.insert(self.key.clone(), Rc::clone(&qname));
        Ok(qname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        emit_xml_events(xml.as_bytes(), |e| {
            events.push(e);
            Ok(())
        })?;
        Ok(events)
    }

    #[test]
    fn simple_document() {
        let events = parse(r#"<?xml version="1.0"?><e a="x">hi</e>"#).unwrap();
        assert_eq!(
            events,
            vec![
                Event::StartDocument,
                Event::start(QName::local("e")),
                Event::attribute(QName::local("a"), "x"),
                Event::characters("hi"),
                Event::EndElement,
                Event::EndDocument,
            ]
        );
    }

    #[test]
    fn namespaces_resolved_and_declarations_dropped() {
        let events = parse(r#"<p:doc xmlns:p="urn:p" xmlns="urn:d" p:id="1"><item/></p:doc>"#).unwrap();
        let Event::StartElement(doc) = &events[1] else {
            panic!("start expected");
        };
        assert_eq!(**doc, QName::new("urn:p", "doc"));
        assert_eq!(doc.prefix.as_deref(), Some("p"));
        assert_eq!(events[2], Event::attribute(QName::new("urn:p", "id"), "1"));
        // Default-Namespace gilt für Elemente, nicht für Attribute
        assert_eq!(events[3], Event::start(QName::new("urn:d", "item")));
        assert_eq!(events.len(), 7);
    }

    #[test]
    fn text_coalesced_across_entities_cdata_and_comments() {
        let events = parse("<a>x &amp; <![CDATA[<y>]]><!-- c -->z&#33;</a>").unwrap();
        assert_eq!(events[2], Event::characters("x & <y>z!"));
        assert_eq!(events[3], Event::EndElement);
    }

    #[test]
    fn internal_entities_resolved() {
        let xml = r#"<!DOCTYPE a [<!ENTITY me "rngzip">]><a t="&me;">&me;</a>"#;
        let events = parse(xml).unwrap();
        assert_eq!(events[2], Event::attribute(QName::local("t"), "rngzip"));
        assert_eq!(events[3], Event::characters("rngzip"));
    }

    #[test]
    fn undeclared_entity_fails() {
        assert!(matches!(parse("<a>&nope;</a>"), Err(Error::XmlParseError(_))));
    }

    #[test]
    fn attribute_whitespace_normalized() {
        let events = parse("<a v=\"1\n\t2\r\n3\"/>").unwrap();
        assert_eq!(events[2], Event::attribute(QName::local("v"), "1  2 3"));
    }

    #[test]
    fn line_endings_normalized() {
        let events = parse("<a>1\r\n2\r3</a>").unwrap();
        assert_eq!(events[2], Event::characters("1\n2\n3"));
    }

    #[test]
    fn malformed_input_fails() {
        assert!(parse("<a><b></a>").is_err());
        assert!(parse("<a>").is_err());
        assert!(parse("").is_err());
        assert!(parse("<a/><b/>").is_err());
        assert!(parse("<x:a/>").is_err());
    }

    #[test]
    fn whitespace_outside_root_ignored() {
        let events = parse("\n<a/>\n").unwrap();
        assert_eq!(events.len(), 4);
    }
}
