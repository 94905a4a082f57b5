// Gemeinsame Automaten und Dokumente fuer die Integrationstests.
//
// Wird per `include!` eingebunden. Benötigte Imports:
//   use rngzip::Automaton;

/// element addressBook {
///   element card {
///     attribute id { xsd:integer }?,
///     element name { text },
///     element email { text }+,
///     element note { text }?
///   }*
/// }
#[allow(dead_code)]
const ADDRESS_BOOK_JSON: &str = r#"{
  "initial": 0,
  "names": [
    {"local": "addressBook"},
    {"local": "card"},
    {"local": "id"},
    {"local": "name"},
    {"local": "email"},
    {"local": "note"}
  ],
  "states": [
    {"final": false, "transitions": [
      {"alphabet": {"element": {"name": {"name": 0}}}, "child": 1, "sibling": 9}]},
    {"final": true, "transitions": [
      {"alphabet": {"element": {"name": {"name": 1}}}, "child": 2, "sibling": 1}]},
    {"final": false, "transitions": [
      {"alphabet": {"attribute": {"name": {"name": 2}}}, "child": 3, "sibling": 5},
      {"alphabet": {"non_existent_attribute": {"negative": [{"name": 2}]}}, "sibling": 5}]},
    {"final": false, "transitions": [
      {"alphabet": {"data": {"datatype": "integer"}}, "sibling": 4}]},
    {"final": true},
    {"final": false, "transitions": [
      {"alphabet": {"element": {"name": {"name": 3}}}, "child": 6, "sibling": 7}]},
    {"final": false, "transitions": [
      {"alphabet": {"data": {"datatype": "string"}}, "sibling": 4}]},
    {"final": false, "transitions": [
      {"alphabet": {"element": {"name": {"name": 4}}}, "child": 6, "sibling": 8}]},
    {"final": true, "transitions": [
      {"alphabet": {"element": {"name": {"name": 4}}}, "child": 6, "sibling": 8},
      {"alphabet": {"element": {"name": {"name": 5}}}, "child": 6, "sibling": 4}]},
    {"final": true}
  ]
}"#;

#[allow(dead_code)]
fn address_book() -> Automaton {
    Automaton::from_json(ADDRESS_BOOK_JSON).expect("address book automaton")
}

#[allow(dead_code)]
const ADDRESS_BOOK_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- Kontakte -->
<addressBook>
  <card id="1">
    <name>John Smith</name>
    <email>js@example.com</email>
  </card>
  <card>
    <name>Fred Bloggs</name>
    <email>fb@example.net</email>
    <email>fred@example.org</email>
    <note>prefers &lt;plain&gt; text &amp; no HTML</note>
  </card>
</addressBook>
"#;

/// Address book with `cards` entries, compact.
#[allow(dead_code)]
fn address_book_xml(cards: usize) -> String {
    let mut xml = String::from("<addressBook>");
    for i in 0..cards {
        if i % 3 == 0 {
            xml.push_str(&format!("<card id=\"{i}\">"));
        } else {
            xml.push_str("<card>");
        }
        xml.push_str(&format!("<name>Person {i}</name>"));
        for j in 0..=(i % 2) {
            xml.push_str(&format!("<email>p{i}.{j}@example.com</email>"));
        }
        if i % 5 == 0 {
            xml.push_str(&format!("<note>card number {i}</note>"));
        }
        xml.push_str("</card>");
    }
    xml.push_str("</addressBook>");
    xml
}

/// element any { (element * { text } | attribute * { text })* }
///
/// Names matched by wildcards travel on the data channel.
#[allow(dead_code)]
const WILDCARD_JSON: &str = r#"{
  "initial": 0,
  "names": [{"uri": "urn:any", "local": "any"}],
  "states": [
    {"final": false, "transitions": [
      {"alphabet": {"element": {"name": {"name": 0}}}, "child": 1, "sibling": 4}]},
    {"final": true, "transitions": [
      {"alphabet": {"attribute": {"name": "any"}}, "child": 2, "sibling": 1},
      {"alphabet": {"element": {"name": {"any_except": [0]}}}, "child": 2, "sibling": 1}]},
    {"final": false, "transitions": [
      {"alphabet": {"data": {}}, "sibling": 3}]},
    {"final": true},
    {"final": true}
  ]
}"#;

#[allow(dead_code)]
fn wildcard() -> Automaton {
    Automaton::from_json(WILDCARD_JSON).expect("wildcard automaton")
}

/// Events without whitespace-only text (the compressor drops ignorable
/// whitespace).
#[allow(dead_code)]
fn significant(events: Vec<rngzip::Event>) -> Vec<rngzip::Event> {
    events
        .into_iter()
        .filter(|e| !matches!(e, rngzip::Event::Characters(c) if c.value.trim().is_empty()))
        .collect()
}
