#![no_main]
use libfuzzer_sys::fuzz_target;
use rngzip::automaton::{Alphabet, AutomatonBuilder, Datatype, NameClass};
use rngzip::{Automaton, CompressConfig, DecompressConfig};

// element doc { (element * { text } | attribute * { text })* }
fn automaton() -> Automaton {
    let mut b = AutomatonBuilder::new();
    let s0 = b.state(false);
    let body = b.state(true);
    let text = b.state(false);
    let leaf_end = b.state(true);
    let end = b.state(true);
    b.element(s0, "doc", Some(body), end);
    b.transition(body, Alphabet::Attribute { name: NameClass::Any }, Some(text), body);
    b.transition(body, Alphabet::Element { name: NameClass::Any }, Some(text), body);
    b.data(text, Datatype::String, leaf_end);
    match b.build() {
        Ok(a) => a,
        Err(e) => panic!("fuzz automaton: {e}"),
    }
}

fuzz_target!(|data: &[u8]| {
    let Ok(xml) = std::str::from_utf8(data) else { return };
    let a = automaton();
    if let Ok(packed) = rngzip::compress_xml(xml.as_bytes(), &a, "", &CompressConfig::default(), Vec::new()) {
        let mut out = Vec::new();
        rngzip::decompress(&packed[..], &a, DecompressConfig::default(), |e| {
            out.push(e);
            Ok(())
        })
        .expect("accepted document must decompress");
    }
});
