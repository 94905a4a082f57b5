#![no_main]
use libfuzzer_sys::fuzz_target;
use rngzip::automaton::{AutomatonBuilder, Datatype};
use rngzip::{Automaton, DecompressConfig};

// element list { attribute n { integer }?, element item { text }* }
fn automaton() -> Automaton {
    let mut b = AutomatonBuilder::new();
    let s0 = b.state(false);
    let attrs = b.state(false);
    let value = b.state(false);
    let leaf_end = b.state(true);
    let items = b.state(true);
    let text = b.state(false);
    let end = b.state(true);
    b.element(s0, "list", Some(attrs), end);
    b.attribute(attrs, "n", value, items);
    b.absent_attribute(attrs, "n", items);
    b.data(value, Datatype::Integer, leaf_end);
    b.element(items, "item", Some(text), items);
    b.data(text, Datatype::String, leaf_end);
    match b.build() {
        Ok(a) => a,
        Err(e) => panic!("fuzz automaton: {e}"),
    }
}

fuzz_target!(|data: &[u8]| {
    let a = automaton();
    let config = DecompressConfig { ignore_checksum: true, ..DecompressConfig::default() };
    let _ = rngzip::decompress(data, &a, config, |_| Ok(()));
});
