//! rngzip – schema-driven XML compression
//!
//! A document is encoded as the sequence of choices taken while walking a
//! tree automaton compiled from its schema, plus the literal text content.
//! Names and structure the schema already predicts cost nothing.
//!
//! # Example
//!
//! ```
//! use rngzip::automaton::{AutomatonBuilder, Datatype};
//! use rngzip::config::{CompressConfig, DecompressConfig};
//!
//! // element greeting { text }
//! let mut b = AutomatonBuilder::new();
//! let start = b.state(false);
//! let content = b.state(false);
//! let done = b.state(true);
//! let end = b.state(true);
//! b.element(start, "greeting", Some(content), end);
//! b.data(content, Datatype::String, done);
//! let automaton = b.build().unwrap();
//!
//! let xml = "<greeting>Hello</greeting>";
//! let packed = rngzip::compress_xml(
//!     xml.as_bytes(),
//!     &automaton,
//!     "greeting.json",
//!     &CompressConfig::default(),
//!     Vec::new(),
//! )
//! .unwrap();
//!
//! let unpacked =
//!     rngzip::decompress_to_xml(&packed[..], &automaton, DecompressConfig::default(), None, Vec::new())
//!         .unwrap();
//! assert_eq!(unpacked, xml.as_bytes());
//! ```

pub mod api;
pub mod automaton;
pub mod bitstream;
pub mod choice;
pub mod compression;
pub mod compressor;
pub mod config;
pub mod decompressor;
pub mod error;
pub mod event;
pub mod multiplex;
pub mod ppm;
pub mod qname;
pub mod rnz;
pub mod settings;
pub mod unsigned_integer;
pub mod xml;
pub mod xml_serializer;

pub use error::{Error, Result};

/// HashMap with ahash; not DoS resistant, internal data only.
pub(crate) type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// IndexSet with ahash: insertion order is the index.
pub(crate) type FastIndexSet<T> = indexmap::IndexSet<T, ahash::RandomState>;

// Public API: Events
pub use event::{AtContent, ChContent, Event};
pub use qname::QName;

// Public API: Automaton and configuration
pub use automaton::{Automaton, AutomatonBuilder};
pub use choice::BitCoding;
pub use compression::DataCompression;
pub use config::{CompressConfig, DecompressConfig, TraceConfig};
pub use settings::Settings;

// Public API: Compressor/Decompressor
pub use api::{StreamInfo, compress, compress_xml, decompress, decompress_to_xml, identify, list_xml};
pub use compressor::Compressor;
pub use decompressor::Decompressor;

// Public API: XML
pub use xml::{parse_xml, parse_xml_file, parse_xml_str};
pub use xml_serializer::{XmlWriter, events_to_xml, events_to_xml_writer};
