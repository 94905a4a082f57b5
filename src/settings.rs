//! In-band settings record (stream 1).
//!
//! The record is the only configuration carried in the compressed file:
//!
//! ```text
//! [coder] [channel count = 2] [tree filter] [data filter]
//! ```
//!
//! The decompressor reads it before opening any other stream and rebuilds
//! identical choice coders and channel filters from it.

use core::fmt;
use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::Rc;

use crate::choice::{BitCoding, ChoiceCoder};
use crate::compression::DataCompression;
use crate::multiplex::{MultiplexReader, MultiplexWriter};
use crate::{Error, Result};

/// Inner (client) magic of an rngzip file.
pub const SETTINGS_MAGIC: u32 = 0x726E_5A01;

/// Stream id of the tree (choice bit) channel.
pub const BIT_STREAM: u8 = 0;
/// Stream id of the settings record.
pub const SETTINGS_STREAM: u8 = 1;
/// Stream id of the data (content) channel.
pub const DATA_STREAM: u8 = 2;

/// Number of described channels (tree and data).
const CHANNEL_COUNT: u8 = 2;
const RECORD_LEN: usize = 4;

/// Choice coding strategy plus the filter of each channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Settings {
    pub coding: BitCoding,
    pub tree: DataCompression,
    pub data: DataCompression,
}

impl Settings {
    pub fn new(coding: BitCoding, tree: DataCompression, data: DataCompression) -> Self {
        Self { coding, tree, data }
    }

    /// Serialized settings record.
    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        [self.coding.index(), CHANNEL_COUNT, self.tree.index(), self.data.index()]
    }

    /// Parses a settings record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let &[coding, count, tree, data] = bytes else {
            return Err(Error::InvalidSettings);
        };
        let coding = BitCoding::from_index(coding)?;
        if count != CHANNEL_COUNT {
            return Err(Error::InvalidSettings);
        }
        Ok(Self {
            coding,
            tree: DataCompression::from_index(tree)?,
            data: DataCompression::from_index(data)?,
        })
    }

    /// Writes the record as the sole content of the settings stream.
    pub fn write_to<W: Write>(&self, mux: &Rc<RefCell<MultiplexWriter<W>>>) -> Result<()> {
        let mut stream = MultiplexWriter::open(mux, SETTINGS_STREAM)?;
        stream.write_all(&self.to_bytes())?;
        log::debug!("settings: {self}");
        Ok(())
    }

    /// Reads the record from the settings stream of `mux`.
    ///
    /// Fails with [`Error::BadMagic`] if the multiplexed stream was not
    /// written by rngzip.
    pub fn read_from<R: Read>(mux: &Rc<RefCell<MultiplexReader<R>>>) -> Result<Self> {
        if mux.borrow().magic() != SETTINGS_MAGIC {
            return Err(Error::BadMagic);
        }
        let mut stream = MultiplexReader::open(mux, SETTINGS_STREAM)?;
        let mut record = [0u8; RECORD_LEN];
        stream.read_exact(&mut record).map_err(|e| match Error::from(e) {
            Error::PrematureEndOfStream => Error::InvalidSettings,
            other => other,
        })?;
        let settings = Self::from_bytes(&record)?;
        log::debug!("settings: {settings}");
        Ok(settings)
    }

    /// Choice coder for a choice point with `limit` alternatives.
    pub fn make_coder(&self, limit: u32, id: usize) -> Result<ChoiceCoder> {
        self.coding.make_coder(limit, id)
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.coding, self.tree, self.data)
    }
}
