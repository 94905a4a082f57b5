use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read};
use std::rc::Rc;

use log::trace;

use super::writer::to_io_error;
use super::{MAGIC, MAX_STREAM_ID, check_stream_id, decode_block_header};
use crate::{Error, Result};

#[derive(Default)]
struct Pending {
    chunks: VecDeque<Vec<u8>>,
    /// Read offset into the front chunk.
    offset: usize,
}

/// Demultiplexes a physical stream lazily.
///
/// Blocks are read only when a logical stream runs dry; blocks for other
/// streams met on the way are queued for later.
pub struct MultiplexReader<R: Read> {
    input: R,
    magic: u32,
    streams: Vec<Pending>,
    trace_blocks: bool,
}

impl<R: Read> MultiplexReader<R> {
    /// Checks the outer magic word and reads the client magic.
    pub fn new(mut input: R) -> Result<Self> {
        let mut words = [0u8; 8];
        input.read_exact(&mut words).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::BadMagic,
            _ => e.into(),
        })?;
        let outer = u32::from_be_bytes([words[0], words[1], words[2], words[3]]);
        if outer != MAGIC {
            return Err(Error::BadMagic);
        }
        let magic = u32::from_be_bytes([words[4], words[5], words[6], words[7]]);
        Ok(Self {
            input,
            magic,
            streams: (0..MAX_STREAM_ID).map(|_| Pending::default()).collect(),
            trace_blocks: false,
        })
    }

    pub fn with_block_trace(mut self, enabled: bool) -> Self {
        self.trace_blocks = enabled;
        self
    }

    /// The client magic word written after the outer magic.
    pub fn magic(&self) -> u32 {
        self.magic
    }

    /// Reads up to `buf.len()` bytes of stream `id`. Returns 0 at the end of
    /// the physical stream.
    pub fn read_stream(&mut self, id: u8, buf: &mut [u8]) -> Result<usize> {
        check_stream_id(id)?;
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let pending = &mut self.streams[usize::from(id)];
            if let Some(chunk) = pending.chunks.front() {
                let avail = &chunk[pending.offset..];
                let n = avail.len().min(buf.len());
                buf[..n].copy_from_slice(&avail[..n]);
                pending.offset += n;
                if pending.offset == chunk.len() {
                    pending.chunks.pop_front();
                    pending.offset = 0;
                }
                return Ok(n);
            }
            if !self.read_more(id)? {
                return Ok(0);
            }
        }
    }

    /// Reads blocks until one for `id` arrives. `false` at the end of the stream.
    fn read_more(&mut self, id: u8) -> Result<bool> {
        loop {
            let Some((sid, size)) = decode_block_header(&mut self.input)? else {
                return Ok(false);
            };
            let mut payload = Vec::new();
            let got = (&mut self.input).take(size as u64).read_to_end(&mut payload)?;
            if got < size {
                return Err(Error::TruncatedBlock { expected: size });
            }
            if self.trace_blocks {
                trace!("block: stream {sid}, {size} bytes");
            }
            if !payload.is_empty() {
                self.streams[usize::from(sid)].chunks.push_back(payload);
            }
            if sid == id {
                return Ok(true);
            }
        }
    }

    /// Opens a `Read` handle for one logical stream of a shared reader.
    pub fn open(mux: &Rc<RefCell<Self>>, id: u8) -> Result<StreamReader<R>> {
        check_stream_id(id)?;
        Ok(StreamReader { mux: Rc::clone(mux), id })
    }
}

/// `Read` handle for one logical stream.
pub struct StreamReader<R: Read> {
    mux: Rc<RefCell<MultiplexReader<R>>>,
    id: u8,
}

impl<R: Read> StreamReader<R> {
    pub fn stream_id(&self) -> u8 {
        self.id
    }
}

impl<R: Read> Read for StreamReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.mux.borrow_mut().read_stream(self.id, buf).map_err(to_io_error)
    }
}
