use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use log::{debug, trace};

use super::{DEFAULT_CAPACITY, MAGIC, MAX_BLOCK_SIZE, MAX_STREAM_ID, check_stream_id, encode_block_header};
use crate::{Error, Result};

/// Interleaves logical streams into one physical stream as blocks.
///
/// Writes are buffered per stream. Streams with pending bytes are queued in
/// the order they first received data; once the buffered total exceeds the
/// capacity, every queued buffer is written out as one block.
pub struct MultiplexWriter<W: Write> {
    out: W,
    buffers: Vec<Vec<u8>>,
    /// Stream ids with a non-empty buffer, in order of their first write.
    queue: Vec<u8>,
    total: usize,
    capacity: usize,
    trace_blocks: bool,
    blocks_written: usize,
}

impl<W: Write> MultiplexWriter<W> {
    /// Writes both magic words and returns the writer.
    pub fn new(mut out: W, magic: u32) -> Result<Self> {
        out.write_all(&MAGIC.to_be_bytes())?;
        out.write_all(&magic.to_be_bytes())?;
        Ok(Self {
            out,
            buffers: vec![Vec::new(); usize::from(MAX_STREAM_ID)],
            queue: Vec::new(),
            total: 0,
            capacity: DEFAULT_CAPACITY,
            trace_blocks: false,
            blocks_written: 0,
        })
    }

    /// Sets the buffering threshold in bytes.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Logs every written block at trace level.
    pub fn with_block_trace(mut self, enabled: bool) -> Self {
        self.trace_blocks = enabled;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of blocks written so far.
    pub fn blocks_written(&self) -> usize {
        self.blocks_written
    }

    /// Appends bytes to stream `id`, splitting payloads that would reach the
    /// maximum block size.
    pub fn write_stream(&mut self, id: u8, mut data: &[u8]) -> Result<()> {
        check_stream_id(id)?;
        if data.is_empty() {
            return Ok(());
        }
        let idx = usize::from(id);
        while self.buffers[idx].len() + data.len() >= MAX_BLOCK_SIZE {
            let n = MAX_BLOCK_SIZE - self.buffers[idx].len() - 1;
            self.enqueue(id);
            self.buffers[idx].extend_from_slice(&data[..n]);
            self.total += n;
            self.dump()?;
            data = &data[n..];
        }
        if !data.is_empty() {
            self.enqueue(id);
            self.buffers[idx].extend_from_slice(data);
            self.total += data.len();
        }
        if self.total > self.capacity {
            self.dump()?;
        }
        Ok(())
    }

    fn enqueue(&mut self, id: u8) {
        if self.buffers[usize::from(id)].is_empty() {
            self.queue.push(id);
        }
    }

    /// Writes every buffered stream as a block.
    fn dump(&mut self) -> Result<()> {
        if self.total == 0 {
            return Ok(());
        }
        let mut header = Vec::with_capacity(4);
        for id in std::mem::take(&mut self.queue) {
            let buf = &mut self.buffers[usize::from(id)];
            header.clear();
            encode_block_header(id, buf.len(), &mut header)?;
            if self.trace_blocks {
                trace!("block: stream {id}, {} bytes", buf.len());
            }
            self.out.write_all(&header)?;
            self.out.write_all(buf)?;
            buf.clear();
            self.blocks_written += 1;
        }
        self.total = 0;
        Ok(())
    }

    /// Writes all buffered data and flushes the physical stream.
    pub fn flush(&mut self) -> Result<()> {
        self.dump()?;
        self.out.flush()?;
        Ok(())
    }

    /// Writes the remaining buffers and returns the physical stream.
    pub fn finish(mut self) -> Result<W> {
        self.flush()?;
        debug!("multiplexer closed after {} blocks", self.blocks_written);
        Ok(self.out)
    }

    /// Opens a `Write` handle for one logical stream of a shared writer.
    pub fn open(mux: &Rc<RefCell<Self>>, id: u8) -> Result<StreamWriter<W>> {
        check_stream_id(id)?;
        Ok(StreamWriter { mux: Rc::clone(mux), id })
    }
}

/// `Write` handle for one logical stream. Filters (gzip, bzip2, ...) wrap it.
pub struct StreamWriter<W: Write> {
    mux: Rc<RefCell<MultiplexWriter<W>>>,
    id: u8,
}

impl<W: Write> StreamWriter<W> {
    pub fn stream_id(&self) -> u8 {
        self.id
    }
}

pub(crate) fn to_io_error(e: Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

impl<W: Write> Write for StreamWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.mux.borrow_mut().write_stream(self.id, buf).map_err(to_io_error)?;
        Ok(buf.len())
    }

    /// Blocks are only written once the capacity is exceeded.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
