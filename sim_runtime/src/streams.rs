//! Generic stream objects
//!
//! Streams are the non-console I/O objects. Each `open` creates a fresh
//! stream adapter; the adapter may sit on storage shared with other
//! adapters (a memory file, a loopback buffer), but the adapter itself
//! belongs to exactly one descriptor.

use crate::io_object::IoError;
use core_types::AccessMode;
use spin::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Raw stream capability set
pub trait Stream: Send {
    /// Operations this stream supports
    fn capabilities(&self) -> AccessMode;

    /// Reads up to `buf.len()` bytes; `Ok(0)` is end-of-stream
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError>;

    /// Writes up to `buf.len()` bytes and reports how many were accepted
    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError>;

    /// Pushes buffered data to the backing storage
    fn flush(&mut self) -> Result<(), IoError> {
        Ok(())
    }

    /// Short name for diagnostics
    fn kind(&self) -> &'static str;
}

/// Backing storage of a memory mount
#[derive(Debug, Default)]
pub struct MemoryFile {
    data: Vec<u8>,
    writable: bool,
}

impl MemoryFile {
    pub fn new(contents: Vec<u8>, writable: bool) -> Self {
        Self {
            data: contents,
            writable,
        }
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

/// Cursor over a shared [`MemoryFile`]
pub struct MemoryStream {
    file: Arc<Mutex<MemoryFile>>,
    cursor: usize,
    append: bool,
}

impl MemoryStream {
    /// Opens a cursor at the start of the file
    ///
    /// `truncate` empties a writable file first; `append` makes every
    /// write land at the current end.
    pub fn open(file: Arc<Mutex<MemoryFile>>, truncate: bool, append: bool) -> Self {
        {
            let mut guard = file.lock();
            if truncate && guard.writable {
                guard.data.clear();
            }
        }
        Self {
            file,
            cursor: 0,
            append,
        }
    }
}

impl Stream for MemoryStream {
    fn capabilities(&self) -> AccessMode {
        if self.file.lock().writable {
            AccessMode::read_write()
        } else {
            AccessMode::read_only()
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        let file = self.file.lock();
        let start = self.cursor.min(file.data.len());
        let n = buf.len().min(file.data.len() - start);
        buf[..n].copy_from_slice(&file.data[start..start + n]);
        self.cursor = start + n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        let mut file = self.file.lock();
        if !file.writable {
            return Err(IoError::Unsupported("write"));
        }
        if self.append {
            self.cursor = file.data.len();
        }
        let start = self.cursor.min(file.data.len());
        let overlap = buf.len().min(file.data.len() - start);
        file.data[start..start + overlap].copy_from_slice(&buf[..overlap]);
        file.data.extend_from_slice(&buf[overlap..]);
        self.cursor = start + buf.len();
        Ok(buf.len())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

/// Bounded FIFO shared by every descriptor opened on a loopback mount
#[derive(Debug)]
pub struct LoopbackBuffer {
    data: VecDeque<u8>,
    capacity: usize,
}

impl LoopbackBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Bytes waiting to be read
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes that can still be written
    pub fn space(&self) -> usize {
        self.capacity - self.data.len()
    }
}

/// Adapter over a [`LoopbackBuffer`]
///
/// An empty buffer reports `WouldBlock` rather than end-of-stream: more
/// bytes may be written at any time. A full buffer accepts a partial
/// write, or `WouldBlock` when not a single byte fits.
pub struct LoopbackStream {
    buffer: Arc<Mutex<LoopbackBuffer>>,
}

impl LoopbackStream {
    pub fn new(buffer: Arc<Mutex<LoopbackBuffer>>) -> Self {
        Self { buffer }
    }
}

impl Stream for LoopbackStream {
    fn capabilities(&self) -> AccessMode {
        AccessMode::read_write()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut pipe = self.buffer.lock();
        if pipe.data.is_empty() {
            return Err(IoError::WouldBlock);
        }
        let n = buf.len().min(pipe.data.len());
        for (slot, byte) in buf.iter_mut().zip(pipe.data.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut pipe = self.buffer.lock();
        let n = buf.len().min(pipe.space());
        if n == 0 {
            return Err(IoError::WouldBlock);
        }
        pipe.data.extend(&buf[..n]);
        Ok(n)
    }

    fn kind(&self) -> &'static str {
        "loopback"
    }
}

/// Reads end-of-stream, accepts and discards every write
pub struct NullStream;

impl Stream for NullStream {
    fn capabilities(&self) -> AccessMode {
        AccessMode::read_write()
    }

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, IoError> {
        Ok(0)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        Ok(buf.len())
    }

    fn kind(&self) -> &'static str {
        "null"
    }
}

/// Reads an endless run of zero bytes, discards writes
pub struct ZeroStream;

impl Stream for ZeroStream {
    fn capabilities(&self) -> AccessMode {
        AccessMode::read_write()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        buf.fill(0);
        Ok(buf.len())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        Ok(buf.len())
    }

    fn kind(&self) -> &'static str {
        "zero"
    }
}
