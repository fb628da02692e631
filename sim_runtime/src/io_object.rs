//! I/O backend adapters
//!
//! An [`IoObject`] is what a descriptor owns. There are two kinds:
//!
//! - **Console**: a byte-at-a-time character device behind a retry policy
//! - **Stream**: anything implementing [`Stream`]
//!
//! Adapters report raw [`IoError`]s; the descriptor table attaches the
//! descriptor and converts them into the ABI error taxonomy.

use crate::streams::Stream;
use core_types::{AccessMode, FileDescriptor};
use hal::{CharDevice, CharDeviceError, CharPoll};
use runtime_api::RuntimeError;
use spin::Mutex;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by adapters
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum IoError {
    /// No data (read) or no space (write) right now
    #[error("would block")]
    WouldBlock,

    /// The object cannot perform this operation at all
    #[error("{0} not supported by this object")]
    Unsupported(&'static str),
}

impl IoError {
    /// Attaches the descriptor and converts into the ABI taxonomy
    pub fn into_runtime(self, fd: FileDescriptor) -> RuntimeError {
        match self {
            IoError::WouldBlock => RuntimeError::WouldBlock(fd),
            IoError::Unsupported(operation) => RuntimeError::AccessDenied { fd, operation },
        }
    }
}

/// Console device shared by every console adapter
pub type SharedConsole = Arc<Mutex<Box<dyn CharDevice>>>;

/// Wraps a device for sharing between adapters
pub fn share_console<D: CharDevice + 'static>(device: D) -> SharedConsole {
    Arc::new(Mutex::new(Box::new(device)))
}

/// Adapter moving byte slices through a [`CharDevice`]
///
/// A device that reports `Pending` or `Busy` is re-polled up to
/// `retry_limit` times before the adapter gives up. Bytes already moved
/// are always reported; `WouldBlock` is only returned when nothing moved.
pub struct ConsoleAdapter {
    device: SharedConsole,
    access: AccessMode,
    retry_limit: u32,
}

impl ConsoleAdapter {
    pub fn new(device: SharedConsole, access: AccessMode, retry_limit: u32) -> Self {
        Self {
            device,
            access,
            retry_limit,
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        let mut filled = 0;
        let mut retries = 0;
        while filled < buf.len() {
            let poll = self.device.lock().poll_byte();
            match poll {
                CharPoll::Ready(byte) => {
                    buf[filled] = byte;
                    filled += 1;
                }
                CharPoll::Closed => break,
                CharPoll::Pending if filled > 0 => break,
                CharPoll::Pending if retries < self.retry_limit => {
                    retries += 1;
                    core::hint::spin_loop();
                }
                CharPoll::Pending => return Err(IoError::WouldBlock),
            }
        }
        Ok(filled)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        let mut written = 0;
        let mut retries = 0;
        while written < buf.len() {
            let result = self.device.lock().put_byte(buf[written]);
            match result {
                Ok(()) => {
                    written += 1;
                    retries = 0;
                }
                Err(CharDeviceError::Busy) if retries < self.retry_limit => {
                    retries += 1;
                    core::hint::spin_loop();
                }
                Err(CharDeviceError::Busy) if written == 0 => return Err(IoError::WouldBlock),
                Err(CharDeviceError::Busy) | Err(CharDeviceError::Disconnected) => break,
            }
        }
        Ok(written)
    }

    fn flush(&mut self) -> Result<(), IoError> {
        self.device
            .lock()
            .flush()
            .map_err(|_| IoError::WouldBlock)
    }

    fn device_name(&self) -> String {
        self.device.lock().identify().to_string()
    }
}

/// Object owned by a descriptor
pub enum IoObject {
    Console(ConsoleAdapter),
    Stream(Box<dyn Stream>),
}

impl IoObject {
    /// Wraps a stream
    pub fn stream<S: Stream + 'static>(stream: S) -> Self {
        IoObject::Stream(Box::new(stream))
    }

    /// Operations this object supports
    pub fn capabilities(&self) -> AccessMode {
        match self {
            IoObject::Console(console) => console.access,
            IoObject::Stream(stream) => stream.capabilities(),
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        match self {
            IoObject::Console(console) => console.read(buf),
            IoObject::Stream(stream) => stream.read(buf),
        }
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        match self {
            IoObject::Console(console) => console.write(buf),
            IoObject::Stream(stream) => stream.write(buf),
        }
    }

    pub fn flush(&mut self) -> Result<(), IoError> {
        match self {
            IoObject::Console(console) => console.flush(),
            IoObject::Stream(stream) => stream.flush(),
        }
    }

    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            IoObject::Console(console) => format!("console({})", console.device_name()),
            IoObject::Stream(stream) => format!("stream({})", stream.kind()),
        }
    }
}
