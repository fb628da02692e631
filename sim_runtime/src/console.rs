//! # Console Devices
//!
//! Character devices backing the console descriptors.
//!
//! [`SimConsole`] is the deterministic test double: tests inject input
//! bytes and inspect captured output. Cloning it yields another handle on
//! the same device, so a test can keep one while the runtime owns the
//! other. [`HostConsole`] forwards output to the host process's stdout or
//! stderr.

use hal::{CharDevice, CharDeviceError, CharPoll};
use spin::Mutex;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;

#[derive(Debug, Default)]
struct SimConsoleState {
    input: VecDeque<u8>,
    input_closed: bool,
    output: Vec<u8>,
    output_capacity: Option<usize>,
    disconnected: bool,
}

/// Simulated console with controllable input and captured output
#[derive(Debug, Clone, Default)]
pub struct SimConsole {
    state: Arc<Mutex<SimConsoleState>>,
}

impl SimConsole {
    /// Creates a console with unbounded output capture
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a console that refuses output beyond `capacity` bytes
    /// until the test drains it
    pub fn with_output_capacity(capacity: usize) -> Self {
        let console = Self::new();
        console.state.lock().output_capacity = Some(capacity);
        console
    }

    /// Queues bytes for the input side
    pub fn inject_input(&self, bytes: &[u8]) {
        self.state.lock().input.extend(bytes.iter().copied());
    }

    /// Marks the input side as closed; reads drain then report end-of-stream
    pub fn close_input(&self) {
        self.state.lock().input_closed = true;
    }

    /// Simulates unplugging the output side
    pub fn disconnect(&self) {
        self.state.lock().disconnected = true;
    }

    /// Returns everything written so far
    pub fn output(&self) -> Vec<u8> {
        self.state.lock().output.clone()
    }

    /// Returns captured output as UTF-8 (lossy)
    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().output).into_owned()
    }

    /// Removes and returns captured output, freeing capacity
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().output)
    }

    /// Bytes of input not yet consumed
    pub fn pending_input(&self) -> usize {
        self.state.lock().input.len()
    }
}

impl CharDevice for SimConsole {
    fn poll_byte(&mut self) -> CharPoll {
        let mut state = self.state.lock();
        match state.input.pop_front() {
            Some(byte) => CharPoll::Ready(byte),
            None if state.input_closed => CharPoll::Closed,
            None => CharPoll::Pending,
        }
    }

    fn put_byte(&mut self, byte: u8) -> Result<(), CharDeviceError> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(CharDeviceError::Disconnected);
        }
        if let Some(capacity) = state.output_capacity {
            if state.output.len() >= capacity {
                return Err(CharDeviceError::Busy);
            }
        }
        state.output.push(byte);
        Ok(())
    }

    fn identify(&self) -> &str {
        "sim-console"
    }
}

/// Which host stream a [`HostConsole`] writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStream {
    Stdout,
    Stderr,
}

/// Console forwarding output to the host process
///
/// The input side is always closed: a hosted runtime has no keyboard to
/// poll without blocking.
#[derive(Debug)]
pub struct HostConsole {
    stream: HostStream,
}

impl HostConsole {
    pub fn stdout() -> Self {
        Self {
            stream: HostStream::Stdout,
        }
    }

    pub fn stderr() -> Self {
        Self {
            stream: HostStream::Stderr,
        }
    }
}

impl CharDevice for HostConsole {
    fn poll_byte(&mut self) -> CharPoll {
        CharPoll::Closed
    }

    fn put_byte(&mut self, byte: u8) -> Result<(), CharDeviceError> {
        let result = match self.stream {
            HostStream::Stdout => std::io::stdout().write_all(&[byte]),
            HostStream::Stderr => std::io::stderr().write_all(&[byte]),
        };
        result.map_err(|_| CharDeviceError::Disconnected)
    }

    fn flush(&mut self) -> Result<(), CharDeviceError> {
        let result = match self.stream {
            HostStream::Stdout => std::io::stdout().flush(),
            HostStream::Stderr => std::io::stderr().flush(),
        };
        result.map_err(|_| CharDeviceError::Disconnected)
    }

    fn identify(&self) -> &str {
        match self.stream {
            HostStream::Stdout => "host-stdout",
            HostStream::Stderr => "host-stderr",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_injection() {
        let mut console = SimConsole::new();
        assert_eq!(console.poll_byte(), CharPoll::Pending);

        console.inject_input(b"ok");
        assert_eq!(console.pending_input(), 2);
        assert_eq!(console.poll_byte(), CharPoll::Ready(b'o'));
        assert_eq!(console.poll_byte(), CharPoll::Ready(b'k'));
        assert_eq!(console.poll_byte(), CharPoll::Pending);

        console.close_input();
        assert_eq!(console.poll_byte(), CharPoll::Closed);
    }

    #[test]
    fn test_clones_share_state() {
        let observer = SimConsole::new();
        let mut device = observer.clone();
        device.put_byte(b'h').unwrap();
        device.put_byte(b'i').unwrap();
        assert_eq!(observer.output_string(), "hi");
    }

    #[test]
    fn test_output_capacity() {
        let mut console = SimConsole::with_output_capacity(1);
        console.put_byte(b'a').unwrap();
        assert_eq!(console.put_byte(b'b'), Err(CharDeviceError::Busy));
        assert_eq!(console.take_output(), b"a".to_vec());
        assert!(console.put_byte(b'b').is_ok());
    }

    #[test]
    fn test_disconnect() {
        let mut console = SimConsole::new();
        console.disconnect();
        assert_eq!(console.put_byte(b'x'), Err(CharDeviceError::Disconnected));
    }

    #[test]
    fn test_host_console_identity() {
        assert_eq!(HostConsole::stdout().identify(), "host-stdout");
        let mut err = HostConsole::stderr();
        assert_eq!(err.poll_byte(), CharPoll::Closed);
    }
}
