//! Descriptor table
//!
//! Maps 16-bit descriptors to the I/O objects they own.
//!
//! ## Locking
//!
//! The table lock only guards the map itself: lookup, insertion and
//! removal. Each entry has its own lock, so a slow write on one descriptor
//! never stalls another descriptor. The two locks are never held at the
//! same time.
//!
//! ## Identifier reuse
//!
//! `close` keeps the entry in the map (state `Closing`) while it flushes and
//! releases the object, and only removes it afterwards. An identifier can
//! therefore not be handed out again until its `close` has completed.

use crate::io_object::IoObject;
use core_types::FileDescriptor;
use log::{debug, trace, warn};
use runtime_api::{OpenOptions, RuntimeError, RuntimeResult};
use spin::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Lifecycle of a table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Open,
    Closing,
    Closed,
}

/// One open object and the options it was opened with
pub struct OpenFile {
    path: String,
    options: OpenOptions,
    object: IoObject,
    state: FileState,
}

impl OpenFile {
    pub fn new(path: &str, options: OpenOptions, object: IoObject) -> Self {
        Self {
            path: path.to_string(),
            options,
            object,
            state: FileState::Open,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn options(&self) -> OpenOptions {
        self.options
    }

    pub fn state(&self) -> FileState {
        self.state
    }

    /// Writes as much of `pending` as the object takes, then flushes
    fn drain_pending(&mut self, fd: FileDescriptor, pending: &[u8]) {
        if pending.is_empty() {
            return;
        }
        if !self.options.write {
            debug!("{}: discarding {} pending bytes, not writable", fd, pending.len());
            return;
        }

        let mut offset = 0;
        while offset < pending.len() {
            match self.object.write(&pending[offset..]) {
                Ok(0) => break,
                Ok(n) => offset += n,
                Err(err) => {
                    warn!("{}: flush on close stopped: {}", fd, err);
                    break;
                }
            }
        }
        if offset < pending.len() {
            warn!(
                "{}: dropped {} of {} pending bytes on close",
                fd,
                pending.len() - offset,
                pending.len()
            );
        }
        if let Err(err) = self.object.flush() {
            warn!("{}: device flush failed: {}", fd, err);
        }
    }
}

type Slot = Arc<Mutex<OpenFile>>;

/// Descriptor → object table
pub struct DescriptorTable {
    slots: Mutex<BTreeMap<FileDescriptor, Slot>>,
    capacity: u32,
}

impl DescriptorTable {
    /// Creates a table addressing descriptors `0..capacity`
    pub fn new(capacity: u32) -> Self {
        Self {
            slots: Mutex::new(BTreeMap::new()),
            capacity,
        }
    }

    /// Binds one of stdin/stdout/stderr
    ///
    /// # Panics
    ///
    /// Panics if `fd` is not a reserved descriptor.
    pub fn bind_reserved(&self, fd: FileDescriptor, file: OpenFile) {
        assert!(fd.is_reserved(), "{} is not a reserved descriptor", fd);
        trace!("{}: bound to {}", fd, file.object.describe());
        self.slots.lock().insert(fd, Arc::new(Mutex::new(file)));
    }

    /// Inserts an object under the lowest free dynamic descriptor
    pub fn insert(&self, file: OpenFile) -> RuntimeResult<FileDescriptor> {
        let mut slots = self.slots.lock();
        let fd = self.lowest_free(&slots).ok_or_else(|| {
            RuntimeError::ResourceExhausted(format!(
                "all {} descriptors in use",
                self.capacity
            ))
        })?;
        debug!("{}: open {} as {}", fd, file.path, file.object.describe());
        slots.insert(fd, Arc::new(Mutex::new(file)));
        Ok(fd)
    }

    fn lowest_free(&self, slots: &BTreeMap<FileDescriptor, Slot>) -> Option<FileDescriptor> {
        let mut candidate = u32::from(FileDescriptor::FIRST_DYNAMIC);
        let taken = slots
            .range(FileDescriptor::new(FileDescriptor::FIRST_DYNAMIC)..)
            .map(|(fd, _)| u32::from(fd.as_u16()));
        for fd in taken {
            if fd != candidate {
                break;
            }
            candidate += 1;
        }
        if candidate < self.capacity {
            u16::try_from(candidate).ok().map(FileDescriptor::new)
        } else {
            None
        }
    }

    fn slot(&self, fd: FileDescriptor) -> Option<Slot> {
        self.slots.lock().get(&fd).cloned()
    }

    /// Reads from an open descriptor
    pub fn read(&self, fd: FileDescriptor, buf: &mut [u8]) -> RuntimeResult<usize> {
        let slot = self.slot(fd).ok_or(RuntimeError::BadDescriptor(fd))?;
        let mut file = slot.lock();
        if file.state != FileState::Open {
            return Err(RuntimeError::BadDescriptor(fd));
        }
        if !file.options.read {
            return Err(RuntimeError::AccessDenied {
                fd,
                operation: "read",
            });
        }
        let n = file.object.read(buf).map_err(|e| e.into_runtime(fd))?;
        trace!("{}: read {}/{} bytes", fd, n, buf.len());
        Ok(n)
    }

    /// Writes to an open descriptor
    pub fn write(&self, fd: FileDescriptor, buf: &[u8]) -> RuntimeResult<usize> {
        let slot = self.slot(fd).ok_or(RuntimeError::BadDescriptor(fd))?;
        let mut file = slot.lock();
        if file.state != FileState::Open {
            return Err(RuntimeError::BadDescriptor(fd));
        }
        if !file.options.write {
            return Err(RuntimeError::AccessDenied {
                fd,
                operation: "write",
            });
        }
        let n = file.object.write(buf).map_err(|e| e.into_runtime(fd))?;
        trace!("{}: wrote {}/{} bytes", fd, n, buf.len());
        Ok(n)
    }

    /// Flushes `pending`, releases the object and frees the identifier
    ///
    /// Unknown or already-closing descriptors are a no-op. The reserved
    /// descriptors are flushed but stay bound.
    pub fn close(&self, fd: FileDescriptor, pending: &[u8]) -> RuntimeResult<()> {
        let Some(slot) = self.slot(fd) else {
            trace!("{}: close of unknown descriptor ignored", fd);
            return Ok(());
        };

        {
            let mut file = slot.lock();
            if file.state != FileState::Open {
                return Ok(());
            }
            if fd.is_reserved() {
                file.drain_pending(fd, pending);
                trace!("{}: reserved descriptor flushed, binding kept", fd);
                return Ok(());
            }

            file.state = FileState::Closing;
            file.drain_pending(fd, pending);
            file.state = FileState::Closed;
        }

        self.slots.lock().remove(&fd);
        debug!("{}: closed", fd);
        Ok(())
    }

    /// Returns true if `fd` is open and not being closed
    pub fn is_open(&self, fd: FileDescriptor) -> bool {
        self.slot(fd)
            .map(|slot| slot.lock().state == FileState::Open)
            .unwrap_or(false)
    }

    /// Options a descriptor was opened with
    pub fn options(&self, fd: FileDescriptor) -> RuntimeResult<OpenOptions> {
        let slot = self.slot(fd).ok_or(RuntimeError::BadDescriptor(fd))?;
        let file = slot.lock();
        Ok(file.options)
    }

    /// Descriptors currently in the table, ascending
    pub fn descriptors(&self) -> Vec<FileDescriptor> {
        self.slots.lock().keys().copied().collect()
    }

    /// Number of entries, including the reserved three
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}
