//! Mount namespace
//!
//! Paths resolve against a flat table: either a well-known console path or
//! an exact mount point from the configuration. There are no directories
//! and no relative paths.

use crate::config::{MountConfig, MountKind};
use crate::streams::{
    LoopbackBuffer, LoopbackStream, MemoryFile, MemoryStream, NullStream, Stream, ZeroStream,
};
use core_types::{AccessMode, FileDescriptor};
use runtime_api::OpenOptions;
use spin::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Paths that name the console rather than a mount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsolePath {
    Stdin,
    Stdout,
    Stderr,
    /// A fresh read/write console adapter
    Console,
}

impl ConsolePath {
    pub fn parse(path: &str) -> Option<Self> {
        match path {
            "stdin" | "/dev/stdin" => Some(ConsolePath::Stdin),
            "stdout" | "/dev/stdout" => Some(ConsolePath::Stdout),
            "stderr" | "/dev/stderr" => Some(ConsolePath::Stderr),
            "console" | "/dev/console" | "/dev/tty" => Some(ConsolePath::Console),
            _ => None,
        }
    }

    /// Pre-bound descriptor for stdin/stdout/stderr
    pub fn reserved_descriptor(&self) -> Option<FileDescriptor> {
        match self {
            ConsolePath::Stdin => Some(FileDescriptor::STDIN),
            ConsolePath::Stdout => Some(FileDescriptor::STDOUT),
            ConsolePath::Stderr => Some(FileDescriptor::STDERR),
            ConsolePath::Console => None,
        }
    }
}

/// Storage behind a mount point
#[derive(Clone)]
pub enum Backing {
    Memory(Arc<Mutex<MemoryFile>>),
    Loopback(Arc<Mutex<LoopbackBuffer>>),
    Null,
    Zero,
}

impl Backing {
    pub fn from_kind(kind: &MountKind) -> Self {
        match kind {
            MountKind::Memory { contents, writable } => Backing::Memory(Arc::new(Mutex::new(
                MemoryFile::new(contents.as_bytes().to_vec(), *writable),
            ))),
            MountKind::Loopback { capacity } => {
                Backing::Loopback(Arc::new(Mutex::new(LoopbackBuffer::new(*capacity))))
            }
            MountKind::Null => Backing::Null,
            MountKind::Zero => Backing::Zero,
        }
    }

    /// Operations any stream opened on this backing supports
    pub fn capabilities(&self) -> AccessMode {
        match self {
            Backing::Memory(file) if !file.lock().is_writable() => AccessMode::read_only(),
            _ => AccessMode::read_write(),
        }
    }

    /// Creates a new stream adapter for one `open`
    pub fn instantiate(&self, options: &OpenOptions) -> Box<dyn Stream> {
        match self {
            Backing::Memory(file) => Box::new(MemoryStream::open(
                file.clone(),
                options.truncate,
                options.append,
            )),
            Backing::Loopback(buffer) => Box::new(LoopbackStream::new(buffer.clone())),
            Backing::Null => Box::new(NullStream),
            Backing::Zero => Box::new(ZeroStream),
        }
    }
}

/// Resolved target of a path
pub enum Resolved<'a> {
    Console(ConsolePath),
    Mount(&'a Backing),
}

/// Flat path → backing table
#[derive(Clone, Default)]
pub struct Namespace {
    mounts: BTreeMap<String, Backing>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(mounts: &[MountConfig]) -> Self {
        let mut namespace = Self::new();
        for mount in mounts {
            namespace.mount(&mount.path, Backing::from_kind(&mount.kind));
        }
        namespace
    }

    /// Adds or replaces a mount point
    pub fn mount(&mut self, path: &str, backing: Backing) {
        self.mounts.insert(path.to_string(), backing);
    }

    pub fn resolve(&self, path: &str) -> Option<Resolved<'_>> {
        if let Some(console) = ConsolePath::parse(path) {
            return Some(Resolved::Console(console));
        }
        self.mounts.get(path).map(Resolved::Mount)
    }

    /// Mount points in sorted order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.mounts.keys().map(String::as_str)
    }

    /// Direct access to a mount's backing (for inspection)
    pub fn backing(&self, path: &str) -> Option<&Backing> {
        self.mounts.get(path)
    }
}
