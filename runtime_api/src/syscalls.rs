//! Syscall payloads for the userland ABI boundary.
//!
//! These mirror the C header one call at a time, including the explicit
//! `len` arguments. Requests and replies are plain serde values so they can
//! be logged, replayed, or carried over a transport.

use crate::RuntimeError;
use core_types::{FileDescriptor, TimerHandle, TimerPeriod};
use serde::{Deserialize, Serialize};

/// One ABI call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Syscall {
    Open {
        path: String,
        options: String,
    },
    Read {
        fd: FileDescriptor,
        len: usize,
    },
    Write {
        fd: FileDescriptor,
        buffer: Vec<u8>,
        len: usize,
    },
    Close {
        fd: FileDescriptor,
        buffer: Vec<u8>,
        len: usize,
    },
    /// Function pointers cannot cross a serialized boundary, so callbacks
    /// are referenced by the name they were published under.
    RegisterTimer {
        callback: String,
    },
    TimerPeriod {
        timer: TimerHandle,
    },
    SetTimerPeriod {
        timer: TimerHandle,
        period: TimerPeriod,
    },
    Sleep {
        seconds: f64,
    },
}

impl Syscall {
    /// Stable name used in audit records
    pub fn name(&self) -> &'static str {
        match self {
            Syscall::Open { .. } => "open",
            Syscall::Read { .. } => "read",
            Syscall::Write { .. } => "write",
            Syscall::Close { .. } => "close",
            Syscall::RegisterTimer { .. } => "register_timer_cb",
            Syscall::TimerPeriod { .. } => "timer_period",
            Syscall::SetTimerPeriod { .. } => "set_timer_period",
            Syscall::Sleep { .. } => "sleep",
        }
    }
}

/// Successful result of one ABI call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyscallReply {
    Descriptor(FileDescriptor),
    Data(Vec<u8>),
    Written(usize),
    Timer(TimerHandle),
    Period(TimerPeriod),
    Done,
}

/// Error kinds aligned with RuntimeError variants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyscallErrorKind {
    NotFound,
    InvalidOption,
    AccessDenied,
    BadDescriptor,
    ResourceExhausted,
    BadHandle,
    InvalidArgument,
    WouldBlock,
}

/// Serializable syscall error details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyscallError {
    pub kind: SyscallErrorKind,
    pub message: String,
}

impl SyscallError {
    pub fn new(kind: SyscallErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl From<RuntimeError> for SyscallError {
    fn from(error: RuntimeError) -> Self {
        let kind = match &error {
            RuntimeError::NotFound(_) => SyscallErrorKind::NotFound,
            RuntimeError::InvalidOption(_) => SyscallErrorKind::InvalidOption,
            RuntimeError::AccessDenied { .. } => SyscallErrorKind::AccessDenied,
            RuntimeError::BadDescriptor(_) => SyscallErrorKind::BadDescriptor,
            RuntimeError::ResourceExhausted(_) => SyscallErrorKind::ResourceExhausted,
            RuntimeError::BadHandle(_) => SyscallErrorKind::BadHandle,
            RuntimeError::InvalidArgument(_) => SyscallErrorKind::InvalidArgument,
            RuntimeError::WouldBlock(_) => SyscallErrorKind::WouldBlock,
        };
        SyscallError::new(kind, error.to_string())
    }
}
