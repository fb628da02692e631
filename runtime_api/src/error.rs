//! Runtime error types

use core_types::{FileDescriptor, TimerHandle};
use thiserror::Error;

/// Result alias used by every runtime entry point
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors returned by the runtime entry points
///
/// None of these are fatal: the descriptor table and timer registry stay
/// usable after any single failed call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    /// Path did not resolve to an object
    #[error("Path not found: {0}")]
    NotFound(String),

    /// Options string was malformed or asks for access the target lacks
    #[error("Invalid open option: {0}")]
    InvalidOption(String),

    /// Descriptor was opened without the capability this operation needs
    #[error("Access denied: {fd} not opened for {operation}")]
    AccessDenied {
        fd: FileDescriptor,
        operation: &'static str,
    },

    /// Descriptor is not currently open
    #[error("Bad descriptor: {0}")]
    BadDescriptor(FileDescriptor),

    /// No identifier or slot left
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Timer handle is not live
    #[error("Bad timer handle: {0}")]
    BadHandle(TimerHandle),

    /// Argument outside the accepted domain
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Object has no data or space right now
    #[error("Operation would block on {0}")]
    WouldBlock(FileDescriptor),
}

impl RuntimeError {
    /// Returns true for signals the caller is expected to retry
    pub fn is_transient(&self) -> bool {
        matches!(self, RuntimeError::WouldBlock(_))
    }
}
