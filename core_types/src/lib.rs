//! # Core Types
//!
//! This crate defines the identifiers shared by every layer of the
//! initrd runtime.
//!
//! ## Philosophy
//!
//! - **Explicit over implicit**: a descriptor is never confused with a timer handle.
//! - **ABI-shaped**: every identifier has the width the userland header declares.
//! - **Serializable**: identifiers cross the syscall boundary as plain values.
//!
//! ## Key Types
//!
//! - [`FileDescriptor`]: 16-bit handle to an open I/O object
//! - [`TimerHandle`]: 16-bit handle to a registered timer
//! - [`TimerPeriod`]: timer period in 1/8192 second quanta
//! - [`AccessMode`]: read/write capability flags of an I/O object

pub mod access;
pub mod ids;

pub use access::{AccessError, AccessMode};
pub use ids::{FileDescriptor, TimerHandle, TimerPeriod};
