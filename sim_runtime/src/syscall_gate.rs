//! Syscall gate for the userland ABI boundary.
//!
//! Serialized [`Syscall`] requests enter here, are routed to a
//! [`RuntimeApi`] implementation, and leave as a [`SyscallReply`] or a
//! [`SyscallError`]. Every call is recorded in an audit log stamped with
//! the runtime tick.

use runtime_api::{RuntimeApi, RuntimeError, Syscall, SyscallError, SyscallErrorKind, SyscallReply, TimerCallback};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Largest buffer a single `Read` request allocates; longer reads come back short
pub const MAX_READ_CHUNK: usize = 64 * 1024;

/// Syscall audit event (for testing and verification).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyscallEvent {
    /// Syscall was invoked
    Invoked {
        caller: String,
        syscall_name: String,
        tick: u64,
    },
    /// Syscall completed successfully
    Completed {
        caller: String,
        syscall_name: String,
        tick: u64,
    },
    /// Syscall was rejected
    Rejected {
        caller: String,
        syscall_name: String,
        reason: String,
        tick: u64,
    },
}

/// Audit log for syscall operations.
#[derive(Debug, Clone, Default)]
pub struct SyscallAuditLog {
    events: Vec<SyscallEvent>,
}

impl SyscallAuditLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn record(&mut self, event: SyscallEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[SyscallEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&SyscallEvent) -> bool,
    {
        self.events.iter().any(predicate)
    }

    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&SyscallEvent) -> bool,
    {
        self.events.iter().filter(|e| predicate(e)).count()
    }
}

/// Callbacks published for `RegisterTimer` requests, by name
#[derive(Default)]
pub struct CallbackTable {
    callbacks: BTreeMap<String, Arc<dyn TimerCallback>>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a callback, replacing any previous one of the same name
    pub fn publish(&mut self, name: &str, callback: Arc<dyn TimerCallback>) {
        self.callbacks.insert(name.to_string(), callback);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TimerCallback>> {
        self.callbacks.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.callbacks.keys().map(String::as_str)
    }
}

/// Routes serialized requests to a runtime.
#[derive(Default)]
pub struct SyscallGate {
    audit_log: SyscallAuditLog,
    callbacks: CallbackTable,
}

impl SyscallGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the audit log
    pub fn audit_log(&self) -> &SyscallAuditLog {
        &self.audit_log
    }

    pub fn clear_audit_log(&mut self) {
        self.audit_log.clear();
    }

    pub fn callbacks_mut(&mut self) -> &mut CallbackTable {
        &mut self.callbacks
    }

    /// Executes one request on behalf of `caller`.
    ///
    /// Buffers are clamped to the request's `len` the way the C ABI reads
    /// them: `Read` never returns more than `len` bytes, and a `Write` or
    /// `Close` whose `len` exceeds its buffer is rejected.
    pub fn execute(
        &mut self,
        runtime: &dyn RuntimeApi,
        caller: &str,
        syscall: Syscall,
    ) -> Result<SyscallReply, SyscallError> {
        let syscall_name = syscall.name().to_string();

        self.audit_log.record(SyscallEvent::Invoked {
            caller: caller.to_string(),
            syscall_name: syscall_name.clone(),
            tick: runtime.now().ticks(),
        });

        let result = self.route(runtime, syscall);

        let tick = runtime.now().ticks();
        match &result {
            Ok(_) => {
                self.audit_log.record(SyscallEvent::Completed {
                    caller: caller.to_string(),
                    syscall_name,
                    tick,
                });
            }
            Err(err) => {
                self.audit_log.record(SyscallEvent::Rejected {
                    caller: caller.to_string(),
                    syscall_name,
                    reason: err.message.clone(),
                    tick,
                });
            }
        }

        result
    }

    fn route(&self, runtime: &dyn RuntimeApi, syscall: Syscall) -> Result<SyscallReply, SyscallError> {
        let reply = match syscall {
            Syscall::Open { path, options } => {
                runtime.open(&path, &options).map(SyscallReply::Descriptor)
            }
            Syscall::Read { fd, len } => {
                let mut buffer = vec![0u8; len.min(MAX_READ_CHUNK)];
                runtime.read(fd, &mut buffer).map(|n| {
                    buffer.truncate(n);
                    SyscallReply::Data(buffer)
                })
            }
            Syscall::Write { fd, buffer, len } => {
                let data = clamp(&buffer, len)?;
                runtime.write(fd, data).map(SyscallReply::Written)
            }
            Syscall::Close { fd, buffer, len } => {
                let pending = clamp(&buffer, len)?;
                runtime.close(fd, pending).map(|_| SyscallReply::Done)
            }
            Syscall::RegisterTimer { callback } => {
                let cb = self.callbacks.get(&callback).ok_or_else(|| {
                    SyscallError::new(
                        SyscallErrorKind::NotFound,
                        format!("No callback published as '{}'", callback),
                    )
                })?;
                runtime.register_timer_cb(cb).map(SyscallReply::Timer)
            }
            Syscall::TimerPeriod { timer } => {
                runtime.timer_period(timer).map(SyscallReply::Period)
            }
            Syscall::SetTimerPeriod { timer, period } => runtime
                .set_timer_period(timer, period)
                .map(|_| SyscallReply::Done),
            Syscall::Sleep { seconds } => runtime.sleep(seconds).map(|_| SyscallReply::Done),
        };
        reply.map_err(SyscallError::from)
    }
}

fn clamp(buffer: &[u8], len: usize) -> Result<&[u8], SyscallError> {
    buffer.get(..len).ok_or_else(|| {
        RuntimeError::InvalidArgument(format!(
            "len {} exceeds buffer of {} bytes",
            len,
            buffer.len()
        ))
        .into()
    })
}
