//! The single error type the core itself produces.
//!
//! Every subsystem below this (`mm::frame_allocator::FrameAllocatorError`,
//! `ipc::error::IpcError`, `syscall::SyscallError`, ...) already owns a
//! narrow, concrete error type for its own operations. `KernelError` exists
//! one layer up, for [`crate::bootstrap::kernel_init`] to report which boot
//! stage failed and why — trimmed to the handful of variants a boot-time
//! failure can actually produce, not a catch-all for every subsystem.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// A required subsystem or built-in resource was not ready yet.
    NotInitialized { subsystem: &'static str },
    /// A named resource (e.g. a registry queue) was already present.
    AlreadyExists { resource: &'static str, id: u64 },
    /// A named resource was looked up but never registered.
    NotFound { resource: &'static str, id: u64 },
    /// A boot-time argument (e.g. a `cmdline` token) failed validation.
    InvalidArgument { name: &'static str, value: &'static str },
}

pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized { subsystem } => {
                write!(f, "subsystem not initialized: {subsystem}")
            }
            Self::AlreadyExists { resource, id } => {
                write!(f, "{resource} with id {id} already exists")
            }
            Self::NotFound { resource, id } => write!(f, "{resource} with id {id} not found"),
            Self::InvalidArgument { name, value } => {
                write!(f, "invalid argument '{name}': {value}")
            }
        }
    }
}
