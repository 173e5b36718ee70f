//! IPC error types and result definitions.
//!
//! Error codes mirror the three failure modes the core's `send`/`receive`
//! path can hit: a full queue, a missing capability, and an oversized
//! payload. Anything else is a logic bug, not a runtime error.

use core::fmt;

/// IPC operation result type.
pub type Result<T> = core::result::Result<T, IpcError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcError {
    /// Queue is at capacity (`send`) or the caller should yield and retry
    /// (`receive` on an empty queue).
    Unavailable,
    /// Sender lacks SEND, or receiver lacks RECV.
    NoCapability,
    /// `msg.len` exceeds `IPC_MSG_DATA_MAX`.
    PayloadTooLarge,
}

impl IpcError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unavailable => "queue full (send) or empty (receive)",
            Self::NoCapability => "missing IPC capability",
            Self::PayloadTooLarge => "payload exceeds IPC_MSG_DATA_MAX",
        }
    }

    /// The syscall-boundary error code per `spec.md` §4.G / §7.
    pub fn to_errno(self) -> i32 {
        match self {
            Self::Unavailable => -1,
            Self::NoCapability => -2,
            Self::PayloadTooLarge => -3,
        }
    }
}

impl fmt::Display for IpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
