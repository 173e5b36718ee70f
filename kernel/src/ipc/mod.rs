//! IPC & capabilities: bounded message queues and refcounted shared memory.
//!
//! [`queue`] is the core's bounded ring-queue type (`spec.md` §3/§4.G/§6);
//! [`registry`] is the name→queue lookup the built-in agents bind through;
//! [`shared_memory`] is the refcounted page-sharing mechanism.

pub mod error;
pub mod queue;
pub mod registry;
pub mod shared_memory;

pub use error::{IpcError, Result};
pub use queue::{Caps, Message, Queue, IPC_MSG_DATA_MAX, QUEUE_CAPACITY};
pub use shared_memory::Region;

/// Stage G of `bootstrap::init`: the two queues the core's own agents need
/// before anything else can bind to them.
pub fn init() {
    registry::init();
    log::info!("[IPC] registry and init queues ready");
}
