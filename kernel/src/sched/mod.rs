//! Threading & scheduler: priority round-robin over a static thread pool.
//!
//! [`task`] owns the thread-control-block pool and per-thread stacks,
//! [`queue`] is the single-CPU run queue, [`scheduler`] is the `schedule()`
//! algorithm and the public thread lifecycle API (`spec.md` §4.F).

pub mod queue;
pub mod scheduler;
pub mod task;

pub use scheduler::{
    current_brk, current_thread_id, enter_user_mode, set_current_brk, set_current_priority,
    thread_block, thread_create, thread_exit, thread_fork, thread_kill, thread_unblock,
    thread_yield,
};
pub use task::{ThreadState, PRIORITY_DEFAULT, PRIORITY_MAX, PRIORITY_MIN};

use crate::ipc::{registry, Caps};

/// `spec.md` §4.I step 8: install the boot stack as the idle thread before
/// anything else in the core can assume a `current` thread exists.
pub fn threads_early_init() {
    scheduler::threads_early_init();
}

/// `spec.md` §4.I step 9: create the built-in IPC queues and spawn the
/// threads that own them. Filesystem contents, the registry agent's actual
/// bindings, and every other user-space agent are external collaborators
/// (`spec.md` §1); these two threads just keep the "registry" and "init"
/// queues serviced so the core's own capability/queue plumbing has a live
/// receiver to hand a message to in tests and early boot.
pub fn threads_init() {
    let registry_queue = registry::lookup("registry").expect("registry queue missing");
    let init_queue = registry::lookup("init").expect("init queue missing");

    if let Some(id) = thread_create(registry_agent_main, 200) {
        registry_queue.grant(id, Caps::SEND | Caps::RECV);
    }
    if let Some(id) = thread_create(init_agent_main, 180) {
        init_queue.grant(id, Caps::SEND | Caps::RECV);
    }
}

fn registry_agent_main() {
    let queue = registry::lookup("registry").expect("registry queue missing");
    let self_id = current_thread_id().unwrap_or(0);
    loop {
        let _ = queue.receive_blocking(self_id);
    }
}

fn init_agent_main() {
    let queue = registry::lookup("init").expect("init queue missing");
    let self_id = current_thread_id().unwrap_or(0);
    loop {
        let _ = queue.receive_blocking(self_id);
    }
}
