//! Named IPC queue registry.
//!
//! User-space agents do not share queue pointers directly; they look a
//! queue up by the well-known name RegX (the out-of-scope registry agent,
//! `spec.md` §1) assigns it. The core only needs to hand out a stable
//! `&'static Queue` for a name and remember which names exist.

#![allow(dead_code)]

use alloc::boxed::Box;

use spin::Mutex;

use super::queue::Queue;

/// Upper bound on distinct named queues the core can register at once.
pub const MAX_QUEUES: usize = 32;

struct Entry {
    name: &'static str,
    queue: &'static Queue,
}

static REGISTRY: Mutex<([Option<Entry>; MAX_QUEUES], usize)> =
    Mutex::new(([const { None }; MAX_QUEUES], 0));

/// Create a fresh queue and register it under `name`, or return the
/// existing one if `name` is already registered.
pub fn register(name: &'static str) -> &'static Queue {
    let mut guard = REGISTRY.lock();
    let (entries, count) = &mut *guard;

    for entry in entries.iter().flatten() {
        if entry.name == name {
            return entry.queue;
        }
    }

    let queue: &'static Queue = Box::leak(Box::new(Queue::new()));
    if *count < MAX_QUEUES {
        entries[*count] = Some(Entry { name, queue });
        *count += 1;
    }
    queue
}

/// Look up a previously registered queue by name.
pub fn lookup(name: &str) -> Option<&'static Queue> {
    let guard = REGISTRY.lock();
    guard
        .0
        .iter()
        .flatten()
        .find(|entry| entry.name == name)
        .map(|entry| entry.queue)
}

/// The two queues the core itself depends on at boot: one the registry
/// agent listens on, one the init agent listens on. User-space binds to
/// these by name once it starts running.
pub fn init() {
    register("registry");
    register("init");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_lookup_round_trips() {
        let q = register("test-queue-a");
        let found = lookup("test-queue-a").unwrap();
        assert!(core::ptr::eq(q, found));
    }

    #[test]
    fn register_is_idempotent() {
        let a = register("test-queue-b");
        let b = register("test-queue-b");
        assert!(core::ptr::eq(a, b));
    }
}
