//! Bounded IPC message queues with per-task send/receive capability bits.
//!
//! Grounded on the original kernel's `ipc_queue_t` ring buffer: a fixed
//! number of slots, a `head`/`tail` index pair, and a `caps[]` table gating
//! which task ids may send or receive on the queue. Capacity and message
//! layout match `spec.md` §3/§6 exactly so the wire format matches what a
//! user-space agent expects over `int 0x80`.

#![allow(dead_code)]

use spin::Mutex;

use super::error::{IpcError, Result};

/// Maximum payload carried inline in a message.
pub const IPC_MSG_DATA_MAX: usize = 64;
/// Number of message slots per queue.
pub const QUEUE_CAPACITY: usize = 16;
/// Upper bound on distinct task ids a queue can grant capabilities to.
pub const MAX_TASKS: usize = 256;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Caps: u8 {
        const SEND = 0b01;
        const RECV = 0b10;
    }
}

/// `{type, sender, arg1, arg2, len, data[64]}` — the exact wire layout of
/// `spec.md` §6's IPC message.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Message {
    pub msg_type: u32,
    pub sender: u32,
    pub arg1: u32,
    pub arg2: u32,
    pub len: u32,
    pub data: [u8; IPC_MSG_DATA_MAX],
}

impl Message {
    pub const fn empty() -> Self {
        Self {
            msg_type: 0,
            sender: 0,
            arg1: 0,
            arg2: 0,
            len: 0,
            data: [0; IPC_MSG_DATA_MAX],
        }
    }

    /// Build a message from a byte payload, truncating nothing: callers must
    /// check `payload.len() <= IPC_MSG_DATA_MAX` before calling `send`.
    pub fn with_payload(msg_type: u32, arg1: u32, arg2: u32, payload: &[u8]) -> Self {
        let mut data = [0u8; IPC_MSG_DATA_MAX];
        let len = payload.len().min(IPC_MSG_DATA_MAX);
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            msg_type,
            sender: 0,
            arg1,
            arg2,
            len: len as u32,
            data,
        }
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::empty()
    }
}

struct Ring {
    slots: [Message; QUEUE_CAPACITY],
    head: usize,
    tail: usize,
    count: usize,
    caps: [Caps; MAX_TASKS],
}

impl Ring {
    const fn new() -> Self {
        Self {
            slots: [Message::empty(); QUEUE_CAPACITY],
            head: 0,
            tail: 0,
            count: 0,
            caps: [Caps::empty(); MAX_TASKS],
        }
    }
}

/// A fixed-capacity IPC ring queue. Owned by whoever created it (typically
/// the registry/init agent); tasks interact with it only through `send` and
/// `receive` after being `grant`ed capability bits.
pub struct Queue {
    inner: Mutex<Ring>,
}

impl Queue {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Ring::new()),
        }
    }

    /// Install SEND and/or RECV bits for `task_id`. Out-of-range ids are
    /// silently ignored (there is no task to grant to).
    pub fn grant(&self, task_id: usize, caps: Caps) {
        if let Some(slot) = self.inner.lock().caps.get_mut(task_id) {
            *slot |= caps;
        }
    }

    /// Drop previously granted bits.
    pub fn revoke(&self, task_id: usize, caps: Caps) {
        if let Some(slot) = self.inner.lock().caps.get_mut(task_id) {
            slot.remove(caps);
        }
    }

    pub fn has(&self, task_id: usize, caps: Caps) -> bool {
        self.inner
            .lock()
            .caps
            .get(task_id)
            .is_some_and(|c| c.contains(caps))
    }

    /// `send(queue, sender_id, msg)` per `spec.md` §4.G: checked in order
    /// SEND-capability, payload size, then queue capacity.
    pub fn send(&self, sender_id: usize, mut msg: Message) -> Result<()> {
        if !self.has(sender_id, Caps::SEND) {
            return Err(IpcError::NoCapability);
        }
        if msg.len as usize > IPC_MSG_DATA_MAX {
            return Err(IpcError::PayloadTooLarge);
        }

        let mut ring = self.inner.lock();
        if ring.count == QUEUE_CAPACITY {
            return Err(IpcError::Unavailable);
        }
        msg.sender = sender_id as u32;
        let head = ring.head;
        ring.slots[head] = msg;
        ring.head = (head + 1) % QUEUE_CAPACITY;
        ring.count += 1;
        Ok(())
    }

    /// Non-blocking `receive`. On an empty queue the caller is expected to
    /// `thread_yield()` and retry; that policy lives in `receive_blocking`,
    /// not here, so this stays usable from contexts that cannot yield.
    pub fn receive(&self, receiver_id: usize) -> Result<Message> {
        if !self.has(receiver_id, Caps::RECV) {
            return Err(IpcError::NoCapability);
        }

        let mut ring = self.inner.lock();
        if ring.count == 0 {
            return Err(IpcError::Unavailable);
        }
        let tail = ring.tail;
        let msg = ring.slots[tail];
        ring.tail = (tail + 1) % QUEUE_CAPACITY;
        ring.count -= 1;
        Ok(msg)
    }

    /// Loop on `receive` until a message arrives, yielding the caller's
    /// thread between attempts so other threads can make progress.
    pub fn receive_blocking(&self, receiver_id: usize) -> Result<Message> {
        loop {
            match self.receive(receiver_id) {
                Err(IpcError::Unavailable) => crate::sched::thread_yield(),
                other => return other,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == QUEUE_CAPACITY
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_enforcement_matches_s2() {
        let q = Queue::new();
        q.grant(1, Caps::SEND);
        q.grant(2, Caps::RECV);

        let msg = Message::with_payload(1, 0, 0, b"test");
        assert!(q.send(1, msg).is_ok());

        let received = q.receive(2).unwrap();
        assert_eq!(received.msg_type, 1);
        assert_eq!(received.len, 4);
        assert_eq!(&received.data[..4], b"test");
        assert_eq!(received.sender, 1);

        assert_eq!(q.send(2, Message::empty()), Err(IpcError::NoCapability));
        assert_eq!(q.receive(2), Err(IpcError::Unavailable));
    }

    #[test]
    fn fifo_ordering_within_one_queue() {
        let q = Queue::new();
        q.grant(1, Caps::SEND);
        q.grant(1, Caps::RECV);

        for i in 0..4 {
            q.send(1, Message::with_payload(i, 0, 0, &[])).unwrap();
        }
        for i in 0..4 {
            assert_eq!(q.receive(1).unwrap().msg_type, i);
        }
    }

    #[test]
    fn full_queue_rejects_with_minus_one() {
        let q = Queue::new();
        q.grant(1, Caps::SEND);
        for _ in 0..QUEUE_CAPACITY {
            q.send(1, Message::empty()).unwrap();
        }
        assert_eq!(q.send(1, Message::empty()), Err(IpcError::Unavailable));
    }

    #[test]
    fn oversized_payload_rejected() {
        let q = Queue::new();
        q.grant(1, Caps::SEND);
        let mut msg = Message::empty();
        msg.len = (IPC_MSG_DATA_MAX + 1) as u32;
        assert_eq!(q.send(1, msg), Err(IpcError::PayloadTooLarge));
    }

    #[test]
    fn revoke_removes_capability() {
        let q = Queue::new();
        q.grant(1, Caps::SEND | Caps::RECV);
        q.revoke(1, Caps::SEND);
        assert!(!q.has(1, Caps::SEND));
        assert!(q.has(1, Caps::RECV));
    }
}
