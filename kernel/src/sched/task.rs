//! Thread control blocks and the static thread pool.
//!
//! Grounded on the original kernel's `thread_t` plus `spec.md` §3/§9: a
//! fixed-size array of thread slots and fixed-size stacks, so bootstrapping
//! the scheduler never needs the heap. Run-queue and zombie links are pool
//! indices rather than pointers, per the Design Notes' "index-based links
//! into a static pool" guidance.

#![allow(dead_code)]

use core::sync::atomic::{AtomicU32, Ordering};

use lazy_static::lazy_static;
use spin::Mutex;

use crate::arch::x86_64::context::X86_64Context;

/// Upper bound on live threads. Generous for a single-CPU-at-boot kernel
/// with a handful of built-in agents; raise if SMP AP bring-up lands.
pub const MAX_THREADS: usize = 64;
/// Per-thread kernel stack size.
pub const STACK_SIZE: usize = 16 * 1024;
/// Guards reuse of a pool slot: a stale index into a reaped-and-recycled
/// slot will not match the magic word stamped at `thread_create`.
const MAGIC: u32 = 0x5468_7244; // "ThrD"

/// Thread priority bounds (`spec.md` §4.F: "valid priorities are clamped to
/// `[MIN, MAX]`").
pub const PRIORITY_MIN: u8 = 0;
pub const PRIORITY_MAX: u8 = 255;
pub const PRIORITY_DEFAULT: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Pool slot not in use.
    Free,
    Ready,
    Running,
    Blocked,
    Exited,
}

/// `{id, rsp, entry_fn, stack, state, priority, started, next, magic}` per
/// `spec.md` §3. `rsp` lives inside `context` (the teacher's struct-based
/// context-switch machinery persists the full register file, not just the
/// stack pointer; see `DESIGN.md`).
pub struct Thread {
    pub id: usize,
    pub context: X86_64Context,
    pub entry_fn: usize,
    pub stack_top: usize,
    pub state: ThreadState,
    pub priority: u8,
    pub started: bool,
    /// Next thread in whatever intrusive list currently owns this slot (run
    /// queue or zombie list), by pool index.
    pub next: Option<usize>,
    pub magic: u32,
    /// Current `sbrk` break for this thread's user heap region. `0` means
    /// unset; the first `sbrk` call picks a base (`spec.md` §6 syscall 4).
    pub brk: u64,
}

impl Thread {
    fn empty(id: usize) -> Self {
        Self {
            id,
            context: X86_64Context::default(),
            entry_fn: 0,
            stack_top: 0,
            state: ThreadState::Free,
            priority: PRIORITY_DEFAULT,
            started: false,
            next: None,
            magic: 0,
            brk: 0,
        }
    }
}

/// The entry trampoline referenced by every freshly built context's RIP.
/// Runs in thread context with the real entry function address in `rdi`
/// (SysV first-argument register); falls into `thread_exit` when the entry
/// function returns instead of returning to a dangling caller.
#[no_mangle]
pub extern "C" fn thread_trampoline(entry: usize) -> ! {
    // SAFETY: `entry` was set by `ThreadPool::create` to a valid `fn()`
    // pointer and is only ever invoked once, on the stack that frame
    // belongs to.
    let entry: fn() = unsafe { core::mem::transmute::<usize, fn()>(entry) };
    entry();
    super::scheduler::thread_exit();
}

pub struct ThreadPool {
    threads: [Thread; MAX_THREADS],
    stacks: [[u8; STACK_SIZE]; MAX_THREADS],
}

impl ThreadPool {
    pub(crate) fn new() -> Self {
        Self {
            threads: core::array::from_fn(Thread::empty),
            stacks: [[0; STACK_SIZE]; MAX_THREADS],
        }
    }

    pub fn get(&self, idx: usize) -> &Thread {
        &self.threads[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut Thread {
        &mut self.threads[idx]
    }

    /// Find a free slot and carve a thread into it. Returns the pool index,
    /// or `None` if the pool is exhausted.
    pub fn create(&mut self, entry: fn(), priority: u8) -> Option<usize> {
        let idx = self.threads.iter().position(|t| t.state == ThreadState::Free)?;
        let stack_top = self.stacks[idx].as_ptr() as usize + STACK_SIZE;

        let thread = &mut self.threads[idx];
        thread.context = X86_64Context::new_kernel_thread(entry as usize, stack_top);
        thread.entry_fn = entry as usize;
        thread.stack_top = stack_top;
        thread.state = ThreadState::Ready;
        thread.priority = priority.clamp(PRIORITY_MIN, PRIORITY_MAX);
        thread.started = false;
        thread.next = None;
        thread.magic = MAGIC ^ (idx as u32);
        Some(idx)
    }

    /// Duplicate `parent` into a free slot: the `fork` syscall (`spec.md`
    /// §6). Copies the parent's saved register context and relocates its
    /// `rsp` into the child's own stack buffer at the same relative offset,
    /// so the child resumes at the same point with an independent stack.
    /// The child's context is set to return `0`.
    pub fn fork_from(&mut self, parent: usize) -> Option<usize> {
        let idx = self.threads.iter().position(|t| t.state == ThreadState::Free)?;

        let parent_stack_base = self.stacks[parent].as_ptr() as usize;
        let parent_priority = self.threads[parent].priority;
        let parent_entry_fn = self.threads[parent].entry_fn;
        let parent_brk = self.threads[parent].brk;
        let mut ctx = self.threads[parent].context.clone();
        let offset = ctx.rsp as usize - parent_stack_base;

        self.stacks[idx] = self.stacks[parent];
        let child_stack_base = self.stacks[idx].as_ptr() as usize;
        ctx.rsp = (child_stack_base + offset) as u64;
        ctx.set_return_value(0);

        let thread = &mut self.threads[idx];
        thread.context = ctx;
        thread.entry_fn = parent_entry_fn;
        thread.stack_top = child_stack_base + STACK_SIZE;
        thread.state = ThreadState::Ready;
        thread.priority = parent_priority;
        thread.started = true;
        thread.next = None;
        thread.magic = MAGIC ^ (idx as u32);
        thread.brk = parent_brk;
        Some(idx)
    }

    /// Reset a slot to `Free` after it has been reaped from the zombie
    /// list. Checks the magic word so a stale index never resurrects a
    /// thread that was already recycled.
    pub fn reap(&mut self, idx: usize) -> bool {
        let thread = &mut self.threads[idx];
        if thread.magic != MAGIC ^ (idx as u32) || thread.state != ThreadState::Exited {
            return false;
        }
        *thread = Thread::empty(idx);
        true
    }
}

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

pub fn next_thread_id() -> u32 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

lazy_static! {
    pub static ref POOL: Mutex<ThreadPool> = Mutex::new(ThreadPool::new());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() {}

    #[test]
    fn create_assigns_free_slot() {
        let mut pool = ThreadPool::new();
        let a = pool.create(noop, 100).unwrap();
        let b = pool.create(noop, 50).unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.get(a).state, ThreadState::Ready);
        assert_eq!(pool.get(b).priority, 50);
    }

    #[test]
    fn priority_clamped_to_bounds() {
        let mut pool = ThreadPool::new();
        let idx = pool.create(noop, 255).unwrap();
        assert_eq!(pool.get(idx).priority, PRIORITY_MAX);
    }

    #[test]
    fn reap_rejects_wrong_magic() {
        let mut pool = ThreadPool::new();
        let idx = pool.create(noop, 100).unwrap();
        // Not yet Exited: reap must refuse.
        assert!(!pool.reap(idx));
        pool.get_mut(idx).state = ThreadState::Exited;
        assert!(pool.reap(idx));
        assert_eq!(pool.get(idx).state, ThreadState::Free);
    }
}
