//! Priority round-robin scheduler: cooperative yields and timer preemption.
//!
//! Implements `spec.md` §4.F's five-step `schedule()` algorithm directly over
//! the single global [`super::queue::RunQueue`] and [`super::task::ThreadPool`]
//! built in this module's siblings. The core targets one boot CPU, so there
//! is exactly one `current` slot and one run queue; no per-CPU indirection.

#![allow(dead_code)]

use core::sync::atomic::{AtomicUsize, Ordering};

use lazy_static::lazy_static;
use spin::Mutex;

use crate::arch::x86_64::context::{load_context, switch_context, X86_64Context};

use super::queue::RunQueue;
use super::task::{ThreadState, MAX_THREADS, POOL, PRIORITY_MAX, PRIORITY_MIN};

/// No thread is running yet: sentinel for `CURRENT` before `threads_early_init`.
const NONE: usize = usize::MAX;

static CURRENT: AtomicUsize = AtomicUsize::new(NONE);

lazy_static! {
    static ref RUN_QUEUE: Mutex<RunQueue> = Mutex::new(RunQueue::new());
    /// LIFO of pool indices awaiting `ThreadPool::reap`, `spec.md` §3's
    /// zombie list.
    static ref ZOMBIES: Mutex<[Option<usize>; MAX_THREADS]> = Mutex::new([None; MAX_THREADS]);
}

fn current() -> Option<usize> {
    match CURRENT.load(Ordering::Acquire) {
        NONE => None,
        idx => Some(idx),
    }
}

/// Thread 0 is always the idle loop created by `threads_early_init`, and is
/// deliberately kept off the run queue: `schedule_impl` falls back to it only
/// when no other thread is `Ready`.
fn idle_thread_id() -> usize {
    0
}

fn idle_loop() {
    loop {
        crate::arch::idle();
        thread_yield();
    }
}

/// Install the boot stack as thread 0 (the idle thread), so `schedule()` has
/// a `current` to demote the first time it runs. `spec.md` §4.I step 8.
pub fn threads_early_init() {
    let mut pool = POOL.lock();
    let idx = pool
        .create(idle_loop, PRIORITY_MIN)
        .expect("thread pool exhausted during early init");
    pool.get_mut(idx).state = ThreadState::Running;
    pool.get_mut(idx).started = true;
    drop(pool);
    CURRENT.store(idx, Ordering::Release);
}

/// Create a new thread and place it `Ready` on the run queue. Returns the
/// pool index (the thread id), or `None` if the pool is exhausted.
pub fn thread_create(entry: fn(), priority: u8) -> Option<usize> {
    let mut pool = POOL.lock();
    let idx = pool.create(entry, priority)?;
    let mut rq = RUN_QUEUE.lock();
    rq.insert(&mut pool, idx);
    Some(idx)
}

/// `fork` (`spec.md` §6 syscall 2): duplicate the calling thread. Returns
/// the child's pool index (the parent's syscall return value), or `None` on
/// pool exhaustion.
pub fn thread_fork() -> Option<usize> {
    let me = current()?;
    let mut pool = POOL.lock();
    let child = pool.fork_from(me)?;
    let mut rq = RUN_QUEUE.lock();
    rq.insert(&mut pool, child);
    Some(child)
}

/// `spec.md` §4.F steps 1-5. Caller is responsible for interrupts being
/// disabled on entry; restores them per the newly chosen thread's own
/// `rflags` once it resumes (that thread's `context.rflags` is whatever it
/// was running with when last descheduled, or `0x002`/`0x202` fresh out of
/// `X86_64Context::new`/`new_user`).
fn schedule_impl() {
    let prev = current();

    let (prev_ctx, next_ctx_ptr, next_idx) = {
        let mut pool = POOL.lock();
        let mut rq = RUN_QUEUE.lock();

        // Step 2: demote a still-Running current back to Ready.
        if let Some(p) = prev {
            if pool.get(p).state == ThreadState::Running {
                pool.get_mut(p).state = ThreadState::Ready;
            }
        }

        // Step 3: scan the ring once starting just after `prev`; highest
        // priority Ready wins, ties go to whichever is hit first.
        let chosen = rq
            .highest_priority_ready(&pool, prev)
            .unwrap_or_else(idle_thread_id);

        // Step 4: mark it Running.
        pool.get_mut(chosen).state = ThreadState::Running;
        pool.get_mut(chosen).started = true;

        let prev_ctx: *mut X86_64Context = match prev {
            Some(p) => &mut pool.get_mut(p).context as *mut _,
            None => core::ptr::null_mut(),
        };
        let next_ctx: *const X86_64Context = &pool.get(chosen).context as *const _;
        (prev_ctx, next_ctx, chosen)
    };

    if prev != Some(next_idx) {
        CURRENT.store(next_idx, Ordering::Release);
        if prev_ctx.is_null() {
            // Nothing to save into yet: the very first schedule() call.
            unsafe { load_context(next_ctx_ptr) };
        } else {
            unsafe { switch_context(&mut *prev_ctx, &*next_ctx_ptr) };
        }
    }

    // Step 4 (cont'd): "when control returns, add any prior-Exited thread to
    // the zombie list and reap." Control returns here the next time `prev`
    // is switched back in; by then the thread that was running right before
    // *that* call may have exited and never come back.
    if let Some(p) = prev {
        let exited = {
            let pool = POOL.lock();
            pool.get(p).state == ThreadState::Exited
        };
        if exited {
            push_zombie(p);
            reap_zombies();
        }
    }
}

fn push_zombie(idx: usize) {
    let mut z = ZOMBIES.lock();
    if let Some(slot) = z.iter_mut().find(|s| s.is_none()) {
        *slot = Some(idx);
    }
}

fn reap_zombies() {
    let mut z = ZOMBIES.lock();
    let mut pool = POOL.lock();
    for slot in z.iter_mut() {
        if let Some(idx) = slot.take() {
            pool.reap(idx);
        }
    }
}

fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    x86_64::instructions::interrupts::without_interrupts(f)
}

/// Cooperative yield: give up the CPU but stay `Ready`.
pub fn thread_yield() {
    without_interrupts(schedule_impl);
}

/// Timer-ISR preemption path. Same algorithm as [`thread_yield`], called
/// from the timer interrupt handler, which already runs with interrupts
/// disabled and an `iretq` ahead that restores the chosen thread's flags.
pub fn schedule_from_isr() {
    schedule_impl();
}

/// Block the current thread (e.g. waiting on an empty IPC queue) and give up
/// the CPU. Returns once another thread calls [`thread_unblock`] on it.
pub fn thread_block() {
    let me = current().expect("thread_block with no current thread");
    without_interrupts(|| {
        let mut pool = POOL.lock();
        pool.get_mut(me).state = ThreadState::Blocked;
        let mut rq = RUN_QUEUE.lock();
        rq.remove(&mut pool, me);
        drop(rq);
        drop(pool);
        schedule_impl();
    });
}

/// Mark `idx` `Ready` and splice it back onto the run queue. `spec.md` §4.F:
/// unblocking a higher-priority thread may preempt the caller on the very
/// next `schedule()` call. That falls out for free here, since
/// `highest_priority_ready` always returns the top priority regardless of
/// who called it.
pub fn thread_unblock(idx: usize) {
    let mut pool = POOL.lock();
    if pool.get(idx).state != ThreadState::Blocked {
        return;
    }
    pool.get_mut(idx).state = ThreadState::Ready;
    let mut rq = RUN_QUEUE.lock();
    rq.insert(&mut pool, idx);
}

/// Terminate the calling thread. Never returns; a later `schedule_impl` call
/// reaps it once it is safely off the CPU.
pub fn thread_exit() -> ! {
    let me = current().expect("thread_exit with no current thread");
    without_interrupts(|| {
        let mut pool = POOL.lock();
        pool.get_mut(me).state = ThreadState::Exited;
        let mut rq = RUN_QUEUE.lock();
        rq.remove(&mut pool, me);
        drop(rq);
        drop(pool);
        schedule_impl();
    });
    unreachable!("schedule_impl switched away from an Exited thread and never returned")
}

/// Force another thread to exit. If `idx` is the caller, behaves like
/// [`thread_exit`]. Otherwise removes it from the run queue and reaps it
/// immediately, since nothing will ever switch back into a killed thread's
/// context.
pub fn thread_kill(idx: usize) {
    if current() == Some(idx) {
        thread_exit();
    }
    let mut pool = POOL.lock();
    pool.get_mut(idx).state = ThreadState::Exited;
    let mut rq = RUN_QUEUE.lock();
    rq.remove(&mut pool, idx);
    drop(rq);
    drop(pool);
    push_zombie(idx);
    reap_zombies();
}

/// Change the current thread's priority, clamped to
/// `[PRIORITY_MIN, PRIORITY_MAX]`. `spec.md` §4.F: lowering below some other
/// Ready thread's priority yields immediately.
pub fn set_current_priority(priority: u8) {
    let me = current().expect("set_current_priority with no current thread");
    let priority = priority.clamp(PRIORITY_MIN, PRIORITY_MAX);
    POOL.lock().get_mut(me).priority = priority;
    thread_yield();
}

pub fn current_thread_id() -> Option<usize> {
    current()
}

/// The calling thread's current `sbrk` break (`0` if never set).
pub fn current_brk() -> u64 {
    let me = current().expect("current_brk with no current thread");
    POOL.lock().get(me).brk
}

pub fn set_current_brk(value: u64) {
    let me = current().expect("set_current_brk with no current thread");
    POOL.lock().get_mut(me).brk = value;
}

/// Build an `iretq` frame and drop to Ring 3 at `(rip, rsp)`. Never returns.
/// `spec.md` §4.F/§6: selectors come from the installed GDT (0x1B/0x23).
pub fn enter_user_mode(rip: u64, rsp: u64) -> ! {
    let selectors = crate::arch::x86_64::gdt::selectors();
    let cs = selectors.user_code_selector.0 as u64;
    let ss = selectors.user_data_selector.0 as u64;
    const RFLAGS_IF: u64 = 1 << 9;

    unsafe {
        core::arch::asm!(
            "push {ss}",
            "push {rsp}",
            "push {rflags}",
            "push {cs}",
            "push {rip}",
            "iretq",
            ss = in(reg) ss,
            rsp = in(reg) rsp,
            rflags = in(reg) RFLAGS_IF,
            cs = in(reg) cs,
            rip = in(reg) rip,
            options(noreturn)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_thread_is_always_slot_zero() {
        assert_eq!(idle_thread_id(), 0);
    }
}
