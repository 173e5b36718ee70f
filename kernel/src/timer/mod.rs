//! Monotonic uptime counter, driven by the timer interrupt.
//!
//! `spec.md` §6 syscall 5 (`clock_gettime`) exposes a single monotonic clock
//! rather than a POSIX `CLOCK_REALTIME`/`CLOCK_MONOTONIC` pair; this is the
//! millisecond counter backing it. [`timer_tick`] is called from
//! [`crate::arch::x86_64::idt`]'s timer interrupt handler once per tick.

use core::sync::atomic::{AtomicU64, Ordering};

static UPTIME_MS: AtomicU64 = AtomicU64::new(0);

/// Advance the monotonic uptime counter by `elapsed_ms`. Called once per
/// timer interrupt, ahead of the scheduler preemption check.
pub fn timer_tick(elapsed_ms: u64) {
    UPTIME_MS.fetch_add(elapsed_ms, Ordering::Relaxed);
}

/// Milliseconds elapsed since boot.
pub fn get_uptime_ms() -> u64 {
    UPTIME_MS.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_accumulates_across_ticks() {
        timer_tick(10);
        timer_tick(5);
        assert!(get_uptime_ms() >= 15);
    }
}
