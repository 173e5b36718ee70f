//! `clock_gettime` — `spec.md` §6 syscall 5.

use super::SyscallResult;

/// `{sec, nsec}`, matching the struct `clock_gettime(clk, out_ts)` writes
/// into user memory.
#[repr(C)]
struct Timespec {
    sec: u64,
    nsec: u64,
}

/// `clk` is accepted but ignored: the core exposes a single monotonic clock
/// (`crate::timer`'s tick count), not the POSIX `CLOCK_REALTIME` /
/// `CLOCK_MONOTONIC` distinction.
pub fn sys_clock_gettime(_clk: usize, out_ts: u64) -> SyscallResult {
    let uptime_ms = crate::timer::get_uptime_ms();
    let ts = Timespec {
        sec: uptime_ms / 1000,
        nsec: (uptime_ms % 1000) * 1_000_000,
    };
    // SAFETY: `ts` is a local, fully-initialized `Timespec`.
    let rc = unsafe {
        crate::mm::uaccess::copy_to_user(
            out_ts,
            &ts as *const Timespec as *const u8,
            core::mem::size_of::<Timespec>(),
        )
    };
    if rc != 0 {
        return Err(super::SyscallError::Fault);
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timespec_matches_wire_layout() {
        assert_eq!(core::mem::size_of::<Timespec>(), 16);
    }
}
