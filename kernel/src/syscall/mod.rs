//! System call dispatch: `int 0x80`, numbers and argument order per
//! `spec.md` §6. [`crate::arch::x86_64::idt`]'s naked syscall gate reshuffles
//! the CPU-level calling convention (RAX/RDI/RSI/RDX) into this module's
//! [`dispatch`] before `iretq`-ing the result back in RAX.

mod memory;
mod process;
mod time;

/// Result of a syscall handler. Folded into a single `u64` by [`dispatch`]
/// before returning to Ring 3.
pub type SyscallResult = Result<usize, SyscallError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// Catch-all for a handler-specific failure (bad args, exhausted
    /// resources, malformed ELF, ...). Collapses to the same sentinel as
    /// every other variant; the ABI has no room for a richer error code.
    Generic,
    /// A `copy_to_user`/`copy_from_user` inside the handler rejected the
    /// range (non-canonical, unmapped, or wrapping).
    Fault,
    InvalidSyscall,
}

/// `spec.md` §6: all unknown numbers, and every handler error, return `-1`.
const ERROR_SENTINEL: u64 = u64::MAX;

fn to_raw(result: SyscallResult) -> u64 {
    match result {
        Ok(value) => value as u64,
        Err(_) => ERROR_SENTINEL,
    }
}

/// Entry point called by the `int 0x80` gate with the syscall number and up
/// to three arguments, already reshuffled into SysV order. Returns the raw
/// value to place in RAX before `iretq`.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch(num: u64, a1: u64, a2: u64, a3: u64) -> u64 {
    let result = match num {
        0 => process::sys_yield(),
        1 => process::sys_write_vga(a1),
        2 => process::sys_fork(),
        3 => process::sys_exec(a1),
        4 => memory::sys_sbrk(a1 as isize),
        5 => time::sys_clock_gettime(a1 as usize, a2),
        6 => memory::sys_vm_allocate(a1 as usize),
        8 | 9 | 10 | 11 => sys_fd_stub(),
        32..=43 => sys_nitrfs_stub(),
        100 => memory::sys_nh_alloc(a1 as usize, a2 as usize),
        101 => memory::sys_nh_free(a1 as usize, a2 as usize, a3 as usize),
        102 => memory::sys_nh_realloc(a1 as usize, a2 as usize, a3 as usize, 0),
        103 => memory::sys_halloc(a1 as usize),
        104 => memory::sys_hptr(a1 as usize),
        105 => memory::sys_hfree(a1 as usize),
        _ => Err(SyscallError::InvalidSyscall),
    };
    to_raw(result)
}

/// `8/9/10/11 open/read/write/close` — the device file table has exactly
/// one built-in device (the console), which the legacy `write_vga` path
/// already covers; real file descriptor semantics are out of scope
/// (`spec.md` §1), so these report "no such device" for now.
fn sys_fd_stub() -> SyscallResult {
    Err(SyscallError::Generic)
}

/// `32-43 nitrfs_*` — reserved numbers forwarded to the filesystem agent,
/// which lives outside the core (`spec.md` §1 Non-goals).
fn sys_nitrfs_stub() -> SyscallResult {
    Err(SyscallError::Generic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_syscall_returns_sentinel() {
        assert_eq!(to_raw(Err(SyscallError::InvalidSyscall)), ERROR_SENTINEL);
    }

    #[test]
    fn ok_result_passes_through() {
        assert_eq!(to_raw(Ok(7)), 7);
    }
}
