//! Memory syscalls: `sbrk`, `vm_allocate`, and the heap extension ABI
//! (`nh_alloc`/`nh_free`/`nh_realloc`, `halloc`/`hptr`/`hfree`) — `spec.md` §6.

use core::sync::atomic::{AtomicU64, Ordering};

use super::{SyscallError, SyscallResult};
use crate::mm::heap::{legacy, nitro};
use crate::mm::{frame_allocator, page_table, PageFlags, VirtualAddress, FRAME_SIZE};

/// Base of the per-thread `sbrk` heap region. Arbitrary but fixed, chosen
/// well clear of the kernel half and of [`VM_ALLOCATE_BASE`].
const SBRK_BASE: u64 = 0x0000_4000_0000_0000;
/// Base of the `vm_allocate` bump region, separate from `sbrk` so the two
/// syscalls never hand out overlapping ranges.
const VM_ALLOCATE_BASE: u64 = 0x0000_5000_0000_0000;

static VM_ALLOCATE_CURSOR: AtomicU64 = AtomicU64::new(VM_ALLOCATE_BASE);

fn map_zeroed_pages(base: u64, pages: usize) -> Result<(), SyscallError> {
    let pml4 = page_table::active_pml4().ok_or(SyscallError::Generic)?;
    for i in 0..pages {
        let frame = frame_allocator::alloc(0, 0, false).ok_or(SyscallError::Generic)?;
        // SAFETY: `frame` was just allocated and is not yet mapped or aliased.
        unsafe {
            core::ptr::write_bytes(frame.addr().as_u64() as *mut u8, 0, FRAME_SIZE);
        }
        let virt = VirtualAddress::new(base + (i * FRAME_SIZE) as u64);
        page_table::map(pml4, virt, frame, PageFlags::USER_RW)
            .map_err(|_| SyscallError::Generic)?;
    }
    Ok(())
}

/// `4 sbrk(delta)` — extend the caller's heap break; returns the old break.
/// `delta` is a signed byte count; shrinking only lowers the recorded break
/// (pages already mapped for the region are left mapped, matching the
/// legacy `brk` behavior of never actually reclaiming on shrink).
pub fn sys_sbrk(delta: isize) -> SyscallResult {
    let old_brk = crate::sched::current_brk();
    let old_brk = if old_brk == 0 { SBRK_BASE } else { old_brk };

    let new_brk = if delta >= 0 {
        old_brk + delta as u64
    } else {
        old_brk.saturating_sub((-delta) as u64)
    };

    if delta > 0 {
        let old_pages = (old_brk - SBRK_BASE).div_ceil(FRAME_SIZE as u64);
        let new_pages = (new_brk - SBRK_BASE).div_ceil(FRAME_SIZE as u64);
        if new_pages > old_pages {
            let grow_base = SBRK_BASE + old_pages * FRAME_SIZE as u64;
            map_zeroed_pages(grow_base, (new_pages - old_pages) as usize)?;
        }
    }

    crate::sched::set_current_brk(new_brk);
    Ok(old_brk as usize)
}

/// `6 vm_allocate(size)` — allocate and map `size` bytes into the caller's
/// address space; returns the base address.
pub fn sys_vm_allocate(size: usize) -> SyscallResult {
    if size == 0 {
        return Err(SyscallError::Generic);
    }
    let pages = size.div_ceil(FRAME_SIZE);
    let base = VM_ALLOCATE_CURSOR.fetch_add((pages * FRAME_SIZE) as u64, Ordering::Relaxed);
    map_zeroed_pages(base, pages)?;
    Ok(base as usize)
}

/// `nh_alloc` — allocate `size` bytes aligned to `align` from the NitroHeap
/// backend directly, bypassing the `heap=` command-line selection.
pub fn sys_nh_alloc(size: usize, align: usize) -> SyscallResult {
    let ptr = nitro::alloc(size, align.max(1), 0);
    if ptr.is_null() {
        return Err(SyscallError::Generic);
    }
    Ok(ptr as usize)
}

/// `nh_free` — free a block returned by [`sys_nh_alloc`].
pub fn sys_nh_free(ptr: usize, size: usize, align: usize) -> SyscallResult {
    if ptr == 0 {
        return Ok(0);
    }
    // SAFETY: the caller must pass back exactly the `(ptr, size, align)` it
    // received from `sys_nh_alloc`, per the heap ABI's contract.
    unsafe { nitro::free(ptr as *mut u8, size, align.max(1), 0) };
    Ok(0)
}

/// `nh_realloc` — grow or shrink a block previously returned by
/// [`sys_nh_alloc`].
pub fn sys_nh_realloc(ptr: usize, old_size: usize, new_size: usize, align: usize) -> SyscallResult {
    // SAFETY: same contract as `sys_nh_free`.
    let new_ptr = unsafe {
        nitro::realloc(ptr as *mut u8, old_size, new_size, align.max(1), 0)
    };
    if new_ptr.is_null() {
        return Err(SyscallError::Generic);
    }
    Ok(new_ptr as usize)
}

/// `halloc` — allocate from the legacy buddy-backed heap directly.
pub fn sys_halloc(size: usize) -> SyscallResult {
    let ptr = legacy::alloc(size, 0);
    if ptr.is_null() {
        return Err(SyscallError::Generic);
    }
    Ok(ptr as usize)
}

/// `hptr` — query the usable size of a block returned by [`sys_halloc`].
pub fn sys_hptr(ptr: usize) -> SyscallResult {
    if ptr == 0 {
        return Err(SyscallError::Generic);
    }
    // SAFETY: the caller must pass back a pointer previously returned by
    // `sys_halloc` and not yet freed.
    let size = unsafe { legacy::alloc_size(ptr as *const u8) };
    Ok(size)
}

/// `hfree` — free a block returned by [`sys_halloc`].
pub fn sys_hfree(ptr: usize) -> SyscallResult {
    if ptr == 0 {
        return Ok(0);
    }
    // SAFETY: same contract as `sys_hptr`.
    unsafe { legacy::free(ptr as *mut u8, 0) };
    Ok(0)
}
