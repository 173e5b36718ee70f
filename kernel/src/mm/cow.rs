//! Copy-on-write bookkeeping: per-frame refcounts and COW flags.
//!
//! Mirrors `cow_init`/`cow_mark`/`cow_unmark`/`cow_is_marked`/`cow_inc_ref`/
//! `cow_dec_ref`/`cow_refcount` from the original kernel's `cow.c` exactly,
//! including the odd asymmetry that `mark`/`unmark`/`is_marked` take a
//! *virtual* address (resolved to a frame index via the active page table)
//! while `inc_ref`/`dec_ref`/`refcount` take a physical one directly.
//!
//! This runs before the kernel heap exists (COW is wired up before the heap
//! in `mm::init`), so the refcount and flag tables are fixed-size statics
//! rather than a heap-allocated `Vec`, same as the buddy allocator's
//! per-node zone array.

#![allow(dead_code)]

use core::sync::atomic::{AtomicU16, AtomicU64, AtomicU8, Ordering};

use spin::Mutex;

use super::{page_table, FRAME_SIZE};

/// Upper bound on the number of physical frames COW can track (1 GiB worth
/// of 4 KiB frames). Frames beyond this are silently untracked, matching the
/// original's bounds-checked `if (frame < frames)` guards.
const MAX_COW_FRAMES: usize = 1 << 18;

static REFCOUNTS: [AtomicU16; MAX_COW_FRAMES] = {
    const ZERO: AtomicU16 = AtomicU16::new(0);
    [ZERO; MAX_COW_FRAMES]
};
static COW_FLAGS: [AtomicU8; MAX_COW_FRAMES] = {
    const ZERO: AtomicU8 = AtomicU8::new(0);
    [ZERO; MAX_COW_FRAMES]
};
static TRACKED_FRAMES: AtomicU64 = AtomicU64::new(0);

/// Record how many physical frames are actually backed by memory, clamped to
/// [`MAX_COW_FRAMES`].
pub fn init(total_frames: usize) {
    let tracked = total_frames.min(MAX_COW_FRAMES) as u64;
    TRACKED_FRAMES.store(tracked, Ordering::Relaxed);
    log::info!("[COW] tracking {} frames", tracked);
}

fn frame_index(phys: u64) -> Option<usize> {
    let frame = (phys / FRAME_SIZE as u64) as usize;
    if (frame as u64) < TRACKED_FRAMES.load(Ordering::Relaxed) {
        Some(frame)
    } else {
        None
    }
}

/// Increment the reference count of the frame backing physical address
/// `phys`. Saturates rather than wrapping on overflow.
pub fn inc_ref(phys: u64) {
    let Some(idx) = frame_index(phys) else { return };
    let prev = REFCOUNTS[idx].load(Ordering::Relaxed);
    if prev == u16::MAX {
        log::warn!("[COW] refcount overflow at frame {idx}");
        return;
    }
    REFCOUNTS[idx].store(prev + 1, Ordering::Relaxed);
}

/// Decrement the reference count of the frame backing physical address
/// `phys`. No-op if already zero.
pub fn dec_ref(phys: u64) {
    let Some(idx) = frame_index(phys) else { return };
    let prev = REFCOUNTS[idx].load(Ordering::Relaxed);
    if prev > 0 {
        REFCOUNTS[idx].store(prev - 1, Ordering::Relaxed);
    }
}

/// Current reference count of the frame backing physical address `phys`.
pub fn refcount(phys: u64) -> u16 {
    match frame_index(phys) {
        Some(idx) => REFCOUNTS[idx].load(Ordering::Relaxed),
        None => 0,
    }
}

/// Resolve `virt` through the active page table to its backing frame index.
fn resolve_frame(virt: u64) -> Option<(usize, u64)> {
    let phys = page_table::translate(super::VirtualAddress::new(virt))?;
    let idx = frame_index(phys.as_u64())?;
    Some((idx, phys.as_u64()))
}

/// Mark the page mapped at `virt` copy-on-write: the mapping is re-installed
/// read-only (writable bit cleared) so the next write to it traps into
/// [`crate::mm::page_fault`].
pub fn mark(virt: u64) {
    let Some((idx, phys)) = resolve_frame(virt) else { return };
    COW_FLAGS[idx].store(1, Ordering::Relaxed);
    remap(virt, phys, false);
}

/// Clear the copy-on-write flag and restore the page as writable (used once
/// a COW fault resolves down to the last remaining reference).
pub fn unmark(virt: u64) {
    let Some((idx, phys)) = resolve_frame(virt) else { return };
    COW_FLAGS[idx].store(0, Ordering::Relaxed);
    remap(virt, phys, true);
}

/// Whether the page mapped at `virt` is currently marked copy-on-write.
pub fn is_marked(virt: u64) -> bool {
    match resolve_frame(virt) {
        Some((idx, _)) => COW_FLAGS[idx].load(Ordering::Relaxed) != 0,
        None => false,
    }
}

fn remap(virt: u64, phys: u64, writable: bool) {
    use super::{FrameNumber, PageFlags, VirtualAddress};

    let Some(pml4) = page_table::active_pml4() else {
        return;
    };
    let _ = page_table::unmap(pml4, VirtualAddress::new(virt));
    let mut flags = PageFlags::PRESENT | PageFlags::USER | PageFlags::NO_EXECUTE;
    if writable {
        flags |= PageFlags::WRITABLE;
    }
    let _ = page_table::map(
        pml4,
        VirtualAddress::new(virt),
        FrameNumber::from_addr(super::PhysicalAddress::new(phys)),
        flags,
    );
}

/// Frame-table-wide lock used only to serialize the mark/unmark remap
/// sequence against a concurrent fault on the same address; the refcount and
/// flag arrays themselves are lock-free atomics.
static REMAP_GUARD: Mutex<()> = Mutex::new(());

/// Serialize a mark/unmark/fault-resolution sequence against other CPUs.
pub fn lock() -> spin::MutexGuard<'static, ()> {
    REMAP_GUARD.lock()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refcount_round_trip() {
        init(1024);
        let phys = 16 * FRAME_SIZE as u64;
        assert_eq!(refcount(phys), 0);
        inc_ref(phys);
        inc_ref(phys);
        assert_eq!(refcount(phys), 2);
        dec_ref(phys);
        assert_eq!(refcount(phys), 1);
    }

    #[test]
    fn refcount_does_not_underflow() {
        init(1024);
        let phys = 20 * FRAME_SIZE as u64;
        dec_ref(phys);
        assert_eq!(refcount(phys), 0);
    }

    #[test]
    fn out_of_range_frame_is_ignored() {
        init(4);
        let phys = 1000 * FRAME_SIZE as u64;
        inc_ref(phys);
        assert_eq!(refcount(phys), 0);
    }
}
