//! Refcounted shared-memory regions.
//!
//! Grounded on the original kernel's `shm_create`/`shm_destroy`: a region is
//! nothing more than a run of buddy-allocated pages plus the two rights
//! bitmasks from `spec.md` §3 (`rights_send`/`rights_recv`). Per-page
//! refcounting reuses the same frame-metadata table the COW subsystem
//! shares (`mm::cow`), since both are "how many live mappings point at this
//! frame" bookkeeping.

#![allow(dead_code)]

use core::sync::atomic::{AtomicU64, Ordering};

use crate::mm::{cow, frame_allocator, FrameNumber, FRAME_SIZE};

use super::error::{IpcError, Result};

/// Upper bound on pages a single region may span.
pub const MAX_REGION_PAGES: usize = 256;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Rights: u32 {
        const SEND = 0b01;
        const RECV = 0b10;
    }
}

static NEXT_REGION_ID: AtomicU64 = AtomicU64::new(1);

/// `{base, size, pages, rights_send, rights_recv}` per `spec.md` §3.
#[derive(Debug, Clone, Copy)]
pub struct Region {
    pub id: u64,
    pub base: u64,
    pub size: usize,
    pub page_count: usize,
    pub rights_send: Rights,
    pub rights_recv: Rights,
}

/// Order of the single buddy block backing a `page_count`-page region.
fn order_for_pages(page_count: usize) -> usize {
    page_count.next_power_of_two().trailing_zeros() as usize
}

/// Round `size` up to a page multiple, allocate one contiguous buddy block
/// covering it, zero it, `inc_ref` each page, and record the rights masks.
pub fn create(size: usize, send_mask: u32, recv_mask: u32) -> Result<Region> {
    if size == 0 {
        return Err(IpcError::PayloadTooLarge);
    }
    let page_count = size.div_ceil(FRAME_SIZE);
    if page_count > MAX_REGION_PAGES {
        return Err(IpcError::PayloadTooLarge);
    }

    let node = 0;
    let order = order_for_pages(page_count);
    let frame = frame_allocator::alloc(order, node, false).ok_or(IpcError::Unavailable)?;
    let base = frame.addr().as_u64();

    // SAFETY: `frame` is a freshly allocated `2^order`-frame block, not
    // mapped or referenced anywhere else yet.
    unsafe {
        core::ptr::write_bytes(base as *mut u8, 0, (1usize << order) * FRAME_SIZE);
    }
    for i in 0..page_count {
        cow::inc_ref(base + (i as u64) * FRAME_SIZE as u64);
    }

    let id = NEXT_REGION_ID.fetch_add(1, Ordering::Relaxed);
    Ok(Region {
        id,
        base,
        size: page_count * FRAME_SIZE,
        page_count,
        rights_send: Rights::from_bits_truncate(send_mask),
        rights_recv: Rights::from_bits_truncate(recv_mask),
    })
}

/// Scrub the region's pages (defense in depth against stale data leaking to
/// the next owner), drop one reference per page, and free the backing block
/// back to the buddy once every page's refcount has reached zero.
pub fn destroy(region: &Region) {
    let mut all_zero = true;
    for i in 0..region.page_count {
        let phys = region.base + (i as u64) * FRAME_SIZE as u64;

        // SAFETY: the region owns these pages exclusively until destroy
        // drops the last reference below.
        unsafe {
            core::ptr::write_bytes(phys as *mut u8, 0, FRAME_SIZE);
        }
        cow::dec_ref(phys);
        if cow::refcount(phys) != 0 {
            all_zero = false;
        }
    }
    if all_zero {
        let order = order_for_pages(region.page_count);
        let frame = FrameNumber::new(region.base / FRAME_SIZE as u64);
        let node = frame_allocator::node_for_frame(frame).unwrap_or(0);
        frame_allocator::free(frame, order, node);
    }
}

/// Returns the kernel virtual address for the region. With identity-mapped
/// physical memory (the only layout the core currently installs) this is
/// the physical base; a future per-process mapping would instead translate
/// `rights_send`/`rights_recv` into page protections for the caller's
/// address space.
pub fn map(region: &Region) -> u64 {
    region.base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rights_masks_round_trip() {
        let r = Rights::SEND | Rights::RECV;
        assert!(r.contains(Rights::SEND));
        assert!(r.contains(Rights::RECV));
    }
}
