//! The `legacy` heap backend: buddy allocator plus an order prefix.
//!
//! Grounded directly on the original kernel's `legacy_kmalloc`/
//! `legacy_kfree`/`legacy_krealloc`: every allocation is rounded up to a
//! `2^order` frame count and the order is stashed in a 4-byte prefix so
//! `free`/`realloc` never need the caller to remember the original size.

use core::mem::size_of;

use crate::mm::{frame_allocator, FrameNumber, FRAME_SIZE, MAX_ORDER};

const PREFIX: usize = size_of::<u32>();

fn order_for(total: usize) -> u32 {
    let mut size = FRAME_SIZE;
    let mut order = 0u32;
    while size < total {
        size <<= 1;
        order += 1;
    }
    order
}

/// Allocate at least `size` bytes, rounded up to a power-of-two number of
/// frames. Returns null on exhaustion.
pub fn alloc(size: usize, node: usize) -> *mut u8 {
    let total = size + PREFIX;
    let order = order_for(total);
    if order as usize > MAX_ORDER {
        return core::ptr::null_mut();
    }
    let Some(frame) = frame_allocator::alloc(order as usize, node, false) else {
        return core::ptr::null_mut();
    };
    let block = frame.addr().as_u64() as *mut u8;
    // SAFETY: `block` is a freshly allocated, exclusively owned frame of at
    // least `PREFIX` bytes.
    unsafe {
        (block as *mut u32).write(order);
        block.add(PREFIX)
    }
}

/// Free a pointer previously returned by [`alloc`].
///
/// # Safety
///
/// `ptr` must be a pointer this module handed out and not already freed.
pub unsafe fn free(ptr: *mut u8, node: usize) {
    if ptr.is_null() {
        return;
    }
    // SAFETY: `ptr` was returned by `alloc`, which always writes the order
    // prefix immediately before it.
    unsafe {
        let block = ptr.sub(PREFIX);
        let order = (block as *const u32).read();
        let frame = FrameNumber::new(block as u64 / FRAME_SIZE as u64);
        frame_allocator::free(frame, order as usize, node);
    }
}

/// Usable size of the block at `ptr`, excluding the order prefix.
///
/// # Safety
///
/// `ptr` must be a live pointer returned by [`alloc`].
pub(crate) unsafe fn alloc_size(ptr: *const u8) -> usize {
    // SAFETY: see `free`.
    unsafe {
        let block = ptr.sub(PREFIX);
        let order = (block as *const u32).read();
        (1usize << (order as usize)) * FRAME_SIZE - PREFIX
    }
}

/// Grow or shrink a block, copying contents into a freshly allocated block
/// when the new size doesn't fit in place.
///
/// # Safety
///
/// `ptr` must be null or a live pointer returned by [`alloc`].
pub unsafe fn realloc(ptr: *mut u8, new_size: usize, node: usize) -> *mut u8 {
    if ptr.is_null() {
        return alloc(new_size, node);
    }
    // SAFETY: caller guarantees `ptr` is live.
    let old_size = unsafe { alloc_size(ptr) };
    if new_size <= old_size {
        return ptr;
    }
    let new_ptr = alloc(new_size, node);
    if new_ptr.is_null() {
        return core::ptr::null_mut();
    }
    // SAFETY: both pointers are valid for `old_size` (the smaller of the
    // two live ranges) bytes.
    unsafe {
        core::ptr::copy_nonoverlapping(ptr, new_ptr, old_size.min(new_size));
        free(ptr, node);
    }
    new_ptr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_rounds_up_to_frame_multiple() {
        assert_eq!(order_for(1), 0);
        assert_eq!(order_for(FRAME_SIZE), 0);
        assert_eq!(order_for(FRAME_SIZE + 1), 1);
    }
}
