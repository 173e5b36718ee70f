//! The kernel heap: a `nitro` or `legacy` backend selected at boot from the
//! `heap=` kernel command-line argument, wired up as the `#[global_allocator]`.

pub mod legacy;
pub mod nitro;

use core::alloc::{GlobalAlloc, Layout};
use core::sync::atomic::{AtomicU8, Ordering};

const BACKEND_NITRO: u8 = 0;
const BACKEND_LEGACY: u8 = 1;

static BACKEND: AtomicU8 = AtomicU8::new(BACKEND_NITRO);

/// Parse `heap=nitro` / `heap=legacy` out of the kernel command line and
/// record which backend [`KernelAllocator`] should route through. Defaults
/// to `nitro` when the argument is absent or unrecognized.
pub fn init(cmdline: &str) {
    let backend = cmdline
        .split_whitespace()
        .find_map(|arg| arg.strip_prefix("heap="))
        .unwrap_or("nitro");

    let selected = match backend {
        "legacy" => BACKEND_LEGACY,
        _ => BACKEND_NITRO,
    };
    BACKEND.store(selected, Ordering::Relaxed);
    log::info!(
        "heap: backend={}",
        if selected == BACKEND_LEGACY { "legacy" } else { "nitro" }
    );
}

fn using_legacy() -> bool {
    BACKEND.load(Ordering::Relaxed) == BACKEND_LEGACY
}

/// Heap-wide usage counters, independent of which backend is active.
#[derive(Debug, Clone, Copy)]
pub struct HeapStats {
    pub bytes_inuse: u64,
    pub bytes_committed: u64,
    pub allocs: u64,
    pub frees: u64,
}

/// Snapshot current heap statistics (meaningful only for the `nitro`
/// backend; `legacy` reports zeros since it keeps no running counters).
pub fn stats() -> HeapStats {
    if using_legacy() {
        HeapStats {
            bytes_inuse: 0,
            bytes_committed: 0,
            allocs: 0,
            frees: 0,
        }
    } else {
        let s = nitro::stats();
        HeapStats {
            bytes_inuse: s.bytes_inuse,
            bytes_committed: s.bytes_committed,
            allocs: s.allocs,
            frees: s.frees,
        }
    }
}

/// Release cached-but-unused memory back to the frame allocator. A no-op on
/// the `legacy` backend, which never caches beyond the buddy allocator
/// itself.
pub fn trim() {
    if !using_legacy() {
        nitro::trim();
    }
}

/// Advance the `nitro` backend's reuse-epoch clock. Call once per timer
/// tick; a no-op under `legacy`.
pub fn tick() {
    if !using_legacy() {
        nitro::tick();
    }
}

/// `#[global_allocator]` entry point: dispatches to whichever backend
/// [`init`] selected.
pub struct KernelAllocator;

// SAFETY: both backends either return a block that satisfies the requested
// size/alignment or null; `dealloc`/`realloc` are only ever called by the
// allocator API with layouts that match a prior `alloc` call, which both
// backends require of their own `free`/`realloc` callers.
unsafe impl GlobalAlloc for KernelAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if using_legacy() {
            legacy::alloc(layout.size(), 0)
        } else {
            nitro::alloc(layout.size(), layout.align(), 0)
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if using_legacy() {
            // SAFETY: forwarded from the allocator API's own safety contract.
            unsafe { legacy::free(ptr, 0) };
        } else {
            // SAFETY: forwarded from the allocator API's own safety contract.
            unsafe { nitro::free(ptr, layout.size(), layout.align(), 0) };
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if using_legacy() {
            // SAFETY: forwarded from the allocator API's own safety contract.
            unsafe { legacy::realloc(ptr, new_size, 0) }
        } else {
            // SAFETY: forwarded from the allocator API's own safety contract.
            unsafe { nitro::realloc(ptr, layout.size(), new_size, layout.align(), 0) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legacy_from_cmdline() {
        init("foo=bar heap=legacy baz");
        assert!(using_legacy());
    }

    #[test]
    fn defaults_to_nitro() {
        init("foo=bar");
        assert!(!using_legacy());
    }
}
