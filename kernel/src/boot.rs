//! `spec.md` §4.A: validates the bootloader's `BootInfo` record and exposes a
//! read-only, bootloader-independent view of memory to [`crate::mm::init`].
//!
//! `bootloader_api` 0.11 already validates its own magic/version during the
//! handoff (a malformed record never reaches `kernel_main`), so this stage's
//! job is narrower: normalize the bootloader's memory map into the core's
//! own [`MemoryRegion`] slice and surface the physical-memory offset the
//! frame allocator needs to dereference physical addresses directly.

use bootloader_api::info::{BootInfo, MemoryRegionKind};

use crate::mm::MemoryRegion;

/// No hardware this kernel targets reports more entries than this; extras
/// are logged and dropped rather than grown into, to keep the adapter
/// allocation-free.
pub const MAX_REGIONS: usize = 128;

/// Normalize `info.memory_regions` into `out`, returning the number of
/// entries filled in. Regions are classified `usable` only when the
/// bootloader reports [`MemoryRegionKind::Usable`] — bootloader-reclaimable
/// and ACPI regions stay marked unusable until a future stage someone
/// actually needs them for.
pub fn normalize_regions(info: &BootInfo, out: &mut [MemoryRegion; MAX_REGIONS]) -> usize {
    let mut n = 0;
    for region in info.memory_regions.iter() {
        if n >= MAX_REGIONS {
            log::warn!("[BOOT] memory map exceeds {MAX_REGIONS} entries, truncating");
            break;
        }
        out[n] = MemoryRegion {
            start: region.start,
            size: region.end.saturating_sub(region.start),
            usable: region.kind == MemoryRegionKind::Usable,
        };
        n += 1;
    }
    n
}

/// The offset at which the bootloader identity-mapped all physical memory,
/// required before the frame allocator can dereference a physical address.
/// Only absent if the kernel's [`bootloader_api::BootloaderConfig`] didn't
/// request the mapping, which would be a build-time bug, not a runtime one.
pub fn physical_memory_offset(info: &BootInfo) -> u64 {
    info.physical_memory_offset
        .into_option()
        .expect("bootloader did not map physical memory; check BootloaderConfig")
}
