//! Per-task address spaces.
//!
//! An `AddressSpace` owns one PML4 (allocated via
//! [`page_table::new_context`]) and serializes map/unmap operations against
//! it with a spinlock, mirroring the "currently installed page table
//! protected by a lock" model the original kernel's advanced paging module
//! uses for its per-process `paging_map_adv`/`paging_unmap_adv` calls.

#![allow(dead_code)]

use spin::Mutex;

use super::{frame_allocator, page_table, FrameNumber, PageFlags, PhysicalAddress, VirtualAddress};

/// A task's virtual address space: one PML4 plus the lock guarding it.
pub struct AddressSpace {
    pml4: Mutex<PhysicalAddress>,
}

impl AddressSpace {
    /// Allocate a fresh address space with the kernel's upper half already
    /// populated.
    pub fn new() -> Result<Self, &'static str> {
        let pml4 = page_table::new_context()?;
        Ok(Self {
            pml4: Mutex::new(pml4),
        })
    }

    /// Physical address of this address space's PML4.
    pub fn pml4(&self) -> PhysicalAddress {
        *self.pml4.lock()
    }

    /// Install this address space as the active one on the current CPU.
    pub fn activate(&self) {
        page_table::switch(*self.pml4.lock());
    }

    /// Map a single 4 KiB page, allocating a frame from `node` if the
    /// caller doesn't already have one.
    pub fn map(&self, virt: VirtualAddress, frame: FrameNumber, flags: PageFlags) -> Result<(), &'static str> {
        let pml4 = *self.pml4.lock();
        page_table::map(pml4, virt, frame, flags)
    }

    /// Map a 2 MiB huge page.
    pub fn map_huge(
        &self,
        virt: VirtualAddress,
        frame: FrameNumber,
        flags: PageFlags,
    ) -> Result<(), &'static str> {
        let pml4 = *self.pml4.lock();
        page_table::map_huge(pml4, virt, frame, flags)
    }

    /// Demand-allocate and map a fresh zeroed page at `virt`.
    pub fn map_anonymous(&self, virt: VirtualAddress, node: usize, flags: PageFlags) -> Result<FrameNumber, &'static str> {
        let frame = frame_allocator::alloc(0, node, false).ok_or("out of memory")?;
        if let Err(e) = self.map(virt, frame, flags) {
            frame_allocator::free(frame, 0, node);
            return Err(e);
        }
        Ok(frame)
    }

    /// Unmap a page, returning the frame that was mapped there.
    pub fn unmap(&self, virt: VirtualAddress) -> Result<FrameNumber, &'static str> {
        let pml4 = *self.pml4.lock();
        page_table::unmap(pml4, virt)
    }

    /// Translate `virt` through this address space's tables without making
    /// it the active one (only valid for the currently active space; kept
    /// for API symmetry with [`page_table::translate`]).
    pub fn translate(&self, virt: VirtualAddress) -> Option<PhysicalAddress> {
        page_table::translate(virt)
    }
}
