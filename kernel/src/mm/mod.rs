//! Physical and virtual memory management.
//!
//! Five things live here, in dependency order: the NUMA-aware buddy frame
//! allocator ([`frame_allocator`], [`numa`]), the 4-level paging code
//! ([`page_table`], [`address_space`]), copy-on-write bookkeeping and the
//! page-fault dispatcher ([`cow`], [`page_fault`]), the kernel heap
//! ([`heap`]), and the user-space access helpers ([`uaccess`]).

#![allow(dead_code)]

pub mod address_space;
pub mod cow;
pub mod frame_allocator;
pub mod heap;
pub mod numa;
pub mod page_fault;
pub mod page_table;
pub mod uaccess;

pub use frame_allocator::{FrameAllocatorError, FrameNumber};
pub use numa::{NumaNode, MAX_NUMA_NODES};

/// Page size in bytes (4 KiB small pages).
pub const FRAME_SIZE: usize = 4096;
/// Size of a 2 MiB huge page.
pub const LARGE_FRAME_SIZE: usize = 2 * 1024 * 1024;
/// Highest buddy order supported (2^21 frames == 8 GiB in one block).
pub const MAX_ORDER: usize = 21;

/// A physical address. Not necessarily mapped anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysicalAddress(pub u64);

impl PhysicalAddress {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn is_aligned(self, align: u64) -> bool {
        self.0 & (align - 1) == 0
    }
}

/// A virtual address. Canonicality is checked separately (see [`uaccess`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtualAddress(pub u64);

impl VirtualAddress {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn add(self, offset: usize) -> Self {
        Self(self.0 + offset as u64)
    }

    pub const fn align_down(self, align: u64) -> Self {
        Self(self.0 & !(align - 1))
    }

    pub const fn page_offset(self) -> u64 {
        self.0 & 0xFFF
    }
}

/// Page size used for a single mapping operation.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    /// 4 KiB pages.
    Small = 4096,
    /// 2 MiB pages.
    Large = 2 * 1024 * 1024,
    /// 1 GiB pages.
    Huge = 1024 * 1024 * 1024,
}

bitflags::bitflags! {
    /// Page-table entry flags. Bit layout matches the x86-64 PTE format for
    /// the bits it defines; `COW` reuses a software-available bit (9).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u64 {
        const PRESENT       = 1 << 0;
        const WRITABLE      = 1 << 1;
        const USER          = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const NO_CACHE      = 1 << 4;
        const ACCESSED      = 1 << 5;
        const DIRTY         = 1 << 6;
        const HUGE          = 1 << 7;
        const GLOBAL        = 1 << 8;
        /// Software-only bit: page is copy-on-write (read-only until fault).
        const COW           = 1 << 9;
        const NO_EXECUTE    = 1 << 63;
    }
}

impl PageFlags {
    /// Flags for a freshly demand-zeroed, privately writable user page.
    pub const USER_RW: Self = Self::PRESENT
        .union(Self::WRITABLE)
        .union(Self::USER)
        .union(Self::NO_EXECUTE);
}

/// A firmware-reported physical memory range, normalized by [`crate::boot`].
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    pub start: u64,
    pub size: u64,
    pub usable: bool,
}

/// Stage B+C+D+E+F of `bootstrap::init`: NUMA, buddy, paging, COW, heap.
///
/// Called once, after [`crate::boot`] has validated the firmware record and
/// before interrupts or the scheduler are enabled.
pub fn init(regions: &[MemoryRegion], cmdline: &str) {
    numa::init(regions);
    frame_allocator::init();
    page_table::init();
    cow::init(frame_allocator::total_frames());
    heap::init(cmdline);
}
