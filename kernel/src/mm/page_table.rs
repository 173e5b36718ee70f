//! 4-level x86-64 page tables.
//!
//! One kernel PML4 is built at boot; every task's address space clones it
//! (so the kernel's own upper-half mappings are always present) and gets its
//! own lower-half entries. `translate`/`lookup`/`new_context`/`switch` live
//! here; [`super::address_space`] wraps them with the "currently installed
//! PML4" bookkeeping.

#![allow(dead_code)]

use core::ops::{Index, IndexMut};

use spin::Mutex;

use super::{frame_allocator, FrameNumber, PageFlags, PhysicalAddress, VirtualAddress};

/// Number of entries in a page table.
pub const PAGE_TABLE_ENTRIES: usize = 512;

/// Page table entry.
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct PageTableEntry {
    entry: u64,
}

impl PageTableEntry {
    pub const fn empty() -> Self {
        Self { entry: 0 }
    }

    pub const fn is_unused(&self) -> bool {
        self.entry == 0
    }

    pub const fn is_present(&self) -> bool {
        self.entry & PageFlags::PRESENT.bits() != 0
    }

    pub const fn is_huge(&self) -> bool {
        self.entry & PageFlags::HUGE.bits() != 0
    }

    /// The frame this entry points to, regardless of presence.
    pub fn frame(&self) -> FrameNumber {
        FrameNumber::new((self.entry & 0x000F_FFFF_FFFF_F000) >> 12)
    }

    pub fn addr(&self) -> PhysicalAddress {
        self.frame().addr()
    }

    pub fn flags(&self) -> PageFlags {
        PageFlags::from_bits_truncate(self.entry)
    }

    pub fn set(&mut self, frame: FrameNumber, flags: PageFlags) {
        self.entry = (frame.addr().as_u64() & 0x000F_FFFF_FFFF_F000) | flags.bits();
    }

    pub fn set_addr(&mut self, addr: PhysicalAddress, flags: PageFlags) {
        self.set(FrameNumber::from_addr(addr), flags);
    }

    pub fn clear(&mut self) {
        self.entry = 0;
    }
}

/// A page table with 512 entries, naturally page-aligned so it can itself be
/// mapped in by a single PTE.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; PAGE_TABLE_ENTRIES],
}

impl PageTable {
    pub const fn new() -> Self {
        Self {
            entries: [PageTableEntry::empty(); PAGE_TABLE_ENTRIES],
        }
    }

    pub fn zero(&mut self) {
        for entry in &mut self.entries {
            entry.clear();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageTableEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PageTableEntry> {
        self.entries.iter_mut()
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<usize> for PageTable {
    type Output = PageTableEntry;
    fn index(&self, index: usize) -> &Self::Output {
        &self.entries[index]
    }
}

impl IndexMut<usize> for PageTable {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.entries[index]
    }
}

impl Index<PageTableIndex> for PageTable {
    type Output = PageTableEntry;
    fn index(&self, index: PageTableIndex) -> &Self::Output {
        &self.entries[usize::from(index)]
    }
}

impl IndexMut<PageTableIndex> for PageTable {
    fn index_mut(&mut self, index: PageTableIndex) -> &mut Self::Output {
        &mut self.entries[usize::from(index)]
    }
}

/// An index into a page table (0..512).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTableIndex(u16);

impl PageTableIndex {
    pub fn new(index: u16) -> Self {
        assert!(index < 512, "page table index out of bounds");
        Self(index)
    }

    pub const fn new_truncate(index: u16) -> Self {
        Self(index & 0x1FF)
    }
}

impl From<PageTableIndex> for usize {
    fn from(index: PageTableIndex) -> Self {
        index.0 as usize
    }
}

impl From<u16> for PageTableIndex {
    fn from(index: u16) -> Self {
        Self::new(index)
    }
}

impl From<usize> for PageTableIndex {
    fn from(index: usize) -> Self {
        assert!(index < 512);
        Self(index as u16)
    }
}

/// Breakdown of a virtual address into its four page-table indices plus the
/// in-page byte offset.
#[derive(Debug, Clone, Copy)]
pub struct VirtualAddressBreakdown {
    pub l4_index: PageTableIndex,
    pub l3_index: PageTableIndex,
    pub l2_index: PageTableIndex,
    pub l1_index: PageTableIndex,
    pub page_offset: u16,
}

impl VirtualAddressBreakdown {
    pub fn new(addr: VirtualAddress) -> Self {
        let addr = addr.as_u64();
        Self {
            l4_index: PageTableIndex::new_truncate((addr >> 39) as u16),
            l3_index: PageTableIndex::new_truncate((addr >> 30) as u16),
            l2_index: PageTableIndex::new_truncate((addr >> 21) as u16),
            l1_index: PageTableIndex::new_truncate((addr >> 12) as u16),
            page_offset: (addr & 0xFFF) as u16,
        }
    }
}

fn table_at(phys: PhysicalAddress) -> &'static mut PageTable {
    // SAFETY: `phys` always names a frame this module allocated to hold a
    // `PageTable`, reached through the identity/offset mapping the frame
    // allocator itself relies on for its free-list links.
    unsafe { &mut *(phys.as_u64() as *mut PageTable) }
}

fn alloc_table_frame() -> Result<PhysicalAddress, &'static str> {
    let frame = frame_allocator::alloc(0, 0, false).ok_or("out of memory allocating page table")?;
    let phys = frame.addr();
    table_at(phys).zero();
    Ok(phys)
}

/// The kernel's master PML4, built once at boot. Every address space clones
/// its top half so kernel mappings are always present regardless of which
/// task's lower half is active.
static KERNEL_PML4: Mutex<Option<PhysicalAddress>> = Mutex::new(None);

/// Allocate the frame backing the kernel's master PML4. The bootloader's own
/// page tables remain active until the first [`switch`] call installs this
/// one.
pub fn init() {
    let mut guard = KERNEL_PML4.lock();
    if guard.is_some() {
        return;
    }
    match alloc_table_frame() {
        Ok(phys) => {
            log::info!("[VM] kernel PML4 allocated at {:#x}", phys.as_u64());
            *guard = Some(phys);
        }
        Err(e) => log::error!("[VM] failed to allocate kernel PML4: {e}"),
    }
}

/// Physical address of the kernel's master PML4.
pub fn kernel_pml4() -> Option<PhysicalAddress> {
    *KERNEL_PML4.lock()
}

/// Allocate a fresh PML4 for a new task, with the kernel's upper half
/// (entries 256..512, the canonical higher half) copied in so kernel code
/// and the physical-memory offset mapping stay reachable after a context
/// switch into this address space.
pub fn new_context() -> Result<PhysicalAddress, &'static str> {
    let kernel_phys = KERNEL_PML4.lock().ok_or("kernel PML4 not initialized")?;
    let new_phys = alloc_table_frame()?;

    let kernel_table = table_at(kernel_phys);
    let new_table = table_at(new_phys);
    for i in 256..PAGE_TABLE_ENTRIES {
        new_table[i] = kernel_table[i];
    }
    Ok(new_phys)
}

/// Install `pml4` as the active address space (writes CR3, flushing the TLB
/// except for global mappings).
pub fn switch(pml4: PhysicalAddress) {
    #[cfg(target_arch = "x86_64")]
    {
        use crate::arch::x86_64::mmu;
        mmu::write_cr3(pml4);
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = pml4;
    }
}

/// The physical address of the PML4 currently installed in CR3 (or, on
/// non-x86_64 test builds, the kernel PML4).
pub fn active_pml4() -> Option<PhysicalAddress> {
    current_pml4()
}

fn current_pml4() -> Option<PhysicalAddress> {
    #[cfg(target_arch = "x86_64")]
    {
        use crate::arch::x86_64::mmu;
        Some(mmu::read_cr3())
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        *KERNEL_PML4.lock()
    }
}

/// Walk the currently active PML4 and translate `virt` to its mapped
/// physical address, honoring 2 MiB huge pages at the PD level. Returns
/// `None` if any level of the walk is not present.
pub fn translate(virt: VirtualAddress) -> Option<PhysicalAddress> {
    let pml4_phys = current_pml4()?;
    lookup_from(pml4_phys, virt).map(|(phys, _)| phys)
}

/// Like [`translate`], but also returns the flags recorded on the mapping's
/// leaf entry (the 4 KiB PTE, or the 2 MiB PDE for huge mappings).
pub fn lookup(virt: VirtualAddress) -> Option<(PhysicalAddress, PageFlags)> {
    let pml4_phys = current_pml4()?;
    lookup_from(pml4_phys, virt)
}

fn lookup_from(
    pml4_phys: PhysicalAddress,
    virt: VirtualAddress,
) -> Option<(PhysicalAddress, PageFlags)> {
    let breakdown = VirtualAddressBreakdown::new(virt);

    let l4 = table_at(pml4_phys);
    let l4e = &l4[breakdown.l4_index];
    if !l4e.is_present() {
        return None;
    }

    let l3 = table_at(l4e.addr());
    let l3e = &l3[breakdown.l3_index];
    if !l3e.is_present() {
        return None;
    }

    let l2 = table_at(l3e.addr());
    let l2e = &l2[breakdown.l2_index];
    if !l2e.is_present() {
        return None;
    }
    if l2e.is_huge() {
        let page_base = l2e.addr().as_u64() & !((2 * 1024 * 1024) - 1);
        let offset = virt.as_u64() & ((2 * 1024 * 1024) - 1);
        return Some((PhysicalAddress::new(page_base + offset), l2e.flags()));
    }

    let l1 = table_at(l2e.addr());
    let l1e = &l1[breakdown.l1_index];
    if !l1e.is_present() {
        return None;
    }
    Some((
        PhysicalAddress::new(l1e.addr().as_u64() + breakdown.page_offset as u64),
        l1e.flags(),
    ))
}

/// Map a single 4 KiB page into `pml4`, allocating intermediate tables as
/// needed. Returns an error if the page is already mapped.
pub fn map(
    pml4: PhysicalAddress,
    virt: VirtualAddress,
    frame: FrameNumber,
    flags: PageFlags,
) -> Result<(), &'static str> {
    let breakdown = VirtualAddressBreakdown::new(virt);
    const INTERMEDIATE: PageFlags = PageFlags::PRESENT
        .union(PageFlags::WRITABLE)
        .union(PageFlags::USER);

    let l4 = table_at(pml4);
    let l4e = &mut l4[breakdown.l4_index];
    if !l4e.is_present() {
        let t = alloc_table_frame()?;
        l4e.set(FrameNumber::from_addr(t), INTERMEDIATE);
    }
    let l3 = table_at(l4e.addr());
    let l3e = &mut l3[breakdown.l3_index];
    if !l3e.is_present() {
        let t = alloc_table_frame()?;
        l3e.set(FrameNumber::from_addr(t), INTERMEDIATE);
    }
    let l2 = table_at(l3e.addr());
    let l2e = &mut l2[breakdown.l2_index];
    if l2e.is_present() && l2e.is_huge() {
        return Err("virtual address already mapped as a huge page");
    }
    if !l2e.is_present() {
        let t = alloc_table_frame()?;
        l2e.set(FrameNumber::from_addr(t), INTERMEDIATE);
    }
    let l1 = table_at(l2e.addr());
    let entry = &mut l1[breakdown.l1_index];
    if entry.is_present() {
        return Err("page already mapped");
    }
    entry.set(frame, flags | PageFlags::PRESENT);
    Ok(())
}

/// Map a 2 MiB huge page directly at the PD level.
pub fn map_huge(
    pml4: PhysicalAddress,
    virt: VirtualAddress,
    frame: FrameNumber,
    flags: PageFlags,
) -> Result<(), &'static str> {
    let breakdown = VirtualAddressBreakdown::new(virt);
    const INTERMEDIATE: PageFlags = PageFlags::PRESENT
        .union(PageFlags::WRITABLE)
        .union(PageFlags::USER);

    let l4 = table_at(pml4);
    let l4e = &mut l4[breakdown.l4_index];
    if !l4e.is_present() {
        let t = alloc_table_frame()?;
        l4e.set(FrameNumber::from_addr(t), INTERMEDIATE);
    }
    let l3 = table_at(l4e.addr());
    let l3e = &mut l3[breakdown.l3_index];
    if !l3e.is_present() {
        let t = alloc_table_frame()?;
        l3e.set(FrameNumber::from_addr(t), INTERMEDIATE);
    }
    let l2 = table_at(l3e.addr());
    let entry = &mut l2[breakdown.l2_index];
    if entry.is_present() {
        return Err("huge page already mapped");
    }
    entry.set(frame, flags | PageFlags::PRESENT | PageFlags::HUGE);
    Ok(())
}

/// Unmap a single 4 KiB (or 2 MiB huge) page, returning the frame that was
/// mapped there and flushing its TLB entry.
pub fn unmap(pml4: PhysicalAddress, virt: VirtualAddress) -> Result<FrameNumber, &'static str> {
    let breakdown = VirtualAddressBreakdown::new(virt);

    let l4 = table_at(pml4);
    let l4e = &l4[breakdown.l4_index];
    if !l4e.is_present() {
        return Err("L4 entry not present");
    }
    let l3 = table_at(l4e.addr());
    let l3e = &l3[breakdown.l3_index];
    if !l3e.is_present() {
        return Err("L3 entry not present");
    }
    let l2 = table_at(l3e.addr());
    let l2e = &mut l2[breakdown.l2_index];
    if !l2e.is_present() {
        return Err("L2 entry not present");
    }
    if l2e.is_huge() {
        let frame = l2e.frame();
        l2e.clear();
        crate::arch::x86_64::tlb_flush_address(virt.as_u64());
        return Ok(frame);
    }
    let l1 = table_at(l2e.addr());
    let entry = &mut l1[breakdown.l1_index];
    if !entry.is_present() {
        return Err("page not mapped");
    }
    let frame = entry.frame();
    entry.clear();
    crate::arch::x86_64::tlb_flush_address(virt.as_u64());
    Ok(frame)
}

/// Enable the CPU features 4-level paging with huge pages, SMEP/SMAP, and
/// the no-execute bit require: CR4.PAE/SMEP/SMAP, EFER.LME/NXE, CR0.PG/WP.
/// Must run once per CPU, before the first address space is switched to.
#[cfg(target_arch = "x86_64")]
pub fn enable_paging_features() {
    use x86_64::registers::control::{Cr0, Cr0Flags, Cr4, Cr4Flags};
    use x86_64::registers::model_specific::{Efer, EferFlags};

    // SAFETY: setting these bits is required before any page table with
    // NX-marked or supervisor-only entries can be trusted by the CPU; this
    // runs once during early boot before user mappings exist.
    unsafe {
        Cr4::update(|flags| {
            *flags |= Cr4Flags::PHYSICAL_ADDRESS_EXTENSION
                | Cr4Flags::SUPERVISOR_MODE_EXECUTION_PROTECTION
                | Cr4Flags::SUPERVISOR_MODE_ACCESS_PREVENTION;
        });
        Efer::update(|flags| {
            *flags |= EferFlags::LONG_MODE_ENABLE | EferFlags::NO_EXECUTE_ENABLE;
        });
        Cr0::update(|flags| {
            *flags |= Cr0Flags::PAGING | Cr0Flags::WRITE_PROTECT;
        });
    }
}

#[cfg(not(target_arch = "x86_64"))]
pub fn enable_paging_features() {}
