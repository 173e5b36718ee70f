//! Page fault dispatch: demand-zero mapping and copy-on-write resolution.
//!
//! Grounded on the original kernel's `paging_handle_fault` in `cow.c`: align
//! the faulting address down to its page; if nothing is mapped there yet,
//! demand-allocate a zeroed frame; if something is mapped and the fault was
//! a write to a COW-marked page, either copy-and-remap (refcount > 1) or
//! simply restore the writable bit (refcount == 1, this was the last
//! reference all along); anything else is a fatal fault.

#![allow(dead_code)]

use super::{cow, frame_allocator, page_table, uaccess, PageFlags, VirtualAddress, FRAME_SIZE};

/// Why a page fault occurred, decoded from the architecture's trap frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFaultReason {
    NotPresent,
    ProtectionViolation,
    WriteToReadOnly,
    ExecuteNoExecute,
    UserModeKernelAccess,
}

/// Everything the dispatcher needs, collected by the architecture trap
/// handler before calling [`handle_page_fault`].
#[derive(Debug, Clone, Copy)]
pub struct PageFaultInfo {
    pub faulting_address: u64,
    pub reason: PageFaultReason,
    pub was_write: bool,
    pub was_user_mode: bool,
    pub instruction_pointer: u64,
}

/// Outcome of dispatching a page fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFaultOutcome {
    /// Resolved by demand-zero mapping a fresh frame.
    DemandPaged,
    /// Resolved by duplicating a shared COW frame.
    CowCopied,
    /// Resolved by dropping the COW flag (this was the sole reference).
    CowPromoted,
    /// Could not be resolved; the faulting task should be terminated.
    Fatal,
}

/// Dispatch a page fault per the four-step COW/demand-paging algorithm.
///
/// 1. Align the faulting address down to its containing page.
/// 2. If nothing is mapped there, demand-zero: allocate a frame, map it
///    present+writable+user, zero it, and record one reference.
/// 3. If something is mapped, the fault was a write, and the page is
///    COW-marked: either copy the frame (refcount > 1) or just drop the COW
///    flag (refcount == 1).
/// 4. Otherwise the fault is unresolvable; the caller should terminate the
///    faulting task (or panic, for a kernel-mode fault).
pub fn handle_page_fault(info: PageFaultInfo) -> PageFaultOutcome {
    let page = info.faulting_address & !(FRAME_SIZE as u64 - 1);
    let _guard = cow::lock();

    match page_table::translate(VirtualAddress::new(page)) {
        None => match demand_zero(page, info.was_user_mode) {
            Some(()) => PageFaultOutcome::DemandPaged,
            None => PageFaultOutcome::Fatal,
        },
        Some(phys) if info.was_write && cow::is_marked(page) => {
            if cow::refcount(phys.as_u64()) > 1 {
                match cow_copy(page, phys.as_u64()) {
                    Some(()) => PageFaultOutcome::CowCopied,
                    None => PageFaultOutcome::Fatal,
                }
            } else {
                cow::unmark(page);
                PageFaultOutcome::CowPromoted
            }
        }
        _ => PageFaultOutcome::Fatal,
    }
}

fn demand_zero(page: u64, user_mode: bool) -> Option<()> {
    let node = frame_allocator::node_for_frame(super::FrameNumber::new(0)).unwrap_or(0);
    let frame = frame_allocator::alloc(0, node, false)?;

    let mut flags = PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::NO_EXECUTE;
    if user_mode {
        flags |= PageFlags::USER;
    }
    let pml4 = page_table::active_pml4()?;
    page_table::map(pml4, VirtualAddress::new(page), frame, flags).ok()?;

    // SAFETY: the page was just mapped present+writable above.
    unsafe {
        core::ptr::write_bytes(page as *mut u8, 0, FRAME_SIZE);
    }
    cow::inc_ref(frame.addr().as_u64());
    Some(())
}

fn cow_copy(page: u64, old_phys: u64) -> Option<()> {
    let node = frame_allocator::node_for_frame(super::FrameNumber::new(old_phys / FRAME_SIZE as u64))
        .unwrap_or(0);
    let new_frame = frame_allocator::alloc(0, node, false)?;

    // SAFETY: `old_phys` is a live, present, readable frame (confirmed by
    // the caller's successful `translate`); `new_frame` was just allocated
    // and is not yet mapped anywhere, so writing to it is exclusive.
    unsafe {
        core::ptr::copy_nonoverlapping(
            old_phys as *const u8,
            new_frame.addr().as_u64() as *mut u8,
            FRAME_SIZE,
        );
    }

    cow::dec_ref(old_phys);
    cow::inc_ref(new_frame.addr().as_u64());

    let pml4 = page_table::active_pml4()?;
    let _ = page_table::unmap(pml4, VirtualAddress::new(page));
    page_table::map(
        pml4,
        VirtualAddress::new(page),
        new_frame,
        PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER | PageFlags::NO_EXECUTE,
    )
    .ok()?;
    cow::unmark(page);
    Some(())
}

/// Build a [`PageFaultInfo`] from an x86_64 page-fault error code and CR2.
///
/// Error code bits (Intel SDM): bit 0 present, bit 1 write, bit 2 user,
/// bit 4 instruction fetch.
#[cfg(target_arch = "x86_64")]
pub fn from_x86_64(error_code: u64, cr2: u64, rip: u64) -> PageFaultInfo {
    let not_present = (error_code & 1) == 0;
    let was_write = (error_code & 2) != 0;
    let was_user = (error_code & 4) != 0;
    let was_fetch = (error_code & 16) != 0;

    let reason = if not_present {
        PageFaultReason::NotPresent
    } else if was_fetch {
        PageFaultReason::ExecuteNoExecute
    } else if was_write {
        PageFaultReason::WriteToReadOnly
    } else if was_user {
        PageFaultReason::UserModeKernelAccess
    } else {
        PageFaultReason::ProtectionViolation
    };

    PageFaultInfo {
        faulting_address: cr2,
        reason,
        was_write,
        was_user_mode: was_user,
        instruction_pointer: rip,
    }
}

/// Print a symbolized fault summary and the handler's verdict, for the
/// fatal path that terminates (or panics, in kernel mode) the caller.
pub fn report_fatal(info: &PageFaultInfo) {
    log::error!(
        "[PF] fatal fault at {:#x} rip={:#x} write={} user={} reason={:?}",
        info.faulting_address,
        info.instruction_pointer,
        info.was_write,
        info.was_user_mode,
        info.reason,
    );
    let _ = uaccess::is_user_addr(info.faulting_address);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_equality() {
        assert_eq!(PageFaultReason::NotPresent, PageFaultReason::NotPresent);
        assert_ne!(PageFaultReason::NotPresent, PageFaultReason::WriteToReadOnly);
    }

    #[test]
    fn x86_64_decodes_write_user_fault() {
        let info = from_x86_64(0b0111, 0x4000, 0x1000);
        assert!(info.was_write);
        assert!(info.was_user_mode);
        assert_eq!(info.reason, PageFaultReason::WriteToReadOnly);
    }

    #[test]
    fn x86_64_decodes_not_present() {
        let info = from_x86_64(0b0000, 0x5000, 0x1000);
        assert_eq!(info.reason, PageFaultReason::NotPresent);
    }

    #[test]
    fn x86_64_decodes_instruction_fetch() {
        let info = from_x86_64(0b10001, 0x6000, 0x1000);
        assert_eq!(info.reason, PageFaultReason::ExecuteNoExecute);
    }
}
