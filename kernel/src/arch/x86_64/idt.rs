//! Interrupt Descriptor Table: CPU exceptions, the IRQ0 timer tick, and the
//! `int 0x80` syscall gate (`spec.md` §6).

use lazy_static::lazy_static;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};
use x86_64::PrivilegeLevel;

/// PIT is reprogrammed to this rate by [`crate::arch::x86_64::timer::setup_timer`];
/// each IRQ0 tick advances the uptime counter and the scheduler by this many ms.
const TIMER_INTERVAL_MS: u64 = 10;

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();
        idt.breakpoint.set_handler_fn(breakpoint_handler);
        idt.page_fault.set_handler_fn(page_fault_handler);
        idt.general_protection_fault.set_handler_fn(general_protection_fault_handler);
        unsafe {
            idt.double_fault
                .set_handler_fn(double_fault_handler)
                .set_stack_index(crate::arch::x86_64::gdt::DOUBLE_FAULT_IST_INDEX);
        }
        // IRQ0 = interrupt 32, remapped by the PIC init in `arch::x86_64::init`.
        idt[32].set_handler_fn(timer_interrupt_handler);
        // `spec.md` §6: syscalls enter through `int 0x80`. Ring 3 must be
        // allowed to trigger this vector directly.
        unsafe {
            idt[0x80]
                .set_handler_addr(x86_64::VirtAddr::new(syscall_entry as usize as u64))
                .set_privilege_level(PrivilegeLevel::Ring3);
        }
        idt
    };
}

pub fn init() {
    IDT.load();
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    log::warn!("breakpoint\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    _error_code: u64,
) -> ! {
    panic!("double fault\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    use crate::mm::page_fault::{from_x86_64, handle_page_fault, report_fatal, PageFaultOutcome};

    let cr2 = crate::arch::x86_64::mmu::read_cr2().as_u64();
    let rip = stack_frame.instruction_pointer.as_u64();
    let info = from_x86_64(error_code.bits(), cr2, rip);

    match handle_page_fault(info) {
        PageFaultOutcome::DemandPaged | PageFaultOutcome::CowCopied | PageFaultOutcome::CowPromoted => {}
        PageFaultOutcome::Fatal => {
            report_fatal(&info);
            panic!("fatal page fault\n{:#?}", stack_frame);
        }
    }
}

extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    panic!("general protection fault, error code 0x{error_code:x}\n{stack_frame:#?}");
}

extern "x86-interrupt" fn timer_interrupt_handler(_stack_frame: InterruptStackFrame) {
    crate::timer::timer_tick(TIMER_INTERVAL_MS);

    // SAFETY: called from IRQ0's own handler, as the contract requires.
    unsafe {
        crate::arch::x86_64::notify_end_of_interrupt(32);
    }

    crate::sched::scheduler::schedule_from_isr();
}

/// Raw `int 0x80` entry point. The CPU's `int` instruction leaves general
/// purpose registers untouched, so this reads `spec.md` §6's calling
/// convention (RAX = syscall number, RDI/RSI/RDX = args 1-3) directly and
/// reshuffles them into the SysV argument registers `syscall::dispatch`
/// expects before `iretq`-ing back to Ring 3 with the result in RAX.
#[unsafe(naked)]
unsafe extern "C" fn syscall_entry() {
    core::arch::naked_asm!(
        "mov r10, rdx",
        "mov rdx, rsi",
        "mov rsi, rdi",
        "mov rdi, rax",
        "mov rcx, r10",
        "call {dispatch}",
        "iretq",
        dispatch = sym crate::syscall::dispatch,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_interval_matches_pit_setup() {
        assert_eq!(TIMER_INTERVAL_MS, 10);
    }
}
