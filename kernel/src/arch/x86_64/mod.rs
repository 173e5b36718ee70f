//! x86_64 architecture support.
//!
//! Provides hardware initialization (GDT, IDT, PIC), interrupt control,
//! serial I/O (COM1 at 0x3F8), VGA text output, and I/O port primitives
//! for the x86_64 platform.

#![allow(clippy::missing_safety_doc)]

use pic8259::ChainedPics;
use spin::Mutex;

pub mod context;
pub mod gdt;
pub mod idt;
pub mod mmu;
pub mod serial;
pub mod timer;
pub mod vga;

/// The PIC remaps IRQ0-7 to interrupt vectors 32-39 and IRQ8-15 to 40-47,
/// clear of the CPU's reserved exception vectors 0-31.
const PIC_1_OFFSET: u8 = 32;
const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

static PICS: Mutex<ChainedPics> =
    // SAFETY: offsets 32/40 place both PICs' vectors outside the CPU
    // exception range; hardware isn't touched until `initialize()` runs.
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

/// `spec.md` §4.I steps 1-3: disable interrupts, install the GDT/IDT/TSS,
/// remap and mask the PIC down to just the timer line, enable paging
/// features. Interrupts stay disabled on return; the caller enables them
/// (`sti`) only once the scheduler has a thread to resume into.
pub fn init() {
    // SAFETY: disables interrupts so the IDT/PIC programming below can't
    // be interleaved with a stale handler firing.
    unsafe {
        core::arch::asm!("cli", options(nomem, nostack));
    }

    gdt::init();
    idt::init();

    // SAFETY: the PIC initialization sequence (ICW1-ICW4) is well-defined
    // by the 8259 spec; `PICS` is only touched here and from the timer IDT
    // handler's EOI, both with interrupts disabled or inside the handler.
    unsafe {
        PICS.lock().initialize();
        // Mask every line except IRQ0 (the timer); the core has no other
        // interrupt sources (`spec.md` Non-goals: no driver model).
        PICS.lock().write_masks(0xFE, 0xFF);
    }

    mmu::init();
    timer::setup_timer(10);

    log::info!("[ARCH] GDT/IDT/PIC/paging initialized");
}

/// Send end-of-interrupt for `irq` (a remapped vector, 32-47) to the PIC.
///
/// # Safety
/// Must only be called from within that IRQ's own interrupt handler.
pub unsafe fn notify_end_of_interrupt(irq: u8) {
    // SAFETY: forwarded from the caller's contract.
    unsafe {
        PICS.lock().notify_end_of_interrupt(irq);
    }
}

/// Halt the CPU. Used by panic/shutdown paths.
pub fn halt() -> ! {
    x86_64::instructions::interrupts::disable();
    loop {
        x86_64::instructions::hlt();
    }
}

/// Enable hardware interrupts. Called once the scheduler has an idle
/// thread installed (`spec.md` §4.I step 8 then `sti`, step 10).
pub fn enable_interrupts() {
    x86_64::instructions::interrupts::enable();
}

/// RAII guard restoring the prior interrupt-enabled state on drop.
pub fn disable_interrupts() -> impl Drop {
    struct InterruptGuard {
        was_enabled: bool,
    }

    impl Drop for InterruptGuard {
        fn drop(&mut self) {
            if self.was_enabled {
                x86_64::instructions::interrupts::enable();
            }
        }
    }

    let was_enabled = x86_64::instructions::interrupts::are_enabled();
    x86_64::instructions::interrupts::disable();
    InterruptGuard { was_enabled }
}

pub fn idle() {
    x86_64::instructions::hlt();
}

/// Speculation barrier to mitigate Spectre-style attacks.
#[inline(always)]
pub fn speculation_barrier() {
    // SAFETY: lfence is a serializing instruction that prevents speculative
    // execution of subsequent instructions until all prior instructions
    // complete. No side effects beyond pipeline serialization.
    unsafe {
        core::arch::asm!("lfence", options(nostack, nomem, preserves_flags));
    }
}

/// Basic I/O port functions -- used by the console and PIC/PIT setup.
#[allow(dead_code)]
pub unsafe fn outb(port: u16, value: u8) {
    // SAFETY: forwarded from the caller's contract.
    unsafe { x86_64::instructions::port::Port::new(port).write(value) };
}

#[allow(dead_code)]
pub unsafe fn inb(port: u16) -> u8 {
    // SAFETY: forwarded from the caller's contract.
    unsafe { x86_64::instructions::port::Port::new(port).read() }
}
