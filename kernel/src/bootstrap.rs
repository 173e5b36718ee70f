//! Init orchestration (`spec.md` §4.I): the exact ten-step sequence from
//! kernel entry to the scheduler's first `schedule()` call, staging the
//! other eight CORE subsystems in their dependency order.

use crate::mm::MemoryRegion;
use crate::{arch, cmdline, ipc, mm, sched};

/// Run the boot sequence and fall into the scheduler. Never returns.
///
/// 1. Console is already reachable through [`crate::print`]'s lazily
///    initialized serial port, so the first line logged below is this
///    stage's "serial/console ready" marker.
/// 2-3. `arch::init()` installs the GDT/TSS, the IDT (including the timer,
///    page-fault, and `int 0x80` vectors), and remaps/masks the PIC.
/// 4-6. `mm::init()` runs NUMA discovery, buddy init, `heap=` parsing, the
///    kernel heap, kernel PML4 construction and CPU paging-feature
///    enablement, and COW bookkeeping, in that order.
/// 7. The PIT is reprogrammed to 100 Hz inside `arch::init()` (grouped with
///    GDT/IDT/PIC setup in this crate's `arch::x86_64` module).
/// 8. `sched::threads_early_init()` installs the boot stack as thread 0.
/// 9. `ipc::init()` then `sched::threads_init()` create the built-in named
///    queues and the threads that service them.
/// 10. `sti`, then fall into the scheduler.
pub fn init(regions: &[MemoryRegion]) -> ! {
    log::info!("[BOOTSTRAP] NitrOS/N2 kernel starting");

    arch::init();

    let cmdline = cmdline::raw();
    log::info!("[BOOTSTRAP] cmdline: \"{cmdline}\"");
    mm::init(regions, cmdline);

    sched::threads_early_init();
    ipc::init();
    sched::threads_init();

    log::info!("[BOOTSTRAP] boot complete, entering scheduler");
    arch::enable_interrupts();

    loop {
        arch::idle();
        sched::thread_yield();
    }
}
