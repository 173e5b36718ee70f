//! NitrOS/N2 kernel core: physical/virtual memory, the kernel heap,
//! threading and scheduling, and IPC & capabilities (`spec.md` §1-§2).
//!
//! Built `no_std` for the bare-metal target; compiled with `std` on the host
//! so `cargo test` can exercise every module's unit tests against the
//! system allocator without a VM.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(all(test, target_os = "none"), no_main)]
#![feature(abi_x86_interrupt)]
#![cfg_attr(target_os = "none", feature(alloc_error_handler))]
#![feature(custom_test_frameworks)]
#![cfg_attr(all(test, target_os = "none"), test_runner(crate::test_framework::test_runner))]
#![cfg_attr(all(test, target_os = "none"), reexport_test_harness_main = "test_main")]

extern crate alloc;

#[cfg(not(target_os = "none"))]
extern crate std;

// Host test target: delegate to the system allocator so `alloc::vec`,
// `Box`, etc. work in `#[test]` functions without a real kernel heap.
#[cfg(not(target_os = "none"))]
#[global_allocator]
static SYSTEM_ALLOCATOR: std::alloc::System = std::alloc::System;

// Bare-metal target: the kernel is its own global allocator, switchable
// between the `nitro` and `legacy` backends (`spec.md` §4.E, §6 `heap=`).
#[cfg(target_os = "none")]
#[global_allocator]
static ALLOCATOR: mm::heap::KernelAllocator = mm::heap::KernelAllocator;

#[macro_use]
pub mod print;

pub mod arch;
pub mod boot;
pub mod bootstrap;
pub mod cmdline;
pub mod error;
pub mod ipc;
pub mod mm;
pub mod sched;
pub mod sync;
mod syscall;
pub mod test_framework;
pub mod timer;

pub use mm::{FrameNumber, MemoryRegion, FRAME_SIZE};
pub use test_framework::{exit_qemu, test_panic_handler, QemuExitCode, Testable};

#[cfg(all(test, target_os = "none"))]
#[unsafe(no_mangle)]
pub extern "C" fn _start() -> ! {
    test_main();
    arch::halt();
}

#[cfg(all(test, target_os = "none"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    test_framework::test_panic_handler(info)
}

/// Allocation failure in a `no_std` kernel is unrecoverable; the
/// `alloc_error_handler` ABI requires `-> !`.
#[cfg(target_os = "none")]
#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    panic!("allocation error: {:?}", layout);
}
