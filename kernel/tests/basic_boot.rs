//! Smoke test: the kernel links, the serial console works, and arithmetic
//! isn't lying to us. `harness = false`: this binary decides pass/fail
//! itself via the QEMU `isa-debug-exit` device.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use nitros_kernel::{exit_qemu, serial_println, test_panic_handler, QemuExitCode};

#[unsafe(no_mangle)]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting basic boot tests...");

    test_println();
    test_simple_assertion();
    test_kernel_alive();

    serial_println!("All tests passed!");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn test_println() {
    serial_println!("test_println output");
}

fn test_simple_assertion() {
    let x = 2 + 2;
    assert_eq!(x, 4);
}

fn test_kernel_alive() {
    serial_println!("Kernel is alive and running tests!");
}
