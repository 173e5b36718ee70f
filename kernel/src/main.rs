//! Bare-metal entry point. The bootloader (`bootloader_api` 0.11, configured
//! below to map all physical memory) calls [`kernel_main`] with a validated
//! `BootInfo` record; `spec.md` §6's `kernel_entry(bootinfo_ptr)` handoff.

#![no_std]
#![no_main]
#![feature(abi_x86_interrupt)]

use bootloader_api::{config::Mapping, entry_point, BootInfo, BootloaderConfig};
use core::panic::PanicInfo;

use nitros_kernel::{arch, boot, bootstrap, mm::frame_allocator, mm::MemoryRegion, serial_println};

static BOOTLOADER_CONFIG: BootloaderConfig = {
    let mut config = BootloaderConfig::new_default();
    config.mappings.physical_memory = Some(Mapping::Dynamic);
    config
};

entry_point!(kernel_main, config = &BOOTLOADER_CONFIG);

const EMPTY_REGION: MemoryRegion = MemoryRegion {
    start: 0,
    size: 0,
    usable: false,
};

fn kernel_main(info: &'static mut BootInfo) -> ! {
    frame_allocator::set_phys_mem_offset(boot::physical_memory_offset(info));

    let mut regions = [EMPTY_REGION; boot::MAX_REGIONS];
    let count = boot::normalize_regions(info, &mut regions);

    bootstrap::init(&regions[..count]);
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    serial_println!("[KERNEL PANIC] {}", info);
    arch::halt();
}
