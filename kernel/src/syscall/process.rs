//! Thread lifecycle and legacy-debug syscalls: `yield`, `write_vga`, `fork`,
//! `exec` — `spec.md` §6 syscalls 0-3.

use super::{SyscallError, SyscallResult};
use crate::mm::{frame_allocator, page_table, uaccess, PageFlags, VirtualAddress, FRAME_SIZE};

/// `0 yield` — voluntary reschedule; always returns 0.
pub fn sys_yield() -> SyscallResult {
    crate::sched::thread_yield();
    Ok(0)
}

/// `1 write_vga(ptr)` — legacy debugging path: copies a null-terminated
/// string out of user memory (bounded, since the syscall ABI gives no
/// length) and writes it to the VGA/serial console.
pub fn sys_write_vga(ptr: u64) -> SyscallResult {
    const MAX_LEN: usize = 256;
    let mut buf = [0u8; MAX_LEN];
    let mut len = 0;
    while len < MAX_LEN {
        let mut byte = [0u8; 1];
        // SAFETY: `byte` is a one-element local buffer.
        let rc = unsafe { uaccess::copy_from_user(byte.as_mut_ptr(), ptr + len as u64, 1) };
        if rc != 0 {
            return Err(SyscallError::Fault);
        }
        if byte[0] == 0 {
            break;
        }
        buf[len] = byte[0];
        len += 1;
    }
    let s = core::str::from_utf8(&buf[..len]).unwrap_or("<non-utf8>");
    crate::print!("{}", s);
    Ok(0)
}

/// `2 fork` — duplicate the calling thread. Returns the child's thread id,
/// or `-1` on pool exhaustion.
pub fn sys_fork() -> SyscallResult {
    crate::sched::thread_fork().ok_or(SyscallError::Generic)
}

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const ELFCLASS64: u8 = 2;
const PT_LOAD: u32 = 1;

#[repr(C)]
struct Elf64Header {
    e_ident: [u8; 16],
    e_type: u16,
    e_machine: u16,
    e_version: u32,
    e_entry: u64,
    e_phoff: u64,
    e_shoff: u64,
    e_flags: u32,
    e_ehsize: u16,
    e_phentsize: u16,
    e_phnum: u16,
    e_shentsize: u16,
    e_shnum: u16,
    e_shstrndx: u16,
}

#[repr(C)]
struct Elf64ProgramHeader {
    p_type: u32,
    p_flags: u32,
    p_offset: u64,
    p_vaddr: u64,
    p_paddr: u64,
    p_filesz: u64,
    p_memsz: u64,
    p_align: u64,
}

/// Map every `PT_LOAD` segment of the ELF64 image at `elf_ptr` into the
/// caller's address space and return its entry point. `elf_ptr` is the
/// already-resident image an external loader placed in memory; detecting
/// non-ELF formats and resolving the agent manifest are out of scope
/// (`spec.md` §1) — this only walks the program header table.
fn load_elf(elf_ptr: u64) -> Option<u64> {
    if elf_ptr == 0 {
        return None;
    }
    // SAFETY: `elf_ptr` is trusted to reference a resident ELF64 image, per
    // the syscall's documented contract.
    let header = unsafe { &*(elf_ptr as *const Elf64Header) };
    if header.e_ident[0..4] != ELF_MAGIC || header.e_ident[4] != ELFCLASS64 {
        return None;
    }

    let pml4 = page_table::active_pml4()?;

    for i in 0..header.e_phnum as u64 {
        let ph_addr = elf_ptr + header.e_phoff + i * header.e_phentsize as u64;
        // SAFETY: within the program header table the header just validated.
        let ph = unsafe { &*(ph_addr as *const Elf64ProgramHeader) };
        if ph.p_type != PT_LOAD {
            continue;
        }

        let page_base = ph.p_vaddr & !(FRAME_SIZE as u64 - 1);
        let span = (ph.p_vaddr - page_base) + ph.p_memsz;
        let pages = (span as usize).div_ceil(FRAME_SIZE);

        for p in 0..pages {
            let frame = frame_allocator::alloc(0, 0, false)?;
            // SAFETY: freshly allocated, not yet mapped or aliased.
            unsafe { core::ptr::write_bytes(frame.addr().as_u64() as *mut u8, 0, FRAME_SIZE) };
            let virt = VirtualAddress::new(page_base + (p * FRAME_SIZE) as u64);
            page_table::map(pml4, virt, frame, PageFlags::USER_RW).ok()?;
        }

        // SAFETY: the mapped range above covers `[p_vaddr, p_vaddr +
        // p_filesz)`; the source range is inside the validated image.
        unsafe {
            core::ptr::copy_nonoverlapping(
                (elf_ptr + ph.p_offset) as *const u8,
                ph.p_vaddr as *mut u8,
                ph.p_filesz as usize,
            );
        }
    }

    Some(header.e_entry)
}

/// `3 exec(elf_ptr)` — load an in-memory ELF image and return its entry, or
/// `-1`.
pub fn sys_exec(elf_ptr: u64) -> SyscallResult {
    load_elf(elf_ptr)
        .map(|entry| entry as usize)
        .ok_or(SyscallError::Generic)
}
