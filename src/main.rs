/*
 * Firmware entry point. Mirrors the two constraints any M-mode firmware
 * running below a supervisor payload must satisfy before touching
 * generic dispatch logic:
 * - `mscratch` points at a valid per-HART `Scratch` instance;
 * - `sp` points at a stack reserved exclusively for this HART.
 *
 * The `_start`/`main` split and the per-HART scratch construction loop
 * are a direct descendant of the reference firmware's `fw_base.S`
 * entry sequence, translated into inline `asm!` blocks and a Rust loop
 * instead of a hand-assembled `.S` file.
 *
 * Author: Giuseppe Capasso <capassog97@gmail.com>
 */
#![no_std]
#![no_main]
#![feature(fn_align)]

use core::panic::PanicInfo;

use ironhart::scratch::Scratch;
use ironhart::{error_log, platform};
use linked_list_allocator::LockedHeap;

mod board_virt;

extern crate alloc;

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

unsafe extern "C" {
    static _fw_start: u8;
    static _fw_end: u8;
    static _fw_rw_start: u8;
    static _start_bss: u8;
    static _end_bss: u8;
    static _top_b_stack: u8;
    static mut _tee_heap_start: u8;
    static _heap_size: u8;
}

#[inline(never)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    error_log!("{}", info);
    loop {
        ironhart::privileged::wfi();
    }
}

/// We include the next-stage `.elf` in the firmware image as read-only
/// data when built with `embed-elf`; `load_elf` copies its LOAD
/// segments into place at boot rather than executing it directly out
/// of a non-executable section.
#[cfg(feature = "embed-elf")]
#[link_section = ".payload"]
static PAYLOAD: [u8; include_bytes!("../demos/payload.elf").len()] = *include_bytes!("../demos/payload.elf");

const STACK_SIZE_PER_HART: usize = 1 << 14;

/// Privilege mode the next boot stage is entered in.
const PRIV_S: usize = 1;

#[link_section = ".text.entry"]
#[unsafe(no_mangle)]
extern "C" fn _start() -> ! {
    unsafe {
        core::arch::asm!(
            "csrr t0, mhartid",
            "li t1, {max_harts}",
            "bge t0, t1, {hang}",

            "li t2, {stack_size_per_hart}",
            "mul t3, t0, t2",
            "la sp, {stack_top}",
            "sub sp, sp, t3",

            // Only hart 0 zeroes BSS; the rest wait for cold boot to
            // finish before touching any shared state.
            "bnez t0, 1f",
            "la s4, {bss_start}",
            "la s5, {bss_end}",
            "0:",
            "bge s4, s5, 1f",
            "sd zero, 0(s4)",
            "addi s4, s4, {pointer_size}",
            "j 0b",
            "1:",

            "mv a0, t0",
            "call {main}",
            max_harts = const ironhart::hartmask::MAX_HARTS,
            stack_size_per_hart = const STACK_SIZE_PER_HART,
            stack_top = sym _top_b_stack,
            hang = sym hang,
            main = sym main,
            bss_start = sym _start_bss,
            bss_end = sym _end_bss,
            pointer_size = const size_of::<usize>(),
            options(noreturn)
        )
    }
}

/// `main(mhartid, fdt_addr)`. `fdt_addr` arrives in `a1` per the SBI
/// boot protocol; the asm trampoline above only threads `mhartid`
/// through in `a0`, leaving `a1` untouched from whatever the previous
/// boot stage (QEMU's OpenSBI-compatible loader, or a discrete
/// bootloader) placed there.
extern "C" fn main(mhartid: usize, fdt_addr: usize) -> ! {
    unsafe { ironhart::privileged::write_mscratch(0) };
    unsafe {
        use riscv::register::mtvec::Mtvec;
        riscv::register::mtvec::write(Mtvec::from_bits(hang as usize));
    }

    if mhartid == 0 {
        unsafe {
            ALLOCATOR.lock().init(
                core::ptr::addr_of_mut!(_tee_heap_start),
                core::ptr::addr_of!(_heap_size) as usize,
            );
        }
        cold_boot_hart(mhartid, fdt_addr)
    } else {
        warm_boot_hart(mhartid)
    }
}

fn cold_boot_hart(hartindex: usize, fdt_addr: usize) -> ! {
    let boot_info = ironhart::fdt::parse(fdt_addr).unwrap_or_else(|e| {
        error_log!("fdt parse failed: {e}, assuming a single hart and no RPMI transport");
        ironhart::fdt::BootInfo {
            enabled_harts: ironhart::hartmask::HartMask::from_hart(0),
            hart_count: 1,
            rpmi_shmem: None,
        }
    });

    VIRT_PLATFORM.set_hart_count(boot_info.hart_count);
    platform::set_platform(&VIRT_PLATFORM);

    let next_stage_address = next_stage_address();

    let fw_start = unsafe { &_fw_start as *const u8 as usize } as u64;
    let fw_end = unsafe { &_fw_end as *const u8 as usize } as u64;
    let fw_rw_start = unsafe { &_fw_rw_start as *const u8 as usize } as u64;
    let hart_stack_size = STACK_SIZE_PER_HART as u64;
    let heap_size = unsafe { &_heap_size as *const u8 as usize } as u64;
    let fw_end_tot = fw_end + (boot_info.hart_count as u64 * hart_stack_size) + heap_size;

    write_scratch_table(&boot_info, fw_start, fw_end_tot, hart_stack_size, heap_size, next_stage_address, fdt_addr as u64);

    unsafe { riscv::interrupt::disable() };

    let scratch_addr = ironhart::scratch::SCRATCH_TABLE.lock().scratch_addr(hartindex).expect("cold boot hart has no scratch");
    unsafe { ironhart::privileged::write_mscratch(scratch_addr) };

    unsafe {
        use riscv::register::mtvec::Mtvec;
        riscv::register::mtvec::write(Mtvec::from_bits(ironhart::trap::handler as usize));
        riscv::register::mstatus::clear_tsr();
        riscv::register::mstatus::clear_tvm();
    }

    if let Err(e) = ironhart::init::cold_boot(
        hartindex,
        boot_info.hart_count,
        fw_start,
        fw_rw_start - fw_start,
        fw_end_tot - fw_start,
        next_stage_address as u64,
        fdt_addr as u64,
        boot_info.rpmi_shmem,
    ) {
        error_log!("cold boot failed: {e}");
        hang();
    }

    jump_to_next_stage(next_stage_address, fdt_addr)
}

fn warm_boot_hart(hartindex: usize) -> ! {
    let scratch_addr = loop {
        if let Some(addr) = ironhart::scratch::SCRATCH_TABLE.lock().scratch_addr(hartindex) {
            break addr;
        }
        ironhart::privileged::wfi();
    };
    unsafe { ironhart::privileged::write_mscratch(scratch_addr) };
    unsafe {
        use riscv::register::mtvec::Mtvec;
        riscv::register::mtvec::write(Mtvec::from_bits(ironhart::trap::handler as usize));
    }

    ironhart::init::warm_boot(hartindex);

    let scratch = unsafe { Scratch::from_addr(scratch_addr) };
    jump_to_next_stage(scratch.next_addr, scratch.next_arg1)
}

fn next_stage_address() -> usize {
    #[cfg(feature = "embed-elf")]
    {
        load_elf(&PAYLOAD)
    }
    #[cfg(not(feature = "embed-elf"))]
    {
        let address = option_env!("IRONHART_JUMP_ADDRESS").unwrap_or("0x80200000").strip_prefix("0x").unwrap();
        usize::from_str_radix(address, 16).unwrap_or_else(|_| panic!("invalid jump address: {address}"))
    }
}

/// Writes one [`Scratch`] per enabled HART at the top of that HART's
/// stack and records it in [`ironhart::scratch::SCRATCH_TABLE`], laying
/// out memory exactly as `linker.ld`'s reservation after `_fw_end`
/// describes: HART stacks back-to-back, each ending with its scratch
/// struct, followed by the heap.
fn write_scratch_table(
    boot_info: &ironhart::fdt::BootInfo,
    fw_start: u64,
    fw_end_tot: u64,
    hart_stack_size: u64,
    heap_size: u64,
    next_addr: usize,
    next_arg1: u64,
) {
    let mut table = ironhart::scratch::SCRATCH_TABLE.lock();
    for hartindex in 0..boot_info.hart_count {
        let scratch_addr = (fw_end_tot - heap_size - hart_stack_size * (hartindex as u64 + 1)) as usize
            + (hart_stack_size as usize - ironhart::scratch::SCRATCH_SIZE);
        let value = Scratch::new(
            fw_start as usize,
            (fw_end_tot - fw_start) as usize,
            0,
            (fw_end_tot - heap_size - fw_start) as usize,
            heap_size as usize,
            next_arg1 as usize,
            next_addr,
            PRIV_S,
            _start as usize,
            hartindex,
            ironhart::scratch::SCRATCH_SIZE - core::mem::size_of::<Scratch>(),
        );
        unsafe { Scratch::write_at(scratch_addr, value) };
        table.register(hartindex, hartindex, scratch_addr);
    }
}

fn jump_to_next_stage(next_addr: usize, next_arg1: usize) -> ! {
    let mut mstatus = riscv::register::mstatus::read();
    mstatus.set_mpie(false);
    mstatus.set_mpp(riscv::register::mstatus::MPP::Supervisor);
    unsafe {
        riscv::register::mepc::write(next_addr);
        core::arch::asm!(
            "mv a1, {arg1}",
            "mret",
            arg1 = in(reg) next_arg1,
            options(noreturn)
        )
    }
}

static VIRT_PLATFORM: board_virt::VirtPlatform = board_virt::VirtPlatform::new();

#[cfg(feature = "embed-elf")]
fn load_elf(data: &[u8]) -> usize {
    use alloc::vec::Vec;
    use elf::{abi::PT_LOAD, endian::AnyEndian, segment::ProgramHeader, ElfBytes};

    let elf = ElfBytes::<AnyEndian>::minimal_parse(data).unwrap();
    let all_load_phdrs =
        elf.segments().unwrap().iter().filter(|phdr| phdr.p_type == PT_LOAD).collect::<Vec<ProgramHeader>>();

    for segment in all_load_phdrs {
        let p_offset = segment.p_offset as usize;
        let p_filesz = segment.p_filesz as usize;
        let p_paddr = segment.p_paddr as *mut u8;
        let p_memsz = segment.p_memsz as usize;
        assert!(p_offset + p_filesz <= data.len(), "segment data out of bounds");

        let segment_data = &data[p_offset..p_offset + p_filesz];
        unsafe { core::ptr::copy_nonoverlapping(segment_data.as_ptr(), p_paddr, p_filesz) };
        if p_memsz > p_filesz {
            let bss_start = unsafe { p_paddr.add(p_filesz) };
            let bss_len = p_memsz - p_filesz;
            unsafe { core::ptr::write_bytes(bss_start, 0, bss_len) };
        }
    }

    elf.ehdr.e_entry as usize
}

#[rustc_align(4)]
fn hang() -> ! {
    loop {
        ironhart::privileged::wfi();
    }
}
