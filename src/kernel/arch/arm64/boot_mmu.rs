// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ARM64 Entry MMU Setup
//!
//! `_setup_initial_ttbl` is called from the entry assembly with the MMU
//! off, on the boot CPU only, before relocation. It may not touch a global
//! through its linked address: the pool, the tree and the linker symbols
//! are all translated to load addresses through the [`ImageLayout`] first.
//!
//! Only `_setup_initial_ttbl` carries `#[link_section = ".entry"]`. The
//! workers it reaches (`setup_initial_ttbl`, `insert_mapping`, the
//! `EntryCtrl` methods, `Arm64EntryCpu`) are all `#[inline(always)]`, so
//! their code lands inside it and the entry path runs from `.entry` alone.

#![allow(non_upper_case_globals)]

use core::ptr::{addr_of, addr_of_mut};

use aarch64_cpu::registers::*;

use crate::config::TTBL_INITIAL_TABLE_COUNT;
use crate::err::Result;
use crate::kernel::arch::arm64::cache::{entry_barrier, Arm64EntryCpu};
use crate::kernel::arch::arm64::mmu::TTBL_OUTADDR_MASK;
#[cfg(feature = "defterm-early")]
use crate::kernel::vm::bootalloc::Table;
use crate::kernel::vm::bootalloc::{TablePool, TTBL_TREE_NO_PARENT};
use crate::kernel::vm::boottables::{setup_initial_ttbl, DeftermEarlyMap, EntryMap, LinkerSection, RO_SECTION_NAMES};
use crate::kernel::vm::layout::ImageLayout;
use crate::kernel::vm::walker::{dump_tree, publish_entry_ttbl, EntryTtblRecord};

type EntryPool = TablePool<TTBL_INITIAL_TABLE_COUNT>;
type EntryTree = [i32; TTBL_INITIAL_TABLE_COUNT];

/// Entry translation table pool
#[no_mangle]
static mut def_ttbl: EntryPool = TablePool::new();

/// Parent index of every pool table
#[no_mangle]
static mut def_ttbl_tree: EntryTree = [TTBL_TREE_NO_PARENT; TTBL_INITIAL_TABLE_COUNT];

/// Placeholder page whose execution address is mapped onto the early UART
#[cfg(feature = "defterm-early")]
#[no_mangle]
static mut defterm_early_base: Table = Table::EMPTY;

extern "C" {
    static _text_start: u8;
    static _text_end: u8;
    static _init_start: u8;
    static _init_end: u8;
    static _cpuinit_start: u8;
    static _cpuinit_end: u8;
    static _spinlock_start: u8;
    static _spinlock_end: u8;
    static _rodata_start: u8;
    static _rodata_end: u8;
}

/// Read-only linker sections, in [`RO_SECTION_NAMES`] order
#[inline(always)]
fn ro_sections() -> [LinkerSection; 5] {
    // SAFETY: only the addresses of the linker symbols are taken.
    unsafe {
        [
            LinkerSection::new(RO_SECTION_NAMES[0], addr_of!(_text_start) as usize, addr_of!(_text_end) as usize),
            LinkerSection::new(RO_SECTION_NAMES[1], addr_of!(_init_start) as usize, addr_of!(_init_end) as usize),
            LinkerSection::new(
                RO_SECTION_NAMES[2],
                addr_of!(_cpuinit_start) as usize,
                addr_of!(_cpuinit_end) as usize,
            ),
            LinkerSection::new(
                RO_SECTION_NAMES[3],
                addr_of!(_spinlock_start) as usize,
                addr_of!(_spinlock_end) as usize,
            ),
            LinkerSection::new(RO_SECTION_NAMES[4], addr_of!(_rodata_start) as usize, addr_of!(_rodata_end) as usize),
        ]
    }
}

#[cfg(feature = "defterm-early")]
#[inline(always)]
fn defterm_early_map() -> Option<DeftermEarlyMap> {
    // SAFETY: only the address of the placeholder is taken.
    let placeholder = unsafe { addr_of!(defterm_early_base) } as usize;
    Some(DeftermEarlyMap::new(placeholder, crate::config::DEFTERM_EARLY_BASE_PA))
}

#[cfg(not(feature = "defterm-early"))]
#[inline(always)]
fn defterm_early_map() -> Option<DeftermEarlyMap> {
    None
}

/// Build the entry translation tables
///
/// Called from the entry assembly; the caller installs the root (the load
/// address of `def_ttbl`) in TTBR0_EL2 and enables the MMU.
///
/// # Safety
///
/// Must be called once, on the boot CPU, with the MMU disabled and no other
/// CPU running.
#[no_mangle]
#[link_section = ".entry"]
pub unsafe extern "C" fn _setup_initial_ttbl(load_start: usize, load_end: usize, exec_start: usize, exec_end: usize) {
    let layout = ImageLayout::new(load_start, load_end, exec_start, exec_end);
    let cpu = Arm64EntryCpu;

    let ttbl_base = layout.to_load_pa(addr_of_mut!(def_ttbl) as usize);
    let tree_pa = layout.to_load_pa(addr_of_mut!(def_ttbl_tree) as usize);
    let pool = &mut *(ttbl_base as *mut EntryPool);
    let tree = &mut *(tree_pa as *mut EntryTree);

    let sections = ro_sections();
    let map = EntryMap::new(layout, &sections, defterm_early_map());

    setup_initial_ttbl(pool, tree, ttbl_base, &cpu, &map);

    entry_barrier();
}

/// Validate and publish the entry tables once the MMU is on.
///
/// The root is taken from TTBR0_EL2, the layout from `def_ttbl_tree`.
pub fn record_entry_ttbl() -> Result<&'static EntryTtblRecord> {
    let root = (TTBR0_EL2.get() & TTBL_OUTADDR_MASK) as usize;
    // SAFETY: the entry code is done with the tree; it is only read now.
    let tree: &EntryTree = unsafe { &*addr_of!(def_ttbl_tree) };

    let record = EntryTtblRecord::from_tree(root, tree)?;
    dump_tree(tree);
    Ok(publish_entry_ttbl(record))
}

/// Early debug terminal through the mapped placeholder page
#[cfg(feature = "defterm-early")]
pub fn defterm_early() -> Option<crate::kernel::dev::uart::DeftermEarly> {
    let uart = crate::config::DEFTERM_EARLY_UART?;
    let map = defterm_early_map()?;
    let base = map.placeholder + map.regs_offset();
    // SAFETY: the entry tables map the placeholder's execution address onto
    // the UART for the lifetime of the system.
    Some(unsafe { crate::kernel::dev::uart::DeftermEarly::new(base, uart) })
}
