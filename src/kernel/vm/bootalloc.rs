// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Entry Translation Table Allocator
//!
//! Translation tables for the entry mappings come from a static pool that is
//! reserved in the image at build time. There is no heap this early, so the
//! allocator is a bump pointer over that pool: tables are handed out in order
//! and never returned. The pool lives for the lifetime of the system; once
//! the MMU is on, the tables belong to the hardware walker.
//!
//! # Parent tree
//!
//! For every table handed out, the index of the table holding the descriptor
//! that points at it is recorded in a flat array (`-1` for the root). Indices
//! are relative to the pool base rather than raw pointers, because the pool
//! is reached through its load address now and through its execution address
//! later, and only an index means the same thing in both.
//!
//! # Cache maintenance
//!
//! With the MMU and caches off, a plain store is not guaranteed to be what
//! the table walker sees once translation is enabled. Every word written
//! here (zeroed table entries, tree slots, descriptors) is followed by a
//! clean+invalidate of its address.

use core::ptr;

use crate::kernel::arch::arm64::mmu::{Descriptor, TTBL_TABLE_ENTCNT, TTBL_TABLE_SIZE, TTBL_TABLE_SIZE_SHIFT};
use crate::kernel::vm::layout::PAddr;
use crate::kernel::vm::walker;
use crate::err::Result;

/// Parent index stored for the root table and unused slots
pub const TTBL_TREE_NO_PARENT: i32 = -1;

/// CPU services the entry code relies on
///
/// Both are assumed to work with the MMU and data cache disabled.
pub trait EntryCpu {
    /// Clean and invalidate the data cache line containing `addr`.
    fn clean_invalidate(&self, addr: usize);

    /// Stop the boot CPU. Never returns.
    fn halt(&self) -> !;
}

/// One translation table: 512 descriptors, 4KB aligned
#[derive(Clone)]
#[repr(C, align(4096))]
pub struct Table {
    entries: [u64; TTBL_TABLE_ENTCNT],
}

const _: () = assert!(core::mem::size_of::<Table>() == TTBL_TABLE_SIZE);

impl Table {
    /// A table with every descriptor invalid
    pub const EMPTY: Table = Table {
        entries: [0; TTBL_TABLE_ENTCNT],
    };

    /// Read descriptor `index`
    #[inline(always)]
    pub fn entry(&self, index: usize) -> Descriptor {
        // SAFETY: the reference is valid; volatile keeps the read ordered
        // against the hardware walker's view.
        Descriptor::from_raw(unsafe { ptr::read_volatile(&self.entries[index]) })
    }

    /// Count of valid descriptors
    pub fn valid_entries(&self) -> usize {
        (0..TTBL_TABLE_ENTCNT).filter(|&i| self.entry(i).is_valid()).count()
    }
}

/// Static pool of entry translation tables
#[repr(C, align(4096))]
pub struct TablePool<const N: usize> {
    tables: [Table; N],
}

impl<const N: usize> TablePool<N> {
    /// A pool of `N` empty tables
    pub const fn new() -> Self {
        Self {
            tables: [Table::EMPTY; N],
        }
    }

    /// Number of tables the pool can hand out
    pub const fn capacity(&self) -> usize {
        N
    }

    /// All tables, used or not
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }
}

impl<const N: usize> Default for TablePool<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocator and tree state for one entry run
///
/// `ttbl_base` is the address the tables have in descriptors (the load
/// address of the pool). The pool itself is reached through `tables`.
pub struct EntryCtrl<'a, C: EntryCpu, const N: usize> {
    ttbl_count: usize,
    ttbl_tree: &'a mut [i32; N],
    next_ttbl: PAddr,
    ttbl_base: PAddr,
    tables: &'a mut [Table; N],
    cpu: &'a C,
}

impl<'a, C: EntryCpu, const N: usize> EntryCtrl<'a, C, N> {
    /// Set up the allocator over `pool` and take table 0 as the root.
    ///
    /// Every tree slot is reset to [`TTBL_TREE_NO_PARENT`] and the root is
    /// zeroed, all with cache maintenance.
    ///
    /// # Arguments
    ///
    /// * `pool` - Entry table pool
    /// * `tree` - Parent index array, one slot per pool table
    /// * `ttbl_base` - Address of `pool` as written into descriptors
    /// * `cpu` - Cache maintenance and halt
    #[inline(always)]
    pub fn init(pool: &'a mut TablePool<N>, tree: &'a mut [i32; N], ttbl_base: PAddr, cpu: &'a C) -> Self {
        let mut ctrl = Self {
            ttbl_count: 0,
            ttbl_tree: tree,
            next_ttbl: ttbl_base,
            ttbl_base,
            tables: &mut pool.tables,
            cpu,
        };

        if N == 0 {
            ctrl.exhausted();
        }

        for slot in 0..N {
            ctrl.set_tree_slot(slot, TTBL_TREE_NO_PARENT);
        }

        ctrl.zero_table(0);
        ctrl.ttbl_count = 1;
        ctrl.next_ttbl += TTBL_TABLE_SIZE;

        LTRACEF!("entry ttbl: root {:#x}, {} tables", ttbl_base, N);

        ctrl
    }

    /// Hand out the next pool table as a child of the table at `parent`.
    ///
    /// The new table is zeroed and its parent index recorded. Halts the CPU
    /// if the pool is used up; there is nowhere else to get a table from.
    ///
    /// # Returns
    ///
    /// The descriptor address of the new table
    #[inline(always)]
    pub fn alloc_table(&mut self, parent: PAddr) -> PAddr {
        if self.ttbl_count == N {
            self.exhausted();
        }

        let parent_index = self.table_index(parent);
        let index = self.ttbl_count;
        debug_assert!(self.next_ttbl == self.table_address(index));

        self.zero_table(index);
        self.set_tree_slot(index, parent_index as i32);
        self.ttbl_count += 1;

        let table = self.next_ttbl;
        self.next_ttbl += TTBL_TABLE_SIZE;

        LTRACEF!("entry ttbl: table {} at {:#x}, parent {}", index, table, parent_index);

        table
    }

    /// Read descriptor `index` of the table at `table`
    #[inline(always)]
    pub fn read_entry(&self, table: PAddr, index: usize) -> Descriptor {
        self.tables[self.table_index(table)].entry(index)
    }

    /// Store `desc` as descriptor `index` of the table at `table`.
    ///
    /// The descriptor is written with a single store, then cleaned.
    #[inline(always)]
    pub fn write_entry(&mut self, table: PAddr, index: usize, desc: Descriptor) {
        let slot = self.table_index(table);
        let word = &mut self.tables[slot].entries[index];
        // SAFETY: `word` is a valid, exclusive reference into the pool.
        unsafe { ptr::write_volatile(word, desc.raw()) };
        let addr = word as *const u64 as usize;
        self.cpu.clean_invalidate(addr);
    }

    /// Pool index of the table at descriptor address `table`.
    ///
    /// Only tables already handed out are valid; anything else means the
    /// tree is corrupt and the CPU is halted.
    #[inline(always)]
    pub fn table_index(&self, table: PAddr) -> usize {
        if table < self.ttbl_base {
            self.corrupt(table);
        }
        let index = (table - self.ttbl_base) >> TTBL_TABLE_SIZE_SHIFT;
        if index >= self.ttbl_count {
            self.corrupt(table);
        }
        index
    }

    /// Descriptor address of pool table `index`
    #[inline(always)]
    pub fn table_address(&self, index: usize) -> PAddr {
        self.ttbl_base + (index << TTBL_TABLE_SIZE_SHIFT)
    }

    /// Root (L1) table address
    #[inline(always)]
    pub fn root(&self) -> PAddr {
        self.ttbl_base
    }

    /// Descriptor address of the pool
    pub fn ttbl_base(&self) -> PAddr {
        self.ttbl_base
    }

    /// Tables handed out so far, root included
    pub fn ttbl_count(&self) -> usize {
        self.ttbl_count
    }

    /// Address the next table will get
    pub fn next_ttbl(&self) -> PAddr {
        self.next_ttbl
    }

    /// Parent index array
    pub fn ttbl_tree(&self) -> &[i32] {
        &self.ttbl_tree[..]
    }

    /// Tables handed out so far
    pub fn tables(&self) -> &[Table] {
        &self.tables[..self.ttbl_count]
    }

    /// Leaf descriptor currently mapping `va`
    pub fn lookup(&self, va: usize) -> Result<Descriptor> {
        walker::walk(self.tables(), self.ttbl_base, va)
    }

    #[inline(always)]
    pub(crate) fn cpu(&self) -> &C {
        self.cpu
    }

    #[inline(always)]
    fn zero_table(&mut self, index: usize) {
        for word in self.tables[index].entries.iter_mut() {
            // SAFETY: `word` is a valid, exclusive reference into the pool.
            unsafe { ptr::write_volatile(word, 0) };
            self.cpu.clean_invalidate(word as *const u64 as usize);
        }
    }

    #[inline(always)]
    fn set_tree_slot(&mut self, slot: usize, parent: i32) {
        let word = &mut self.ttbl_tree[slot];
        // SAFETY: `word` is a valid, exclusive reference into the tree.
        unsafe { ptr::write_volatile(word, parent) };
        self.cpu.clean_invalidate(word as *const i32 as usize);
    }

    #[inline(always)]
    fn exhausted(&self) -> ! {
        LTRACEF!("entry ttbl: pool of {} tables exhausted", N);
        self.cpu.halt()
    }

    #[inline(always)]
    fn corrupt(&self, table: PAddr) -> ! {
        LTRACEF!("entry ttbl: {:#x} is not a pool table", table);
        self.cpu.halt()
    }
}
