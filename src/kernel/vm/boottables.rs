// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Hypervisor Entry Page Tables
//!
//! Builds the initial stage-1 tables before the MMU is enabled. Runs once,
//! on the boot CPU, with caches off and before relocation.
//!
//! # Entry Sequence
//!
//! 1. Reset the parent tree and take the root table from the pool
//! 2. Map the early debug UART page (device memory), if configured
//! 3. Map the load image 1:1 as normal writable memory
//! 4. Map each read-only linker section from its execution address to its
//!    load address, read-only
//! 5. Map the whole execution range to the load image, writable
//!
//! Leaves are never overwritten, so each step only fills pages the earlier
//! steps left empty. Step 4 must come before step 5 or the read-only
//! sections end up writable.
//!
//! Nothing in this module may touch a global: every address it needs is
//! passed in and translated through the [`ImageLayout`].

use crate::kernel::arch::arm64::mmu::{MemAttr, TTBL_L3_BLOCK_SIZE};
use crate::kernel::vm::bootalloc::{EntryCpu, EntryCtrl, TablePool};
use crate::kernel::vm::layout::{ImageLayout, PAddr, VAddr, PAGE_MASK};
use crate::kernel::vm::page_table::{insert_mapping, MapRequest};

/// Read-only linker sections, in mapping order
pub const RO_SECTION_NAMES: [&str; 5] = ["text", "init", "cpuinit", "spinlock", "rodata"];

/// ============================================================================
/// Entry Map Description
/// ============================================================================

/// Bounds of one linker section, as resolved by the linker
///
/// The bounds may be load or execution addresses depending on how the
/// symbols were reached; both are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkerSection {
    /// Section name (for debugging)
    pub name: &'static str,
    /// First byte of the section
    pub start: VAddr,
    /// End of the section, exclusive
    pub end: VAddr,
}

impl LinkerSection {
    pub const fn new(name: &'static str, start: VAddr, end: VAddr) -> Self {
        Self { name, start, end }
    }

    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Request mapping the section's execution range onto its load range,
    /// read-only
    pub const fn map_request(&self, layout: &ImageLayout) -> MapRequest {
        let start = layout.to_exec_va(self.start);
        // Translate the last byte: an end equal to `load_end` is outside the
        // load range and would not be translated.
        let end = if self.is_empty() {
            start
        } else {
            layout.to_exec_va(self.end - 1) + 1
        };
        MapRequest::new(start, end, layout.to_load_pa(self.start), MemAttr::NormalWb, false)
    }
}

/// Early debug UART mapping
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeftermEarlyMap {
    /// Address of the placeholder page reserved in the image
    pub placeholder: VAddr,
    /// Physical MMIO base of the UART
    pub base_pa: PAddr,
}

impl DeftermEarlyMap {
    pub const fn new(placeholder: VAddr, base_pa: PAddr) -> Self {
        Self { placeholder, base_pa }
    }

    /// Execution address the UART registers will be reached through
    pub const fn exec_va(&self, layout: &ImageLayout) -> VAddr {
        layout.to_exec_va(self.placeholder)
    }

    /// Offset of the UART registers into the mapped page
    pub const fn regs_offset(&self) -> usize {
        self.base_pa & PAGE_MASK
    }

    /// Execution address of the UART register block
    pub const fn regs_va(&self, layout: &ImageLayout) -> VAddr {
        self.exec_va(layout) + self.regs_offset()
    }

    /// Request mapping one page at the placeholder's execution address onto
    /// the UART, as writable device memory
    pub const fn map_request(&self, layout: &ImageLayout) -> MapRequest {
        let va = self.exec_va(layout);
        MapRequest::new(va, va + TTBL_L3_BLOCK_SIZE, self.base_pa, MemAttr::DeviceNgnre, true)
    }
}

/// Everything the entry sequence maps
#[derive(Debug, Clone, Copy)]
pub struct EntryMap<'s> {
    /// Load and execution bounds of the image
    pub layout: ImageLayout,
    /// Sections to map read-only
    pub ro_sections: &'s [LinkerSection],
    /// Early debug UART, if configured
    pub defterm: Option<DeftermEarlyMap>,
}

impl<'s> EntryMap<'s> {
    pub const fn new(layout: ImageLayout, ro_sections: &'s [LinkerSection], defterm: Option<DeftermEarlyMap>) -> Self {
        Self {
            layout,
            ro_sections,
            defterm,
        }
    }

    /// 1:1 map of the load image
    pub const fn identity_request(&self) -> MapRequest {
        MapRequest::identity(self.layout.load_start, self.layout.load_end, MemAttr::NormalWb, true)
    }

    /// Execution range onto the load image, writable
    pub const fn exec_request(&self) -> MapRequest {
        MapRequest::new(
            self.layout.exec_start,
            self.layout.exec_end,
            self.layout.load_start,
            MemAttr::NormalWb,
            true,
        )
    }

    /// Feed every request to `f`, in entry order
    #[inline(always)]
    pub fn for_each_request<F: FnMut(&MapRequest)>(&self, mut f: F) {
        if let Some(defterm) = &self.defterm {
            f(&defterm.map_request(&self.layout));
        }
        f(&self.identity_request());
        for section in self.ro_sections {
            if !section.is_empty() {
                f(&section.map_request(&self.layout));
            }
        }
        f(&self.exec_request());
    }
}

/// ============================================================================
/// Entry Sequence
/// ============================================================================

/// Build the entry translation tables.
///
/// # Arguments
///
/// * `pool` - Entry table pool
/// * `tree` - Parent index array for `pool`
/// * `ttbl_base` - Load address of `pool`
/// * `cpu` - Cache maintenance and halt
/// * `map` - Image layout, read-only sections and early UART
///
/// # Returns
///
/// The allocator state, with the root at `ttbl_base`
#[inline(always)]
pub fn setup_initial_ttbl<'a, C: EntryCpu, const N: usize>(
    pool: &'a mut TablePool<N>,
    tree: &'a mut [i32; N],
    ttbl_base: PAddr,
    cpu: &'a C,
    map: &EntryMap<'_>,
) -> EntryCtrl<'a, C, N> {
    let mut ctrl = EntryCtrl::init(pool, tree, ttbl_base, cpu);

    map.for_each_request(|req| {
        insert_mapping(&mut ctrl, req);
    });

    LTRACEF!("entry ttbl: {} of {} tables used", ctrl.ttbl_count(), N);

    ctrl
}
