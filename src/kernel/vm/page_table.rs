// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Entry Page Table Insertion
//!
//! Walks the 3-level LPAE hierarchy for every page of a range, creating L2
//! and L3 tables from the entry pool on the way down, and installs 4KB leaf
//! descriptors.
//!
//! # Leaf policy
//!
//! A leaf that is already valid is never rewritten. The first range to map a
//! page decides its output address and permissions; later requests for the
//! same page are no-ops. The entry mapping sequence depends on this.
//!
//! # Alignment
//!
//! `virt_start` and `phys_start` are truncated to page granularity before
//! iterating. `virt_end` is used as is, so a range ending mid-page still maps
//! that last page.

use crate::err::{Result, TtblError};
use crate::kernel::arch::arm64::mmu::{l1_index, l2_index, l3_index, Descriptor, MemAttr};
use crate::kernel::vm::bootalloc::{EntryCpu, EntryCtrl};
use crate::kernel::vm::layout::{page_align_down, PAddr, VAddr, PAGE_SIZE};

/// ============================================================================
/// Mapping Request
/// ============================================================================

/// One virtual range to map onto physical memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRequest {
    /// First virtual address (truncated to a page)
    pub virt_start: VAddr,

    /// End virtual address, exclusive
    pub virt_end: VAddr,

    /// Physical address backing `virt_start` (truncated to a page)
    pub phys_start: PAddr,

    /// Memory type of the leaves
    pub attr: MemAttr,

    /// Leaves are read/write when set, read-only otherwise
    pub writable: bool,
}

impl MapRequest {
    /// Create a new mapping request
    pub const fn new(
        virt_start: VAddr,
        virt_end: VAddr,
        phys_start: PAddr,
        attr: MemAttr,
        writable: bool,
    ) -> Self {
        Self {
            virt_start,
            virt_end,
            phys_start,
            attr,
            writable,
        }
    }

    /// Request mapping `[start, end)` onto itself
    pub const fn identity(start: VAddr, end: VAddr, attr: MemAttr, writable: bool) -> Self {
        Self::new(start, end, start, attr, writable)
    }

    /// Reject inverted ranges
    pub fn validate(&self) -> Result {
        if self.virt_end < self.virt_start {
            return Err(TtblError::InvalidArgs);
        }
        Ok(())
    }

    /// Number of leaves the request covers after truncation
    pub const fn page_count(&self) -> usize {
        let start = page_align_down(self.virt_start);
        if self.virt_end <= start {
            return 0;
        }
        (self.virt_end - start).div_ceil(PAGE_SIZE)
    }

    /// Physical address for page `page` of the truncated range
    pub const fn phys_for(&self, page: VAddr) -> PAddr {
        page_align_down(self.phys_start) + (page - page_align_down(self.virt_start))
    }
}

/// ============================================================================
/// Insertion
/// ============================================================================

/// Map every page of `req` into the entry tables owned by `ctrl`.
///
/// Missing L2/L3 tables are taken from the pool. Leaves that are already
/// valid are left alone. Running out of tables halts the CPU through
/// `ctrl`'s [`EntryCpu`].
///
/// # Returns
///
/// Number of leaves newly installed
#[inline(always)]
pub fn insert_mapping<C: EntryCpu, const N: usize>(ctrl: &mut EntryCtrl<'_, C, N>, req: &MapRequest) -> usize {
    debug_assert!(req.validate().is_ok(), "inverted mapping request {:?}", req);

    let virt_start = page_align_down(req.virt_start);
    let mut installed = 0;
    let mut page = virt_start;

    LTRACEF!(
        "entry ttbl: map {:#x}-{:#x} -> {:#x} attr {} {}",
        req.virt_start,
        req.virt_end,
        req.phys_start,
        req.attr.index(),
        if req.writable { "rw" } else { "ro" }
    );

    while page < req.virt_end {
        let root = ctrl.root();
        let l2 = next_table(ctrl, root, l1_index(page));
        let l3 = next_table(ctrl, l2, l2_index(page));

        let index = l3_index(page);
        if !ctrl.read_entry(l3, index).is_valid() {
            let leaf = Descriptor::new_page(req.phys_for(page), req.attr, req.writable);
            ctrl.write_entry(l3, index, leaf);
            installed += 1;
        }

        page = match page.checked_add(PAGE_SIZE) {
            Some(next) => next,
            None => break,
        };
    }

    installed
}

/// Follow descriptor `index` of `table` to the next level, allocating and
/// linking a fresh table if the slot is empty.
#[inline(always)]
fn next_table<C: EntryCpu, const N: usize>(ctrl: &mut EntryCtrl<'_, C, N>, table: PAddr, index: usize) -> PAddr {
    let desc = ctrl.read_entry(table, index);
    if desc.is_valid() {
        if !desc.is_table() {
            // Block descriptors are never produced here.
            LTRACEF!("entry ttbl: block descriptor at {:#x}[{}]", table, index);
            ctrl.cpu().halt();
        }
        return desc.output_address();
    }

    let child = ctrl.alloc_table(table);
    ctrl.write_entry(table, index, Descriptor::new_table(child));
    child
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::arch::arm64::mmu::{TTBL_AP_SR_U, TTBL_AP_SRW_U, TTBL_SH_INNER_SHAREABLE, TTBL_TABLE_ENTCNT};
    use crate::kernel::vm::test_util::{TestPool, POOL_PA};

    #[test]
    fn test_request_page_count() {
        assert_eq!(MapRequest::identity(0x8_0000, 0x9_0000, MemAttr::NormalWb, true).page_count(), 16);
        assert_eq!(MapRequest::identity(0x8_0123, 0x8_1001, MemAttr::NormalWb, true).page_count(), 2);
        assert_eq!(MapRequest::identity(0x8_0000, 0x8_0000, MemAttr::NormalWb, true).page_count(), 0);
        assert_eq!(MapRequest::identity(0x9_0000, 0x8_0000, MemAttr::NormalWb, true).page_count(), 0);
    }

    #[test]
    fn test_request_validate() {
        let ok = MapRequest::new(0x4_0000, 0x5_0000, 0x8_0000, MemAttr::NormalWb, false);
        assert_eq!(ok.validate(), Ok(()));
        let inverted = MapRequest::new(0x5_0000, 0x4_0000, 0x8_0000, MemAttr::NormalWb, false);
        assert_eq!(inverted.validate(), Err(TtblError::InvalidArgs));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "inverted mapping request")]
    fn test_inverted_request_asserts() {
        let mut t = TestPool::<8>::new();
        let mut ctrl = t.init_ctrl();

        insert_mapping(&mut ctrl, &MapRequest::identity(0x9_0000, 0x8_0000, MemAttr::NormalWb, true));
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_inverted_request_maps_nothing() {
        let mut t = TestPool::<8>::new();
        let mut ctrl = t.init_ctrl();

        let req = MapRequest::identity(0x9_0000, 0x8_0000, MemAttr::NormalWb, true);
        assert_eq!(insert_mapping(&mut ctrl, &req), 0);
        assert_eq!(ctrl.ttbl_count(), 1);
        assert_eq!(ctrl.lookup(0x8_0000), Err(TtblError::NotMapped));
    }

    #[test]
    fn test_identity_map_load_range() {
        let mut t = TestPool::<8>::new();
        let mut ctrl = t.init_ctrl();

        let req = MapRequest::identity(0x8_0000, 0x9_0000, MemAttr::NormalWb, true);
        assert_eq!(insert_mapping(&mut ctrl, &req), 16);
        assert_eq!(ctrl.ttbl_count(), 3);

        for va in (0x8_0000..0x9_0000).step_by(PAGE_SIZE) {
            let leaf = ctrl.lookup(va).unwrap();
            assert!(leaf.is_valid());
            assert!(leaf.is_table());
            assert_eq!(leaf.output_address(), va);
            assert_eq!(leaf.mem_attr(), Some(MemAttr::NormalWb));
            assert_eq!(leaf.access_permission(), TTBL_AP_SRW_U);
            assert!(leaf.access_flag());
            assert!(leaf.is_non_secure());
            assert_eq!(leaf.shareability(), TTBL_SH_INNER_SHAREABLE);
        }
        assert_eq!(ctrl.lookup(0x9_0000), Err(TtblError::NotMapped));
        assert_eq!(ctrl.lookup(0x7_f000), Err(TtblError::NotMapped));
    }

    #[test]
    fn test_remap_is_idempotent() {
        let mut t = TestPool::<8>::new();
        let mut ctrl = t.init_ctrl();

        let req = MapRequest::new(0x4_0000, 0x4_4000, 0x8_0000, MemAttr::NormalWb, true);
        insert_mapping(&mut ctrl, &req);
        let count = ctrl.ttbl_count();
        let snapshot: Vec<u64> = (0..4).map(|i| ctrl.lookup(0x4_0000 + i * PAGE_SIZE).unwrap().raw()).collect();

        assert_eq!(insert_mapping(&mut ctrl, &req), 0);
        assert_eq!(ctrl.ttbl_count(), count);
        for (i, raw) in snapshot.iter().enumerate() {
            assert_eq!(ctrl.lookup(0x4_0000 + i * PAGE_SIZE).unwrap().raw(), *raw);
        }
    }

    #[test]
    fn test_first_writer_wins() {
        let mut t = TestPool::<8>::new();
        let mut ctrl = t.init_ctrl();

        let ro = MapRequest::new(0x4_0000, 0x4_1000, 0x8_0000, MemAttr::NormalWb, false);
        let rw = MapRequest::new(0x4_0000, 0x4_2000, 0x10_0000, MemAttr::NormalWb, true);
        assert_eq!(insert_mapping(&mut ctrl, &ro), 1);
        assert_eq!(insert_mapping(&mut ctrl, &rw), 1);

        let first = ctrl.lookup(0x4_0000).unwrap();
        assert_eq!(first.output_address(), 0x8_0000);
        assert_eq!(first.access_permission(), TTBL_AP_SR_U);
        assert!(!first.is_writable());

        let second = ctrl.lookup(0x4_1000).unwrap();
        assert_eq!(second.output_address(), 0x10_1000);
        assert!(second.is_writable());
    }

    #[test]
    fn test_intermediate_tables_are_reused() {
        let mut t = TestPool::<8>::new();
        let mut ctrl = t.init_ctrl();

        insert_mapping(&mut ctrl, &MapRequest::identity(0x8_0000, 0x8_1000, MemAttr::NormalWb, true));
        assert_eq!(ctrl.ttbl_count(), 3);

        // Same L1 and L2 slot.
        insert_mapping(&mut ctrl, &MapRequest::identity(0x10_0000, 0x10_1000, MemAttr::NormalWb, true));
        assert_eq!(ctrl.ttbl_count(), 3);

        // Same L1 slot, next L2 slot: one new L3 only.
        insert_mapping(&mut ctrl, &MapRequest::identity(0x20_0000, 0x20_1000, MemAttr::NormalWb, true));
        assert_eq!(ctrl.ttbl_count(), 4);
        assert_eq!(ctrl.ttbl_tree()[..4], [-1, 0, 1, 1]);
    }

    #[test]
    fn test_unaligned_bounds_are_truncated() {
        let mut t = TestPool::<8>::new();
        let mut ctrl = t.init_ctrl();

        let req = MapRequest::new(0x8_0123, 0x8_1001, 0x10_0456, MemAttr::NormalWb, true);
        assert_eq!(insert_mapping(&mut ctrl, &req), 2);
        assert_eq!(ctrl.lookup(0x8_0000).unwrap().output_address(), 0x10_0000);
        assert_eq!(ctrl.lookup(0x8_1000).unwrap().output_address(), 0x10_1000);
        assert_eq!(ctrl.lookup(0x8_2000), Err(TtblError::NotMapped));
    }

    #[test]
    fn test_empty_range_allocates_nothing() {
        let mut t = TestPool::<8>::new();
        let mut ctrl = t.init_ctrl();

        let req = MapRequest::identity(0x8_0000, 0x8_0000, MemAttr::NormalWb, true);
        assert_eq!(insert_mapping(&mut ctrl, &req), 0);
        assert_eq!(ctrl.ttbl_count(), 1);
    }

    #[test]
    fn test_device_leaf() {
        let mut t = TestPool::<8>::new();
        let mut ctrl = t.init_ctrl();

        let req = MapRequest::new(0x4_3000, 0x4_4000, 0x0900_0000, MemAttr::DeviceNgnre, true);
        insert_mapping(&mut ctrl, &req);
        let leaf = ctrl.lookup(0x4_3000).unwrap();
        assert_eq!(leaf.output_address(), 0x0900_0000);
        assert_eq!(leaf.mem_attr(), Some(MemAttr::DeviceNgnre));
        assert!(leaf.is_writable());
    }

    #[test]
    fn test_every_write_is_cleaned() {
        let mut t = TestPool::<8>::new();
        let mut ctrl = t.init_ctrl();
        let before = ctrl.cpu().clean_count();

        insert_mapping(&mut ctrl, &MapRequest::identity(0x8_0000, 0x8_1000, MemAttr::NormalWb, true));

        // Two zeroed tables with their tree slots, two table descriptors, one leaf.
        assert_eq!(ctrl.cpu().clean_count() - before, 2 * (TTBL_TABLE_ENTCNT + 1) + 2 + 1);
    }

    #[test]
    fn test_pool_sized_exactly() {
        let mut t = TestPool::<5>::new();
        let mut ctrl = t.init_ctrl();

        // Two L1 slots, each needing an L2 and an L3.
        insert_mapping(&mut ctrl, &MapRequest::identity(0x8_0000, 0x8_1000, MemAttr::NormalWb, true));
        insert_mapping(&mut ctrl, &MapRequest::identity(0x4000_0000, 0x4000_1000, MemAttr::NormalWb, true));
        assert_eq!(ctrl.ttbl_count(), 5);
        assert_eq!(ctrl.next_ttbl(), POOL_PA + 5 * PAGE_SIZE);
    }

    #[test]
    #[should_panic(expected = "entry cpu halted")]
    fn test_pool_one_short_halts() {
        let mut t = TestPool::<4>::new();
        let mut ctrl = t.init_ctrl();

        insert_mapping(&mut ctrl, &MapRequest::identity(0x8_0000, 0x8_1000, MemAttr::NormalWb, true));
        insert_mapping(&mut ctrl, &MapRequest::identity(0x4000_0000, 0x4000_1000, MemAttr::NormalWb, true));
    }

    #[test]
    #[should_panic(expected = "entry cpu halted")]
    fn test_block_descriptor_halts() {
        let mut t = TestPool::<8>::new();
        let mut ctrl = t.init_ctrl();

        let block = Descriptor::from_raw(0x4000_0000 | 0x401);
        ctrl.write_entry(POOL_PA, 0, block);
        insert_mapping(&mut ctrl, &MapRequest::identity(0x8_0000, 0x8_1000, MemAttr::NormalWb, true));
    }
}
