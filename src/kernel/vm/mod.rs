// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Entry Virtual Memory
//!
//! Translation table construction for the hypervisor entry path. Everything
//! here is architecture-neutral apart from the descriptor format, which
//! comes from [`crate::kernel::arch::arm64::mmu`], and builds on the host.
//!
//! # Organization
//!
//! - [`layout`] - Load/execution address translation
//! - [`bootalloc`] - Static table pool and bump allocator
//! - [`page_table`] - Range insertion into the 3-level hierarchy
//! - [`boottables`] - The entry mapping sequence
//! - [`walker`] - Post-boot walk and tree inspection

pub mod bootalloc;
pub mod boottables;
pub mod layout;
pub mod page_table;
pub mod walker;

#[cfg(test)]
pub(crate) mod test_util;

// Re-exports for convenience
pub use layout::{is_page_aligned, page_align_down, ImageLayout, PAddr, VAddr, PAGE_MASK, PAGE_SIZE};

pub use bootalloc::{EntryCpu, EntryCtrl, Table, TablePool, TTBL_TREE_NO_PARENT};

pub use page_table::{insert_mapping, MapRequest};

pub use boottables::{setup_initial_ttbl, DeftermEarlyMap, EntryMap, LinkerSection, RO_SECTION_NAMES};

pub use walker::{entry_ttbl, publish_entry_ttbl, walk, EntryTtblRecord, TableInfo, TreeIter};
