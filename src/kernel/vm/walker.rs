// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Entry Table Walker and Tree Inspection
//!
//! Read-only views of the entry translation tables for use once the boot CPU
//! is running with the MMU on:
//! - software VA walk over the pool
//! - iteration over the parent tree
//! - a validated summary of the tree, published once for later consumers
//!
//! Table addresses found in descriptors are resolved to pool indices, so a
//! walk never dereferences a descriptor's output address.

use spin::Once;

use crate::err::{Result, TtblError};
use crate::kernel::arch::arm64::mmu::{l1_index, l2_index, l3_index, Descriptor, TTBL_TABLE_SIZE_SHIFT};
use crate::kernel::vm::bootalloc::{Table, TTBL_TREE_NO_PARENT};
use crate::kernel::vm::layout::{is_page_aligned, PAddr, VAddr, PAGE_MASK};

/// Number of translation levels built at entry
pub const TTBL_LEVELS: u8 = 3;

/// ============================================================================
/// VA Walk
/// ============================================================================

fn table_at(tables: &[Table], ttbl_base: PAddr, table: PAddr) -> Result<&Table> {
    if table < ttbl_base {
        return Err(TtblError::OutOfRange);
    }
    tables
        .get((table - ttbl_base) >> TTBL_TABLE_SIZE_SHIFT)
        .ok_or(TtblError::OutOfRange)
}

fn next_level(tables: &[Table], ttbl_base: PAddr, desc: Descriptor) -> Result<&Table> {
    if !desc.is_valid() {
        return Err(TtblError::NotMapped);
    }
    if !desc.is_table() {
        return Err(TtblError::BadState);
    }
    table_at(tables, ttbl_base, desc.output_address())
}

/// Walk the entry tables for `va` and return its L3 leaf.
///
/// # Arguments
///
/// * `tables` - Used pool tables, root first
/// * `ttbl_base` - Descriptor address of `tables[0]`
/// * `va` - Virtual address to look up
///
/// # Errors
///
/// * `NotMapped` - an invalid descriptor on the way down
/// * `BadState` - a block descriptor at L1/L2, or a reserved one at L3
/// * `OutOfRange` - a table descriptor pointing outside `tables`
pub fn walk(tables: &[Table], ttbl_base: PAddr, va: VAddr) -> Result<Descriptor> {
    let l1 = table_at(tables, ttbl_base, ttbl_base)?;
    let l2 = next_level(tables, ttbl_base, l1.entry(l1_index(va)))?;
    let l3 = next_level(tables, ttbl_base, l2.entry(l2_index(va)))?;

    let leaf = l3.entry(l3_index(va));
    if !leaf.is_valid() {
        return Err(TtblError::NotMapped);
    }
    if !leaf.is_table() {
        return Err(TtblError::BadState);
    }
    Ok(leaf)
}

/// Translate `va` to the physical address the entry tables map it to
pub fn translate(tables: &[Table], ttbl_base: PAddr, va: VAddr) -> Result<PAddr> {
    let leaf = walk(tables, ttbl_base, va)?;
    Ok(leaf.output_address() | (va & PAGE_MASK))
}

/// ============================================================================
/// Parent Tree
/// ============================================================================

/// One used table of the entry pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableInfo {
    /// Pool index
    pub index: usize,
    /// Pool index of the parent, `None` for the root
    pub parent: Option<usize>,
    /// Translation level (root is 1)
    pub level: u8,
}

/// Iterator over the used tables recorded in a parent tree
///
/// The root is always yielded first. Iteration stops at the first unused
/// slot after it. Levels are only meaningful for a tree that passed
/// [`EntryTtblRecord::from_tree`].
pub struct TreeIter<'a> {
    tree: &'a [i32],
    next: usize,
}

impl<'a> TreeIter<'a> {
    pub fn new(tree: &'a [i32]) -> Self {
        Self { tree, next: 0 }
    }

    fn level_of(&self, mut index: usize) -> u8 {
        let mut level = 1u8;
        // Bounded by the tree length so a cycle cannot spin forever.
        for _ in 0..self.tree.len() {
            match parent_of(self.tree[index]) {
                Some(parent) if parent < self.tree.len() => {
                    index = parent;
                    level = level.saturating_add(1);
                }
                _ => break,
            }
        }
        level
    }
}

impl<'a> Iterator for TreeIter<'a> {
    type Item = TableInfo;

    fn next(&mut self) -> Option<TableInfo> {
        let index = self.next;
        let slot = *self.tree.get(index)?;
        if index > 0 && slot == TTBL_TREE_NO_PARENT {
            return None;
        }
        self.next += 1;
        Some(TableInfo {
            index,
            parent: if index == 0 { None } else { parent_of(slot) },
            level: self.level_of(index),
        })
    }
}

fn parent_of(slot: i32) -> Option<usize> {
    usize::try_from(slot).ok()
}

/// ============================================================================
/// Entry Table Record
/// ============================================================================

/// Validated summary of the entry translation tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryTtblRecord {
    /// Address of the root table
    pub ttbl_base: PAddr,
    /// Tables in use, root included
    pub ttbl_count: usize,
    /// L2 tables in use
    pub l2_count: usize,
    /// L3 tables in use
    pub l3_count: usize,
    /// Deepest level reached
    pub max_level: u8,
}

impl EntryTtblRecord {
    /// Check the parent tree left by the entry code and summarize it.
    ///
    /// The tree must have a root in slot 0, used slots forming a prefix,
    /// every parent preceding its child, and no table deeper than L3.
    pub fn from_tree(ttbl_base: PAddr, tree: &[i32]) -> Result<Self> {
        if !is_page_aligned(ttbl_base) {
            return Err(TtblError::InvalidArgs);
        }
        match tree.first() {
            Some(&TTBL_TREE_NO_PARENT) => {}
            _ => return Err(TtblError::BadState),
        }

        let mut record = Self {
            ttbl_base,
            ttbl_count: 0,
            l2_count: 0,
            l3_count: 0,
            max_level: 0,
        };

        for info in TreeIter::new(tree) {
            if info.index > 0 {
                match info.parent {
                    Some(parent) if parent < info.index => {}
                    _ => return Err(TtblError::BadState),
                }
            }
            if info.level > TTBL_LEVELS {
                return Err(TtblError::BadState);
            }
            match info.level {
                2 => record.l2_count += 1,
                3 => record.l3_count += 1,
                _ => {}
            }
            record.ttbl_count += 1;
            record.max_level = record.max_level.max(info.level);
        }

        if tree[record.ttbl_count..].iter().any(|&slot| slot != TTBL_TREE_NO_PARENT) {
            return Err(TtblError::BadState);
        }

        Ok(record)
    }

    /// Pool index of the table at descriptor address `table`
    pub fn table_index(&self, table: PAddr) -> Result<usize> {
        if table < self.ttbl_base {
            return Err(TtblError::OutOfRange);
        }
        let index = (table - self.ttbl_base) >> TTBL_TABLE_SIZE_SHIFT;
        if index >= self.ttbl_count {
            return Err(TtblError::OutOfRange);
        }
        Ok(index)
    }
}

static ENTRY_TTBL: Once<EntryTtblRecord> = Once::new();

/// Publish the entry table record. Only the first call has any effect.
pub fn publish_entry_ttbl(record: EntryTtblRecord) -> &'static EntryTtblRecord {
    let published = ENTRY_TTBL.call_once(|| record);
    if *published != record {
        log_warn!("entry ttbl: record already published at {:#x}", published.ttbl_base);
    } else {
        log_info!(
            "entry ttbl: root {:#x}, {} tables ({} L2, {} L3)",
            published.ttbl_base,
            published.ttbl_count,
            published.l2_count,
            published.l3_count
        );
    }
    published
}

/// The published entry table record, if any
pub fn entry_ttbl() -> Option<&'static EntryTtblRecord> {
    ENTRY_TTBL.get()
}

/// Log every used table of `tree`
pub fn dump_tree(tree: &[i32]) {
    for info in TreeIter::new(tree) {
        match info.parent {
            Some(parent) => {
                log_debug!("  ttbl[{}] L{} parent {}", info.index, info.level, parent);
            }
            None => {
                log_debug!("  ttbl[{}] L{} root", info.index, info.level);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::arch::arm64::mmu::MemAttr;
    use crate::kernel::vm::page_table::{insert_mapping, MapRequest};
    use crate::kernel::vm::test_util::{TestPool, POOL_PA};

    #[test]
    fn test_walk_and_translate() {
        let mut t = TestPool::<8>::new();
        let mut ctrl = t.init_ctrl();
        insert_mapping(&mut ctrl, &MapRequest::new(0x4_0000, 0x4_2000, 0x8_0000, MemAttr::NormalWb, false));

        let leaf = walk(ctrl.tables(), POOL_PA, 0x4_1000).unwrap();
        assert_eq!(leaf.output_address(), 0x8_1000);
        assert!(!leaf.is_writable());
        assert_eq!(translate(ctrl.tables(), POOL_PA, 0x4_1abc), Ok(0x8_1abc));
    }

    #[test]
    fn test_walk_errors() {
        let mut t = TestPool::<8>::new();
        let mut ctrl = t.init_ctrl();
        assert_eq!(walk(ctrl.tables(), POOL_PA, 0x4_0000), Err(TtblError::NotMapped));

        insert_mapping(&mut ctrl, &MapRequest::identity(0x8_0000, 0x8_1000, MemAttr::NormalWb, true));
        // Wrong base: the root's table descriptor now points outside the slice.
        assert_eq!(walk(ctrl.tables(), POOL_PA + 0x10_0000, 0x8_0000), Err(TtblError::OutOfRange));

        // Block descriptor at L1.
        ctrl.write_entry(POOL_PA, 1, Descriptor::from_raw(0x4000_0000 | 0x401));
        assert_eq!(walk(ctrl.tables(), POOL_PA, 0x4000_0000), Err(TtblError::BadState));
    }

    #[test]
    fn test_tree_iter() {
        let tree = [-1, 0, 1, 1, -1, -1];
        let infos: Vec<TableInfo> = TreeIter::new(&tree).collect();
        assert_eq!(
            infos,
            [
                TableInfo { index: 0, parent: None, level: 1 },
                TableInfo { index: 1, parent: Some(0), level: 2 },
                TableInfo { index: 2, parent: Some(1), level: 3 },
                TableInfo { index: 3, parent: Some(1), level: 3 },
            ]
        );
        assert_eq!(TreeIter::new(&[]).count(), 0);
    }

    #[test]
    fn test_record_from_tree() {
        let record = EntryTtblRecord::from_tree(POOL_PA, &[-1, 0, 1, 0, 3, -1, -1, -1]).unwrap();
        assert_eq!(record.ttbl_count, 5);
        assert_eq!(record.l2_count, 2);
        assert_eq!(record.l3_count, 2);
        assert_eq!(record.max_level, 3);
        assert_eq!(record.table_index(POOL_PA + 0x4000), Ok(4));
        assert_eq!(record.table_index(POOL_PA + 0x5000), Err(TtblError::OutOfRange));
    }

    #[test]
    fn test_record_matches_built_tables() {
        let mut t = TestPool::<8>::new();
        let mut ctrl = t.init_ctrl();
        insert_mapping(&mut ctrl, &MapRequest::identity(0x8_0000, 0x9_0000, MemAttr::NormalWb, true));
        insert_mapping(&mut ctrl, &MapRequest::new(0x4000_0000, 0x4000_1000, 0x8_0000, MemAttr::NormalWb, true));

        let record = EntryTtblRecord::from_tree(ctrl.root(), ctrl.ttbl_tree()).unwrap();
        assert_eq!(record.ttbl_count, ctrl.ttbl_count());
        assert_eq!(record.l2_count, 2);
        assert_eq!(record.l3_count, 2);
    }

    #[test]
    fn test_record_rejects_bad_trees() {
        assert_eq!(EntryTtblRecord::from_tree(POOL_PA + 8, &[-1]), Err(TtblError::InvalidArgs));
        assert_eq!(EntryTtblRecord::from_tree(POOL_PA, &[]), Err(TtblError::BadState));
        assert_eq!(EntryTtblRecord::from_tree(POOL_PA, &[0, 0]), Err(TtblError::BadState));
        // Parent after child.
        assert_eq!(EntryTtblRecord::from_tree(POOL_PA, &[-1, 2, 0]), Err(TtblError::BadState));
        // Hole in the used prefix.
        assert_eq!(EntryTtblRecord::from_tree(POOL_PA, &[-1, 0, -1, 1]), Err(TtblError::BadState));
        // Deeper than L3.
        assert_eq!(EntryTtblRecord::from_tree(POOL_PA, &[-1, 0, 1, 2]), Err(TtblError::BadState));
    }

    #[test]
    fn test_publish_once() {
        let first = EntryTtblRecord::from_tree(POOL_PA, &[-1, 0, 1]).unwrap();
        let second = EntryTtblRecord::from_tree(POOL_PA, &[-1, 0, 1, 1]).unwrap();

        assert_eq!(*publish_entry_ttbl(first), first);
        assert_eq!(*publish_entry_ttbl(second), first);
        assert_eq!(entry_ttbl(), Some(&first));
    }
}
