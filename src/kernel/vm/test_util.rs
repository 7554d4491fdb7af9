// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Host test support for the entry table code

use core::cell::RefCell;

use crate::kernel::vm::bootalloc::{EntryCpu, EntryCtrl, TablePool};

/// Descriptor address given to the test pools
pub(crate) const POOL_PA: usize = 0x4010_0000;

/// CPU stand-in: records cache maintenance, panics on halt
pub(crate) struct MockCpu {
    cleaned: RefCell<Vec<usize>>,
}

impl MockCpu {
    pub(crate) fn new() -> Self {
        Self {
            cleaned: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn clean_count(&self) -> usize {
        self.cleaned.borrow().len()
    }

    pub(crate) fn was_cleaned(&self, addr: usize) -> bool {
        self.cleaned.borrow().contains(&addr)
    }

    pub(crate) fn last_cleaned(&self) -> Option<usize> {
        self.cleaned.borrow().last().copied()
    }
}

impl EntryCpu for MockCpu {
    fn clean_invalidate(&self, addr: usize) {
        self.cleaned.borrow_mut().push(addr);
    }

    fn halt(&self) -> ! {
        panic!("entry cpu halted");
    }
}

/// Heap-backed pool, tree and mock CPU for one test
pub(crate) struct TestPool<const N: usize> {
    pub(crate) cpu: MockCpu,
    pub(crate) pool: Box<TablePool<N>>,
    pub(crate) tree: [i32; N],
}

impl<const N: usize> TestPool<N> {
    pub(crate) fn new() -> Self {
        Self {
            cpu: MockCpu::new(),
            pool: Box::new(TablePool::new()),
            tree: [0; N],
        }
    }

    pub(crate) fn init_ctrl(&mut self) -> EntryCtrl<'_, MockCpu, N> {
        EntryCtrl::init(&mut self.pool, &mut self.tree, POOL_PA, &self.cpu)
    }
}
