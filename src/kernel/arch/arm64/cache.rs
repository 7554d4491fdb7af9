// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ARM64 Entry CPU Services
//!
//! Cache maintenance by address and the terminal halt loop, both usable
//! with the MMU and data cache disabled.

use aarch64_cpu::asm::{self, barrier};

use crate::kernel::vm::bootalloc::EntryCpu;

/// The boot CPU as seen by the entry table code
#[derive(Debug, Clone, Copy, Default)]
pub struct Arm64EntryCpu;

impl EntryCpu for Arm64EntryCpu {
    #[inline(always)]
    fn clean_invalidate(&self, addr: usize) {
        // SAFETY: DC CIVAC only performs cache maintenance on the line
        // holding `addr`; it does not access memory through it.
        unsafe {
            core::arch::asm!("dc civac, {addr}", addr = in(reg) addr, options(nostack, preserves_flags));
        }
    }

    #[inline(always)]
    fn halt(&self) -> ! {
        loop {
            asm::wfe();
        }
    }
}

/// Make the table writes visible before the MMU is turned on
#[inline(always)]
pub fn entry_barrier() {
    barrier::dsb(barrier::SY);
    barrier::isb(barrier::SY);
}
