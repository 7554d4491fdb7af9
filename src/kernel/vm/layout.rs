// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Hypervisor Image Layout
//!
//! During entry the image is reachable at two addresses: where the loader
//! put it (load address, physical) and where it was linked (execution
//! address, virtual). [`ImageLayout`] converts between the two.
//!
//! The layout is a plain `Copy` value handed down from the entry code. It is
//! never read from a global, because globals are not reachable at a
//! consistent address until relocation is finished.

use crate::kernel::arch::arm64::mmu::{TTBL_L3_BLOCK_SIZE, TTBL_L3_MAP_MASK};

/// Virtual address type
pub type VAddr = usize;

/// Physical address type
pub type PAddr = usize;

/// Entry mapping granule
pub const PAGE_SIZE: usize = TTBL_L3_BLOCK_SIZE;

/// Mask for the offset within a page
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Round an address down to its page
pub const fn page_align_down(addr: usize) -> usize {
    addr & TTBL_L3_MAP_MASK
}

/// Check page alignment
pub const fn is_page_aligned(addr: usize) -> bool {
    addr & PAGE_MASK == 0
}

/// Load and execution bounds of the hypervisor image
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLayout {
    /// First byte of the loaded image (physical)
    pub load_start: PAddr,
    /// End of the loaded image, exclusive
    pub load_end: PAddr,
    /// First byte of the linked image (virtual)
    pub exec_start: VAddr,
    /// End of the linked image, exclusive
    pub exec_end: VAddr,
}

impl ImageLayout {
    /// Create a layout from the four entry bounds
    pub const fn new(load_start: PAddr, load_end: PAddr, exec_start: VAddr, exec_end: VAddr) -> Self {
        Self {
            load_start,
            load_end,
            exec_start,
            exec_end,
        }
    }

    /// Load address for `va` if it lies in the execution range,
    /// otherwise `va` unchanged.
    #[inline(always)]
    pub const fn to_load_pa(&self, va: VAddr) -> PAddr {
        if self.exec_start <= va && va < self.exec_end {
            va - self.exec_start + self.load_start
        } else {
            va
        }
    }

    /// Execution address for `va` if it lies in the load range,
    /// otherwise `va` unchanged.
    #[inline(always)]
    pub const fn to_exec_va(&self, va: VAddr) -> VAddr {
        if self.load_start <= va && va < self.load_end {
            va - self.load_start + self.exec_start
        } else {
            va
        }
    }

    /// Check whether `addr` is inside the load range
    pub const fn in_load(&self, addr: PAddr) -> bool {
        self.load_start <= addr && addr < self.load_end
    }

    /// Check whether `addr` is inside the execution range
    pub const fn in_exec(&self, addr: VAddr) -> bool {
        self.exec_start <= addr && addr < self.exec_end
    }

    /// Size of the loaded image in bytes
    pub const fn load_size(&self) -> usize {
        self.load_end - self.load_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: ImageLayout = ImageLayout::new(0x8_0000, 0x9_0000, 0x4_0000, 0x5_0000);

    #[test]
    fn test_page_alignment() {
        assert_eq!(page_align_down(0x1000), 0x1000);
        assert_eq!(page_align_down(0x1fff), 0x1000);
        assert!(is_page_aligned(0x2000));
        assert!(!is_page_aligned(0x2001));
    }

    #[test]
    fn test_to_load_pa() {
        assert_eq!(LAYOUT.to_load_pa(0x4_0000), 0x8_0000);
        assert_eq!(LAYOUT.to_load_pa(0x4_1234), 0x8_1234);
        assert_eq!(LAYOUT.to_load_pa(0x4_ffff), 0x8_ffff);
        // End is exclusive.
        assert_eq!(LAYOUT.to_load_pa(0x5_0000), 0x5_0000);
        // Outside the image, e.g. MMIO.
        assert_eq!(LAYOUT.to_load_pa(0x0900_0000), 0x0900_0000);
        // Already a load address.
        assert_eq!(LAYOUT.to_load_pa(0x8_1000), 0x8_1000);
    }

    #[test]
    fn test_to_exec_va() {
        assert_eq!(LAYOUT.to_exec_va(0x8_0000), 0x4_0000);
        assert_eq!(LAYOUT.to_exec_va(0x8_f000), 0x4_f000);
        assert_eq!(LAYOUT.to_exec_va(0x9_0000), 0x9_0000);
        assert_eq!(LAYOUT.to_exec_va(0x4_2000), 0x4_2000);
    }

    #[test]
    fn test_translation_is_stable() {
        let a = 0x8_3456;
        let first = LAYOUT.to_exec_va(a);
        for _ in 0..4 {
            assert_eq!(LAYOUT.to_exec_va(a), first);
        }
        // Back to the same load address from the execution side.
        assert_eq!(LAYOUT.to_load_pa(first), a);
    }

    #[test]
    fn test_identity_layout() {
        let ident = ImageLayout::new(0x8_0000, 0x9_0000, 0x8_0000, 0x9_0000);
        assert_eq!(ident.to_load_pa(0x8_4000), 0x8_4000);
        assert_eq!(ident.to_exec_va(0x8_4000), 0x8_4000);
    }

    #[test]
    fn test_range_checks() {
        assert!(LAYOUT.in_load(0x8_0000));
        assert!(!LAYOUT.in_load(0x9_0000));
        assert!(LAYOUT.in_exec(0x4_ffff));
        assert!(!LAYOUT.in_exec(0x3_ffff));
        assert_eq!(LAYOUT.load_size(), 0x1_0000);
    }
}
