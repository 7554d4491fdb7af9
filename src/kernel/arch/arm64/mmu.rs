//! Copyright 2025 The Rustux Authors
//! Copyright (c) 2014 Google Inc. All rights reserved
//!
//! Use of this source code is governed by a MIT-style
//! license that can be found in the LICENSE file or at
//! https://opensource.org/licenses/MIT
//!
//! LPAE long-descriptor format, 4KB granule, three levels (L1/L2/L3).
//!
//! Only the stage-1 lower attributes the entry tables need are encoded
//! here. Descriptors are composed in full before they are stored, so the
//! valid bit never becomes visible ahead of the other fields.

use bitflags::bitflags;

// Helper to create bit masks
const fn bm(base: u64, count: u64, val: u64) -> u64 {
    (val & ((1u64 << count) - 1)) << base
}

// Table geometry
pub const TTBL_TABLE_SIZE_SHIFT: usize = 12;
pub const TTBL_TABLE_SIZE: usize = 1 << TTBL_TABLE_SIZE_SHIFT;
pub const TTBL_TABLE_ENTCNT: usize = 512;

// Per-level index fields of a virtual address
pub const TTBL_L1_INDEX_MASK: usize = 0x0000_007f_c000_0000;
pub const TTBL_L1_INDEX_SHIFT: usize = 30;
pub const TTBL_L2_INDEX_MASK: usize = 0x0000_0000_3fe0_0000;
pub const TTBL_L2_INDEX_SHIFT: usize = 21;
pub const TTBL_L3_INDEX_MASK: usize = 0x0000_0000_001f_f000;
pub const TTBL_L3_INDEX_SHIFT: usize = 12;

// Leaf pages
pub const TTBL_L3_BLOCK_SHIFT: usize = 12;
pub const TTBL_L3_BLOCK_SIZE: usize = 1 << TTBL_L3_BLOCK_SHIFT;
pub const TTBL_L3_MAP_MASK: usize = !(TTBL_L3_BLOCK_SIZE - 1);

// Output address field
pub const TTBL_OUTADDR_MASK: u64 = bm(12, 36, 0xf_ffff_ffff);

// Stage-1 lower attribute fields
pub const TTBL_STAGE1_LOWER_AINDEX_SHIFT: u64 = 2;
pub const TTBL_STAGE1_LOWER_AINDEX_MASK: u64 = bm(2, 3, 0x7);
pub const TTBL_STAGE1_LOWER_AP_SHIFT: u64 = 6;
pub const TTBL_STAGE1_LOWER_AP_MASK: u64 = bm(6, 2, 0x3);
pub const TTBL_STAGE1_LOWER_SH_SHIFT: u64 = 8;
pub const TTBL_STAGE1_LOWER_SH_MASK: u64 = bm(8, 2, 0x3);

// Access permissions
pub const TTBL_AP_SRW_U: u64 = 0x0;
pub const TTBL_AP_SRW_URW: u64 = 0x1;
pub const TTBL_AP_SR_U: u64 = 0x2;
pub const TTBL_AP_SR_UR: u64 = 0x3;

// Shareability
pub const TTBL_SH_NON_SHAREABLE: u64 = 0x0;
pub const TTBL_SH_OUTER_SHAREABLE: u64 = 0x2;
pub const TTBL_SH_INNER_SHAREABLE: u64 = 0x3;

// Memory attributes, one byte per attribute index
pub const MMU_MAIR_ATTR0: u64 = bm(0, 8, 0x00); // Device-nGnRnE memory
pub const MMU_MAIR_ATTR1: u64 = bm(8, 8, 0x04); // Device-nGnRE memory
pub const MMU_MAIR_ATTR2: u64 = bm(16, 8, 0xff); // Normal Memory
pub const MMU_MAIR_ATTR3: u64 = bm(24, 8, 0x44); // Normal Uncached Memory

pub const MMU_MAIR_VAL: u64 = MMU_MAIR_ATTR0 | MMU_MAIR_ATTR1 | MMU_MAIR_ATTR2 | MMU_MAIR_ATTR3;

const _: () = assert!(TTBL_TABLE_ENTCNT * core::mem::size_of::<u64>() == TTBL_TABLE_SIZE);
const _: () = assert!(TTBL_L3_INDEX_MASK >> TTBL_L3_INDEX_SHIFT == TTBL_TABLE_ENTCNT - 1);

bitflags! {
    /// Single-bit descriptor fields
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DescFlags: u64 {
        /// Walk stops here when clear
        const VALID = 1 << 0;
        /// Table descriptor at L1/L2, page descriptor at L3
        const TABLE = 1 << 1;
        /// Non-secure output address
        const NS = 1 << 5;
        /// Access flag, set up front so the first access does not fault
        const AF = 1 << 10;
        /// Not global
        const NG = 1 << 11;
        /// Privileged execute-never
        const PXN = 1 << 53;
        /// Execute-never
        const XN = 1 << 54;
    }
}

/// Memory attribute index, selecting one byte of [`MMU_MAIR_VAL`]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemAttr {
    /// Device-nGnRnE
    DeviceNgnrne = 0,
    /// Device-nGnRE, used for early MMIO
    DeviceNgnre = 1,
    /// Normal, inner/outer write-back
    NormalWb = 2,
    /// Normal, non-cacheable
    NormalNc = 3,
}

impl MemAttr {
    /// Decode a 3-bit attribute index
    pub const fn from_index(index: u64) -> Option<Self> {
        match index {
            0 => Some(MemAttr::DeviceNgnrne),
            1 => Some(MemAttr::DeviceNgnre),
            2 => Some(MemAttr::NormalWb),
            3 => Some(MemAttr::NormalNc),
            _ => None,
        }
    }

    /// Attribute index as written to a descriptor
    pub const fn index(self) -> u64 {
        self as u64
    }

    /// True for device (MMIO) memory types
    pub const fn is_device(self) -> bool {
        matches!(self, MemAttr::DeviceNgnrne | MemAttr::DeviceNgnre)
    }
}

/// One 64-bit translation table descriptor
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Descriptor(u64);

impl Descriptor {
    /// Invalid descriptor
    pub const INVALID: Descriptor = Descriptor(0);

    /// Wrap a raw descriptor value
    pub const fn from_raw(raw: u64) -> Self {
        Descriptor(raw)
    }

    /// Raw descriptor value
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Table descriptor pointing at the next-level table at `next_table`.
    ///
    /// `next_table` must already be table aligned; it is not re-checked.
    pub const fn new_table(next_table: usize) -> Self {
        Descriptor(
            (next_table as u64 & TTBL_OUTADDR_MASK)
                | DescFlags::TABLE.bits()
                | DescFlags::VALID.bits(),
        )
    }

    /// L3 page descriptor mapping the page at `out_addr`.
    ///
    /// Access flag, non-secure and inner-shareable are always set. Read-only
    /// pages use `TTBL_AP_SR_U`, writable ones `TTBL_AP_SRW_U`. `out_addr`
    /// must already be page aligned; it is not re-checked.
    pub const fn new_page(out_addr: usize, attr: MemAttr, writable: bool) -> Self {
        let ap = if writable { TTBL_AP_SRW_U } else { TTBL_AP_SR_U };
        Descriptor(
            (out_addr as u64 & TTBL_OUTADDR_MASK)
                | DescFlags::AF.bits()
                | (ap << TTBL_STAGE1_LOWER_AP_SHIFT)
                | ((attr.index() << TTBL_STAGE1_LOWER_AINDEX_SHIFT) & TTBL_STAGE1_LOWER_AINDEX_MASK)
                | DescFlags::NS.bits()
                | (TTBL_SH_INNER_SHAREABLE << TTBL_STAGE1_LOWER_SH_SHIFT)
                | DescFlags::TABLE.bits()
                | DescFlags::VALID.bits(),
        )
    }

    /// Single-bit fields present in this descriptor
    pub const fn flags(self) -> DescFlags {
        DescFlags::from_bits_truncate(self.0)
    }

    /// Check the valid bit
    pub const fn is_valid(self) -> bool {
        self.0 & DescFlags::VALID.bits() != 0
    }

    /// Check the table bit (table at L1/L2, page at L3)
    pub const fn is_table(self) -> bool {
        self.0 & DescFlags::TABLE.bits() != 0
    }

    /// Next-level table or mapped page address
    pub const fn output_address(self) -> usize {
        (self.0 & TTBL_OUTADDR_MASK) as usize
    }

    /// Raw attribute index field
    pub const fn attr_index(self) -> u64 {
        (self.0 & TTBL_STAGE1_LOWER_AINDEX_MASK) >> TTBL_STAGE1_LOWER_AINDEX_SHIFT
    }

    /// Decoded memory attribute, if the index is one we define
    pub const fn mem_attr(self) -> Option<MemAttr> {
        MemAttr::from_index(self.attr_index())
    }

    /// Raw access permission field
    pub const fn access_permission(self) -> u64 {
        (self.0 & TTBL_STAGE1_LOWER_AP_MASK) >> TTBL_STAGE1_LOWER_AP_SHIFT
    }

    /// Check whether privileged writes are allowed
    pub const fn is_writable(self) -> bool {
        let ap = self.access_permission();
        ap == TTBL_AP_SRW_U || ap == TTBL_AP_SRW_URW
    }

    /// Raw shareability field
    pub const fn shareability(self) -> u64 {
        (self.0 & TTBL_STAGE1_LOWER_SH_MASK) >> TTBL_STAGE1_LOWER_SH_SHIFT
    }

    /// Check the non-secure bit
    pub const fn is_non_secure(self) -> bool {
        self.0 & DescFlags::NS.bits() != 0
    }

    /// Check the access flag
    pub const fn access_flag(self) -> bool {
        self.0 & DescFlags::AF.bits() != 0
    }
}

impl core::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Descriptor")
            .field("raw", &format_args!("{:#018x}", self.0))
            .field("out", &format_args!("{:#x}", self.output_address()))
            .field("flags", &self.flags())
            .finish()
    }
}

/// L1 index of a virtual address
pub const fn l1_index(va: usize) -> usize {
    (va & TTBL_L1_INDEX_MASK) >> TTBL_L1_INDEX_SHIFT
}

/// L2 index of a virtual address
pub const fn l2_index(va: usize) -> usize {
    (va & TTBL_L2_INDEX_MASK) >> TTBL_L2_INDEX_SHIFT
}

/// L3 index of a virtual address
pub const fn l3_index(va: usize) -> usize {
    (va & TTBL_L3_INDEX_MASK) >> TTBL_L3_INDEX_SHIFT
}
