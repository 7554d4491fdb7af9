// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Build-Time Configuration
//!
//! The entry tables are sized and placed at build time; nothing here can be
//! changed at runtime.

use crate::kernel::dev::uart::early::EarlyUart;

/// Number of translation tables in the static entry pool.
///
/// Must cover the root plus every L2/L3 table the entry mappings need.
/// Running out halts the boot CPU.
pub const TTBL_INITIAL_TABLE_COUNT: usize = 8;

/// UART family driven by the early debug terminal
pub const DEFTERM_EARLY_UART: Option<EarlyUart> = if cfg!(feature = "defterm-early-pl011") {
    Some(EarlyUart::Pl011)
} else if cfg!(feature = "defterm-early-uart8250-8bit") {
    Some(EarlyUart::Uart8250 { reg_shift: 0 })
} else if cfg!(feature = "defterm-early-uart8250-32bit") {
    Some(EarlyUart::Uart8250 { reg_shift: 2 })
} else if cfg!(feature = "defterm-early-imx") {
    Some(EarlyUart::Imx)
} else if cfg!(feature = "defterm-early-scif") {
    Some(EarlyUart::Scif)
} else if cfg!(feature = "defterm-early-bcm283x-mu") {
    Some(EarlyUart::Bcm283xMu)
} else if cfg!(feature = "defterm-early-zynq-uart") {
    Some(EarlyUart::ZynqUart)
} else {
    None
};

/// Physical MMIO base of the early debug UART
///
/// Need not be page aligned; the register block is reached at the same
/// offset into the placeholder page.
#[cfg(feature = "defterm-early")]
pub const DEFTERM_EARLY_BASE_PA: usize = match DEFTERM_EARLY_UART {
    Some(EarlyUart::Pl011) | None => 0x0900_0000,
    Some(EarlyUart::Uart8250 { .. }) => 0x1000_0000,
    Some(EarlyUart::Imx) => 0x0202_0000,
    Some(EarlyUart::Scif) => 0xe6e6_0000,
    Some(EarlyUart::Bcm283xMu) => 0x3f21_5040,
    Some(EarlyUart::ZynqUart) => 0xe000_1000,
};

const _: () = assert!(TTBL_INITIAL_TABLE_COUNT >= 3, "need at least one L1, L2 and L3 table");
