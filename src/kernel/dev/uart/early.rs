// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Early Debug Terminal
//!
//! Polling, transmit-only UART output for use right after the entry tables
//! are live and before any real console driver is up. The registers are
//! reached through the placeholder page the entry code maps onto the UART.
//!
//! # Supported UARTs
//!
//! - **PL011**: wait while FR.TXFF, write DR, wait while FR.BUSY
//! - **8250/16550**: wait for LSR.THRE, write THR. Registers are either
//!   byte-spaced (`reg_shift` 0, byte access) or word-spaced (`reg_shift` 2,
//!   32-bit access).
//! - **i.MX**: wait while UTS.TXFULL, write URTX0, wait for UTS.TXEMPTY
//! - **SCIF**: wait for SCFSR.TEND, write SCFTDR, then clear TEND and TDFE
//! - **BCM283x mini UART**: wait for LSR.TX_EMPTY, write IO
//! - **Zynq**: wait for SR.TXEMPTY, write the TX/RX FIFO

use core::fmt;
use core::ptr;

// ============================================================================
// PL011 Registers
// ============================================================================

const PL011_DR: usize = 0x00; // Data Register
const PL011_FR: usize = 0x18; // Flag Register

const PL011_FR_TXFF: u32 = 1 << 5; // TX FIFO Full
const PL011_FR_BUSY: u32 = 1 << 3; // UART Busy

// ============================================================================
// 8250 Registers
// ============================================================================

const UART8250_THR: usize = 0; // Transmit Holding Register
const UART8250_LSR: usize = 5; // Line Status Register

const UART8250_LSR_THRE: u32 = 1 << 5; // THR Empty

// ============================================================================
// i.MX Registers
// ============================================================================

const IMX_URTX0: usize = 0x40; // Transmitter Register
const IMX21_UTS: usize = 0xb4; // Test Register

const IMX_UTS_TXFULL: u32 = 1 << 4; // TX FIFO Full
const IMX_UTS_TXEMPTY: u32 = 1 << 6; // TX FIFO Empty

// ============================================================================
// SCIF Registers
// ============================================================================

const SCIF_SCFTDR: usize = 0x0c; // Transmit FIFO Data Register
const SCIF_SCFSR: usize = 0x10; // Serial Status Register

const SCIF_SCFSR_TEND: u16 = 1 << 6; // Transmission End
const SCIF_SCFSR_TDFE: u16 = 1 << 5; // Transmit FIFO Data Empty

// ============================================================================
// BCM283x Mini UART Registers
// ============================================================================

const BCM283X_MU_IO: usize = 0x00;
const BCM283X_MU_LSR: usize = 0x14;

const BCM283X_MU_LSR_TX_EMPTY: u16 = 1 << 5;

// ============================================================================
// Zynq UART Registers
// ============================================================================

const ZYNQ_UART_SR: usize = 0x2c; // Channel Status Register
const ZYNQ_UART_FIFO: usize = 0x30; // TX/RX FIFO

const ZYNQ_UART_SR_TXEMPTY: u16 = 1 << 3;

/// UART family driven by the early terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarlyUart {
    /// ARM PrimeCell PL011
    Pl011,
    /// 8250/16550 with registers spaced `1 << reg_shift` bytes apart
    Uart8250 { reg_shift: u8 },
    /// Freescale i.MX UART
    Imx,
    /// Renesas SCIF
    Scif,
    /// BCM283x auxiliary mini UART
    Bcm283xMu,
    /// Xilinx Zynq UART
    ZynqUart,
}

/// Early debug terminal bound to one UART
pub struct DeftermEarly {
    base: usize,
    uart: EarlyUart,
}

impl DeftermEarly {
    /// Bind the terminal to the UART registers at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be mapped onto the UART's MMIO registers for as long as
    /// the terminal is used.
    pub const unsafe fn new(base: usize, uart: EarlyUart) -> Self {
        Self { base, uart }
    }

    /// Register base address
    pub const fn base(&self) -> usize {
        self.base
    }

    /// UART family
    pub const fn uart(&self) -> EarlyUart {
        self.uart
    }

    /// Transmit one byte, spinning until the UART accepts it
    pub fn putc(&mut self, ch: u8) {
        match self.uart {
            EarlyUart::Pl011 => {
                while self.read32(PL011_FR) & PL011_FR_TXFF != 0 {
                    core::hint::spin_loop();
                }
                self.write8(PL011_DR, ch);
                while self.read32(PL011_FR) & PL011_FR_BUSY != 0 {
                    core::hint::spin_loop();
                }
            }
            EarlyUart::Uart8250 { reg_shift: 0 } => {
                while u32::from(self.read8(UART8250_LSR)) & UART8250_LSR_THRE == 0 {
                    core::hint::spin_loop();
                }
                self.write8(UART8250_THR, ch);
            }
            EarlyUart::Uart8250 { reg_shift } => {
                while self.read32(UART8250_LSR << reg_shift) & UART8250_LSR_THRE == 0 {
                    core::hint::spin_loop();
                }
                self.write32(UART8250_THR << reg_shift, u32::from(ch));
            }
            EarlyUart::Imx => {
                while self.read32(IMX21_UTS) & IMX_UTS_TXFULL != 0 {
                    core::hint::spin_loop();
                }
                self.write32(IMX_URTX0, u32::from(ch));
                while self.read32(IMX21_UTS) & IMX_UTS_TXEMPTY == 0 {
                    core::hint::spin_loop();
                }
            }
            EarlyUart::Scif => {
                while self.read16(SCIF_SCFSR) & SCIF_SCFSR_TEND == 0 {
                    core::hint::spin_loop();
                }
                self.write8(SCIF_SCFTDR, ch);
                let scfsr = self.read16(SCIF_SCFSR) & !(SCIF_SCFSR_TEND | SCIF_SCFSR_TDFE);
                self.write16(SCIF_SCFSR, scfsr);
            }
            EarlyUart::Bcm283xMu => {
                while self.read16(BCM283X_MU_LSR) & BCM283X_MU_LSR_TX_EMPTY == 0 {
                    core::hint::spin_loop();
                }
                self.write8(BCM283X_MU_IO, ch);
            }
            EarlyUart::ZynqUart => {
                while self.read16(ZYNQ_UART_SR) & ZYNQ_UART_SR_TXEMPTY == 0 {
                    core::hint::spin_loop();
                }
                self.write8(ZYNQ_UART_FIFO, ch);
            }
        }
    }

    /// Transmit a string, turning `\n` into `\r\n`
    pub fn puts(&mut self, s: &str) {
        for ch in s.bytes() {
            if ch == b'\n' {
                self.putc(b'\r');
            }
            self.putc(ch);
        }
    }

    #[inline]
    fn read8(&self, offset: usize) -> u8 {
        // SAFETY: `new` requires `base` to stay mapped onto the registers.
        unsafe { ptr::read_volatile((self.base + offset) as *const u8) }
    }

    #[inline]
    fn read16(&self, offset: usize) -> u16 {
        // SAFETY: as for `read8`.
        unsafe { ptr::read_volatile((self.base + offset) as *const u16) }
    }

    #[inline]
    fn read32(&self, offset: usize) -> u32 {
        // SAFETY: as for `read8`.
        unsafe { ptr::read_volatile((self.base + offset) as *const u32) }
    }

    #[inline]
    fn write8(&mut self, offset: usize, value: u8) {
        // SAFETY: as for `read8`.
        unsafe { ptr::write_volatile((self.base + offset) as *mut u8, value) }
    }

    #[inline]
    fn write16(&mut self, offset: usize, value: u16) {
        // SAFETY: as for `read8`.
        unsafe { ptr::write_volatile((self.base + offset) as *mut u16, value) }
    }

    #[inline]
    fn write32(&mut self, offset: usize, value: u32) {
        // SAFETY: as for `read8`.
        unsafe { ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }
}

impl fmt::Write for DeftermEarly {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.puts(s);
        Ok(())
    }
}
