// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Hypervisor Entry Translation Tables
//!
//! Builds the initial stage-1 LPAE translation tables for the hypervisor
//! while the MMU is still off. The tables map:
//!
//! - the load image 1:1 (so execution survives the MMU switch),
//! - every linker section at its execution address, with the read-only
//!   sections marked non-writable,
//! - optionally, one page for an early debug UART.
//!
//! # Organization
//!
//! - [`kernel::arch::arm64::mmu`] - descriptor encoding
//! - [`kernel::vm::layout`] - load/execution address translation
//! - [`kernel::vm::bootalloc`] - static table pool and bump allocator
//! - [`kernel::vm::page_table`] - table walk and leaf insertion
//! - [`kernel::vm::boottables`] - the entry mapping sequence
//! - [`kernel::vm::walker`] - post-boot inspection of the entry tables

#![cfg_attr(not(test), no_std)]

#[cfg(all(not(test), target_os = "none"))]
use panic_halt as _;

#[macro_use]
mod trace;

pub mod config;
pub mod err;
pub mod kernel;

pub use err::{Result, TtblError};
pub use kernel::arch::arm64::mmu::{Descriptor, MemAttr};
pub use kernel::vm::bootalloc::{EntryCpu, EntryCtrl, Table, TablePool};
pub use kernel::vm::boottables::{setup_initial_ttbl, DeftermEarlyMap, EntryMap, LinkerSection};
pub use kernel::vm::layout::ImageLayout;
pub use kernel::vm::page_table::{insert_mapping, MapRequest};
