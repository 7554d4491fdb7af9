// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ARM64 (AArch64) Architecture Implementation

// Descriptor format
pub mod mmu;

// Cache maintenance and halt for the entry path
#[cfg(target_arch = "aarch64")]
pub mod cache;

// Entry point, static table pool and linker sections
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub mod boot_mmu;

#[cfg(target_arch = "aarch64")]
pub use cache::{entry_barrier, Arm64EntryCpu};
