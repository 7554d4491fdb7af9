// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Hypervisor Entry Kernel Modules

// Architecture module
pub mod arch;

// Device drivers
pub mod dev;

// Entry translation tables
pub mod vm;
