// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Architecture Support
//!
//! The LPAE descriptor format is plain bit layout and builds everywhere, so
//! the table code can be tested on the host. CPU access (cache maintenance,
//! barriers, system registers) is only compiled for AArch64.

pub mod arm64;
