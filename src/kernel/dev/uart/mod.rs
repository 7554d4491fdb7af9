// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! UART Drivers
//!
//! Only the polling, transmit-only early debug terminal lives here. It is
//! usable as soon as the entry tables map its placeholder page.

pub mod early;

// Re-exports
pub use early::{DeftermEarly, EarlyUart};
