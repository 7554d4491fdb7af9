// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Trace and Logging Macros
//!
//! `LTRACEF!` is for the entry path. It compiles to nothing unless the
//! `ttbl-debug` feature is on, since the logger's own state is a global
//! that is not reachable at a consistent address before relocation.
//!
//! The `log_*!` macros are for code that runs after the MMU is on.

#![allow(unused_macros)]

/// Entry-path trace
macro_rules! LTRACEF {
    ($($arg:tt)*) => {
        #[cfg(feature = "ttbl-debug")]
        {
            log::trace!($($arg)*);
        }
        #[cfg(not(feature = "ttbl-debug"))]
        {
            let _ = format_args!($($arg)*);
        }
    };
}

/// Log a debug message
macro_rules! log_debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        {
            log::debug!($($arg)*);
        }
        #[cfg(not(feature = "log"))]
        {
            let _ = format_args!($($arg)*);
        }
    };
}

/// Log an info message
macro_rules! log_info {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        {
            log::info!($($arg)*);
        }
        #[cfg(not(feature = "log"))]
        {
            let _ = format_args!($($arg)*);
        }
    };
}

/// Log a warning message
macro_rules! log_warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        {
            log::warn!($($arg)*);
        }
        #[cfg(not(feature = "log"))]
        {
            let _ = format_args!($($arg)*);
        }
    };
}
