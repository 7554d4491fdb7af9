// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Translation Table Error Codes
//!
//! Only post-boot, read-only operations report errors. Running out of
//! entry tables is not an error value: it halts the boot CPU.

use core::fmt;

/// Translation table errors
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtblError {
    /// Malformed mapping request (e.g. an inverted range)
    InvalidArgs = 1,

    /// No valid descriptor for the address
    NotMapped = 6,

    /// Descriptor or tree contents that the entry code never produces
    BadState = 12,

    /// Table address outside the entry pool
    OutOfRange = 33,
}

impl TtblError {
    /// Convert to raw status code (negative, like `rx_status_t`)
    pub const fn as_raw(self) -> i32 {
        -(self as i32)
    }
}

impl fmt::Display for TtblError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            TtblError::InvalidArgs => "invalid mapping request",
            TtblError::NotMapped => "address not mapped",
            TtblError::BadState => "unexpected translation table contents",
            TtblError::OutOfRange => "table address outside entry pool",
        };
        f.write_str(msg)
    }
}

/// Result type for translation table operations
pub type Result<T = ()> = core::result::Result<T, TtblError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_codes_are_negative() {
        assert_eq!(TtblError::InvalidArgs.as_raw(), -1);
        assert_eq!(TtblError::NotMapped.as_raw(), -6);
        assert_eq!(TtblError::BadState.as_raw(), -12);
        assert_eq!(TtblError::OutOfRange.as_raw(), -33);
    }

    #[test]
    fn test_display() {
        assert_eq!(TtblError::NotMapped.to_string(), "address not mapped");
        assert_eq!(
            TtblError::OutOfRange.to_string(),
            "table address outside entry pool"
        );
    }
}
