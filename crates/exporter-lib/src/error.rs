//! Error types for the guest-info binding.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for guest-info operations.
pub type Result<T> = std::result::Result<T, GuestLibError>;

/// Errors raised while loading or talking to the guest-info library.
#[derive(Error, Debug)]
pub enum GuestLibError {
    #[error("vmGuestLib not found (searched: {searched:?})")]
    LibraryNotFound { searched: Vec<PathBuf> },

    #[error("Failed to load {path:?}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("Missing symbol {symbol} in vmGuestLib: {reason}")]
    Symbol { symbol: &'static str, reason: String },

    #[error("vmGuestLib call {call} failed with code {code}: {message}")]
    Native {
        call: &'static str,
        code: u32,
        message: String,
    },
}

impl GuestLibError {
    /// Native status code, if this error came from a library call.
    pub fn code(&self) -> Option<u32> {
        match self {
            GuestLibError::Native { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True when the library reported that this host is not a VMware guest.
    pub fn is_not_a_guest(&self) -> bool {
        matches!(
            self.code(),
            Some(status::NOT_RUNNING_IN_VM) | Some(status::NOT_ENABLED)
        )
    }
}

/// `VMGuestLibError` status codes.
pub mod status {
    pub const SUCCESS: u32 = 0;
    pub const OTHER: u32 = 1;
    pub const NOT_RUNNING_IN_VM: u32 = 2;
    pub const NOT_ENABLED: u32 = 3;
    pub const NOT_AVAILABLE: u32 = 4;
    pub const NO_INFO: u32 = 5;
    pub const MEMORY: u32 = 6;
    pub const BUFFER_TOO_SMALL: u32 = 7;
    pub const INVALID_HANDLE: u32 = 8;
    pub const INVALID_ARG: u32 = 9;
    pub const UNSUPPORTED_VERSION: u32 = 10;

    /// Fallback description used when the library cannot describe a code.
    pub fn describe(code: u32) -> &'static str {
        match code {
            SUCCESS => "no error",
            OTHER => "other error",
            NOT_RUNNING_IN_VM => "not running in a VM",
            NOT_ENABLED => "guest statistics gathering is disabled",
            NOT_AVAILABLE => "requested statistic is not available",
            NO_INFO => "UpdateInfo has not been called",
            MEMORY => "out of memory",
            BUFFER_TOO_SMALL => "buffer too small",
            INVALID_HANDLE => "invalid handle",
            INVALID_ARG => "invalid argument",
            UNSUPPORTED_VERSION => "unsupported version",
            _ => "unknown error",
        }
    }
}
