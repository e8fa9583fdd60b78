//! # Error Types
//!
//! This module defines error types used throughout the parport-link library.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for parallel-port operations
#[derive(Debug, Error)]
pub enum LinkError {
    /// The I/O-port capability could not be acquired or released
    #[error("Permission error (ioperm): {0}")]
    Permission(#[source] io::Error),

    /// Missing, unknown or surplus command-line argument
    #[error("Argument error: {0}")]
    Argument(String),

    /// The peer still reported busy after the high nibble settled
    #[error("Character 0x{byte:02x} failed to send")]
    TransferFailed { byte: u8 },

    /// A bounded wait ran out before the peer answered
    #[error("Peer stalled: no handshake after {polls} polls ({waited:?})")]
    StalledPeer { polls: u64, waited: Duration },

    /// The session was interrupted (Ctrl+C)
    #[error("Interrupted")]
    Cancelled,

    /// Configuration file could not be read or parsed
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl LinkError {
    /// Process exit status for this error.
    ///
    /// Interrupts follow the shell convention of 128 + SIGINT.
    pub fn exit_code(&self) -> i32 {
        match self {
            LinkError::Cancelled => 130,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(LinkError::Cancelled.exit_code(), 130);
        assert_eq!(LinkError::Argument("x".into()).exit_code(), 1);
        assert_eq!(
            LinkError::StalledPeer {
                polls: 3,
                waited: Duration::ZERO
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn test_transfer_failed_message() {
        let err = LinkError::TransferFailed { byte: 0x48 };
        assert_eq!(err.to_string(), "Character 0x48 failed to send");
    }

    #[test]
    fn test_permission_keeps_os_reason() {
        let err = LinkError::Permission(io::Error::from_raw_os_error(libc::EPERM));
        assert!(err.to_string().starts_with("Permission error (ioperm):"));
    }
}
