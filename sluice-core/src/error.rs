//! Error types for Sluice core operations.
//!
//! All errors are handled explicitly; nothing is silently ignored.

use std::fmt;

/// The result type for Sluice core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Sluice core operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An invalid argument was provided.
    InvalidArgument {
        /// The name of the argument.
        name: &'static str,
        /// Why it was invalid.
        reason: &'static str,
    },

    /// An address argument could not be parsed or resolved.
    InvalidAddress {
        /// The address as given by the user.
        input: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A resource limit was exceeded.
    LimitExceeded {
        /// Which limit was exceeded.
        limit: &'static str,
        /// The maximum allowed value.
        max: u64,
        /// The actual value that exceeded the limit.
        actual: u64,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument { name, reason } => {
                write!(f, "invalid argument '{name}': {reason}")
            }
            Self::InvalidAddress { input, reason } => {
                write!(f, "invalid address '{input}': {reason}")
            }
            Self::LimitExceeded { limit, max, actual } => {
                write!(f, "limit exceeded: {limit} (max={max}, actual={actual})")
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_address_display() {
        let err = Error::InvalidAddress {
            input: "host:99999".to_string(),
            reason: "port value is too big",
        };
        assert_eq!(
            format!("{err}"),
            "invalid address 'host:99999': port value is too big"
        );
    }

    #[test]
    fn test_limit_exceeded_display() {
        let err = Error::LimitExceeded {
            limit: "channel_capacity_bytes",
            max: 1024,
            actual: 2048,
        };
        let msg = format!("{err}");
        assert!(msg.contains("channel_capacity_bytes"));
        assert!(msg.contains("1024"));
        assert!(msg.contains("2048"));
    }
}
