//! Common error type used throughout marquee.

/// Errors returned by streaming primitives when they are driven incorrectly.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An operation was invoked in a state that forbids it.
    ///
    /// These are integration bugs, never user-recoverable conditions.
    #[error("Misuse: {0}")]
    Misuse(String),

    /// Invalid input was provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Create a new Misuse error.
    pub fn misuse<S: Into<String>>(msg: S) -> Self {
        Self::Misuse(msg.into())
    }

    /// Create a new InvalidInput error.
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// True for programmer errors that should fail loudly.
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::Misuse(_))
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::misuse("attach from Playing").to_string(),
            "Misuse: attach from Playing"
        );
        assert_eq!(
            Error::invalid_input("empty stream url").to_string(),
            "Invalid input: empty stream url"
        );
    }

    #[test]
    fn test_is_misuse() {
        assert!(Error::misuse("x").is_misuse());
        assert!(!Error::invalid_input("x").is_misuse());
    }
}
