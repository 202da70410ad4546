//! Exit codes for the ef CLI
//!
//! Scripts depend on these values; renumbering one is a breaking change.

/// Process exit codes.
///
/// Library errors are mapped here through [`ExitCode::from_error`] so every
/// command reports the same class of failure with the same code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Every item succeeded
    Success = 0,

    /// General/unspecified error
    GeneralError = 1,

    /// Invalid arguments, unreadable record file, bad configuration
    UsageError = 2,

    /// Network failure or timeout
    NetworkError = 3,

    /// Login, credential or permission failure
    AuthError = 4,

    /// Object or link not found
    NotFound = 5,

    /// The batch ran but at least one item failed
    PartialFailure = 6,

    /// Operation was interrupted (e.g., Ctrl+C)
    Interrupted = 130,
}

impl ExitCode {
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Create exit code from i32 value
    ///
    /// Returns None if the value doesn't correspond to a known exit code.
    pub const fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::GeneralError),
            2 => Some(Self::UsageError),
            3 => Some(Self::NetworkError),
            4 => Some(Self::AuthError),
            5 => Some(Self::NotFound),
            6 => Some(Self::PartialFailure),
            130 => Some(Self::Interrupted),
            _ => None,
        }
    }

    /// Exit code for a batch-level library error
    pub fn from_error(error: &ef_core::Error) -> Self {
        Self::from_i32(error.exit_code()).unwrap_or(Self::GeneralError)
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Success => "Operation completed successfully",
            Self::GeneralError => "General error",
            Self::UsageError => "Invalid arguments or configuration",
            Self::NetworkError => "Network error (retryable)",
            Self::AuthError => "Authentication or permission failure",
            Self::NotFound => "Resource not found",
            Self::PartialFailure => "Some items in the batch failed",
            Self::Interrupted => "Operation interrupted",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.as_i32()
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ef_core::Error;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::UsageError.as_i32(), 2);
        assert_eq!(ExitCode::AuthError.as_i32(), 4);
        assert_eq!(ExitCode::PartialFailure.as_i32(), 6);
        assert_eq!(ExitCode::Interrupted.as_i32(), 130);
    }

    #[test]
    fn test_exit_code_from_i32() {
        assert_eq!(ExitCode::from_i32(3), Some(ExitCode::NetworkError));
        assert_eq!(ExitCode::from_i32(6), Some(ExitCode::PartialFailure));
        assert_eq!(ExitCode::from_i32(7), None);
        assert_eq!(ExitCode::from_i32(99), None);
    }

    #[test]
    fn test_from_library_error() {
        assert_eq!(
            ExitCode::from_error(&Error::InvalidInput("empty".into())),
            ExitCode::UsageError
        );
        assert_eq!(
            ExitCode::from_error(&Error::CredentialAcquisition {
                scope: "POCLOUD".into(),
                message: "403".into(),
                transient: false,
            }),
            ExitCode::AuthError
        );
        assert_eq!(
            ExitCode::from_error(&Error::NoRetrievableLink("G1".into())),
            ExitCode::NotFound
        );
        assert_eq!(
            ExitCode::from_error(&Error::General("boom".into())),
            ExitCode::GeneralError
        );
    }

    #[test]
    fn test_exit_code_display() {
        let display = format!("{}", ExitCode::PartialFailure);
        assert!(display.contains("6"));
        assert!(display.contains("failed"));
    }
}
