//! Error types and exit codes for portfoliograph

use std::process::ExitCode;
use thiserror::Error;

/// Main error type for portfolio pipeline operations
///
/// Malformed registry rows and degenerate community splits are not errors:
/// the extractor drops the former and the splitter accepts the latter as
/// terminal portfolios.
#[derive(Error, Debug)]
pub enum PortfolioError {
    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable { message: String },

    #[error("Search index rejected publish: {message}")]
    IndexPublishFailure { message: String },

    #[error("Export failed: {message}")]
    ExportError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PortfolioError {
    /// Convert error to an exit code for the invoking scheduler:
    /// - 0: Success
    /// - 1: IO error
    /// - 2: Configuration error
    /// - 3: Upstream store or standardizer unavailable
    /// - 4: Portfolio table or search index publish failure
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io(_) => ExitCode::from(1),
            Self::ConfigError { .. } => ExitCode::from(2),
            Self::UpstreamUnavailable { .. } => ExitCode::from(3),
            Self::IndexPublishFailure { .. } => ExitCode::from(4),
            Self::ExportError { .. } => ExitCode::from(4),
        }
    }

    pub(crate) fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            message: message.into(),
        }
    }

    pub(crate) fn export(message: impl Into<String>) -> Self {
        Self::ExportError {
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }
}

/// Result type alias for portfoliograph operations
pub type Result<T> = std::result::Result<T, PortfolioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_distinguish_retryable_failures() {
        let upstream = PortfolioError::upstream("db down");
        let publish = PortfolioError::IndexPublishFailure {
            message: "503".to_string(),
        };
        assert_eq!(upstream.exit_code(), ExitCode::from(3));
        assert_eq!(publish.exit_code(), ExitCode::from(4));
        assert_eq!(PortfolioError::config("bad").exit_code(), ExitCode::from(2));
    }

    #[test]
    fn test_error_messages() {
        let err = PortfolioError::upstream("connection refused");
        assert_eq!(err.to_string(), "Upstream unavailable: connection refused");
    }
}
