//! CLI-specific error types and exit code mapping

use compscan_core::error::CompscanError;
use compscan_core::types::ResultCode;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The scan completed with a non-success result code.
    #[error("scan finished with result code '{code}'")]
    ScanFailed {
        /// Aggregated scan result code
        code: ResultCode,
    },

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from compscan-core.
    #[error("{0}")]
    Core(#[from] CompscanError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                   |
    /// |------|-------------------------------------------|
    /// | 0    | Success / partial success                 |
    /// | 1    | General / command / detector error        |
    /// | 2    | Configuration or input error              |
    /// | 3    | Detector timeout (fatal for the scan)     |
    /// | 10   | IO error                                  |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Core(CompscanError::Config(_) | CompscanError::Input(_)) => 2,
            Self::ScanFailed { code } => match code {
                ResultCode::InputError => 2,
                ResultCode::TimeoutError => 3,
                _ => 1,
            },
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}
