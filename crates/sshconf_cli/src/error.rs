//! Error types for the command-line tool.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors raised by the CLI outside the storage and sync layers.
#[derive(Debug, Error)]
pub enum CliError {
    /// No username on the command line, in the environment or in settings.
    #[error("username required: pass --username or set SSHCONF_USERNAME")]
    MissingUsername,

    /// Deriving transport credentials failed.
    #[error("credential derivation failed: {0}")]
    Credentials(String),

    /// The settings file could not be read or written.
    #[error("settings file {path}: {source}")]
    Settings {
        /// Settings file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON.
    #[error("invalid settings: {0}")]
    InvalidSettings(#[from] serde_json::Error),

    /// Reading the password from the terminal failed.
    #[error("password prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    /// Building the HTTP client failed.
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

impl CliError {
    /// Creates a settings I/O error.
    pub fn settings(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Settings {
            path: path.into(),
            source,
        }
    }
}
