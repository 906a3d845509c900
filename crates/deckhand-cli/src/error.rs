//! CLI error types with exit code handling
//!
//! Every failure a command can hit is folded into [`CliError`], which knows
//! the exit code it maps to. Library diagnostics are passed through so miette
//! still renders their codes, related errors and help text.

use deckhand_core::{CoreError, ValidationErrors};
use deckhand_engine::RenderError;
use deckhand_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// The configuration document failed validation
    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationErrors),

    /// Rendering failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Render(#[from] RenderError),

    /// Configuration could not be loaded or parsed
    #[error("Config error: {message}")]
    #[diagnostic(code(deckhand::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(deckhand::cli::io))]
    Io { message: String },

    /// Cluster communication failed
    #[error(transparent)]
    #[diagnostic(code(deckhand::cli::kube))]
    Kube(KubeError),

    /// The cluster refused a resource
    #[error("{resource} was rejected: {reason}")]
    #[diagnostic(code(deckhand::cli::rejected))]
    Rejected { resource: String, reason: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(deckhand::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation(_) => exit_codes::VALIDATION_ERROR,
            CliError::Render(RenderError::Core(
                CoreError::Io(_) | CoreError::ConfigNotFound { .. },
            )) => exit_codes::IO_ERROR,
            CliError::Render(RenderError::Core(_)) => exit_codes::CONFIG_ERROR,
            CliError::Render(_) => exit_codes::RENDER_ERROR,
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Kube(_) => exit_codes::ERROR,
            CliError::Rejected { .. } => exit_codes::REJECTED,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a config error with help text
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => CliError::from(e),
            CoreError::ConfigNotFound { path } => CliError::Io {
                message: format!("configuration file not found: {}", path),
            },
            CoreError::InvalidDocument { message } => CliError::config_with_help(
                message,
                "check the field names against the deckhand/v1 document format",
            ),
            other => CliError::Config {
                message: other.to_string(),
                help: None,
            },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Render(e) => CliError::Render(e),
            other => CliError::Kube(other),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
