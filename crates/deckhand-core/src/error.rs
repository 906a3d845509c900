//! Core error types

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Values merge error: {message}")]
    ValuesMerge { message: String },

    #[error("Invalid configuration document: {message}")]
    InvalidDocument { message: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// What a dangling reference pointed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Secret,
    SecretKey,
    Service,
    Port,
    Route,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Secret => "secret",
            Self::SecretKey => "secret key",
            Self::Service => "service",
            Self::Port => "port",
            Self::Route => "route",
        };
        f.write_str(s)
    }
}

/// A single problem found while validating a configuration document.
///
/// Validation errors are always caller-fixable and are never retried.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum ValidationError {
    #[error("missing required field `{field}`")]
    #[diagnostic(code(deckhand::validation::missing_field))]
    MissingField { field: String },

    #[error("`{referenced_by}` references unknown {kind} '{name}'")]
    #[diagnostic(code(deckhand::validation::dangling_reference))]
    DanglingReference {
        kind: ReferenceKind,
        name: String,
        referenced_by: String,
        #[help]
        suggestion: Option<String>,
    },

    #[error("port {port} in workload '{workload}' is claimed by both '{first}' and '{second}'")]
    #[diagnostic(
        code(deckhand::validation::conflicting_port),
        help("every container of a workload shares one network namespace, so ports must be unique")
    )]
    ConflictingPort {
        workload: String,
        port: u16,
        first: String,
        second: String,
    },

    #[error("invalid value for `{field}`: {message}")]
    #[diagnostic(code(deckhand::validation::invalid_value))]
    InvalidValue { field: String, message: String },

    #[error("invalid secret reference '{value}' in `{field}`")]
    #[diagnostic(
        code(deckhand::validation::invalid_reference),
        help("secret bindings are written as <secret-name>.<key>, e.g. db-secret.pass")
    )]
    InvalidReference { field: String, value: String },
}

impl ValidationError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable code, used by `--json` output
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing_field",
            Self::DanglingReference { .. } => "dangling_reference",
            Self::ConflictingPort { .. } => "conflicting_port",
            Self::InvalidValue { .. } => "invalid_value",
            Self::InvalidReference { .. } => "invalid_reference",
        }
    }
}

/// Every validation error found in a document, reported together
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("configuration has {} validation error(s)", errors.len())]
#[diagnostic(code(deckhand::validation))]
pub struct ValidationErrors {
    #[related]
    pub errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// True if any error has the given code
    pub fn contains_code(&self, code: &str) -> bool {
        self.errors.iter().any(|e| e.code() == code)
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(err: ValidationError) -> Self {
        Self { errors: vec![err] }
    }
}
