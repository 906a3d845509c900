//! Render error types

use deckhand_core::CoreError;
use miette::Diagnostic;
use thiserror::Error;

/// Errors that abort a render. A failed render never yields a partial bundle.
#[derive(Error, Debug, Diagnostic)]
pub enum RenderError {
    #[error("cannot resolve content of secret '{secret}': {reason}")]
    #[diagnostic(
        code(deckhand::render::unresolved_secret_content),
        help("pass a secrets file with --secrets, or read them from the cluster with --cluster-secrets")
    )]
    UnresolvedSecretContent { secret: String, reason: String },

    #[error("{resource} selects {found}, expected identity labels {expected}")]
    #[diagnostic(code(deckhand::render::selector_mismatch))]
    SelectorMismatch {
        resource: String,
        expected: String,
        found: String,
    },

    #[error("unknown workload '{name}'")]
    #[diagnostic(code(deckhand::render::unknown_workload))]
    UnknownWorkload {
        name: String,
        #[help]
        suggestion: Option<String>,
    },

    #[error("workload '{workload}' depends on '{target}', which is not in the dependency graph")]
    #[diagnostic(code(deckhand::render::unresolved_dependency))]
    UnresolvedDependency { workload: String, target: String },

    #[error("gate script template failed: {0}")]
    #[diagnostic(code(deckhand::render::template))]
    Template(#[from] minijinja::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, RenderError>;
