//! Error types for deckhand-kube

use deckhand_engine::RenderError;
use thiserror::Error;

/// Result type for deckhand-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur during Kubernetes operations.
///
/// A resource the cluster refuses is not an error here: it is reported as
/// [`ApplyOutcome::Rejected`](crate::ApplyOutcome::Rejected).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// No usable kubeconfig or in-cluster configuration
    #[error("cannot connect to cluster: {0}")]
    Connection(String),

    /// Document in a manifest stream could not be interpreted
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Rendering failed (including secret content lookups)
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl From<serde_json::Error> for KubeError {
    fn from(err: serde_json::Error) -> Self {
        KubeError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(err: serde_yaml::Error) -> Self {
        KubeError::Serialization(err.to_string())
    }
}
