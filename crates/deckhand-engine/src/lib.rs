//! Deckhand Engine - renders validated workloads into Kubernetes resources
//!
//! For each workload the engine produces a [`ResourceBundle`]:
//! - ServiceAccount, Service, Deployment and PodDisruptionBudget
//! - HorizontalPodAutoscaler and Ingress when scaling/exposure are set
//! - a default-deny NetworkPolicy derived from the dependency graph
//! - a Kyverno image verification Policy when provenance is set
//!
//! The Deployment carries a readiness gate init container and a fingerprint
//! of the secrets it consumes.

pub mod bundle;
pub mod composer;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod gate;
pub mod policy;
pub mod provenance;

pub use bundle::{BundleResource, ResourceBundle};
pub use engine::{RenderMode, Renderer, RendererBuilder};
pub use error::{RenderError, Result};
pub use fingerprint::{
    MemorySecretSource, SECRET_CHECKSUM_ANNOTATION, SecretContentSource, fingerprint,
};
pub use gate::{GateStep, PreStartCheck, gate};
pub use provenance::ImagePolicy;
