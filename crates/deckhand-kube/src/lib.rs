//! Kubernetes integration for Deckhand
//!
//! This crate connects rendered bundles to a live cluster:
//! - Server-side apply with admission rejections surfaced as outcomes
//! - Secret content prefetch for fingerprinting
//! - Resource-level diffs between two rendered streams

pub mod apply;
pub mod diff;
pub mod error;
pub mod secrets;

pub use apply::{
    ApplyOutcome, ApplyPlan, BundleApplier, FIELD_MANAGER, HANDOVER_FIELD_MANAGER, LiveDeployment,
};
pub use diff::{BundleDiff, ChangeType, ResourceChange, ResourceKey};
pub use error::{KubeError, Result};
pub use secrets::{ClusterSecretSource, DEFAULT_LOOKUP_TIMEOUT};
