//! Deckhand Core - configuration model for the deployment renderer
//!
//! This crate turns user-written configuration into validated values:
//! - `ConfigDocument`: the raw YAML document
//! - `Values`: layered configuration with deep merge support
//! - `validate`: normalization and cross-reference checks
//! - `WorkloadSpec` and friends: the immutable validated model
//! - `DependencyGraph`: workload-to-service edges used for network policy

pub mod config;
pub mod error;
pub mod graph;
pub mod identity;
pub mod loader;
pub mod model;
pub mod validate;
pub mod values;

pub use config::{API_VERSION, ConfigDocument};
pub use error::{CoreError, ReferenceKind, ValidationError, ValidationErrors};
pub use graph::{DependencyGraph, Edge, NodeKind, Peer, ServiceNode};
pub use identity::IdentityLabels;
pub use loader::{load_document, parse_document};
pub use model::{
    DependencyRef, DisruptionSpec, EnvBinding, ExposureSpec, ExternalService, GateSettings, Port,
    Probe, Probes, Protocol, ProvenanceSpec, ReadinessCheck, Resources, ScalingMetric, ScalingSpec,
    SecretRef, SecurityPosture, Sidecar, ValidatedWorkload, WorkloadSpec,
};
pub use validate::{ValidatedDocument, did_you_mean, validate};
pub use values::{Values, parse_set_values};
