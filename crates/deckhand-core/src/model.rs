//! Validated, immutable workload model
//!
//! Values of these types only come out of [`validate`](crate::validate::validate),
//! so every cross-reference they contain has already been resolved.

use std::collections::{BTreeMap, BTreeSet};

pub use crate::config::{CheckMethod, Protocol, ScalingMetric};

/// A named container port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub name: String,
    pub port: u16,
    pub protocol: Protocol,
}

/// Compute resource requests and limits (quantity strings, e.g. `500m`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resources {
    pub requests: BTreeMap<String, String>,
    pub limits: BTreeMap<String, String>,
}

impl Resources {
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.limits.is_empty()
    }
}

/// Container security posture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityPosture {
    pub run_as_non_root: bool,
    pub run_as_user: Option<i64>,
    pub read_only_root_filesystem: bool,
    pub drop_capabilities: Vec<String>,
    pub seccomp_profile: String,
    pub writable_paths: Vec<String>,
}

impl Default for SecurityPosture {
    fn default() -> Self {
        Self {
            run_as_non_root: true,
            run_as_user: None,
            read_only_root_filesystem: true,
            drop_capabilities: vec!["ALL".to_string()],
            seccomp_profile: "RuntimeDefault".to_string(),
            writable_paths: Vec::new(),
        }
    }
}

/// A resolved reference to one key of a declared secret
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SecretRef {
    /// Logical secret name
    pub name: String,
    /// Key inside the backing store entry
    pub key: String,
    /// Environment variable that consumes the value
    pub field: String,
}

/// An environment variable binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvBinding {
    Literal { name: String, value: String },
    Secret(SecretRef),
}

impl EnvBinding {
    pub fn name(&self) -> &str {
        match self {
            Self::Literal { name, .. } => name,
            Self::Secret(secret) => &secret.field,
        }
    }
}

/// HTTP probe against a declared route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub path: String,
    pub port: String,
    pub initial_delay_seconds: i32,
    pub period_seconds: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Probes {
    pub liveness: Option<Probe>,
    pub readiness: Option<Probe>,
    pub startup: Option<Probe>,
}

/// Additional container sharing the workload's network namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sidecar {
    pub name: String,
    pub image: String,
    pub ports: Vec<Port>,
    pub resources: Resources,
}

/// How the readiness gate checks a dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessCheck {
    Tcp,
    Http { path: String },
    None,
}

/// A directed edge of the dependency graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRef {
    pub target: String,
    pub port: u16,
    pub protocol: Protocol,
    /// Namespace the target lives in, if different from the caller's
    pub namespace: Option<String>,
    pub check: ReadinessCheck,
    pub required: bool,
}

impl DependencyRef {
    /// DNS name the workload uses to reach the target
    pub fn host(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}.{}", self.target, ns),
            None => self.target.clone(),
        }
    }
}

/// Settings for the pre-start dependency check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateSettings {
    pub image: String,
    pub max_attempts: u32,
    pub interval_seconds: u32,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            image: "busybox:1.36".to_string(),
            max_attempts: 30,
            interval_seconds: 2,
        }
    }
}

/// Who may sign the workload's image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvenanceSpec {
    Keyless { issuer: String, subject: String },
    PublicKey(String),
}

/// Voluntary disruption settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisruptionSpec {
    pub min_available: i32,
}

impl Default for DisruptionSpec {
    fn default() -> Self {
        Self { min_available: 1 }
    }
}

/// A deployable unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub replicas: i32,
    pub ports: Vec<Port>,
    pub routes: BTreeSet<String>,
    pub resources: Resources,
    pub security: SecurityPosture,
    pub env: Vec<EnvBinding>,
    pub probes: Probes,
    pub node_selector: BTreeMap<String, String>,
    pub sidecars: Vec<Sidecar>,
    pub dependencies: Vec<DependencyRef>,
    pub disruption: DisruptionSpec,
    pub provenance: Option<ProvenanceSpec>,
    pub gate: GateSettings,
}

impl WorkloadSpec {
    /// Every secret the workload consumes
    pub fn secret_refs(&self) -> Vec<SecretRef> {
        self.env
            .iter()
            .filter_map(|binding| match binding {
                EnvBinding::Secret(secret) => Some(secret.clone()),
                EnvBinding::Literal { .. } => None,
            })
            .collect()
    }

    /// Look up a declared port by name
    pub fn port_named(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }
}

/// Ingress exposure of a workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposureSpec {
    pub host: String,
    pub paths: Vec<String>,
    pub tls_issuer: Option<String>,
    pub ingress_class: Option<String>,
    /// Named workload port the ingress routes to
    pub service_port: String,
    /// Namespace the ingress controller runs in
    pub controller_namespace: String,
}

/// Autoscaling bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingSpec {
    pub min_replicas: i32,
    pub max_replicas: i32,
    pub metric: ScalingMetric,
    pub target_utilization: i32,
}

impl ScalingSpec {
    /// Clamp a configured replica count into the autoscaler bounds
    pub fn clamp(&self, replicas: i32) -> i32 {
        replicas.clamp(self.min_replicas, self.max_replicas)
    }
}

/// A workload plus its optional exposure and scaling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedWorkload {
    pub spec: WorkloadSpec,
    pub exposure: Option<ExposureSpec>,
    pub scaling: Option<ScalingSpec>,
}

/// A service outside this document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalService {
    pub name: String,
    pub namespace: Option<String>,
    pub selector: Option<BTreeMap<String, String>>,
    pub cidr: Option<String>,
    pub ports: Vec<Port>,
}
