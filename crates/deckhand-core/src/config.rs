//! Raw configuration document, as written by users
//!
//! Everything here mirrors the YAML one-to-one. Fields the model requires are
//! still `Option` so that [`validate`](crate::validate::validate) can report
//! every missing field with its path instead of failing on the first one
//! during deserialization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The only document version this crate understands
pub const API_VERSION: &str = "deckhand/v1";

/// Top-level configuration document, keyed by logical workload name
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigDocument {
    pub api_version: Option<String>,

    #[serde(default)]
    pub namespace: Option<String>,

    /// Secrets that exist in the secret store (names and keys only)
    #[serde(default)]
    pub secrets: BTreeMap<String, SecretDecl>,

    /// Services not rendered by this document but reachable from it
    #[serde(default)]
    pub external: BTreeMap<String, ExternalServiceConfig>,

    #[serde(default)]
    pub workloads: BTreeMap<String, WorkloadConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecretDecl {
    #[serde(default)]
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExternalServiceConfig {
    #[serde(default)]
    pub namespace: Option<String>,

    /// Pod labels of the service, for in-cluster externals
    #[serde(default)]
    pub selector: Option<BTreeMap<String, String>>,

    /// Address range, for services outside the cluster
    #[serde(default)]
    pub cidr: Option<String>,

    #[serde(default)]
    pub ports: Vec<PortConfig>,
}

/// Network protocol of a port
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    #[serde(rename = "TCP", alias = "tcp")]
    Tcp,
    #[serde(rename = "UDP", alias = "udp")]
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PortConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub port: Option<u16>,
    #[serde(default)]
    pub protocol: Option<Protocol>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkloadConfig {
    pub image: Option<String>,

    #[serde(default)]
    pub replicas: Option<i32>,

    #[serde(default)]
    pub ports: Vec<PortConfig>,

    /// HTTP routes served by the workload; probe paths must be among them
    #[serde(default)]
    pub routes: Vec<String>,

    #[serde(default)]
    pub resources: Option<ResourcesConfig>,

    #[serde(default)]
    pub security: Option<SecurityConfig>,

    #[serde(default)]
    pub env: Vec<EnvConfig>,

    #[serde(default)]
    pub probes: Option<ProbesConfig>,

    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default)]
    pub sidecars: Vec<SidecarConfig>,

    #[serde(default)]
    pub dependencies: Vec<DependencyConfig>,

    #[serde(default)]
    pub exposure: Option<ExposureConfig>,

    #[serde(default)]
    pub scaling: Option<ScalingConfig>,

    #[serde(default)]
    pub disruption: Option<DisruptionConfig>,

    #[serde(default)]
    pub provenance: Option<ProvenanceConfig>,

    #[serde(default)]
    pub gate: Option<GateConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResourcesConfig {
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
    #[serde(default)]
    pub limits: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecurityConfig {
    #[serde(default)]
    pub run_as_non_root: Option<bool>,
    #[serde(default)]
    pub run_as_user: Option<i64>,
    #[serde(default)]
    pub read_only_root_filesystem: Option<bool>,
    #[serde(default)]
    pub drop_capabilities: Option<Vec<String>>,
    #[serde(default)]
    pub seccomp_profile: Option<String>,
    /// Paths that stay writable when the root filesystem is read-only
    #[serde(default)]
    pub writable_paths: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnvConfig {
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    /// `<secret-name>.<key>`
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProbesConfig {
    #[serde(default)]
    pub liveness: Option<ProbeConfig>,
    #[serde(default)]
    pub readiness: Option<ProbeConfig>,
    #[serde(default)]
    pub startup: Option<ProbeConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProbeConfig {
    pub path: Option<String>,
    /// Named port to probe; defaults to the first declared port
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default)]
    pub initial_delay_seconds: Option<i32>,
    #[serde(default)]
    pub period_seconds: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SidecarConfig {
    pub name: Option<String>,
    pub image: Option<String>,
    #[serde(default)]
    pub ports: Vec<PortConfig>,
    #[serde(default)]
    pub resources: Option<ResourcesConfig>,
}

/// How the readiness gate checks a dependency
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckMethod {
    #[default]
    Tcp,
    Http,
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DependencyConfig {
    pub target: Option<String>,
    pub port: Option<u16>,
    #[serde(default)]
    pub protocol: Option<Protocol>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub check: Option<CheckMethod>,
    /// HTTP path for `check: http`
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub required: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExposureConfig {
    pub host: Option<String>,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub tls_issuer: Option<String>,
    #[serde(default)]
    pub ingress_class: Option<String>,
    #[serde(default)]
    pub service_port: Option<String>,
    #[serde(default)]
    pub controller_namespace: Option<String>,
}

/// Metric the autoscaler tracks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingMetric {
    #[default]
    Cpu,
    Memory,
}

impl ScalingMetric {
    pub fn resource_name(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScalingConfig {
    pub min_replicas: Option<i32>,
    pub max_replicas: Option<i32>,
    #[serde(default)]
    pub metric: Option<ScalingMetric>,
    pub target_utilization: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DisruptionConfig {
    #[serde(default)]
    pub min_available: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProvenanceConfig {
    #[serde(default)]
    pub keyless: Option<KeylessConfig>,
    #[serde(default)]
    pub public_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KeylessConfig {
    pub issuer: Option<String>,
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GateConfig {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub interval_seconds: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_document() {
        let doc: ConfigDocument = serde_yaml::from_str(
            r#"
apiVersion: deckhand/v1
workloads:
  test:
    image: ghcr.io/acme/test:1.0
    ports:
      - port: 3000
    dependencies:
      - target: redis
        port: 6379
        required: true
"#,
        )
        .unwrap();

        let test = &doc.workloads["test"];
        assert_eq!(test.image.as_deref(), Some("ghcr.io/acme/test:1.0"));
        assert_eq!(test.ports[0].port, Some(3000));
        assert_eq!(test.dependencies[0].target.as_deref(), Some("redis"));
        assert_eq!(test.dependencies[0].check, None);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<ConfigDocument, _> = serde_yaml::from_str(
            r#"
apiVersion: deckhand/v1
workloads:
  test:
    imag: typo
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_protocol_accepts_lowercase() {
        let port: PortConfig = serde_yaml::from_str("port: 53\nprotocol: udp\n").unwrap();
        assert_eq!(port.protocol, Some(Protocol::Udp));
        assert_eq!(Protocol::Udp.as_str(), "UDP");
    }
}
