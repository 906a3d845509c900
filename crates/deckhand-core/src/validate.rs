//! Validation and normalization of configuration documents
//!
//! `validate` turns a raw [`ConfigDocument`] into a [`ValidatedDocument`]:
//! required fields are checked, optional ones get their defaults, and every
//! cross-reference (secret bindings, probe routes, dependency targets and
//! ports) is resolved. All problems in the document are collected and
//! returned together.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{
    API_VERSION, CheckMethod, ConfigDocument, DependencyConfig, EnvConfig, ExposureConfig,
    ExternalServiceConfig, PortConfig, ProbeConfig, ProvenanceConfig, ResourcesConfig,
    ScalingConfig, SecurityConfig, WorkloadConfig,
};
use crate::error::{ReferenceKind, ValidationError, ValidationErrors};
use crate::graph::{DependencyGraph, NodeKind};
use crate::identity::is_dns_label;
use crate::model::{
    DependencyRef, DisruptionSpec, EnvBinding, ExposureSpec, ExternalService, GateSettings, Port,
    Probe, Probes, Protocol, ProvenanceSpec, ReadinessCheck, Resources, ScalingSpec, SecretRef,
    SecurityPosture, Sidecar, ValidatedWorkload, WorkloadSpec,
};

/// Maximum Levenshtein distance to consider for suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Kubernetes limit for container port names
const MAX_PORT_NAME_LEN: usize = 15;

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "ingress-nginx";
const DEFAULT_PROBE_PERIOD: i32 = 10;
const DEFAULT_TARGET_UTILIZATION: i32 = 80;

/// HTTP readiness paths end up inside a double-quoted shell word, so only
/// URL characters with no meaning to the shell are accepted
static HTTP_CHECK_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/[A-Za-z0-9._~%/?&=+:@,;*()!-]*$").expect("valid regex"));

/// A fully resolved configuration document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDocument {
    pub namespace: String,
    pub workloads: BTreeMap<String, ValidatedWorkload>,
    pub externals: BTreeMap<String, ExternalService>,
    pub graph: DependencyGraph,
}

impl ValidatedDocument {
    pub fn workload(&self, name: &str) -> Option<&ValidatedWorkload> {
        self.workloads.get(name)
    }

    pub fn workload_names(&self) -> impl Iterator<Item = &str> {
        self.workloads.keys().map(String::as_str)
    }
}

/// Validate and normalize a configuration document
pub fn validate(raw: &ConfigDocument) -> std::result::Result<ValidatedDocument, ValidationErrors> {
    let mut v = Validator::default();

    match raw.api_version.as_deref() {
        None => v.push(ValidationError::missing("apiVersion")),
        Some(API_VERSION) => {}
        Some(other) => v.push(ValidationError::invalid(
            "apiVersion",
            format!("unsupported version '{}', expected '{}'", other, API_VERSION),
        )),
    }

    let namespace = raw
        .namespace
        .clone()
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    if !is_dns_label(&namespace) {
        v.push(ValidationError::invalid(
            "namespace",
            format!("'{}' is not a valid DNS label", namespace),
        ));
    }

    if raw.workloads.is_empty() {
        v.push(ValidationError::missing("workloads"));
    }

    let secrets = v.secrets(raw);

    let mut externals = BTreeMap::new();
    for (name, config) in &raw.external {
        if let Some(external) = v.external(name, config) {
            externals.insert(name.clone(), external);
        }
    }

    let mut workloads = BTreeMap::new();
    for (name, config) in &raw.workloads {
        if raw.external.contains_key(name) {
            v.push(ValidationError::invalid(
                format!("workloads.{}", name),
                "name is also declared as an external service",
            ));
        }
        if let Some(workload) = v.workload(name, &namespace, config, &secrets) {
            workloads.insert(name.clone(), workload);
        }
    }

    let mut graph = DependencyGraph::new(namespace.clone());
    for workload in workloads.values() {
        graph.add_workload(&workload.spec);
    }
    for external in externals.values() {
        graph.add_external(external);
    }

    let mut edges = Vec::new();
    for workload in workloads.values() {
        for (index, dep) in workload.spec.dependencies.iter().enumerate() {
            let field = format!("workloads.{}.dependencies[{}]", workload.spec.name, index);
            match graph.resolve(dep) {
                Some(node) if node.exposes(dep.port, dep.protocol) => {
                    edges.push((workload.spec.name.clone(), dep.clone()));
                }
                Some(node) => v.push(ValidationError::DanglingReference {
                    kind: ReferenceKind::Port,
                    name: format!("{}/{}", dep.port, dep.protocol.as_str()),
                    referenced_by: field,
                    suggestion: Some(format!(
                        "'{}' exposes: {}",
                        node.name,
                        node.ports
                            .iter()
                            .map(|p| format!("{}/{}", p.port, p.protocol.as_str()))
                            .collect::<Vec<_>>()
                            .join(", ")
                    )),
                }),
                // A declared workload that failed validation already reported
                // its own errors
                None if raw.workloads.contains_key(&dep.target)
                    && !workloads.contains_key(&dep.target) => {}
                None => {
                    let candidates: Vec<&str> = graph.node_names().collect();
                    v.push(ValidationError::DanglingReference {
                        kind: ReferenceKind::Service,
                        name: dep.host(),
                        referenced_by: field,
                        suggestion: did_you_mean(&dep.target, candidates).or_else(|| {
                            Some(
                                "declare it as a workload or under `external:`".to_string(),
                            )
                        }),
                    });
                }
            }
        }
    }
    for (caller, dep) in edges {
        graph.add_edge(caller, dep);
    }

    for (name, workload) in &workloads {
        let callers = graph.callers_of(name).len();
        let deps = graph.dependencies_of(name).count();
        tracing::debug!(workload = %name, callers, deps, "resolved dependency edges");

        if gate_lacks_dns(&workload.spec) {
            tracing::warn!(
                workload = %name,
                "readiness gate polls dependencies by name but egress to port 53 is denied; \
                 declare a DNS dependency (e.g. kube-dns, UDP 53, check: none)"
            );
        }
    }

    if !v.errors.is_empty() {
        return Err(ValidationErrors { errors: v.errors });
    }

    debug_assert!(
        workloads
            .keys()
            .all(|n| graph.node(n).is_some_and(|node| node.kind == NodeKind::Workload))
    );

    Ok(ValidatedDocument {
        namespace,
        workloads,
        externals,
        graph,
    })
}

/// A gated workload resolves its dependencies by name, which needs an egress
/// rule to a DNS server under default-deny
fn gate_lacks_dns(spec: &WorkloadSpec) -> bool {
    let gated = spec
        .dependencies
        .iter()
        .any(|d| d.required && d.check != ReadinessCheck::None);
    gated && !spec.dependencies.iter().any(|d| d.port == 53)
}

/// Suggest the closest candidate, if any is close enough
pub fn did_you_mean<'a>(
    name: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    candidates
        .into_iter()
        .map(|c| (c, strsim::levenshtein(name, c)))
        .filter(|(_, d)| *d <= MAX_SUGGESTION_DISTANCE)
        .min_by_key(|(c, d)| (*d, *c))
        .map(|(c, _)| format!("did you mean '{}'?", c))
}

#[derive(Default)]
struct Validator {
    errors: Vec<ValidationError>,
}

impl Validator {
    fn push(&mut self, err: ValidationError) {
        self.errors.push(err);
    }

    fn secrets(&mut self, raw: &ConfigDocument) -> BTreeMap<String, BTreeSet<String>> {
        let mut secrets = BTreeMap::new();
        for (name, decl) in &raw.secrets {
            if !is_dns_label(name) {
                self.push(ValidationError::invalid(
                    format!("secrets.{}", name),
                    "secret names must be DNS labels",
                ));
            }
            if decl.keys.is_empty() {
                self.push(ValidationError::missing(format!("secrets.{}.keys", name)));
            }
            secrets.insert(name.clone(), decl.keys.iter().cloned().collect());
        }
        secrets
    }

    fn external(&mut self, name: &str, config: &ExternalServiceConfig) -> Option<ExternalService> {
        let field = format!("external.{}", name);
        let before = self.errors.len();

        if !is_dns_label(name) {
            self.push(ValidationError::invalid(&field, "names must be DNS labels"));
        }
        if config.cidr.is_some() && config.selector.is_some() {
            self.push(ValidationError::invalid(
                &field,
                "`cidr` and `selector` are mutually exclusive",
            ));
        }
        if config.ports.is_empty() {
            self.push(ValidationError::missing(format!("{}.ports", field)));
        }
        let ports = self.ports(&field, &config.ports);

        (self.errors.len() == before).then(|| ExternalService {
            name: name.to_string(),
            namespace: config.namespace.clone(),
            selector: config.selector.clone(),
            cidr: config.cidr.clone(),
            ports,
        })
    }

    fn ports(&mut self, field: &str, ports: &[PortConfig]) -> Vec<Port> {
        let mut result = Vec::new();
        let mut names = BTreeSet::new();

        for (index, config) in ports.iter().enumerate() {
            let port_field = format!("{}.ports[{}]", field, index);
            let port = match config.port {
                None => {
                    self.push(ValidationError::missing(format!("{}.port", port_field)));
                    continue;
                }
                Some(0) => {
                    self.push(ValidationError::invalid(
                        format!("{}.port", port_field),
                        "port must be between 1 and 65535",
                    ));
                    continue;
                }
                Some(port) => port,
            };

            let name = config
                .name
                .clone()
                .unwrap_or_else(|| format!("port-{}", port));
            if name.len() > MAX_PORT_NAME_LEN || !is_dns_label(&name) {
                self.push(ValidationError::invalid(
                    format!("{}.name", port_field),
                    format!(
                        "'{}' must be a DNS label of at most {} characters",
                        name, MAX_PORT_NAME_LEN
                    ),
                ));
            }
            if !names.insert(name.clone()) {
                self.push(ValidationError::invalid(
                    format!("{}.name", port_field),
                    format!("duplicate port name '{}'", name),
                ));
            }

            result.push(Port {
                name,
                port,
                protocol: config.protocol.unwrap_or_default(),
            });
        }

        result
    }

    fn resources(config: Option<&ResourcesConfig>) -> Resources {
        config
            .map(|r| Resources {
                requests: r.requests.clone(),
                limits: r.limits.clone(),
            })
            .unwrap_or_default()
    }

    fn workload(
        &mut self,
        name: &str,
        namespace: &str,
        config: &WorkloadConfig,
        secrets: &BTreeMap<String, BTreeSet<String>>,
    ) -> Option<ValidatedWorkload> {
        let field = format!("workloads.{}", name);
        let before = self.errors.len();

        if !is_dns_label(name) {
            self.push(ValidationError::invalid(
                &field,
                format!("'{}' is not a valid DNS label", name),
            ));
        }

        let image = match config.image.as_deref().map(str::trim) {
            None | Some("") => {
                self.push(ValidationError::missing(format!("{}.image", field)));
                String::new()
            }
            Some(image) => image.to_string(),
        };

        let replicas = config.replicas.unwrap_or(1);
        if replicas < 0 {
            self.push(ValidationError::invalid(
                format!("{}.replicas", field),
                "replicas cannot be negative",
            ));
        }

        if config.ports.is_empty() {
            self.push(ValidationError::missing(format!("{}.ports", field)));
        }
        let ports = self.ports(&field, &config.ports);

        let mut sidecars = Vec::new();
        for (index, sidecar) in config.sidecars.iter().enumerate() {
            let sidecar_field = format!("{}.sidecars[{}]", field, index);
            let sidecar_name = sidecar.name.clone().unwrap_or_default();
            if sidecar_name.is_empty() {
                self.push(ValidationError::missing(format!("{}.name", sidecar_field)));
            } else if !is_dns_label(&sidecar_name) || sidecar_name == name {
                self.push(ValidationError::invalid(
                    format!("{}.name", sidecar_field),
                    "sidecar names must be DNS labels distinct from the workload name",
                ));
            }
            let sidecar_image = sidecar.image.clone().unwrap_or_default();
            if sidecar_image.is_empty() {
                self.push(ValidationError::missing(format!("{}.image", sidecar_field)));
            }
            sidecars.push(Sidecar {
                name: sidecar_name,
                image: sidecar_image,
                ports: self.ports(&sidecar_field, &sidecar.ports),
                resources: Self::resources(sidecar.resources.as_ref()),
            });
        }

        self.check_port_conflicts(name, &ports, &sidecars);

        let mut routes = BTreeSet::new();
        for route in &config.routes {
            if !route.starts_with('/') {
                self.push(ValidationError::invalid(
                    format!("{}.routes", field),
                    format!("route '{}' must start with '/'", route),
                ));
            }
            routes.insert(route.clone());
        }

        let env = self.env(&field, &config.env, secrets);

        let probes = match &config.probes {
            Some(p) => Probes {
                liveness: self.probe(&field, "liveness", p.liveness.as_ref(), &routes, &ports),
                readiness: self.probe(&field, "readiness", p.readiness.as_ref(), &routes, &ports),
                startup: self.probe(&field, "startup", p.startup.as_ref(), &routes, &ports),
            },
            None => Probes::default(),
        };

        let security = self.security(&field, config.security.as_ref());

        let mut dependencies = Vec::new();
        for (index, dep) in config.dependencies.iter().enumerate() {
            if let Some(dep) = self.dependency(&field, index, name, dep) {
                dependencies.push(dep);
            }
        }

        let exposure = config
            .exposure
            .as_ref()
            .and_then(|e| self.exposure(&field, e, &ports));
        let scaling = config
            .scaling
            .as_ref()
            .and_then(|s| self.scaling(&field, s));

        let disruption = DisruptionSpec {
            min_available: config
                .disruption
                .as_ref()
                .and_then(|d| d.min_available)
                .unwrap_or(DisruptionSpec::default().min_available),
        };
        if disruption.min_available < 0 {
            self.push(ValidationError::invalid(
                format!("{}.disruption.minAvailable", field),
                "minAvailable cannot be negative",
            ));
        }
        let floor = scaling.as_ref().map_or(replicas, |s| s.min_replicas);
        if disruption.min_available >= floor && floor > 0 {
            tracing::warn!(
                workload = %name,
                min_available = disruption.min_available,
                replicas = floor,
                "disruption budget leaves no room for voluntary evictions"
            );
        }

        let provenance = config
            .provenance
            .as_ref()
            .and_then(|p| self.provenance(&field, p));

        let defaults = GateSettings::default();
        let gate = match &config.gate {
            Some(g) => GateSettings {
                image: g.image.clone().unwrap_or(defaults.image),
                max_attempts: g.max_attempts.unwrap_or(defaults.max_attempts),
                interval_seconds: g.interval_seconds.unwrap_or(defaults.interval_seconds),
            },
            None => defaults,
        };
        if gate.max_attempts == 0 || gate.interval_seconds == 0 {
            self.push(ValidationError::invalid(
                format!("{}.gate", field),
                "maxAttempts and intervalSeconds must be at least 1",
            ));
        }

        if self.errors.len() != before {
            return None;
        }

        Some(ValidatedWorkload {
            spec: WorkloadSpec {
                name: name.to_string(),
                namespace: namespace.to_string(),
                image,
                replicas,
                ports,
                routes,
                resources: Self::resources(config.resources.as_ref()),
                security,
                env,
                probes,
                node_selector: config.node_selector.clone(),
                sidecars,
                dependencies,
                disruption,
                provenance,
                gate,
            },
            exposure,
            scaling,
        })
    }

    fn check_port_conflicts(&mut self, workload: &str, ports: &[Port], sidecars: &[Sidecar]) {
        let mut claimed: HashMap<(u16, Protocol), &str> = HashMap::new();
        let containers = std::iter::once((workload, ports))
            .chain(sidecars.iter().map(|s| (s.name.as_str(), s.ports.as_slice())));

        for (container, container_ports) in containers {
            for port in container_ports {
                if let Some(first) = claimed.insert((port.port, port.protocol), container) {
                    self.push(ValidationError::ConflictingPort {
                        workload: workload.to_string(),
                        port: port.port,
                        first: first.to_string(),
                        second: container.to_string(),
                    });
                }
            }
        }
    }

    fn env(
        &mut self,
        field: &str,
        env: &[EnvConfig],
        secrets: &BTreeMap<String, BTreeSet<String>>,
    ) -> Vec<EnvBinding> {
        let mut bindings = Vec::new();
        let mut seen = BTreeSet::new();

        for (index, entry) in env.iter().enumerate() {
            let env_field = format!("{}.env[{}]", field, index);
            let Some(name) = entry.name.clone().filter(|n| !n.is_empty()) else {
                self.push(ValidationError::missing(format!("{}.name", env_field)));
                continue;
            };
            if !seen.insert(name.clone()) {
                self.push(ValidationError::invalid(
                    &env_field,
                    format!("duplicate environment variable '{}'", name),
                ));
            }

            match (&entry.value, &entry.secret) {
                (Some(_), Some(_)) => self.push(ValidationError::invalid(
                    &env_field,
                    "`value` and `secret` are mutually exclusive",
                )),
                (None, None) => {
                    self.push(ValidationError::missing(format!("{}.value", env_field)))
                }
                (Some(value), None) => bindings.push(EnvBinding::Literal {
                    name,
                    value: value.clone(),
                }),
                (None, Some(reference)) => {
                    if let Some(secret) =
                        self.secret_ref(&env_field, reference, name, secrets)
                    {
                        bindings.push(EnvBinding::Secret(secret));
                    }
                }
            }
        }

        bindings
    }

    fn secret_ref(
        &mut self,
        field: &str,
        reference: &str,
        consumer: String,
        secrets: &BTreeMap<String, BTreeSet<String>>,
    ) -> Option<SecretRef> {
        let secret_field = format!("{}.secret", field);
        let Some((secret, key)) = reference
            .split_once('.')
            .filter(|(s, k)| !s.is_empty() && !k.is_empty())
        else {
            self.push(ValidationError::InvalidReference {
                field: secret_field,
                value: reference.to_string(),
            });
            return None;
        };

        let Some(keys) = secrets.get(secret) else {
            self.push(ValidationError::DanglingReference {
                kind: ReferenceKind::Secret,
                name: secret.to_string(),
                referenced_by: secret_field,
                suggestion: did_you_mean(secret, secrets.keys().map(String::as_str)),
            });
            return None;
        };

        if !keys.contains(key) {
            self.push(ValidationError::DanglingReference {
                kind: ReferenceKind::SecretKey,
                name: reference.to_string(),
                referenced_by: secret_field,
                suggestion: did_you_mean(key, keys.iter().map(String::as_str)),
            });
            return None;
        }

        Some(SecretRef {
            name: secret.to_string(),
            key: key.to_string(),
            field: consumer,
        })
    }

    fn probe(
        &mut self,
        field: &str,
        kind: &str,
        config: Option<&ProbeConfig>,
        routes: &BTreeSet<String>,
        ports: &[Port],
    ) -> Option<Probe> {
        let config = config?;
        let probe_field = format!("{}.probes.{}", field, kind);

        let Some(path) = config.path.clone() else {
            self.push(ValidationError::missing(format!("{}.path", probe_field)));
            return None;
        };
        if !routes.contains(&path) {
            self.push(ValidationError::DanglingReference {
                kind: ReferenceKind::Route,
                name: path.clone(),
                referenced_by: format!("{}.path", probe_field),
                suggestion: did_you_mean(&path, routes.iter().map(String::as_str))
                    .or_else(|| Some(format!("add '{}' to `routes`", path))),
            });
        }

        let port = match &config.port {
            Some(port) if ports.iter().any(|p| &p.name == port) => port.clone(),
            Some(port) => {
                self.push(ValidationError::DanglingReference {
                    kind: ReferenceKind::Port,
                    name: port.clone(),
                    referenced_by: format!("{}.port", probe_field),
                    suggestion: did_you_mean(port, ports.iter().map(|p| p.name.as_str())),
                });
                return None;
            }
            None => ports.first()?.name.clone(),
        };

        let initial_delay_seconds = config.initial_delay_seconds.unwrap_or(0);
        let period_seconds = config.period_seconds.unwrap_or(DEFAULT_PROBE_PERIOD);
        if initial_delay_seconds < 0 || period_seconds < 1 {
            self.push(ValidationError::invalid(
                &probe_field,
                "initialDelaySeconds must be >= 0 and periodSeconds >= 1",
            ));
        }

        Some(Probe {
            path,
            port,
            initial_delay_seconds,
            period_seconds,
        })
    }

    fn security(&mut self, field: &str, config: Option<&SecurityConfig>) -> SecurityPosture {
        let defaults = SecurityPosture::default();
        let Some(config) = config else {
            return defaults;
        };

        for path in &config.writable_paths {
            if !path.starts_with('/') {
                self.push(ValidationError::invalid(
                    format!("{}.security.writablePaths", field),
                    format!("'{}' must be an absolute path", path),
                ));
            }
        }
        if config.run_as_non_root == Some(true) && config.run_as_user == Some(0) {
            self.push(ValidationError::invalid(
                format!("{}.security.runAsUser", field),
                "runAsUser 0 contradicts runAsNonRoot",
            ));
        }

        SecurityPosture {
            run_as_non_root: config.run_as_non_root.unwrap_or(defaults.run_as_non_root),
            run_as_user: config.run_as_user,
            read_only_root_filesystem: config
                .read_only_root_filesystem
                .unwrap_or(defaults.read_only_root_filesystem),
            drop_capabilities: config
                .drop_capabilities
                .clone()
                .unwrap_or(defaults.drop_capabilities),
            seccomp_profile: config
                .seccomp_profile
                .clone()
                .unwrap_or(defaults.seccomp_profile),
            writable_paths: config.writable_paths.clone(),
        }
    }

    fn dependency(
        &mut self,
        field: &str,
        index: usize,
        workload: &str,
        config: &DependencyConfig,
    ) -> Option<DependencyRef> {
        let dep_field = format!("{}.dependencies[{}]", field, index);

        let target = config.target.clone();
        let port = config.port;
        if target.is_none() {
            self.push(ValidationError::missing(format!("{}.target", dep_field)));
        }
        if port.is_none() {
            self.push(ValidationError::missing(format!("{}.port", dep_field)));
        }
        let (target, port) = (target?, port?);

        if target == workload {
            self.push(ValidationError::invalid(
                &dep_field,
                "a workload cannot depend on itself",
            ));
            return None;
        }

        let protocol = config.protocol.unwrap_or_default();
        let check = match (config.check, protocol) {
            (Some(CheckMethod::None), _) => ReadinessCheck::None,
            // UDP has no connection to wait for
            (None, Protocol::Udp) => ReadinessCheck::None,
            (Some(_), Protocol::Udp) => {
                self.push(ValidationError::invalid(
                    format!("{}.check", dep_field),
                    "UDP dependencies cannot be checked for readiness; use `check: none`",
                ));
                return None;
            }
            (None | Some(CheckMethod::Tcp), Protocol::Tcp) => ReadinessCheck::Tcp,
            (Some(CheckMethod::Http), Protocol::Tcp) => {
                let path = config.path.clone().unwrap_or_else(|| "/".to_string());
                if !HTTP_CHECK_PATH.is_match(&path) {
                    self.push(ValidationError::invalid(
                        format!("{}.path", dep_field),
                        format!(
                            "'{}' must start with '/' and contain no quotes, '$', backticks, backslashes or whitespace",
                            path
                        ),
                    ));
                    return None;
                }
                ReadinessCheck::Http { path }
            }
        };

        Some(DependencyRef {
            target,
            port,
            protocol,
            namespace: config.namespace.clone(),
            check,
            required: config.required.unwrap_or(false),
        })
    }

    fn exposure(
        &mut self,
        field: &str,
        config: &ExposureConfig,
        ports: &[Port],
    ) -> Option<ExposureSpec> {
        let exposure_field = format!("{}.exposure", field);

        let Some(host) = config.host.clone().filter(|h| !h.is_empty()) else {
            self.push(ValidationError::missing(format!("{}.host", exposure_field)));
            return None;
        };

        let paths = if config.paths.is_empty() {
            vec!["/".to_string()]
        } else {
            config.paths.clone()
        };
        if let Some(bad) = paths.iter().find(|p| !p.starts_with('/')) {
            self.push(ValidationError::invalid(
                format!("{}.paths", exposure_field),
                format!("path '{}' must start with '/'", bad),
            ));
        }

        let service_port = match &config.service_port {
            Some(port) if ports.iter().any(|p| &p.name == port) => port.clone(),
            Some(port) => {
                self.push(ValidationError::DanglingReference {
                    kind: ReferenceKind::Port,
                    name: port.clone(),
                    referenced_by: format!("{}.servicePort", exposure_field),
                    suggestion: did_you_mean(port, ports.iter().map(|p| p.name.as_str())),
                });
                return None;
            }
            None => ports.first()?.name.clone(),
        };

        Some(ExposureSpec {
            host,
            paths,
            tls_issuer: config.tls_issuer.clone(),
            ingress_class: config.ingress_class.clone(),
            service_port,
            controller_namespace: config
                .controller_namespace
                .clone()
                .unwrap_or_else(|| DEFAULT_CONTROLLER_NAMESPACE.to_string()),
        })
    }

    fn scaling(&mut self, field: &str, config: &ScalingConfig) -> Option<ScalingSpec> {
        let scaling_field = format!("{}.scaling", field);

        let Some(max_replicas) = config.max_replicas else {
            self.push(ValidationError::missing(format!(
                "{}.maxReplicas",
                scaling_field
            )));
            return None;
        };
        let min_replicas = config.min_replicas.unwrap_or(1);
        let target_utilization = config
            .target_utilization
            .unwrap_or(DEFAULT_TARGET_UTILIZATION);

        if min_replicas < 1 || min_replicas > max_replicas {
            self.push(ValidationError::invalid(
                &scaling_field,
                format!(
                    "expected 1 <= minReplicas <= maxReplicas, got {} and {}",
                    min_replicas, max_replicas
                ),
            ));
            return None;
        }
        if !(1..=100).contains(&target_utilization) {
            self.push(ValidationError::invalid(
                format!("{}.targetUtilization", scaling_field),
                "target utilization is a percentage between 1 and 100",
            ));
            return None;
        }

        Some(ScalingSpec {
            min_replicas,
            max_replicas,
            metric: config.metric.unwrap_or_default(),
            target_utilization,
        })
    }

    fn provenance(&mut self, field: &str, config: &ProvenanceConfig) -> Option<ProvenanceSpec> {
        let provenance_field = format!("{}.provenance", field);
        match (&config.keyless, &config.public_key) {
            (Some(_), Some(_)) | (None, None) => {
                self.push(ValidationError::invalid(
                    provenance_field,
                    "exactly one of `keyless` or `publicKey` must be set",
                ));
                None
            }
            (None, Some(key)) => Some(ProvenanceSpec::PublicKey(key.clone())),
            (Some(keyless), None) => {
                let issuer = keyless.issuer.clone();
                let subject = keyless.subject.clone();
                if issuer.is_none() {
                    self.push(ValidationError::missing(format!(
                        "{}.keyless.issuer",
                        provenance_field
                    )));
                }
                if subject.is_none() {
                    self.push(ValidationError::missing(format!(
                        "{}.keyless.subject",
                        provenance_field
                    )));
                }
                Some(ProvenanceSpec::Keyless {
                    issuer: issuer?,
                    subject: subject?,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> ConfigDocument {
        serde_yaml::from_str(yaml).unwrap()
    }

    const BASE: &str = r#"
apiVersion: deckhand/v1
secrets:
  db-secret:
    keys: [pass]
external:
  redis:
    ports:
      - port: 6379
workloads:
  test:
    image: ghcr.io/acme/test:1.0
    ports:
      - name: http
        port: 3000
    routes: [/healthz]
    env:
      - name: DB_PASSWORD
        secret: db-secret.pass
    probes:
      liveness:
        path: /healthz
    dependencies:
      - target: redis
        port: 6379
        required: true
"#;

    #[test]
    fn test_valid_document_normalized() {
        let doc = validate(&parse(BASE)).unwrap();
        assert_eq!(doc.namespace, "default");

        let test = doc.workload("test").unwrap();
        assert_eq!(test.spec.replicas, 1);
        assert!(test.spec.security.run_as_non_root);
        assert_eq!(test.spec.security.drop_capabilities, vec!["ALL"]);
        assert_eq!(test.spec.probes.liveness.as_ref().unwrap().port, "http");
        assert_eq!(test.spec.probes.liveness.as_ref().unwrap().period_seconds, 10);
        assert_eq!(
            test.spec.secret_refs(),
            vec![SecretRef {
                name: "db-secret".into(),
                key: "pass".into(),
                field: "DB_PASSWORD".into(),
            }]
        );
        assert_eq!(test.spec.dependencies[0].check, ReadinessCheck::Tcp);
        assert!(test.exposure.is_none());
        assert!(test.scaling.is_none());
        assert_eq!(doc.graph.dependencies_of("test").count(), 1);
    }

    #[test]
    fn test_missing_fields_all_reported() {
        let errors = validate(&parse(
            r#"
workloads:
  test:
    dependencies:
      - port: 6379
"#,
        ))
        .unwrap_err();

        let missing: Vec<String> = errors
            .iter()
            .filter_map(|e| match e {
                ValidationError::MissingField { field } => Some(field.clone()),
                _ => None,
            })
            .collect();
        assert!(missing.contains(&"apiVersion".to_string()));
        assert!(missing.contains(&"workloads.test.image".to_string()));
        assert!(missing.contains(&"workloads.test.ports".to_string()));
        assert!(missing.contains(&"workloads.test.dependencies[0].target".to_string()));
    }

    #[test]
    fn test_dangling_secret_with_suggestion() {
        let yaml = BASE.replace("secret: db-secret.pass", "secret: db-secrt.pass");
        let errors = validate(&parse(&yaml)).unwrap_err();
        assert_eq!(errors.len(), 1);
        match &errors.errors[0] {
            ValidationError::DanglingReference {
                kind,
                name,
                suggestion,
                ..
            } => {
                assert_eq!(*kind, ReferenceKind::Secret);
                assert_eq!(name, "db-secrt");
                assert_eq!(suggestion.as_deref(), Some("did you mean 'db-secret'?"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_dangling_secret_key() {
        let yaml = BASE.replace("secret: db-secret.pass", "secret: db-secret.password");
        let errors = validate(&parse(&yaml)).unwrap_err();
        assert!(matches!(
            errors.errors[0],
            ValidationError::DanglingReference {
                kind: ReferenceKind::SecretKey,
                ..
            }
        ));
    }

    #[test]
    fn test_malformed_secret_reference() {
        let yaml = BASE.replace("secret: db-secret.pass", "secret: db-secret");
        let errors = validate(&parse(&yaml)).unwrap_err();
        assert!(errors.contains_code("invalid_reference"));
    }

    #[test]
    fn test_dangling_dependency() {
        let yaml = BASE.replace("target: redis", "target: rediss");
        let errors = validate(&parse(&yaml)).unwrap_err();
        match &errors.errors[0] {
            ValidationError::DanglingReference {
                kind, suggestion, ..
            } => {
                assert_eq!(*kind, ReferenceKind::Service);
                assert_eq!(suggestion.as_deref(), Some("did you mean 'redis'?"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_dependency_port_must_exist() {
        let yaml = BASE.replace("port: 6379\n        required", "port: 6380\n        required");
        let errors = validate(&parse(&yaml)).unwrap_err();
        assert!(matches!(
            errors.errors[0],
            ValidationError::DanglingReference {
                kind: ReferenceKind::Port,
                ..
            }
        ));
    }

    #[test]
    fn test_probe_route_must_be_declared() {
        let yaml = BASE.replace("path: /healthz", "path: /health");
        let errors = validate(&parse(&yaml)).unwrap_err();
        match &errors.errors[0] {
            ValidationError::DanglingReference { kind, name, .. } => {
                assert_eq!(*kind, ReferenceKind::Route);
                assert_eq!(name, "/health");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_conflicting_port_with_sidecar() {
        let yaml = BASE.replace(
            "    routes: [/healthz]",
            "    routes: [/healthz]\n    sidecars:\n      - name: proxy\n        image: envoy:1.30\n        ports:\n          - port: 3000",
        );
        let errors = validate(&parse(&yaml)).unwrap_err();
        assert_eq!(
            errors.errors[0],
            ValidationError::ConflictingPort {
                workload: "test".into(),
                port: 3000,
                first: "test".into(),
                second: "proxy".into(),
            }
        );
    }

    #[test]
    fn test_same_number_different_protocol_is_fine() {
        let yaml = BASE.replace(
            "      - name: http\n        port: 3000",
            "      - name: http\n        port: 3000\n      - name: metrics-udp\n        port: 3000\n        protocol: UDP",
        );
        assert!(validate(&parse(&yaml)).is_ok());
    }

    #[test]
    fn test_scaling_bounds() {
        let yaml = format!(
            "{}    scaling:\n      minReplicas: 6\n      maxReplicas: 5\n",
            BASE
        );
        let errors = validate(&parse(&yaml)).unwrap_err();
        assert!(errors.contains_code("invalid_value"));
    }

    #[test]
    fn test_scaling_defaults() {
        let yaml = format!("{}    scaling:\n      maxReplicas: 5\n", BASE);
        let doc = validate(&parse(&yaml)).unwrap();
        let scaling = doc.workload("test").unwrap().scaling.clone().unwrap();
        assert_eq!(scaling.min_replicas, 1);
        assert_eq!(scaling.target_utilization, 80);
        assert_eq!(scaling.clamp(9), 5);
    }

    #[test]
    fn test_udp_dependency_defaults_to_no_check() {
        let yaml = r#"
apiVersion: deckhand/v1
external:
  kube-dns:
    namespace: kube-system
    selector:
      k8s-app: kube-dns
    ports:
      - port: 53
        protocol: UDP
workloads:
  api:
    image: api:1
    ports:
      - port: 8080
    dependencies:
      - target: kube-dns
        port: 53
        protocol: UDP
        required: true
"#;
        let doc = validate(&parse(yaml)).unwrap();
        let dep = &doc.workload("api").unwrap().spec.dependencies[0];
        assert_eq!(dep.check, ReadinessCheck::None);
    }

    #[test]
    fn test_udp_dependency_rejects_tcp_check() {
        let yaml = r#"
apiVersion: deckhand/v1
external:
  dns:
    ports:
      - port: 53
        protocol: UDP
workloads:
  api:
    image: api:1
    ports:
      - port: 8080
    dependencies:
      - target: dns
        port: 53
        protocol: UDP
        check: tcp
"#;
        let errors = validate(&parse(yaml)).unwrap_err();
        assert!(errors.contains_code("invalid_value"));
    }

    #[test]
    fn test_dependency_protocol_must_match_port() {
        let yaml = BASE.replace(
            "port: 6379\n        required",
            "port: 6379\n        protocol: UDP\n        check: none\n        required",
        );
        let errors = validate(&parse(&yaml)).unwrap_err();
        assert_eq!(errors.len(), 1);
        match &errors.errors[0] {
            ValidationError::DanglingReference {
                kind,
                name,
                suggestion,
                ..
            } => {
                assert_eq!(*kind, ReferenceKind::Port);
                assert_eq!(name, "6379/UDP");
                assert_eq!(suggestion.as_deref(), Some("'redis' exposes: 6379/TCP"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    fn with_http_check(path: &str) -> String {
        BASE.replace(
            "port: 6379\n        required",
            &format!("port: 6379\n        check: http\n        path: '{}'\n        required", path),
        )
    }

    #[test]
    fn test_http_check_path() {
        let doc = validate(&parse(&with_http_check("/ready?full=1"))).unwrap();
        assert_eq!(
            doc.workload("test").unwrap().spec.dependencies[0].check,
            ReadinessCheck::Http {
                path: "/ready?full=1".into()
            }
        );
    }

    #[test]
    fn test_http_check_path_must_be_absolute() {
        let errors = validate(&parse(&with_http_check("ready"))).unwrap_err();
        assert_eq!(
            errors.errors[0],
            ValidationError::InvalidValue {
                field: "workloads.test.dependencies[0].path".into(),
                message: "'ready' must start with '/' and contain no quotes, '$', backticks, backslashes or whitespace".into(),
            }
        );
    }

    #[test]
    fn test_http_check_path_rejects_shell_characters() {
        for path in [
            r#"/ready"; rm -rf /data; echo ""#,
            "/$(id)",
            "/`id`",
            r"/a\b",
            "/a b",
        ] {
            let yaml = BASE.replace(
                "port: 6379\n        required",
                &format!(
                    "port: 6379\n        check: http\n        path: {}\n        required",
                    serde_json::to_string(path).unwrap()
                ),
            );
            let errors = validate(&parse(&yaml)).unwrap_err();
            assert!(errors.contains_code("invalid_value"), "accepted {:?}", path);
        }
    }

    #[test]
    fn test_gate_without_dns_dependency() {
        let doc = validate(&parse(BASE)).unwrap();
        assert!(gate_lacks_dns(&doc.workload("test").unwrap().spec));

        let yaml = BASE
            .replace(
                "external:\n",
                "external:\n  kube-dns:\n    namespace: kube-system\n    ports:\n      - port: 53\n        protocol: UDP\n",
            )
            .replace(
                "        required: true\n",
                "        required: true\n      - target: kube-dns\n        port: 53\n        protocol: UDP\n",
            );
        let doc = validate(&parse(&yaml)).unwrap();
        assert!(!gate_lacks_dns(&doc.workload("test").unwrap().spec));

        let ungated = BASE.replace("        required: true\n", "");
        let doc = validate(&parse(&ungated)).unwrap();
        assert!(!gate_lacks_dns(&doc.workload("test").unwrap().spec));
    }

    #[test]
    fn test_workload_to_workload_dependency() {
        let yaml = r#"
apiVersion: deckhand/v1
workloads:
  web:
    image: web:1
    ports:
      - port: 8080
    dependencies:
      - target: api
        port: 9000
  api:
    image: api:1
    ports:
      - port: 9000
"#;
        let doc = validate(&parse(yaml)).unwrap();
        let callers = doc.graph.callers_of("api");
        assert_eq!(callers.len(), 1);
        assert_eq!(callers[0].caller, "web");
    }

    #[test]
    fn test_exposure_defaults() {
        let yaml = format!("{}    exposure:\n      host: test.example.com\n", BASE);
        let doc = validate(&parse(&yaml)).unwrap();
        let exposure = doc.workload("test").unwrap().exposure.clone().unwrap();
        assert_eq!(exposure.paths, vec!["/"]);
        assert_eq!(exposure.service_port, "http");
        assert_eq!(exposure.controller_namespace, "ingress-nginx");
    }

    #[test]
    fn test_provenance_requires_exactly_one() {
        let yaml = format!("{}    provenance: {{}}\n", BASE);
        let errors = validate(&parse(&yaml)).unwrap_err();
        assert!(errors.contains_code("invalid_value"));
    }

    #[test]
    fn test_wrong_api_version() {
        let yaml = BASE.replace("deckhand/v1", "deckhand/v2");
        let errors = validate(&parse(&yaml)).unwrap_err();
        assert!(matches!(
            &errors.errors[0],
            ValidationError::InvalidValue { field, .. } if field == "apiVersion"
        ));
    }

    #[test]
    fn test_did_you_mean() {
        assert_eq!(
            did_you_mean("reddis", ["redis", "postgres"]),
            Some("did you mean 'redis'?".to_string())
        );
        assert_eq!(did_you_mean("kafka", ["redis", "postgres"]), None);
    }
}
