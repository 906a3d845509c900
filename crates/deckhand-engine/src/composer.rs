//! Typed Kubernetes objects for a workload
//!
//! Every function here is pure: the identity labels are passed in, never
//! recomputed, so all selectors in a bundle come from the same value.

use std::collections::BTreeMap;

use deckhand_core::{
    EnvBinding, ExposureSpec, IdentityLabels, Port, Probe, Resources, ScalingSpec,
    SecurityPosture, Sidecar, WorkloadSpec,
};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
    MetricSpec, MetricTarget, ResourceMetricSource,
};
use k8s_openapi::api::core::v1::{
    Capabilities, Container, ContainerPort, EmptyDirVolumeSource, EnvVar, EnvVarSource,
    HTTPGetAction, PodSpec, PodTemplateSpec, Probe as K8sProbe, ResourceRequirements,
    SeccompProfile, SecretKeySelector, SecurityContext, Service, ServiceAccount, ServicePort,
    ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// Annotation read by cert-manager to issue the ingress certificate
pub const CLUSTER_ISSUER_ANNOTATION: &str = "cert-manager.io/cluster-issuer";

fn metadata(spec: &WorkloadSpec, identity: &IdentityLabels) -> ObjectMeta {
    ObjectMeta {
        name: Some(spec.name.clone()),
        namespace: Some(spec.namespace.clone()),
        labels: Some(identity.metadata_labels()),
        ..Default::default()
    }
}

fn selector(identity: &IdentityLabels) -> LabelSelector {
    LabelSelector {
        match_labels: Some(identity.to_map()),
        ..Default::default()
    }
}

// =============================================================================
// ServiceAccount / Service
// =============================================================================

pub fn service_account(spec: &WorkloadSpec, identity: &IdentityLabels) -> ServiceAccount {
    ServiceAccount {
        metadata: metadata(spec, identity),
        automount_service_account_token: Some(false),
        ..Default::default()
    }
}

pub fn service(spec: &WorkloadSpec, identity: &IdentityLabels) -> Service {
    Service {
        metadata: metadata(spec, identity),
        spec: Some(ServiceSpec {
            selector: Some(identity.to_map()),
            ports: Some(
                spec.ports
                    .iter()
                    .map(|p| ServicePort {
                        name: Some(p.name.clone()),
                        port: i32::from(p.port),
                        protocol: Some(p.protocol.as_str().to_string()),
                        target_port: Some(IntOrString::String(p.name.clone())),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

// =============================================================================
// Deployment
// =============================================================================

/// Container-level security context for a posture
pub fn security_context(posture: &SecurityPosture) -> SecurityContext {
    SecurityContext {
        run_as_non_root: Some(posture.run_as_non_root),
        run_as_user: posture.run_as_user,
        read_only_root_filesystem: Some(posture.read_only_root_filesystem),
        allow_privilege_escalation: Some(false),
        capabilities: Some(Capabilities {
            drop: Some(posture.drop_capabilities.clone()),
            add: None,
        }),
        seccomp_profile: Some(SeccompProfile {
            type_: posture.seccomp_profile.clone(),
            localhost_profile: None,
        }),
        ..Default::default()
    }
}

fn container_ports(ports: &[Port]) -> Option<Vec<ContainerPort>> {
    if ports.is_empty() {
        return None;
    }
    Some(
        ports
            .iter()
            .map(|p| ContainerPort {
                name: Some(p.name.clone()),
                container_port: i32::from(p.port),
                protocol: Some(p.protocol.as_str().to_string()),
                ..Default::default()
            })
            .collect(),
    )
}

fn quantities(map: &BTreeMap<String, String>) -> Option<BTreeMap<String, Quantity>> {
    if map.is_empty() {
        return None;
    }
    Some(
        map.iter()
            .map(|(k, v)| (k.clone(), Quantity(v.clone())))
            .collect(),
    )
}

fn resource_requirements(resources: &Resources) -> Option<ResourceRequirements> {
    if resources.is_empty() {
        return None;
    }
    Some(ResourceRequirements {
        requests: quantities(&resources.requests),
        limits: quantities(&resources.limits),
        ..Default::default()
    })
}

fn env_vars(env: &[EnvBinding]) -> Option<Vec<EnvVar>> {
    if env.is_empty() {
        return None;
    }
    Some(
        env.iter()
            .map(|binding| match binding {
                EnvBinding::Literal { name, value } => EnvVar {
                    name: name.clone(),
                    value: Some(value.clone()),
                    value_from: None,
                },
                EnvBinding::Secret(secret) => EnvVar {
                    name: secret.field.clone(),
                    value: None,
                    value_from: Some(EnvVarSource {
                        secret_key_ref: Some(SecretKeySelector {
                            name: secret.name.clone().into(),
                            key: secret.key.clone(),
                            optional: None,
                        }),
                        ..Default::default()
                    }),
                },
            })
            .collect(),
    )
}

fn probe(probe: Option<&Probe>) -> Option<K8sProbe> {
    probe.map(|p| K8sProbe {
        http_get: Some(HTTPGetAction {
            path: Some(p.path.clone()),
            port: IntOrString::String(p.port.clone()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(p.initial_delay_seconds),
        period_seconds: Some(p.period_seconds),
        ..Default::default()
    })
}

fn writable_volume_name(index: usize) -> String {
    format!("writable-{}", index)
}

fn main_container(spec: &WorkloadSpec, security: &SecurityContext) -> Container {
    let mounts: Vec<VolumeMount> = spec
        .security
        .writable_paths
        .iter()
        .enumerate()
        .map(|(i, path)| VolumeMount {
            name: writable_volume_name(i),
            mount_path: path.clone(),
            ..Default::default()
        })
        .collect();

    Container {
        name: spec.name.clone(),
        image: Some(spec.image.clone()),
        ports: container_ports(&spec.ports),
        env: env_vars(&spec.env),
        resources: resource_requirements(&spec.resources),
        liveness_probe: probe(spec.probes.liveness.as_ref()),
        readiness_probe: probe(spec.probes.readiness.as_ref()),
        startup_probe: probe(spec.probes.startup.as_ref()),
        security_context: Some(security.clone()),
        volume_mounts: (!mounts.is_empty()).then_some(mounts),
        ..Default::default()
    }
}

fn sidecar_container(sidecar: &Sidecar, security: &SecurityContext) -> Container {
    Container {
        name: sidecar.name.clone(),
        image: Some(sidecar.image.clone()),
        ports: container_ports(&sidecar.ports),
        resources: resource_requirements(&sidecar.resources),
        security_context: Some(security.clone()),
        ..Default::default()
    }
}

/// Parts of the Deployment that come from other emitters
#[derive(Debug, Default)]
pub struct DeploymentInputs {
    /// `None` leaves replica count to the autoscaler
    pub replicas: Option<i32>,
    pub init_container: Option<Container>,
    pub pod_annotations: BTreeMap<String, String>,
}

pub fn deployment(
    spec: &WorkloadSpec,
    identity: &IdentityLabels,
    security: &SecurityContext,
    inputs: DeploymentInputs,
) -> Deployment {
    let containers = std::iter::once(main_container(spec, security))
        .chain(spec.sidecars.iter().map(|s| sidecar_container(s, security)))
        .collect();

    let volumes: Vec<Volume> = (0..spec.security.writable_paths.len())
        .map(|i| Volume {
            name: writable_volume_name(i),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        })
        .collect();

    let pod_metadata = ObjectMeta {
        labels: Some(identity.metadata_labels()),
        annotations: (!inputs.pod_annotations.is_empty()).then_some(inputs.pod_annotations),
        ..Default::default()
    };

    Deployment {
        metadata: metadata(spec, identity),
        spec: Some(DeploymentSpec {
            replicas: inputs.replicas,
            selector: selector(identity),
            template: PodTemplateSpec {
                metadata: Some(pod_metadata),
                spec: Some(PodSpec {
                    service_account_name: Some(spec.name.clone()),
                    automount_service_account_token: Some(false),
                    init_containers: inputs.init_container.map(|c| vec![c]),
                    containers,
                    node_selector: (!spec.node_selector.is_empty())
                        .then(|| spec.node_selector.clone()),
                    volumes: (!volumes.is_empty()).then_some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

// =============================================================================
// Disruption / scaling / exposure
// =============================================================================

pub fn pod_disruption_budget(spec: &WorkloadSpec, identity: &IdentityLabels) -> PodDisruptionBudget {
    PodDisruptionBudget {
        metadata: metadata(spec, identity),
        spec: Some(PodDisruptionBudgetSpec {
            min_available: Some(IntOrString::Int(spec.disruption.min_available)),
            selector: Some(selector(identity)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn horizontal_pod_autoscaler(
    spec: &WorkloadSpec,
    identity: &IdentityLabels,
    scaling: &ScalingSpec,
) -> HorizontalPodAutoscaler {
    HorizontalPodAutoscaler {
        metadata: metadata(spec, identity),
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name: spec.name.clone(),
            },
            min_replicas: Some(scaling.min_replicas),
            max_replicas: scaling.max_replicas,
            metrics: Some(vec![MetricSpec {
                type_: "Resource".to_string(),
                resource: Some(ResourceMetricSource {
                    name: scaling.metric.resource_name().to_string(),
                    target: MetricTarget {
                        type_: "Utilization".to_string(),
                        average_utilization: Some(scaling.target_utilization),
                        ..Default::default()
                    },
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn ingress(spec: &WorkloadSpec, identity: &IdentityLabels, exposure: &ExposureSpec) -> Ingress {
    let mut meta = metadata(spec, identity);
    if let Some(issuer) = &exposure.tls_issuer {
        meta.annotations = Some(BTreeMap::from([(
            CLUSTER_ISSUER_ANNOTATION.to_string(),
            issuer.clone(),
        )]));
    }

    let paths = exposure
        .paths
        .iter()
        .map(|path| HTTPIngressPath {
            path: Some(path.clone()),
            path_type: "Prefix".to_string(),
            backend: IngressBackend {
                service: Some(IngressServiceBackend {
                    name: spec.name.clone(),
                    port: Some(ServiceBackendPort {
                        name: Some(exposure.service_port.clone()),
                        number: None,
                    }),
                }),
                resource: None,
            },
        })
        .collect();

    Ingress {
        metadata: meta,
        spec: Some(IngressSpec {
            ingress_class_name: exposure.ingress_class.clone(),
            rules: Some(vec![IngressRule {
                host: Some(exposure.host.clone()),
                http: Some(HTTPIngressRuleValue { paths }),
            }]),
            tls: Some(vec![IngressTLS {
                hosts: Some(vec![exposure.host.clone()]),
                secret_name: Some(format!("{}-tls", spec.name)),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
