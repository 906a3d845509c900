//! Rendered resource bundle of one workload

use std::collections::BTreeMap;

use deckhand_core::IdentityLabels;
use indexmap::IndexMap;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{Service, ServiceAccount};
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use serde::Serialize;

use crate::error::{RenderError, Result};
use crate::policy::pod_selector_labels;
use crate::provenance::ImagePolicy;

/// All resources rendered for one workload
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceBundle {
    pub workload: String,
    pub namespace: String,
    pub service_account: ServiceAccount,
    pub service: Service,
    pub deployment: Deployment,
    pub pod_disruption_budget: PodDisruptionBudget,
    pub horizontal_pod_autoscaler: Option<HorizontalPodAutoscaler>,
    pub ingress: Option<Ingress>,
    pub network_policy: NetworkPolicy,
    pub image_policy: Option<ImagePolicy>,
}

/// A borrowed view of one resource in a bundle
#[derive(Debug, Clone, Copy)]
pub enum BundleResource<'a> {
    ServiceAccount(&'a ServiceAccount),
    Service(&'a Service),
    Deployment(&'a Deployment),
    PodDisruptionBudget(&'a PodDisruptionBudget),
    HorizontalPodAutoscaler(&'a HorizontalPodAutoscaler),
    Ingress(&'a Ingress),
    NetworkPolicy(&'a NetworkPolicy),
    ImagePolicy(&'a ImagePolicy),
}

impl BundleResource<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServiceAccount(_) => "ServiceAccount",
            Self::Service(_) => "Service",
            Self::Deployment(_) => "Deployment",
            Self::PodDisruptionBudget(_) => "PodDisruptionBudget",
            Self::HorizontalPodAutoscaler(_) => "HorizontalPodAutoscaler",
            Self::Ingress(_) => "Ingress",
            Self::NetworkPolicy(_) => "NetworkPolicy",
            Self::ImagePolicy(_) => "Policy",
        }
    }

    /// File name stem used for `--output-dir`
    fn file_stem(&self) -> &'static str {
        match self {
            Self::ServiceAccount(_) => "serviceaccount",
            Self::Service(_) => "service",
            Self::Deployment(_) => "deployment",
            Self::PodDisruptionBudget(_) => "pdb",
            Self::HorizontalPodAutoscaler(_) => "hpa",
            Self::Ingress(_) => "ingress",
            Self::NetworkPolicy(_) => "networkpolicy",
            Self::ImagePolicy(_) => "imagepolicy",
        }
    }

    pub fn name(&self) -> Option<&str> {
        let metadata = match self {
            Self::ServiceAccount(r) => &r.metadata,
            Self::Service(r) => &r.metadata,
            Self::Deployment(r) => &r.metadata,
            Self::PodDisruptionBudget(r) => &r.metadata,
            Self::HorizontalPodAutoscaler(r) => &r.metadata,
            Self::Ingress(r) => &r.metadata,
            Self::NetworkPolicy(r) => &r.metadata,
            Self::ImagePolicy(r) => &r.metadata,
        };
        metadata.name.as_deref()
    }

    /// `Kind/name`, as used in logs and apply outcomes
    pub fn id(&self) -> String {
        format!("{}/{}", self.kind(), self.name().unwrap_or_default())
    }

    pub fn to_yaml(&self) -> Result<String> {
        match self {
            Self::ServiceAccount(r) => yaml(r),
            Self::Service(r) => yaml(r),
            Self::Deployment(r) => yaml(r),
            Self::PodDisruptionBudget(r) => yaml(r),
            Self::HorizontalPodAutoscaler(r) => yaml(r),
            Self::Ingress(r) => yaml(r),
            Self::NetworkPolicy(r) => yaml(r),
            Self::ImagePolicy(r) => yaml(r),
        }
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        let value = match self {
            Self::ServiceAccount(r) => serde_json::to_value(r),
            Self::Service(r) => serde_json::to_value(r),
            Self::Deployment(r) => serde_json::to_value(r),
            Self::PodDisruptionBudget(r) => serde_json::to_value(r),
            Self::HorizontalPodAutoscaler(r) => serde_json::to_value(r),
            Self::Ingress(r) => serde_json::to_value(r),
            Self::NetworkPolicy(r) => serde_json::to_value(r),
            Self::ImagePolicy(r) => serde_json::to_value(r),
        }?;
        Ok(value)
    }
}

fn yaml<T: Serialize>(resource: &T) -> Result<String> {
    Ok(serde_yaml::to_string(resource)?)
}

impl ResourceBundle {
    /// Resources in apply order
    pub fn resources(&self) -> Vec<BundleResource<'_>> {
        let mut resources = vec![
            BundleResource::ServiceAccount(&self.service_account),
            BundleResource::Service(&self.service),
            BundleResource::Deployment(&self.deployment),
            BundleResource::PodDisruptionBudget(&self.pod_disruption_budget),
        ];
        resources.extend(
            self.horizontal_pod_autoscaler
                .as_ref()
                .map(BundleResource::HorizontalPodAutoscaler),
        );
        resources.extend(self.ingress.as_ref().map(BundleResource::Ingress));
        resources.push(BundleResource::NetworkPolicy(&self.network_policy));
        resources.extend(self.image_policy.as_ref().map(BundleResource::ImagePolicy));
        resources
    }

    /// Rendered manifests keyed by file name, in apply order
    pub fn manifests(&self) -> Result<IndexMap<String, String>> {
        self.resources()
            .iter()
            .map(|r| {
                Ok((
                    format!("{}-{}.yaml", self.workload, r.file_stem()),
                    r.to_yaml()?,
                ))
            })
            .collect()
    }

    /// A single `---`-separated YAML stream
    pub fn to_yaml(&self) -> Result<String> {
        let mut out = String::new();
        for (file, content) in self.manifests()? {
            out.push_str("---\n");
            out.push_str(&format!("# Source: {}\n", file));
            out.push_str(&content);
            if !content.ends_with('\n') {
                out.push('\n');
            }
        }
        Ok(out)
    }

    /// Pod-template annotation value, if set
    pub fn pod_annotation(&self, key: &str) -> Option<&str> {
        self.deployment
            .spec
            .as_ref()?
            .template
            .metadata
            .as_ref()?
            .annotations
            .as_ref()?
            .get(key)
            .map(String::as_str)
    }

    /// Check that every selector in the bundle selects exactly the identity
    /// labels, and that the pod template carries them.
    pub fn verify_selectors(&self, identity: &IdentityLabels) -> Result<()> {
        let expected = identity.as_map();
        let mismatch = |resource: &str, found: Option<&BTreeMap<String, String>>| {
            RenderError::SelectorMismatch {
                resource: resource.to_string(),
                expected: format_labels(Some(expected)),
                found: format_labels(found),
            }
        };

        let deployment = self.deployment.spec.as_ref();
        let deployment_selector = deployment.and_then(|s| s.selector.match_labels.as_ref());
        if deployment_selector != Some(expected) {
            return Err(mismatch("Deployment selector", deployment_selector));
        }

        let template_labels = deployment.and_then(|s| s.template.metadata.as_ref()?.labels.as_ref());
        let carries_identity = template_labels
            .is_some_and(|labels| expected.iter().all(|(k, v)| labels.get(k) == Some(v)));
        if !carries_identity {
            return Err(mismatch("Deployment pod template", template_labels));
        }

        let service_selector = self.service.spec.as_ref().and_then(|s| s.selector.as_ref());
        if service_selector != Some(expected) {
            return Err(mismatch("Service", service_selector));
        }

        let pdb_selector = self
            .pod_disruption_budget
            .spec
            .as_ref()
            .and_then(|s| s.selector.as_ref()?.match_labels.as_ref());
        if pdb_selector != Some(expected) {
            return Err(mismatch("PodDisruptionBudget", pdb_selector));
        }

        let policy_selector = pod_selector_labels(&self.network_policy);
        if policy_selector.as_ref() != Some(expected) {
            return Err(mismatch("NetworkPolicy", policy_selector.as_ref()));
        }

        if let Some(policy) = &self.image_policy {
            if policy.selector_labels() != Some(expected) {
                return Err(mismatch("Policy", policy.selector_labels()));
            }
        }

        if let Some(hpa) = &self.horizontal_pod_autoscaler {
            let target = hpa.spec.as_ref().map(|s| &s.scale_target_ref);
            let deployment_name = self.deployment.metadata.name.as_deref();
            if !target.is_some_and(|t| t.kind == "Deployment" && Some(t.name.as_str()) == deployment_name)
            {
                return Err(RenderError::SelectorMismatch {
                    resource: "HorizontalPodAutoscaler target".to_string(),
                    expected: format!("Deployment/{}", deployment_name.unwrap_or_default()),
                    found: target
                        .map(|t| format!("{}/{}", t.kind, t.name))
                        .unwrap_or_default(),
                });
            }
        }

        Ok(())
    }
}

fn format_labels(labels: Option<&BTreeMap<String, String>>) -> String {
    match labels {
        None => "nothing".to_string(),
        Some(labels) => {
            let pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            format!("{{{}}}", pairs.join(","))
        }
    }
}
