//! Workload renderer

use std::collections::BTreeMap;

use deckhand_core::{
    DependencyGraph, ExposureSpec, IdentityLabels, ScalingSpec, ValidatedDocument, WorkloadSpec,
    did_you_mean,
};

use crate::bundle::ResourceBundle;
use crate::composer::{self, DeploymentInputs};
use crate::error::{RenderError, Result};
use crate::fingerprint::{SECRET_CHECKSUM_ANNOTATION, SecretContentSource, fingerprint};
use crate::gate::gate;
use crate::{policy, provenance};

/// Whether the bundle is for a first install or an update of a running
/// workload.
///
/// Only matters for autoscaled workloads: an upgrade render omits
/// `spec.replicas` so applying it never overrides the autoscaler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderMode {
    #[default]
    Install,
    Upgrade,
}

/// Renderer builder
pub struct RendererBuilder {
    mode: RenderMode,
}

impl Default for RendererBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RendererBuilder {
    pub fn new() -> Self {
        Self {
            mode: RenderMode::Install,
        }
    }

    pub fn mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }

    /// Shorthand for `mode(RenderMode::Upgrade)` when `upgrade` is set
    pub fn upgrade(self, upgrade: bool) -> Self {
        self.mode(if upgrade {
            RenderMode::Upgrade
        } else {
            RenderMode::Install
        })
    }

    pub fn build(self) -> Renderer {
        Renderer::new(self.mode)
    }
}

/// Turns validated workloads into resource bundles.
///
/// Rendering is deterministic and performs no I/O beyond the secret content
/// lookups of the given source.
#[derive(Debug, Clone, Copy, Default)]
pub struct Renderer {
    mode: RenderMode,
}

impl Renderer {
    pub fn new(mode: RenderMode) -> Self {
        Self { mode }
    }

    pub fn builder() -> RendererBuilder {
        RendererBuilder::new()
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Render one workload.
    ///
    /// `graph` must contain the workload's dependencies and callers; it is
    /// the graph built while validating the workload's document.
    pub fn render(
        &self,
        spec: &WorkloadSpec,
        exposure: Option<&ExposureSpec>,
        scaling: Option<&ScalingSpec>,
        graph: &DependencyGraph,
        secrets: &dyn SecretContentSource,
    ) -> Result<ResourceBundle> {
        tracing::debug!(workload = %spec.name, mode = ?self.mode, "rendering workload");

        let identity = IdentityLabels::for_workload(&spec.name);
        let security = composer::security_context(&spec.security);

        let secret_refs = spec.secret_refs();
        let mut pod_annotations = BTreeMap::new();
        if !secret_refs.is_empty() {
            let digest = fingerprint(&secret_refs, secrets)?;
            tracing::debug!(workload = %spec.name, secrets = secret_refs.len(), %digest, "computed secret fingerprint");
            pod_annotations.insert(SECRET_CHECKSUM_ANNOTATION.to_string(), digest);
        }

        let replicas = match (scaling, self.mode) {
            (None, _) => Some(spec.replicas),
            (Some(scaling), RenderMode::Install) => Some(scaling.clamp(spec.replicas)),
            (Some(_), RenderMode::Upgrade) => None,
        };

        let init_container = gate(&spec.dependencies, &spec.gate).init_container(&security)?;

        let bundle = ResourceBundle {
            workload: spec.name.clone(),
            namespace: spec.namespace.clone(),
            service_account: composer::service_account(spec, &identity),
            service: composer::service(spec, &identity),
            deployment: composer::deployment(
                spec,
                &identity,
                &security,
                DeploymentInputs {
                    replicas,
                    init_container,
                    pod_annotations,
                },
            ),
            pod_disruption_budget: composer::pod_disruption_budget(spec, &identity),
            horizontal_pod_autoscaler: scaling
                .map(|s| composer::horizontal_pod_autoscaler(spec, &identity, s)),
            ingress: exposure.map(|e| composer::ingress(spec, &identity, e)),
            network_policy: policy::emit(spec, &identity, graph, exposure)?,
            image_policy: spec
                .provenance
                .as_ref()
                .map(|p| provenance::emit(spec, &identity, p)),
        };

        bundle.verify_selectors(&identity)?;
        Ok(bundle)
    }

    /// Render a workload of a validated document by name
    pub fn render_workload(
        &self,
        doc: &ValidatedDocument,
        name: &str,
        secrets: &dyn SecretContentSource,
    ) -> Result<ResourceBundle> {
        let workload = doc
            .workload(name)
            .ok_or_else(|| RenderError::UnknownWorkload {
                name: name.to_string(),
                suggestion: did_you_mean(name, doc.workload_names()),
            })?;

        self.render(
            &workload.spec,
            workload.exposure.as_ref(),
            workload.scaling.as_ref(),
            &doc.graph,
            secrets,
        )
    }

    /// Render every workload of a document, in name order
    pub fn render_all(
        &self,
        doc: &ValidatedDocument,
        secrets: &dyn SecretContentSource,
    ) -> Result<Vec<ResourceBundle>> {
        doc.workload_names()
            .map(|name| self.render_workload(doc, name, secrets))
            .collect()
    }
}
