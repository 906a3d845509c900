//! Server-side apply of rendered bundles
//!
//! Resources are applied one at a time in bundle order. The first resource
//! the cluster refuses stops the apply, and the refusal message is passed
//! back untouched.
//!
//! Autoscaled workloads that are already running are rendered without
//! `spec.replicas`. Dropping a field from an apply configuration deletes it
//! when the applier is its only manager, which would reset the Deployment to
//! one replica. Before such an apply the live count is therefore re-applied
//! under [`HANDOVER_FIELD_MANAGER`], following the Kubernetes procedure for
//! transferring ownership of a field to a controller: the autoscaler takes
//! the field over the next time it scales.

use deckhand_engine::{RenderMode, ResourceBundle};
use k8s_openapi::api::apps::v1::Deployment;
use kube::{
    Client,
    api::{Api, DynamicObject, Patch, PatchParams},
    core::{GroupVersionKind, TypeMeta},
    discovery::{Discovery, Scope},
};

use crate::error::{KubeError, Result};

/// Field manager name for Server-Side Apply
pub const FIELD_MANAGER: &str = "deckhand";

/// Field manager holding `spec.replicas` while it passes to the autoscaler
pub const HANDOVER_FIELD_MANAGER: &str = "deckhand-handover-to-hpa";

/// API groups a bundle can contain
const BUNDLE_GROUPS: &[&str] = &[
    "",
    "apps",
    "autoscaling",
    "policy",
    "networking.k8s.io",
    "kyverno.io",
];

/// Result of applying a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Every resource was accepted
    Applied { resources: Vec<String> },
    /// The cluster (or an admission controller) refused `resource`
    Rejected {
        resource: String,
        reason: String,
        /// Resources accepted before the rejection
        applied: Vec<String>,
    },
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Resources the cluster accepted
    pub fn applied(&self) -> &[String] {
        match self {
            Self::Applied { resources } => resources,
            Self::Rejected { applied, .. } => applied,
        }
    }
}

/// The part of a running Deployment that decides how it is updated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveDeployment {
    pub replicas: Option<i32>,
}

/// How one workload is rendered and applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyPlan {
    pub mode: RenderMode,
    /// Replica count to hand over to the autoscaler before applying
    pub hand_over: Option<i32>,
}

impl ApplyPlan {
    /// Plan the apply of a workload.
    ///
    /// A workload whose Deployment already exists is upgraded; `force_upgrade`
    /// upgrades regardless. Upgrading an autoscaled workload hands its live
    /// replica count over first.
    pub fn new(force_upgrade: bool, scaled: bool, live: Option<LiveDeployment>) -> Self {
        let mode = if force_upgrade || live.is_some() {
            RenderMode::Upgrade
        } else {
            RenderMode::Install
        };
        let hand_over = match (mode, live) {
            (RenderMode::Upgrade, Some(LiveDeployment { replicas })) if scaled => replicas,
            _ => None,
        };
        Self { mode, hand_over }
    }
}

/// Applies bundles to one cluster
pub struct BundleApplier {
    client: Client,
    discovery: Discovery,
}

impl BundleApplier {
    /// Create an applier, discovering the API groups a bundle may use
    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone())
            .filter(BUNDLE_GROUPS)
            .run()
            .await
            .map_err(KubeError::Api)?;

        Ok(Self { client, discovery })
    }

    /// Create an applier from the default kubeconfig or in-cluster config
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| KubeError::Connection(e.to_string()))?;
        Self::new(client).await
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Look up the Deployment a workload renders to
    pub async fn live_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LiveDeployment>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let live = api.get_opt(name).await?.map(|deployment| LiveDeployment {
            replicas: deployment.spec.and_then(|spec| spec.replicas),
        });
        tracing::debug!(namespace, name, ?live, "looked up deployment");
        Ok(live)
    }

    /// Re-apply `replicas` under [`HANDOVER_FIELD_MANAGER`] so that a
    /// following apply without the field releases it instead of deleting it
    pub async fn hand_over_replicas(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
        dry_run: bool,
    ) -> Result<()> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let mut params = PatchParams::apply(HANDOVER_FIELD_MANAGER);
        params.dry_run = dry_run;

        match api
            .patch(name, &params, &Patch::Apply(&replicas_patch(name, replicas)))
            .await
        {
            Ok(_) => {
                tracing::debug!(name, replicas, "replicas handed over");
                Ok(())
            }
            // The autoscaler already owns the field
            Err(kube::Error::Api(response)) if response.code == 409 => {
                tracing::debug!(name, "replicas already owned by another manager");
                Ok(())
            }
            Err(e) => Err(KubeError::Api(e)),
        }
    }

    /// Server-side apply every resource of `bundle` in order.
    ///
    /// With `dry_run` the API server runs admission but persists nothing.
    pub async fn apply(&self, bundle: &ResourceBundle, dry_run: bool) -> Result<ApplyOutcome> {
        let mut applied = Vec::new();

        for resource in bundle.resources() {
            let id = resource.id();
            let obj: DynamicObject = serde_json::from_value(resource.to_value()?)?;
            let name = obj
                .metadata
                .name
                .clone()
                .ok_or_else(|| KubeError::InvalidManifest(format!("{} has no name", id)))?;
            let types = obj
                .types
                .as_ref()
                .ok_or_else(|| KubeError::InvalidManifest(format!("{} has no apiVersion/kind", id)))?;

            let gvk = gvk_from_type_meta(types);
            let Some((api_resource, capabilities)) = self.discovery.resolve_gvk(&gvk) else {
                return Ok(ApplyOutcome::Rejected {
                    resource: id,
                    reason: format!(
                        "the server doesn't have a resource type {} in {}",
                        types.kind, types.api_version
                    ),
                    applied,
                });
            };

            let api: Api<DynamicObject> = if capabilities.scope == Scope::Namespaced {
                Api::namespaced_with(self.client.clone(), &bundle.namespace, &api_resource)
            } else {
                Api::all_with(self.client.clone(), &api_resource)
            };

            let mut params = PatchParams::apply(FIELD_MANAGER).force();
            params.dry_run = dry_run;

            match api.patch(&name, &params, &Patch::Apply(&obj)).await {
                Ok(_) => {
                    tracing::debug!(resource = %id, dry_run, "applied");
                    applied.push(id);
                }
                Err(kube::Error::Api(response)) if is_rejection(response.code) => {
                    tracing::debug!(resource = %id, code = response.code, "rejected");
                    return Ok(ApplyOutcome::Rejected {
                        resource: id,
                        reason: response.message,
                        applied,
                    });
                }
                Err(e) => return Err(KubeError::Api(e)),
            }
        }

        Ok(ApplyOutcome::Applied { resources: applied })
    }
}

/// Apply configuration owning nothing but `spec.replicas`
fn replicas_patch(name: &str, replicas: i32) -> serde_json::Value {
    serde_json::json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": { "name": name },
        "spec": { "replicas": replicas },
    })
}

/// Status codes the API server uses to refuse an object, as opposed to
/// failing to process the request
fn is_rejection(code: u16) -> bool {
    matches!(code, 400 | 403 | 409 | 422)
}

/// Convert TypeMeta to GroupVersionKind
///
/// - "apps/v1" -> group="apps", version="v1"
/// - "v1" -> group="", version="v1" (core API)
fn gvk_from_type_meta(tm: &TypeMeta) -> GroupVersionKind {
    let (group, version) = match tm.api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), tm.api_version.clone()),
    };

    GroupVersionKind {
        group,
        version,
        kind: tm.kind.clone(),
    }
}
