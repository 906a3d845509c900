//! Image provenance constraint
//!
//! Emits a Kyverno `Policy` requiring a valid signature on the workload's
//! image. Verification itself is left to the admission controller.

use std::collections::BTreeMap;

use deckhand_core::{IdentityLabels, ProvenanceSpec, WorkloadSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use serde::{Deserialize, Serialize};

pub const KYVERNO_API_VERSION: &str = "kyverno.io/v1";
pub const POLICY_KIND: &str = "Policy";

/// Transparency log consulted for keyless signatures
const REKOR_URL: &str = "https://rekor.sigstore.dev";

/// A namespaced Kyverno policy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePolicy {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: ImagePolicySpec,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePolicySpec {
    pub validation_failure_action: String,
    pub background: bool,
    pub webhook_timeout_seconds: i32,
    pub rules: Vec<PolicyRule>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    pub name: String,
    #[serde(rename = "match")]
    pub match_: MatchResources,
    pub verify_images: Vec<VerifyImages>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchResources {
    pub any: Vec<ResourceFilter>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceFilter {
    pub resources: ResourceDescription,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescription {
    pub kinds: Vec<String>,
    pub selector: LabelSelector,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyImages {
    pub image_references: Vec<String>,
    pub attestors: Vec<AttestorSet>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttestorSet {
    pub entries: Vec<Attestor>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attestor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyless: Option<KeylessAttestor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<KeyAttestor>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeylessAttestor {
    pub issuer: String,
    pub subject: String,
    pub rekor: Rekor,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rekor {
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAttestor {
    pub public_keys: String,
}

impl ImagePolicy {
    /// Pod labels the policy applies to
    pub fn selector_labels(&self) -> Option<&BTreeMap<String, String>> {
        self.spec
            .rules
            .first()?
            .match_
            .any
            .first()?
            .resources
            .selector
            .match_labels
            .as_ref()
    }
}

/// Strip the tag and digest from an image reference
pub fn image_repository(image: &str) -> &str {
    let image = image.split('@').next().unwrap_or(image);
    match image.rfind(':') {
        // A colon before the last slash belongs to a registry port
        Some(colon) if image.rfind('/').is_none_or(|slash| colon > slash) => &image[..colon],
        _ => image,
    }
}

/// Build the image verification policy for a workload
pub fn emit(
    spec: &WorkloadSpec,
    identity: &IdentityLabels,
    provenance: &ProvenanceSpec,
) -> ImagePolicy {
    let repository = image_repository(&spec.image);
    let attestor = match provenance {
        ProvenanceSpec::Keyless { issuer, subject } => Attestor {
            keyless: Some(KeylessAttestor {
                issuer: issuer.clone(),
                subject: subject.clone(),
                rekor: Rekor {
                    url: REKOR_URL.to_string(),
                },
            }),
            keys: None,
        },
        ProvenanceSpec::PublicKey(key) => Attestor {
            keyless: None,
            keys: Some(KeyAttestor {
                public_keys: key.clone(),
            }),
        },
    };

    ImagePolicy {
        api_version: KYVERNO_API_VERSION.to_string(),
        kind: POLICY_KIND.to_string(),
        metadata: ObjectMeta {
            name: Some(format!("{}-verify-image", spec.name)),
            namespace: Some(spec.namespace.clone()),
            labels: Some(identity.metadata_labels()),
            ..Default::default()
        },
        spec: ImagePolicySpec {
            validation_failure_action: "Enforce".to_string(),
            background: false,
            webhook_timeout_seconds: 30,
            rules: vec![PolicyRule {
                name: "verify-image-signature".to_string(),
                match_: MatchResources {
                    any: vec![ResourceFilter {
                        resources: ResourceDescription {
                            kinds: vec!["Pod".to_string()],
                            selector: LabelSelector {
                                match_labels: Some(identity.to_map()),
                                ..Default::default()
                            },
                        },
                    }],
                },
                verify_images: vec![VerifyImages {
                    image_references: vec![
                        format!("{}:*", repository),
                        format!("{}@*", repository),
                    ],
                    attestors: vec![AttestorSet {
                        entries: vec![attestor],
                    }],
                }],
            }],
        },
    }
}
