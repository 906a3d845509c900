//! Workload identity labels and name rules

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

pub const NAME_LABEL: &str = "app.kubernetes.io/name";
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "deckhand";

/// Label carried by every namespace since Kubernetes 1.21
pub const NAMESPACE_NAME_LABEL: &str = "kubernetes.io/metadata.name";

static DNS_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid regex"));

/// Check a name against RFC 1123 label rules (max 63 chars)
pub fn is_dns_label(name: &str) -> bool {
    name.len() <= 63 && DNS_LABEL.is_match(name)
}

/// The label set that identifies a workload's pods.
///
/// Built once per render and cloned into every resource that selects the
/// workload, so selectors can never drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityLabels(BTreeMap<String, String>);

impl IdentityLabels {
    pub fn for_workload(name: &str) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(NAME_LABEL.to_string(), name.to_string());
        labels.insert(INSTANCE_LABEL.to_string(), name.to_string());
        Self(labels)
    }

    /// Wrap an arbitrary selector (used for external services)
    pub fn from_selector(selector: BTreeMap<String, String>) -> Self {
        Self(selector)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.0.clone()
    }

    /// Identity labels plus the non-selecting metadata labels
    pub fn metadata_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.0.clone();
        labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string());
        labels
    }
}

/// Selector for a namespace by name
pub fn namespace_selector(namespace: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(NAMESPACE_NAME_LABEL.to_string(), namespace.to_string())])
}
