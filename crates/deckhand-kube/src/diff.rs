//! Per-resource comparison of two rendered manifest streams

use std::collections::BTreeMap;

use serde::Deserialize;
use similar::TextDiff;

use crate::error::{KubeError, Result};

/// Type of resource change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Added => write!(f, "added"),
            ChangeType::Modified => write!(f, "modified"),
            ChangeType::Removed => write!(f, "removed"),
        }
    }
}

/// Key for identifying a Kubernetes resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", ns, self.kind, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// A change to a single resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceChange {
    pub key: ResourceKey,
    pub change_type: ChangeType,
    /// Unified diff for modifications
    pub diff: Option<String>,
}

/// Differences between two manifest streams
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleDiff {
    /// Changes sorted by resource
    pub changes: Vec<ResourceChange>,
}

impl BundleDiff {
    /// Compare two `---`-separated YAML streams resource by resource
    pub fn compute(old_yaml: &str, new_yaml: &str) -> Result<Self> {
        Self::compute_with_context(old_yaml, new_yaml, 3)
    }

    pub fn compute_with_context(old_yaml: &str, new_yaml: &str, context: usize) -> Result<Self> {
        let old = parse_resources(old_yaml)?;
        let new = parse_resources(new_yaml)?;
        let mut changes = Vec::new();

        for (key, new_content) in &new {
            match old.get(key) {
                None => changes.push(ResourceChange {
                    key: key.clone(),
                    change_type: ChangeType::Added,
                    diff: None,
                }),
                Some(old_content) if old_content != new_content => {
                    let label = key.to_string();
                    let diff = TextDiff::from_lines(old_content.as_str(), new_content.as_str())
                        .unified_diff()
                        .context_radius(context)
                        .header(&label, &label)
                        .to_string();
                    changes.push(ResourceChange {
                        key: key.clone(),
                        change_type: ChangeType::Modified,
                        diff: Some(diff),
                    });
                }
                Some(_) => {}
            }
        }

        for key in old.keys().filter(|k| !new.contains_key(*k)) {
            changes.push(ResourceChange {
                key: key.clone(),
                change_type: ChangeType::Removed,
                diff: None,
            });
        }

        changes.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(Self { changes })
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn count(&self, change_type: ChangeType) -> usize {
        self.changes
            .iter()
            .filter(|c| c.change_type == change_type)
            .count()
    }

    /// Generate a human-readable summary
    pub fn summary(&self) -> String {
        let parts: Vec<String> = [ChangeType::Added, ChangeType::Modified, ChangeType::Removed]
            .into_iter()
            .map(|t| (t, self.count(t)))
            .filter(|(_, n)| *n > 0)
            .map(|(t, n)| format!("{} {}", n, t))
            .collect();

        if parts.is_empty() {
            "No changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Parse a stream into canonical YAML per resource
fn parse_resources(stream: &str) -> Result<BTreeMap<ResourceKey, String>> {
    let mut resources = BTreeMap::new();

    for (index, document) in serde_yaml::Deserializer::from_str(stream).enumerate() {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }

        let kind = value
            .get("kind")
            .and_then(|v| v.as_str())
            .ok_or_else(|| KubeError::InvalidManifest(format!("document {} has no kind", index)))?
            .to_string();
        let metadata = value.get("metadata");
        let name = metadata
            .and_then(|m| m.get("name"))
            .and_then(|n| n.as_str())
            .ok_or_else(|| KubeError::InvalidManifest(format!("document {} has no name", index)))?
            .to_string();
        let namespace = metadata
            .and_then(|m| m.get("namespace"))
            .and_then(|n| n.as_str())
            .map(String::from);

        resources.insert(
            ResourceKey {
                kind,
                name,
                namespace,
            },
            serde_yaml::to_string(&value)?,
        );
    }

    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OLD: &str = r#"---
# Source: test-service.yaml
apiVersion: v1
kind: Service
metadata:
  name: test
  namespace: default
spec:
  ports:
  - port: 3000
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: test
  namespace: default
spec:
  replicas: 1
---
apiVersion: autoscaling/v2
kind: HorizontalPodAutoscaler
metadata:
  name: test
  namespace: default
"#;

    const NEW: &str = r#"---
apiVersion: v1
kind: Service
metadata:
  name: test
  namespace: default
spec:
  ports:
  - port: 3000
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: test
  namespace: default
spec:
  replicas: 3
---
apiVersion: networking.k8s.io/v1
kind: Ingress
metadata:
  name: test
  namespace: default
"#;

    #[test]
    fn test_compute() {
        let diff = BundleDiff::compute(OLD, NEW).unwrap();
        assert_eq!(diff.count(ChangeType::Added), 1);
        assert_eq!(diff.count(ChangeType::Modified), 1);
        assert_eq!(diff.count(ChangeType::Removed), 1);
        assert_eq!(diff.summary(), "1 added, 1 modified, 1 removed");

        let modified = diff
            .changes
            .iter()
            .find(|c| c.change_type == ChangeType::Modified)
            .unwrap();
        assert_eq!(modified.key.kind, "Deployment");
        let text = modified.diff.as_deref().unwrap();
        assert!(text.contains("-  replicas: 1"));
        assert!(text.contains("+  replicas: 3"));
    }

    #[test]
    fn test_identical_streams() {
        let diff = BundleDiff::compute(OLD, OLD).unwrap();
        assert!(!diff.has_changes());
        assert_eq!(diff.summary(), "No changes");
    }

    #[test]
    fn test_document_without_kind_is_invalid() {
        let err = BundleDiff::compute("metadata:\n  name: x\n", "").unwrap_err();
        assert!(matches!(err, KubeError::InvalidManifest(_)));
    }
}
