//! Secret change fingerprint
//!
//! The fingerprint is a digest over the content of every secret a workload
//! consumes. It is written as a pod-template annotation, so any change to a
//! consumed secret changes the pod template and triggers a rollout.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use deckhand_core::{SecretRef, Values};
use sha2::{Digest, Sha256};

use crate::error::{RenderError, Result};

/// Pod-template annotation carrying the fingerprint
pub const SECRET_CHECKSUM_ANNOTATION: &str = "deckhand.io/secret-checksum";

/// Lookup of secret content by logical name and key
pub trait SecretContentSource {
    fn lookup(&self, name: &str, key: &str) -> Result<Vec<u8>>;
}

/// Secret content held in memory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySecretSource {
    entries: BTreeMap<(String, String), Vec<u8>>,
}

impl MemorySecretSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        key: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) {
        self.entries
            .insert((name.into(), key.into()), content.into());
    }

    pub fn with(
        mut self,
        name: impl Into<String>,
        key: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        self.insert(name, key, content);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a `{name: {key: content}}` YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::from_values(Values::from_yaml(yaml)?)
    }

    /// Read a `{name: {key: content}}` YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = Self::from_values(Values::from_file(path)?)?;
        tracing::debug!(path = %path.display(), entries = source.len(), "loaded secret contents");
        Ok(source)
    }

    fn from_values(values: Values) -> Result<Self> {
        let parsed: BTreeMap<String, BTreeMap<String, String>> = values.into_typed()?;
        let mut source = Self::new();
        for (name, keys) in parsed {
            for (key, content) in keys {
                source.insert(name.clone(), key, content);
            }
        }
        Ok(source)
    }
}

impl SecretContentSource for MemorySecretSource {
    fn lookup(&self, name: &str, key: &str) -> Result<Vec<u8>> {
        self.entries
            .get(&(name.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| RenderError::UnresolvedSecretContent {
                secret: format!("{}.{}", name, key),
                reason: "no content available".to_string(),
            })
    }
}

/// Compute the fingerprint over the content of `refs`.
///
/// References are de-duplicated on `(name, key)` and hashed in sorted order,
/// so neither the order of env bindings nor the variable names they bind to
/// affect the result. Each component is length-prefixed.
pub fn fingerprint(refs: &[SecretRef], source: &dyn SecretContentSource) -> Result<String> {
    let unique: BTreeSet<(&str, &str)> = refs
        .iter()
        .map(|r| (r.name.as_str(), r.key.as_str()))
        .collect();

    let mut hasher = Sha256::new();
    for (name, key) in unique {
        let content = source.lookup(name, key)?;
        for part in [name.as_bytes(), key.as_bytes(), content.as_slice()] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(name: &str, key: &str, field: &str) -> SecretRef {
        SecretRef {
            name: name.to_string(),
            key: key.to_string(),
            field: field.to_string(),
        }
    }

    #[test]
    fn test_content_change_changes_fingerprint() {
        let refs = vec![secret("db-secret", "pass", "DB_PASSWORD")];
        let before = MemorySecretSource::new().with("db-secret", "pass", "soSecure");
        let after = MemorySecretSource::new().with("db-secret", "pass", "newpass");

        let a = fingerprint(&refs, &before).unwrap();
        let b = fingerprint(&refs, &after).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_stable_under_order_and_duplicates() {
        let source = MemorySecretSource::new()
            .with("db-secret", "pass", "soSecure")
            .with("api", "token", "abc");

        let a = fingerprint(
            &[secret("db-secret", "pass", "A"), secret("api", "token", "B")],
            &source,
        )
        .unwrap();
        let b = fingerprint(
            &[
                secret("api", "token", "B"),
                secret("db-secret", "pass", "A"),
                secret("db-secret", "pass", "C"),
            ],
            &source,
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_length_prefix_prevents_ambiguity() {
        let one = MemorySecretSource::new().with("ab", "c", "x");
        let two = MemorySecretSource::new().with("a", "bc", "x");
        assert_ne!(
            fingerprint(&[secret("ab", "c", "F")], &one).unwrap(),
            fingerprint(&[secret("a", "bc", "F")], &two).unwrap()
        );
    }

    #[test]
    fn test_missing_content_is_error() {
        let err = fingerprint(
            &[secret("db-secret", "pass", "DB_PASSWORD")],
            &MemorySecretSource::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RenderError::UnresolvedSecretContent { ref secret, .. } if secret == "db-secret.pass"
        ));
    }

    #[test]
    fn test_from_yaml() {
        let source = MemorySecretSource::from_yaml("db-secret:\n  pass: soSecure\n").unwrap();
        assert_eq!(source.lookup("db-secret", "pass").unwrap(), b"soSecure");
        assert!(source.lookup("db-secret", "user").is_err());
    }
}
