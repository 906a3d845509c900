//! Secret content read from the cluster
//!
//! Content is fetched once, before rendering, with one bounded GET per
//! referenced secret. The render itself then only sees an in-memory source.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use deckhand_core::SecretRef;
use deckhand_engine::{MemorySecretSource, RenderError};
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};

use crate::error::{KubeError, Result};

pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Prefetches secret content from a namespace
pub struct ClusterSecretSource;

impl ClusterSecretSource {
    /// Read every secret referenced by `refs` from `namespace`.
    ///
    /// Any failure (missing secret or key, API error, timeout) is reported as
    /// unresolved secret content.
    pub async fn prefetch(
        client: Client,
        namespace: &str,
        refs: &[SecretRef],
        timeout: Duration,
    ) -> Result<MemorySecretSource> {
        let api: Api<Secret> = Api::namespaced(client, namespace);

        let mut wanted: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for r in refs {
            wanted.entry(r.name.as_str()).or_default().insert(r.key.as_str());
        }

        let mut source = MemorySecretSource::new();
        for (name, keys) in wanted {
            let unresolved = |reason: String| {
                KubeError::Render(RenderError::UnresolvedSecretContent {
                    secret: name.to_string(),
                    reason,
                })
            };

            let secret = match tokio::time::timeout(timeout, api.get(name)).await {
                Err(_) => {
                    return Err(unresolved(format!(
                        "lookup timed out after {}s",
                        timeout.as_secs()
                    )));
                }
                Ok(Err(kube::Error::Api(resp))) if resp.code == 404 => {
                    return Err(unresolved(format!(
                        "secret not found in namespace '{}'",
                        namespace
                    )));
                }
                Ok(Err(e)) => return Err(unresolved(e.to_string())),
                Ok(Ok(secret)) => secret,
            };

            for (key, content) in secret_contents(&secret, &keys).map_err(unresolved)? {
                source.insert(name, key, content);
            }
            tracing::debug!(secret = %name, keys = keys.len(), "prefetched secret content");
        }

        Ok(source)
    }
}

/// Extract the wanted keys of a secret, preferring `data` over `stringData`
fn secret_contents<'a>(
    secret: &Secret,
    keys: &BTreeSet<&'a str>,
) -> std::result::Result<Vec<(&'a str, Vec<u8>)>, String> {
    keys.iter()
        .map(|key| {
            let data = secret.data.as_ref().and_then(|d| d.get(*key)).map(|b| b.0.clone());
            let string_data = || {
                secret
                    .string_data
                    .as_ref()
                    .and_then(|d| d.get(*key))
                    .map(|s| s.clone().into_bytes())
            };
            data.or_else(string_data)
                .map(|content| (*key, content))
                .ok_or_else(|| format!("key '{}' not present", key))
        })
        .collect()
}
