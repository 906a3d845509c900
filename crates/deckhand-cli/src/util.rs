//! Shared helpers for CLI commands

use std::path::{Path, PathBuf};

use deckhand_core::{ValidatedDocument, load_document, validate};
use deckhand_engine::{MemorySecretSource, Renderer, ResourceBundle, SecretContentSource};

use crate::error::Result;

/// Load, layer and validate the configuration files
pub fn load_validated(
    configs: &[PathBuf],
    set_values: &[String],
    namespace: Option<&str>,
) -> Result<ValidatedDocument> {
    let mut raw = load_document(configs, set_values)?;
    if let Some(ns) = namespace {
        tracing::debug!(namespace = ns, "namespace overridden from the command line");
        raw.namespace = Some(ns.to_string());
    }

    let doc = validate(&raw)?;
    tracing::debug!(
        workloads = doc.workloads.len(),
        externals = doc.externals.len(),
        "configuration validated"
    );
    Ok(doc)
}

/// Secret content from a `{name: {key: content}}` file, or nothing
pub fn load_secrets(path: Option<&Path>) -> Result<MemorySecretSource> {
    match path {
        Some(path) => Ok(MemorySecretSource::from_file(path)?),
        None => Ok(MemorySecretSource::new()),
    }
}

/// Render one named workload, or every workload in name order
pub fn render_selected(
    renderer: &Renderer,
    doc: &ValidatedDocument,
    workload: Option<&str>,
    secrets: &dyn SecretContentSource,
) -> Result<Vec<ResourceBundle>> {
    let bundles = match workload {
        Some(name) => vec![renderer.render_workload(doc, name, secrets)?],
        None => renderer.render_all(doc, secrets)?,
    };
    Ok(bundles)
}

