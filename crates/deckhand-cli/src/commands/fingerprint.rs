//! Fingerprint command - print the secret digest of one workload

use deckhand_core::did_you_mean;
use deckhand_engine::{RenderError, fingerprint};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::util::{load_secrets, load_validated};

pub fn run(
    configs: &[PathBuf],
    workload: &str,
    set_values: &[String],
    secrets_file: &Path,
) -> Result<()> {
    let doc = load_validated(configs, set_values, None)?;
    let spec = &doc
        .workload(workload)
        .ok_or_else(|| RenderError::UnknownWorkload {
            name: workload.to_string(),
            suggestion: did_you_mean(workload, doc.workload_names()),
        })?
        .spec;

    let refs = spec.secret_refs();
    if refs.is_empty() {
        eprintln!("workload '{}' consumes no secrets", workload);
        return Ok(());
    }

    let secrets = load_secrets(Some(secrets_file))?;
    println!("{}", fingerprint(&refs, &secrets)?);
    Ok(())
}
