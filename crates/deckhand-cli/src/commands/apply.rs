//! Apply command - render bundles and server-side apply them
//!
//! Workloads whose Deployment already exists are rendered in upgrade mode,
//! so a repeated apply never resets the replica count of an autoscaled
//! workload. `--upgrade` forces upgrade mode for new workloads too.

use console::style;
use deckhand_core::{SecretRef, ValidatedDocument};
use deckhand_engine::{MemorySecretSource, Renderer};
use deckhand_kube::{
    ApplyOutcome, ApplyPlan, BundleApplier, ClusterSecretSource, DEFAULT_LOOKUP_TIMEOUT,
};
use std::path::{Path, PathBuf};

use crate::display::{display_apply_outcome, pluralize};
use crate::error::{CliError, Result};
use crate::util::{load_secrets, load_validated};

/// Where fingerprinted secret content comes from
pub enum SecretsFrom<'a> {
    File(Option<&'a Path>),
    Cluster,
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    configs: &[PathBuf],
    workload: Option<&str>,
    set_values: &[String],
    namespace: Option<&str>,
    secrets: SecretsFrom<'_>,
    upgrade: bool,
    dry_run: bool,
) -> Result<()> {
    let doc = load_validated(configs, set_values, namespace)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::internal(format!("failed to start async runtime: {}", e)))?;

    runtime.block_on(apply(&doc, workload, secrets, upgrade, dry_run))
}

async fn apply(
    doc: &ValidatedDocument,
    workload: Option<&str>,
    secrets: SecretsFrom<'_>,
    upgrade: bool,
    dry_run: bool,
) -> Result<()> {
    let applier = BundleApplier::try_default().await?;

    let source = match secrets {
        SecretsFrom::File(path) => load_secrets(path)?,
        SecretsFrom::Cluster => prefetch(&applier, doc, workload).await?,
    };

    let names: Vec<&str> = match workload {
        Some(name) => vec![name],
        None => doc.workload_names().collect(),
    };

    // Render everything before touching the cluster
    let mut planned = Vec::with_capacity(names.len());
    for name in names {
        let scaled = doc.workload(name).is_some_and(|w| w.scaling.is_some());
        let live = applier.live_deployment(&doc.namespace, name).await?;
        let plan = ApplyPlan::new(upgrade, scaled, live);
        tracing::debug!(
            workload = name,
            mode = ?plan.mode,
            hand_over = ?plan.hand_over,
            "planned apply"
        );

        let bundle = Renderer::new(plan.mode).render_workload(doc, name, &source)?;
        planned.push((plan, bundle));
    }

    println!(
        "{} Applying {} to namespace {}{}",
        style("→").blue().bold(),
        pluralize(planned.len(), "workload", "workloads"),
        style(&doc.namespace).yellow(),
        if dry_run { " (dry run)" } else { "" }
    );

    for (plan, bundle) in &planned {
        if let Some(replicas) = plan.hand_over {
            applier
                .hand_over_replicas(&bundle.namespace, &bundle.workload, replicas, dry_run)
                .await?;
        }

        let outcome = applier.apply(bundle, dry_run).await?;
        display_apply_outcome(&bundle.workload, &outcome, dry_run);

        if let ApplyOutcome::Rejected {
            resource, reason, ..
        } = outcome
        {
            return Err(CliError::Rejected { resource, reason });
        }
    }

    Ok(())
}

/// Read the content of every secret the selected workloads consume
async fn prefetch(
    applier: &BundleApplier,
    doc: &ValidatedDocument,
    workload: Option<&str>,
) -> Result<MemorySecretSource> {
    let refs: Vec<SecretRef> = doc
        .workloads
        .iter()
        .filter(|(name, _)| workload.is_none_or(|w| w == name.as_str()))
        .flat_map(|(_, w)| w.spec.secret_refs())
        .collect();

    if refs.is_empty() {
        return Ok(MemorySecretSource::new());
    }

    let source = ClusterSecretSource::prefetch(
        applier.client().clone(),
        &doc.namespace,
        &refs,
        DEFAULT_LOOKUP_TIMEOUT,
    )
    .await?;
    tracing::debug!(entries = source.len(), "prefetched secret content from cluster");
    Ok(source)
}
