//! Template command - render bundles locally

use console::style;
use deckhand_engine::Renderer;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::util::{load_secrets, load_validated, render_selected};

#[allow(clippy::too_many_arguments)]
pub fn run(
    configs: &[PathBuf],
    workload: Option<&str>,
    set_values: &[String],
    namespace: Option<&str>,
    secrets_file: Option<&Path>,
    upgrade: bool,
    output_dir: Option<&Path>,
) -> Result<()> {
    let doc = load_validated(configs, set_values, namespace)?;
    let secrets = load_secrets(secrets_file)?;

    let renderer = Renderer::builder().upgrade(upgrade).build();
    let bundles = render_selected(&renderer, &doc, workload, &secrets)?;

    if let Some(output_path) = output_dir {
        fs::create_dir_all(output_path)?;

        for bundle in &bundles {
            for (filename, content) in bundle.manifests()? {
                let file_path = output_path.join(&filename);
                fs::write(&file_path, content)?;
                println!("{} {}", style("wrote").green(), file_path.display());
            }
        }
    } else {
        for bundle in &bundles {
            print!("{}", bundle.to_yaml()?);
        }
    }

    Ok(())
}
