//! Validate command - check a configuration without rendering

use console::style;
use deckhand_core::{load_document, validate};
use std::path::PathBuf;

use crate::display::{ValidationReport, pluralize};
use crate::error::{CliError, Result};
use crate::exit_codes;

pub fn run(configs: &[PathBuf], set_values: &[String], json_output: bool) -> Result<()> {
    if !json_output {
        println!(
            "{} Validating {}",
            style("→").blue(),
            pluralize(configs.len(), "file", "files")
        );
    }

    let raw = load_document(configs, set_values)?;

    match validate(&raw) {
        Ok(doc) => {
            if json_output {
                let output = serde_json::json!({
                    "valid": true,
                    "namespace": doc.namespace,
                    "workloads": doc.workload_names().collect::<Vec<_>>(),
                    "errors": [],
                });
                print_json(&output)?;
            } else {
                for name in doc.workload_names() {
                    println!("  {} workload {}", style("✓").green(), style(name).cyan());
                }
                println!();
                ValidationReport::default().print_summary();
            }
            Ok(())
        }
        Err(errors) => {
            let report = ValidationReport::from_errors(&errors);
            if json_output {
                print_json(&report.to_json())?;
            } else {
                report.display();
                println!();
                report.print_summary();
            }
            std::process::exit(exit_codes::VALIDATION_ERROR);
        }
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::internal(format!("failed to serialize output: {}", e)))?;
    println!("{}", text);
    Ok(())
}
