//! Display formatting for CLI output
//!
//! Provides structured display for:
//! - Validation errors with suggestions
//! - Per-resource bundle diffs
//! - Apply outcomes

use console::style;
use deckhand_core::{ValidationError, ValidationErrors};
use deckhand_kube::{ApplyOutcome, BundleDiff, ChangeType};
use miette::Diagnostic;
use std::io::{self, Write};

/// A validation problem ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub code: &'static str,
    pub message: String,
    pub suggestion: Option<String>,
}

impl From<&ValidationError> for ValidationIssue {
    fn from(err: &ValidationError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            suggestion: err.help().map(|h| h.to_string()),
        }
    }
}

/// Validation results for display
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn from_errors(errors: &ValidationErrors) -> Self {
        Self {
            issues: errors.iter().map(ValidationIssue::from).collect(),
        }
    }

    /// Display every issue with its hint
    pub fn display(&self) {
        for issue in &self.issues {
            println!(
                "  {} {} {}",
                style("✗").red(),
                issue.message,
                style(format!("[{}]", issue.code)).dim()
            );
            if let Some(suggestion) = &issue.suggestion {
                println!("    {} {}", style("hint:").blue(), suggestion);
            }
        }
    }

    /// Print summary line
    pub fn print_summary(&self) {
        if self.has_errors() {
            println!(
                "{} Validation failed: {}",
                style("✗").red().bold(),
                pluralize(self.issues.len(), "error", "errors")
            );
        } else {
            println!("{} Validation passed!", style("✓").green().bold());
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Machine-readable form for `--json`
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "valid": !self.has_errors(),
            "errors": self.issues.iter().map(|i| serde_json::json!({
                "code": i.code,
                "message": i.message,
                "help": i.suggestion,
            })).collect::<Vec<_>>(),
        })
    }
}

/// Format count with proper pluralization
pub fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Bundle Diff Display
// ═══════════════════════════════════════════════════════════════════════════

/// Write a bundle diff, one block per changed resource
pub fn write_diff<W: Write>(writer: &mut W, diff: &BundleDiff) -> io::Result<()> {
    for change in &diff.changes {
        let (icon, label) = match change.change_type {
            ChangeType::Added => (style("+").green(), style(change.key.to_string()).green()),
            ChangeType::Modified => (style("~").yellow(), style(change.key.to_string()).yellow()),
            ChangeType::Removed => (style("-").red(), style(change.key.to_string()).red()),
        };
        writeln!(writer, "{} {} ({})", icon, label, change.change_type)?;

        if let Some(text) = &change.diff {
            for line in text.lines() {
                let styled = if line.starts_with("+++") || line.starts_with("---") {
                    style(line).bold()
                } else if line.starts_with('+') {
                    style(line).green()
                } else if line.starts_with('-') {
                    style(line).red()
                } else if line.starts_with("@@") {
                    style(line).cyan()
                } else {
                    style(line).dim()
                };
                writeln!(writer, "    {}", styled)?;
            }
        }
    }

    writeln!(writer)?;
    writeln!(writer, "{}", style(diff.summary()).bold())
}

// ═══════════════════════════════════════════════════════════════════════════
// Apply Display
// ═══════════════════════════════════════════════════════════════════════════

pub fn display_apply_outcome(workload: &str, outcome: &ApplyOutcome, dry_run: bool) {
    let verb = if dry_run { "accepted (dry run)" } else { "applied" };
    for resource in outcome.applied() {
        println!("  {} {} {}", style("✓").green(), resource, style(verb).dim());
    }

    match outcome {
        ApplyOutcome::Applied { resources } => println!(
            "{} {}: {} {}",
            style("✓").green().bold(),
            style(workload).cyan(),
            pluralize(resources.len(), "resource", "resources"),
            verb
        ),
        ApplyOutcome::Rejected {
            resource, reason, ..
        } => {
            println!("  {} {} rejected", style("✗").red(), resource);
            println!("    {} {}", style("reason:").red(), reason);
        }
    }
}
