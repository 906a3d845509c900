//! Diff command - compare two rendered manifest streams

use deckhand_kube::BundleDiff;
use std::fs;
use std::io;
use std::path::Path;

use crate::display::write_diff;
use crate::error::Result;

pub fn run(old: &Path, new: &Path, context: usize) -> Result<()> {
    let old_yaml = fs::read_to_string(old)?;
    let new_yaml = fs::read_to_string(new)?;

    let diff = BundleDiff::compute_with_context(&old_yaml, &new_yaml, context)?;
    tracing::debug!(changes = diff.changes.len(), "computed bundle diff");

    if !diff.has_changes() {
        println!("{}", diff.summary());
        return Ok(());
    }
    write_diff(&mut io::stdout().lock(), &diff)?;
    Ok(())
}
