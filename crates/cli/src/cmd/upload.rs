//! Upload one file's pending chunks

use crate::util::{self, Components};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use sd_core::Settings;
use std::path::Path;

pub async fn run(settings: &Settings, file: &Path) -> Result<()> {
    util::warn_if_daemon_running(settings);

    let path = file
        .canonicalize()
        .with_context(|| format!("Cannot open {}", file.display()))?;
    let components = Components::new(settings)?;

    let outcome = components
        .uploader
        .upload_file(&path)
        .await
        .with_context(|| format!("Upload of {} failed", path.display()))?;

    if outcome.chunks == 0 {
        println!(
            "{} {} already uploaded ({})",
            "✓".green(),
            path.display(),
            util::format_size(outcome.offset)
        );
    } else {
        println!(
            "{} Uploaded {} chunk(s), {} for {}",
            "✓".green(),
            outcome.chunks,
            util::format_size(outcome.bytes),
            path.display()
        );
    }
    println!("  Stream: {}", outcome.stream_id.yellow());
    println!("  Offset: {}", outcome.offset);
    Ok(())
}
