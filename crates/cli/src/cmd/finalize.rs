//! Force finalization of a fully uploaded file

use crate::util::{self, Components};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use sd_core::Settings;
use std::path::Path;

pub async fn run(settings: &Settings, file: &Path) -> Result<()> {
    util::warn_if_daemon_running(settings);

    let path = util::resolve_file(file)?;
    let key = engine::path_key(&path);
    let components = Components::new(settings)?;

    if components
        .checkpoints
        .get_stream_id(&key)
        .await
        .context("Failed to read checkpoint")?
        .is_none()
    {
        anyhow::bail!("{} is not tracked (never uploaded, or already finalized)", path.display());
    }

    let finalized = components
        .monitor
        .finalize(&key)
        .await
        .with_context(|| format!("Finalization of {} failed", path.display()))?;

    let Some(finalized) = finalized else {
        anyhow::bail!(
            "{} has bytes not uploaded yet; run 'streamdrop upload' first",
            path.display()
        );
    };

    let manifest = &finalized.manifest;
    println!("{} Finalized {}", "✓".green(), path.display());
    println!("  Manifest: {}", manifest.stream_id.manifest_key().yellow());
    println!("  Chunks:   {}", manifest.chunks.len());
    println!("  Size:     {}", util::format_size(manifest.file_size));
    if !finalized.record_cleared {
        println!(
            "{}",
            "Note: file grew meanwhile; its checkpoint was kept".yellow()
        );
    }
    Ok(())
}
