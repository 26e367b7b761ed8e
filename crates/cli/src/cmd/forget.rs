//! Drop a file's checkpoint record

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

    let existed = components
        .checkpoints
        .get_record(&key)
        .await
        .context("Failed to read checkpoint")?
        .is_some();
    if !existed {
        println!("{}", format!("No checkpoint for {}", path.display()).dimmed());
        return Ok(());
    }

    components
        .checkpoints
        .remove(&key)
        .await
        .context("Failed to remove checkpoint")?;
    println!("{} Forgot {}", "✓".green(), path.display());
    Ok(())
}
