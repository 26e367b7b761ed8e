//! Show daemon and stream status

use crate::locks::DaemonLock;
use crate::util::{self, Components};
use anyhow::{Context, Result};
use engine::StreamState;
use owo_colors::OwoColorize;
use sd_core::{epoch_secs, Settings};

pub async fn run(settings: &Settings) -> Result<()> {
    let components = Components::new(settings)?;
    let now = epoch_secs();

    println!("{}", "Streamdrop Status".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    println!("Watching:      {}", settings.watch_dir.display().to_string().cyan());
    println!("Checkpoints:   {}", components.checkpoints.describe());
    println!(
        "Objects:       {} (bucket {})",
        settings.s3_endpoint, settings.s3_bucket
    );

    print!("Daemon:        ");
    match DaemonLock::holder(&settings.state_dir) {
        Some(pid) => println!("{} (pid {})", "Running ✓".green(), pid),
        None => {
            println!("{}", "Not running".yellow());
            println!("  {}", "Tip: Start with 'streamdrop run'".dimmed());
        }
    }
    println!();

    let paths = components
        .checkpoints
        .list_tracked_paths()
        .await
        .context("Failed to list tracked streams")?;

    if paths.is_empty() {
        println!("{}", "No tracked streams".dimmed());
        return Ok(());
    }

    println!("Streams ({}):", paths.len());
    for path in &paths {
        let status = match components.monitor.evaluate(path, now).await {
            Ok(Some(status)) => status,
            // Expired or finalized between listing and reading
            Ok(None) => continue,
            Err(e) => {
                println!("  {} {}", path, format!("error: {}", e).red());
                continue;
            }
        };

        let state = match status.state {
            StreamState::Missing => "missing".red().to_string(),
            StreamState::Uploading => "uploading".cyan().to_string(),
            StreamState::Idle => "idle".yellow().to_string(),
            StreamState::Complete => "complete".green().to_string(),
        };
        let size = status
            .file_size
            .map(util::format_size)
            .unwrap_or_else(|| "-".to_string());
        let stream = status
            .record
            .stream_id
            .as_ref()
            .map(|id| id.as_str().chars().take(12).collect::<String>())
            .unwrap_or_else(|| "-".to_string());

        println!("  {}", path);
        println!(
            "    {} {} / {}  idle {}  stream {}",
            state,
            util::format_size(status.record.offset),
            size,
            util::format_idle(status.idle_secs),
            stream.dimmed()
        );
        println!(
            "    {}",
            format!("last activity {}", util::format_timestamp(status.record.last_activity)).dimmed()
        );
    }
    println!();
    println!(
        "{}",
        format!(
            "Complete streams are finalized on the next poll (every {}s, after {}s idle)",
            settings.poll_interval,
            settings.stream_timeout
        )
        .dimmed()
    );

    Ok(())
}
