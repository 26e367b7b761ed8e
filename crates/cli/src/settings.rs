//! Settings loading
//!
//! Layers, lowest first: built-in defaults, the TOML settings file,
//! environment variables (`WATCH_DIR`, `CHUNK_SIZE`, ...), command-line flags.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use sd_core::Settings;
use std::path::{Path, PathBuf};

/// Settings file read when `--config` is not given
const DEFAULT_SETTINGS_FILE: &str = "streamdrop.toml";

/// Values given as command-line flags
#[derive(Debug, Default)]
pub struct Overrides {
    pub watch_dir: Option<PathBuf>,
    pub redis_url: Option<String>,
    pub chunk_size: Option<u64>,
}

/// Load and validate the effective settings
pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Settings> {
    build(file, Environment::default().try_parsing(true), overrides)
}

fn build(file: Option<&Path>, env: Environment, overrides: &Overrides) -> Result<Settings> {
    // An explicit file must exist; the default one is optional
    let (path, required) = match file {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_SETTINGS_FILE), false),
    };

    let config = Config::builder()
        .add_source(File::from(path.clone()).format(FileFormat::Toml).required(required))
        .add_source(env)
        .set_override_option(
            "watch_dir",
            overrides.watch_dir.as_ref().map(|p| p.display().to_string()),
        )?
        .set_override_option("redis_url", overrides.redis_url.clone())?
        .set_override_option("chunk_size", overrides.chunk_size.map(|n| n.to_string()))?
        .build()
        .with_context(|| format!("Failed to read settings (file: {})", path.display()))?;

    let settings: Settings = config
        .try_deserialize()
        .context("Invalid settings")?;
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}
