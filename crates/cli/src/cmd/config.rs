//! Print the effective settings

use anyhow::Result;
use sd_core::Settings;

pub fn run(settings: &Settings) -> Result<()> {
    print!("{}", settings.to_redacted_toml()?);
    Ok(())
}
