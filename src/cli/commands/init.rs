//! Init and Config commands.

use anyhow::{Context, bail};

use crate::config::Settings;
use crate::store;

/// Create `.dirsync/settings.toml` and an empty source list next to it.
///
/// `force` only rewrites the settings; an existing source list is kept.
pub fn run_init(force: bool) -> anyhow::Result<()> {
    let settings_path = Settings::init_config_file(force)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("cannot create settings")?;

    let settings = Settings::default();
    if !settings.state_file.exists() {
        store::save(&settings.state_file, &[])?;
    }

    println!("Created {}", settings_path.display());
    println!("Sources are kept in {}", settings.state_file.display());
    println!("Add one with `dirsync add-source <PATH>`.");
    Ok(())
}

/// Print the effective settings as TOML.
pub fn run_config(settings: &Settings) -> anyhow::Result<()> {
    if let Err(e) = settings.validate() {
        bail!("{e}");
    }
    println!("Current Configuration:");
    println!("{}", "=".repeat(50));
    println!("{}", toml::to_string_pretty(settings)?);
    Ok(())
}
