//! `config` command.

use crate::config::Settings;

pub fn cmd_config(settings: &Settings) -> anyhow::Result<()> {
    let toml = toml::to_string_pretty(&settings.redacted())?;
    print!("{toml}");
    Ok(())
}
