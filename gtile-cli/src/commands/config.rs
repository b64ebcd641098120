//! Print or write the active or example configuration

use crate::config::Config;
use crate::error::CliResult;
use std::path::Path;

pub fn execute(config: &Config, example: bool, out: Option<&Path>) -> CliResult<()> {
    let content = if example {
        Config::example_toml()?
    } else {
        toml::to_string_pretty(config)?
    };

    match out {
        Some(path) => {
            std::fs::write(path, content)?;
            log::info!("Configuration written to {}", path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}
