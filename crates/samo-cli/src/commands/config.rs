//! Config command handlers

use std::path::PathBuf;

use anyhow::{Context, Result};

use samo_core::Config;

use crate::output::{Output, OutputFormat};

fn effective_path(config_path: Option<&PathBuf>) -> PathBuf {
    config_path.cloned().unwrap_or_else(Config::config_file_path)
}

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    let path = effective_path(config_path);
    output.print_config(&config, &path.display().to_string());
    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    config.set_value(&key, &value)?;

    // Save to the CLI-specified path or default
    config
        .save_to_path(&effective_path(config_path))
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));
    Ok(())
}

/// Print where the configuration lives
pub fn path(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let path = effective_path(config_path);
    match output.format {
        OutputFormat::Json => {
            println!("{}", serde_json::json!({"path": path.display().to_string()}));
        }
        _ => println!("{}", path.display()),
    }
    Ok(())
}
