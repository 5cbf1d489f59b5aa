use std::{fs, path::PathBuf};

use anyhow::{Context, Result, bail};
use shared::config::ClientConfig;

/// Writes the default configuration in the given format.
///
/// # Errors
/// Returns an error if the format is unsupported or if writing the file fails.
pub fn generate_config(format: &str, output: Option<PathBuf>) -> Result<()> {
    let config = ClientConfig::with_defaults();
    let (serialized, file_name) = match format {
        "yaml" | "yml" => (serde_yml::to_string(&config)?, "config.yaml"),
        "json" => (serde_json::to_string_pretty(&config)?, "config.json"),
        other => bail!("Unsupported format '{other}'. Use 'yaml' or 'json'."),
    };

    let path = output.unwrap_or_else(|| PathBuf::from(file_name));
    fs::write(&path, serialized)
        .with_context(|| format!("failed to write {}", path.display()))?;

    println!("Configuration file '{}' generated successfully.", path.display());
    Ok(())
}
