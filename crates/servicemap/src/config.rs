use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::codec::Features;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub address_format: AddressFormat,
    pub count_field: String,
    pub sample_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFormat {
    Legacy,
    Modern,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            address_format: AddressFormat::Modern,
            count_field: "version".to_string(),
            sample_dir: PathBuf::from("./samples"),
        }
    }
}

impl ToolConfig {
    /// Feature set used when encoding.
    pub fn features(&self) -> Features {
        match self.address_format {
            AddressFormat::Legacy => Features::legacy(),
            AddressFormat::Modern => Features::modern(),
        }
    }
}

pub fn load_config(path: Option<&std::path::Path>) -> Result<ToolConfig> {
    let config = if let Some(config_path) = path {
        if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

            toml::from_str::<ToolConfig>(&contents)
                .map_err(|e| anyhow::anyhow!("Failed to parse TOML config: {}", e))?
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", config_path);
            ToolConfig::default()
        }
    } else {
        tracing::debug!("No config path provided, using defaults");
        ToolConfig::default()
    };

    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &ToolConfig) -> Result<()> {
    if config.count_field.trim().is_empty() {
        anyhow::bail!("count_field cannot be empty");
    }

    Ok(())
}
