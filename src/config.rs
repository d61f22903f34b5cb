use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

/// Image config blob (application/vnd.oci.image.config.v1+json)
/// Only the fields the printer and the layer list need are modelled
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub architecture: String,

    #[serde(default)]
    pub os: String,

    #[serde(default)]
    pub variant: Option<String>,

    #[serde(default)]
    pub created: Option<DateTime<FixedOffset>>,

    #[serde(default)]
    pub config: Option<ContainerConfig>,

    #[serde(default)]
    pub rootfs: Option<RootFs>,
}

/// Execution parameters baked into the image
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerConfig {
    #[serde(rename = "Env", default)]
    pub env: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RootFs {
    #[serde(rename = "type", default)]
    #[allow(dead_code)]
    pub fs_type: String,

    #[serde(default)]
    pub diff_ids: Vec<String>,
}

impl ConfigFile {
    /// Declared environment assignments, empty when the image sets none
    pub fn env(&self) -> Vec<String> {
        self.config
            .as_ref()
            .and_then(|c| c.env.clone())
            .unwrap_or_default()
    }

    /// DiffIDs in layer order
    pub fn diff_ids(&self) -> &[String] {
        self.rootfs
            .as_ref()
            .map(|r| r.diff_ids.as_slice())
            .unwrap_or_default()
    }
}

/// Parse the raw config blob
pub fn parse_config(config_bytes: &[u8]) -> Result<ConfigFile> {
    serde_json::from_slice(config_bytes).context("Failed to parse image config")
}
