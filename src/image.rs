//! Read-only view of a fetched image
//!
//! The printer and the orchestrator only see these traits, so the registry
//! client stays behind `registry::RemoteImage` and tests can substitute a
//! fake image.

use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use std::fmt;
use std::future::Future;
use std::io::Read;

/// Target platform of a pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    pub variant: Option<String>,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{}", variant)?;
        }
        Ok(())
    }
}

/// Descriptive fields of an image config
#[derive(Debug, Clone, Default)]
pub struct ImageConfig {
    pub architecture: String,
    pub os: String,
    pub created: Option<DateTime<FixedOffset>>,
    pub env: Vec<String>,
}

pub trait Image {
    type Layer: Layer;

    /// Digest of the platform-specific manifest
    fn digest(&self) -> Result<String>;

    fn config(&self) -> Result<ImageConfig>;

    /// Layers in manifest order
    fn layers(&self) -> Result<Vec<Self::Layer>>;
}

pub trait Layer {
    /// Declared size of the compressed blob in bytes
    fn size(&self) -> Result<i64>;

    /// Digest of the uncompressed layer contents
    fn diff_id(&self) -> Result<String>;

    fn media_type(&self) -> &str;

    /// Open the compressed blob as a forward-only stream
    fn compressed(&self) -> impl Future<Output = Result<Box<dyn Read + Send>>> + Send;
}
