//! Remote image access through the `oci-distribution` registry client
//!
//! Manifest resolution, token negotiation and blob retrieval all happen in
//! the client; this module only selects the platform and adapts the result
//! to the [`Image`]/[`Layer`] traits.

use anyhow::{anyhow, bail, Context, Result};
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::{ImageIndexEntry, OciDescriptor, OciImageManifest};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference};
use sha2::{Digest, Sha256, Sha512};
use std::io::{Cursor, Read};
use tracing::{debug, info, warn};

use crate::config::{self, ConfigFile};
use crate::error::PullError;
use crate::image::{Image, ImageConfig, Layer, Platform};

/// Connection settings for the registry
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Use plain HTTP instead of HTTPS
    pub insecure: bool,
}

impl RegistryOptions {
    fn auth(&self) -> RegistryAuth {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => RegistryAuth::Basic(u.clone(), p.clone()),
            _ => RegistryAuth::Anonymous,
        }
    }
}

/// Parse an image reference such as `alpine:latest` or `ghcr.io/org/app@sha256:...`
pub fn parse_reference(image: &str) -> Result<Reference, PullError> {
    image
        .parse::<Reference>()
        .map_err(|e| PullError::InvalidReference {
            reference: image.to_string(),
            message: e.to_string(),
        })
}

/// Pick the index entry matching `platform`, returning its manifest digest
///
/// The variant is only compared when one was requested.
pub fn resolve_platform(manifests: &[ImageIndexEntry], platform: &Platform) -> Option<String> {
    manifests
        .iter()
        .find(|entry| {
            entry.platform.as_ref().map_or(false, |p| {
                p.os == platform.os
                    && p.architecture == platform.architecture
                    && platform
                        .variant
                        .as_ref()
                        .map_or(true, |v| p.variant.as_deref() == Some(v.as_str()))
            })
        })
        .map(|entry| entry.digest.clone())
}

/// Check `data` against an OCI digest such as `sha256:<hex>`
pub fn verify_blob_digest(data: &[u8], expected: &str) -> Result<()> {
    let (algorithm, want) = expected
        .split_once(':')
        .ok_or_else(|| anyhow!("Malformed blob digest: {}", expected))?;

    let actual = match algorithm {
        "sha256" => hex::encode(Sha256::digest(data)),
        "sha512" => hex::encode(Sha512::digest(data)),
        other => bail!("Unsupported digest algorithm {} in {}", other, expected),
    };

    if !actual.eq_ignore_ascii_case(want) {
        bail!(
            "Blob digest mismatch: expected {}, got {}:{}",
            expected,
            algorithm,
            actual
        );
    }
    Ok(())
}

/// An image manifest and config fetched for one platform
pub struct RemoteImage {
    client: Client,
    reference: Reference,
    manifest: OciImageManifest,
    digest: String,
    config: ConfigFile,
}

impl RemoteImage {
    /// Fetch manifest and config of `reference` for `platform`
    pub async fn fetch(
        reference: &Reference,
        platform: &Platform,
        options: &RegistryOptions,
    ) -> Result<Self> {
        let wanted = platform.clone();
        let client_config = ClientConfig {
            protocol: if options.insecure {
                ClientProtocol::Http
            } else {
                ClientProtocol::Https
            },
            platform_resolver: Some(Box::new(move |manifests: &[ImageIndexEntry]| {
                resolve_platform(manifests, &wanted)
            })),
            ..Default::default()
        };
        let client = Client::new(client_config);
        let auth = options.auth();

        info!(reference = %reference, platform = %platform, "Fetching image manifest");

        let (manifest, digest, config_json) = client
            .pull_manifest_and_config(reference, &auth)
            .await
            .with_context(|| format!("Failed to pull manifest for {}", reference))?;

        let config = config::parse_config(config_json.as_bytes())?;

        let variant_differs = platform.variant.is_some() && config.variant != platform.variant;
        if config.os != platform.os || config.architecture != platform.architecture || variant_differs
        {
            warn!(
                requested = %platform,
                os = %config.os,
                architecture = %config.architecture,
                variant = config.variant.as_deref().unwrap_or(""),
                "Image platform differs from the requested one"
            );
        }

        debug!(digest = %digest, layers = manifest.layers.len(), "Resolved image manifest");

        Ok(Self {
            client,
            reference: reference.clone(),
            manifest,
            digest,
            config,
        })
    }
}

impl Image for RemoteImage {
    type Layer = RemoteLayer;

    fn digest(&self) -> Result<String> {
        Ok(self.digest.clone())
    }

    fn config(&self) -> Result<ImageConfig> {
        Ok(ImageConfig {
            architecture: self.config.architecture.clone(),
            os: self.config.os.clone(),
            created: self.config.created,
            env: self.config.env(),
        })
    }

    fn layers(&self) -> Result<Vec<RemoteLayer>> {
        let diff_ids = self.config.diff_ids();

        Ok(self
            .manifest
            .layers
            .iter()
            .enumerate()
            .map(|(idx, descriptor)| RemoteLayer {
                client: self.client.clone(),
                reference: self.reference.clone(),
                descriptor: descriptor.clone(),
                diff_id: diff_ids.get(idx).cloned(),
            })
            .collect())
    }
}

/// One layer blob of a [`RemoteImage`], downloaded on demand
///
/// Shares the image's client, which already holds the registry token.
pub struct RemoteLayer {
    client: Client,
    reference: Reference,
    descriptor: OciDescriptor,
    diff_id: Option<String>,
}

impl Layer for RemoteLayer {
    fn size(&self) -> Result<i64> {
        Ok(self.descriptor.size)
    }

    fn diff_id(&self) -> Result<String> {
        self.diff_id.clone().ok_or_else(|| {
            anyhow!(
                "Image config has no DiffID for layer {}",
                self.descriptor.digest
            )
        })
    }

    fn media_type(&self) -> &str {
        &self.descriptor.media_type
    }

    // The whole blob is held in memory until the layer is extracted
    async fn compressed(&self) -> Result<Box<dyn Read + Send>> {
        debug!(
            digest = %self.descriptor.digest,
            size = self.descriptor.size,
            "Pulling layer blob"
        );

        let mut data: Vec<u8> = Vec::new();
        self.client
            .pull_blob(&self.reference, &self.descriptor, &mut data)
            .await
            .with_context(|| format!("Failed to pull layer blob {}", self.descriptor.digest))?;
        verify_blob_digest(&data, &self.descriptor.digest)?;

        Ok(Box::new(Cursor::new(data)))
    }
}
