use std::io::Write;
use std::path::PathBuf;
use tracing::info;

use crate::error::PullError;
use crate::extract::{self, Compression, ExtractOptions, ExtractStats};
use crate::image::{Image, Layer, Platform};
use crate::registry::{self, RegistryOptions, RemoteImage};
use crate::report::Reporter;

/// Everything one run needs, assembled from the command line
#[derive(Debug, Clone)]
pub struct PullOptions {
    pub image: String,
    pub platform: Platform,
    pub dest: PathBuf,
    pub registry: RegistryOptions,
    pub extract: ExtractOptions,
}

/// Resolve the reference, fetch the image for the platform and extract it
pub async fn pull<W: Write>(
    options: &PullOptions,
    reporter: &mut Reporter<W>,
) -> Result<ExtractStats, PullError> {
    let reference = registry::parse_reference(&options.image)?;

    let image = RemoteImage::fetch(&reference, &options.platform, &options.registry)
        .await
        .map_err(PullError::Fetch)?;

    extract_image(&image, options, reporter).await
}

/// Print the image metadata, then extract every layer in manifest order
///
/// Stops at the first failing layer; files already written stay in place.
pub async fn extract_image<I: Image, W: Write>(
    image: &I,
    options: &PullOptions,
    reporter: &mut Reporter<W>,
) -> Result<ExtractStats, PullError> {
    reporter.image_metadata(image)?;

    let layers = image.layers().map_err(PullError::Metadata)?;
    let mut total = ExtractStats::default();

    for (idx, layer) in layers.iter().enumerate() {
        let ordinal = idx + 1;
        reporter.processing_layer(ordinal)?;

        let stats = extract_one(layer, options, reporter)
            .await
            .map_err(|source| PullError::Extract {
                layer: ordinal,
                source,
            })?;

        info!(
            layer = ordinal,
            files = stats.files,
            bytes = stats.bytes,
            skipped = stats.skipped,
            "Layer extracted"
        );

        total.files += stats.files;
        total.bytes += stats.bytes;
        total.skipped += stats.skipped;
    }

    reporter.complete()?;
    Ok(total)
}

async fn extract_one<L: Layer, W: Write>(
    layer: &L,
    options: &PullOptions,
    reporter: &mut Reporter<W>,
) -> anyhow::Result<ExtractStats> {
    let compression = Compression::from_media_type(layer.media_type())?;
    let blob = layer.compressed().await?;

    extract::extract_layer(blob, compression, &options.dest, &options.extract, |path| {
        reporter.extracted(path)
    })
}
