//! In-memory image double for printer and orchestrator tests

use anyhow::{anyhow, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Cursor, Read, Write};
use tar::{Builder, EntryType, Header};

use crate::image::{Image, ImageConfig, Layer};

pub struct FakeImage {
    pub digest: String,
    pub config: ImageConfig,
    pub layers: Vec<FakeLayer>,
    pub fail_config: bool,
}

impl FakeImage {
    pub fn new(digest: &str) -> Self {
        FakeImage {
            digest: digest.to_string(),
            config: ImageConfig {
                architecture: "amd64".to_string(),
                os: "linux".to_string(),
                created: None,
                env: Vec::new(),
            },
            layers: Vec::new(),
            fail_config: false,
        }
    }
}

impl Image for FakeImage {
    type Layer = FakeLayer;

    fn digest(&self) -> Result<String> {
        Ok(self.digest.clone())
    }

    fn config(&self) -> Result<ImageConfig> {
        if self.fail_config {
            return Err(anyhow!("config blob unavailable"));
        }
        Ok(self.config.clone())
    }

    fn layers(&self) -> Result<Vec<FakeLayer>> {
        Ok(self.layers.clone())
    }
}

#[derive(Clone)]
pub struct FakeLayer {
    diff_id: Option<String>,
    size: i64,
    media_type: String,
    blob: Vec<u8>,
}

impl FakeLayer {
    pub fn new(diff_id: &str, size: i64, blob: Vec<u8>) -> Self {
        FakeLayer {
            diff_id: Some(diff_id.to_string()),
            size,
            media_type: "application/vnd.oci.image.layer.v1.tar+gzip".to_string(),
            blob,
        }
    }

    /// A gzip layer holding the given regular files
    pub fn with_files(diff_id: &str, files: &[(&str, &[u8])]) -> Self {
        let blob = gzip_layer(files);
        let size = blob.len() as i64;
        Self::new(diff_id, size, blob)
    }

    pub fn without_diff_id(mut self) -> Self {
        self.diff_id = None;
        self
    }
}

impl Layer for FakeLayer {
    fn size(&self) -> Result<i64> {
        Ok(self.size)
    }

    fn diff_id(&self) -> Result<String> {
        self.diff_id
            .clone()
            .ok_or_else(|| anyhow!("no DiffID recorded"))
    }

    fn media_type(&self) -> &str {
        &self.media_type
    }

    async fn compressed(&self) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.blob.clone())))
    }
}

/// Build a gzip-compressed tar with one regular file per `(path, data)`
pub fn gzip_layer(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = Builder::new(Vec::new());
    for (path, data) in files {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, *data).unwrap();
    }
    let tar = builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar).unwrap();
    encoder.finish().unwrap()
}
