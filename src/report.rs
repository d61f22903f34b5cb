use chrono::SecondsFormat;
use owo_colors::OwoColorize;
use std::fmt::Display;
use std::io::{self, Write};
use std::path::Path;

use crate::error::PullError;
use crate::image::{Image, Layer};

/// Human-readable progress and metadata on a writer (stdout in practice)
pub struct Reporter<W: Write> {
    out: W,
    use_color: bool,
}

impl Reporter<io::Stdout> {
    pub fn stdout(use_color: bool) -> Self {
        Self::new(io::stdout(), use_color)
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, use_color: bool) -> Self {
        Reporter { out, use_color }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Print digest, platform, creation time, environment and per-layer size/DiffID
    ///
    /// Any field that cannot be read fails the whole report.
    pub fn image_metadata<I: Image>(&mut self, image: &I) -> Result<(), PullError> {
        let digest = image.digest().map_err(PullError::Metadata)?;
        self.field("Image Digest:", &digest)?;

        let config = image.config().map_err(PullError::Metadata)?;
        self.field("Architecture:", &config.architecture)?;
        self.field("OS:", &config.os)?;
        let created = config
            .created
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_else(|| "unknown".to_string());
        self.field("Created:", &created)?;

        if config.env.is_empty() {
            writeln!(self.out, "No environment variables set.")?;
        } else {
            self.heading("Environment Variables:")?;
            for var in &config.env {
                writeln!(self.out, "  {}", var)?;
            }
        }

        let layers = image.layers().map_err(PullError::Metadata)?;
        for (idx, layer) in layers.iter().enumerate() {
            let size = layer.size().map_err(PullError::Metadata)?;
            let diff_id = layer.diff_id().map_err(PullError::Metadata)?;
            let label = format!("Layer {}", idx + 1);
            if self.use_color {
                writeln!(
                    self.out,
                    "{} - Size: {} bytes, DiffID: {}",
                    label.magenta(),
                    size,
                    diff_id
                )?;
            } else {
                writeln!(self.out, "{} - Size: {} bytes, DiffID: {}", label, size, diff_id)?;
            }
        }

        self.out.flush()?;
        Ok(())
    }

    pub fn processing_layer(&mut self, ordinal: usize) -> io::Result<()> {
        let label = format!("Processing Layer {}...", ordinal);
        if self.use_color {
            writeln!(self.out, "{}", label.bold())?;
        } else {
            writeln!(self.out, "{}", label)?;
        }
        self.out.flush()
    }

    pub fn extracted(&mut self, path: &Path) -> io::Result<()> {
        writeln!(self.out, "Extracted: {}", path.display())
    }

    pub fn complete(&mut self) -> io::Result<()> {
        if self.use_color {
            writeln!(self.out, "{}", "Extraction complete!".green())?;
        } else {
            writeln!(self.out, "Extraction complete!")?;
        }
        self.out.flush()
    }

    fn field(&mut self, label: &str, value: &dyn Display) -> io::Result<()> {
        if self.use_color {
            writeln!(self.out, "{} {}", label.cyan(), value)
        } else {
            writeln!(self.out, "{} {}", label, value)
        }
    }

    fn heading(&mut self, label: &str) -> io::Result<()> {
        if self.use_color {
            writeln!(self.out, "{}", label.cyan())
        } else {
            writeln!(self.out, "{}", label)
        }
    }
}
