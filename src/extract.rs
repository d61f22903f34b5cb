use anyhow::{bail, Context, Result};
use flate2::read::MultiGzDecoder;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Entry, EntryType};
use tracing::{debug, warn};

use crate::whiteout;

/// How a layer blob is compressed, derived from its media type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Plain,
}

impl Compression {
    /// Map a layer media type to its compression
    ///
    /// Unknown media types are assumed to be gzip, which is what registries
    /// serve for nearly every image layer.
    pub fn from_media_type(media_type: &str) -> Result<Self> {
        if media_type.ends_with("+gzip") || media_type.ends_with(".gzip") {
            Ok(Compression::Gzip)
        } else if media_type.ends_with("+zstd") || media_type.ends_with(".zstd") {
            bail!("Unsupported layer compression: {}", media_type)
        } else if media_type.ends_with(".tar") {
            Ok(Compression::Plain)
        } else {
            Ok(Compression::Gzip)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Honour `.wh.` markers instead of writing them out as files
    pub apply_whiteouts: bool,
}

/// Totals for one extracted layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// Regular files written
    pub files: usize,
    /// Bytes written across those files
    pub bytes: u64,
    /// Entries refused because their path escapes the destination
    pub skipped: usize,
}

/// Extract the regular files of one layer blob into `dest`
///
/// `on_extracted` is called with the target path after each file is written.
/// Any decode or filesystem error aborts the layer.
pub fn extract_layer<R, F>(
    blob: R,
    compression: Compression,
    dest: &Path,
    options: &ExtractOptions,
    on_extracted: F,
) -> Result<ExtractStats>
where
    R: Read,
    F: FnMut(&Path) -> io::Result<()>,
{
    let stats = match compression {
        // A layer may be several concatenated gzip members
        Compression::Gzip => {
            let mut archive = Archive::new(MultiGzDecoder::new(blob));
            process_layer_entries(&mut archive, dest, options, on_extracted)?
        }
        Compression::Plain => {
            let mut archive = Archive::new(blob);
            process_layer_entries(&mut archive, dest, options, on_extracted)?
        }
    };

    debug!(
        dest = %dest.display(),
        files = stats.files,
        bytes = stats.bytes,
        skipped = stats.skipped,
        "Extracted layer"
    );

    Ok(stats)
}

/// Walk the archive in stream order
fn process_layer_entries<R: Read, F>(
    archive: &mut Archive<R>,
    dest: &Path,
    options: &ExtractOptions,
    mut on_extracted: F,
) -> Result<ExtractStats>
where
    F: FnMut(&Path) -> io::Result<()>,
{
    let mut stats = ExtractStats::default();
    // Files written by this layer; whiteouts only hide earlier layers
    let mut written = HashSet::new();

    for entry in archive.entries().context("Failed to read layer entries")? {
        let entry = entry.context("Failed to read tar entry")?;
        apply_entry(entry, dest, options, &mut stats, &mut written, &mut on_extracted)?;
    }

    Ok(stats)
}

/// Apply a single tar entry to the destination
fn apply_entry<R: Read, F>(
    mut entry: Entry<R>,
    dest: &Path,
    options: &ExtractOptions,
    stats: &mut ExtractStats,
    written: &mut HashSet<PathBuf>,
    on_extracted: &mut F,
) -> Result<()>
where
    F: FnMut(&Path) -> io::Result<()>,
{
    let raw_path = entry.path().context("Failed to read entry path")?.into_owned();

    let Some(relative) = normalize_entry_path(&raw_path) else {
        warn!(path = %raw_path.display(), "Skipping entry outside the destination");
        stats.skipped += 1;
        return Ok(());
    };

    if relative.as_os_str().is_empty() {
        return Ok(());
    }

    if options.apply_whiteouts {
        if let Some(marker) = whiteout::classify(&relative) {
            return whiteout::apply(dest, &marker, written);
        }
    }

    // Directories, links, devices and fifos are not materialised
    if entry.header().entry_type() != EntryType::Regular {
        return Ok(());
    }

    let target = clean_join(dest, &relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let expected = entry.size();
    let copied = {
        let mut file = File::create(&target)
            .with_context(|| format!("Failed to create file: {}", target.display()))?;
        io::copy(&mut entry, &mut file)
            .with_context(|| format!("Failed to copy file: {}", target.display()))?
    };

    if copied != expected {
        bail!(
            "Layer ended inside {}: wrote {} of {} bytes",
            raw_path.display(),
            copied,
            expected
        );
    }

    written.insert(relative);
    stats.files += 1;
    stats.bytes += copied;
    on_extracted(&target).context("Failed to report extracted file")?;

    Ok(())
}

/// Make an archive path relative to the destination
///
/// Root and `.` components are dropped. Returns `None` when the path climbs
/// with `..`.
fn normalize_entry_path(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => return None,
        }
    }
    Some(normalized)
}

/// Join an entry onto the destination, resolving `.` and `..` lexically
///
/// `./extracted_files` + `etc/motd` gives `extracted_files/etc/motd`.
fn clean_join(dest: &Path, relative: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in dest.components().chain(relative.components()) {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match cleaned.components().next_back() {
                Some(Component::Normal(_)) => {
                    cleaned.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => cleaned.push(".."),
            },
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}
