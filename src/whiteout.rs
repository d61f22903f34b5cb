//! OCI whiteout handling for layer deletions

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const WHITEOUT_PREFIX: &str = ".wh.";
const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";

/// What a whiteout marker asks for, relative to the extraction root
#[derive(Debug, PartialEq, Eq)]
pub enum Whiteout {
    /// Delete this path left behind by an earlier layer
    Remove(PathBuf),
    /// Empty this directory of everything from earlier layers
    Opaque(PathBuf),
}

/// Classify a normalised entry path, `None` for ordinary entries
pub fn classify(path: &Path) -> Option<Whiteout> {
    let basename = path.file_name()?.to_str()?;
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

    if basename == OPAQUE_WHITEOUT {
        Some(Whiteout::Opaque(parent))
    } else if let Some(target) = basename.strip_prefix(WHITEOUT_PREFIX) {
        if target.is_empty() {
            return None;
        }
        Some(Whiteout::Remove(parent.join(target)))
    } else {
        None
    }
}

/// Carry out a whiteout under `dest`; missing targets are not an error
///
/// Paths in `keep` were written by the layer carrying the marker and
/// survive it, as do the directories leading to them.
pub fn apply(dest: &Path, whiteout: &Whiteout, keep: &HashSet<PathBuf>) -> Result<()> {
    match whiteout {
        Whiteout::Remove(target) => remove_except(dest, target, keep).with_context(|| {
            format!(
                "Failed to remove whited-out path: {}",
                dest.join(target).display()
            )
        }),
        Whiteout::Opaque(dir) => clear_dir_except(dest, dir, keep).with_context(|| {
            format!(
                "Failed to clear opaque directory: {}",
                dest.join(dir).display()
            )
        }),
    }
}

fn remove_except(dest: &Path, relative: &Path, keep: &HashSet<PathBuf>) -> io::Result<()> {
    if keep.contains(relative) {
        return Ok(());
    }
    if keep.iter().any(|kept| kept.starts_with(relative)) {
        return clear_dir_except(dest, relative, keep);
    }
    remove_path(&dest.join(relative))
}

fn clear_dir_except(dest: &Path, relative: &Path, keep: &HashSet<PathBuf>) -> io::Result<()> {
    let entries = match fs::read_dir(dest.join(relative)) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    for entry in entries {
        let entry = entry?;
        remove_except(dest, &relative.join(entry.file_name()), keep)?;
    }
    Ok(())
}

fn remove_path(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
