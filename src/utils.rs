use crate::error::SnapbakError;
use crate::progress::ScanProgress;
use crate::Result;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Check that the destination exists, is a directory, and is readable and writable
pub fn validate_destination(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(SnapbakError::DestinationMissing {
            path: path.to_path_buf(),
        });
    }
    if !path.is_dir() {
        return Err(SnapbakError::DestinationNotDirectory {
            path: path.to_path_buf(),
        });
    }
    if fs::read_dir(path).is_err() {
        return Err(SnapbakError::DestinationNotReadable {
            path: path.to_path_buf(),
        });
    }

    // Probe write access with a throwaway file
    let probe = path.join(format!(".snapbak_write_test_{}", std::process::id()));
    fs::File::create(&probe).map_err(|e| write_probe_error(path, e))?;
    if let Err(e) = fs::remove_file(&probe) {
        tracing::warn!(probe = %probe.display(), error = %e, "could not remove write probe");
    }
    Ok(())
}

fn write_probe_error(path: &Path, error: io::Error) -> SnapbakError {
    match error.kind() {
        io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => {
            SnapbakError::DestinationNotWritable {
                path: path.to_path_buf(),
            }
        }
        _ => SnapbakError::Io(error),
    }
}

/// Anchor a relative path at the current working directory.
///
/// External programs run inside the snapshot directory, so every path handed
/// to them must already be absolute.
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

/// Check that a source directory can be backed up.
///
/// All failures are recoverable: the caller skips the source and carries on.
pub fn check_source(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(SnapbakError::SourceMissing {
            path: path.to_path_buf(),
        });
    }
    if !path.is_dir() {
        return Err(SnapbakError::SourceNotDirectory {
            path: path.to_path_buf(),
        });
    }
    if fs::read_dir(path).is_err() {
        return Err(SnapbakError::SourceNotReadable {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Total size of regular files under `path`, in bytes.
///
/// Best effort: unreadable entries and files removed mid-walk are skipped,
/// a missing root yields 0.
pub fn estimate_size_bytes(path: &Path) -> u64 {
    walk_file_sizes(path, |_| {})
}

/// Total size of regular files under `path` in whole binary megabytes (floor)
pub fn estimate_size_mb(path: &Path) -> u64 {
    estimate_size_bytes(path) >> 20
}

/// Same as [`estimate_size_mb`], reporting each file to a scan spinner
pub fn estimate_size_mb_with_progress(path: &Path, progress: &mut ScanProgress) -> u64 {
    walk_file_sizes(path, |file| progress.file_seen(file)) >> 20
}

/// Sum of the per-directory estimates, each floored to megabytes first
pub fn estimate_total_mb(paths: &[PathBuf]) -> u64 {
    paths.iter().map(|p| estimate_size_mb(p)).sum()
}

fn walk_file_sizes(path: &Path, mut on_file: impl FnMut(&Path)) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            // Files can disappear between listing and stat
            let len = entry.metadata().ok()?.len();
            on_file(entry.path());
            Some(len)
        })
        .sum()
}

/// Free space on the filesystem holding `path`, if it can be determined
pub fn available_space(path: &Path) -> Option<u64> {
    match fs2::available_space(path) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not determine available disk space");
            None
        }
    }
}

/// Format byte size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: u64 = 1024;

    if bytes < THRESHOLD {
        return format!("{bytes} B");
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD as f64 && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD as f64;
        unit_index += 1;
    }

    let unit = UNITS[unit_index];
    format!("{size:.1} {unit}")
}
