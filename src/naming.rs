use crate::error::SnapbakError;
use crate::Result;
use chrono::{DateTime, TimeZone};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Timestamp layout of snapshot names, sortable at second granularity
pub const SNAPSHOT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Build the snapshot name `<YYYYMMDD_HHMMSS>_<host>`.
///
/// The host is normalized here so the sanitized value is the one that ends
/// up on disk.
pub fn snapshot_name<Tz: TimeZone>(timestamp: &DateTime<Tz>, host: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}_{}",
        timestamp.format(SNAPSHOT_TIMESTAMP_FORMAT),
        normalize_host(host)
    )
}

/// Replace `.` in a host identifier so `box.example.org` becomes `box_example_org`
pub fn normalize_host(host: &str) -> String {
    host.replace('.', "_")
}

/// Host name of this machine, or `localhost` when it cannot be determined
pub fn current_host() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Flatten a source path into a single folder name: `/home/a/docs` becomes `_home_a_docs`
pub fn flatten_source_name(source: &Path) -> String {
    source
        .to_string_lossy()
        .chars()
        .map(|c| if std::path::is_separator(c) { '_' } else { c })
        .collect()
}

/// Name of the per-run summary log
pub fn summary_file_name(snapshot_name: &str) -> String {
    format!("{snapshot_name}_backup_summary.txt")
}

/// Create the snapshot directory under `destination`.
///
/// An existing directory of the same name is an error; two runs never share
/// a snapshot.
pub fn create_snapshot_dir(destination: &Path, snapshot_name: &str) -> Result<PathBuf> {
    let path = destination.join(snapshot_name);

    match fs::create_dir(&path) {
        Ok(()) => Ok(path),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(SnapbakError::SnapshotExists { path })
        }
        Err(e) => Err(SnapbakError::Io(e)),
    }
}
