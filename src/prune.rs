//! Retention of snapshot directories.
//!
//! Every direct child directory of the destination counts as a snapshot,
//! whatever its name. Snapshots are ordered newest first by modification
//! time; the first `keep_count` are kept and each one after that is offered
//! to the operator for deletion. The first failing deletion ends the pass.

use crate::error::SnapbakError;
use crate::prompt::Confirm;
use crate::Result;
use chrono::{DateTime, Local};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const PRUNE_QUESTION: &str =
    "Do you want to prune old backups? NOTE: You must have permissions to delete the files!";

const LISTING_DATE_FORMAT: &str = "%m/%d/%y %H:%M:%S";

/// Number of newest snapshots exempt from pruning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub keep_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDirectory {
    pub path: PathBuf,
    pub name: String,
    pub modified: SystemTime,
}

impl SnapshotDirectory {
    /// Modification time in local time, as shown in the listing
    pub fn modified_display(&self) -> String {
        DateTime::<Local>::from(self.modified)
            .format(LISTING_DATE_FORMAT)
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneAction {
    Kept,
    Deleted,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneEntry {
    pub snapshot: SnapshotDirectory,
    pub action: PruneAction,
}

/// Per-snapshot decisions of a completed pass, newest first
#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    pub entries: Vec<PruneEntry>,
}

impl PruneReport {
    pub fn kept(&self) -> Vec<&SnapshotDirectory> {
        self.with_action(PruneAction::Kept)
    }

    pub fn deleted(&self) -> Vec<&SnapshotDirectory> {
        self.with_action(PruneAction::Deleted)
    }

    pub fn declined(&self) -> Vec<&SnapshotDirectory> {
        self.with_action(PruneAction::Declined)
    }

    fn with_action(&self, action: PruneAction) -> Vec<&SnapshotDirectory> {
        self.entries
            .iter()
            .filter(|e| e.action == action)
            .map(|e| &e.snapshot)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum PruneOutcome {
    Completed(PruneReport),
    /// The operator turned down the pass as a whole
    Declined,
}

pub struct RetentionPruner<'a> {
    destination: &'a Path,
    policy: RetentionPolicy,
}

impl<'a> RetentionPruner<'a> {
    pub fn new(destination: &'a Path, policy: RetentionPolicy) -> Self {
        Self {
            destination,
            policy,
        }
    }

    /// List snapshot directories newest first.
    ///
    /// Hidden entries, symlinks and entries that vanish while listing are
    /// ignored. Equal modification times fall back to the name, so the order
    /// is stable.
    pub fn discover(&self) -> Result<Vec<SnapshotDirectory>> {
        let mut snapshots = Vec::new();

        for entry in fs::read_dir(self.destination)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }

            let path = entry.path();
            // Not followed: a link is never a snapshot, even when it points at one
            let metadata = match fs::symlink_metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(path = %path.display(), "snapshot vanished while listing");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if !metadata.is_dir() {
                continue;
            }

            snapshots.push(SnapshotDirectory {
                modified: metadata.modified()?,
                path,
                name,
            });
        }

        snapshots.sort_by(|a, b| (a.modified, &a.name).cmp(&(b.modified, &b.name)));
        snapshots.reverse();
        Ok(snapshots)
    }

    /// Prune with recursive directory removal
    pub fn prune(&self, confirm: &mut dyn Confirm) -> Result<PruneOutcome> {
        self.prune_with(confirm, |path| fs::remove_dir_all(path))
    }

    /// Prune using `remove` to delete each accepted snapshot
    pub fn prune_with<F>(&self, confirm: &mut dyn Confirm, mut remove: F) -> Result<PruneOutcome>
    where
        F: FnMut(&Path) -> io::Result<()>,
    {
        println!("\n>>>> Pruning old backups");
        let snapshots = self.discover()?;
        tracing::info!(
            destination = %self.destination.display(),
            found = snapshots.len(),
            keep = self.policy.keep_count,
            "pruning snapshots"
        );

        if !confirm.confirm(PRUNE_QUESTION, true) {
            println!(">>>> Pruning skipped");
            return Ok(PruneOutcome::Declined);
        }

        println!("{:<40} {:<40} Status:", "Name:", "Last modified:");

        let mut report = PruneReport::default();
        for (index, snapshot) in snapshots.into_iter().enumerate() {
            print!("{:<40} {:<40} ", snapshot.name, snapshot.modified_display());

            if index < self.policy.keep_count {
                println!("OK");
                report.entries.push(PruneEntry {
                    snapshot,
                    action: PruneAction::Kept,
                });
                continue;
            }

            println!();
            let question = format!("Deleting backup directory {}. Is it ok?", snapshot.name);
            if !confirm.confirm(&question, true) {
                report.entries.push(PruneEntry {
                    snapshot,
                    action: PruneAction::Declined,
                });
                continue;
            }

            if let Err(source) = remove(&snapshot.path) {
                tracing::error!(
                    path = %snapshot.path.display(),
                    error = %source,
                    "cannot delete snapshot, stopping prune"
                );
                return Err(SnapbakError::PruneFailed {
                    path: snapshot.path,
                    source,
                });
            }
            println!(">> Deleted {}", snapshot.name);
            report.entries.push(PruneEntry {
                snapshot,
                action: PruneAction::Deleted,
            });
        }

        println!(">>>> Pruning DONE!");
        Ok(PruneOutcome::Completed(report))
    }
}
