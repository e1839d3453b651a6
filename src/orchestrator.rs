//! One backup run, start to finish.
//!
//! The steps run strictly in order: validate the destination, estimate and
//! report sizes, ask the operator, create the snapshot, transfer every
//! source, compress the summary, then the optional captures. The snapshot
//! directory is only created once the operator has agreed, so declining
//! leaves the destination untouched.

use crate::auxiliary::AuxiliaryCapture;
use crate::command::CommandRunner;
use crate::config::Settings;
use crate::naming::{create_snapshot_dir, current_host, snapshot_name, summary_file_name};
use crate::progress::ScanProgress;
use crate::prompt::Confirm;
use crate::transfer::{SummaryLog, TransferReport, TransferRunner};
use crate::utils::{
    absolute_path, available_space, estimate_size_mb_with_progress, format_size,
    validate_destination,
};
use crate::Result;
use chrono::{DateTime, Local};
use std::path::PathBuf;

pub const CONTINUE_QUESTION: &str = "Do you want to continue?";

/// Record of a run that went through to the end
#[derive(Debug, Clone)]
pub struct BackupRun {
    pub timestamp: DateTime<Local>,
    pub host: String,
    pub snapshot_name: String,
    pub snapshot_dir: PathBuf,
    pub sources: Vec<PathBuf>,
    /// Final location of the summary, with the compressor's suffix when compressed
    pub summary_log: PathBuf,
    pub transfers: TransferReport,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(BackupRun),
    /// The operator declined before anything was written
    Declined,
}

pub struct BackupOrchestrator<'a> {
    settings: &'a Settings,
    runner: &'a mut dyn CommandRunner,
    confirm: &'a mut dyn Confirm,
    host: Option<String>,
    timestamp: Option<DateTime<Local>>,
    auxiliary: AuxiliaryCapture,
}

impl<'a> BackupOrchestrator<'a> {
    pub fn new(
        settings: &'a Settings,
        runner: &'a mut dyn CommandRunner,
        confirm: &'a mut dyn Confirm,
    ) -> Self {
        Self {
            settings,
            runner,
            confirm,
            host: None,
            timestamp: None,
            auxiliary: AuxiliaryCapture::system(),
        }
    }

    /// Use a fixed host identifier instead of the machine's hostname
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Use a fixed start time instead of the clock
    pub fn with_timestamp(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_auxiliary(mut self, auxiliary: AuxiliaryCapture) -> Self {
        self.auxiliary = auxiliary;
        self
    }

    pub fn run(self) -> Result<RunOutcome> {
        let settings = self.settings;
        // Anchored once here; external programs later run inside the snapshot
        let destination = absolute_path(&settings.destination)?;
        let sources = settings
            .sources
            .iter()
            .map(|source| absolute_path(source))
            .collect::<Result<Vec<_>>>()?;
        validate_destination(&destination)?;

        let timestamp = self.timestamp.unwrap_or_else(Local::now);
        let host = self.host.clone().unwrap_or_else(current_host);
        println!("Current time: {}", timestamp.format("%Y.%m.%d %H:%M:%S"));
        println!("\n>>>> Preparing backup...");

        let total_mb = report_sizes(&sources);
        println!(">> Total size of the backup: {total_mb} MB");
        match available_space(&destination) {
            Some(bytes) => println!(
                ">> Available space on {}: {}",
                destination.display(),
                format_size(bytes)
            ),
            None => println!(
                ">> Available space on {}: unknown",
                destination.display()
            ),
        }

        if !self.confirm.confirm(CONTINUE_QUESTION, true) {
            tracing::info!("backup declined by operator");
            return Ok(RunOutcome::Declined);
        }

        let name = snapshot_name(&timestamp, &host);
        let snapshot_dir = create_snapshot_dir(&destination, &name)?;
        tracing::info!(snapshot = %snapshot_dir.display(), "snapshot created");
        println!("\n>>>> Creating backup in {}", snapshot_dir.display());

        let log = SummaryLog::create(snapshot_dir.join(summary_file_name(&name)))?;
        let transfers = TransferRunner::from_settings(settings).run_all(
            self.runner,
            &sources,
            &snapshot_dir,
            &log,
        )?;

        let summary_log = if settings.gzip_summary {
            log.compress(self.runner, &settings.compressor)?
        } else {
            log.path().to_path_buf()
        };

        if settings.backup_package_list {
            self.auxiliary.capture_packages(self.runner, &snapshot_dir)?;
        }
        if settings.backup_firefox_profile {
            self.auxiliary
                .capture_firefox_profile(self.runner, &snapshot_dir)?;
        }

        if transfers.all_succeeded() {
            println!("\n>>>> Everything backed up SUCCESSFULLY!");
        } else {
            tracing::warn!(
                failed = transfers.failed(),
                skipped = transfers.skipped(),
                "backup finished with problems"
            );
            println!(
                "\n>>>> Backup finished: {} transferred, {} failed, {} skipped. See {}",
                transfers.transferred(),
                transfers.failed(),
                transfers.skipped(),
                summary_log.display()
            );
        }

        Ok(RunOutcome::Completed(BackupRun {
            timestamp,
            host,
            snapshot_name: name,
            snapshot_dir,
            sources,
            summary_log,
            transfers,
        }))
    }
}

/// Print each source's estimate and return their sum
fn report_sizes(sources: &[PathBuf]) -> u64 {
    let mut total = 0;
    for source in sources {
        let mut progress = ScanProgress::start(source);
        let size = estimate_size_mb_with_progress(source, &mut progress);
        progress.finish();
        tracing::debug!(source = %source.display(), files = progress.files_seen(), "size estimated");
        println!(">> Directory: {} with size: {size} MB", source.display());
        total += size;
    }
    total
}
