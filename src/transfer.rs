use crate::command::{run_checked, CommandRunner, ExternalCommand};
use crate::config::Settings;
use crate::error::SnapbakError;
use crate::naming::flatten_source_name;
use crate::utils::{absolute_path, check_source};
use crate::Result;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Append-only text log of one run, shared by all transfers of that run
#[derive(Debug)]
pub struct SummaryLog {
    path: PathBuf,
}

impl SummaryLog {
    /// Create the log; an existing file at `path` is an error
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, bytes: &[u8]) -> Result<()> {
        self.writer()?.write_all(bytes)?;
        Ok(())
    }

    /// Append handle for streaming command output into the log
    pub fn writer(&self) -> Result<File> {
        Ok(OpenOptions::new().append(true).open(&self.path)?)
    }

    /// Compress the log in place with `<compressor> -f <log>`.
    ///
    /// Returns the path of the compressed file. A failing compressor is fatal
    /// for the run and its status is carried in the error.
    pub fn compress(self, runner: &mut dyn CommandRunner, compressor: &str) -> Result<PathBuf> {
        let extension = compressed_extension(compressor).ok_or_else(|| {
            SnapbakError::invalid_value("General", "Compressor", compressor)
        })?;

        let command = ExternalCommand::new(compressor).arg("-f").arg(&self.path);
        run_checked(runner, &command, &mut io::sink()).map_err(|e| {
            tracing::error!(log = %self.path.display(), error = %e, "cannot compress summary");
            e
        })?;

        let mut compressed = self.path.into_os_string();
        compressed.push(".");
        compressed.push(extension);
        Ok(PathBuf::from(compressed))
    }
}

/// Suffix a supported compressor appends when it replaces a file in place
pub fn compressed_extension(compressor: &str) -> Option<&'static str> {
    let program = Path::new(compressor).file_name()?.to_str()?;
    match program {
        "gzip" | "pigz" => Some("gz"),
        "bzip2" | "pbzip2" => Some("bz2"),
        "xz" => Some("xz"),
        "lzma" => Some("lzma"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    Transferred,
    Failed { code: i32 },
    Skipped { reason: String },
}

#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub source: PathBuf,
    /// Folder inside the snapshot; `None` for skipped sources
    pub target: Option<PathBuf>,
    pub status: TransferStatus,
}

#[derive(Debug, Clone, Default)]
pub struct TransferReport {
    pub outcomes: Vec<TransferOutcome>,
}

impl TransferReport {
    pub fn transferred(&self) -> usize {
        self.count(|s| matches!(s, TransferStatus::Transferred))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, TransferStatus::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, TransferStatus::Skipped { .. }))
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0 && self.skipped() == 0
    }

    fn count(&self, pred: impl Fn(&TransferStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Invokes the transfer program once per source directory, in order
#[derive(Debug, Clone)]
pub struct TransferRunner<'a> {
    program: &'a str,
    excludes: &'a [String],
    stop_on_error: bool,
}

impl<'a> TransferRunner<'a> {
    pub fn new(program: &'a str, excludes: &'a [String]) -> Self {
        Self {
            program,
            excludes,
            stop_on_error: false,
        }
    }

    pub fn from_settings(settings: &'a Settings) -> Self {
        Self {
            program: &settings.transfer_program,
            excludes: &settings.excludes,
            stop_on_error: settings.stop_on_transfer_error,
        }
    }

    /// Abort on the first failing transfer instead of moving on
    pub fn stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    /// `<program> -avz --progress --exclude=<p>... <source> <target>`
    pub fn transfer_command(
        &self,
        source: &Path,
        target: &Path,
        snapshot_dir: &Path,
    ) -> ExternalCommand {
        ExternalCommand::new(self.program)
            .args(["-avz", "--progress"])
            .args(self.excludes.iter().map(|p| format!("--exclude={p}")))
            .arg(source)
            .arg(target)
            .current_dir(snapshot_dir)
    }

    pub fn run_all(
        &self,
        runner: &mut dyn CommandRunner,
        sources: &[PathBuf],
        snapshot_dir: &Path,
        log: &SummaryLog,
    ) -> Result<TransferReport> {
        let mut report = TransferReport::default();
        // The transfer program runs inside the snapshot, so relative paths would resolve there
        let snapshot_dir = &absolute_path(snapshot_dir)?;

        for source in sources {
            let source = &absolute_path(source)?;
            println!(">> Creating backup of the directory: {}", source.display());

            if let Err(e) = check_source(source) {
                if !e.is_recoverable() {
                    return Err(e);
                }
                tracing::warn!(source = %source.display(), reason = %e, "skipping source");
                println!("\nERROR: {e}! Skipping...");
                report.outcomes.push(TransferOutcome {
                    source: source.clone(),
                    target: None,
                    status: TransferStatus::Skipped {
                        reason: e.to_string(),
                    },
                });
                continue;
            }

            let target = snapshot_dir.join(flatten_source_name(source));
            let command = self.transfer_command(source, &target, snapshot_dir);

            let code = match runner.run(&command, &mut log.writer()?) {
                Ok(code) => code,
                Err(SnapbakError::CommandSpawn {
                    command: rendered,
                    source: error,
                }) => {
                    // Same status a shell reports for a missing program
                    let line = format!("cannot execute {rendered}: {error}\n");
                    log.append(line.as_bytes())?;
                    127
                }
                Err(e) => return Err(e),
            };

            let status = if code == 0 {
                println!(">> Done!");
                TransferStatus::Transferred
            } else {
                tracing::warn!(source = %source.display(), code, "transfer failed");
                println!(
                    "\nERROR: transfer of {} failed with status {code}",
                    source.display()
                );
                if self.stop_on_error {
                    return Err(SnapbakError::CommandFailed {
                        command: command.display(),
                        code,
                    });
                }
                TransferStatus::Failed { code }
            };

            report.outcomes.push(TransferOutcome {
                source: source.clone(),
                target: Some(target),
                status,
            });
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_excludes;
    use crate::testing::RecordingRunner;
    use std::fs;
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        snapshot: PathBuf,
        a: PathBuf,
        b: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let snapshot = dir.path().join("20240101_000000_host");
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::create_dir_all(&snapshot).unwrap();
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        Fixture {
            _dir: dir,
            snapshot,
            a,
            b,
        }
    }

    #[test]
    fn test_transfer_command() {
        let excludes = default_excludes();
        let runner = TransferRunner::new("rsync", &excludes);
        let cmd = runner.transfer_command(
            Path::new("/home/a/docs"),
            Path::new("/backup/snap/_home_a_docs"),
            Path::new("/backup/snap"),
        );

        assert_eq!(
            cmd.display(),
            "rsync -avz --progress --exclude=*.tmp --exclude=tmp --exclude=lost+found \
             --exclude=*cache --exclude=*Trash /home/a/docs /backup/snap/_home_a_docs"
        );
        assert_eq!(cmd.current_dir, Some(PathBuf::from("/backup/snap")));
    }

    #[test]
    fn test_run_all_in_order() {
        let f = fixture();
        let log = SummaryLog::create(f.snapshot.join("summary.txt")).unwrap();
        let mut runner = RecordingRunner::new();
        let excludes = default_excludes();

        let report = TransferRunner::new("rsync", &excludes)
            .run_all(&mut runner, &[f.a.clone(), f.b.clone()], &f.snapshot, &log)
            .unwrap();

        assert_eq!(report.transferred(), 2);
        assert!(report.all_succeeded());
        assert_eq!(runner.commands.len(), 2);
        let targets: Vec<PathBuf> = runner
            .commands
            .iter()
            .map(|c| PathBuf::from(c.args.last().unwrap()))
            .collect();
        assert_eq!(
            targets,
            vec![
                f.snapshot.join(flatten_source_name(&f.a)),
                f.snapshot.join(flatten_source_name(&f.b)),
            ]
        );
    }

    #[test]
    fn test_missing_source_is_skipped() {
        let f = fixture();
        let log = SummaryLog::create(f.snapshot.join("summary.txt")).unwrap();
        let mut runner = RecordingRunner::new();
        let missing = f.a.with_file_name("missing");
        let excludes = default_excludes();

        let report = TransferRunner::new("rsync", &excludes)
            .run_all(&mut runner, &[missing.clone(), f.b.clone()], &f.snapshot, &log)
            .unwrap();

        assert_eq!(report.skipped(), 1);
        assert_eq!(report.transferred(), 1);
        assert_eq!(report.outcomes[0].source, missing);
        assert!(report.outcomes[0].target.is_none());
        // Only the existing source reached the transfer program
        assert_eq!(runner.commands.len(), 1);
    }

    #[test]
    fn test_failed_transfer_does_not_stop_the_rest() {
        let f = fixture();
        let log = SummaryLog::create(f.snapshot.join("summary.txt")).unwrap();
        let a_arg = f.a.display().to_string();
        let mut runner = RecordingRunner::new().fail_on(format!("{a_arg} "), 23);
        let excludes = default_excludes();

        let report = TransferRunner::new("rsync", &excludes)
            .run_all(&mut runner, &[f.a.clone(), f.b.clone()], &f.snapshot, &log)
            .unwrap();

        assert_eq!(report.outcomes[0].status, TransferStatus::Failed { code: 23 });
        assert_eq!(report.outcomes[1].status, TransferStatus::Transferred);
        assert!(!report.all_succeeded());

        // The summary holds the output of both invocations
        let summary = fs::read_to_string(log.path()).unwrap();
        assert!(summary.contains("exit 23"));
        assert!(summary.contains("exit 0"));
    }

    #[test]
    fn test_stop_on_error() {
        let f = fixture();
        let log = SummaryLog::create(f.snapshot.join("summary.txt")).unwrap();
        let a_arg = f.a.display().to_string();
        let mut runner = RecordingRunner::new().fail_on(format!("{a_arg} "), 12);
        let excludes = default_excludes();

        let err = TransferRunner::new("rsync", &excludes)
            .stop_on_error(true)
            .run_all(&mut runner, &[f.a.clone(), f.b.clone()], &f.snapshot, &log)
            .unwrap_err();

        assert_eq!(err.exit_code(), 12);
        assert_eq!(runner.commands.len(), 1);
    }

    #[test]
    fn test_summary_log_append_and_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summary.txt");
        let log = SummaryLog::create(&path).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);

        log.append(b"first\n").unwrap();
        log.append(b"second\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");

        // A second log at the same path is refused
        assert!(SummaryLog::create(&path).is_err());
    }

    #[test]
    fn test_summary_log_compress() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summary.txt");
        let log = SummaryLog::create(&path).unwrap();
        let mut runner = RecordingRunner::new();

        let compressed = log.compress(&mut runner, "gzip").unwrap();
        assert_eq!(compressed, dir.path().join("summary.txt.gz"));
        assert_eq!(
            runner.command_lines(),
            vec![format!("gzip -f {}", path.display())]
        );
    }

    #[test]
    fn test_summary_log_compress_other_compressor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summary.txt");
        let log = SummaryLog::create(&path).unwrap();
        let mut runner = RecordingRunner::new();

        let compressed = log.compress(&mut runner, "/usr/bin/xz").unwrap();
        assert_eq!(compressed, dir.path().join("summary.txt.xz"));
    }

    #[test]
    fn test_summary_log_compress_unknown_compressor() {
        let dir = tempdir().unwrap();
        let log = SummaryLog::create(dir.path().join("summary.txt")).unwrap();
        let mut runner = RecordingRunner::new();

        let err = log.compress(&mut runner, "zstd").unwrap_err();
        assert!(matches!(err, SnapbakError::InvalidConfigValue { .. }));
        assert!(runner.commands.is_empty());
    }

    #[test]
    fn test_compressed_extension() {
        assert_eq!(compressed_extension("gzip"), Some("gz"));
        assert_eq!(compressed_extension("/bin/bzip2"), Some("bz2"));
        assert_eq!(compressed_extension("xz"), Some("xz"));
        assert_eq!(compressed_extension("zstd"), None);
        assert_eq!(compressed_extension(""), None);
    }

    #[test]
    fn test_summary_log_compress_failure() {
        let dir = tempdir().unwrap();
        let log = SummaryLog::create(dir.path().join("summary.txt")).unwrap();
        let mut runner = RecordingRunner::new().fail_on("gzip", 2);

        let err = log.compress(&mut runner, "gzip").unwrap_err();
        assert!(matches!(err, SnapbakError::CommandFailed { code: 2, .. }));
        assert_eq!(err.exit_code(), 2);
    }
}
