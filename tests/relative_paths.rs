//! Relative `DestinationDir` and `DirectoriesToBackup` entries resolve against
//! the directory snapbak was started from, not the snapshot the transfer
//! program runs in.

use snapbak::auxiliary::{AuxiliaryCapture, PACKAGES_DIR};
use snapbak::config::Settings;
use snapbak::naming::flatten_source_name;
use snapbak::orchestrator::{BackupOrchestrator, BackupRun, RunOutcome};
use snapbak::testing::{RecordingRunner, ScriptedConfirm};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::tempdir;

// The working directory is process-wide
static CWD_LOCK: Mutex<()> = Mutex::new(());

struct WorkingDir {
    original: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl WorkingDir {
    fn enter(dir: &Path) -> Self {
        let lock = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let original = env::current_dir().unwrap();
        env::set_current_dir(dir).unwrap();
        Self {
            original,
            _lock: lock,
        }
    }
}

impl Drop for WorkingDir {
    fn drop(&mut self) {
        let _ = env::set_current_dir(&self.original);
    }
}

fn completed(outcome: RunOutcome) -> BackupRun {
    match outcome {
        RunOutcome::Completed(run) => run,
        RunOutcome::Declined => panic!("Expected a completed run"),
    }
}

#[test]
fn relative_destination_resolves_from_start_directory() {
    let root = tempdir().unwrap();
    let source = root.path().join("data");
    fs::create_dir_all(root.path().join("backups")).unwrap();
    fs::create_dir_all(&source).unwrap();
    let apt_dir = root.path().join("apt");
    fs::create_dir_all(&apt_dir).unwrap();
    fs::write(apt_dir.join("sources.list"), "deb http://archive main").unwrap();

    let _cwd = WorkingDir::enter(root.path());
    let mut settings = Settings::new("backups", vec![source.clone()]);
    settings.backup_package_list = true;
    let mut runner = RecordingRunner::new();
    let mut confirm = ScriptedConfirm::always_yes();

    let run = completed(
        BackupOrchestrator::new(&settings, &mut runner, &mut confirm)
            .with_host("h")
            .with_auxiliary(AuxiliaryCapture {
                apt_dir,
                firefox_root: None,
            })
            .run()
            .unwrap(),
    );

    let expected = env::current_dir()
        .unwrap()
        .join("backups")
        .join(&run.snapshot_name);
    assert_eq!(run.snapshot_dir, expected);

    // Every path handed to a program is absolute
    let transfer_target = PathBuf::from(runner.commands[0].args.last().unwrap());
    assert_eq!(transfer_target, expected.join(flatten_source_name(&source)));
    for command in &runner.commands {
        if let Some(ref file) = command.stdout_file {
            assert!(file.is_absolute(), "{}", command.display());
        }
    }
    let packages = expected.join(PACKAGES_DIR);
    assert!(packages.join("Package.list").is_file());
    assert!(packages.join("Repo.keys").is_file());
    assert!(!expected.join("backups").exists());
}

#[test]
fn relative_source_resolves_from_start_directory() {
    let root = tempdir().unwrap();
    let destination = root.path().join("backups");
    fs::create_dir_all(&destination).unwrap();
    fs::create_dir_all(root.path().join("docs")).unwrap();

    let _cwd = WorkingDir::enter(root.path());
    let settings = Settings::new(&destination, vec![PathBuf::from("docs")]);
    let mut runner = RecordingRunner::new();
    let mut confirm = ScriptedConfirm::always_yes();

    let run = completed(
        BackupOrchestrator::new(&settings, &mut runner, &mut confirm)
            .with_host("h")
            .run()
            .unwrap(),
    );

    let absolute_source = env::current_dir().unwrap().join("docs");
    assert_eq!(run.transfers.transferred(), 1);
    assert_eq!(run.sources, vec![absolute_source.clone()]);

    let args: Vec<PathBuf> = runner.commands[0].args.iter().map(PathBuf::from).collect();
    let n = args.len();
    assert_eq!(args[n - 2], absolute_source);
    assert_eq!(
        args[n - 1],
        run.snapshot_dir.join(flatten_source_name(&absolute_source))
    );
}

/// A stand-in transfer program that only succeeds when the source is
/// visible from its own working directory, as rsync requires
#[cfg(unix)]
#[test]
fn relative_source_with_real_subprocess() {
    use snapbak::command::SystemRunner;
    use snapbak::transfer::TransferStatus;
    use std::os::unix::fs::PermissionsExt;

    let root = tempdir().unwrap();
    let destination = root.path().join("backups");
    fs::create_dir_all(&destination).unwrap();
    fs::create_dir_all(root.path().join("docs")).unwrap();

    let program = root.path().join("fake-rsync");
    fs::write(
        &program,
        "#!/bin/sh\n\
         for arg in \"$@\"; do src=\"$dst\"; dst=\"$arg\"; done\n\
         [ -d \"$src\" ] || { echo \"cwd=$(pwd) missing $src\"; exit 23; }\n\
         mkdir -p \"$dst\" && echo \"copied $src\"\n",
    )
    .unwrap();
    fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();

    let _cwd = WorkingDir::enter(root.path());
    let mut settings = Settings::new("backups", vec![PathBuf::from("docs")]);
    settings.transfer_program = program.display().to_string();
    let mut runner = SystemRunner { echo: false };
    let mut confirm = ScriptedConfirm::always_yes();

    let run = completed(
        BackupOrchestrator::new(&settings, &mut runner, &mut confirm)
            .with_host("h")
            .run()
            .unwrap(),
    );

    assert_eq!(run.transfers.outcomes[0].status, TransferStatus::Transferred);
    let absolute_source = env::current_dir().unwrap().join("docs");
    assert!(run
        .snapshot_dir
        .join(flatten_source_name(&absolute_source))
        .is_dir());
    let summary = fs::read_to_string(&run.summary_log).unwrap();
    assert!(summary.contains("copied "));
    assert!(!summary.contains("missing"));
}
