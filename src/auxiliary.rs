//! One-shot captures bundled into a snapshot next to the transferred
//! directories. Unlike transfers, any failing step aborts the whole run.

use crate::command::{run_checked, CommandRunner, ExternalCommand};
use crate::error::SnapbakError;
use crate::Result;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const PACKAGES_DIR: &str = "UbuntuListOfInstalledPackages";
pub const FIREFOX_DIR: &str = "FirefoxProfile";

/// Where the captured system state lives on this machine
#[derive(Debug, Clone)]
pub struct AuxiliaryCapture {
    pub apt_dir: PathBuf,
    /// `None` when the home directory is unknown
    pub firefox_root: Option<PathBuf>,
}

impl AuxiliaryCapture {
    pub fn system() -> Self {
        Self {
            apt_dir: PathBuf::from("/etc/apt"),
            firefox_root: std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".mozilla").join("firefox")),
        }
    }

    /// Export the dpkg selection list, apt sources and repository keys
    pub fn capture_packages(
        &self,
        runner: &mut dyn CommandRunner,
        snapshot_dir: &Path,
    ) -> Result<PathBuf> {
        println!(">> Creating backup of the list of installed packages, keys, repos...");
        let dir = snapshot_dir.join(PACKAGES_DIR);
        fs::create_dir(&dir)?;

        let selections = ExternalCommand::new("dpkg")
            .arg("--get-selections")
            .current_dir(snapshot_dir)
            .stdout_to(dir.join("Package.list"));
        run_checked(runner, &selections, &mut io::sink()).map_err(report)?;

        let sources = ExternalCommand::new("sudo")
            .args(["rsync", "-avz"])
            .args(self.apt_sources()?)
            .arg(&dir)
            .current_dir(snapshot_dir);
        run_checked(runner, &sources, &mut io::sink()).map_err(report)?;

        let keys = ExternalCommand::new("sudo")
            .args(["apt-key", "exportall"])
            .current_dir(snapshot_dir)
            .stdout_to(dir.join("Repo.keys"));
        run_checked(runner, &keys, &mut io::sink()).map_err(report)?;

        println!(">> Done!");
        Ok(dir)
    }

    /// Copy every `*.default` browser profile
    pub fn capture_firefox_profile(
        &self,
        runner: &mut dyn CommandRunner,
        snapshot_dir: &Path,
    ) -> Result<PathBuf> {
        println!(">> Creating backup of the Firefox profile...");
        let root = self
            .firefox_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("~/.mozilla/firefox"));

        let profiles = matching_entries(&root, |name| name.ends_with(".default"));
        if profiles.is_empty() {
            return Err(report(SnapbakError::ProfileNotFound { path: root }));
        }

        let dir = snapshot_dir.join(FIREFOX_DIR);
        fs::create_dir(&dir)?;

        let copy = ExternalCommand::new("rsync")
            .arg("-avz")
            .args(&profiles)
            .arg(&dir)
            .current_dir(snapshot_dir);
        run_checked(runner, &copy, &mut io::sink()).map_err(report)?;

        println!(">> Done!");
        Ok(dir)
    }

    /// `sources.list*` under the apt directory; the literal pattern when
    /// nothing matches, so the copy fails the way an unmatched glob does
    fn apt_sources(&self) -> Result<Vec<PathBuf>> {
        let found = matching_entries(&self.apt_dir, |name| name.starts_with("sources.list"));
        if found.is_empty() {
            return Ok(vec![self.apt_dir.join("sources.list*")]);
        }
        Ok(found)
    }
}

fn report(error: SnapbakError) -> SnapbakError {
    println!("\nERROR: {error}");
    tracing::error!(error = %error, "auxiliary capture failed");
    error
}

/// Entries of `dir` whose name matches, sorted by name; unreadable directories yield nothing
fn matching_entries(dir: &Path, matches: impl Fn(&str) -> bool) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_str().map_or(false, &matches))
        .map(|entry| entry.path())
        .collect();
    found.sort();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRunner;
    use tempfile::tempdir;

    fn capture_in(root: &Path) -> AuxiliaryCapture {
        let apt_dir = root.join("apt");
        fs::create_dir_all(apt_dir.join("sources.list.d")).unwrap();
        fs::write(apt_dir.join("sources.list"), "deb http://archive main").unwrap();
        fs::write(apt_dir.join("trusted.gpg"), "key").unwrap();

        let firefox_root = root.join("firefox");
        fs::create_dir_all(firefox_root.join("abcd1234.default")).unwrap();
        fs::create_dir_all(firefox_root.join("zzzz.default-release")).unwrap();

        AuxiliaryCapture {
            apt_dir,
            firefox_root: Some(firefox_root),
        }
    }

    #[test]
    fn test_capture_packages() {
        let dir = tempdir().unwrap();
        let snapshot = dir.path().join("snap");
        fs::create_dir(&snapshot).unwrap();
        let capture = capture_in(dir.path());
        let mut runner = RecordingRunner::new();

        let out = capture.capture_packages(&mut runner, &snapshot).unwrap();

        assert_eq!(out, snapshot.join(PACKAGES_DIR));
        assert!(out.join("Package.list").exists());
        assert!(out.join("Repo.keys").exists());

        let lines = runner.command_lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("dpkg --get-selections > "));
        assert_eq!(
            lines[1],
            format!(
                "sudo rsync -avz {} {} {}",
                capture.apt_dir.join("sources.list").display(),
                capture.apt_dir.join("sources.list.d").display(),
                out.display()
            )
        );
        assert!(lines[2].starts_with("sudo apt-key exportall > "));
    }

    #[test]
    fn test_capture_packages_aborts_on_failure() {
        let dir = tempdir().unwrap();
        let snapshot = dir.path().join("snap");
        fs::create_dir(&snapshot).unwrap();
        let capture = capture_in(dir.path());
        let mut runner = RecordingRunner::new().fail_on("dpkg", 2);

        let err = capture.capture_packages(&mut runner, &snapshot).unwrap_err();

        assert_eq!(err.exit_code(), 2);
        // Nothing after the failing step ran
        assert_eq!(runner.commands.len(), 1);
    }

    #[test]
    fn test_capture_firefox_profile() {
        let dir = tempdir().unwrap();
        let snapshot = dir.path().join("snap");
        fs::create_dir(&snapshot).unwrap();
        let capture = capture_in(dir.path());
        let mut runner = RecordingRunner::new();

        let out = capture
            .capture_firefox_profile(&mut runner, &snapshot)
            .unwrap();

        assert_eq!(out, snapshot.join(FIREFOX_DIR));
        let root = capture.firefox_root.unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![format!(
                "rsync -avz {} {}",
                root.join("abcd1234.default").display(),
                out.display()
            )]
        );
    }

    #[test]
    fn test_capture_firefox_profile_missing() {
        let dir = tempdir().unwrap();
        let capture = AuxiliaryCapture {
            apt_dir: dir.path().join("apt"),
            firefox_root: Some(dir.path().join("no-firefox")),
        };
        let mut runner = RecordingRunner::new();

        let err = capture
            .capture_firefox_profile(&mut runner, dir.path())
            .unwrap_err();
        assert!(matches!(err, SnapbakError::ProfileNotFound { .. }));
        assert!(runner.commands.is_empty());
        assert!(!dir.path().join(FIREFOX_DIR).exists());
    }

    #[test]
    fn test_apt_sources_fallback_pattern() {
        let dir = tempdir().unwrap();
        let capture = AuxiliaryCapture {
            apt_dir: dir.path().to_path_buf(),
            firefox_root: None,
        };
        assert_eq!(
            capture.apt_sources().unwrap(),
            vec![dir.path().join("sources.list*")]
        );
    }
}
