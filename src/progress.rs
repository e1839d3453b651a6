#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

/// Spinner shown while the size of a source directory is being estimated.
///
/// Inactive on non-interactive output, in CI, and when the `progress`
/// feature is off.
pub struct ScanProgress {
    files_seen: u64,
    #[cfg(feature = "progress")]
    spinner: Option<ProgressBar>,
}

impl ScanProgress {
    /// A spinner that never draws
    pub fn hidden() -> Self {
        Self {
            files_seen: 0,
            #[cfg(feature = "progress")]
            spinner: None,
        }
    }

    /// Start a spinner for `root` if stdout is an interactive terminal
    pub fn start(root: &Path) -> Self {
        #[cfg(feature = "progress")]
        {
            if is_interactive() && !is_ci_environment() {
                let spinner = ProgressBar::new_spinner();
                if let Ok(style) =
                    ProgressStyle::default_spinner().template("{spinner:.green} Scanning {msg}")
                {
                    spinner.set_style(style);
                }
                spinner.set_message(root.display().to_string());
                return Self {
                    files_seen: 0,
                    spinner: Some(spinner),
                };
            }
        }
        let _ = root;
        Self::hidden()
    }

    pub fn file_seen(&mut self, _path: &Path) {
        self.files_seen += 1;

        #[cfg(feature = "progress")]
        if let Some(ref spinner) = self.spinner {
            if self.files_seen % 256 == 0 {
                spinner.set_message(format!("{} files found", self.files_seen));
            }
            spinner.tick();
        }
    }

    pub fn files_seen(&self) -> u64 {
        self.files_seen
    }

    pub fn finish(&mut self) {
        #[cfg(feature = "progress")]
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

impl Drop for ScanProgress {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(feature = "progress")]
fn is_interactive() -> bool {
    console::Term::stdout().is_term()
}

/// Check if we're running in a CI environment
#[cfg(feature = "progress")]
fn is_ci_environment() -> bool {
    std::env::var("CI").is_ok()
        || std::env::var("GITHUB_ACTIONS").is_ok()
        || std::env::var("GITLAB_CI").is_ok()
        || std::env::var("JENKINS_URL").is_ok()
}
