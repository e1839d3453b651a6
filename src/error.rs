use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapbakError {
    #[error("Missing: {path} directory")]
    DestinationMissing { path: PathBuf },

    #[error("{path} is not a directory")]
    DestinationNotDirectory { path: PathBuf },

    #[error("Cannot read {path} directory")]
    DestinationNotReadable { path: PathBuf },

    #[error("No write permissions for {path} directory")]
    DestinationNotWritable { path: PathBuf },

    #[error("Missing {path} directory")]
    SourceMissing { path: PathBuf },

    #[error("{path} is not a directory")]
    SourceNotDirectory { path: PathBuf },

    #[error("Cannot read {path} directory")]
    SourceNotReadable { path: PathBuf },

    #[error("Snapshot already exists: {path}")]
    SnapshotExists { path: PathBuf },

    #[error("Command `{command}` exited with status {code}")]
    CommandFailed { command: String, code: i32 },

    #[error("Cannot execute `{command}`: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No browser profile matching *.default under {path}")]
    ProfileNotFound { path: PathBuf },

    #[error("Cannot delete backup directory {path}: {source}")]
    PruneFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing configuration key [{section}] {key}")]
    MissingConfigKey { section: String, key: String },

    #[error("Invalid value for [{section}] {key}: {value}")]
    InvalidConfigValue {
        section: String,
        key: String,
        value: String,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation interrupted by user")]
    Interrupted,
}

impl SnapbakError {
    /// Create a configuration error with a custom message
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn missing_key(section: &str, key: &str) -> Self {
        Self::MissingConfigKey {
            section: section.to_string(),
            key: key.to_string(),
        }
    }

    pub fn invalid_value(section: &str, key: &str, value: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.into(),
        }
    }

    /// Per-source problems: the run logs them and moves on to the next directory
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SnapbakError::SourceMissing { .. }
                | SnapbakError::SourceNotDirectory { .. }
                | SnapbakError::SourceNotReadable { .. }
        )
    }

    /// Get the exit code for this error.
    ///
    /// A failed external command hands back its own status so callers see
    /// what the tool reported.
    pub fn exit_code(&self) -> i32 {
        match self {
            SnapbakError::CommandFailed { code, .. } if *code != 0 => *code,
            SnapbakError::Interrupted => 130,
            SnapbakError::Config { .. }
            | SnapbakError::MissingConfigKey { .. }
            | SnapbakError::InvalidConfigValue { .. } => 2,
            _ => 1,
        }
    }

    /// Provide helpful suggestions for resolving the error
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            SnapbakError::DestinationMissing { .. } => vec![
                "Create the destination directory or mount the backup disk".to_string(),
                "Check DestinationDir in the [Paths] section".to_string(),
            ],
            SnapbakError::DestinationNotReadable { .. }
            | SnapbakError::DestinationNotWritable { .. } => vec![
                "Check directory permissions".to_string(),
                "Run with appropriate privileges".to_string(),
            ],
            SnapbakError::SnapshotExists { .. } => vec![
                "Another run started within the same second; wait and retry".to_string(),
            ],
            SnapbakError::MissingConfigKey { .. } => vec![
                "Add the key to the configuration file".to_string(),
                "Use 'snapbak --dump-config' to see the resolved settings".to_string(),
            ],
            SnapbakError::CommandSpawn { .. } => {
                vec!["Make sure the program is installed and on PATH".to_string()]
            }
            SnapbakError::PruneFailed { .. } => vec![
                "You must have permissions to delete the backup files".to_string(),
                "Remaining old backups were left untouched".to_string(),
            ],
            _ => vec![],
        }
    }
}
