use crate::error::SnapbakError;
use crate::prune::RetentionPolicy;
use crate::transfer::compressed_extension;
use crate::Result;
use configparser::ini::Ini;
use std::path::{Path, PathBuf};

pub const DEFAULT_TRANSFER_PROGRAM: &str = "rsync";
pub const DEFAULT_COMPRESSOR: &str = "gzip";

/// Transient and cache paths left out of every transfer unless `[Transfer] Exclude` says otherwise
pub const DEFAULT_EXCLUDES: &[&str] = &["*.tmp", "tmp", "lost+found", "*cache", "*Trash"];

const LOCAL_CONFIG_NAME: &str = "snapbak.ini";

/// Validated, immutable settings for one invocation.
///
/// Built once from the configuration file and handed by reference to the
/// orchestrator and the pruner.
#[derive(Debug, Clone)]
pub struct Settings {
    pub destination: PathBuf,
    pub sources: Vec<PathBuf>,
    pub backup_package_list: bool,
    pub backup_firefox_profile: bool,
    pub gzip_summary: bool,
    /// `None` when `[General] Prune` is off
    pub retention: Option<RetentionPolicy>,
    pub transfer_program: String,
    pub excludes: Vec<String>,
    pub stop_on_transfer_error: bool,
    pub compressor: String,
}

impl Settings {
    /// Settings with the optional features off, mostly useful as a base in tests
    pub fn new(destination: impl Into<PathBuf>, sources: Vec<PathBuf>) -> Self {
        Settings {
            destination: destination.into(),
            sources,
            backup_package_list: false,
            backup_firefox_profile: false,
            gzip_summary: false,
            retention: None,
            transfer_program: DEFAULT_TRANSFER_PROGRAM.to_string(),
            excludes: default_excludes(),
            stop_on_transfer_error: false,
            compressor: DEFAULT_COMPRESSOR.to_string(),
        }
    }

    /// Parse settings from INI text
    pub fn from_ini_str(content: &str) -> Result<Settings> {
        let mut conf = Ini::new();
        conf.read(content.to_string())
            .map_err(|e| SnapbakError::config(format!("Failed to parse config: {e}")))?;
        parse_settings(&conf)
    }
}

pub fn default_excludes() -> Vec<String> {
    DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect()
}

/// Load settings from the given INI file
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Err(SnapbakError::config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let mut conf = Ini::new();
    conf.load(path)
        .map_err(|e| SnapbakError::config(format!("Failed to parse config file: {e}")))?;

    parse_settings(&conf)
}

fn parse_settings(conf: &Ini) -> Result<Settings> {
    let destination = PathBuf::from(required(conf, "Paths", "DestinationDir")?);
    let sources: Vec<PathBuf> = required(conf, "Paths", "DirectoriesToBackup")?
        .split_whitespace()
        .map(PathBuf::from)
        .collect();

    let backup_package_list = required_bool(conf, "General", "BackupUbuntuListOfPackages")?;
    let backup_firefox_profile = required_bool(conf, "General", "BackupFirefoxProfile")?;
    let prune = required_bool(conf, "General", "Prune")?;
    let gzip_summary = required_bool(conf, "General", "GZipSummary")?;

    let retention = if prune {
        let value = required(conf, "Pruning", "NumberOfBackupsToKeep")?;
        let keep_count = value
            .parse::<usize>()
            .map_err(|_| SnapbakError::invalid_value("Pruning", "NumberOfBackupsToKeep", value))?;
        Some(RetentionPolicy { keep_count })
    } else {
        None
    };

    let mut settings = Settings::new(destination, sources);
    settings.backup_package_list = backup_package_list;
    settings.backup_firefox_profile = backup_firefox_profile;
    settings.gzip_summary = gzip_summary;
    settings.retention = retention;

    if let Some(value) = optional(conf, "Transfer", "Program") {
        settings.transfer_program = value;
    }
    if let Some(value) = conf.get("Transfer", "Exclude") {
        // An explicitly empty list disables exclusions
        settings.excludes = value.split_whitespace().map(str::to_string).collect();
    }
    if let Some(value) = optional(conf, "Transfer", "StopOnError") {
        settings.stop_on_transfer_error = parse_bool(&value)
            .ok_or_else(|| SnapbakError::invalid_value("Transfer", "StopOnError", value))?;
    }
    if let Some(value) = optional(conf, "General", "Compressor") {
        if compressed_extension(&value).is_none() {
            return Err(SnapbakError::invalid_value("General", "Compressor", value));
        }
        settings.compressor = value;
    }

    Ok(settings)
}

fn optional(conf: &Ini, section: &str, key: &str) -> Option<String> {
    conf.get(section, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(conf: &Ini, section: &str, key: &str) -> Result<String> {
    optional(conf, section, key).ok_or_else(|| SnapbakError::missing_key(section, key))
}

fn required_bool(conf: &Ini, section: &str, key: &str) -> Result<bool> {
    let value = required(conf, section, key)?;
    parse_bool(&value).ok_or_else(|| SnapbakError::invalid_value(section, key, value))
}

/// Parse a boolean value from INI string
fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

/// Pick the configuration file: an explicit path wins, then `./snapbak.ini`,
/// then the per-user config directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let local = PathBuf::from(LOCAL_CONFIG_NAME);
    if local.exists() {
        return Ok(local);
    }

    user_config_path()
}

/// Get the per-user configuration file path
fn user_config_path() -> Result<PathBuf> {
    if let Some(config_dir) = std::env::var_os("XDG_CONFIG_HOME") {
        Ok(PathBuf::from(config_dir).join("snapbak").join("config.ini"))
    } else if let Some(home) = std::env::var_os("HOME") {
        Ok(PathBuf::from(home)
            .join(".config")
            .join("snapbak")
            .join("config.ini"))
    } else {
        Err(SnapbakError::config("Could not determine config directory"))
    }
}

/// Create a sample configuration file
pub fn create_sample_config() -> String {
    r#"[Paths]
# Root directory for all snapshots
DestinationDir = /media/backup

# Whitespace-separated list of directories, backed up in this order
DirectoriesToBackup = /home/user/Documents /home/user/Projects

[General]
# Export the dpkg selection list, apt sources and keys
BackupUbuntuListOfPackages = false

# Copy the default Firefox profile
BackupFirefoxProfile = false

# Remove old snapshots after the run
Prune = true

# Compress the per-run summary log
GZipSummary = true

[Pruning]
# Number of newest snapshots to keep
NumberOfBackupsToKeep = 3

[Transfer]
# Transfer program and exclusion patterns
Program = rsync
Exclude = *.tmp tmp lost+found *cache *Trash
StopOnError = false
"#
    .to_string()
}

/// Display the current configuration in a user-friendly format
pub fn dump_config(settings: &Settings, config_path: &Path) {
    println!("snapbak Configuration");
    println!("=====================");
    println!();
    println!("Config file: {}", config_path.display());
    println!();

    println!("Current Settings:");
    println!("----------------");
    println!("DestinationDir             = {}", settings.destination.display());
    let sources: Vec<String> = settings
        .sources
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    println!("DirectoriesToBackup        = {}", sources.join(" "));
    println!(
        "BackupUbuntuListOfPackages = {}",
        settings.backup_package_list
    );
    println!(
        "BackupFirefoxProfile       = {}",
        settings.backup_firefox_profile
    );
    println!("Prune                      = {}", settings.retention.is_some());
    println!("GZipSummary                = {}", settings.gzip_summary);
    match &settings.retention {
        Some(policy) => println!("NumberOfBackupsToKeep      = {}", policy.keep_count),
        None => println!("NumberOfBackupsToKeep      = (pruning disabled)"),
    }
    println!("Transfer program           = {}", settings.transfer_program);
    println!("Exclude                    = {}", settings.excludes.join(" "));
    println!(
        "StopOnError                = {}",
        settings.stop_on_transfer_error
    );
    println!("Compressor                 = {}", settings.compressor);
}
