pub mod auxiliary;
pub mod command;
pub mod config;
pub mod error;
pub mod logging;
pub mod naming;
pub mod orchestrator;
pub mod progress;
pub mod prompt;
pub mod prune;
pub mod testing;
pub mod transfer;
pub mod utils;

pub use auxiliary::AuxiliaryCapture;
pub use command::{CommandRunner, ExternalCommand, SystemRunner};
pub use config::{create_sample_config, dump_config, load_settings, resolve_config_path, Settings};
pub use error::SnapbakError;
pub use naming::{create_snapshot_dir, snapshot_name};
pub use orchestrator::{BackupOrchestrator, BackupRun, RunOutcome};
pub use prompt::{Confirm, TerminalPrompt};
pub use prune::{PruneOutcome, PruneReport, RetentionPolicy, RetentionPruner, SnapshotDirectory};
pub use transfer::{SummaryLog, TransferReport, TransferRunner};
pub use utils::{estimate_size_mb, estimate_total_mb};

/// Main library result type
pub type Result<T> = std::result::Result<T, SnapbakError>;
