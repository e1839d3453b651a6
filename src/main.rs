use clap::{Arg, ArgAction, Command};
use snapbak::config::{create_sample_config, dump_config, load_settings, resolve_config_path};
use snapbak::orchestrator::{BackupOrchestrator, RunOutcome};
use snapbak::prompt::TerminalPrompt;
use snapbak::prune::{PruneOutcome, RetentionPruner};
use snapbak::{logging, SnapbakError, SystemRunner};
use std::path::PathBuf;
use std::process;

fn main() {
    let result = run();
    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(error) => {
            eprintln!("Error: {error}");

            // Show suggestions if available
            let suggestions = error.suggestions();
            if !suggestions.is_empty() {
                eprintln!("\nSuggestions:");
                for suggestion in suggestions {
                    eprintln!("  - {suggestion}");
                }
            }

            process::exit(error.exit_code());
        }
    }
}

fn run() -> Result<i32, SnapbakError> {
    let matches = Command::new("snapbak")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Timestamped directory snapshots with count-based retention")
        .long_about(
            "snapbak copies the configured directories into a new\n\
             <destination>/<YYYYMMDD_HHMMSS>_<host> snapshot and then offers\n\
             to delete all but the newest snapshots.",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Configuration file to use")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("dump-config")
                .long("dump-config")
                .help("Display current configuration settings and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("sample-config")
                .long("sample-config")
                .help("Print an annotated configuration template and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Show debug diagnostics on stderr")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    if matches.get_flag("sample-config") {
        print!("{}", create_sample_config());
        return Ok(0);
    }

    let verbose = matches.get_flag("verbose");
    logging::init(logging::default_level(verbose))?;

    let explicit = matches.get_one::<PathBuf>("config");
    let config_path = resolve_config_path(explicit.map(PathBuf::as_path))?;
    let settings = load_settings(&config_path)?;
    tracing::debug!(config = %config_path.display(), "configuration loaded");

    if matches.get_flag("dump-config") {
        dump_config(&settings, &config_path);
        return Ok(0);
    }

    setup_signal_handler();

    println!("=================================================");
    println!("                snapbak backup run");
    println!("=================================================");

    let mut runner = SystemRunner::default();
    let mut prompt = TerminalPrompt::stdio();

    let outcome = BackupOrchestrator::new(&settings, &mut runner, &mut prompt).run()?;
    if let RunOutcome::Declined = outcome {
        println!("Backup cancelled.");
        return Ok(0);
    }

    // Runs after the new snapshot exists, so it is part of the population
    if let Some(policy) = settings.retention {
        let pruner = RetentionPruner::new(&settings.destination, policy);
        if let PruneOutcome::Completed(report) = pruner.prune(&mut prompt)? {
            tracing::info!(
                deleted = report.deleted().len(),
                declined = report.declined().len(),
                kept = report.kept().len(),
                "prune finished"
            );
        }
    }

    println!("=================================================");
    println!("                snapbak finished");
    println!("=================================================");

    Ok(0)
}

fn setup_signal_handler() {
    // No rollback: a partial snapshot stays on disk
    if let Err(e) = ctrlc::set_handler(|| {
        eprintln!("\nInterrupted by user.");
        process::exit(SnapbakError::Interrupted.exit_code());
    }) {
        tracing::warn!(error = %e, "cannot install Ctrl-C handler");
    }
}
