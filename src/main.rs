//! snapback - entry point
//!
//! Exit status 0 once the run's snapshot exists (partial transfer and prune
//! failures included), 1 on any fatal error.

use std::process::ExitCode;

use tracing::{error, warn};

use snapback::cli::Cli;
use snapback::engine::BtrfsEngine;
use snapback::logging::{self, RunLog, FATAL_TARGET};
use snapback::process_guard;
use snapback::profile::ProfileResolver;
use snapback::run::{self, Collaborators, RunController};
use snapback::sanity::HostProbe;
use snapback::transfer::RsyncTransfer;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let run_log = RunLog::default();
    if let Err(e) = logging::init_logging(cli.verbose, run_log.clone()) {
        eprintln!("ERROR: cannot initialise logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to install signal handlers: {}", e);
    }

    let epoch = run::current_epoch();
    let engine = BtrfsEngine::new();
    let transfer = RsyncTransfer;
    let probe = HostProbe;
    let backends = Collaborators { engine: &engine, transfer: &transfer, probe: &probe };

    let resolver = ProfileResolver::new(cli.base_dir.clone());
    let controller = RunController::new(resolver, backends).with_run_log(run_log);

    let outcome = controller.run(&cli.profile, epoch);
    if let Err(e) = &outcome {
        error!(target: FATAL_TARGET, "{}", e);
        eprintln!("ERROR: {}", e);
    }
    ExitCode::from(run::exit_status(&outcome))
}
