//! Command-line entry point. Loads the configuration, builds the probe for its cloud provider,
//! and runs the submission. Failures print `Error: <message>` to stderr and exit with the
//! code for the kind of failure.

use std::time::Duration;

use blastlane_core::{Orchestrator, SubmitError, SubmitResult};
use clap::Parser;
use error_stack::Report;
use tracing::{event, Level};
use tracing_subscriber::EnvFilter;

mod args;
mod config_file;
mod launcher;
mod provider;

use args::{Cli, Command, DeleteArgs, Overrides, SubmitArgs};
use launcher::HandoffLauncher;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli.command).await {
        event!(Level::DEBUG, error = ?e, "command failed");
        let error = e.current_context();
        eprintln!("Error: {error}");
        std::process::exit(error.code());
    }
}

/// Logs go to stderr so that stdout only carries the submission.
fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Command) -> SubmitResult<()> {
    match command {
        Command::Submit(args) => submit(args).await,
        Command::Delete(args) => delete(args).await,
    }
}

async fn submit(args: SubmitArgs) -> SubmitResult<()> {
    let config = config_file::load_config(&args.cfg, &args.overrides).await?;
    let probe = provider::probe_for(&config).await?;
    let launcher = HandoffLauncher::new(args.handoff);

    let mut orchestrator = Orchestrator::new(config, probe.as_ref(), &launcher);
    let submission = match args.timeout {
        Some(secs) => {
            let limit = Duration::from_secs(secs);
            match tokio::time::timeout(limit, orchestrator.submit()).await {
                Ok(result) => result?,
                Err(_) => {
                    orchestrator.abort().await;
                    return Err(Report::new(SubmitError::submission(format!(
                        "Submission did not finish within {secs} seconds"
                    ))));
                }
            }
        }
        None => orchestrator.submit().await?,
    };

    event!(
        Level::INFO,
        cluster = %submission.cluster_name,
        database = %submission.database.name,
        queries = submission.queries.len(),
        "submitted"
    );
    Ok(())
}

async fn delete(args: DeleteArgs) -> SubmitResult<()> {
    let config = config_file::load_config(&args.cfg, &Overrides::default()).await?;
    let probe = provider::probe_for(&config).await?;

    probe.delete_cluster_with_cleanup(&config).await?;
    event!(Level::INFO, cluster = %config.cluster_name(), "deleted cluster");
    Ok(())
}
