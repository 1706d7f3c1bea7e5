use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[clap(version, about)]
pub struct Cli {
    /// Log more detail. Pass twice for trace output.
    #[clap(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check the configuration, cluster, database, and queries, then hand off the search.
    Submit(SubmitArgs),
    /// Delete the configured cluster and everything created for it.
    Delete(DeleteArgs),
}

#[derive(Debug, Args)]
pub struct SubmitArgs {
    /// The configuration file
    #[clap(long)]
    pub cfg: PathBuf,

    #[clap(flatten)]
    pub overrides: Overrides,

    /// Write the submission to this file instead of stdout.
    #[clap(long)]
    pub handoff: Option<PathBuf>,

    /// Give up after this many seconds, cleaning up any cluster that was involved.
    #[clap(long)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// The configuration file
    #[clap(long)]
    pub cfg: PathBuf,
}

/// Values that replace the ones in the configuration file.
#[derive(Debug, Default, Clone, Args)]
pub struct Overrides {
    /// Where to write results
    #[clap(long)]
    pub results: Option<String>,

    /// The BLAST program to run
    #[clap(long)]
    pub program: Option<String>,

    /// The BLAST database to search
    #[clap(long)]
    pub db: Option<String>,

    /// Query files, or a single list-file
    #[clap(long, num_args = 1..)]
    pub queries: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn submit_overrides() {
        let cli = Cli::parse_from([
            "blastlane",
            "-v",
            "submit",
            "--cfg",
            "job.toml",
            "--db",
            "nt",
            "--queries",
            "a.fa",
            "s3://bucket/b.fa",
        ]);

        assert_eq!(cli.verbose, 1);
        let Command::Submit(args) = cli.command else {
            panic!("expected submit");
        };
        assert_eq!(args.cfg, PathBuf::from("job.toml"));
        assert_eq!(args.overrides.db.as_deref(), Some("nt"));
        assert_eq!(args.overrides.queries, vec!["a.fa", "s3://bucket/b.fa"]);
        assert!(args.overrides.program.is_none());
        assert!(args.handoff.is_none());
    }
}
