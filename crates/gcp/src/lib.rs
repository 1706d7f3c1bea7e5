//! Run submissions against Google Cloud: clusters are GKE clusters and objects live in Cloud
//! Storage. Everything goes through the `gcloud` and `gsutil` tools, so they must be installed
//! and authenticated.

pub mod probe;
pub mod runner;

pub use probe::GcpProbe;
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
