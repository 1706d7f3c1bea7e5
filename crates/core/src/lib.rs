//! Pre-flight validation and orchestration for BLAST searches on ephemeral cloud clusters.
//!
//! A submission checks the cluster, the database, and the queries, in that order, before anything
//! expensive is created. Cloud access goes through the [CloudProbe] trait, with one
//! implementation per provider.

pub mod config;
pub mod database;
pub mod error;
pub mod probe;
pub mod query;
pub mod submit;
pub mod uri;

#[cfg(test)]
mod test_util;

pub use config::{CloudProvider, Configuration, InstanceProperties, QuerySpec};
pub use database::{DatabaseResolver, ResolvedDatabase, ResourceHints};
pub use error::{codes, SubmitError, SubmitErrorKind, SubmitResult};
pub use probe::{CloudProbe, ClusterStatus};
pub use query::{assemble_query_files, QuerySourceList, QUERY_LIST_EXT};
pub use submit::{JobLauncher, Orchestrator, Submission, SubmissionState};
pub use uri::{are_files_on_localhost, classify, PathKind, RemoteScheme};
