use error_stack::Report;
use thiserror::Error;

/// Process exit codes for each kind of failure. These are part of the command-line contract and
/// must not change between versions.
pub mod codes {
    pub const SUCCESS: i32 = 0;
    pub const CONFIG_ERROR: i32 = 1;
    pub const DATABASE_NOT_FOUND: i32 = 2;
    pub const QUERY_VALIDATION_ERROR: i32 = 3;
    pub const FETCH_ERROR: i32 = 6;
    pub const CLUSTER_STATE_ERROR: i32 = 9;
    pub const SUBMISSION_ERROR: i32 = 10;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitErrorKind {
    /// The configuration is incomplete or inconsistent.
    Config,
    /// The cluster is in a state that does not allow a submission.
    ClusterState,
    /// The requested database could not be located or its metadata could not be read.
    DatabaseNotFound,
    /// One or more query locations are unusable.
    QueryValidation,
    /// An object could not be read from cloud storage.
    Fetch,
    /// The final job handoff failed.
    Submission,
}

impl SubmitErrorKind {
    pub fn code(&self) -> i32 {
        match self {
            SubmitErrorKind::Config => codes::CONFIG_ERROR,
            SubmitErrorKind::ClusterState => codes::CLUSTER_STATE_ERROR,
            SubmitErrorKind::DatabaseNotFound => codes::DATABASE_NOT_FOUND,
            SubmitErrorKind::QueryValidation => codes::QUERY_VALIDATION_ERROR,
            SubmitErrorKind::Fetch => codes::FETCH_ERROR,
            SubmitErrorKind::Submission => codes::SUBMISSION_ERROR,
        }
    }
}

/// The error type shared by every stage of a submission. The message is written to be shown
/// to the user as-is; diagnostics for developers go into the surrounding [Report] as attachments.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SubmitError {
    pub kind: SubmitErrorKind,
    pub message: String,
}

impl SubmitError {
    pub fn new(kind: SubmitErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::Config, message)
    }

    pub fn cluster_state(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::ClusterState, message)
    }

    pub fn database_not_found(database: &str) -> Self {
        Self::new(
            SubmitErrorKind::DatabaseNotFound,
            format!("BLAST database {database} was not found"),
        )
    }

    pub fn query_validation(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::QueryValidation, message)
    }

    pub fn fetch(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::Fetch, message)
    }

    pub fn submission(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::Submission, message)
    }

    /// The exit code the process should report for this error.
    pub fn code(&self) -> i32 {
        self.kind.code()
    }
}

pub type SubmitResult<T> = Result<T, Report<SubmitError>>;
