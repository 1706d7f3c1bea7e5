//! Run the pre-flight checks for a submission in order and hand the validated job off to a
//! [JobLauncher].

use async_trait::async_trait;
use error_stack::Report;
use serde::Serialize;
use tracing::{event, instrument, Level};

use crate::{
    config::{CloudProvider, Configuration},
    database::{DatabaseResolver, ResolvedDatabase, ResourceHints},
    error::{SubmitError, SubmitResult},
    probe::{CloudProbe, ClusterStatus},
    query::{assemble_query_files, QuerySourceList},
};

/// Where a submission is in its lifecycle. Stages only move forward; `Submitted` and `Failed`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    Init,
    ClusterChecked,
    DatabaseValidated,
    QueriesValidated,
    Submitted,
    Failed,
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Submitted | SubmissionState::Failed)
    }
}

/// The validated unit of work handed to the job launcher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub cluster_name: String,
    pub provider: CloudProvider,
    /// True if this submission created the cluster, false if it reused a running one.
    pub cluster_created: bool,
    pub program: String,
    pub database: ResolvedDatabase,
    pub resource_hints: ResourceHints,
    pub queries: QuerySourceList,
    pub results: String,
}

/// Starts the search once every check has passed.
#[async_trait]
pub trait JobLauncher: Send + Sync {
    async fn launch(&self, submission: &Submission) -> SubmitResult<()>;
}

/// Drives one submission attempt. The checks run strictly in order:
/// cluster state, database, queries, then cluster creation and the job handoff. If anything
/// fails after the cluster was found or created, the cluster is cleaned up before the original
/// error is returned.
pub struct Orchestrator<'a> {
    config: Configuration,
    probe: &'a dyn CloudProbe,
    launcher: &'a dyn JobLauncher,
    state: SubmissionState,
    /// Set once a cluster was confirmed present or this run started creating one.
    cluster_engaged: bool,
    cleanup_attempted: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: Configuration,
        probe: &'a dyn CloudProbe,
        launcher: &'a dyn JobLauncher,
    ) -> Self {
        Self {
            config,
            probe,
            launcher,
            state: SubmissionState::Init,
            cluster_engaged: false,
            cleanup_attempted: false,
        }
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Run the submission. This can only be called once per orchestrator.
    #[instrument(skip(self), fields(cluster = %self.config.cluster.name))]
    pub async fn submit(&mut self) -> SubmitResult<Submission> {
        if self.state != SubmissionState::Init {
            return Err(Report::new(SubmitError::submission(
                "This submission has already been attempted",
            )));
        }

        match self.run_stages().await {
            Ok(submission) => {
                self.advance(SubmissionState::Submitted);
                Ok(submission)
            }
            Err(e) => {
                event!(Level::DEBUG, failed_in = ?self.state, "submission failed");
                self.fail().await;
                Err(e)
            }
        }
    }

    /// Give up on a submission whose [submit](Self::submit) future was dropped before it
    /// finished, cleaning up the cluster if one was involved.
    pub async fn abort(&mut self) {
        if !self.state.is_terminal() {
            event!(Level::INFO, state = ?self.state, "aborting submission");
            self.fail().await;
        }
    }

    async fn run_stages(&mut self) -> SubmitResult<Submission> {
        self.config.validate()?;

        let status = self.probe.check_cluster(&self.config).await?;
        event!(Level::INFO, %status, "checked cluster");
        match status {
            ClusterStatus::Absent => {}
            ClusterStatus::Pending | ClusterStatus::Running => self.cluster_engaged = true,
            ClusterStatus::Failed | ClusterStatus::Unknown => {
                return Err(Report::new(SubmitError::cluster_state(format!(
                    "Cluster {} is in state {status} and cannot accept work; delete it and try again",
                    self.config.cluster.name
                ))));
            }
        }
        self.advance(SubmissionState::ClusterChecked);

        let database = DatabaseResolver::for_config(self.probe, &self.config)
            .resolve(&self.config.blast.db)
            .await?;
        let resource_hints = database.resource_hints();
        resource_hints.check_instance(&self.config.instance_properties())?;
        self.advance(SubmissionState::DatabaseValidated);

        let queries = assemble_query_files(&self.config, self.probe).await?;
        self.advance(SubmissionState::QueriesValidated);

        let cluster_created = status == ClusterStatus::Absent;
        if cluster_created {
            // A failed create can still leave resources behind.
            self.cluster_engaged = true;
            event!(Level::INFO, "creating cluster");
            self.probe.create_cluster(&self.config).await?;
        }

        let submission = Submission {
            cluster_name: self.config.cluster.name.clone(),
            provider: self.config.provider(),
            cluster_created,
            program: self.config.blast.program.clone(),
            database,
            resource_hints,
            queries,
            results: self.config.blast.results.clone(),
        };

        self.launcher.launch(&submission).await?;
        Ok(submission)
    }

    fn advance(&mut self, state: SubmissionState) {
        event!(Level::INFO, from = ?self.state, to = ?state, "submission stage complete");
        self.state = state;
    }

    async fn fail(&mut self) {
        self.state = SubmissionState::Failed;

        if !self.cluster_engaged || self.cleanup_attempted {
            return;
        }

        self.cleanup_attempted = true;
        event!(Level::INFO, "cleaning up cluster after failed submission");
        if let Err(e) = self.probe.delete_cluster_with_cleanup(&self.config).await {
            event!(Level::WARN, error = ?e, "cluster cleanup failed");
        }
    }
}
