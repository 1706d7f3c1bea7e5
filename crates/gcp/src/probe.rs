//! Probe and manage GKE clusters, and read objects from Cloud Storage, using the `gcloud` and
//! `gsutil` command line tools.

use async_trait::async_trait;
use blastlane_core::{CloudProbe, ClusterStatus, Configuration, SubmitError, SubmitResult};
use error_stack::{Report, ResultExt};
use tracing::{event, instrument, Level};

use crate::runner::{CommandOutput, CommandRunner, ProcessRunner};

const GCLOUD: &str = "gcloud";
const GSUTIL: &str = "gsutil";

/// Label key applied to the cluster, and through it to the disks and other resources GKE
/// creates for it.
pub const CLUSTER_LABEL: &str = "blastlane-cluster";

/// Map a GKE cluster status to a [ClusterStatus].
pub fn gke_cluster_status(status: &str) -> ClusterStatus {
    match status {
        "PROVISIONING" | "RECONCILING" => ClusterStatus::Pending,
        "RUNNING" => ClusterStatus::Running,
        "ERROR" | "DEGRADED" | "STOPPING" => ClusterStatus::Failed,
        _ => ClusterStatus::Unknown,
    }
}

/// `gsutil ls` exits with an error when a pattern matches nothing.
fn matched_no_objects(output: &CommandOutput) -> bool {
    output.stderr_text().contains("matched no objects")
}

fn is_not_found(output: &CommandOutput) -> bool {
    let stderr = output.stderr_text().to_lowercase();
    stderr.contains("not found") || stderr.contains("notfound")
}

/// A [CloudProbe] for Google Cloud.
#[derive(Debug, Default)]
pub struct GcpProbe<R: CommandRunner = ProcessRunner> {
    runner: R,
}

impl GcpProbe<ProcessRunner> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: CommandRunner> GcpProbe<R> {
    pub fn with_runner(runner: R) -> Self {
        Self { runner }
    }

    async fn run(
        &self,
        program: &str,
        args: Vec<String>,
        context: impl Fn() -> SubmitError,
    ) -> SubmitResult<CommandOutput> {
        self.runner
            .run(program, &args)
            .await
            .change_context_lazy(context)
    }

    fn project_args(config: &Configuration) -> Vec<String> {
        config
            .cloud_provider
            .project
            .iter()
            .flat_map(|p| ["--project".to_string(), p.clone()])
            .collect()
    }

    fn location_args(config: &Configuration) -> Vec<String> {
        let mut args = Self::project_args(config);
        if let Some(zone) = &config.cloud_provider.zone {
            args.extend(["--zone".to_string(), zone.clone()]);
        } else if let Some(region) = &config.cloud_provider.region {
            args.extend(["--region".to_string(), region.clone()]);
        }
        args
    }

    /// Delete the persistent disks that GKE left behind for the cluster.
    async fn delete_labelled_disks(&self, config: &Configuration) -> SubmitResult<()> {
        let name = config.cluster_name();
        let failed =
            || SubmitError::cluster_state(format!("Failed to delete disks of cluster {name}"));

        let mut args = vec!["compute".to_string(), "disks".to_string(), "list".to_string()];
        args.extend(Self::project_args(config));
        args.push(format!("--filter=labels.{CLUSTER_LABEL}={name}"));
        args.push("--format=value(name,zone.basename())".to_string());

        let list = self.run(GCLOUD, args, failed).await?;
        if !list.success() {
            return Err(Report::new(failed()).attach_printable(list.stderr_text()));
        }

        let mut undeleted = Vec::new();
        for line in list.stdout_text().lines() {
            let mut fields = line.split_whitespace();
            let (Some(disk), Some(zone)) = (fields.next(), fields.next()) else {
                continue;
            };

            let mut args = vec![
                "compute".to_string(),
                "disks".to_string(),
                "delete".to_string(),
                disk.to_string(),
                "--zone".to_string(),
                zone.to_string(),
            ];
            args.extend(Self::project_args(config));
            args.push("--quiet".to_string());

            let output = self.run(GCLOUD, args, failed).await?;
            if output.success() || is_not_found(&output) {
                event!(Level::DEBUG, %disk, "deleted disk");
            } else {
                event!(Level::WARN, %disk, stderr = %output.stderr_text(), "failed to delete disk");
                undeleted.push(disk.to_string());
            }
        }

        if undeleted.is_empty() {
            Ok(())
        } else {
            Err(Report::new(failed())
                .attach_printable(format!("Disks left behind: {}", undeleted.join(", "))))
        }
    }
}

#[async_trait]
impl<R: CommandRunner> CloudProbe for GcpProbe<R> {
    #[instrument(level = "debug", skip_all, fields(cluster = %config.cluster_name()))]
    async fn check_cluster(&self, config: &Configuration) -> SubmitResult<ClusterStatus> {
        let name = config.cluster_name();
        let failed = || SubmitError::cluster_state(format!("Failed to look up cluster {name}"));

        let mut args = vec![
            "container".to_string(),
            "clusters".to_string(),
            "list".to_string(),
        ];
        args.extend(Self::location_args(config));
        args.push(format!("--filter=name={name}"));
        args.push("--format=value(status)".to_string());

        let output = self.run(GCLOUD, args, failed).await?;
        if !output.success() {
            return Err(Report::new(failed()).attach_printable(output.stderr_text()));
        }

        let status = output
            .stdout_text()
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(gke_cluster_status)
            .unwrap_or(ClusterStatus::Absent);

        event!(Level::DEBUG, %status, "described cluster");
        Ok(status)
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch_object(&self, uri: &str) -> SubmitResult<Vec<u8>> {
        let failed = || SubmitError::fetch(format!("Failed to read {uri}"));
        if !uri.starts_with("gs://") {
            return Err(Report::new(failed())
                .attach_printable(format!("{uri} is not a Cloud Storage URI")));
        }

        let output = self
            .run(GSUTIL, vec!["cat".to_string(), uri.to_string()], failed)
            .await?;
        if !output.success() {
            return Err(Report::new(failed()).attach_printable(output.stderr_text()));
        }

        Ok(output.stdout)
    }

    #[instrument(level = "debug", skip(self))]
    async fn list_objects(&self, prefix: &str) -> SubmitResult<Vec<String>> {
        let failed = || SubmitError::fetch(format!("Failed to list objects under {prefix}"));
        if !prefix.starts_with("gs://") {
            return Err(Report::new(failed())
                .attach_printable(format!("{prefix} is not a Cloud Storage URI")));
        }

        let output = self
            .run(GSUTIL, vec!["ls".to_string(), format!("{prefix}**")], failed)
            .await?;
        if matched_no_objects(&output) {
            return Ok(Vec::new());
        }
        if !output.success() {
            return Err(Report::new(failed()).attach_printable(output.stderr_text()));
        }

        Ok(output
            .stdout_text()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.ends_with('/'))
            .map(String::from)
            .collect())
    }

    #[instrument(level = "debug", skip_all, fields(cluster = %config.cluster_name()))]
    async fn create_cluster(&self, config: &Configuration) -> SubmitResult<()> {
        let name = config.cluster_name();
        let failed = || SubmitError::cluster_state(format!("Failed to create cluster {name}"));

        let labels = config
            .cluster
            .labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .chain(std::iter::once(format!("{CLUSTER_LABEL}={name}")))
            .collect::<Vec<_>>()
            .join(",");

        let mut args = vec![
            "container".to_string(),
            "clusters".to_string(),
            "create".to_string(),
            name.to_string(),
        ];
        args.extend(Self::location_args(config));
        if let Some(machine_type) = &config.cluster.machine_type {
            args.extend(["--machine-type".to_string(), machine_type.clone()]);
        }
        args.extend([
            "--num-nodes".to_string(),
            config.cluster.num_nodes.to_string(),
            "--labels".to_string(),
            labels,
            "--quiet".to_string(),
        ]);

        let output = self.run(GCLOUD, args, failed).await?;
        if !output.success() {
            return Err(Report::new(failed()).attach_printable(output.stderr_text()));
        }

        event!(Level::INFO, "created cluster");
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(cluster = %config.cluster_name()))]
    async fn delete_cluster_with_cleanup(&self, config: &Configuration) -> SubmitResult<()> {
        let name = config.cluster_name();
        let failed = || SubmitError::cluster_state(format!("Failed to delete cluster {name}"));

        let mut args = vec![
            "container".to_string(),
            "clusters".to_string(),
            "delete".to_string(),
            name.to_string(),
        ];
        args.extend(Self::location_args(config));
        args.push("--quiet".to_string());

        let output = self.run(GCLOUD, args, failed).await?;
        if output.success() {
            event!(Level::INFO, "deleted cluster");
        } else if is_not_found(&output) {
            event!(Level::DEBUG, "cluster already absent");
        } else {
            return Err(Report::new(failed()).attach_printable(output.stderr_text()));
        }

        self.delete_labelled_disks(config).await
    }
}
