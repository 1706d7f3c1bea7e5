//! Probe and manage ECS clusters, and read objects from S3.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_ecs::types::Tag;
use backon::{ExponentialBuilder, Retryable};
use blastlane_core::{CloudProbe, ClusterStatus, Configuration, SubmitError, SubmitResult};
use error_stack::{Report, ResultExt};
use tracing::{event, instrument, Level};

use crate::{client, parse_s3_prefix, parse_s3_url, AwsError, CLUSTER_TAG};

#[derive(thiserror::Error, Debug)]
enum DeleteError {
    #[error("Cluster still has running tasks")]
    ContainsTasks,
    #[error("Failed to delete cluster")]
    Failed,
}

/// Map an ECS cluster status to a [ClusterStatus].
///
/// See https://docs.aws.amazon.com/AmazonECS/latest/APIReference/API_Cluster.html
pub fn ecs_cluster_status(status: &str) -> ClusterStatus {
    match status {
        "ACTIVE" => ClusterStatus::Running,
        "PROVISIONING" => ClusterStatus::Pending,
        "DEPROVISIONING" | "FAILED" => ClusterStatus::Failed,
        // Deleted clusters stay visible as INACTIVE for a while.
        "INACTIVE" => ClusterStatus::Absent,
        _ => ClusterStatus::Unknown,
    }
}

/// A [CloudProbe] backed by the ECS and S3 APIs.
#[derive(Clone)]
pub struct AwsProbe {
    /// An client from the ECS SDK.
    pub ecs_client: aws_sdk_ecs::Client,
    /// An client from the S3 SDK.
    pub s3_client: aws_sdk_s3::Client,
}

impl std::fmt::Debug for AwsProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsProbe").finish_non_exhaustive()
    }
}

impl AwsProbe {
    /// Create clients for the given region, using credentials from the environment.
    pub async fn for_region(region: &str) -> Self {
        let sdk_config = client::load_sdk_config(region).await;
        let ecs_client =
            aws_sdk_ecs::Client::from_conf(client::build_ecs_client_config(&sdk_config).build());
        let s3_client = aws_sdk_s3::Client::new(&sdk_config);

        Self {
            ecs_client,
            s3_client,
        }
    }

    /// Stop everything running in the cluster. Returns false if the cluster does not exist.
    async fn stop_tasks(&self, cluster: &str) -> SubmitResult<bool> {
        let mut pages = self
            .ecs_client
            .list_tasks()
            .cluster(cluster)
            .into_paginator()
            .send();

        let mut task_arns = Vec::new();
        while let Some(page) = pages.next().await {
            match page {
                Ok(page) => task_arns.extend(page.task_arns().iter().cloned()),
                Err(e)
                    if e.as_service_error()
                        .map(|e| e.is_cluster_not_found_exception())
                        .unwrap_or(false) =>
                {
                    return Ok(false);
                }
                Err(e) => {
                    return Err(Report::new(AwsError::from(e)).change_context(
                        SubmitError::cluster_state(format!(
                            "Failed to list tasks in cluster {cluster}"
                        )),
                    ));
                }
            }
        }

        event!(Level::DEBUG, count = task_arns.len(), "stopping tasks");
        let stops = task_arns.iter().map(|arn| {
            self.ecs_client
                .stop_task()
                .cluster(cluster)
                .task(arn)
                .reason("submission cleanup")
                .send()
        });

        // Deleting the cluster fails if anything is left running, so individual failures here
        // only need to be logged.
        for result in futures::future::join_all(stops).await {
            if let Err(e) = result {
                event!(Level::WARN, error = %AwsError::from(e), "failed to stop task");
            }
        }

        Ok(true)
    }

    async fn delete_cluster_once(&self, cluster: &str) -> Result<(), Report<DeleteError>> {
        let Err(e) = self.ecs_client.delete_cluster().cluster(cluster).send().await else {
            return Ok(());
        };

        let (not_found, busy) = match e.as_service_error() {
            Some(err) => (
                err.is_cluster_not_found_exception(),
                err.is_cluster_contains_tasks_exception()
                    || err.is_cluster_contains_services_exception(),
            ),
            None => (false, false),
        };

        if not_found {
            return Ok(());
        }

        let context = if busy {
            DeleteError::ContainsTasks
        } else {
            DeleteError::Failed
        };
        Err(Report::new(AwsError::from(e)).change_context(context))
    }
}

#[async_trait]
impl CloudProbe for AwsProbe {
    #[instrument(level = "debug", skip_all, fields(cluster = %config.cluster_name()))]
    async fn check_cluster(&self, config: &Configuration) -> SubmitResult<ClusterStatus> {
        let name = config.cluster_name();
        let desc = self
            .ecs_client
            .describe_clusters()
            .clusters(name)
            .send()
            .await
            .map_err(AwsError::from)
            .change_context_lazy(|| {
                SubmitError::cluster_state(format!("Failed to look up cluster {name}"))
            })?;

        if desc
            .failures()
            .iter()
            .any(|failure| failure.reason() == Some("MISSING"))
        {
            return Ok(ClusterStatus::Absent);
        }

        let status = desc
            .clusters()
            .iter()
            .find(|c| c.cluster_name() == Some(name))
            .map(|c| ecs_cluster_status(c.status().unwrap_or_default()))
            .unwrap_or(ClusterStatus::Absent);

        event!(Level::DEBUG, %status, "described cluster");
        Ok(status)
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch_object(&self, uri: &str) -> SubmitResult<Vec<u8>> {
        let (bucket, key) = parse_s3_url(uri)
            .ok_or_else(|| SubmitError::fetch(format!("{uri} is not an S3 object URI")))?;

        let object = self
            .s3_client
            .get_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
            .map_err(AwsError::from)
            .change_context_lazy(|| SubmitError::fetch(format!("Failed to read {uri}")))?;

        let data = object
            .body
            .collect()
            .await
            .change_context_lazy(|| SubmitError::fetch(format!("Failed to read {uri}")))
            .attach_printable("Reading object body")?;

        Ok(data.into_bytes().to_vec())
    }

    #[instrument(level = "debug", skip(self))]
    async fn list_objects(&self, prefix: &str) -> SubmitResult<Vec<String>> {
        let failed = || SubmitError::fetch(format!("Failed to list objects under {prefix}"));
        let (bucket, key_prefix) = parse_s3_prefix(prefix).ok_or_else(|| {
            Report::new(failed()).attach_printable(format!("{prefix} is not an S3 URI"))
        })?;

        let mut pages = self
            .s3_client
            .list_objects_v2()
            .bucket(&bucket)
            .prefix(&key_prefix)
            .into_paginator()
            .send();

        let mut uris = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(AwsError::from).change_context_lazy(failed)?;
            uris.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(|key| format!("s3://{bucket}/{key}")),
            );
        }

        Ok(uris)
    }

    #[instrument(level = "debug", skip_all, fields(cluster = %config.cluster_name()))]
    async fn create_cluster(&self, config: &Configuration) -> SubmitResult<()> {
        let name = config.cluster_name();
        let tags = config
            .cluster
            .labels
            .iter()
            .map(|(k, v)| Tag::builder().key(k).value(v).build())
            .chain(std::iter::once(
                Tag::builder().key(CLUSTER_TAG).value(name).build(),
            ))
            .collect::<Vec<_>>();

        self.ecs_client
            .create_cluster()
            .cluster_name(name)
            .capacity_providers("FARGATE")
            .capacity_providers("FARGATE_SPOT")
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(AwsError::from)
            .change_context_lazy(|| {
                SubmitError::cluster_state(format!("Failed to create cluster {name}"))
            })?;

        event!(Level::INFO, "created cluster");
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(cluster = %config.cluster_name()))]
    async fn delete_cluster_with_cleanup(&self, config: &Configuration) -> SubmitResult<()> {
        let name = config.cluster_name();

        if !self.stop_tasks(name).await? {
            event!(Level::DEBUG, "cluster already absent");
            return Ok(());
        }

        // Stopped tasks take a little while to drain, and the delete is refused until they do.
        (|| self.delete_cluster_once(name))
            .retry(
                &ExponentialBuilder::default()
                    .with_min_delay(Duration::from_secs(2))
                    .with_max_times(8),
            )
            .when(|e| matches!(e.current_context(), DeleteError::ContainsTasks))
            .await
            .change_context_lazy(|| {
                SubmitError::cluster_state(format!("Failed to delete cluster {name}"))
            })?;

        event!(Level::INFO, "deleted cluster");
        Ok(())
    }
}
