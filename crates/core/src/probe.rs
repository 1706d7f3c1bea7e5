use async_trait::async_trait;
use serde::Serialize;

use crate::{config::Configuration, error::SubmitResult};

/// The state of the named cluster, as reported by the provider at the time of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    /// No cluster with this name exists.
    Absent,
    /// The cluster exists but is still being provisioned or updated.
    Pending,
    Running,
    /// The cluster exists but is broken or being torn down.
    Failed,
    /// The provider reported a state we don't recognize.
    Unknown,
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ClusterStatus::Absent => "absent",
            ClusterStatus::Pending => "pending",
            ClusterStatus::Running => "running",
            ClusterStatus::Failed => "failed",
            ClusterStatus::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Provider-specific access to clusters and object storage. This is the only place where a
/// submission talks to a cloud.
#[async_trait]
pub trait CloudProbe: Send + Sync {
    /// Look up the configured cluster. A missing cluster is [ClusterStatus::Absent], not an error.
    async fn check_cluster(&self, config: &Configuration) -> SubmitResult<ClusterStatus>;

    /// Read a small object from cloud storage. Any failure is reported as a
    /// [Fetch](crate::SubmitErrorKind::Fetch) error.
    async fn fetch_object(&self, uri: &str) -> SubmitResult<Vec<u8>>;

    /// List the URIs of every object whose URI starts with `prefix`, which is a bucket URI
    /// such as `s3://bucket/dir/`. Any failure is a [Fetch](crate::SubmitErrorKind::Fetch) error.
    async fn list_objects(&self, prefix: &str) -> SubmitResult<Vec<String>>;

    /// Create the configured cluster.
    async fn create_cluster(&self, config: &Configuration) -> SubmitResult<()>;

    /// Remove the configured cluster and anything created along with it. A cluster that is
    /// already gone counts as success, so this can be called any number of times.
    async fn delete_cluster_with_cleanup(&self, config: &Configuration) -> SubmitResult<()>;
}

#[async_trait]
impl<T: CloudProbe + ?Sized> CloudProbe for Box<T> {
    async fn check_cluster(&self, config: &Configuration) -> SubmitResult<ClusterStatus> {
        (**self).check_cluster(config).await
    }

    async fn fetch_object(&self, uri: &str) -> SubmitResult<Vec<u8>> {
        (**self).fetch_object(uri).await
    }

    async fn list_objects(&self, prefix: &str) -> SubmitResult<Vec<String>> {
        (**self).list_objects(prefix).await
    }

    async fn create_cluster(&self, config: &Configuration) -> SubmitResult<()> {
        (**self).create_cluster(config).await
    }

    async fn delete_cluster_with_cleanup(&self, config: &Configuration) -> SubmitResult<()> {
        (**self).delete_cluster_with_cleanup(config).await
    }
}
