//! Run submissions against AWS: clusters are ECS clusters and objects live in S3.

use aws_sdk_s3::error::{DisplayErrorContext, SdkError};

pub mod client;
pub mod probe;

pub use probe::AwsProbe;

/// Tag key used to mark resources created for a cluster.
pub const CLUSTER_TAG: &str = "blastlane-cluster";

/// A flattened AWS SDK error, so that SDK errors can be used as an error-stack context.
#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct AwsError(String);

impl<E, R> From<SdkError<E, R>> for AwsError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    fn from(err: SdkError<E, R>) -> Self {
        AwsError(DisplayErrorContext(&err).to_string())
    }
}

/// Split an `s3://bucket/key` URL into bucket and key.
pub fn parse_s3_url(path: &str) -> Option<(String, String)> {
    parse_s3_prefix(path).filter(|(_, key)| !key.is_empty())
}

/// Split an `s3://bucket/prefix` URL into bucket and key prefix. The prefix may be empty.
pub fn parse_s3_prefix(path: &str) -> Option<(String, String)> {
    let u = url::Url::parse(path).ok()?;
    if u.scheme() != "s3" {
        return None;
    }

    let bucket = u.host_str()?.to_string();
    let key = u.path().trim_start_matches('/').to_string();
    Some((bucket, key))
}
