//! Functionality for building AWS clients
use std::marker::PhantomData;

use aws_sdk_ecs::{
    config::retry::ClassifyRetry,
    error::ProvideErrorMetadata,
    operation::{
        create_cluster::CreateClusterError, delete_cluster::DeleteClusterError,
        describe_clusters::DescribeClustersError, list_tasks::ListTasksError,
        stop_task::StopTaskError,
    },
};
use aws_sdk_s3::config::{interceptors::InterceptorContext, retry::RetryAction};
use aws_smithy_runtime_api::client::retries::classifiers::SharedRetryClassifier;

/// Load the shared SDK configuration for a region.
pub async fn load_sdk_config(region: &str) -> aws_config::SdkConfig {
    aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .load()
        .await
}

/// Build a configuration for the ECS client that will retry failed requests, including
/// rate-limited requests.
pub fn build_ecs_client_config(sdk_config: &aws_config::SdkConfig) -> aws_sdk_ecs::config::Builder {
    let mut builder = aws_sdk_ecs::config::Builder::from(sdk_config);

    let retry_config = aws_sdk_ecs::config::retry::RetryConfig::adaptive()
        .with_initial_backoff(std::time::Duration::from_secs(2))
        .with_max_attempts(5)
        .with_max_backoff(std::time::Duration::from_secs(20));

    builder.set_retry_config(Some(retry_config));

    // One classifier per operation the probe performs, since the classifier has to know the
    // concrete error type to read its code.
    builder.push_retry_classifier(SharedRetryClassifier::new(RateLimitErrorClassifier::<
        DescribeClustersError,
    >::new()));
    builder.push_retry_classifier(SharedRetryClassifier::new(RateLimitErrorClassifier::<
        CreateClusterError,
    >::new()));
    builder.push_retry_classifier(SharedRetryClassifier::new(RateLimitErrorClassifier::<
        DeleteClusterError,
    >::new()));
    builder.push_retry_classifier(SharedRetryClassifier::new(RateLimitErrorClassifier::<
        ListTasksError,
    >::new()));
    builder.push_retry_classifier(SharedRetryClassifier::new(RateLimitErrorClassifier::<
        StopTaskError,
    >::new()));

    builder
}

/// An error classifier that triggers retries on ThrottlingException, which the SDK does not yet
/// handle.
#[derive(Debug, Default)]
pub struct RateLimitErrorClassifier<E> {
    _marker: PhantomData<E>,
}

impl<E> RateLimitErrorClassifier<E> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<E> ClassifyRetry for RateLimitErrorClassifier<E>
where
    E: std::error::Error + ProvideErrorMetadata + Send + Sync + 'static,
{
    fn classify_retry(&self, ctx: &InterceptorContext) -> RetryAction {
        let error = match ctx.output_or_error() {
            Some(Ok(_)) | None => return RetryAction::NoActionIndicated,
            Some(Err(err)) => err,
        };

        let throttled = error
            .as_operation_error()
            .and_then(|err| err.downcast_ref::<aws_sdk_ecs::error::SdkError<E>>())
            .and_then(|err| err.as_service_error())
            .and_then(|err| err.code())
            .map(|code| code == "ThrottlingException")
            .unwrap_or(false);

        if throttled {
            RetryAction::throttling_error()
        } else {
            // Another classifier may still decide to retry.
            RetryAction::NoActionIndicated
        }
    }

    fn name(&self) -> &'static str {
        "ThrottlingException Classifier"
    }
}
