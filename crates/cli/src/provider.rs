use blastlane_aws::AwsProbe;
use blastlane_core::{CloudProbe, CloudProvider, Configuration, SubmitError, SubmitResult};
use blastlane_gcp::GcpProbe;
use error_stack::Report;

/// Build the probe for the configured cloud provider.
pub async fn probe_for(config: &Configuration) -> SubmitResult<Box<dyn CloudProbe>> {
    match config.provider() {
        CloudProvider::Aws => {
            let region = config.cloud_provider.region.as_deref().ok_or_else(|| {
                Report::new(SubmitError::config("Invalid configuration: an AWS region is required"))
            })?;
            Ok(Box::new(AwsProbe::for_region(region).await))
        }
        CloudProvider::Gcp => Ok(Box::new(GcpProbe::new())),
    }
}
