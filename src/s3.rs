use anyhow::Result;
use aws_config::meta::region::RegionProviderChain;
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client as S3Client,
};

use crate::config::AppConfig;

/// S3 client for RAMS document storage. Path-style addressing keeps MinIO and
/// other S3-compatible endpoints working.
pub async fn build_client(config: &AppConfig) -> Result<S3Client> {
    let region_provider = RegionProviderChain::first_try(Some(Region::new(config.aws_region.clone())))
        .or_default_provider()
        .or_else("eu-west-2");

    #[allow(deprecated)]
    let mut loader = aws_config::from_env().region(region_provider);

    if let Some(endpoint) = config.aws_endpoint_url.as_deref() {
        loader = loader.endpoint_url(endpoint);
    }

    if let (Some(access_key), Some(secret_key)) = (
        config.aws_access_key_id.as_ref(),
        config.aws_secret_access_key.as_ref(),
    ) {
        loader = loader.credentials_provider(Credentials::new(
            access_key.clone(),
            secret_key.clone(),
            None,
            None,
            "fleetops-env",
        ));
    }

    let shared = loader.load().await;
    let s3_config = S3ConfigBuilder::from(&shared).force_path_style(true).build();
    Ok(S3Client::from_conf(s3_config))
}
