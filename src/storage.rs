//! Object storage for uploaded RAMS files.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

/// One file ready to be written under `key`.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub content_disposition: Option<String>,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn put_object(&self, file: StoredFile) -> Result<()>;

    /// Time-limited download link for a stored file.
    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String>;

    async fn delete_object(&self, key: &str) -> Result<()>;
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(&self, file: StoredFile) -> Result<()> {
        let size = file.bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&file.key)
            .content_type(file.content_type)
            .set_content_disposition(file.content_disposition)
            .body(ByteStream::from(file.bytes))
            .send()
            .await
            .with_context(|| format!("failed to upload {} ({size} bytes) to S3", file.key))?;
        Ok(())
    }

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String> {
        let presign_config = PresigningConfig::expires_in(expires_in)
            .context("invalid presigned URL lifetime")?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .with_context(|| format!("failed to presign download for {key}"))?;

        Ok(presigned.uri().to_string())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("failed to delete {key} from S3"))?;
        Ok(())
    }
}
