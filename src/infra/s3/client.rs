use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use tracing::debug;

use crate::config::S3Settings;
use crate::services::object_store::ObjectStore;

/// [`ObjectStore`] backed by the AWS SDK.
///
/// Works with AWS itself and with S3-compatible services (R2, MinIO) when
/// `S3_ENDPOINT_URL` is set.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Builds a client from static credentials rather than the ambient AWS
    /// provider chain.
    pub async fn connect(settings: &S3Settings) -> Self {
        let credentials = Credentials::new(
            settings.access_key_id.clone(),
            settings.secret_access_key.clone(),
            None,
            None,
            "environment",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials);

        if let Some(endpoint) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let config = loader.load().await;
        debug!(bucket = %settings.bucket, endpoint = ?settings.endpoint_url, "S3 client configured");

        Self {
            client: aws_sdk_s3::Client::new(&config),
            bucket: settings.bucket.clone(),
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    fn location(&self) -> String {
        format!("s3://{}", self.bucket)
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .with_context(|| format!("S3 PutObject failed for s3://{}/{}", self.bucket, key))?;

        Ok(())
    }
}
