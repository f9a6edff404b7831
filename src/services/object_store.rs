//! Trait for the bucket processed tables are published to.

use anyhow::Result;

/// Abstraction over an S3-compatible object store.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name shown in logs, e.g. `s3://bucket`.
    fn location(&self) -> String;

    /// Stores `body` under `key`, replacing any existing object.
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;
}
