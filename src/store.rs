use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// One page of a listing. `next` is the continuation token for the following
/// page, `None` once the listing is exhausted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub objects: Vec<RemoteObject>,
    pub next: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable name of the bucket or directory being mirrored to.
    fn describe(&self) -> String;
    async fn list_page(&self, prefix: &str, continuation: Option<String>) -> Result<ObjectPage, AppError>;
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), AppError>;
    async fn delete_object(&self, key: &str) -> Result<(), AppError>;
}
