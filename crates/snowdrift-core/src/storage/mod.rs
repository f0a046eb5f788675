//! Object store access scoped to a single bucket.
//!
//! Keys are always bucket-relative strings (`raw_data/orders.csv`), which is
//! what discovery hands out and what archival rewrites.

mod s3;

pub use s3::S3Config;

use axum::http::Method;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::{ObjectStore, PutPayload};
use snafu::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::emit;
use crate::error::{
    InvalidUtf8Snafu, LineTooLongSnafu, ListSnafu, ObjectStoreSnafu, SignSnafu,
    SigningUnsupportedSnafu, StorageError,
};
use crate::metrics::events::{RequestStatus, StorageOperation, StorageRequest};

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Convert a bucket-relative key into an object store path without
/// re-encoding keys that came back from a listing.
pub fn object_path(key: &str) -> Path {
    Path::parse(key).unwrap_or_else(|_| Path::from(key))
}

/// Storage provider for one bucket.
#[derive(Clone)]
pub struct StorageProvider {
    bucket: String,
    object_store: Arc<dyn ObjectStore>,
    signer: Option<Arc<dyn Signer>>,
    canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

impl StorageProvider {
    /// Wrap an existing object store (used for tests and dry runs).
    pub fn from_store(bucket: impl Into<String>, object_store: Arc<dyn ObjectStore>) -> Self {
        let bucket = bucket.into();
        Self {
            canonical_url: format!("memory://{bucket}"),
            bucket,
            object_store,
            signer: None,
        }
    }

    /// An empty in-memory bucket.
    pub fn in_memory(bucket: impl Into<String>) -> Self {
        Self::from_store(bucket, Arc::new(InMemory::new()))
    }

    /// Bucket name this provider is bound to.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Canonical URL of the bucket, for logging.
    pub fn url(&self) -> &str {
        &self.canonical_url
    }

    /// List every key under `prefix` (recursively), sorted lexicographically.
    ///
    /// The prefix is interpreted as a directory: `raw` matches `raw/a.csv`
    /// but not `raw_data/a.csv`. An empty prefix lists the whole bucket.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix_path = Path::from(prefix);
        let prefix_ref = if prefix_path.as_ref().is_empty() {
            None
        } else {
            Some(&prefix_path)
        };

        let start = Instant::now();
        let result: Result<Vec<String>, object_store::Error> = self
            .object_store
            .list(prefix_ref)
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await;

        emit!(StorageRequest {
            operation: StorageOperation::List,
            status: RequestStatus::from_ok(result.is_ok()),
            duration: start.elapsed(),
        });

        let mut keys = result.context(ListSnafu { prefix })?;
        keys.sort();
        debug!(prefix, count = keys.len(), "Listed objects");
        Ok(keys)
    }

    /// Read the first line of an object without downloading the rest of it.
    ///
    /// The line terminator (`\n` or `\r\n`) is stripped. Fails if no newline
    /// is found within `limit` bytes and the object is longer than that.
    pub async fn read_first_line(&self, key: &str, limit: usize) -> Result<String, StorageError> {
        let start = Instant::now();
        let result = self.object_store.get(&object_path(key)).await;

        emit!(StorageRequest {
            operation: StorageOperation::Get,
            status: RequestStatus::from_ok(result.is_ok()),
            duration: start.elapsed(),
        });

        let mut stream = result.context(ObjectStoreSnafu { key })?.into_stream();
        let mut line: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context(ObjectStoreSnafu { key })?;
            match chunk.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    line.extend_from_slice(&chunk[..pos]);
                    break;
                }
                None => line.extend_from_slice(&chunk),
            }
            ensure!(line.len() <= limit, LineTooLongSnafu { key, limit });
        }
        ensure!(line.len() <= limit, LineTooLongSnafu { key, limit });

        if line.last() == Some(&b'\r') {
            line.pop();
        }

        String::from_utf8(line).context(InvalidUtf8Snafu { key })
    }

    /// Put bytes at a key.
    pub async fn put(&self, key: &str, bytes: impl Into<Bytes>) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self
            .object_store
            .put(&object_path(key), PutPayload::from(bytes.into()))
            .await;

        emit!(StorageRequest {
            operation: StorageOperation::Put,
            status: RequestStatus::from_ok(result.is_ok()),
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu { key })?;
        Ok(())
    }

    /// Server-side copy, overwriting the destination if it exists.
    pub async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self
            .object_store
            .copy(&object_path(from), &object_path(to))
            .await;

        emit!(StorageRequest {
            operation: StorageOperation::Copy,
            status: RequestStatus::from_ok(result.is_ok()),
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu { key: from })
    }

    /// Delete the object at a key.
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self.object_store.delete(&object_path(key)).await;

        emit!(StorageRequest {
            operation: StorageOperation::Delete,
            status: RequestStatus::from_ok(result.is_ok()),
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu { key })
    }

    /// Presigned URL that lets a client PUT one object without credentials.
    pub async fn signed_put_url(&self, key: &str, expires_in: Duration) -> Result<String, StorageError> {
        let signer = self.signer.as_ref().context(SigningUnsupportedSnafu {
            bucket: &self.bucket,
        })?;

        let start = Instant::now();
        let result = signer
            .signed_url(Method::PUT, &object_path(key), expires_in)
            .await;

        emit!(StorageRequest {
            operation: StorageOperation::Sign,
            status: RequestStatus::from_ok(result.is_ok()),
            duration: start.elapsed(),
        });

        let url = result.context(SignSnafu { key })?;
        debug!(key, expires_secs = expires_in.as_secs(), "Signed upload URL");
        Ok(url.to_string())
    }

    /// Check whether an object exists.
    pub async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self.object_store.head(&object_path(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(source) => Err(StorageError::ObjectStore {
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_is_sorted_and_scoped_to_prefix() {
        let storage = StorageProvider::in_memory("bucket");
        storage.put("raw/b.csv", "x").await.unwrap();
        storage.put("raw/a.csv", "x").await.unwrap();
        storage.put("raw/nested/c.csv", "x").await.unwrap();
        storage.put("raw_data/d.csv", "x").await.unwrap();

        let keys = storage.list("raw").await.unwrap();
        assert_eq!(keys, vec!["raw/a.csv", "raw/b.csv", "raw/nested/c.csv"]);

        let all = storage.list("").await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_in_memory_store_cannot_sign() {
        let storage = StorageProvider::in_memory("bucket");
        let err = storage
            .signed_put_url("raw/a.csv", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::SigningUnsupported { bucket } if bucket == "bucket"));
    }

    #[tokio::test]
    async fn test_read_first_line() {
        let storage = StorageProvider::in_memory("bucket");
        storage
            .put("raw/a.csv", "id,name\r\n1,alice\n2,bob\n")
            .await
            .unwrap();

        let line = storage.read_first_line("raw/a.csv", 1024).await.unwrap();
        assert_eq!(line, "id,name");
    }

    #[tokio::test]
    async fn test_read_first_line_without_newline() {
        let storage = StorageProvider::in_memory("bucket");
        storage.put("raw/a.csv", "id,name").await.unwrap();

        let line = storage.read_first_line("raw/a.csv", 1024).await.unwrap();
        assert_eq!(line, "id,name");
    }

    #[tokio::test]
    async fn test_read_first_line_limit() {
        let storage = StorageProvider::in_memory("bucket");
        storage.put("raw/wide.csv", "a".repeat(64)).await.unwrap();

        let err = storage.read_first_line("raw/wide.csv", 16).await.unwrap_err();
        assert!(matches!(err, StorageError::LineTooLong { limit: 16, .. }));
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let storage = StorageProvider::in_memory("bucket");
        let err = storage.read_first_line("raw/none.csv", 16).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::ObjectStore {
                source: object_store::Error::NotFound { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_copy_then_delete() {
        let storage = StorageProvider::in_memory("bucket");
        storage.put("raw/a.csv", "id\n1\n").await.unwrap();

        storage.copy("raw/a.csv", "archive/a.csv").await.unwrap();
        storage.delete("raw/a.csv").await.unwrap();

        assert!(!storage.exists("raw/a.csv").await.unwrap());
        assert!(storage.exists("archive/a.csv").await.unwrap());
    }
}
