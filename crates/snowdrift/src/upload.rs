//! Presigned upload URLs for the landing prefix.
//!
//! Clients upload a file straight to `<prefix>/<filename>` with an HTTP PUT
//! against the returned URL; the next run discovers it like any other file.

use snafu::prelude::*;
use std::time::Duration;
use tracing::info;

use snowdrift_core::StorageProviderRef;

use crate::config::Config;
use crate::discovery::extension_of;
use crate::error::{InvalidFilenameSnafu, UploadError, UploadUrlSnafu};

/// How long an upload URL stays valid unless asked otherwise.
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(600);

/// A signed PUT URL and the key it writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUpload {
    pub key: String,
    pub url: String,
    pub expires_in: Duration,
}

/// Issues upload URLs for keys under the active prefix.
pub struct Uploads {
    storage: StorageProviderRef,
    prefix: String,
    extensions: Vec<String>,
}

impl Uploads {
    pub fn new(storage: StorageProviderRef, config: &Config) -> Self {
        Self {
            storage,
            prefix: config.storage.prefix.clone(),
            extensions: config.discovery.extensions.clone(),
        }
    }

    /// Key a file name lands at. Only names discovery would pick up are
    /// accepted, and they may not leave the prefix.
    pub fn key_for(&self, filename: &str) -> Result<String, UploadError> {
        let invalid = |reason: &str| {
            InvalidFilenameSnafu {
                filename,
                reason: reason.to_string(),
            }
            .fail()
        };

        if filename.trim().is_empty() {
            return invalid("name is empty");
        }
        if filename.starts_with('/') || filename.contains('\\') {
            return invalid("name must be a relative path");
        }
        if filename
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return invalid("name has an empty or relative path segment");
        }

        match extension_of(filename) {
            Some(ext) if self.extensions.contains(&ext) => {}
            _ => {
                return invalid(&format!(
                    "extension must be one of: {}",
                    self.extensions.join(", ")
                ));
            }
        }

        Ok(if self.prefix.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{filename}", self.prefix)
        })
    }

    pub async fn upload_url(
        &self,
        filename: &str,
        expires_in: Duration,
    ) -> Result<PresignedUpload, UploadError> {
        let key = self.key_for(filename)?;
        let url = self
            .storage
            .signed_put_url(&key, expires_in)
            .await
            .context(UploadUrlSnafu { key: &key })?;

        info!(key = %key, expires_secs = expires_in.as_secs(), "Issued upload URL");
        Ok(PresignedUpload {
            key,
            url,
            expires_in,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use snowdrift_core::StorageProvider;
    use snowdrift_core::storage::S3Config;
    use std::collections::HashMap;
    use std::sync::Arc;

    const CONFIG: &str = r#"
storage:
  bucket: landing
  prefix: raw_data
  archive_prefix: archive
discovery:
  extensions: [csv, txt]
warehouse:
  account: myorg-acct
  database: DB
  schema: RAW
  token: secret
objects:
  stage: landing_stage
integration:
  role_arn: arn:aws:iam::123456789012:role/loader
  external_id: ext-1
  allowed_locations: ["s3://landing/raw_data/"]
"#;

    fn config() -> Config {
        Config::parse_with(CONFIG, |_| None).unwrap()
    }

    fn uploads(storage: StorageProvider) -> Uploads {
        Uploads::new(Arc::new(storage), &config())
    }

    fn reason(err: UploadError) -> String {
        match err {
            UploadError::InvalidFilename { reason, .. } => reason,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_key_under_prefix() {
        let uploads = uploads(StorageProvider::in_memory("landing"));
        assert_eq!(uploads.key_for("orders.csv").unwrap(), "raw_data/orders.csv");
        assert_eq!(uploads.key_for("2024/Orders.TXT").unwrap(), "raw_data/2024/Orders.TXT");
    }

    #[test]
    fn test_key_rejects_paths_leaving_prefix() {
        let uploads = uploads(StorageProvider::in_memory("landing"));
        assert!(reason(uploads.key_for("").unwrap_err()).contains("empty"));
        assert!(reason(uploads.key_for("/etc/a.csv").unwrap_err()).contains("relative"));
        assert!(reason(uploads.key_for("../archive/a.csv").unwrap_err()).contains("segment"));
        assert!(reason(uploads.key_for("a//b.csv").unwrap_err()).contains("segment"));
    }

    #[test]
    fn test_key_rejects_undiscoverable_extension() {
        let uploads = uploads(StorageProvider::in_memory("landing"));
        let reason = reason(uploads.key_for("notes.md").unwrap_err());
        assert_eq!(reason, "extension must be one of: csv, txt");
    }

    #[tokio::test]
    async fn test_upload_url_is_signed_for_key() {
        let config = config();
        let storage = StorageProvider::s3(&S3Config {
            bucket: "landing".to_string(),
            region: Some("us-east-1".to_string()),
            endpoint: None,
            options: HashMap::from([
                ("aws_access_key_id".to_string(), "AKIDEXAMPLE".to_string()),
                ("aws_secret_access_key".to_string(), "secret".to_string()),
            ]),
        })
        .unwrap();
        let uploads = Uploads::new(Arc::new(storage), &config);

        let upload = uploads.upload_url("orders.csv", DEFAULT_EXPIRY).await.unwrap();

        assert_eq!(upload.key, "raw_data/orders.csv");
        assert!(upload.url.contains("/landing/raw_data/orders.csv?"));
        assert!(upload.url.contains("X-Amz-Expires=600"));
        assert!(upload.url.contains("X-Amz-Signature="));
    }

    #[tokio::test]
    async fn test_upload_url_needs_signing_store() {
        let uploads = uploads(StorageProvider::in_memory("landing"));
        let err = uploads.upload_url("orders.csv", DEFAULT_EXPIRY).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::UploadUrl {
                source: StorageError::SigningUnsupported { .. },
                ..
            }
        ));
    }
}
