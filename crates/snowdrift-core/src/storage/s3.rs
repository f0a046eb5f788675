//! S3 storage backend.

use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::signer::Signer;
use object_store::{ObjectStore, RetryConfig};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{S3ConfigSnafu, StorageError};

use super::StorageProvider;

/// S3 connection settings.
///
/// Credentials come from the usual `AWS_*` environment variables unless
/// overridden through `options` (any `AmazonS3ConfigKey`, e.g.
/// `aws_access_key_id`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO, Ceph RadosGW).
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl StorageProvider {
    /// Build a provider backed by S3.
    pub fn s3(config: &S3Config) -> Result<Self, StorageError> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&config.bucket);

        for (key, value) in &config.options {
            builder = builder.with_config(key.parse().context(S3ConfigSnafu)?, value.clone());
        }

        builder = builder.with_retry(RetryConfig::default());

        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }

        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false)
                .with_allow_http(true);
        }

        let canonical_url = match (&config.region, &config.endpoint) {
            (_, Some(endpoint)) => format!("s3::{}/{}", endpoint, config.bucket),
            (Some(region), _) => format!("https://s3.{}.amazonaws.com/{}", region, config.bucket),
            _ => format!("s3://{}", config.bucket),
        };

        let s3: Arc<AmazonS3> = Arc::new(builder.build().context(S3ConfigSnafu)?);
        let object_store: Arc<dyn ObjectStore> = s3.clone();
        let signer: Arc<dyn Signer> = s3;

        Ok(Self {
            bucket: config.bucket.clone(),
            object_store,
            signer: Some(signer),
            canonical_url,
        })
    }
}
