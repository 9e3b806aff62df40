//! Derives storage URIs and issues time-limited download URLs against the
//! blob store (C3). Backed by S3; the bucket and key prefix come from
//! `BlobConfig`, the client from `aws-config`'s standard credential chain.

use std::collections::BTreeMap;
use std::time::Duration;

use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use uuid::Uuid;

use crate::config::BlobConfig;
use crate::{Error, Result};

const MAX_LISTING_ENTRIES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLocation {
    pub scheme: String,
    pub uri: String,
}

pub struct BlobLocator {
    client: Client,
    bucket: String,
    prefix: String,
    default_ttl: Duration,
}

impl BlobLocator {
    pub fn new(client: Client, config: &BlobConfig) -> Self {
        Self {
            client,
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
            default_ttl: Duration::from_secs(config.default_presign_ttl_secs),
        }
    }

    /// Derive a fresh-per-attempt storage location for a job (spec §4.3 /
    /// §6.3): `s3://<bucket>/<prefix>/<class-lowercased>/<jobId>/<millis>`.
    pub fn storage_for(&self, class: &str, job_id: Uuid, now_millis: i64) -> StorageLocation {
        let uri = format!(
            "s3://{}/{}/{}/{}/{}",
            self.bucket,
            self.prefix,
            class.to_lowercase(),
            job_id,
            now_millis
        );
        StorageLocation {
            scheme: "S3".to_string(),
            uri,
        }
    }

    /// List every object under `uri`'s prefix and presign a GET URL for
    /// each, keyed by its path relative to `uri`. Caps the listing at 10
    /// entries; more is a VALIDATION error (spec §4.3, §6.3).
    pub async fn presign_list(
        &self,
        uri: &str,
        ttl: Option<Duration>,
    ) -> Result<BTreeMap<String, String>> {
        let (bucket, key_prefix) = parse_s3_uri(uri)?;
        let ttl = ttl.unwrap_or(self.default_ttl);

        let listing = self
            .client
            .list_objects_v2()
            .bucket(&bucket)
            .prefix(&key_prefix)
            .max_keys((MAX_LISTING_ENTRIES + 1) as i32)
            .send()
            .await
            .map_err(|e| Error::transient(format!("failed to list objects: {}", e)))?;

        let objects = listing.contents();
        if objects.len() > MAX_LISTING_ENTRIES {
            return Err(Error::validation(format!(
                "listing under {} exceeds the {}-entry cap",
                uri, MAX_LISTING_ENTRIES
            )));
        }

        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| Error::validation(format!("invalid ttl: {}", e)))?;

        let mut files = BTreeMap::new();
        for object in objects {
            let Some(key) = object.key() else { continue };
            let relative = key
                .strip_prefix(&key_prefix)
                .unwrap_or(key)
                .trim_start_matches('/')
                .to_string();

            let presigned = self
                .client
                .get_object()
                .bucket(&bucket)
                .key(key)
                .presigned(presigning.clone())
                .await
                .map_err(|e| Error::transient(format!("failed to presign {}: {}", key, e)))?;

            files.insert(relative, presigned.uri().to_string());
        }

        Ok(files)
    }
}

/// Parse `s3://bucket/key/prefix` into its (bucket, key-prefix) parts.
fn parse_s3_uri(uri: &str) -> Result<(String, String)> {
    let rest = uri
        .strip_prefix("s3://")
        .ok_or_else(|| Error::validation(format!("not an s3 uri: {}", uri)))?;

    let mut parts = rest.splitn(2, '/');
    let bucket = parts
        .next()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| Error::validation(format!("missing bucket in uri: {}", uri)))?;
    let key_prefix = parts.next().unwrap_or("").to_string();

    Ok((bucket.to_string(), key_prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_for_lowercases_the_class_and_embeds_timestamp() {
        let config = BlobConfig {
            bucket: "artifacts".to_string(),
            prefix: "jobs".to_string(),
            region: "us-east-1".to_string(),
            default_presign_ttl_secs: 3600,
        };
        let job_id = Uuid::new_v4();

        // storage_for doesn't touch the network, so a client built without a
        // live connection is fine for this assertion.
        let shared_config = aws_config::SdkConfig::builder().build();
        let client = Client::new(&shared_config);
        let locator = BlobLocator::new(client, &config);

        let location = locator.storage_for("CRITERIA_POLYGONS", job_id, 1_700_000_000_000);
        assert_eq!(location.scheme, "S3");
        assert_eq!(
            location.uri,
            format!(
                "s3://artifacts/jobs/criteria_polygons/{}/1700000000000",
                job_id
            )
        );
    }

    #[test]
    fn parse_s3_uri_splits_bucket_and_prefix() {
        let (bucket, prefix) = parse_s3_uri("s3://artifacts/jobs/test/abc/123").unwrap();
        assert_eq!(bucket, "artifacts");
        assert_eq!(prefix, "jobs/test/abc/123");
    }

    #[test]
    fn parse_s3_uri_rejects_non_s3_scheme() {
        assert!(parse_s3_uri("https://example.com/x").is_err());
    }
}
