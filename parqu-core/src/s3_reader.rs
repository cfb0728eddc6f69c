use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::Client;
use bytes::Bytes;
use parqu_common::{ParqError, Result, S3Config, StorageScheme};
use std::ops::Range;
use std::time::Duration;
use tokio::runtime::Runtime;

use crate::storage::{check_range, Entry, EntryKind, ObjectReader, Storage};

/// parsed s3:// URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Uri {
    pub bucket: String,
    pub key: String,
}

pub fn parse_s3_uri(uri: &str) -> Option<S3Uri> {
    let stripped = uri.strip_prefix("s3://")?;
    let (bucket, key) = match stripped.split_once('/') {
        Some((b, k)) => (b, k),
        None => (stripped, ""),
    };
    if bucket.is_empty() {
        return None;
    }
    Some(S3Uri {
        bucket: bucket.to_owned(),
        key: key.to_owned(),
    })
}

/// S3 backend; the SDK is async so each call is driven on an owned runtime
pub struct S3Storage {
    runtime: Runtime,
    client: Client,
}

fn sdk_error<E, R>(uri: &str, err: SdkError<E, R>) -> ParqError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match err.code() {
        Some("AccessDenied") | Some("Forbidden") => ParqError::Permission(uri.to_owned()),
        Some("NoSuchKey") | Some("NoSuchBucket") | Some("NotFound") => {
            ParqError::PathNotFound(uri.to_owned())
        }
        _ => {
            let detail = err
                .message()
                .map(str::to_owned)
                .unwrap_or_else(|| format!("{err}"));
            ParqError::Storage(format!("{uri}: {detail}"))
        }
    }
}

impl S3Storage {
    pub fn connect(cfg: &S3Config) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &cfg.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(profile) = &cfg.profile {
            loader = loader.profile_name(profile);
        }
        loader = loader.timeout_config(
            TimeoutConfig::builder()
                .operation_timeout(Duration::from_secs(cfg.timeout_secs))
                .build(),
        );
        let shared = runtime.block_on(loader.load());
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(ep) = &cfg.endpoint_url {
            builder = builder.endpoint_url(ep).force_path_style(true);
        }
        let client = Client::from_conf(builder.build());
        tracing::debug!(endpoint = ?cfg.endpoint_url, "S3 client ready");
        Ok(Self { runtime, client })
    }

    fn parse(&self, uri: &str) -> Result<S3Uri> {
        parse_s3_uri(uri).ok_or_else(|| ParqError::InvalidOption(format!("invalid S3 URI: {uri}")))
    }

    fn head_size(&self, uri: &S3Uri, location: &str) -> Result<Option<u64>> {
        let resp = self.runtime.block_on(
            self.client
                .head_object()
                .bucket(&uri.bucket)
                .key(&uri.key)
                .send(),
        );
        match resp {
            Ok(head) => Ok(Some(head.content_length().unwrap_or(0).max(0) as u64)),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(None),
            Err(e) => Err(sdk_error(location, e)),
        }
    }

    /// list one "directory" level: objects directly under `prefix` plus common prefixes
    fn list_level(&self, uri: &S3Uri) -> Result<Vec<Entry>> {
        let prefix = if uri.key.is_empty() || uri.key.ends_with('/') {
            uri.key.clone()
        } else {
            format!("{}/", uri.key)
        };
        self.runtime.block_on(async {
            let mut out = Vec::new();
            let mut paginator = self
                .client
                .list_objects_v2()
                .bucket(&uri.bucket)
                .prefix(&prefix)
                .delimiter("/")
                .into_paginator()
                .send();
            while let Some(page) = paginator.next().await {
                let page = page.map_err(|e| sdk_error(&format!("s3://{}/{prefix}", uri.bucket), e))?;
                for cp in page.common_prefixes() {
                    if let Some(p) = cp.prefix() {
                        let trimmed = p.trim_end_matches('/');
                        out.push(Entry {
                            location: format!("s3://{}/{trimmed}", uri.bucket),
                            name: trimmed.rsplit('/').next().unwrap_or(trimmed).to_owned(),
                            kind: EntryKind::Directory,
                            size: None,
                        });
                    }
                }
                for obj in page.contents() {
                    let Some(key) = obj.key() else { continue };
                    // directory marker objects created by console uploads
                    if key.ends_with('/') {
                        continue;
                    }
                    out.push(Entry {
                        location: format!("s3://{}/{key}", uri.bucket),
                        name: key.rsplit('/').next().unwrap_or(key).to_owned(),
                        kind: EntryKind::File,
                        size: obj.size().map(|s| s.max(0) as u64),
                    });
                }
            }
            Ok::<_, ParqError>(out)
        })
    }

    fn has_children(&self, uri: &S3Uri, location: &str) -> Result<bool> {
        let prefix = format!("{}/", uri.key.trim_end_matches('/'));
        let resp = self
            .runtime
            .block_on(
                self.client
                    .list_objects_v2()
                    .bucket(&uri.bucket)
                    .prefix(&prefix)
                    .max_keys(1)
                    .send(),
            )
            .map_err(|e| sdk_error(location, e))?;
        Ok(resp.key_count().unwrap_or(0) > 0 || !resp.contents().is_empty())
    }
}

impl Storage for S3Storage {
    fn scheme(&self) -> StorageScheme {
        StorageScheme::S3
    }

    fn stat(&self, location: &str) -> Result<Option<Entry>> {
        let uri = self.parse(location)?;
        let name = uri.key.trim_end_matches('/').rsplit('/').next().unwrap_or("").to_owned();
        // bucket root is always a directory
        if uri.key.is_empty() {
            return Ok(Some(Entry {
                location: location.to_owned(),
                name: uri.bucket.clone(),
                kind: EntryKind::Directory,
                size: None,
            }));
        }
        if !uri.key.ends_with('/') {
            if let Some(size) = self.head_size(&uri, location)? {
                return Ok(Some(Entry {
                    location: location.to_owned(),
                    name,
                    kind: EntryKind::File,
                    size: Some(size),
                }));
            }
        }
        if self.has_children(&uri, location)? {
            return Ok(Some(Entry {
                location: location.trim_end_matches('/').to_owned(),
                name,
                kind: EntryKind::Directory,
                size: None,
            }));
        }
        Ok(None)
    }

    fn list(&self, location: &str) -> Result<Vec<Entry>> {
        let uri = self.parse(location)?;
        self.list_level(&uri)
    }

    fn open(&self, location: &str) -> Result<Box<dyn ObjectReader + '_>> {
        let uri = self.parse(location)?;
        let size = self
            .head_size(&uri, location)?
            .ok_or_else(|| ParqError::PathNotFound(location.to_owned()))?;
        Ok(Box::new(S3ObjectReader {
            storage: self,
            location: location.to_owned(),
            uri,
            size,
        }))
    }
}

struct S3ObjectReader<'a> {
    storage: &'a S3Storage,
    location: String,
    uri: S3Uri,
    size: u64,
}

impl ObjectReader for S3ObjectReader<'_> {
    fn size(&self) -> u64 {
        self.size
    }

    /// ranged GetObject, so only the requested bytes cross the network
    fn read_range(&mut self, range: Range<u64>) -> Result<Bytes> {
        check_range(&self.location, &range, self.size)?;
        if range.start == range.end {
            return Ok(Bytes::new());
        }
        let range_header = format!("bytes={}-{}", range.start, range.end - 1);
        let location = self.location.as_str();
        let client = &self.storage.client;
        self.storage.runtime.block_on(async {
            let resp = client
                .get_object()
                .bucket(&self.uri.bucket)
                .key(&self.uri.key)
                .range(range_header)
                .send()
                .await
                .map_err(|e| sdk_error(location, e))?;
            let data = resp
                .body
                .collect()
                .await
                .map_err(|e| ParqError::Storage(format!("{location}: {e}")))?;
            Ok::<_, ParqError>(data.into_bytes())
        })
    }
}
