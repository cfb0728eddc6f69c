use bytes::Bytes;
use parqu_common::{HdfsConfig, ParqError, Result, StorageScheme};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::ops::Range;
use std::time::Duration;

use crate::storage::{check_range, Entry, EntryKind, ObjectReader, Storage};

/// parsed hdfs:// or webhdfs:// URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdfsUri {
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    /// true for webhdfs://, where the port already points at the HTTP endpoint
    pub is_webhdfs: bool,
}

pub fn parse_hdfs_uri(uri: &str) -> Option<HdfsUri> {
    let (rest, is_webhdfs) = if let Some(r) = uri.strip_prefix("hdfs://") {
        (r, false)
    } else {
        (uri.strip_prefix("webhdfs://")?, true)
    };
    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) => (h, Some(p.parse().ok()?)),
        None => (authority, None),
    };
    if host.is_empty() {
        return None;
    }
    let path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };
    Some(HdfsUri {
        host: host.to_owned(),
        port,
        path: path.to_owned(),
        is_webhdfs,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileStatus {
    path_suffix: String,
    #[serde(rename = "type")]
    kind: String,
    length: u64,
}

#[derive(Debug, Deserialize)]
struct FileStatusResponse {
    #[serde(rename = "FileStatus")]
    file_status: FileStatus,
}

#[derive(Debug, Deserialize)]
struct FileStatusList {
    #[serde(rename = "FileStatus")]
    file_status: Vec<FileStatus>,
}

#[derive(Debug, Deserialize)]
struct ListStatusResponse {
    #[serde(rename = "FileStatuses")]
    file_statuses: FileStatusList,
}

/// HDFS backend over the WebHDFS REST API
pub struct WebHdfsStorage {
    client: Client,
    config: HdfsConfig,
}

impl WebHdfsStorage {
    pub fn new(config: &HdfsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ParqError::Storage(format!("WebHDFS client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn parse(&self, location: &str) -> Result<HdfsUri> {
        parse_hdfs_uri(location)
            .ok_or_else(|| ParqError::InvalidOption(format!("invalid HDFS URI: {location}")))
    }

    /// REST endpoint for `uri`; path segments and query values are percent-encoded
    pub fn endpoint(&self, uri: &HdfsUri, op: &str, extra: &[(&str, String)]) -> Result<Url> {
        let port = if uri.is_webhdfs {
            uri.port.unwrap_or(self.config.webhdfs_port)
        } else {
            // hdfs:// carries the namenode RPC port, which the REST API does not listen on
            self.config.webhdfs_port
        };
        let proto = if self.config.https { "https" } else { "http" };
        let invalid = |detail: String| {
            ParqError::InvalidOption(format!("invalid HDFS host {}: {detail}", uri.host))
        };
        let mut url = Url::parse(&format!("{proto}://{}:{port}/webhdfs/v1", uri.host))
            .map_err(|e| invalid(e.to_string()))?;
        let segments: Vec<&str> = uri.path.split('/').filter(|s| !s.is_empty()).collect();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| invalid("not a base URL".into()))?;
            if segments.is_empty() {
                path.push("");
            } else {
                path.extend(segments);
            }
        }
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("op", op);
            if let Some(user) = &self.config.user {
                query.append_pair("user.name", user);
            }
            for (k, v) in extra {
                query.append_pair(k, v);
            }
        }
        Ok(url)
    }

    fn child_location(location: &str, name: &str) -> String {
        format!("{}/{name}", location.trim_end_matches('/'))
    }

    fn get(&self, url: Url, location: &str) -> Result<Option<reqwest::blocking::Response>> {
        tracing::trace!(%url, "WebHDFS request");
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| ParqError::Storage(format!("{location}: {e}")))?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ParqError::Permission(location.to_owned()))
            }
            s if !s.is_success() => Err(ParqError::Storage(format!(
                "{location}: WebHDFS returned HTTP {s}"
            ))),
            _ => Ok(Some(resp)),
        }
    }

    fn file_status(&self, location: &str) -> Result<Option<FileStatus>> {
        let uri = self.parse(location)?;
        let url = self.endpoint(&uri, "GETFILESTATUS", &[])?;
        let Some(resp) = self.get(url, location)? else {
            return Ok(None);
        };
        let body: FileStatusResponse = resp
            .json()
            .map_err(|e| ParqError::Storage(format!("{location}: {e}")))?;
        Ok(Some(body.file_status))
    }
}

fn entry_kind(status: &FileStatus) -> EntryKind {
    if status.kind == "DIRECTORY" {
        EntryKind::Directory
    } else {
        EntryKind::File
    }
}

impl Storage for WebHdfsStorage {
    fn scheme(&self) -> StorageScheme {
        StorageScheme::Hdfs
    }

    fn stat(&self, location: &str) -> Result<Option<Entry>> {
        let Some(status) = self.file_status(location)? else {
            return Ok(None);
        };
        let kind = entry_kind(&status);
        let uri = self.parse(location)?;
        Ok(Some(Entry {
            location: location.trim_end_matches('/').to_owned(),
            name: uri.path.rsplit('/').next().unwrap_or("").to_owned(),
            kind,
            size: (kind == EntryKind::File).then_some(status.length),
        }))
    }

    fn list(&self, location: &str) -> Result<Vec<Entry>> {
        let uri = self.parse(location)?;
        let url = self.endpoint(&uri, "LISTSTATUS", &[])?;
        let resp = self
            .get(url, location)?
            .ok_or_else(|| ParqError::PathNotFound(location.to_owned()))?;
        let body: ListStatusResponse = resp
            .json()
            .map_err(|e| ParqError::Storage(format!("{location}: {e}")))?;
        Ok(body
            .file_statuses
            .file_status
            .into_iter()
            .map(|s| {
                let kind = entry_kind(&s);
                Entry {
                    location: Self::child_location(location, &s.path_suffix),
                    kind,
                    size: (kind == EntryKind::File).then_some(s.length),
                    name: s.path_suffix,
                }
            })
            .collect())
    }

    fn open(&self, location: &str) -> Result<Box<dyn ObjectReader + '_>> {
        let status = self
            .file_status(location)?
            .ok_or_else(|| ParqError::PathNotFound(location.to_owned()))?;
        let uri = self.parse(location)?;
        Ok(Box::new(WebHdfsReader {
            storage: self,
            location: location.to_owned(),
            uri,
            size: status.length,
        }))
    }
}

struct WebHdfsReader<'a> {
    storage: &'a WebHdfsStorage,
    location: String,
    uri: HdfsUri,
    size: u64,
}

impl ObjectReader for WebHdfsReader<'_> {
    fn size(&self) -> u64 {
        self.size
    }

    /// OPEN with offset/length; the namenode redirects to a datanode, which reqwest follows
    fn read_range(&mut self, range: Range<u64>) -> Result<Bytes> {
        check_range(&self.location, &range, self.size)?;
        if range.start == range.end {
            return Ok(Bytes::new());
        }
        let url = self.storage.endpoint(
            &self.uri,
            "OPEN",
            &[
                ("offset", range.start.to_string()),
                ("length", (range.end - range.start).to_string()),
            ],
        )?;
        let resp = self
            .storage
            .get(url, &self.location)?
            .ok_or_else(|| ParqError::PathNotFound(self.location.clone()))?;
        resp.bytes()
            .map_err(|e| ParqError::Storage(format!("{}: {e}", self.location)))
    }
}
