pub mod config;
pub use config::{Config, HdfsConfig, S3Config, ScanConfig};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParqError {
    #[error("path not found: {0}")]
    PathNotFound(String),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("{0}")]
    Format(String),
    #[error("{0}")]
    CorruptFile(String),
    #[error("invalid option: {0}")]
    InvalidOption(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("interrupted")]
    Interrupted,
    #[error("{0}")]
    Other(String),
}

impl ParqError {
    /// user-facing category for a per-file failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParqError::PathNotFound(_) => ErrorKind::PathNotFound,
            ParqError::Permission(_) => ErrorKind::Permission,
            ParqError::Parquet(_) | ParqError::Format(_) => ErrorKind::Format,
            ParqError::CorruptFile(_) => ErrorKind::CorruptFile,
            ParqError::Io(_)
            | ParqError::Storage(_)
            | ParqError::InvalidOption(_)
            | ParqError::Config(_)
            | ParqError::Interrupted
            | ParqError::Other(_) => ErrorKind::Io,
        }
    }

    /// map an io::Error for `location` onto the taxonomy (not found / denied / other)
    pub fn from_io(location: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ParqError::PathNotFound(location.to_owned()),
            std::io::ErrorKind::PermissionDenied => ParqError::Permission(location.to_owned()),
            _ => ParqError::Io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, ParqError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "PathNotFoundError")]
    PathNotFound,
    #[serde(rename = "PermissionError")]
    Permission,
    #[serde(rename = "IOError")]
    Io,
    #[serde(rename = "FormatError")]
    Format,
    #[serde(rename = "CorruptFileError")]
    CorruptFile,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::PathNotFound => "PathNotFoundError",
            ErrorKind::Permission => "PermissionError",
            ErrorKind::Io => "IOError",
            ErrorKind::Format => "FormatError",
            ErrorKind::CorruptFile => "CorruptFileError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageScheme {
    Local,
    S3,
    Hdfs,
}

impl StorageScheme {
    pub fn detect(uri: &str) -> Self {
        if uri.starts_with("s3://") {
            StorageScheme::S3
        } else if uri.starts_with("hdfs://") || uri.starts_with("webhdfs://") {
            StorageScheme::Hdfs
        } else {
            StorageScheme::Local
        }
    }
}

impl fmt::Display for StorageScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StorageScheme::Local => "local",
            StorageScheme::S3 => "s3",
            StorageScheme::Hdfs => "hdfs",
        };
        f.write_str(s)
    }
}

/// a file discovered by the resolver, read exactly once by the metadata reader
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileCandidate {
    pub path: String,
    pub scheme: StorageScheme,
}

impl FileCandidate {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let scheme = StorageScheme::detect(&path);
        Self { path, scheme }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_scheme_from_prefix() {
        assert_eq!(StorageScheme::detect("s3://bucket/key"), StorageScheme::S3);
        assert_eq!(StorageScheme::detect("hdfs://nn:8020/data"), StorageScheme::Hdfs);
        assert_eq!(StorageScheme::detect("webhdfs://nn:9870/data"), StorageScheme::Hdfs);
        assert_eq!(StorageScheme::detect("/tmp/data"), StorageScheme::Local);
        assert_eq!(StorageScheme::detect("file:///tmp/data"), StorageScheme::Local);
    }

    #[test]
    fn io_errors_map_onto_kinds() {
        let nf = ParqError::from_io("x", std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(nf.kind(), ErrorKind::PathNotFound);
        let pd = ParqError::from_io("x", std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert_eq!(pd.kind(), ErrorKind::Permission);
        let other = ParqError::from_io("x", std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert_eq!(other.kind(), ErrorKind::Io);
    }

    #[test]
    fn error_kind_names_match_taxonomy() {
        assert_eq!(ErrorKind::CorruptFile.to_string(), "CorruptFileError");
        assert_eq!(ErrorKind::Io.to_string(), "IOError");
        assert_eq!(
            serde_json::to_string(&ErrorKind::Format).unwrap(),
            "\"FormatError\""
        );
    }
}
