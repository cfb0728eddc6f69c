use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default = "default_pool")]
    pub pool: usize,
    #[serde(default = "default_max_pool")]
    pub max_pool: usize,
    #[serde(default = "default_footer_prefetch")]
    pub footer_prefetch_bytes: u64,
}

fn default_pattern() -> String {
    "*.parquet".into()
}
fn default_pool() -> usize {
    8
}
fn default_max_pool() -> usize {
    64
}
fn default_footer_prefetch() -> u64 {
    64 * 1024
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            pool: default_pool(),
            max_pool: default_max_pool(),
            footer_prefetch_bytes: default_footer_prefetch(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub region: Option<String>,
    pub profile: Option<String>,
    pub endpoint_url: Option<String>, // minio / localstack; forces path-style addressing
    /// upper bound on one S3 operation including retries
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: None,
            profile: None,
            endpoint_url: None,
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HdfsConfig {
    #[serde(default = "default_webhdfs_port")]
    pub webhdfs_port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub https: bool,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_webhdfs_port() -> u16 {
    9870
}
fn default_timeout() -> u64 {
    30
}

impl Default for HdfsConfig {
    fn default() -> Self {
        Self {
            webhdfs_port: default_webhdfs_port(),
            user: None,
            https: false,
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub s3: S3Config,
    #[serde(default)]
    pub hdfs: HdfsConfig,
}

impl Config {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parqu")
            .join("config.toml")
    }

    pub fn load() -> crate::Result<Self> {
        let path = if let Ok(env_path) = std::env::var("PARQU_CONFIG") {
            PathBuf::from(env_path) // $PARQU_CONFIG overrides default config path
        } else {
            Self::config_path()
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::ParqError::Config(format!("{}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| crate::ParqError::Config(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let cfg: Config = toml::from_str("[s3]\nregion = \"eu-west-1\"\n").unwrap();
        assert_eq!(cfg.scan.pattern, "*.parquet");
        assert_eq!(cfg.scan.pool, 8);
        assert_eq!(cfg.hdfs.webhdfs_port, 9870);
        assert_eq!(cfg.s3.region.as_deref(), Some("eu-west-1"));
        assert_eq!(cfg.s3.timeout_secs, 30);
    }

    #[test]
    fn s3_timeout_is_configurable() {
        let cfg: Config = toml::from_str("[s3]\ntimeout_secs = 5\n").unwrap();
        assert_eq!(cfg.s3.timeout_secs, 5);
        assert_eq!(Config::default().s3.timeout_secs, 30);
    }

    #[test]
    fn load_from_reads_overrides() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "[scan]\npool = 3\nmax_pool = 4\n[hdfs]\nuser = \"etl\"").unwrap();
        let cfg = Config::load_from(tmp.path()).unwrap();
        assert_eq!(cfg.scan.pool, 3);
        assert_eq!(cfg.scan.max_pool, 4);
        assert_eq!(cfg.scan.footer_prefetch_bytes, 64 * 1024);
        assert_eq!(cfg.hdfs.user.as_deref(), Some("etl"));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "[scan\npool = ").unwrap();
        let err = Config::load_from(tmp.path()).unwrap_err();
        assert!(matches!(err, crate::ParqError::Config(_)));
    }
}
