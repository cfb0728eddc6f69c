use parqu_common::{Config, Result};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::parallel_reader::WorkerPool;
use crate::reader::{DetailLevel, ExtractionResult, MetadataReader, ReaderOptions};
use crate::scanner::resolve;
use crate::storage::{open_storage, Storage};

/// Everything one scan needs, resolved from CLI flags over config defaults.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub root: String,
    pub pattern: String,
    pub recurse: bool,
    pub pool: usize,
    pub max_pool: usize,
    pub check: bool,
    pub detail: DetailLevel,
    pub footer_prefetch_bytes: u64,
}

impl ScanOptions {
    pub fn from_config(root: impl Into<String>, config: &Config) -> Self {
        Self {
            root: root.into(),
            pattern: config.scan.pattern.clone(),
            recurse: false,
            pool: config.scan.pool,
            max_pool: config.scan.max_pool,
            check: false,
            detail: DetailLevel::Summary,
            footer_prefetch_bytes: config.scan.footer_prefetch_bytes,
        }
    }
}

#[derive(Debug)]
pub struct ScanOutcome {
    pub results: Vec<ExtractionResult>,
    /// directories that could not be listed and were skipped
    pub skipped: usize,
}

/// resolve, then read every candidate on the pool; only setup errors are returned as `Err`
pub fn scan(
    storage: Arc<dyn Storage>,
    options: &ScanOptions,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<ScanOutcome> {
    let mut pool = WorkerPool::new(options.pool, options.max_pool)?;
    let resolver = resolve(
        Arc::clone(&storage),
        &options.root,
        &options.pattern,
        options.recurse,
    )?;
    if let Some(flag) = cancel {
        pool = pool.with_cancel_flag(flag);
    }
    let scheme = storage.scheme();
    let reader = MetadataReader::new(
        storage,
        ReaderOptions {
            check: options.check,
            detail: options.detail,
            footer_prefetch_bytes: options.footer_prefetch_bytes,
        },
    );
    let results = pool.run(resolver.iter(), &reader)?;
    tracing::debug!(
        "finished collecting {} objects from {} file system",
        results.len(),
        scheme
    );
    Ok(ScanOutcome {
        results,
        skipped: resolver.skipped(),
    })
}

/// `scan` with the backend picked from the root's URI scheme
pub fn scan_path(
    options: &ScanOptions,
    config: &Config,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<ScanOutcome> {
    let storage = open_storage(&options.root, config)?;
    scan(storage, options, cancel)
}
