pub mod hdfs_reader;
pub mod parallel_reader;
pub mod pipeline;
pub mod reader;
pub mod report;
pub mod s3_reader;
pub mod scanner;
pub mod stats;
pub mod storage;

pub use parqu_common::{
    Config, ErrorKind, FileCandidate, ParqError, Result, StorageScheme,
};
pub use parallel_reader::WorkerPool;
pub use pipeline::{scan, scan_path, ScanOptions, ScanOutcome};
pub use reader::{
    DetailLevel, ExtractionFailure, ExtractionResult, FileMetadataRecord, MetadataReader,
    ReaderOptions, SchemaFieldInfo,
};
pub use report::{format_json, format_report, sort_results, Summary};
pub use scanner::{resolve, PathResolver};
pub use stats::{ColumnChunkStats, RowGroupDetail};
pub use storage::{open_storage, Entry, EntryKind, LocalStorage, ObjectReader, Storage};
