use bytes::Bytes;
use parquet::file::metadata::{ParquetMetaData, ParquetMetaDataReader};
use parqu_common::{ErrorKind, FileCandidate, ParqError, Result, StorageScheme};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::stats::{read_row_group_details, RowGroupDetail};
use crate::storage::{ObjectReader, Storage};

const MAGIC: &[u8; 4] = b"PAR1";
/// 4-byte metadata length followed by the trailing magic
const FOOTER_SIZE: u64 = 8;
/// leading magic + trailer: the smallest possible parquet file
const MIN_FILE_SIZE: u64 = 12;

/// How much of the report to gather; statistics are only collected at `Full`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DetailLevel {
    Names = 0,
    Summary = 1,
    Full = 2,
}

impl TryFrom<u8> for DetailLevel {
    type Error = ParqError;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            0 => Ok(DetailLevel::Names),
            1 => Ok(DetailLevel::Summary),
            2 => Ok(DetailLevel::Full),
            other => Err(ParqError::InvalidOption(format!(
                "details must be 0, 1 or 2, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaFieldInfo {
    pub name: String,
    pub physical_type: String,
    pub logical_type: Option<String>,
    pub repetition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadataRecord {
    pub path: String,
    pub scheme: StorageScheme,
    pub file_size: u64,
    pub format_version: i32,
    pub created_by: Option<String>,
    pub num_row_groups: usize,
    pub num_rows: i64,
    pub num_columns: usize,
    pub schema: Vec<SchemaFieldInfo>,
    pub compressed_size: i64,
    pub uncompressed_size: i64,
    pub key_value_metadata: Vec<(String, Option<String>)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_groups: Option<Vec<RowGroupDetail>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionFailure {
    pub path: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// outcome of reading one candidate; exactly one per candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "result")]
pub enum ExtractionResult {
    #[serde(rename = "OK")]
    Ok(FileMetadataRecord),
    #[serde(rename = "Error")]
    Err(ExtractionFailure),
}

impl ExtractionResult {
    pub fn path(&self) -> &str {
        match self {
            ExtractionResult::Ok(r) => &r.path,
            ExtractionResult::Err(f) => &f.path,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ExtractionResult::Ok(_))
    }

    pub fn failure(path: &str, err: &ParqError) -> Self {
        ExtractionResult::Err(ExtractionFailure {
            path: path.to_owned(),
            kind: err.kind(),
            message: err.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {
    pub check: bool,
    pub detail: DetailLevel,
    pub footer_prefetch_bytes: u64,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            check: false,
            detail: DetailLevel::Summary,
            footer_prefetch_bytes: 64 * 1024,
        }
    }
}

/// Reads the footer of one file at a time; shared by all pool workers.
pub struct MetadataReader {
    storage: Arc<dyn Storage>,
    options: ReaderOptions,
}

/// footer problems in a file that carries the parquet trailer
fn structural(check: bool, msg: String) -> ParqError {
    if check {
        ParqError::CorruptFile(msg)
    } else {
        ParqError::Format(msg)
    }
}

/// storage failures while reading are I/O errors whatever their cause
fn io_failure(err: ParqError) -> ParqError {
    match err {
        ParqError::Io(_) | ParqError::Storage(_) => err,
        other => ParqError::Storage(other.to_string()),
    }
}

impl MetadataReader {
    pub fn new(storage: Arc<dyn Storage>, options: ReaderOptions) -> Self {
        Self { storage, options }
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// never fails: every error is folded into `ExtractionResult::Err`
    pub fn read(&self, candidate: &FileCandidate) -> ExtractionResult {
        tracing::debug!("opening {}", candidate.path);
        match self.read_record(candidate) {
            Ok(record) => ExtractionResult::Ok(record),
            Err(e) => {
                tracing::error!("cannot process [{}]: {e}", candidate.path);
                ExtractionResult::failure(&candidate.path, &e)
            }
        }
    }

    /// a panic while decoding a hostile footer is reported against that file only
    fn read_record(&self, candidate: &FileCandidate) -> Result<FileMetadataRecord> {
        panic::catch_unwind(AssertUnwindSafe(|| self.extract(candidate))).unwrap_or_else(
            |payload| {
                let msg = panic_message(&*payload);
                Err(structural(
                    self.options.check,
                    format!("footer metadata could not be decoded: {msg}"),
                ))
            },
        )
    }

    fn extract(&self, candidate: &FileCandidate) -> Result<FileMetadataRecord> {
        let mut object = self.storage.open(&candidate.path).map_err(io_failure)?;
        let file_size = object.size();
        let (meta, metadata_start) = self.read_footer(object.as_mut(), file_size)?;
        if self.options.check {
            validate(object.as_mut(), &meta, file_size, metadata_start)?;
        }
        Ok(build_record(candidate, file_size, &meta, self.options.detail))
    }

    /// returns the decoded metadata and the offset where the metadata block begins
    fn read_footer(&self, object: &mut dyn ObjectReader, file_size: u64) -> Result<(ParquetMetaData, u64)> {
        let check = self.options.check;
        if file_size < MIN_FILE_SIZE {
            return Err(ParqError::Format(format!(
                "file is {file_size} bytes, too small to be parquet"
            )));
        }
        // one tail read usually covers the whole footer
        let prefetch = self.options.footer_prefetch_bytes.clamp(FOOTER_SIZE, file_size);
        let tail = object
            .read_range(file_size - prefetch..file_size)
            .map_err(io_failure)?;
        if tail.len() as u64 != prefetch {
            return Err(ParqError::Storage(format!(
                "short read: wanted {prefetch} bytes from end of file, got {}",
                tail.len()
            )));
        }
        let trailer = &tail[tail.len() - FOOTER_SIZE as usize..];
        if &trailer[4..] != MAGIC {
            return Err(ParqError::Format(
                "missing PAR1 magic at end of file, not a parquet file".into(),
            ));
        }
        let metadata_len = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]) as u64;
        if metadata_len + MIN_FILE_SIZE > file_size {
            return Err(structural(
                check,
                format!("footer length {metadata_len} exceeds file size {file_size}"),
            ));
        }
        let metadata_start = file_size - FOOTER_SIZE - metadata_len;
        let metadata: Bytes = if metadata_len + FOOTER_SIZE <= prefetch {
            let from = (prefetch - FOOTER_SIZE - metadata_len) as usize;
            tail.slice(from..from + metadata_len as usize)
        } else {
            tracing::debug!("footer of {metadata_len} bytes larger than prefetch, second read");
            object
                .read_range(metadata_start..file_size - FOOTER_SIZE)
                .map_err(io_failure)?
        };
        let meta = ParquetMetaDataReader::decode_metadata(&metadata)
            .map_err(|e| structural(check, format!("cannot decode footer metadata: {e}")))?;
        Ok((meta, metadata_start))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("decoder panicked")
}

/// integrity checks run with `--check`; any violation is a corrupt file
fn validate(
    object: &mut dyn ObjectReader,
    meta: &ParquetMetaData,
    file_size: u64,
    metadata_start: u64,
) -> Result<()> {
    let head = object.read_range(0..4).map_err(io_failure)?;
    if &head[..] != MAGIC {
        return Err(ParqError::CorruptFile("missing PAR1 magic at start of file".into()));
    }
    let leaf_columns = meta.file_metadata().schema_descr().num_columns();
    let mut rows = 0i64;
    for (i, rg) in meta.row_groups().iter().enumerate() {
        if rg.num_columns() != leaf_columns {
            return Err(ParqError::CorruptFile(format!(
                "row group {i} has {} column chunks, schema has {leaf_columns} columns",
                rg.num_columns()
            )));
        }
        for col in rg.columns() {
            // byte_range() asserts on negative offsets
            let negative = col.data_page_offset() < 0
                || col.compressed_size() < 0
                || col.dictionary_page_offset().is_some_and(|o| o < 0);
            if negative {
                return Err(ParqError::CorruptFile(format!(
                    "column chunk {} in row group {i} has a negative offset or size",
                    col.column_path().string()
                )));
            }
            let (start, len) = col.byte_range();
            let end = start.checked_add(len).unwrap_or(u64::MAX);
            if start < MAGIC.len() as u64 || end > metadata_start {
                return Err(ParqError::CorruptFile(format!(
                    "column chunk {} in row group {i} spans {start}..{end}, outside data region 4..{metadata_start} of {file_size} byte file",
                    col.column_path().string()
                )));
            }
        }
        rows += rg.num_rows();
    }
    let declared = meta.file_metadata().num_rows();
    if rows != declared {
        return Err(ParqError::CorruptFile(format!(
            "row groups hold {rows} rows, footer declares {declared}"
        )));
    }
    Ok(())
}

fn build_record(
    candidate: &FileCandidate,
    file_size: u64,
    meta: &ParquetMetaData,
    detail: DetailLevel,
) -> FileMetadataRecord {
    let file_meta = meta.file_metadata();
    let schema = file_meta.schema_descr();
    let schema_fields: Vec<SchemaFieldInfo> = schema
        .columns()
        .iter()
        .map(|col| {
            let basic = col.self_type().get_basic_info();
            SchemaFieldInfo {
                name: col.path().string(),
                physical_type: format!("{:?}", col.physical_type()),
                logical_type: col.logical_type().map(|lt| format!("{lt:?}")),
                repetition: if basic.has_repetition() {
                    format!("{:?}", basic.repetition())
                } else {
                    "REQUIRED".into()
                },
            }
        })
        .collect();
    let key_value_metadata = file_meta
        .key_value_metadata()
        .map(|kv| {
            kv.iter()
                .map(|k| (k.key.clone(), k.value.clone()))
                .collect()
        })
        .unwrap_or_default();
    FileMetadataRecord {
        path: candidate.path.clone(),
        scheme: candidate.scheme,
        file_size,
        format_version: file_meta.version(),
        created_by: file_meta.created_by().map(|s| s.to_owned()),
        num_row_groups: meta.num_row_groups(),
        num_rows: file_meta.num_rows(),
        num_columns: schema_fields.len(),
        schema: schema_fields,
        compressed_size: meta.row_groups().iter().map(|rg| rg.compressed_size()).sum(),
        uncompressed_size: meta.row_groups().iter().map(|rg| rg.total_byte_size()).sum(),
        key_value_metadata,
        row_groups: (detail >= DetailLevel::Full).then(|| read_row_group_details(meta)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Entry;

    /// backend whose reads blow up the way the thrift decoder does on some footers
    struct PanickingStorage;

    impl Storage for PanickingStorage {
        fn scheme(&self) -> StorageScheme {
            StorageScheme::Local
        }
        fn stat(&self, _location: &str) -> Result<Option<Entry>> {
            Ok(None)
        }
        fn list(&self, _location: &str) -> Result<Vec<Entry>> {
            Ok(Vec::new())
        }
        fn open(&self, _location: &str) -> Result<Box<dyn ObjectReader + '_>> {
            panic!("not yet implemented: field type 13");
        }
    }

    #[test]
    fn panics_while_reading_become_failures() {
        let candidate = FileCandidate::new("/d/hostile.parquet");
        let lenient = MetadataReader::new(Arc::new(PanickingStorage), ReaderOptions::default());
        match lenient.read(&candidate) {
            ExtractionResult::Err(f) => {
                assert_eq!(f.path, "/d/hostile.parquet");
                assert_eq!(f.kind, ErrorKind::Format);
                assert!(f.message.contains("field type 13"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        let strict = MetadataReader::new(
            Arc::new(PanickingStorage),
            ReaderOptions {
                check: true,
                ..ReaderOptions::default()
            },
        );
        assert!(matches!(
            strict.read(&candidate),
            ExtractionResult::Err(f) if f.kind == ErrorKind::CorruptFile
        ));
    }

    #[test]
    fn panic_payloads_are_rendered() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("index out of bounds"));
        assert_eq!(panic_message(&*owned), "index out of bounds");
        let literal: Box<dyn Any + Send> = Box::new("unimplemented");
        assert_eq!(panic_message(&*literal), "unimplemented");
        let other: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*other), "decoder panicked");
    }

    #[test]
    fn detail_level_from_u8() {
        assert_eq!(DetailLevel::try_from(0).unwrap(), DetailLevel::Names);
        assert_eq!(DetailLevel::try_from(2).unwrap(), DetailLevel::Full);
        assert!(DetailLevel::try_from(3).is_err());
        assert!(DetailLevel::Full > DetailLevel::Summary);
    }

    #[test]
    fn structural_errors_depend_on_check() {
        assert_eq!(structural(true, "x".into()).kind(), ErrorKind::CorruptFile);
        assert_eq!(structural(false, "x".into()).kind(), ErrorKind::Format);
    }

    #[test]
    fn storage_errors_become_io_failures() {
        let err = io_failure(ParqError::PathNotFound("/gone.parquet".into()));
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("/gone.parquet"));
        let denied = io_failure(ParqError::Permission("/locked.parquet".into()));
        assert_eq!(denied.kind(), ErrorKind::Io);
    }
}
