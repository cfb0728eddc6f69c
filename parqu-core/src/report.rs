use parqu_common::{ParqError, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::reader::{DetailLevel, ExtractionResult, FileMetadataRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
}

impl Summary {
    pub fn of(results: &[ExtractionResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        Self {
            succeeded,
            failed: results.len() - succeeded,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} succeeded, {} failed", self.succeeded, self.failed)
    }
}

/// results ordered by path so output is identical across runs and pool sizes
pub fn sort_results(results: &mut [ExtractionResult]) {
    results.sort_by(|a, b| a.path().cmp(b.path()));
}

/// Renders results as text, one block per file, ending with the summary line.
pub fn format_report(results: &mut [ExtractionResult], detail: DetailLevel) -> String {
    sort_results(results);
    let mut out = String::new();
    for result in results.iter() {
        match result {
            ExtractionResult::Err(f) => {
                let _ = writeln!(out, "{}: {}: {}", f.path, f.kind, f.message);
            }
            ExtractionResult::Ok(rec) => match detail {
                DetailLevel::Names => {
                    let _ = writeln!(out, "{}: OK", rec.path);
                }
                DetailLevel::Summary => write_summary_line(&mut out, rec),
                DetailLevel::Full => {
                    write_summary_line(&mut out, rec);
                    write_full(&mut out, rec);
                }
            },
        }
    }
    let _ = writeln!(out, "{}", Summary::of(results));
    out
}

fn write_summary_line(out: &mut String, rec: &FileMetadataRecord) {
    let _ = writeln!(
        out,
        "{}: {} rows, {} row groups, {} bytes compressed",
        rec.path, rec.num_rows, rec.num_row_groups, rec.compressed_size
    );
}

fn write_full(out: &mut String, rec: &FileMetadataRecord) {
    let _ = writeln!(out, "  {:<20} {}", "created_by:", rec.created_by.as_deref().unwrap_or("-"));
    let _ = writeln!(out, "  {:<20} {}", "format_version:", rec.format_version);
    let _ = writeln!(out, "  {:<20} {} bytes", "file_size:", rec.file_size);
    let _ = writeln!(out, "  {:<20} {} bytes", "uncompressed_size:", rec.uncompressed_size);
    if !rec.key_value_metadata.is_empty() {
        let _ = writeln!(out, "  key_value_metadata:");
        for (k, v) in &rec.key_value_metadata {
            let _ = writeln!(out, "    {k} = {}", v.as_deref().map(truncate).unwrap_or("-".into()));
        }
    }
    let _ = writeln!(out, "  schema ({} columns):", rec.num_columns);
    for field in &rec.schema {
        let _ = writeln!(
            out,
            "    {:<24} {:<22} {:<10} {}",
            field.name,
            field.physical_type,
            field.repetition,
            field.logical_type.as_deref().unwrap_or("-")
        );
    }
    for rg in rec.row_groups.as_deref().unwrap_or_default() {
        let _ = writeln!(
            out,
            "  row group {}: {} rows, {} bytes, {} bytes compressed",
            rg.index, rg.num_rows, rg.total_byte_size, rg.compressed_size
        );
        for col in &rg.columns {
            let _ = writeln!(
                out,
                "    {:<24} codec={} encodings={} size={}/{} nulls={} distinct={} min={} max={}",
                col.column,
                col.codec,
                col.encodings.join(","),
                col.compressed_size,
                col.uncompressed_size,
                opt(col.null_count),
                opt(col.distinct_count),
                col.min.as_deref().map(truncate).unwrap_or("-".into()),
                col.max.as_deref().map(truncate).unwrap_or("-".into()),
            );
        }
    }
}

fn opt(v: Option<u64>) -> String {
    v.map_or("-".into(), |d| d.to_string())
}

/// long values (embedded arrow schemas, blobs) are cut to keep lines readable
fn truncate(s: &str) -> String {
    const MAX: usize = 64;
    if s.chars().count() <= MAX {
        s.to_owned()
    } else {
        let cut: String = s.chars().take(MAX).collect();
        format!("{cut}...")
    }
}

/// JSON document with every sorted result and the summary
pub fn format_json(results: &mut [ExtractionResult]) -> Result<String> {
    sort_results(results);
    let doc = serde_json::json!({
        "files": &*results,
        "summary": Summary::of(results),
    });
    serde_json::to_string_pretty(&doc)
        .map_err(|e| ParqError::Other(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{ExtractionFailure, SchemaFieldInfo};
    use crate::stats::{ColumnChunkStats, RowGroupDetail};
    use parqu_common::{ErrorKind, StorageScheme};

    fn record(path: &str, rows: i64) -> ExtractionResult {
        ExtractionResult::Ok(FileMetadataRecord {
            path: path.into(),
            scheme: StorageScheme::Local,
            file_size: 2048,
            format_version: 1,
            created_by: Some("parquet-rs version 53.0.0".into()),
            num_row_groups: 1,
            num_rows: rows,
            num_columns: 1,
            schema: vec![SchemaFieldInfo {
                name: "id".into(),
                physical_type: "INT32".into(),
                logical_type: None,
                repetition: "REQUIRED".into(),
            }],
            compressed_size: 512,
            uncompressed_size: 800,
            key_value_metadata: vec![("origin".into(), Some("unit-test".into()))],
            row_groups: Some(vec![RowGroupDetail {
                index: 0,
                num_rows: rows,
                total_byte_size: 800,
                compressed_size: 512,
                columns: vec![ColumnChunkStats {
                    column: "id".into(),
                    codec: "SNAPPY".into(),
                    encodings: vec!["PLAIN".into(), "RLE".into()],
                    compressed_size: 512,
                    uncompressed_size: 800,
                    null_count: Some(0),
                    distinct_count: None,
                    min: Some("1".into()),
                    max: Some(rows.to_string()),
                }],
            }]),
        })
    }

    fn failure(path: &str) -> ExtractionResult {
        ExtractionResult::Err(ExtractionFailure {
            path: path.into(),
            kind: ErrorKind::CorruptFile,
            message: "footer length 99999 exceeds file size 300".into(),
        })
    }

    #[test]
    fn summary_detail_sorts_and_counts() {
        let mut results = vec![failure("/d/b.parquet"), record("/d/a.parquet", 100)];
        let text = format_report(&mut results, DetailLevel::Summary);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "/d/a.parquet: 100 rows, 1 row groups, 512 bytes compressed");
        assert!(lines[1].starts_with("/d/b.parquet: CorruptFileError: footer length"));
        assert_eq!(lines[2], "1 succeeded, 1 failed");
    }

    #[test]
    fn names_detail_is_one_line_per_file() {
        let mut results = vec![record("/d/z.parquet", 1), failure("/d/y.parquet")];
        let text = format_report(&mut results, DetailLevel::Names);
        assert_eq!(
            text,
            "/d/y.parquet: CorruptFileError: footer length 99999 exceeds file size 300\n\
             /d/z.parquet: OK\n\
             1 succeeded, 1 failed\n"
        );
    }

    #[test]
    fn full_detail_lists_schema_and_stats() {
        let mut results = vec![record("/d/a.parquet", 3)];
        let text = format_report(&mut results, DetailLevel::Full);
        assert!(text.contains("schema (1 columns):"));
        assert!(text.contains("origin = unit-test"));
        assert!(text.contains("row group 0: 3 rows"));
        assert!(text.contains("codec=SNAPPY encodings=PLAIN,RLE"));
        assert!(text.contains("min=1 max=3"));
    }

    #[test]
    fn empty_run_still_prints_summary() {
        assert_eq!(format_report(&mut [], DetailLevel::Summary), "0 succeeded, 0 failed\n");
    }

    #[test]
    fn long_values_are_truncated() {
        let long = "x".repeat(100);
        let t = truncate(&long);
        assert_eq!(t.len(), 67);
        assert!(t.ends_with("..."));
        assert_eq!(truncate("short"), "short");
    }

    #[test]
    fn json_output_carries_status_and_summary() {
        let mut results = vec![failure("/d/b.parquet"), record("/d/a.parquet", 100)];
        let json = format_json(&mut results).unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["files"][0]["status"], "OK");
        assert_eq!(v["files"][0]["result"]["num_rows"], 100);
        assert_eq!(v["files"][1]["status"], "Error");
        assert_eq!(v["files"][1]["result"]["kind"], "CorruptFileError");
        assert_eq!(v["summary"]["succeeded"], 1);
        assert_eq!(v["summary"]["failed"], 1);
    }
}
