use parquet::data_type::ByteArray;
use parquet::file::metadata::{ParquetMetaData, RowGroupMetaData};
use parquet::file::statistics::Statistics;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnChunkStats {
    pub column: String,
    pub codec: String,
    pub encodings: Vec<String>,
    pub compressed_size: i64,
    pub uncompressed_size: i64,
    pub null_count: Option<u64>,
    pub distinct_count: Option<u64>,
    pub min: Option<String>,
    pub max: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowGroupDetail {
    pub index: usize,
    pub num_rows: i64,
    pub total_byte_size: i64,
    pub compressed_size: i64,
    pub columns: Vec<ColumnChunkStats>,
}

/// lowercase hex, used for binary statistics that are not valid UTF-8
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

fn render_bytes(b: &ByteArray) -> String {
    match b.as_utf8() {
        Ok(s) => s.to_owned(),
        Err(_) => to_hex(b.data()),
    }
}

fn display_pair<T: Display>(min: Option<&T>, max: Option<&T>) -> (Option<String>, Option<String>) {
    (min.map(|v| v.to_string()), max.map(|v| v.to_string()))
}

/// min/max rendered according to the physical type
pub fn render_min_max(stats: &Statistics) -> (Option<String>, Option<String>) {
    match stats {
        Statistics::Boolean(s) => display_pair(s.min_opt(), s.max_opt()),
        Statistics::Int32(s) => display_pair(s.min_opt(), s.max_opt()),
        Statistics::Int64(s) => display_pair(s.min_opt(), s.max_opt()),
        Statistics::Float(s) => display_pair(s.min_opt(), s.max_opt()),
        Statistics::Double(s) => display_pair(s.min_opt(), s.max_opt()),
        Statistics::ByteArray(s) => (s.min_opt().map(render_bytes), s.max_opt().map(render_bytes)),
        // int96 timestamps and fixed-length values have no portable text form
        Statistics::Int96(_) | Statistics::FixedLenByteArray(_) => (
            stats.min_bytes_opt().map(to_hex),
            stats.max_bytes_opt().map(to_hex),
        ),
    }
}

fn column_chunks(rg: &RowGroupMetaData) -> Vec<ColumnChunkStats> {
    rg.columns()
        .iter()
        .map(|col| {
            let (null_count, distinct_count, (min, max)) = match col.statistics() {
                Some(stats) => (
                    stats.null_count_opt(),
                    stats.distinct_count_opt(),
                    render_min_max(stats),
                ),
                None => (None, None, (None, None)),
            };
            ColumnChunkStats {
                column: col.column_path().string(),
                codec: format!("{:?}", col.compression()),
                encodings: col.encodings().iter().map(|e| format!("{e:?}")).collect(),
                compressed_size: col.compressed_size(),
                uncompressed_size: col.uncompressed_size(),
                null_count,
                distinct_count,
                min,
                max,
            }
        })
        .collect()
}

/// per row group, per column chunk statistics straight from the footer
pub fn read_row_group_details(meta: &ParquetMetaData) -> Vec<RowGroupDetail> {
    meta.row_groups()
        .iter()
        .enumerate()
        .map(|(index, rg)| RowGroupDetail {
            index,
            num_rows: rg.num_rows(),
            total_byte_size: rg.total_byte_size(),
            compressed_size: rg.compressed_size(),
            columns: column_chunks(rg),
        })
        .collect()
}
