use bytes::Bytes;
use memmap2::Mmap;
use parqu_common::{Config, ParqError, Result, StorageScheme};
use std::fs::File;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// one listing entry; `location` is usable as input to `stat`, `list` and `open`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub location: String,
    pub name: String,
    pub kind: EntryKind,
    pub size: Option<u64>,
}

/// random-access handle on a single object
pub trait ObjectReader {
    fn size(&self) -> u64;
    fn read_range(&mut self, range: Range<u64>) -> Result<Bytes>;
}

/// capability interface each backend (local, S3, HDFS) implements
pub trait Storage: Send + Sync {
    fn scheme(&self) -> StorageScheme;
    /// `Ok(None)` when nothing exists at `location`
    fn stat(&self, location: &str) -> Result<Option<Entry>>;
    fn list(&self, location: &str) -> Result<Vec<Entry>>;
    fn open(&self, location: &str) -> Result<Box<dyn ObjectReader + '_>>;
    /// identity of a directory for cycle detection; object stores have no links
    fn canonical(&self, location: &str) -> String {
        location.to_owned()
    }
}

/// pick the backend for a root path based on its URI prefix
pub fn open_storage(root: &str, config: &Config) -> Result<Arc<dyn Storage>> {
    match StorageScheme::detect(root) {
        StorageScheme::Local => Ok(Arc::new(LocalStorage)),
        StorageScheme::S3 => Ok(Arc::new(crate::s3_reader::S3Storage::connect(&config.s3)?)),
        StorageScheme::Hdfs => Ok(Arc::new(crate::hdfs_reader::WebHdfsStorage::new(
            &config.hdfs,
        )?)),
    }
}

/// check that `range` is inside an object of `size` bytes
pub(crate) fn check_range(location: &str, range: &Range<u64>, size: u64) -> Result<()> {
    if range.start > range.end || range.end > size {
        return Err(ParqError::Storage(format!(
            "range {}..{} out of bounds for {location} ({size} bytes)",
            range.start, range.end
        )));
    }
    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStorage;

fn local_path(location: &str) -> &Path {
    Path::new(location.strip_prefix("file://").unwrap_or(location))
}

impl Storage for LocalStorage {
    fn scheme(&self) -> StorageScheme {
        StorageScheme::Local
    }

    fn stat(&self, location: &str) -> Result<Option<Entry>> {
        let path = local_path(location);
        let meta = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ParqError::from_io(location, e)),
        };
        let kind = if meta.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        Ok(Some(Entry {
            location: location.to_owned(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            kind,
            size: (kind == EntryKind::File).then(|| meta.len()),
        }))
    }

    fn list(&self, location: &str) -> Result<Vec<Entry>> {
        let dir = local_path(location);
        let entries = std::fs::read_dir(dir).map_err(|e| ParqError::from_io(location, e))?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ParqError::from_io(location, e))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            // follow symlinks so linked data directories are scanned too
            let meta = match std::fs::metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("skipping {}: {e}", path.display());
                    continue;
                }
            };
            let kind = if meta.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            out.push(Entry {
                location: path.to_string_lossy().into_owned(),
                name,
                kind,
                size: (kind == EntryKind::File).then(|| meta.len()),
            });
        }
        Ok(out)
    }

    fn canonical(&self, location: &str) -> String {
        std::fs::canonicalize(local_path(location))
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| location.to_owned())
    }

    fn open(&self, location: &str) -> Result<Box<dyn ObjectReader + '_>> {
        let file = File::open(local_path(location)).map_err(|e| ParqError::from_io(location, e))?;
        let size = file.metadata()?.len();
        // zero-length files cannot be mapped
        let mmap = if size == 0 {
            None
        } else {
            // memory-map the file so footer access touches only the tail pages
            Some(unsafe { Mmap::map(&file)? })
        };
        Ok(Box::new(LocalReader {
            location: location.to_owned(),
            size,
            mmap,
        }))
    }
}

struct LocalReader {
    location: String,
    size: u64,
    mmap: Option<Mmap>,
}

impl ObjectReader for LocalReader {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_range(&mut self, range: Range<u64>) -> Result<Bytes> {
        check_range(&self.location, &range, self.size)?;
        match &self.mmap {
            Some(m) => Ok(Bytes::copy_from_slice(
                &m[range.start as usize..range.end as usize],
            )),
            None => Ok(Bytes::new()),
        }
    }
}
