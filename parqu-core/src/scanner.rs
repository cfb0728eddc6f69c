use glob::{MatchOptions, Pattern};
use parqu_common::{FileCandidate, ParqError, Result, StorageScheme};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::storage::{Entry, EntryKind, Storage};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Expands a root (file or directory) into the files to inspect.
///
/// Resolution is split in two: [`resolve`] validates the root and pattern up
/// front so bad input fails the whole run, then [`PathResolver::iter`] walks
/// the tree lazily. Every call to `iter` starts a fresh walk over the same
/// root, and each directory listing is sorted by name so the order is stable
/// for a given tree.
pub struct PathResolver {
    storage: Arc<dyn Storage>,
    root: String,
    scheme: StorageScheme,
    pattern: Pattern,
    recurse: bool,
    root_entries: RootEntries,
    skipped: Arc<AtomicUsize>,
}

enum RootEntries {
    SingleFile,
    Children(Vec<Entry>),
}

pub fn compile_pattern(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern)
        .map_err(|e| ParqError::InvalidOption(format!("invalid --inc pattern {pattern:?}: {e}")))
}

pub fn matches_pattern(pattern: &Pattern, name: &str) -> bool {
    pattern.matches_with(name, MATCH_OPTIONS)
}

fn sorted(mut entries: Vec<Entry>) -> Vec<Entry> {
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

/// validate `root` and `pattern`; fails with `PathNotFound` when the root does not exist
pub fn resolve(
    storage: Arc<dyn Storage>,
    root: &str,
    pattern: &str,
    recurse: bool,
) -> Result<PathResolver> {
    let pattern = compile_pattern(pattern)?;
    let entry = storage
        .stat(root)?
        .ok_or_else(|| ParqError::PathNotFound(root.to_owned()))?;
    let root_entries = match entry.kind {
        EntryKind::File => {
            tracing::info!("checking a single file: {}", entry.location);
            RootEntries::SingleFile
        }
        EntryKind::Directory => RootEntries::Children(sorted(storage.list(&entry.location)?)),
    };
    Ok(PathResolver {
        scheme: storage.scheme(),
        storage,
        root: entry.location,
        pattern,
        recurse,
        root_entries,
        skipped: Arc::new(AtomicUsize::new(0)),
    })
}

impl PathResolver {
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn is_single_file(&self) -> bool {
        matches!(self.root_entries, RootEntries::SingleFile)
    }

    /// entries that could not be listed (permission denied, vanished, ...) across all walks
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn iter(&self) -> Candidates {
        let (single, stack) = match &self.root_entries {
            RootEntries::SingleFile => (Some(self.candidate(self.root.clone())), Vec::new()),
            RootEntries::Children(children) => (None, vec![children.clone().into_iter()]),
        };
        let visited = HashSet::from([self.storage.canonical(&self.root)]);
        Candidates {
            storage: Arc::clone(&self.storage),
            scheme: self.scheme,
            pattern: self.pattern.clone(),
            recurse: self.recurse,
            single,
            stack,
            visited,
            skipped: Arc::clone(&self.skipped),
        }
    }

    fn candidate(&self, path: String) -> FileCandidate {
        FileCandidate {
            path,
            scheme: self.scheme,
        }
    }
}

impl<'a> IntoIterator for &'a PathResolver {
    type Item = FileCandidate;
    type IntoIter = Candidates;

    fn into_iter(self) -> Candidates {
        self.iter()
    }
}

/// depth-first walk; one stack frame per open directory listing
///
/// Directories are entered at most once per walk, so symlink loops and links
/// to already scanned trees do not yield the same file twice.
pub struct Candidates {
    storage: Arc<dyn Storage>,
    scheme: StorageScheme,
    pattern: Pattern,
    recurse: bool,
    single: Option<FileCandidate>,
    stack: Vec<std::vec::IntoIter<Entry>>,
    visited: HashSet<String>,
    skipped: Arc<AtomicUsize>,
}

impl Candidates {
    fn descend(&mut self, dir: &Entry) {
        if !self.visited.insert(self.storage.canonical(&dir.location)) {
            tracing::debug!("already visited {}, not descending", dir.location);
            return;
        }
        match self.storage.list(&dir.location) {
            Ok(children) => self.stack.push(sorted(children).into_iter()),
            Err(e) => {
                // a single unreadable directory must not abort the scan
                tracing::warn!("skipping {}: {e}", dir.location);
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl Iterator for Candidates {
    type Item = FileCandidate;

    fn next(&mut self) -> Option<FileCandidate> {
        if let Some(single) = self.single.take() {
            return Some(single);
        }
        loop {
            let entry = match self.stack.last_mut()?.next() {
                Some(e) => e,
                None => {
                    self.stack.pop();
                    continue;
                }
            };
            match entry.kind {
                EntryKind::File => {
                    if matches_pattern(&self.pattern, &entry.name) {
                        tracing::trace!("matched {}", entry.location);
                        return Some(FileCandidate {
                            path: entry.location,
                            scheme: self.scheme,
                        });
                    }
                }
                EntryKind::Directory if self.recurse => self.descend(&entry),
                EntryKind::Directory => {}
            }
        }
    }
}
