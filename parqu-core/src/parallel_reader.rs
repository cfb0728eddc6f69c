use parqu_common::{FileCandidate, ParqError, Result};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::reader::{ExtractionResult, MetadataReader};

/// Fixed-size pool that fans candidates out to `MetadataReader`.
///
/// Workers pull the next unclaimed candidate from the shared iterator, so a
/// slow read only holds up the worker doing it. A pool of one runs on the
/// calling thread in candidate order.
pub struct WorkerPool {
    size: usize,
    cancel: Arc<AtomicBool>,
}

impl WorkerPool {
    /// `requested` is clamped to `max`; zero is rejected
    pub fn new(requested: usize, max: usize) -> Result<Self> {
        if requested == 0 {
            return Err(ParqError::InvalidOption("pool size must be at least 1".into()));
        }
        let max = max.max(1);
        let size = if requested > max {
            tracing::warn!("pool size {requested} exceeds maximum {max}, using {max}");
            max
        } else {
            requested
        };
        tracing::debug!("number of workers set to: {size}");
        Ok(Self {
            size,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// share an externally owned flag, e.g. one set from a signal handler
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    /// flag that stops workers from claiming new candidates once set
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// one result per candidate, in completion order; `Interrupted` if cancelled mid-run
    pub fn run<I>(&self, candidates: I, reader: &MetadataReader) -> Result<Vec<ExtractionResult>>
    where
        I: IntoIterator<Item = FileCandidate>,
        I::IntoIter: Send,
    {
        let candidates = candidates.into_iter();
        let results: Vec<ExtractionResult> = if self.size == 1 {
            candidates
                .take_while(|_| !self.cancelled())
                .map(|c| reader.read(&c))
                .collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.size)
                .thread_name(|i| format!("parqu-worker-{i}"))
                .build()
                .map_err(|e| ParqError::InvalidOption(format!("cannot start worker pool: {e}")))?;
            pool.install(|| {
                candidates
                    .par_bridge()
                    .take_any_while(|_| !self.cancelled())
                    .map(|c| reader.read(&c))
                    .collect()
            })
        };
        if self.cancelled() {
            tracing::warn!("run interrupted after {} results", results.len());
            return Err(ParqError::Interrupted);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{DetailLevel, ReaderOptions};
    use crate::storage::{Entry, EntryKind, ObjectReader, Storage};
    use bytes::Bytes;
    use parqu_common::{ErrorKind, StorageScheme};
    use std::collections::{BTreeSet, HashMap};
    use std::ops::Range;
    use std::sync::{Condvar, Mutex};
    use std::time::Duration;

    /// in-memory objects plus a gate that records how many opens overlap
    struct MemoryStorage {
        objects: HashMap<String, Bytes>,
        gate: Option<Gate>,
    }

    struct Gate {
        target: usize,
        state: Mutex<(usize, usize)>, // (currently open, max seen)
        cv: Condvar,
    }

    impl Gate {
        fn enter(&self) {
            let mut state = self.state.lock().unwrap();
            state.0 += 1;
            state.1 = state.1.max(state.0);
            self.cv.notify_all();
            let _ = self
                .cv
                .wait_timeout_while(state, Duration::from_secs(5), |s| s.1 < self.target)
                .unwrap();
        }

        fn leave(&self) {
            self.state.lock().unwrap().0 -= 1;
        }

        fn max_seen(&self) -> usize {
            self.state.lock().unwrap().1
        }
    }

    struct MemoryObject(Bytes);

    impl ObjectReader for MemoryObject {
        fn size(&self) -> u64 {
            self.0.len() as u64
        }
        fn read_range(&mut self, range: Range<u64>) -> Result<Bytes> {
            Ok(self.0.slice(range.start as usize..range.end as usize))
        }
    }

    impl Storage for MemoryStorage {
        fn scheme(&self) -> StorageScheme {
            StorageScheme::Local
        }
        fn stat(&self, location: &str) -> Result<Option<Entry>> {
            Ok(self.objects.get(location).map(|b| Entry {
                location: location.to_owned(),
                name: location.to_owned(),
                kind: EntryKind::File,
                size: Some(b.len() as u64),
            }))
        }
        fn list(&self, _location: &str) -> Result<Vec<Entry>> {
            Ok(Vec::new())
        }
        fn open(&self, location: &str) -> Result<Box<dyn ObjectReader + '_>> {
            if location.starts_with("boom") {
                panic!("called `Option::unwrap()` on a `None` value");
            }
            if let Some(gate) = &self.gate {
                gate.enter();
                gate.leave();
            }
            let bytes = self
                .objects
                .get(location)
                .cloned()
                .ok_or_else(|| ParqError::PathNotFound(location.to_owned()))?;
            Ok(Box::new(MemoryObject(bytes)))
        }
    }

    fn storage(n: usize, gate: Option<Gate>) -> Arc<MemoryStorage> {
        let objects = (0..n)
            .map(|i| (format!("f{i:02}.parquet"), Bytes::from_static(b"not parquet at all")))
            .collect();
        Arc::new(MemoryStorage { objects, gate })
    }

    fn candidates(n: usize) -> Vec<FileCandidate> {
        (0..n).map(|i| FileCandidate::new(format!("f{i:02}.parquet"))).collect()
    }

    fn reader(storage: Arc<MemoryStorage>) -> MetadataReader {
        MetadataReader::new(
            storage,
            ReaderOptions {
                detail: DetailLevel::Names,
                ..ReaderOptions::default()
            },
        )
    }

    #[test]
    fn zero_pool_is_rejected_and_large_pool_clamped() {
        assert!(matches!(WorkerPool::new(0, 8), Err(ParqError::InvalidOption(_))));
        assert_eq!(WorkerPool::new(100, 16).unwrap().size(), 16);
        assert_eq!(WorkerPool::new(3, 16).unwrap().size(), 3);
    }

    #[test]
    fn every_candidate_yields_one_result() {
        let r = reader(storage(25, None));
        for size in [1, 4, 8] {
            let pool = WorkerPool::new(size, 64).unwrap();
            let results = pool.run(candidates(25), &r).unwrap();
            assert_eq!(results.len(), 25);
            let paths: BTreeSet<_> = results.iter().map(|r| r.path().to_owned()).collect();
            assert_eq!(paths.len(), 25);
            assert!(results.iter().all(|r| match r {
                ExtractionResult::Err(f) => f.kind == ErrorKind::Format,
                ExtractionResult::Ok(_) => false,
            }));
        }
    }

    #[test]
    fn missing_object_is_reported_not_dropped() {
        let r = reader(storage(2, None));
        let mut input = candidates(2);
        input.push(FileCandidate::new("gone.parquet"));
        let results = WorkerPool::new(2, 8).unwrap().run(input, &r).unwrap();
        assert_eq!(results.len(), 3);
        let gone = results.iter().find(|r| r.path() == "gone.parquet").unwrap();
        assert!(matches!(gone, ExtractionResult::Err(f) if f.kind == ErrorKind::Io));
    }

    #[test]
    fn panicking_read_does_not_lose_other_results() {
        let r = reader(storage(6, None));
        for size in [1, 4] {
            let mut input = candidates(6);
            input.insert(3, FileCandidate::new("boom.parquet"));
            let results = WorkerPool::new(size, 8).unwrap().run(input, &r).unwrap();
            assert_eq!(results.len(), 7);
            let boom = results.iter().find(|r| r.path() == "boom.parquet").unwrap();
            assert!(matches!(boom, ExtractionResult::Err(f) if f.kind == ErrorKind::Format));
        }
    }

    #[test]
    fn workers_read_concurrently() {
        let gate = Gate {
            target: 4,
            state: Mutex::new((0, 0)),
            cv: Condvar::new(),
        };
        let store = storage(4, Some(gate));
        let r = reader(Arc::clone(&store));
        let results = WorkerPool::new(4, 8).unwrap().run(candidates(4), &r).unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(store.gate.as_ref().unwrap().max_seen(), 4);
    }

    #[test]
    fn cancelled_run_is_interrupted() {
        let r = reader(storage(10, None));
        for size in [1, 4] {
            let pool = WorkerPool::new(size, 8).unwrap();
            pool.cancel_flag().store(true, Ordering::SeqCst);
            assert!(matches!(pool.run(candidates(10), &r), Err(ParqError::Interrupted)));
        }
    }
}
