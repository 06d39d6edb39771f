//! Bulk import of every brick of a resolution level on a bounded worker pool.
//!
//! Completed brick ids are sent to a reply queue in completion order. The consumer (usually an `UploadLoop`) may
//! assume that every id it receives has already been stored in the cache.

use crate::{
    caching::MemoryCache,
    error::{StreamingError, StreamingResult},
    importer::BrickImporter,
    metadata::DatasetDescriptor,
    sample::Sample,
};

use cvds_core::BrickId;

use crossbeam_channel::{Receiver, Sender};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Receives bulk load progress. Called from worker threads.
pub trait ProgressSink: Send + Sync {
    fn set_max(&self, max: u64);
    fn increment(&self);
    fn set_message(&self, message: &str);
}

/// Discards all progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn set_max(&self, _max: u64) {}
    fn increment(&self) {}
    fn set_message(&self, _message: &str) {}
}

/// Keeps the latest progress in atomics, for polling from another thread.
#[derive(Debug, Default)]
pub struct ProgressCounter {
    max: AtomicU64,
    done: AtomicU64,
    message: Mutex<String>,
}

impl ProgressCounter {
    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Acquire)
    }

    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Acquire)
    }

    pub fn message(&self) -> String {
        self.message
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ProgressSink for ProgressCounter {
    fn set_max(&self, max: u64) {
        self.max.store(max, Ordering::Release);
    }

    fn increment(&self) {
        self.done.fetch_add(1, Ordering::AcqRel);
    }

    fn set_message(&self, message: &str) {
        let mut current = self
            .message
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        current.clear();
        current.push_str(message);
    }
}

impl<P: ProgressSink + ?Sized> ProgressSink for Arc<P> {
    fn set_max(&self, max: u64) {
        (**self).set_max(max)
    }

    fn increment(&self) {
        (**self).increment()
    }

    fn set_message(&self, message: &str) {
        (**self).set_message(message)
    }
}

/// Stops a bulk load from scheduling more bricks. Imports already running still complete.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What a bulk load does when one brick fails to import.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log the failure, keep importing the other bricks, and report every failure at the end.
    BestEffort,
    /// Stop scheduling bricks and return the first failure as an error.
    FailFast,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::BestEffort
    }
}

/// Parameters of `load_all_bricks_into_cache`.
#[derive(Clone, Copy, Debug)]
pub struct BulkLoadOptions {
    pub brick_size: i32,
    pub resolution_level: u32,
    /// Defaults to `default_worker_count()`.
    pub worker_count: Option<usize>,
    pub ignore_inter_brick_interpolation: bool,
    pub failure_policy: FailurePolicy,
}

impl BulkLoadOptions {
    pub fn new(brick_size: i32, resolution_level: u32) -> Self {
        Self {
            brick_size,
            resolution_level,
            worker_count: None,
            ignore_inter_brick_interpolation: true,
            failure_policy: FailurePolicy::default(),
        }
    }
}

#[derive(Debug)]
pub struct BrickFailure {
    pub brick: BrickId,
    pub error: StreamingError,
}

/// The outcome of a bulk load that was not aborted by `FailurePolicy::FailFast`.
#[derive(Debug)]
pub struct LoadReport {
    pub resolution_level: u32,
    pub total: usize,
    /// Bricks stored in the cache and sent to the reply queue.
    pub loaded: usize,
    pub failures: Vec<BrickFailure>,
    /// Set when the load stopped early, because of a cancellation or because the reply queue was disconnected.
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.loaded == self.total
    }
}

/// Sender and receiver of completed brick ids. `None` makes an unbounded queue.
///
/// With a bounded queue, workers block once it is full, so it must be drained while the load runs.
pub fn reply_queue(capacity: Option<usize>) -> (Sender<BrickId>, Receiver<BrickId>) {
    match capacity {
        Some(capacity) => crossbeam_channel::bounded(capacity),
        None => crossbeam_channel::unbounded(),
    }
}

/// Hardware threads minus two (for the render and main threads), at least one.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(2)
        .max(1)
}

/// Imports every brick of `options.resolution_level` into `cache` on a pool of worker threads, sending the id of each
/// stored brick to `reply`.
///
/// `progress` receives the brick count before any work starts, one increment per processed brick, and a summary
/// message at the end. `cancel` is checked before each brick. A brick size that does not divide the chunk size, a
/// missing resolution level or zero workers is a `StreamingError::Config`, reported before any work starts.
pub fn load_all_bricks_into_cache<T: Sample>(
    descriptor: &DatasetDescriptor,
    options: &BulkLoadOptions,
    cache: &MemoryCache<T>,
    reply: &Sender<BrickId>,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> StreamingResult<LoadReport> {
    let level = options.resolution_level;
    let importer = BrickImporter::new(
        descriptor,
        options.brick_size,
        options.ignore_inter_brick_interpolation,
    )?;
    if !importer.indexer().contains_level(level) {
        return Err(StreamingError::Config(format!(
            "resolution_level {} does not exist, the dataset has {}",
            level,
            descriptor.nbr_resolution_levels()
        )));
    }
    if options.worker_count == Some(0) {
        return Err(StreamingError::Config("worker_count must be positive".into()));
    }
    let total = importer.indexer().total_bricks(level);

    let worker_count = options.worker_count.unwrap_or_else(default_worker_count);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count)
        .thread_name(|i| format!("cvds-importer-{}", i))
        .build()?;

    progress.set_max(total as u64);
    progress.set_message(&format!("uploading {} bricks ...", total));
    tracing::info!(level, total, worker_count, "loading all bricks of resolution level");

    let start = Instant::now();
    let loaded = AtomicUsize::new(0);
    let stop = AtomicBool::new(false);
    let failures = Mutex::new(Vec::new());

    pool.install(|| {
        (0..total).into_par_iter().for_each(|index| {
            if cancel.is_cancelled() || stop.load(Ordering::Acquire) {
                return;
            }

            let brick = BrickId::new(level, index as u32);
            match importer.import(brick, cache) {
                Ok(()) => {
                    if reply.send(brick).is_ok() {
                        loaded.fetch_add(1, Ordering::AcqRel);
                    } else {
                        tracing::warn!(%brick, "reply queue disconnected, stopping bulk load");
                        stop.store(true, Ordering::Release);
                    }
                }
                Err(error) => {
                    tracing::error!(%brick, %error, "failed to import brick");
                    if options.failure_policy == FailurePolicy::FailFast {
                        stop.store(true, Ordering::Release);
                    }
                    failures
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .push(BrickFailure { brick, error });
                }
            }
            progress.increment();
        })
    });

    let elapsed = start.elapsed();
    let loaded = loaded.into_inner();
    let mut failures = failures
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if options.failure_policy == FailurePolicy::FailFast && !failures.is_empty() {
        let BrickFailure { brick, error } = failures.swap_remove(0);
        progress.set_message(&format!("failed to load {}", brick));
        return Err(StreamingError::BrickImport {
            brick,
            source: Box::new(error),
        });
    }

    let cancelled = cancel.is_cancelled() || stop.load(Ordering::Acquire);
    if failures.is_empty() && !cancelled {
        progress.set_message(&format!(
            "all {} bricks uploaded in {:.2}s",
            loaded,
            elapsed.as_secs_f32()
        ));
    } else {
        progress.set_message(&format!(
            "{} of {} bricks uploaded in {:.2}s, {} failed",
            loaded,
            total,
            elapsed.as_secs_f32(),
            failures.len()
        ));
    }
    tracing::info!(
        level,
        loaded,
        total,
        failed = failures.len(),
        cancelled,
        elapsed_ms = elapsed.as_millis() as u64,
        "finished bulk load"
    );

    Ok(LoadReport {
        resolution_level: level,
        total,
        loaded,
        failures,
        cancelled,
        elapsed,
    })
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝

#[cfg(test)]
mod tests {
    use super::*;

    use crate::caching::BrickSample;

    use std::collections::HashSet;
    use tempdir::TempDir;
    use utilities::data_sets::SyntheticDataset;

    fn load(dataset: &SyntheticDataset) -> (TempDir, DatasetDescriptor) {
        let tmp = TempDir::new("cvds-loader").unwrap();
        dataset.write(tmp.path()).unwrap();
        let descriptor = DatasetDescriptor::load(tmp.path()).unwrap();

        (tmp, descriptor)
    }

    fn options(worker_count: usize) -> BulkLoadOptions {
        BulkLoadOptions {
            worker_count: Some(worker_count),
            ..BulkLoadOptions::new(16, 0)
        }
    }

    #[test]
    fn loads_every_brick_of_a_level_exactly_once() {
        let (_tmp, descriptor) = load(&SyntheticDataset::new(32, vec![[2, 2, 1], [1, 1, 1]]));
        let cache = MemoryCache::<u8>::new(1024);
        let (tx, rx) = reply_queue(None);
        let progress = ProgressCounter::default();

        let report = load_all_bricks_into_cache(
            &descriptor,
            &options(4),
            &cache,
            &tx,
            &progress,
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(report.total, 32);
        assert!(report.is_complete());
        assert!(report.failures.is_empty());
        assert!(!report.cancelled);

        let received: Vec<BrickId> = rx.try_iter().collect();
        let unique: HashSet<BrickId> = received.iter().copied().collect();
        assert_eq!(received.len(), 32);
        assert_eq!(unique.len(), 32);
        for brick in received {
            assert_eq!(brick.resolution_level(), 0);
            assert!(cache.get(brick).is_some());
        }

        assert_eq!(progress.max(), 32);
        assert_eq!(progress.done(), 32);
        assert!(progress.message().starts_with("all 32 bricks uploaded in"));
    }

    #[test]
    fn coarser_levels_encode_their_level_in_brick_ids() {
        let (_tmp, descriptor) = load(&SyntheticDataset::new(32, vec![[2, 2, 2], [1, 1, 1]]));
        let cache = MemoryCache::<u8>::new(64);
        let (tx, rx) = reply_queue(None);

        let report = load_all_bricks_into_cache(
            &descriptor,
            &BulkLoadOptions::new(32, 1),
            &cache,
            &tx,
            &NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(report.total, 1);
        assert_eq!(rx.try_recv().unwrap(), BrickId::new(1, 0));
        assert!(matches!(cache.get(BrickId::new(1, 0)), Some(BrickSample::Sampled(_))));
    }

    #[test]
    fn best_effort_reports_each_failed_brick_and_loads_the_rest() {
        let (tmp, descriptor) = load(&SyntheticDataset::new(32, vec![[2, 1, 1]]));
        std::fs::remove_file(tmp.path().join("resolution_level_0").join("chunk_1.cvds")).unwrap();
        let cache = MemoryCache::<u8>::new(64);
        let (tx, rx) = reply_queue(None);

        let report = load_all_bricks_into_cache(
            &descriptor,
            &options(3),
            &cache,
            &tx,
            &NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();

        // Each chunk holds 8 bricks.
        assert_eq!(report.total, 16);
        assert_eq!(report.loaded, 8);
        assert_eq!(report.failures.len(), 8);
        assert!(!report.is_complete());

        let importer = BrickImporter::new(&descriptor, 16, true).unwrap();
        for failure in report.failures.iter() {
            assert_eq!(importer.indexer().brick_to_chunk_id(failure.brick), 1);
            assert!(matches!(failure.error, StreamingError::Io { .. }));
            assert!(!cache.contains(failure.brick));
        }
        for brick in rx.try_iter() {
            assert_eq!(importer.indexer().brick_to_chunk_id(brick), 0);
        }
    }

    #[test]
    fn fail_fast_returns_the_first_failure() {
        let (tmp, descriptor) = load(&SyntheticDataset::new(32, vec![[2, 1, 1]]));
        std::fs::remove_file(tmp.path().join("resolution_level_0").join("chunk_0.cvds")).unwrap();
        let cache = MemoryCache::<u8>::new(64);
        let (tx, _rx) = reply_queue(None);
        let options = BulkLoadOptions {
            failure_policy: FailurePolicy::FailFast,
            ..options(1)
        };

        let result = load_all_bricks_into_cache(
            &descriptor,
            &options,
            &cache,
            &tx,
            &NoProgress,
            &CancellationToken::new(),
        );

        match result {
            Err(StreamingError::BrickImport { brick, source }) => {
                let importer = BrickImporter::new(&descriptor, 16, true).unwrap();
                assert_eq!(importer.indexer().brick_to_chunk_id(brick), 0);
                assert!(matches!(*source, StreamingError::Io { .. }));
            }
            other => panic!("expected a brick import error, got {:?}", other),
        }
    }

    #[test]
    fn cancelled_before_start_schedules_nothing() {
        let (_tmp, descriptor) = load(&SyntheticDataset::new(32, vec![[1, 1, 1]]));
        let cache = MemoryCache::<u8>::new(64);
        let (tx, rx) = reply_queue(None);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report =
            load_all_bricks_into_cache(&descriptor, &options(2), &cache, &tx, &NoProgress, &cancel)
                .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.loaded, 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(cache.len_resident() + cache.len_homogeneous(), 0);
    }

    /// Cancels the load once `after` bricks were processed.
    struct CancelAfter {
        after: u64,
        seen: AtomicU64,
        cancel: CancellationToken,
    }

    impl ProgressSink for CancelAfter {
        fn set_max(&self, _max: u64) {}

        fn increment(&self) {
            if self.seen.fetch_add(1, Ordering::AcqRel) + 1 >= self.after {
                self.cancel.cancel();
            }
        }

        fn set_message(&self, _message: &str) {}
    }

    #[test]
    fn cancelling_midway_stops_scheduling_new_bricks() {
        let (_tmp, descriptor) = load(&SyntheticDataset::new(32, vec![[2, 2, 2]]));
        let cache = MemoryCache::<u8>::new(256);
        let (tx, rx) = reply_queue(None);
        let cancel = CancellationToken::new();
        let progress = CancelAfter {
            after: 5,
            seen: AtomicU64::new(0),
            cancel: cancel.clone(),
        };

        let report =
            load_all_bricks_into_cache(&descriptor, &options(1), &cache, &tx, &progress, &cancel)
                .unwrap();

        assert!(report.cancelled);
        assert!(report.loaded >= 5);
        assert!(report.loaded < report.total);
        assert_eq!(rx.try_iter().count(), report.loaded);
    }

    #[test]
    fn disconnected_reply_queue_stops_the_load() {
        let (_tmp, descriptor) = load(&SyntheticDataset::new(32, vec![[2, 2, 2]]));
        let cache = MemoryCache::<u8>::new(256);
        let (tx, rx) = reply_queue(None);
        drop(rx);
        let progress = ProgressCounter::default();

        let report = load_all_bricks_into_cache(
            &descriptor,
            &options(1),
            &cache,
            &tx,
            &progress,
            &CancellationToken::new(),
        )
        .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.loaded, 0);
        // The one brick imported before the disconnect was noticed is cached and counted as processed.
        assert_eq!(cache.len_resident() + cache.len_homogeneous(), 1);
        assert_eq!(progress.done(), 1);
    }

    #[test]
    fn invalid_options_are_config_errors() {
        let (_tmp, descriptor) = load(&SyntheticDataset::new(32, vec![[1, 1, 1]]));
        let cache = MemoryCache::<u8>::new(64);
        let (tx, rx) = reply_queue(None);
        let progress = ProgressCounter::default();
        let invalid = [
            BulkLoadOptions::new(64, 0),
            BulkLoadOptions::new(0, 0),
            BulkLoadOptions::new(12, 0),
            BulkLoadOptions::new(16, 3),
            BulkLoadOptions {
                worker_count: Some(0),
                ..BulkLoadOptions::new(16, 0)
            },
        ];

        for options in invalid.iter() {
            let result = load_all_bricks_into_cache(
                &descriptor,
                options,
                &cache,
                &tx,
                &progress,
                &CancellationToken::new(),
            );
            assert!(matches!(result, Err(StreamingError::Config(_))), "{:?}", options);
        }

        assert!(rx.try_recv().is_err());
        assert_eq!(progress.max(), 0);
        assert_eq!(cache.len_resident() + cache.len_homogeneous(), 0);
    }

    #[test]
    fn default_worker_count_is_positive() {
        assert!(default_worker_count() >= 1);
    }

    #[test]
    fn failure_policy_names() {
        assert_eq!(
            serde_json::from_str::<FailurePolicy>("\"fail_fast\"").unwrap(),
            FailurePolicy::FailFast
        );
        assert_eq!(FailurePolicy::default(), FailurePolicy::BestEffort);
    }
}
