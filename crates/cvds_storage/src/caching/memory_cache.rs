use super::lru_table::SmallKeyLruTable;
use crate::{sample::Sample, SmallKeyHashMap};

use cvds_core::BrickId;

use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The decoded samples of one brick, with their range.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheEntry<T> {
    data: Box<[T]>,
    min: T,
    max: T,
}

impl<T: Sample> CacheEntry<T> {
    /// `min` and `max` must bound `data`. Use `from_samples` to compute them.
    pub fn new(data: Vec<T>, min: T, max: T) -> Self {
        debug_assert!(min <= max);

        Self {
            data: data.into_boxed_slice(),
            min,
            max,
        }
    }

    /// Builds an entry from `data`, computing its range. Returns `None` for an empty buffer.
    pub fn from_samples(data: Vec<T>) -> Option<Self> {
        let min = *data.iter().min()?;
        let max = *data.iter().max()?;

        Some(Self::new(data, min, max))
    }

    /// A homogeneous entry that carries no samples.
    pub fn uniform(value: T) -> Self {
        Self {
            data: Box::new([]),
            min: value,
            max: value,
        }
    }

    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// The samples as raw bytes, as handed to an upload.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    #[inline]
    pub fn min(&self) -> T {
        self.min
    }

    #[inline]
    pub fn max(&self) -> T {
        self.max
    }

    #[inline]
    pub fn is_homogeneous(&self) -> bool {
        self.min == self.max
    }

    #[inline]
    pub fn size_in_bytes(&self) -> usize {
        std::mem::size_of_val(&*self.data)
    }
}

/// The result of a cache hit.
#[derive(Clone, Debug, PartialEq)]
pub enum BrickSample<T> {
    /// Every sample of the brick equals this value. No payload is stored.
    Uniform(T),
    Sampled(Arc<CacheEntry<T>>),
}

impl<T: Sample> BrickSample<T> {
    #[inline]
    pub fn min(&self) -> T {
        match self {
            BrickSample::Uniform(v) => *v,
            BrickSample::Sampled(e) => e.min(),
        }
    }

    #[inline]
    pub fn max(&self) -> T {
        match self {
            BrickSample::Uniform(v) => *v,
            BrickSample::Sampled(e) => e.max(),
        }
    }

    #[inline]
    pub fn is_uniform(&self) -> bool {
        matches!(self, BrickSample::Uniform(_))
    }
}

/// Host-side cache of decoded bricks, shared between importer threads and the upload loop.
///
/// Non-homogeneous bricks live in a table bounded to `capacity` entries, evicting the least recently used one when a new
/// brick arrives at a full table. Homogeneous bricks only keep their value, in an unbounded side table, and are never
/// evicted. A brick id is resident in at most one of the two tables.
///
/// Lock order is always `bounded` then `homogeneous`. Reads of the homogeneous table only take its read lock.
pub struct MemoryCache<T> {
    bounded: Mutex<SmallKeyLruTable<BrickId, Arc<CacheEntry<T>>>>,
    homogeneous: RwLock<SmallKeyHashMap<BrickId, T>>,
    capacity: usize,
}

impl<T: Sample> MemoryCache<T> {
    /// A cache holding at most `capacity` (at least 1) non-homogeneous bricks.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        Self {
            bounded: Mutex::new(SmallKeyLruTable::with_capacity(capacity)),
            homogeneous: RwLock::new(SmallKeyHashMap::default()),
            capacity,
        }
    }

    /// A cache sized so that `memory_budget_mb` holds as many bricks of `brick_size_in_bytes` as possible, rounding up.
    pub fn with_memory_budget(memory_budget_mb: u64, brick_size_in_bytes: usize) -> Self {
        let capacity = capacity_for_budget(memory_budget_mb, brick_size_in_bytes);
        tracing::debug!(
            memory_budget_mb,
            brick_size_in_bytes,
            capacity,
            "derived memory cache capacity"
        );

        Self::new(capacity)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stores `entry` for `id`, transferring ownership to the cache.
    ///
    /// Homogeneous entries go to the side table, where the first writer wins. Others replace any previous entry for
    /// `id` and may evict the least recently used brick.
    pub fn set(&self, id: BrickId, entry: CacheEntry<T>) {
        if entry.is_homogeneous() {
            self.set_homogeneous(id, entry.min());
            return;
        }

        let mut bounded = self.bounded();
        let insertion = bounded.insert(id, Arc::new(entry));
        if let Some((evicted, _)) = insertion.evicted {
            tracing::trace!(%evicted, for_brick = %id, "evicted least recently used brick");
        }
        self.homogeneous_write().remove(&id);

        debug_assert!(
            bounded.len() <= self.capacity,
            "memory cache holds {} bricks, capacity is {}",
            bounded.len(),
            self.capacity
        );
    }

    /// An id already in the homogeneous table keeps its first value and never touches the bounded table. Otherwise the
    /// bounded lock is held for one O(1) removal, so that an id is never resident in both tables.
    fn set_homogeneous(&self, id: BrickId, value: T) {
        if self.homogeneous_read().contains_key(&id) {
            return;
        }

        let mut bounded = self.bounded();
        bounded.remove(&id);
        self.homogeneous_write().entry(id).or_insert(value);
        tracing::trace!(brick = %id, ?value, "stored homogeneous brick");
    }

    /// Looks up `id`. A hit in the bounded table marks the brick as most recently used. A miss is not an error; the brick
    /// has not been loaded yet or was evicted.
    pub fn get(&self, id: BrickId) -> Option<BrickSample<T>> {
        if let Some(value) = self.homogeneous_read().get(&id) {
            return Some(BrickSample::Uniform(*value));
        }

        let mut bounded = self.bounded();
        let hit = bounded
            .get_and_touch(&id)
            .map(|entry| BrickSample::Sampled(Arc::clone(entry)));

        hit
    }

    /// Whether `id` is resident in either table, without touching recency.
    pub fn contains(&self, id: BrickId) -> bool {
        let is_homogeneous = self.homogeneous_read().contains_key(&id);

        is_homogeneous || self.bounded().contains_key(&id)
    }

    /// Number of resident non-homogeneous bricks.
    pub fn len_resident(&self) -> usize {
        self.bounded().len()
    }

    pub fn len_homogeneous(&self) -> usize {
        self.homogeneous_read().len()
    }

    /// Drops every entry from both tables.
    pub fn clear(&self) {
        let mut bounded = self.bounded();
        bounded.clear();
        self.homogeneous_write().clear();
    }

    fn bounded(&self) -> MutexGuard<'_, SmallKeyLruTable<BrickId, Arc<CacheEntry<T>>>> {
        self.bounded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn homogeneous_read(&self) -> RwLockReadGuard<'_, SmallKeyHashMap<BrickId, T>> {
        self.homogeneous
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn homogeneous_write(&self) -> RwLockWriteGuard<'_, SmallKeyHashMap<BrickId, T>> {
        self.homogeneous
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// `ceil(budget / brick size)`, at least 1.
pub fn capacity_for_budget(memory_budget_mb: u64, brick_size_in_bytes: usize) -> usize {
    let budget_bytes = memory_budget_mb.saturating_mul(1024 * 1024);
    let brick_bytes = brick_size_in_bytes.max(1) as u64;
    let capacity = (budget_bytes + brick_bytes - 1) / brick_bytes;

    (capacity as usize).max(1)
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝
