//! Ties a loaded dataset, its memory cache, and the streaming settings together for one rendering session.

use crate::{
    addressing::{BrickIndexer, BrickLayout},
    caching::MemoryCache,
    config::StreamingConfig,
    error::{StreamingError, StreamingResult},
    loader::{load_all_bricks_into_cache, reply_queue, CancellationToken, LoadReport, ProgressSink},
    metadata::DatasetDescriptor,
    sample::{ColorDepth, Sample},
    upload::UploadLoop,
};

use cvds_core::BrickId;

use crossbeam_channel::{Receiver, Sender};
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

/// A memory cache of the sample type matching a dataset's color depth.
#[derive(Clone)]
pub enum DepthCache {
    Uint8(Arc<MemoryCache<u8>>),
    Uint16(Arc<MemoryCache<u16>>),
}

impl DepthCache {
    /// Creates the cache for `descriptor`'s color depth, sized from `config`'s memory budget.
    pub fn for_dataset(descriptor: &DatasetDescriptor, config: &StreamingConfig) -> Self {
        let brick_volume = brick_layout(descriptor, config).brick_volume();
        let brick_bytes = brick_volume * descriptor.color_depth.bytes_per_sample();

        match descriptor.color_depth {
            ColorDepth::Uint8 => DepthCache::Uint8(Arc::new(MemoryCache::with_memory_budget(
                config.memory_budget_mb,
                brick_bytes,
            ))),
            ColorDepth::Uint16 => DepthCache::Uint16(Arc::new(MemoryCache::with_memory_budget(
                config.memory_budget_mb,
                brick_bytes,
            ))),
        }
    }

    pub fn color_depth(&self) -> ColorDepth {
        match self {
            DepthCache::Uint8(_) => ColorDepth::Uint8,
            DepthCache::Uint16(_) => ColorDepth::Uint16,
        }
    }

    pub fn capacity(&self) -> usize {
        match self {
            DepthCache::Uint8(c) => c.capacity(),
            DepthCache::Uint16(c) => c.capacity(),
        }
    }

    pub fn len_resident(&self) -> usize {
        match self {
            DepthCache::Uint8(c) => c.len_resident(),
            DepthCache::Uint16(c) => c.len_resident(),
        }
    }

    pub fn len_homogeneous(&self) -> usize {
        match self {
            DepthCache::Uint8(c) => c.len_homogeneous(),
            DepthCache::Uint16(c) => c.len_homogeneous(),
        }
    }
}

fn brick_layout(descriptor: &DatasetDescriptor, config: &StreamingConfig) -> BrickLayout {
    BrickLayout::new(
        descriptor.chunk_size,
        config.brick_size,
        descriptor.chunk_padding,
        config.ignore_inter_brick_interpolation,
    )
}

/// A dataset being streamed into a cache of samples `T`.
pub struct StreamingSession<T> {
    descriptor: Arc<DatasetDescriptor>,
    cache: Arc<MemoryCache<T>>,
    config: StreamingConfig,
}

impl<T: Sample> StreamingSession<T> {
    /// Loads the dataset at `root` and creates a cache sized from `config`.
    pub fn open(root: impl AsRef<Path>, config: StreamingConfig) -> StreamingResult<Self> {
        let descriptor = Arc::new(DatasetDescriptor::load(root)?);

        Self::new(descriptor, config)
    }

    pub fn new(descriptor: Arc<DatasetDescriptor>, config: StreamingConfig) -> StreamingResult<Self> {
        config.validate_for(&descriptor)?;
        let brick_bytes = brick_layout(&descriptor, &config).brick_volume() * std::mem::size_of::<T>();
        let cache = Arc::new(MemoryCache::with_memory_budget(
            config.memory_budget_mb,
            brick_bytes,
        ));

        Self::with_cache(descriptor, config, cache)
    }

    /// Streams into an existing `cache`.
    pub fn with_cache(
        descriptor: Arc<DatasetDescriptor>,
        config: StreamingConfig,
        cache: Arc<MemoryCache<T>>,
    ) -> StreamingResult<Self> {
        config.validate_for(&descriptor)?;
        if T::COLOR_DEPTH != descriptor.color_depth {
            return Err(StreamingError::Config(format!(
                "cache samples are {:?} but the dataset stores {:?}",
                T::COLOR_DEPTH,
                descriptor.color_depth
            )));
        }

        Ok(Self {
            descriptor,
            cache,
            config,
        })
    }

    #[inline]
    pub fn descriptor(&self) -> &Arc<DatasetDescriptor> {
        &self.descriptor
    }

    #[inline]
    pub fn cache(&self) -> &Arc<MemoryCache<T>> {
        &self.cache
    }

    #[inline]
    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    pub fn indexer(&self) -> StreamingResult<BrickIndexer> {
        BrickIndexer::new(
            &self.descriptor,
            self.config.brick_size,
            self.config.ignore_inter_brick_interpolation,
        )
    }

    /// An upload loop sized for this session's bricks.
    pub fn upload_loop(&self) -> UploadLoop<T> {
        UploadLoop::new(
            self.config.max_uploads_per_frame,
            self.config.brick_size,
            brick_layout(&self.descriptor, &self.config).brick_edge,
        )
    }

    /// Loads the configured resolution level on the calling thread.
    pub fn load_level(
        &self,
        reply: &Sender<BrickId>,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> StreamingResult<LoadReport> {
        load_all_bricks_into_cache(
            &self.descriptor,
            &self.config.bulk_load_options(),
            &self.cache,
            reply,
            progress,
            cancel,
        )
    }

    /// Loads the configured resolution level on a background thread. Completed ids arrive on the handle's receiver.
    pub fn start_level_load(&self, progress: Arc<dyn ProgressSink>) -> StreamingResult<LoadHandle> {
        let (sender, receiver) = reply_queue(self.config.reply_queue_capacity);
        let cancel = CancellationToken::new();

        let descriptor = Arc::clone(&self.descriptor);
        let cache = Arc::clone(&self.cache);
        let options = self.config.bulk_load_options();
        let thread_cancel = cancel.clone();
        let thread = std::thread::Builder::new()
            .name(format!("cvds-bulk-load-{}", options.resolution_level))
            .spawn(move || {
                load_all_bricks_into_cache(
                    &descriptor,
                    &options,
                    &cache,
                    &sender,
                    &*progress,
                    &thread_cancel,
                )
            })
            .map_err(StreamingError::Spawn)?;

        Ok(LoadHandle {
            receiver,
            cancel,
            thread: Some(thread),
        })
    }
}

/// A bulk load running on a background thread. Dropping the handle without joining cancels the load.
pub struct LoadHandle {
    receiver: Receiver<BrickId>,
    cancel: CancellationToken,
    // Only `None` after `join` took it.
    thread: Option<JoinHandle<StreamingResult<LoadReport>>>,
}

impl LoadHandle {
    /// Ids of bricks stored in the cache, in completion order.
    #[inline]
    pub fn receiver(&self) -> &Receiver<BrickId> {
        &self.receiver
    }

    #[inline]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the load to finish. Ids not yet taken from the receiver are dropped.
    pub fn join(mut self) -> StreamingResult<LoadReport> {
        let thread = self.thread.take().ok_or(StreamingError::ImporterPanicked)?;

        thread.join().map_err(|_| StreamingError::ImporterPanicked)?
    }
}

impl Drop for LoadHandle {
    fn drop(&mut self) {
        if self.thread.as_ref().map_or(false, |thread| !thread.is_finished()) {
            tracing::debug!("load handle dropped before the bulk load finished, cancelling");
            self.cancel.cancel();
        }
    }
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝
