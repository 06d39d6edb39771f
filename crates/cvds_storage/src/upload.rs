//! The frame-paced consumer of the reply queue, which copies cached bricks into a GPU brick cache.
//!
//! The GPU itself is behind `BrickUploader`, so this module only decides what to upload where, how many per frame, and
//! how long the source memory must stay alive.

use crate::{
    caching::{BrickSample, CacheEntry, MemoryCache},
    error::{StreamingError, StreamingResult},
    sample::{Sample, TextureFormat},
};

use cvds_core::prelude::*;

use crossbeam_channel::{Receiver, TryRecvError};
use std::sync::Arc;

/// The destination of one brick in the GPU volume, in voxels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UploadRegion {
    pub offset: Point3i,
    pub extent: Point3i,
}

impl UploadRegion {
    #[inline]
    pub fn volume(&self) -> usize {
        self.extent.volume()
    }
}

/// Host memory handed to the GPU during one frame, released at the start of the next frame.
#[derive(Debug, Default)]
pub struct StagingBuffers {
    buffers: Vec<Box<[u8]>>,
}

impl StagingBuffers {
    /// Keeps `bytes` alive until the next frame boundary and returns them.
    pub fn stage(&mut self, bytes: Vec<u8>) -> &[u8] {
        self.buffers.push(bytes.into_boxed_slice());

        self.buffers.last().map(|b| &b[..]).unwrap_or(&[])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    fn release(&mut self) -> usize {
        let released = self.buffers.len();
        self.buffers.clear();

        released
    }
}

/// The GPU upload primitive.
///
/// Implementations may read `source` until the end of the current frame; the `UploadLoop` keeps it alive until then.
pub trait BrickUploader {
    fn upload(
        &mut self,
        region: UploadRegion,
        source: &[u8],
        mip_level: u32,
        format: TextureFormat,
    ) -> StreamingResult<()>;

    /// Fills `region` with copies of the single sample `sample`. The default stages a filled buffer and uploads it.
    fn fill(
        &mut self,
        region: UploadRegion,
        sample: &[u8],
        mip_level: u32,
        format: TextureFormat,
        staging: &mut StagingBuffers,
    ) -> StreamingResult<()> {
        let filled = staging.stage(sample.repeat(region.volume()));

        self.upload(region, filled, mip_level, format)
    }
}

/// What one `UploadLoop::tick` did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FrameStats {
    /// Brick ids taken from the reply queue.
    pub dequeued: usize,
    pub uploaded: usize,
    /// Uniform bricks written with `BrickUploader::fill`.
    pub filled: usize,
    pub uploaded_bytes: usize,
    /// Buffers of the previous frame released at the start of this one.
    pub released: usize,
    /// The reply queue is empty and every sender is gone.
    pub drained: bool,
}

/// Uploads at most `max_uploads_per_frame` bricks per tick.
pub struct UploadLoop<T> {
    max_uploads_per_frame: usize,
    brick_size: i32,
    brick_edge: i32,
    mip_level: u32,
    format: TextureFormat,
    pinned: Vec<Arc<CacheEntry<T>>>,
    staging: StagingBuffers,
}

impl<T: Sample> UploadLoop<T> {
    /// `brick_edge` is the edge of the stored bricks, which exceeds `brick_size` when a padding shell is kept.
    pub fn new(max_uploads_per_frame: usize, brick_size: i32, brick_edge: i32) -> Self {
        Self {
            max_uploads_per_frame: max_uploads_per_frame.max(1),
            brick_size,
            brick_edge,
            mip_level: 0,
            format: T::COLOR_DEPTH.texture_format(),
            pinned: Vec::new(),
            staging: StagingBuffers::default(),
        }
    }

    pub fn with_mip_level(mut self, mip_level: u32) -> Self {
        self.mip_level = mip_level;
        self
    }

    #[inline]
    pub fn max_uploads_per_frame(&self) -> usize {
        self.max_uploads_per_frame
    }

    /// Buffers handed to the GPU this frame, waiting for the next frame boundary.
    #[inline]
    pub fn pending_release(&self) -> usize {
        self.pinned.len() + self.staging.len()
    }

    /// Runs one frame: releases the previous frame's buffers, then uploads bricks from `receiver` without blocking.
    ///
    /// Every received id must already be in `cache`; a miss fails the tick with `StreamingError::MissingBrick`.
    /// `offset` maps a brick and the brick size onto its voxel offset in the GPU volume.
    pub fn tick(
        &mut self,
        receiver: &Receiver<BrickId>,
        cache: &MemoryCache<T>,
        uploader: &mut impl BrickUploader,
        offset: impl Fn(BrickId, i32) -> Point3i,
    ) -> StreamingResult<FrameStats> {
        let mut stats = FrameStats {
            released: self.pinned.len() + self.staging.release(),
            ..Default::default()
        };
        self.pinned.clear();

        while stats.dequeued < self.max_uploads_per_frame {
            let brick = match receiver.try_recv() {
                Ok(brick) => brick,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    stats.drained = true;
                    break;
                }
            };
            stats.dequeued += 1;

            let region = UploadRegion {
                offset: offset(brick, self.brick_size),
                extent: Point3i::fill(self.brick_edge),
            };
            match cache.get(brick).ok_or(StreamingError::MissingBrick(brick))? {
                BrickSample::Sampled(entry) => {
                    uploader.upload(region, entry.as_bytes(), self.mip_level, self.format)?;
                    stats.uploaded += 1;
                    stats.uploaded_bytes += entry.size_in_bytes();
                    self.pinned.push(entry);
                }
                BrickSample::Uniform(value) => {
                    uploader.fill(
                        region,
                        bytemuck::bytes_of(&value),
                        self.mip_level,
                        self.format,
                        &mut self.staging,
                    )?;
                    stats.filled += 1;
                    stats.uploaded_bytes += region.volume() * std::mem::size_of::<T>();
                }
            }
        }

        if stats.dequeued > 0 {
            tracing::trace!(?stats, "upload frame");
        }

        Ok(stats)
    }
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝
