use crate::{
    error::{StreamingError, StreamingResult},
    loader::{default_worker_count, BulkLoadOptions, FailurePolicy},
    metadata::DatasetDescriptor,
};

use cvds_core::prelude::*;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings of a streaming session. Every field has a default, so a config file only needs the fields it changes.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Edge length of a brick in voxels. A power of 2 dividing the dataset's chunk size.
    pub brick_size: i32,
    /// Host memory for non-homogeneous bricks, in MiB.
    pub memory_budget_mb: u64,
    /// Importer threads. `None` uses `default_worker_count()`.
    pub worker_count: Option<usize>,
    pub max_uploads_per_frame: usize,
    /// Drop the chunks' padding shell instead of keeping it around each brick.
    pub ignore_inter_brick_interpolation: bool,
    pub failure_policy: FailurePolicy,
    /// `None` makes the reply queue unbounded.
    pub reply_queue_capacity: Option<usize>,
    pub resolution_level: u32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            brick_size: 32,
            memory_budget_mb: 4096,
            worker_count: None,
            max_uploads_per_frame: 32,
            ignore_inter_brick_interpolation: true,
            failure_policy: FailurePolicy::BestEffort,
            reply_queue_capacity: None,
            resolution_level: 0,
        }
    }
}

impl StreamingConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> StreamingResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| StreamingError::io(path, e))?;

        serde_json::from_str(&text)
            .map_err(|e| StreamingError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Checks that these settings can stream `descriptor`.
    pub fn validate_for(&self, descriptor: &DatasetDescriptor) -> StreamingResult<()> {
        let chunk_size = descriptor.chunk_size;
        if !is_power_of_2(self.brick_size) || self.brick_size > chunk_size {
            return Err(StreamingError::Config(format!(
                "brick_size {} must be a power of 2 no larger than the chunk size {}",
                self.brick_size, chunk_size
            )));
        }
        if self.memory_budget_mb == 0 {
            return Err(StreamingError::Config(
                "memory_budget_mb must be positive".into(),
            ));
        }
        if self.worker_count == Some(0) {
            return Err(StreamingError::Config("worker_count must be positive".into()));
        }
        if self.max_uploads_per_frame == 0 {
            return Err(StreamingError::Config(
                "max_uploads_per_frame must be positive".into(),
            ));
        }
        if self.reply_queue_capacity == Some(0) {
            return Err(StreamingError::Config(
                "reply_queue_capacity must be positive".into(),
            ));
        }
        if self.resolution_level >= descriptor.nbr_resolution_levels() {
            return Err(StreamingError::Config(format!(
                "resolution_level {} does not exist, the dataset has {}",
                self.resolution_level,
                descriptor.nbr_resolution_levels()
            )));
        }

        // Brick indices have to fit beside the resolution level in a `BrickId`.
        let ratio = (chunk_size / self.brick_size) as u64;
        for level in 0..descriptor.nbr_resolution_levels() {
            let bricks = descriptor.nbr_chunks(level).volume() as u64 * ratio * ratio * ratio;
            if bricks > BrickId::INDEX_MASK as u64 + 1 {
                return Err(StreamingError::Config(format!(
                    "resolution level {} has {} bricks of size {}, more than a brick id can address",
                    level, bricks, self.brick_size
                )));
            }
        }

        Ok(())
    }

    /// Bulk load parameters for the configured resolution level.
    pub fn bulk_load_options(&self) -> BulkLoadOptions {
        BulkLoadOptions {
            brick_size: self.brick_size,
            resolution_level: self.resolution_level,
            worker_count: self.worker_count,
            ignore_inter_brick_interpolation: self.ignore_inter_brick_interpolation,
            failure_policy: self.failure_policy,
        }
    }

    pub fn effective_worker_count(&self) -> usize {
        self.worker_count.unwrap_or_else(default_worker_count)
    }
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝
