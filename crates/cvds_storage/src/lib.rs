#![allow(clippy::too_many_arguments)]

//! Streaming of CVDS volumetric datasets from chunk files on disk into a host-side brick cache, and from there into a
//! GPU brick cache.
//!
//! The pipeline is:
//!   - `DatasetDescriptor`: the validated `metadata.json` of a dataset
//!   - `BrickIndexer`: maps a `BrickId` onto its chunk and onto bytes within the decompressed chunk
//!   - `BrickImporter`: reads, decompresses, and extracts one brick into a `MemoryCache`
//!   - `load_all_bricks_into_cache`: imports a whole resolution level on a worker pool, sending completed ids to a
//!     reply queue
//!   - `UploadLoop`: drains the reply queue a bounded number of bricks per frame into a `BrickUploader`
//!
//! `StreamingSession` wires these together for one dataset and one `StreamingConfig`.

pub mod addressing;
pub mod auxiliary;
pub mod caching;
pub mod compression;
pub mod config;
pub mod error;
pub mod importer;
pub mod loader;
pub mod metadata;
pub mod sample;
pub mod session;
pub mod upload;

pub use addressing::*;
pub use auxiliary::*;
pub use caching::*;
pub use compression::*;
pub use config::*;
pub use error::{StreamingError, StreamingResult};
pub use importer::*;
pub use loader::*;
pub use metadata::*;
pub use sample::*;
pub use session::*;
pub use upload::*;

// Hash types to use for small keys like `BrickId`.
pub type SmallKeyHashMap<K, V> = ahash::AHashMap<K, V>;
pub type SmallKeyBuildHasher = ahash::RandomState;

pub mod prelude {
    pub use super::{
        import_brick, load_all_bricks_into_cache, BrickImporter, BrickIndexer, BrickSample,
        BrickUploader, BulkLoadOptions, CacheEntry, CancellationToken, ColorDepth,
        DatasetDescriptor, DepthCache, FailurePolicy, LoadHandle, LoadReport, MemoryCache,
        ProgressSink, Sample, StreamingConfig, StreamingError, StreamingResult, StreamingSession,
        TextureFormat, UploadLoop, UploadRegion,
    };
}
