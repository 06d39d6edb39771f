//! Out-of-core streaming of large chunked, compressed volumetric datasets (CVDS) into a GPU brick cache.
//!
//! This library is organized into two crates:
//! - **core**: lattice points, power-of-2 helpers, and the packed `BrickId`
//! - **storage**: dataset metadata, brick addressing, chunk decoding, the host memory cache, the parallel bulk loader,
//!   and the frame-paced upload loop
//!
//! Start with `StreamingSession`, which opens a dataset and owns its cache, or with `load_all_bricks_into_cache` to
//! drive the pieces yourself.

pub use cvds_core as core;
pub use cvds_storage as storage;

pub mod prelude {
    pub use super::core::prelude::*;
    pub use super::storage::prelude::*;
}
