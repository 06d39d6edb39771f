//! The core data types for addressing chunked volumetric datasets:
//! - `PointN`: a lattice point, most importantly `Point3i`
//! - `BrickId`: a resolution level and linear brick index packed into 32 bits

pub mod brick_id;
pub mod int_math;
pub mod point;

pub use brick_id::BrickId;
pub use int_math::{cube, is_power_of_2};
pub use point::{Point3i, PointN};

pub mod prelude {
    pub use super::{cube, is_power_of_2, BrickId, Point3i, PointN};
}
