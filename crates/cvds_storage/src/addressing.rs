//! Pure arithmetic mapping a `BrickId` onto the chunk holding it and onto bytes of that chunk.
//!
//! Within a resolution level, brick indices increase fastest along X, then Y, then Z, over the level's whole brick
//! grid (`nbr_chunks * chunk_size / brick_size` bricks per axis). Chunks are stored row-major with the same axis order.

use crate::{
    error::{StreamingError, StreamingResult},
    metadata::DatasetDescriptor,
};

use cvds_core::prelude::*;

/// Calculates chunk ids, offsets, and byte ranges for bricks of a fixed size.
#[derive(Clone, Debug)]
pub struct BrickIndexer {
    chunk_size: i32,
    brick_size: i32,
    ratio: i32,
    nbr_chunks_per_level: Vec<Point3i>,
    layout: BrickLayout,
}

/// The edge lengths (in voxels) used when copying a brick out of a decompressed chunk.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BrickLayout {
    /// Edge of the chunk buffer, including any padding shell.
    pub chunk_edge: i32,
    /// Edge of the extracted brick, including the padding shell when it is kept.
    pub brick_edge: i32,
    /// Added to the brick's offset on every axis to skip the padding shell.
    pub base_shift: i32,
}

impl BrickLayout {
    pub fn new(chunk_size: i32, brick_size: i32, chunk_padding: bool, ignore_inter_brick_interpolation: bool) -> Self {
        match (chunk_padding, ignore_inter_brick_interpolation) {
            (false, _) => Self {
                chunk_edge: chunk_size,
                brick_edge: brick_size,
                base_shift: 0,
            },
            (true, false) => Self {
                chunk_edge: chunk_size + 2,
                brick_edge: brick_size + 2,
                base_shift: 0,
            },
            (true, true) => Self {
                chunk_edge: chunk_size + 2,
                brick_edge: brick_size,
                base_shift: 1,
            },
        }
    }

    /// Number of samples in an extracted brick.
    #[inline]
    pub fn brick_volume(&self) -> usize {
        cube(self.brick_edge)
    }

    /// Number of samples in a decompressed chunk.
    #[inline]
    pub fn chunk_volume(&self) -> usize {
        cube(self.chunk_edge)
    }
}

impl BrickIndexer {
    /// `brick_size` must be a power of 2 that divides the descriptor's chunk size, otherwise this is a
    /// `StreamingError::Config`.
    pub fn new(
        descriptor: &DatasetDescriptor,
        brick_size: i32,
        ignore_inter_brick_interpolation: bool,
    ) -> StreamingResult<Self> {
        let chunk_size = descriptor.chunk_size;
        if !is_power_of_2(brick_size) || brick_size > chunk_size {
            return Err(StreamingError::Config(format!(
                "brick_size {} must be a power of 2 dividing the chunk size {}",
                brick_size, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            brick_size,
            ratio: chunk_size / brick_size,
            nbr_chunks_per_level: descriptor.nbr_chunks_per_level.clone(),
            layout: BrickLayout::new(
                chunk_size,
                brick_size,
                descriptor.chunk_padding,
                ignore_inter_brick_interpolation,
            ),
        })
    }

    #[inline]
    pub fn brick_size(&self) -> i32 {
        self.brick_size
    }

    #[inline]
    pub fn chunk_size(&self) -> i32 {
        self.chunk_size
    }

    /// Bricks per chunk along each axis.
    #[inline]
    pub fn ratio(&self) -> i32 {
        self.ratio
    }

    #[inline]
    pub fn layout(&self) -> BrickLayout {
        self.layout
    }

    #[inline]
    pub fn contains_level(&self, level: u32) -> bool {
        (level as usize) < self.nbr_chunks_per_level.len()
    }

    /// Whether `brick` names a resolution level of the dataset and an index inside that level's brick grid.
    #[inline]
    pub fn contains_brick(&self, brick: BrickId) -> bool {
        self.contains_level(brick.resolution_level())
            && (brick.index() as usize) < self.total_bricks(brick.resolution_level())
    }

    /// Number of bricks in resolution `level`, which must exist.
    #[inline]
    pub fn total_bricks(&self, level: u32) -> usize {
        self.nbr_chunks_per_level[level as usize].volume() * cube(self.ratio)
    }

    /// Number of bricks along each axis of resolution `level`.
    #[inline]
    pub fn brick_grid_shape(&self, level: u32) -> Point3i {
        self.nbr_chunks_per_level[level as usize] * self.ratio
    }

    /// The linear id of the chunk containing `brick`, within the brick's resolution level.
    #[inline]
    pub fn brick_to_chunk_id(&self, brick: BrickId) -> usize {
        self.debug_assert_in_range(brick);

        let nbr_chunks = self.nbr_chunks_per_level[brick.resolution_level() as usize];
        let (nx, ny) = (nbr_chunks.x() as usize, nbr_chunks.y() as usize);
        let r = self.ratio as usize;
        let id = brick.index() as usize;

        (id / (nx * ny * r * r * r)) * nx * ny + ((id / (nx * r * r)) % ny) * nx + (id % (nx * r)) / r
    }

    /// The voxel offset of `brick` within its chunk, excluding any padding shell.
    #[inline]
    pub fn brick_offset_within_chunk(&self, brick: BrickId) -> Point3i {
        self.debug_assert_in_range(brick);

        let nbr_chunks = self.nbr_chunks_per_level[brick.resolution_level() as usize];
        let (nx, ny) = (nbr_chunks.x() as u32, nbr_chunks.y() as u32);
        let r = self.ratio as u32;
        let id = brick.index();

        let x = (id % (nx * r)) % r;
        let y = (id / (nx * r)) % r;
        let z = (id / (nx * ny * r * r)) % r;

        PointN([x as i32, y as i32, z as i32]) * self.brick_size
    }

    /// The offset where copying the brick out of the chunk buffer begins, including the padding shift.
    #[inline]
    pub fn brick_copy_origin(&self, brick: BrickId) -> Point3i {
        self.brick_offset_within_chunk(brick) + Point3i::fill(self.layout.base_shift)
    }

    /// The voxel offset of `brick` in a volume holding the whole brick grid of its level, with the origin at the
    /// top-left and X fastest. This is where the renderer expects the brick in its GPU cache.
    #[inline]
    pub fn volume_offset(&self, brick: BrickId) -> Point3i {
        let grid = self.brick_grid_shape(brick.resolution_level());
        let id = brick.index() as i32;
        let (nbx, nby) = (grid.x(), grid.y());

        PointN([id % nbx, (id / nbx) % nby, id / (nbx * nby)]) * self.brick_size
    }

    #[inline]
    fn debug_assert_in_range(&self, brick: BrickId) {
        debug_assert!(self.contains_brick(brick), "{} is outside the dataset", brick);
    }
}

/// Maps the linear index `i` of a sample within a brick of edge `brick_size_padded` onto the byte offset of that
/// sample in a row-major chunk buffer of edge `chunk_size_padded`, given the brick begins at `offset` in the chunk.
#[inline]
pub fn byte_array_offset(
    i: usize,
    offset: Point3i,
    chunk_size_padded: i32,
    brick_size_padded: i32,
    bytes_per_sample: usize,
) -> usize {
    let b = brick_size_padded as usize;
    let c = chunk_size_padded as usize;
    let (ox, oy, oz) = (offset.x() as usize, offset.y() as usize, offset.z() as usize);

    ((oz + i / (b * b)) * c * c + (oy + (i / b) % b) * c + ox + i % b) * bytes_per_sample
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝
