//! The on-disk CVDS dataset descriptor.
//!
//! A CVDS dataset is a directory:
//!
//! ```text
//! <root>/
//!   metadata.json
//!   resolution_level_<L>/chunk_<id>.cvds       (or chunk_<id>.cvds.lz4 when LZ4 compressed)
//!   residency_octree.bin
//!   histogram.bin
//! ```
//!
//! `DatasetDescriptor::load` validates everything eagerly, including the existence of every chunk file, so that a loaded
//! descriptor can be shared read-only between importer threads without further checks.

use crate::{
    error::{StreamingError, StreamingResult},
    sample::ColorDepth,
};

use cvds_core::prelude::*;

use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const METADATA_FILENAME: &str = "metadata.json";
pub const RESIDENCY_OCTREE_FILENAME: &str = "residency_octree.bin";
pub const HISTOGRAM_FILENAME: &str = "histogram.bin";

pub const MIN_CHUNK_SIZE: i32 = 32;
pub const MAX_CHUNK_SIZE: i32 = 1024;

/// How coarser resolution levels were downsampled from finer ones.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DownsamplingInterpolation {
    Trilinear,
}

impl DownsamplingInterpolation {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TRILINEAR" => Some(DownsamplingInterpolation::Trilinear),
            _ => None,
        }
    }
}

/// Residency octree parameters. Not needed for streaming bricks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OctreeMetadata {
    pub max_depth: Option<u32>,
    pub smallest_subdivision: Option<[f32; 3]>,
}

/// Validated, immutable description of a CVDS dataset.
#[derive(Clone, Debug)]
pub struct DatasetDescriptor {
    pub root: PathBuf,
    pub original_dims: Point3i,
    /// Edge length of a (cubic) chunk, excluding padding. A power of 2 in `[32, 1024)`.
    pub chunk_size: i32,
    /// Whether every chunk carries a 1-voxel shell copied from its neighbors, for inter-chunk interpolation.
    pub chunk_padding: bool,
    /// Number of chunks along each axis, per resolution level. Level 0 is full resolution.
    pub nbr_chunks_per_level: Vec<Point3i>,
    pub color_depth: ColorDepth,
    pub force_8bit_conversion: bool,
    pub lz4_compressed: bool,
    pub decompressed_chunk_size_in_bytes: u64,
    pub downsampling_inter: DownsamplingInterpolation,
    /// Physical extent of one voxel in millimeters.
    pub voxel_dims: [f32; 3],
    pub euler_rotation: [f32; 3],
    /// Homogeneity measures, one triplet per tolerance.
    pub vdhms: Vec<[f32; 3]>,
    pub octree: OctreeMetadata,
    pub histogram_nbr_bins: Option<u64>,
    pub total_nbr_chunks: Option<Vec<i64>>,
    /// `chunk_filepaths[level][chunk_id]`, all checked to exist at load time.
    pub chunk_filepaths: Vec<Vec<PathBuf>>,
}

/// `metadata.json` as written by the dataset converter. Lengths are checked after parsing so that errors name the field.
#[derive(Deserialize)]
struct RawDescriptor {
    original_dims: Vec<i64>,
    chunk_size: i64,
    #[serde(default)]
    chunk_padding: bool,
    nbr_chunks_per_resolution_lvl: Vec<Vec<i64>>,
    #[serde(default)]
    total_nbr_chunks: Option<Vec<i64>>,
    nbr_resolution_lvls: i64,
    downsampling_inter: String,
    color_depth: i64,
    #[serde(default)]
    force_8bit_conversion: bool,
    lz4_compressed: bool,
    decompressed_chunk_size_in_bytes: u64,
    #[serde(default)]
    vdhms: Vec<Vec<f64>>,
    #[serde(default)]
    octree_max_depth: Option<u32>,
    #[serde(default)]
    octree_smallest_subdivision: Option<Vec<f64>>,
    #[serde(default)]
    histogram_nbr_bins: Option<u64>,
    voxel_dims: Vec<f64>,
    euler_rotation: Vec<f64>,
}

impl DatasetDescriptor {
    /// Parses and validates the dataset rooted at `root`.
    pub fn load(root: impl AsRef<Path>) -> StreamingResult<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(StreamingError::validation(
                "root",
                format!("{} is not a directory", root.display()),
            ));
        }
        let metadata_path = root.join(METADATA_FILENAME);
        if !metadata_path.is_file() {
            return Err(StreamingError::validation(
                METADATA_FILENAME,
                format!("not found in {}", root.display()),
            ));
        }
        let text = std::fs::read_to_string(&metadata_path)
            .map_err(|e| StreamingError::io(&metadata_path, e))?;
        let raw: RawDescriptor = serde_json::from_str(&text)
            .map_err(|e| StreamingError::validation(METADATA_FILENAME, e.to_string()))?;

        let descriptor = Self::validate(root, raw)?;
        tracing::info!(
            root = %root.display(),
            levels = descriptor.nbr_resolution_levels(),
            chunk_size = descriptor.chunk_size,
            lz4 = descriptor.lz4_compressed,
            "loaded CVDS dataset descriptor"
        );

        Ok(descriptor)
    }

    fn validate(root: &Path, raw: RawDescriptor) -> StreamingResult<Self> {
        let original_dims = point_from_ints("original_dims", &raw.original_dims)?;

        let chunk_size = raw.chunk_size;
        if chunk_size < MIN_CHUNK_SIZE as i64 || chunk_size >= MAX_CHUNK_SIZE as i64 {
            return Err(StreamingError::validation(
                "chunk_size",
                format!(
                    "{} is outside [{}, {})",
                    chunk_size, MIN_CHUNK_SIZE, MAX_CHUNK_SIZE
                ),
            ));
        }
        let chunk_size = chunk_size as i32;
        if !is_power_of_2(chunk_size) {
            return Err(StreamingError::validation(
                "chunk_size",
                format!("{} is not a power of 2", chunk_size),
            ));
        }

        if raw.nbr_resolution_lvls <= 0
            || raw.nbr_resolution_lvls > BrickId::MAX_RESOLUTION_LEVELS as i64
        {
            return Err(StreamingError::validation(
                "nbr_resolution_lvls",
                format!(
                    "{} is outside [1, {}]",
                    raw.nbr_resolution_lvls,
                    BrickId::MAX_RESOLUTION_LEVELS
                ),
            ));
        }
        let nbr_levels = raw.nbr_resolution_lvls as usize;

        let color_depth = ColorDepth::from_bits(raw.color_depth).ok_or_else(|| {
            StreamingError::validation(
                "color_depth",
                format!("unsupported value {}", raw.color_depth),
            )
        })?;

        let voxel_dims = floats3("voxel_dims", &raw.voxel_dims)?;
        if voxel_dims.iter().any(|&d| d <= 0.0) {
            return Err(StreamingError::validation(
                "voxel_dims",
                format!("{:?} must all be > 0", voxel_dims),
            ));
        }
        let euler_rotation = floats3("euler_rotation", &raw.euler_rotation)?;

        if raw.nbr_chunks_per_resolution_lvl.len() != nbr_levels {
            return Err(StreamingError::validation(
                "nbr_chunks_per_resolution_lvl",
                format!(
                    "has {} entries, expected one per resolution level ({})",
                    raw.nbr_chunks_per_resolution_lvl.len(),
                    nbr_levels
                ),
            ));
        }
        let nbr_chunks_per_level = raw
            .nbr_chunks_per_resolution_lvl
            .iter()
            .map(|entry| point_from_ints("nbr_chunks_per_resolution_lvl", entry))
            .collect::<StreamingResult<Vec<_>>>()?;

        let padded_chunk_size = chunk_size + if raw.chunk_padding { 2 } else { 0 };
        let expected_chunk_bytes = (cube(padded_chunk_size) * color_depth.bytes_per_sample()) as u64;
        if raw.decompressed_chunk_size_in_bytes != expected_chunk_bytes {
            return Err(StreamingError::validation(
                "decompressed_chunk_size_in_bytes",
                format!(
                    "{} does not match the chunk layout ({} bytes)",
                    raw.decompressed_chunk_size_in_bytes, expected_chunk_bytes
                ),
            ));
        }

        let vdhms = raw
            .vdhms
            .iter()
            .map(|entry| floats3("vdhms", entry))
            .collect::<StreamingResult<Vec<_>>>()?;
        let smallest_subdivision = raw
            .octree_smallest_subdivision
            .as_deref()
            .map(|s| floats3("octree_smallest_subdivision", s))
            .transpose()?;

        let chunk_filepaths = nbr_chunks_per_level
            .iter()
            .enumerate()
            .map(|(level, nbr_chunks)| {
                resolve_chunk_filepaths(root, level, nbr_chunks.volume(), raw.lz4_compressed)
            })
            .collect::<StreamingResult<Vec<_>>>()?;

        let downsampling_inter = DownsamplingInterpolation::parse(&raw.downsampling_inter)
            .ok_or_else(|| {
                StreamingError::validation(
                    "downsampling_inter",
                    format!("unknown interpolation {:?}", raw.downsampling_inter),
                )
            })?;

        Ok(Self {
            root: root.to_path_buf(),
            original_dims,
            chunk_size,
            chunk_padding: raw.chunk_padding,
            nbr_chunks_per_level,
            color_depth,
            force_8bit_conversion: raw.force_8bit_conversion,
            lz4_compressed: raw.lz4_compressed,
            decompressed_chunk_size_in_bytes: raw.decompressed_chunk_size_in_bytes,
            downsampling_inter,
            voxel_dims,
            euler_rotation,
            vdhms,
            octree: OctreeMetadata {
                max_depth: raw.octree_max_depth,
                smallest_subdivision,
            },
            histogram_nbr_bins: raw.histogram_nbr_bins,
            total_nbr_chunks: raw.total_nbr_chunks,
            chunk_filepaths,
        })
    }

    #[inline]
    pub fn nbr_resolution_levels(&self) -> u32 {
        self.nbr_chunks_per_level.len() as u32
    }

    /// Number of chunks along each axis of `level`.
    #[inline]
    pub fn nbr_chunks(&self, level: u32) -> Point3i {
        self.nbr_chunks_per_level[level as usize]
    }

    /// Chunk edge length including the padding shell, if any.
    #[inline]
    pub fn padded_chunk_size(&self) -> i32 {
        self.chunk_size + self.padding_offset()
    }

    /// 2 when chunks carry a padding shell, 0 otherwise.
    #[inline]
    pub fn padding_offset(&self) -> i32 {
        if self.chunk_padding {
            2
        } else {
            0
        }
    }

    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        self.color_depth.bytes_per_sample()
    }

    #[inline]
    pub fn chunk_filepath(&self, level: u32, chunk_id: usize) -> &Path {
        &self.chunk_filepaths[level as usize][chunk_id]
    }

    pub fn residency_octree_filepath(&self) -> PathBuf {
        self.root.join(RESIDENCY_OCTREE_FILENAME)
    }

    pub fn histogram_filepath(&self) -> PathBuf {
        self.root.join(HISTOGRAM_FILENAME)
    }
}

/// The directory holding all chunks of `level`.
pub fn resolution_level_dir(root: &Path, level: usize) -> PathBuf {
    root.join(format!("resolution_level_{}", level))
}

/// The file name of chunk `chunk_id`.
pub fn chunk_filename(chunk_id: usize, lz4_compressed: bool) -> String {
    if lz4_compressed {
        format!("chunk_{}.cvds.lz4", chunk_id)
    } else {
        format!("chunk_{}.cvds", chunk_id)
    }
}

fn resolve_chunk_filepaths(
    root: &Path,
    level: usize,
    nbr_chunks: usize,
    lz4_compressed: bool,
) -> StreamingResult<Vec<PathBuf>> {
    let level_dir = resolution_level_dir(root, level);
    (0..nbr_chunks)
        .map(|chunk_id| {
            let path = level_dir.join(chunk_filename(chunk_id, lz4_compressed));
            if path.is_file() {
                Ok(path)
            } else {
                Err(StreamingError::validation(
                    "chunk_filepaths",
                    format!("chunk file does not exist: {}", path.display()),
                ))
            }
        })
        .collect()
}

fn point_from_ints(field: &'static str, values: &[i64]) -> StreamingResult<Point3i> {
    if values.len() != 3 {
        return Err(StreamingError::validation(
            field,
            format!("has {} components, expected 3", values.len()),
        ));
    }
    if values.iter().any(|&v| v <= 0 || v > i32::MAX as i64) {
        return Err(StreamingError::validation(
            field,
            format!("{:?} must all be positive 32-bit integers", values),
        ));
    }

    Ok(PointN([values[0] as i32, values[1] as i32, values[2] as i32]))
}

fn floats3(field: &'static str, values: &[f64]) -> StreamingResult<[f32; 3]> {
    if values.len() != 3 {
        return Err(StreamingError::validation(
            field,
            format!("has {} components, expected 3", values.len()),
        ));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(StreamingError::validation(
            field,
            format!("{:?} are not all finite", values),
        ));
    }

    Ok([values[0] as f32, values[1] as f32, values[2] as f32])
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝
