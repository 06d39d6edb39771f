//! Writes small CVDS datasets whose voxel values are a known function of their position, so tests can check every
//! extracted sample.

use serde_json::{json, Value};
use std::io;
use std::path::Path;

/// A dataset of 8-bit samples where the sample at logical voxel `p` of resolution `level` is `sample(level, p)`.
///
/// Logical coordinates start at 0 in the first chunk of a level. Padding shells hold the neighbors' samples, which is
/// `sample` evaluated one voxel outside the chunk (possibly at -1 or past the end of the volume).
#[derive(Clone, Debug)]
pub struct SyntheticDataset {
    pub chunk_size: i32,
    pub nbr_chunks_per_level: Vec<[i32; 3]>,
    pub chunk_padding: bool,
    pub lz4_compressed: bool,
    pub sample: fn(u32, [i64; 3]) -> u8,
}

/// A non-repeating (within a chunk row) pattern that differs per level.
pub fn pattern_sample(level: u32, p: [i64; 3]) -> u8 {
    (p[0] + 3 * p[1] + 7 * p[2] + 11 * level as i64).rem_euclid(251) as u8
}

impl SyntheticDataset {
    pub fn new(chunk_size: i32, nbr_chunks_per_level: Vec<[i32; 3]>) -> Self {
        Self {
            chunk_size,
            nbr_chunks_per_level,
            chunk_padding: false,
            lz4_compressed: false,
            sample: pattern_sample,
        }
    }

    pub fn with_padding(mut self, chunk_padding: bool) -> Self {
        self.chunk_padding = chunk_padding;
        self
    }

    pub fn lz4_compressed(mut self, lz4_compressed: bool) -> Self {
        self.lz4_compressed = lz4_compressed;
        self
    }

    pub fn with_samples(mut self, sample: fn(u32, [i64; 3]) -> u8) -> Self {
        self.sample = sample;
        self
    }

    pub fn padded_chunk_size(&self) -> i32 {
        self.chunk_size + if self.chunk_padding { 2 } else { 0 }
    }

    pub fn metadata_json(&self) -> Value {
        let padded = self.padded_chunk_size() as u64;
        let [nx, ny, nz] = self.nbr_chunks_per_level[0];
        let c = self.chunk_size;
        let total_nbr_chunks: Vec<i64> = self
            .nbr_chunks_per_level
            .iter()
            .map(|[x, y, z]| (*x as i64) * (*y as i64) * (*z as i64))
            .collect();

        json!({
            "original_dims": [nx * c, ny * c, nz * c],
            "chunk_size": c,
            "chunk_padding": self.chunk_padding,
            "nbr_chunks_per_resolution_lvl": self.nbr_chunks_per_level,
            "total_nbr_chunks": total_nbr_chunks,
            "nbr_resolution_lvls": self.nbr_chunks_per_level.len(),
            "downsampling_inter": "TRILINEAR",
            "color_depth": 8,
            "force_8bit_conversion": false,
            "lz4_compressed": self.lz4_compressed,
            "decompressed_chunk_size_in_bytes": padded * padded * padded,
            "vdhms": [],
            "voxel_dims": [1.0, 1.0, 1.0],
            "euler_rotation": [0.0, 0.0, 0.0],
        })
    }

    /// The decompressed bytes of chunk `chunk_id` of `level`, row-major with X fastest.
    pub fn chunk_bytes(&self, level: u32, chunk_id: usize) -> Vec<u8> {
        let [nx, ny, _] = self.nbr_chunks_per_level[level as usize];
        let (nx, ny) = (nx as usize, ny as usize);
        let chunk_coords = [
            (chunk_id % nx) as i64,
            ((chunk_id / nx) % ny) as i64,
            (chunk_id / (nx * ny)) as i64,
        ];
        let shell = if self.chunk_padding { 1 } else { 0 };
        let c = self.chunk_size as i64;
        let edge = self.padded_chunk_size() as i64;

        let mut bytes = Vec::with_capacity((edge * edge * edge) as usize);
        for z in 0..edge {
            for y in 0..edge {
                for x in 0..edge {
                    let p = [
                        chunk_coords[0] * c + x - shell,
                        chunk_coords[1] * c + y - shell,
                        chunk_coords[2] * c + z - shell,
                    ];
                    bytes.push((self.sample)(level, p));
                }
            }
        }

        bytes
    }

    /// Writes `metadata.json` and every chunk file under `root`.
    pub fn write(&self, root: &Path) -> io::Result<()> {
        std::fs::create_dir_all(root)?;
        write_metadata(root, &self.metadata_json())?;

        for (level, [x, y, z]) in self.nbr_chunks_per_level.iter().enumerate() {
            let level_dir = root.join(format!("resolution_level_{}", level));
            std::fs::create_dir_all(&level_dir)?;

            for chunk_id in 0..(x * y * z) as usize {
                let bytes = self.chunk_bytes(level as u32, chunk_id);
                if self.lz4_compressed {
                    let compressed = lz4::block::compress(&bytes, None, false)?;
                    std::fs::write(level_dir.join(format!("chunk_{}.cvds.lz4", chunk_id)), compressed)?;
                } else {
                    std::fs::write(level_dir.join(format!("chunk_{}.cvds", chunk_id)), bytes)?;
                }
            }
        }

        Ok(())
    }
}

pub fn write_metadata(root: &Path, metadata: &Value) -> io::Result<()> {
    let text = serde_json::to_string_pretty(metadata)?;

    std::fs::write(root.join("metadata.json"), text)
}

/// Writes `residency_octree.bin` from `(center x, center y, center z, side halved)` and payload pairs.
pub fn write_residency_octree(root: &Path, nodes: &[([f32; 4], u32)]) -> io::Result<()> {
    let mut bytes = Vec::with_capacity(nodes.len() * 20);
    for (floats, data) in nodes {
        for f in floats {
            bytes.extend_from_slice(&f.to_le_bytes());
        }
        bytes.extend_from_slice(&data.to_le_bytes());
    }

    std::fs::write(root.join("residency_octree.bin"), bytes)
}

pub fn write_histogram(root: &Path, bins: &[u64]) -> io::Result<()> {
    let bytes: Vec<u8> = bins.iter().flat_map(|b| b.to_le_bytes().to_vec()).collect();

    std::fs::write(root.join("histogram.bin"), bytes)
}
