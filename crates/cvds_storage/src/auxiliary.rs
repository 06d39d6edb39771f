//! Readers for the auxiliary files of a dataset. The renderer uses them to skip homogeneous regions and to build
//! transfer functions; streaming bricks does not need them.

use crate::{
    error::{read_file, StreamingError, StreamingResult},
    metadata::DatasetDescriptor,
};

use bytemuck::{Pod, Zeroable};

/// One node of the residency octree, exactly as stored on disk (little-endian).
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ResidencyNode {
    pub center_x: f32,
    pub center_y: f32,
    pub center_z: f32,
    /// Half of the node's side length.
    pub side_halved: f32,
    pub data: u32,
}

impl ResidencyNode {
    pub const SIZE_IN_BYTES: usize = 20;

    fn from_le_bytes(bytes: &[u8]) -> Self {
        let mut node: Self = bytemuck::pod_read_unaligned(bytes);
        if cfg!(target_endian = "big") {
            node.center_x = f32::from_bits(node.center_x.to_bits().swap_bytes());
            node.center_y = f32::from_bits(node.center_y.to_bits().swap_bytes());
            node.center_z = f32::from_bits(node.center_z.to_bits().swap_bytes());
            node.side_halved = f32::from_bits(node.side_halved.to_bits().swap_bytes());
            node.data = node.data.swap_bytes();
        }

        node
    }
}

/// Number of nodes in a full octree of `max_depth` levels below the root.
pub fn residency_octree_node_count(max_depth: u32) -> u64 {
    ((1u64 << (3 * (max_depth + 1))) - 1) / 7
}

/// Reads `residency_octree.bin`.
pub fn import_residency_octree(descriptor: &DatasetDescriptor) -> StreamingResult<Vec<ResidencyNode>> {
    let path = descriptor.residency_octree_filepath();
    let bytes = read_file(&path)?;

    if bytes.len() % ResidencyNode::SIZE_IN_BYTES != 0 {
        return Err(StreamingError::decode(
            &path,
            format!(
                "{} bytes is not a whole number of {}-byte nodes",
                bytes.len(),
                ResidencyNode::SIZE_IN_BYTES
            ),
        ));
    }

    let nodes: Vec<ResidencyNode> = bytes
        .chunks_exact(ResidencyNode::SIZE_IN_BYTES)
        .map(ResidencyNode::from_le_bytes)
        .collect();
    if let Some(depth) = descriptor.octree.max_depth {
        let expected = residency_octree_node_count(depth);
        if nodes.len() as u64 != expected {
            tracing::warn!(
                nodes = nodes.len(),
                expected,
                depth,
                "residency octree is not full"
            );
        }
    }

    Ok(nodes)
}

/// Reads `histogram.bin`, checking the bin count when the descriptor declares one.
pub fn import_histogram(descriptor: &DatasetDescriptor) -> StreamingResult<Vec<u64>> {
    let path = descriptor.histogram_filepath();
    let bytes = read_file(&path)?;

    if bytes.len() % 8 != 0 {
        return Err(StreamingError::decode(
            &path,
            format!("{} bytes is not a whole number of u64 bins", bytes.len()),
        ));
    }
    let bins: Vec<u64> = bytes
        .chunks_exact(8)
        .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .collect();

    match descriptor.histogram_nbr_bins {
        Some(expected) if bins.len() as u64 != expected => Err(StreamingError::decode(
            &path,
            format!("found {} bins, expected {}", bins.len(), expected),
        )),
        _ => Ok(bins),
    }
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝
