//! Decoding bricks out of chunk files and into a `MemoryCache`.

use crate::{
    addressing::{byte_array_offset, BrickIndexer},
    caching::{CacheEntry, MemoryCache},
    compression::{BytesCompression, Lz4Block},
    error::{read_file, StreamingError, StreamingResult},
    metadata::DatasetDescriptor,
    sample::Sample,
};

use cvds_core::prelude::*;

use std::mem::size_of;

/// Imports bricks of one size from one dataset.
#[derive(Clone, Debug)]
pub struct BrickImporter<'a> {
    descriptor: &'a DatasetDescriptor,
    indexer: BrickIndexer,
    codec: Lz4Block,
}

impl<'a> BrickImporter<'a> {
    pub fn new(
        descriptor: &'a DatasetDescriptor,
        brick_size: i32,
        ignore_inter_brick_interpolation: bool,
    ) -> StreamingResult<Self> {
        Ok(Self {
            descriptor,
            indexer: BrickIndexer::new(descriptor, brick_size, ignore_inter_brick_interpolation)?,
            codec: Lz4Block::default(),
        })
    }

    #[inline]
    pub fn descriptor(&self) -> &DatasetDescriptor {
        self.descriptor
    }

    #[inline]
    pub fn indexer(&self) -> &BrickIndexer {
        &self.indexer
    }

    /// Reads chunk `chunk_id` of `level` and returns its decompressed bytes.
    pub fn read_chunk(&self, level: u32, chunk_id: usize) -> StreamingResult<Vec<u8>> {
        let path = self.descriptor.chunk_filepath(level, chunk_id);
        let expected_len = self.indexer.layout().chunk_volume() * self.descriptor.bytes_per_sample();
        let bytes = read_file(path)?;

        if self.descriptor.lz4_compressed {
            self.codec
                .decompress_exact(&bytes, expected_len)
                .map_err(|e| StreamingError::decode(path, e.to_string()))
        } else if bytes.len() != expected_len {
            Err(StreamingError::decode(
                path,
                format!("chunk has {} bytes, expected {}", bytes.len(), expected_len),
            ))
        } else {
            Ok(bytes)
        }
    }

    /// Copies the samples of `brick` out of the decompressed bytes of the chunk that holds it.
    pub fn extract_brick<T: Sample>(&self, brick: BrickId, chunk: &[u8]) -> CacheEntry<T> {
        let layout = self.indexer.layout();
        let origin = self.indexer.brick_copy_origin(brick);
        let edge = layout.brick_edge as usize;
        let bytes_per_sample = size_of::<T>();
        let row_bytes = edge * bytes_per_sample;

        let mut data = Vec::with_capacity(layout.brick_volume());
        let mut min = None::<T>;
        let mut max = None::<T>;
        for row_start in (0..layout.brick_volume()).step_by(edge) {
            let start = byte_array_offset(
                row_start,
                origin,
                layout.chunk_edge,
                layout.brick_edge,
                bytes_per_sample,
            );
            for sample_bytes in chunk[start..start + row_bytes].chunks_exact(bytes_per_sample) {
                let sample: T = bytemuck::pod_read_unaligned(sample_bytes);
                min = Some(min.map_or(sample, |m| m.min(sample)));
                max = Some(max.map_or(sample, |m| m.max(sample)));
                data.push(sample);
            }
        }

        match (min, max) {
            (Some(min), Some(max)) if min == max => CacheEntry::uniform(min),
            (Some(min), Some(max)) => CacheEntry::new(data, min, max),
            _ => {
                let zero = bytemuck::Zeroable::zeroed();
                CacheEntry::new(data, zero, zero)
            }
        }
    }

    /// Reads, decodes, and extracts `brick`, then stores it in `cache`. Homogeneous bricks are stored without their
    /// samples.
    pub fn import<T: Sample>(&self, brick: BrickId, cache: &MemoryCache<T>) -> StreamingResult<()> {
        if T::COLOR_DEPTH != self.descriptor.color_depth {
            return Err(StreamingError::Config(format!(
                "cache samples are {:?} but the dataset stores {:?}",
                T::COLOR_DEPTH,
                self.descriptor.color_depth
            )));
        }

        if !self.indexer.contains_brick(brick) {
            return Err(StreamingError::Config(format!(
                "{} is outside the dataset's brick grid for brick size {}",
                brick,
                self.indexer.brick_size()
            )));
        }

        let chunk_id = self.indexer.brick_to_chunk_id(brick);
        let chunk = self.read_chunk(brick.resolution_level(), chunk_id)?;
        let entry = self.extract_brick::<T>(brick, &chunk);
        cache.set(brick, entry);

        Ok(())
    }
}

/// Imports a single brick of edge `brick_size` into `cache`.
pub fn import_brick<T: Sample>(
    descriptor: &DatasetDescriptor,
    brick: BrickId,
    brick_size: i32,
    cache: &MemoryCache<T>,
    ignore_inter_brick_interpolation: bool,
) -> StreamingResult<()> {
    BrickImporter::new(descriptor, brick_size, ignore_inter_brick_interpolation)?.import(brick, cache)
}

/// Stores a placeholder brick whose samples all equal `fill_value`.
pub fn generate_homogeneous_brick<T: Sample>(brick: BrickId, fill_value: T, cache: &MemoryCache<T>) {
    cache.set(brick, CacheEntry::uniform(fill_value));
}

/// Stores a placeholder brick that blends linearly from `v0` at its first Z slice to `v1` at its last.
pub fn generate_gradient_brick<T: Sample>(
    brick: BrickId,
    brick_size: i32,
    v0: T,
    v1: T,
    cache: &MemoryCache<T>,
) {
    let slice = (brick_size * brick_size) as usize;
    let last_slice = (brick_size - 1).max(1) as f32;
    let (f0, f1) = (v0.to_f32(), v1.to_f32());

    let data: Vec<T> = (0..cube(brick_size))
        .map(|i| {
            let t = (i / slice) as f32 / last_slice;
            T::from_f32((1.0 - t) * f0 + t * f1)
        })
        .collect();

    match CacheEntry::from_samples(data) {
        Some(entry) => cache.set(brick, entry),
        None => cache.set(brick, CacheEntry::uniform(v0)),
    }
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝

#[cfg(test)]
mod tests {
    use super::*;

    use crate::caching::BrickSample;

    use pretty_assertions::assert_eq;
    use std::path::Path;
    use tempdir::TempDir;
    use utilities::data_sets::{pattern_sample, SyntheticDataset};

    fn load(dataset: &SyntheticDataset) -> (TempDir, DatasetDescriptor) {
        let tmp = TempDir::new("cvds-importer").unwrap();
        dataset.write(tmp.path()).unwrap();
        let descriptor = DatasetDescriptor::load(tmp.path()).unwrap();

        (tmp, descriptor)
    }

    fn sampled(cache: &MemoryCache<u8>, brick: BrickId) -> std::sync::Arc<CacheEntry<u8>> {
        match cache.get(brick) {
            Some(BrickSample::Sampled(entry)) => entry,
            other => panic!("expected sampled {}, got {:?}", brick, other),
        }
    }

    /// Checks every sample of `brick` against the generator, shifted back by the padding shell when it is kept.
    fn assert_brick_matches_pattern(importer: &BrickImporter, cache: &MemoryCache<u8>, brick: BrickId) {
        let entry = sampled(cache, brick);
        let layout = importer.indexer().layout();
        let shell = (layout.brick_edge - importer.indexer().brick_size()) / 2;
        let origin = importer.indexer().volume_offset(brick) - Point3i::fill(shell);
        let shape = Point3i::fill(layout.brick_edge);

        assert_eq!(entry.data().len(), layout.brick_volume());
        for (i, &sample) in entry.data().iter().enumerate() {
            let p = origin + Point3i::delinearize(i, shape);
            let expected = pattern_sample(brick.resolution_level(), [p.x() as i64, p.y() as i64, p.z() as i64]);
            assert_eq!(sample, expected, "{} sample {}", brick, i);
        }
        assert_eq!(entry.min(), *entry.data().iter().min().unwrap());
        assert_eq!(entry.max(), *entry.data().iter().max().unwrap());
    }

    #[test]
    fn single_chunk_bricks_are_sub_cubes_of_the_chunk() {
        let dataset = SyntheticDataset::new(64, vec![[1, 1, 1]]);
        let (tmp, descriptor) = load(&dataset);
        let cache = MemoryCache::<u8>::new(16);

        import_brick(&descriptor, BrickId::new(0, 0), 32, &cache, true).unwrap();
        import_brick(&descriptor, BrickId::new(0, 1), 32, &cache, true).unwrap();

        let chunk = std::fs::read(tmp.path().join("resolution_level_0").join("chunk_0.cvds")).unwrap();
        let brick0 = sampled(&cache, BrickId::new(0, 0));
        let brick1 = sampled(&cache, BrickId::new(0, 1));
        for z in 0..32 {
            for y in 0..32 {
                for x in 0..32 {
                    let i = (z * 32 + y) * 32 + x;
                    assert_eq!(brick0.data()[i], chunk[(z * 64 + y) * 64 + x]);
                    assert_eq!(brick1.data()[i], chunk[(z * 64 + y) * 64 + x + 32]);
                }
            }
        }
    }

    #[test]
    fn every_brick_of_a_multi_chunk_level_matches_the_volume() {
        let dataset = SyntheticDataset::new(32, vec![[2, 2, 1], [1, 1, 1]]);
        let (_tmp, descriptor) = load(&dataset);
        let importer = BrickImporter::new(&descriptor, 16, true).unwrap();
        let cache = MemoryCache::<u8>::new(1024);

        for level in 0..2 {
            for i in 0..importer.indexer().total_bricks(level) {
                let brick = BrickId::new(level, i as u32);
                importer.import(brick, &cache).unwrap();
                assert_brick_matches_pattern(&importer, &cache, brick);
            }
        }
    }

    #[test]
    fn padded_chunks_with_interpolation_ignored_skip_the_shell() {
        let dataset = SyntheticDataset::new(32, vec![[2, 1, 1]]).with_padding(true);
        let (_tmp, descriptor) = load(&dataset);
        let importer = BrickImporter::new(&descriptor, 16, true).unwrap();
        let cache = MemoryCache::<u8>::new(64);

        for i in 0..importer.indexer().total_bricks(0) {
            let brick = BrickId::new(0, i as u32);
            importer.import(brick, &cache).unwrap();
            assert_brick_matches_pattern(&importer, &cache, brick);
        }
    }

    #[test]
    fn padded_chunks_with_interpolation_keep_the_shell() {
        let dataset = SyntheticDataset::new(32, vec![[2, 1, 1]]).with_padding(true);
        let (_tmp, descriptor) = load(&dataset);
        let importer = BrickImporter::new(&descriptor, 16, false).unwrap();
        let cache = MemoryCache::<u8>::new(64);

        for i in 0..importer.indexer().total_bricks(0) {
            let brick = BrickId::new(0, i as u32);
            importer.import(brick, &cache).unwrap();
            assert_brick_matches_pattern(&importer, &cache, brick);
        }
        assert_eq!(sampled(&cache, BrickId::new(0, 0)).data().len(), 18 * 18 * 18);
    }

    #[test]
    fn lz4_chunks_decode_to_the_same_bricks() {
        let raw = SyntheticDataset::new(32, vec![[1, 1, 1]]);
        let compressed = raw.clone().lz4_compressed(true);
        let (_raw_tmp, raw_descriptor) = load(&raw);
        let (_lz4_tmp, lz4_descriptor) = load(&compressed);
        let raw_cache = MemoryCache::<u8>::new(64);
        let lz4_cache = MemoryCache::<u8>::new(64);

        for i in 0..8 {
            let brick = BrickId::new(0, i);
            import_brick(&raw_descriptor, brick, 16, &raw_cache, true).unwrap();
            import_brick(&lz4_descriptor, brick, 16, &lz4_cache, true).unwrap();
            assert_eq!(raw_cache.get(brick), lz4_cache.get(brick));
        }
    }

    #[test]
    fn homogeneous_chunks_produce_uniform_bricks() {
        let dataset = SyntheticDataset::new(32, vec![[1, 1, 1]]).with_samples(|_, _| 17);
        let (_tmp, descriptor) = load(&dataset);
        let cache = MemoryCache::<u8>::new(4);

        for i in 0..8 {
            import_brick(&descriptor, BrickId::new(0, i), 16, &cache, true).unwrap();
        }

        assert_eq!(cache.len_resident(), 0);
        assert_eq!(cache.len_homogeneous(), 8);
        assert_eq!(cache.get(BrickId::new(0, 5)), Some(BrickSample::Uniform(17)));
    }

    fn chunk_path(root: &Path, name: &str) -> std::path::PathBuf {
        root.join("resolution_level_0").join(name)
    }

    #[test]
    fn truncated_raw_chunk_is_a_decode_error() {
        let (tmp, descriptor) = load(&SyntheticDataset::new(32, vec![[1, 1, 1]]));
        std::fs::write(chunk_path(tmp.path(), "chunk_0.cvds"), vec![0u8; 100]).unwrap();
        let cache = MemoryCache::<u8>::new(4);

        let result = import_brick(&descriptor, BrickId::new(0, 0), 16, &cache, true);

        assert!(matches!(result, Err(StreamingError::Decode { .. })));
        assert!(!cache.contains(BrickId::new(0, 0)));
    }

    #[test]
    fn corrupted_lz4_chunk_is_a_decode_error() {
        let (tmp, descriptor) = load(&SyntheticDataset::new(32, vec![[1, 1, 1]]).lz4_compressed(true));
        let path = chunk_path(tmp.path(), "chunk_0.cvds.lz4");
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        let cache = MemoryCache::<u8>::new(4);

        let result = import_brick(&descriptor, BrickId::new(0, 0), 16, &cache, true);

        assert!(matches!(result, Err(StreamingError::Decode { .. })));
    }

    #[test]
    fn chunk_removed_after_load_is_an_io_error() {
        let (tmp, descriptor) = load(&SyntheticDataset::new(32, vec![[1, 1, 1]]));
        std::fs::remove_file(chunk_path(tmp.path(), "chunk_0.cvds")).unwrap();
        let cache = MemoryCache::<u8>::new(4);

        let result = import_brick(&descriptor, BrickId::new(0, 0), 16, &cache, true);

        match result {
            Err(StreamingError::Io { path, .. }) => assert!(path.ends_with("chunk_0.cvds")),
            other => panic!("expected an I/O error, got {:?}", other),
        }
    }

    #[test]
    fn invalid_brick_sizes_and_ids_are_config_errors() {
        let (_tmp, descriptor) = load(&SyntheticDataset::new(32, vec![[1, 1, 1]]));
        let cache = MemoryCache::<u8>::new(4);

        for &brick_size in [0, 24, 64].iter() {
            let result = import_brick(&descriptor, BrickId::new(0, 0), brick_size, &cache, true);
            assert!(matches!(result, Err(StreamingError::Config(_))), "brick_size {}", brick_size);
        }
        for &brick in [BrickId::new(0, 8), BrickId::new(2, 0)].iter() {
            let result = import_brick(&descriptor, brick, 16, &cache, true);
            assert!(matches!(result, Err(StreamingError::Config(_))), "{}", brick);
        }
        assert_eq!(cache.len_resident() + cache.len_homogeneous(), 0);
    }

    #[test]
    fn sample_type_must_match_color_depth() {
        let (_tmp, descriptor) = load(&SyntheticDataset::new(32, vec![[1, 1, 1]]));
        let cache = MemoryCache::<u16>::new(4);

        let result = import_brick(&descriptor, BrickId::new(0, 0), 16, &cache, true);

        assert!(matches!(result, Err(StreamingError::Config(_))));
    }

    #[test]
    fn generated_bricks() {
        let cache = MemoryCache::new(4);

        generate_homogeneous_brick(BrickId::new(0, 0), 3u8, &cache);
        generate_gradient_brick(BrickId::new(0, 1), 8, 0u8, 70u8, &cache);
        generate_gradient_brick(BrickId::new(0, 2), 8, 5u8, 5u8, &cache);

        assert_eq!(cache.get(BrickId::new(0, 0)), Some(BrickSample::Uniform(3)));
        assert_eq!(cache.get(BrickId::new(0, 2)), Some(BrickSample::Uniform(5)));

        let gradient = sampled(&cache, BrickId::new(0, 1));
        assert_eq!((gradient.min(), gradient.max()), (0, 70));
        assert_eq!(gradient.data()[0], 0);
        assert_eq!(gradient.data()[64], 10);
        assert_eq!(gradient.data()[7 * 64 + 63], 70);
    }
}
