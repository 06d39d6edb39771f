//! Streams one resolution level of a CVDS dataset through the whole pipeline and reports what it did.
//!
//! The GPU is replaced by an uploader that only counts bytes, so this measures disk, decompression, and cache
//! throughput.

use cvds_streaming::prelude::*;
use cvds_streaming::storage::{FrameStats, ProgressCounter};

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Loads every brick of a resolution level of a CVDS dataset into a host cache and "uploads" it.
#[derive(Parser, Debug)]
#[command(name = "cvds_load")]
struct Args {
    /// Root directory of the dataset (holding metadata.json).
    dataset_root: PathBuf,

    /// JSON file with streaming settings. Flags below override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Resolution level to load.
    #[arg(short, long)]
    level: Option<u32>,

    /// Brick edge length in voxels.
    #[arg(short, long)]
    brick_size: Option<i32>,

    /// Importer threads.
    #[arg(short, long)]
    workers: Option<usize>,
}

#[derive(Default)]
struct ByteCountingUploader {
    uploads: usize,
    bytes: usize,
}

impl BrickUploader for ByteCountingUploader {
    fn upload(
        &mut self,
        _region: UploadRegion,
        source: &[u8],
        _mip_level: u32,
        _format: TextureFormat,
    ) -> StreamingResult<()> {
        self.uploads += 1;
        self.bytes += source.len();
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    if let Err(error) = run(args) {
        tracing::error!(%error, "cvds_load failed");
        std::process::exit(1);
    }
}

fn run(args: Args) -> StreamingResult<()> {
    let mut config = match &args.config {
        Some(path) => StreamingConfig::from_json_file(path)?,
        None => StreamingConfig::default(),
    };
    if let Some(level) = args.level {
        config.resolution_level = level;
    }
    if let Some(brick_size) = args.brick_size {
        config.brick_size = brick_size;
    }
    if args.workers.is_some() {
        config.worker_count = args.workers;
    }

    let descriptor = Arc::new(DatasetDescriptor::load(&args.dataset_root)?);
    config.validate_for(&descriptor)?;

    match DepthCache::for_dataset(&descriptor, &config) {
        DepthCache::Uint8(cache) => stream(StreamingSession::with_cache(descriptor, config, cache)?),
        DepthCache::Uint16(cache) => stream(StreamingSession::with_cache(descriptor, config, cache)?),
    }
}

fn stream<T: Sample>(session: StreamingSession<T>) -> StreamingResult<()> {
    let start = Instant::now();
    let progress = Arc::new(ProgressCounter::default());
    let indexer = session.indexer()?;
    let handle = session.start_level_load(progress.clone())?;

    let mut upload_loop = session.upload_loop();
    let mut uploader = ByteCountingUploader::default();
    let mut totals = FrameStats::default();
    let mut frames = 0usize;
    loop {
        let ticked = upload_loop.tick(handle.receiver(), session.cache(), &mut uploader, |brick, _| {
            indexer.volume_offset(brick)
        });
        let stats = match ticked {
            Ok(stats) => stats,
            Err(error) => {
                handle.cancel();
                return Err(error);
            }
        };
        frames += 1;
        totals.uploaded += stats.uploaded;
        totals.filled += stats.filled;
        totals.uploaded_bytes += stats.uploaded_bytes;
        if stats.drained {
            break;
        }
        if stats.dequeued == 0 {
            std::thread::yield_now();
        }
    }
    let report = handle.join()?;

    for failure in report.failures.iter() {
        tracing::warn!(brick = %failure.brick, error = %failure.error, "brick was not loaded");
    }
    println!("{}", progress.message());
    println!(
        "level {}: {} of {} bricks loaded, {} failed, {} resident, {} homogeneous",
        report.resolution_level,
        report.loaded,
        report.total,
        report.failures.len(),
        session.cache().len_resident(),
        session.cache().len_homogeneous()
    );
    println!(
        "{} frames: {} uploads, {} fills, {:.1} MiB in {:.2}s ({} bytes sent to the uploader)",
        frames,
        totals.uploaded,
        totals.filled,
        totals.uploaded_bytes as f64 / (1024.0 * 1024.0),
        start.elapsed().as_secs_f64(),
        uploader.bytes
    );

    Ok(())
}
