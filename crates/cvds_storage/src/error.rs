use cvds_core::BrickId;

use std::io;
use std::path::{Path, PathBuf};

/// Everything that can go wrong while loading a dataset or streaming its bricks.
#[derive(Debug, thiserror::Error)]
pub enum StreamingError {
    /// The dataset descriptor is malformed or inconsistent.
    #[error("invalid dataset descriptor field `{field}`: {reason}")]
    Validation { field: &'static str, reason: String },

    /// A chunk or auxiliary file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Chunk bytes did not decode to the expected size.
    #[error("failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    /// A brick id was announced as loaded but is not resident in the memory cache.
    #[error("{0} is not resident in the memory cache")]
    MissingBrick(BrickId),

    #[error("invalid streaming configuration: {0}")]
    Config(String),

    #[error("failed to build importer thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A single brick failed during a bulk load.
    #[error("failed to import {brick}: {source}")]
    BrickImport {
        brick: BrickId,
        #[source]
        source: Box<StreamingError>,
    },

    #[error("failed to spawn the bulk load thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("the importer thread panicked")]
    ImporterPanicked,
}

pub type StreamingResult<T> = Result<T, StreamingError>;

impl StreamingError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        StreamingError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        StreamingError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn decode(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        StreamingError::Decode {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Reads a whole file, attaching the path to any failure.
pub(crate) fn read_file(path: &Path) -> StreamingResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| StreamingError::io(path, e))
}
