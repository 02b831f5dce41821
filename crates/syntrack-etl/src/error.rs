//! Error types for the alignment pipeline.

use std::path::PathBuf;
use syntrack_core::AlignmentError;
use thiserror::Error;

/// Errors from turning a media file into PCM samples.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The file could not be opened or read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The container format was not recognised or is corrupt.
    #[error("unsupported or corrupt media in {path}: {message}")]
    Format { path: PathBuf, message: String },

    /// The container holds no decodable audio track.
    #[error("no audio stream in {path}")]
    NoAudioTrack { path: PathBuf },

    /// The audio codec failed while decoding packets.
    #[error("codec error in {path}: {message}")]
    Codec { path: PathBuf, message: String },

    /// Sample rate conversion failed.
    #[error("cannot resample audio from {path}: {message}")]
    Resample { path: PathBuf, message: String },

    /// A decoded-audio artifact could not be written or read back.
    #[error("WAV artifact {path}: {message}")]
    Wav { path: PathBuf, message: String },
}

/// Errors from the embedding extractor.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no audio samples to embed")]
    EmptyInput,

    #[error("audio too short: {samples} samples, at least {needed} needed")]
    TooShort { samples: usize, needed: usize },

    #[error("audio is silent (peak {peak:.2e})")]
    Silent { peak: f32 },

    #[error("extractor is model {actual}, parameters ask for {expected}")]
    ModelMismatch { expected: String, actual: String },

    /// The model produced something that is not a valid embedding sequence.
    #[error("invalid extractor output: {0}")]
    InvalidOutput(String),
}

/// Errors from reading or writing persisted embeddings.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A persisted artifact exists but cannot be trusted.
    #[error("corrupt embedding artifact {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors from discovering songs and clips on disk.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog root not found: {0}")]
    MissingRoot(PathBuf),

    #[error("no songs found in {0}")]
    NoSongs(PathBuf),

    #[error("invalid catalog layout: {0}")]
    InvalidLayout(String),

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("song not in catalog: {0}")]
    UnknownSong(String),

    #[error("no clip {index:02} for song {song}")]
    UnknownClip { song: String, index: u32 },

    #[error("clip {index:02} of song {song} exists in several sources ({sources}); pick one")]
    AmbiguousClip {
        song: String,
        index: u32,
        sources: String,
    },

    #[error("no reference track for song {song} in {dir}")]
    MissingReference { song: String, dir: PathBuf },
}

/// Any failure while processing one pipeline item.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    #[error("results database: {0}")]
    Database(#[from] syntrack_core::Error),

    #[error("invalid extraction parameters: {0}")]
    InvalidParameters(String),

    /// The reference embedding for a song is neither cached nor computable.
    #[error("reference embedding for {song} is not available")]
    ReferenceUnavailable { song: String },

    /// Decoding or embedding one item panicked.
    #[error("processing panicked: {0}")]
    Panicked(String),

    /// A worker task was cancelled.
    #[error("worker failed: {0}")]
    Worker(String),
}

/// Convenience alias for pipeline results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
