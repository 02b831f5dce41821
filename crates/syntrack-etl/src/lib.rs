//! Pipeline stages for syntrack.
//!
//! Discovers the catalog on disk, decodes clips and reference tracks,
//! extracts embeddings through a pluggable model, caches them on disk, and
//! aligns every clip against its song's reference.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod artifact;
pub mod audio;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod extractor;
pub mod pipeline;
pub mod report;

pub use cache::{CacheOutcome, CacheStats, EmbeddingCache};
pub use catalog::{Catalog, CatalogLayout, ClipSource, Song};
pub use config::Config;
pub use error::{
    CacheError, CatalogError, DecodeError, ExtractionError, PipelineError, PipelineResult,
};
pub use extractor::{extract_checked, EmbeddingExtractor, EnvelopeExtractor};
pub use pipeline::{Pipeline, RunOptions};
pub use report::{BatchReport, BatchSummary, ItemReport, ItemStatus, RunMode};
