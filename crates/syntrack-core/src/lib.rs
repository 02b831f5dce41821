//! Core domain model for syntrack.
//!
//! This crate defines embedding sequences and the parameters that produce
//! them, the catalog entities (songs, clip sources, clips), the alignment
//! engine that locates a clip inside its reference track, and the SQLite
//! schema that stores alignment results.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod align;
pub mod error;
pub mod model;
pub mod schema;

pub use align::{align, align_distances, AlignmentError};
pub use error::{Error, Result};
pub use model::{
    AlignmentId, AlignmentRecord, AlignmentResult, Clip, ContentType, EmbeddingSequence,
    ExtractionParameters, InputRepr, ItemKey, ReferenceTrack, RunId, RunRecord, SongId,
};
