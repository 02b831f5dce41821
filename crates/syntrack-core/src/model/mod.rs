pub mod alignment;
pub mod catalog;
pub mod embedding;
pub mod ids;
pub mod params;
pub mod record;

pub use alignment::AlignmentResult;
pub use catalog::{Clip, ItemKey, ReferenceTrack, SongId};
pub use embedding::EmbeddingSequence;
pub use ids::{AlignmentId, RunId};
pub use params::{ContentType, ExtractionParameters, InputRepr};
pub use record::{AlignmentRecord, RunRecord};
