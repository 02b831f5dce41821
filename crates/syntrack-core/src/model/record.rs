use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::alignment::AlignmentResult;
use crate::model::catalog::Clip;
use crate::model::ids::{AlignmentId, RunId};

/// A persisted alignment of one clip against its reference track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRecord {
    pub id: AlignmentId,
    pub song_id: String,
    pub source: String,
    /// [`Clip::id`] of the clip (unique within a song).
    pub clip_name: String,
    pub clip_path: String,
    pub offset_secs: f64,
    pub frame_index: usize,
    pub winning_votes: u32,
    pub clip_frames: usize,
    /// Extraction parameter tag the embeddings were produced with.
    pub params_tag: String,
    pub run_id: Option<RunId>,
    pub created_at: DateTime<Utc>,
}

impl AlignmentRecord {
    #[must_use]
    pub fn new(clip: &Clip, result: &AlignmentResult, params_tag: impl Into<String>) -> Self {
        Self {
            id: AlignmentId::new(),
            song_id: clip.song.to_string(),
            source: clip.source.clone(),
            clip_name: clip.id(),
            clip_path: clip.path.to_string_lossy().into_owned(),
            offset_secs: result.offset_secs,
            frame_index: result.frame_index,
            winning_votes: result.winning_votes(),
            clip_frames: result.clip_frames,
            params_tag: params_tag.into(),
            run_id: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_run(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn confidence(&self) -> f64 {
        if self.clip_frames == 0 {
            0.0
        } else {
            f64::from(self.winning_votes) / self.clip_frames as f64
        }
    }
}

/// Book-keeping for one batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    /// Selection mode, e.g. `all`, `songs-only`, `clips-only`.
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub succeeded: usize,
    pub failed: usize,
    pub aligned: usize,
}

impl RunRecord {
    #[must_use]
    pub fn start(mode: impl Into<String>) -> Self {
        Self {
            id: RunId::new(),
            mode: mode.into(),
            started_at: Utc::now(),
            finished_at: None,
            succeeded: 0,
            failed: 0,
            aligned: 0,
        }
    }

    #[must_use]
    pub fn finish(mut self, succeeded: usize, failed: usize, aligned: usize) -> Self {
        self.finished_at = Some(Utc::now());
        self.succeeded = succeeded;
        self.failed = failed;
        self.aligned = aligned;
        self
    }
}
