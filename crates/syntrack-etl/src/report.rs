//! Per-item and per-run reports, and their persistence in the results store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use syntrack_core::schema::Database;
use syntrack_core::{AlignmentRecord, AlignmentResult, Clip, ItemKey, RunRecord};

use crate::cache::CacheStats;
use crate::error::PipelineResult;

/// Which items a batch run covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// References first, then clips.
    #[default]
    All,
    /// Reference embeddings only.
    SongsOnly,
    /// Clip embeddings only; references are used only if already cached.
    ClipsOnly,
}

impl RunMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::SongsOnly => "songs-only",
            Self::ClipsOnly => "clips-only",
        }
    }

    #[must_use]
    pub fn includes_references(self) -> bool {
        !matches!(self, Self::ClipsOnly)
    }

    #[must_use]
    pub fn includes_clips(self) -> bool {
        !matches!(self, Self::SongsOnly)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum ItemStatus {
    /// At least one artifact was produced in this run.
    Computed,
    /// Every artifact was reused.
    Cached,
    Failed(String),
}

impl ItemStatus {
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Computed => f.write_str("computed"),
            Self::Cached => f.write_str("cached"),
            Self::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

/// What happened to one reference or clip.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub key: ItemKey,
    #[serde(flatten)]
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip: Option<Clip>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alignment: Option<AlignmentResult>,
    /// Why a successful clip has no alignment, if it has none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Artifacts this item produced or reused.
    pub artifacts: Vec<PathBuf>,
}

impl ItemReport {
    #[must_use]
    pub fn failed(key: ItemKey, clip: Option<Clip>, error: impl ToString) -> Self {
        Self {
            key,
            status: ItemStatus::Failed(error.to_string()),
            clip,
            alignment: None,
            note: None,
            artifacts: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self.key, ItemKey::Reference { .. })
    }
}

/// Counts shown at the end of a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub references: usize,
    pub clips: usize,
    pub computed: usize,
    pub cached: usize,
    pub failed: usize,
    pub aligned: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

/// Everything a batch run did, in catalog order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub mode: RunMode,
    pub params_tag: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub items: Vec<ItemReport>,
    pub cache: CacheStats,
}

impl BatchReport {
    #[must_use]
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            cache_hits: self.cache.hits,
            cache_misses: self.cache.misses,
            ..BatchSummary::default()
        };
        for item in &self.items {
            if item.is_reference() {
                summary.references += 1;
            } else {
                summary.clips += 1;
            }
            match item.status {
                ItemStatus::Computed => summary.computed += 1,
                ItemStatus::Cached => summary.cached += 1,
                ItemStatus::Failed(_) => summary.failed += 1,
            }
            if item.alignment.is_some() {
                summary.aligned += 1;
            }
        }
        summary
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|i| i.status.is_failed())
    }

    pub fn alignments(&self) -> impl Iterator<Item = (&Clip, &AlignmentResult)> {
        self.items
            .iter()
            .filter_map(|i| Some((i.clip.as_ref()?, i.alignment.as_ref()?)))
    }

    /// Store the run and every alignment it produced.
    pub fn persist(&self, db: &Database) -> PipelineResult<RunRecord> {
        let summary = self.summary();
        let mut run = RunRecord::start(self.mode.as_str());
        run.started_at = self.started_at;
        let mut run = run.finish(
            summary.computed + summary.cached,
            summary.failed,
            summary.aligned,
        );
        run.finished_at = Some(self.finished_at);
        db.save_run(&run)?;

        for (clip, alignment) in self.alignments() {
            let record = AlignmentRecord::new(clip, alignment, &self.params_tag).with_run(run.id);
            db.upsert_alignment(&record)?;
        }
        log::debug!("Recorded run {} with {} alignments", run.id, summary.aligned);
        Ok(run)
    }
}
