//! Orchestration: decode, extract or load, and align every catalog item.
//!
//! A run has two phases. Reference embeddings come first so every clip of a
//! song can be aligned against the same in-memory sequence; clips follow.
//! A failing item is logged and reported, and the run moves on.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use syntrack_core::{align, AlignmentResult, Clip, EmbeddingSequence, ExtractionParameters, ItemKey, SongId};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::audio::{peak_normalize, read_wav, write_wav_atomic, DecodedAudio, MediaDecoder};
use crate::cache::{CacheOutcome, EmbeddingCache};
use crate::catalog::{Catalog, Song};
use crate::error::{ExtractionError, PipelineError, PipelineResult};
use crate::extractor::{extract_checked, EmbeddingExtractor};
use crate::report::{BatchReport, ItemReport, ItemStatus, RunMode};

/// Knobs for a batch or single-item run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: RunMode,
    /// Decode clips again even when their WAV artifact exists.
    pub force_extract: bool,
    /// Recompute embeddings even when their artifact exists.
    pub refresh_embeddings: bool,
    /// Restrict the run to one song.
    pub song: Option<String>,
    /// Restrict the run to clips with this index.
    pub clip: Option<u32>,
    /// Items processed concurrently by [`Pipeline::run_parallel`].
    pub jobs: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: RunMode::All,
            force_extract: false,
            refresh_embeddings: false,
            song: None,
            clip: None,
            jobs: 1,
        }
    }
}

/// A reference embedding ready for alignment.
#[derive(Debug, Clone)]
pub struct PreparedReference {
    pub embedding: Arc<EmbeddingSequence>,
    pub outcome: CacheOutcome,
    pub artifact: PathBuf,
}

/// Everything produced for one clip.
#[derive(Debug, Clone)]
pub struct ClipOutcome {
    pub embedding: Arc<EmbeddingSequence>,
    pub outcome: CacheOutcome,
    /// Whether the clip was decoded in this call.
    pub decoded: bool,
    pub wav_path: PathBuf,
    pub embedding_path: PathBuf,
    pub alignment: Option<AlignmentResult>,
}

impl ClipOutcome {
    fn status(&self) -> ItemStatus {
        if self.decoded || self.outcome == CacheOutcome::Computed {
            ItemStatus::Computed
        } else {
            ItemStatus::Cached
        }
    }
}

/// One decoder, extractor and cache shared by every entry point.
pub struct Pipeline {
    params: ExtractionParameters,
    cache: EmbeddingCache,
    decoder: Arc<dyn MediaDecoder>,
    extractor: Arc<dyn EmbeddingExtractor>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("params", &self.params)
            .field("cache", &self.cache.root())
            .field("model", &self.extractor.model())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// # Errors
    ///
    /// Fails when the parameters are invalid or name a different model than
    /// `extractor` implements.
    pub fn new(
        params: ExtractionParameters,
        cache: EmbeddingCache,
        decoder: Arc<dyn MediaDecoder>,
        extractor: Arc<dyn EmbeddingExtractor>,
    ) -> PipelineResult<Self> {
        params
            .validate()
            .map_err(|e| PipelineError::InvalidParameters(e.to_string()))?;
        if extractor.model() != params.model {
            return Err(ExtractionError::ModelMismatch {
                expected: params.model.clone(),
                actual: extractor.model().to_string(),
            }
            .into());
        }
        Ok(Self {
            params,
            cache,
            decoder,
            extractor,
        })
    }

    #[must_use]
    pub fn params(&self) -> &ExtractionParameters {
        &self.params
    }

    #[must_use]
    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Load or compute the reference embedding of `song`.
    ///
    /// The reference file is only located when the embedding has to be
    /// computed, so a cached embedding stays usable after the audio moves.
    pub fn process_reference(
        &self,
        catalog: &Catalog,
        song: &Song,
        refresh: bool,
    ) -> PipelineResult<PreparedReference> {
        let key = ItemKey::Reference {
            song: song.id.clone(),
        };
        let artifact = self.cache.artifact_path(&key, &self.params);
        let (embedding, outcome) = self.cache.get_or_compute(
            &key,
            &self.params,
            refresh,
            || -> PipelineResult<EmbeddingSequence> {
                let track = catalog.reference_track(song)?;
                log::info!("Embedding reference {}", track.path.display());
                let audio = self.decoder.decode(&track.path, self.params.sample_rate)?;
                Ok(extract_checked(
                    self.extractor.as_ref(),
                    &audio.samples,
                    &self.params,
                )?)
            },
        )?;

        Ok(PreparedReference {
            embedding,
            outcome,
            artifact,
        })
    }

    /// Make sure the decoded WAV of `clip` exists.
    ///
    /// Returns the artifact path, plus the decoded audio when it was decoded
    /// in this call.
    pub fn ensure_clip_wav(
        &self,
        catalog: &Catalog,
        clip: &Clip,
        force: bool,
    ) -> PipelineResult<(PathBuf, Option<DecodedAudio>)> {
        let wav_path = catalog.wav_path(clip);
        if wav_path.exists() && !force {
            log::debug!("Reusing {}", wav_path.display());
            return Ok((wav_path, None));
        }

        log::info!("Decoding {}", clip.path.display());
        let audio = self.decoder.decode(&clip.path, self.params.sample_rate)?;
        write_wav_atomic(&wav_path, &audio)?;
        Ok((wav_path, Some(audio)))
    }

    /// Decode, embed and, when `reference` is given, align one clip.
    pub fn process_clip(
        &self,
        catalog: &Catalog,
        clip: &Clip,
        reference: Option<&EmbeddingSequence>,
        options: &RunOptions,
    ) -> PipelineResult<ClipOutcome> {
        let (wav_path, decoded_audio) = self.ensure_clip_wav(catalog, clip, options.force_extract)?;
        let decoded = decoded_audio.is_some();

        let key = ItemKey::from(clip);
        let embedding_path = self.cache.artifact_path(&key, &self.params);
        let (embedding, outcome) = self.cache.get_or_compute(
            &key,
            &self.params,
            options.refresh_embeddings,
            || -> PipelineResult<EmbeddingSequence> {
                let mut samples = match decoded_audio {
                    Some(audio) => audio.samples,
                    None => read_wav(&wav_path, self.params.sample_rate)?.samples,
                };
                peak_normalize(&mut samples);
                Ok(extract_checked(
                    self.extractor.as_ref(),
                    &samples,
                    &self.params,
                )?)
            },
        )?;

        let alignment = reference
            .map(|reference| align(&embedding, reference))
            .transpose()?;

        Ok(ClipOutcome {
            embedding,
            outcome,
            decoded,
            wav_path,
            embedding_path,
            alignment,
        })
    }

    /// Align one clip end to end. Errors propagate instead of being reported.
    pub fn align_single(
        &self,
        catalog: &Catalog,
        song: &str,
        clip_index: u32,
        source: Option<&str>,
        options: &RunOptions,
    ) -> PipelineResult<ItemReport> {
        let clip = catalog.find_clip(song, clip_index, source)?;
        let song = catalog.song(song)?;
        let reference =
            isolate_panics(|| self.process_reference(catalog, song, options.refresh_embeddings))?;
        let outcome = isolate_panics(|| {
            self.process_clip(catalog, clip, Some(reference.embedding.as_ref()), options)
        })?;

        let status = outcome.status();
        let alignment = outcome
            .alignment
            .ok_or_else(|| PipelineError::ReferenceUnavailable {
                song: song.id.to_string(),
            })?;
        log::info!("{clip}: {alignment}");

        Ok(ItemReport {
            key: ItemKey::from(clip),
            status,
            clip: Some(clip.clone()),
            alignment: Some(alignment),
            note: None,
            artifacts: vec![reference.artifact, outcome.wav_path, outcome.embedding_path],
        })
    }

    fn reference_item(
        &self,
        catalog: &Catalog,
        song: &Song,
        options: &RunOptions,
    ) -> (ItemReport, Option<Arc<EmbeddingSequence>>) {
        let key = ItemKey::Reference {
            song: song.id.clone(),
        };
        match isolate_panics(|| self.process_reference(catalog, song, options.refresh_embeddings)) {
            Ok(reference) => {
                let status = match reference.outcome {
                    CacheOutcome::Computed => ItemStatus::Computed,
                    CacheOutcome::Hit => ItemStatus::Cached,
                };
                log::info!("{key}: {status}");
                let item = ItemReport {
                    key,
                    status,
                    clip: None,
                    alignment: None,
                    note: None,
                    artifacts: vec![reference.artifact],
                };
                (item, Some(reference.embedding))
            }
            Err(e) => {
                log::error!("{key} failed: {e}");
                (ItemReport::failed(key, None, e), None)
            }
        }
    }

    fn clip_item(
        &self,
        catalog: &Catalog,
        clip: &Clip,
        reference: Option<&EmbeddingSequence>,
        options: &RunOptions,
    ) -> ItemReport {
        let key = ItemKey::from(clip);
        match isolate_panics(|| self.process_clip(catalog, clip, reference, options)) {
            Ok(outcome) => {
                let status = outcome.status();
                let note = match &outcome.alignment {
                    Some(alignment) => {
                        log::info!("{clip}: {status}, {alignment}");
                        None
                    }
                    None => {
                        log::info!("{clip}: {status}, not aligned (no reference embedding)");
                        Some("reference embedding unavailable".to_string())
                    }
                };
                ItemReport {
                    key,
                    status,
                    clip: Some(clip.clone()),
                    alignment: outcome.alignment,
                    note,
                    artifacts: vec![outcome.wav_path, outcome.embedding_path],
                }
            }
            Err(e) => {
                log::error!("{clip} failed: {e}");
                ItemReport::failed(key, Some(clip.clone()), e)
            }
        }
    }

    /// Reference embeddings already in the cache, for runs that must not
    /// compute them.
    fn cached_references(&self, songs: &[&Song]) -> HashMap<SongId, Arc<EmbeddingSequence>> {
        let mut references = HashMap::new();
        for song in songs {
            let key = ItemKey::Reference {
                song: song.id.clone(),
            };
            match self.cache.load(&key, &self.params) {
                Ok(Some(embedding)) => {
                    references.insert(song.id.clone(), embedding);
                }
                Ok(None) => log::warn!("{key}: not cached, clips of this song will not be aligned"),
                Err(e) => log::warn!("{key}: {e}"),
            }
        }
        references
    }

    fn finish(&self, mode: RunMode, started_at: DateTime<Utc>, items: Vec<ItemReport>) -> BatchReport {
        let report = BatchReport {
            mode,
            params_tag: self.params.tag(),
            started_at,
            finished_at: Utc::now(),
            items,
            cache: self.cache.stats(),
        };
        let summary = report.summary();
        log::info!(
            "Run complete: {} computed, {} cached, {} failed, {} aligned",
            summary.computed,
            summary.cached,
            summary.failed,
            summary.aligned
        );
        report
    }

    /// Process the selected part of the catalog one item at a time.
    ///
    /// # Errors
    ///
    /// Only a song filter naming an unknown song fails the run; item
    /// failures are recorded in the report.
    pub fn run(&self, catalog: &Catalog, options: &RunOptions) -> PipelineResult<BatchReport> {
        let started_at = Utc::now();
        let songs = selected_songs(catalog, options)?;
        let mut items = Vec::new();
        let mut references = HashMap::new();

        if options.mode.includes_references() {
            for (i, song) in songs.iter().enumerate() {
                log::debug!("[{}/{}] reference {}", i + 1, songs.len(), song.id);
                let (item, embedding) = self.reference_item(catalog, song, options);
                if let Some(embedding) = embedding {
                    references.insert(song.id.clone(), embedding);
                }
                items.push(item);
            }
        }

        if options.mode.includes_clips() {
            if !options.mode.includes_references() {
                references = self.cached_references(&songs);
            }
            let clips = selected_clips(&songs, options);
            for (i, clip) in clips.iter().enumerate() {
                log::debug!("[{}/{}] clip {clip}", i + 1, clips.len());
                let reference = references.get(&clip.song).map(Arc::as_ref);
                items.push(self.clip_item(catalog, clip, reference, options));
            }
        }

        Ok(self.finish(options.mode, started_at, items))
    }

    /// Like [`Pipeline::run`], with up to `options.jobs` items in flight on
    /// blocking worker threads.
    pub async fn run_parallel(
        self: Arc<Self>,
        catalog: Arc<Catalog>,
        options: RunOptions,
    ) -> PipelineResult<BatchReport> {
        if options.jobs <= 1 {
            return tokio::task::spawn_blocking(move || self.run(&catalog, &options))
                .await
                .map_err(|e| PipelineError::Worker(e.to_string()))?;
        }

        let started_at = Utc::now();
        let songs: Vec<Song> = selected_songs(&catalog, &options)?
            .into_iter()
            .cloned()
            .collect();
        let options = Arc::new(options);
        let mut items = Vec::new();
        let mut references = HashMap::new();

        if options.mode.includes_references() {
            let (this, catalog, opts) = (Arc::clone(&self), Arc::clone(&catalog), Arc::clone(&options));
            let results = run_bounded(songs.clone(), options.jobs, move |song: Song| {
                let (item, embedding) = this.reference_item(&catalog, &song, &opts);
                (song.id, item, embedding)
            })
            .await?;
            for (song, item, embedding) in results {
                if let Some(embedding) = embedding {
                    references.insert(song, embedding);
                }
                items.push(item);
            }
        }

        if options.mode.includes_clips() {
            if !options.mode.includes_references() {
                let this = Arc::clone(&self);
                let songs = songs.clone();
                references = tokio::task::spawn_blocking(move || {
                    let songs: Vec<&Song> = songs.iter().collect();
                    this.cached_references(&songs)
                })
                .await
                .map_err(|e| PipelineError::Worker(e.to_string()))?;
            }

            let song_refs: Vec<&Song> = songs.iter().collect();
            let clips: Vec<Clip> = selected_clips(&song_refs, &options)
                .into_iter()
                .cloned()
                .collect();
            let references = Arc::new(references);
            let (this, catalog, opts) = (Arc::clone(&self), Arc::clone(&catalog), Arc::clone(&options));
            let results = run_bounded(clips, options.jobs, move |clip: Clip| {
                let reference = references.get(&clip.song).map(Arc::as_ref);
                this.clip_item(&catalog, &clip, reference, &opts)
            })
            .await?;
            items.extend(results);
        }

        Ok(self.finish(options.mode, started_at, items))
    }
}

/// Run one item, turning a panic in a decoder or model into an item error.
fn isolate_panics<T>(work: impl FnOnce() -> PipelineResult<T>) -> PipelineResult<T> {
    catch_unwind(AssertUnwindSafe(work))
        .unwrap_or_else(|payload| Err(PipelineError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn selected_songs<'a>(catalog: &'a Catalog, options: &RunOptions) -> PipelineResult<Vec<&'a Song>> {
    match &options.song {
        Some(id) => Ok(vec![catalog.song(id)?]),
        None => Ok(catalog.songs().iter().collect()),
    }
}

fn selected_clips<'a>(songs: &[&'a Song], options: &RunOptions) -> Vec<&'a Clip> {
    let clips: Vec<&Clip> = songs
        .iter()
        .flat_map(|song| song.clips())
        .filter(|clip| options.clip.map_or(true, |index| clip.index == index))
        .collect();
    if clips.is_empty() {
        log::warn!("No clips selected");
    }
    clips
}

/// Run `work` over `inputs` on blocking threads, at most `jobs` at a time,
/// returning results in input order.
async fn run_bounded<T, R, F>(inputs: Vec<T>, jobs: usize, work: F) -> PipelineResult<Vec<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
    let work = Arc::new(work);
    let mut set = JoinSet::new();
    let total = inputs.len();

    for (index, input) in inputs.into_iter().enumerate() {
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .map_err(|e| PipelineError::Worker(e.to_string()))?;
        let work = Arc::clone(&work);
        set.spawn_blocking(move || {
            let _permit = permit;
            (index, work(input))
        });
    }

    let mut results: Vec<Option<R>> = (0..total).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        let (index, result) = joined.map_err(|e| PipelineError::Worker(e.to_string()))?;
        results[index] = Some(result);
    }
    Ok(results.into_iter().flatten().collect())
}
