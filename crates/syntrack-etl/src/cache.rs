//! Persistent embedding cache.
//!
//! The cache alone decides whether an embedding is reused or recomputed.
//! Artifacts are keyed by item identity plus the full parameter tag, so a
//! change to any extraction parameter is always a miss.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use syntrack_core::{EmbeddingSequence, ExtractionParameters, ItemKey};

use crate::artifact::{read_artifact, write_artifact, ARTIFACT_EXTENSION};
use crate::error::CacheError;

/// Sub-directory of the cache root holding reference embeddings.
pub const SONGS_DIR: &str = "songs";
/// Sub-directory of the cache root holding per-song clip embeddings.
pub const CLIPS_DIR: &str = "clips";

/// How a sequence returned by [`EmbeddingCache::get_or_compute`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOutcome {
    /// Served from memory or from a persisted artifact.
    Hit,
    /// Computed by the supplier and persisted.
    Computed,
}

/// Hit and miss counts over a cache's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Embedding store rooted at one directory, shared by every worker of a run.
#[derive(Debug)]
pub struct EmbeddingCache {
    root: PathBuf,
    key_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    memo: Mutex<HashMap<PathBuf, Arc<EmbeddingSequence>>>,
    fresh: Mutex<HashSet<PathBuf>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl EmbeddingCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            key_locks: Mutex::new(HashMap::new()),
            memo: Mutex::new(HashMap::new()),
            fresh: Mutex::new(HashSet::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the artifact for `key` under `params` lives.
    ///
    /// Clip artifacts mirror the clip id as nested directories, so the
    /// layout `clips/<song>/<source>/[<subfolder>/]<name>_<tag>` is
    /// distinct for every clip.
    #[must_use]
    pub fn artifact_path(&self, key: &ItemKey, params: &ExtractionParameters) -> PathBuf {
        let tag = params.tag();
        match key {
            ItemKey::Reference { song } => self
                .root
                .join(SONGS_DIR)
                .join(format!("{song}_{tag}.{ARTIFACT_EXTENSION}")),
            ItemKey::Clip { song, clip } => {
                let mut path = self.root.join(CLIPS_DIR).join(song.as_str());
                let mut parts = clip.split('/').peekable();
                while let Some(part) = parts.next() {
                    if parts.peek().is_some() {
                        path.push(part);
                    } else {
                        path.push(format!("{part}_{tag}.{ARTIFACT_EXTENSION}"));
                    }
                }
                path
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn key_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        Arc::clone(
            lock(&self.key_locks)
                .entry(path.to_path_buf())
                .or_default(),
        )
    }

    /// Memo first, then disk. Missing or corrupt artifacts are `None`.
    fn lookup(&self, path: &Path, tag: &str) -> Result<Option<Arc<EmbeddingSequence>>, CacheError> {
        if let Some(seq) = lock(&self.memo).get(path) {
            return Ok(Some(Arc::clone(seq)));
        }
        if !path.exists() {
            return Ok(None);
        }
        match read_artifact(path, tag) {
            Ok(seq) => {
                let seq = Arc::new(seq);
                lock(&self.memo).insert(path.to_path_buf(), Arc::clone(&seq));
                log::debug!("Loaded {}", path.display());
                Ok(Some(seq))
            }
            Err(err @ CacheError::Corrupt { .. }) => {
                log::warn!("Ignoring {err}; it will be recomputed");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Read-only lookup that never computes.
    pub fn load(
        &self,
        key: &ItemKey,
        params: &ExtractionParameters,
    ) -> Result<Option<Arc<EmbeddingSequence>>, CacheError> {
        let path = self.artifact_path(key, params);
        let key_lock = self.key_lock(&path);
        let _guard = lock(&key_lock);
        let found = self.lookup(&path, &params.tag())?;
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    /// Return the embedding for `key`, computing and persisting it on a miss.
    ///
    /// At most one supplier runs per key at a time; callers waiting on the
    /// same key get the sequence the first one produced. With `refresh` set
    /// the persisted artifact is ignored, unless this cache already computed
    /// the key, in which case the fresh result is reused.
    pub fn get_or_compute<F, E>(
        &self,
        key: &ItemKey,
        params: &ExtractionParameters,
        refresh: bool,
        compute: F,
    ) -> Result<(Arc<EmbeddingSequence>, CacheOutcome), E>
    where
        F: FnOnce() -> Result<EmbeddingSequence, E>,
        E: From<CacheError>,
    {
        let path = self.artifact_path(key, params);
        let tag = params.tag();
        let key_lock = self.key_lock(&path);
        let _guard = lock(&key_lock);

        let refresh = refresh && !lock(&self.fresh).contains(&path);
        if refresh {
            lock(&self.memo).remove(&path);
        } else if let Some(seq) = self.lookup(&path, &tag)? {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((seq, CacheOutcome::Hit));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        log::debug!("Computing embedding for {key}");
        let seq = compute()?;
        write_artifact(&path, &seq, &tag)?;

        let seq = Arc::new(seq);
        lock(&self.memo).insert(path.clone(), Arc::clone(&seq));
        lock(&self.fresh).insert(path);
        Ok((seq, CacheOutcome::Computed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syntrack_core::SongId;
    use tempfile::TempDir;

    fn params() -> ExtractionParameters {
        ExtractionParameters::default()
            .with_sample_rate(1000)
            .with_hop_secs(0.1)
            .with_embedding_size(2)
    }

    fn reference(song: &str) -> ItemKey {
        ItemKey::Reference {
            song: SongId::new(song),
        }
    }

    fn sequence(value: f32) -> EmbeddingSequence {
        EmbeddingSequence::from_rows(vec![vec![value, 0.0], vec![0.0, value]], vec![0.0, 0.1])
            .unwrap()
    }

    fn counting(counter: &AtomicUsize, value: f32) -> Result<EmbeddingSequence, CacheError> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(sequence(value))
    }

    #[test]
    fn test_artifact_paths() {
        let cache = EmbeddingCache::new("/emb");
        let clip = ItemKey::Clip {
            song: SongId::new("song"),
            clip: "tiktok/clip01".to_string(),
        };
        let nested = ItemKey::Clip {
            song: SongId::new("song"),
            clip: "tiktok/live/clip01".to_string(),
        };
        let underscored = ItemKey::Clip {
            song: SongId::new("song"),
            clip: "tiktok_live/clip01".to_string(),
        };
        assert_eq!(
            cache.artifact_path(&reference("song"), &params()),
            PathBuf::from("/emb/songs/song_envelope_mel256_music_2d_1000sr_0.1s.emb.gz")
        );
        assert_eq!(
            cache.artifact_path(&clip, &params()),
            PathBuf::from("/emb/clips/song/tiktok/clip01_envelope_mel256_music_2d_1000sr_0.1s.emb.gz")
        );
        assert_eq!(
            cache.artifact_path(&nested, &params()),
            PathBuf::from("/emb/clips/song/tiktok/live/clip01_envelope_mel256_music_2d_1000sr_0.1s.emb.gz")
        );
        assert_ne!(
            cache.artifact_path(&nested, &params()),
            cache.artifact_path(&underscored, &params())
        );
    }

    #[test]
    fn test_second_call_is_a_hit() {
        let temp_dir = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(temp_dir.path());
        let calls = AtomicUsize::new(0);
        let key = reference("song");

        let (a, first) = cache
            .get_or_compute(&key, &params(), false, || counting(&calls, 1.0))
            .unwrap();
        let (b, second) = cache
            .get_or_compute(&key, &params(), false, || counting(&calls, 2.0))
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, CacheOutcome::Computed);
        assert_eq!(second, CacheOutcome::Hit);
        assert_eq!(a, b);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn test_persisted_artifact_survives_new_cache() {
        let temp_dir = TempDir::new().unwrap();
        let calls = AtomicUsize::new(0);
        let key = reference("song");

        EmbeddingCache::new(temp_dir.path())
            .get_or_compute(&key, &params(), false, || counting(&calls, 1.0))
            .unwrap();
        let (seq, outcome) = EmbeddingCache::new(temp_dir.path())
            .get_or_compute(&key, &params(), false, || counting(&calls, 2.0))
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome, CacheOutcome::Hit);
        assert_eq!(*seq, sequence(1.0));
    }

    #[test]
    fn test_different_hop_is_a_miss() {
        let temp_dir = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(temp_dir.path());
        let calls = AtomicUsize::new(0);
        let key = reference("song");

        cache
            .get_or_compute(&key, &params(), false, || counting(&calls, 1.0))
            .unwrap();
        cache
            .get_or_compute(&key, &params().with_hop_secs(0.2), false, || {
                counting(&calls, 1.0)
            })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let songs: Vec<_> = std::fs::read_dir(temp_dir.path().join(SONGS_DIR))
            .unwrap()
            .collect();
        assert_eq!(songs.len(), 2);
    }

    #[test]
    fn test_refresh_recomputes_once_per_cache() {
        let temp_dir = TempDir::new().unwrap();
        let calls = AtomicUsize::new(0);
        let key = reference("song");

        EmbeddingCache::new(temp_dir.path())
            .get_or_compute(&key, &params(), false, || counting(&calls, 1.0))
            .unwrap();

        let cache = EmbeddingCache::new(temp_dir.path());
        let (seq, outcome) = cache
            .get_or_compute(&key, &params(), true, || counting(&calls, 2.0))
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Computed);
        assert_eq!(*seq, sequence(2.0));

        let (seq, outcome) = cache
            .get_or_compute(&key, &params(), true, || counting(&calls, 3.0))
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Hit);
        assert_eq!(*seq, sequence(2.0));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_corrupt_artifact_is_recomputed() {
        let temp_dir = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(temp_dir.path());
        let calls = AtomicUsize::new(0);
        let key = reference("song");
        let path = cache.artifact_path(&key, &params());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"garbage").unwrap();

        let (_, outcome) = cache
            .get_or_compute(&key, &params(), false, || counting(&calls, 1.0))
            .unwrap();

        assert_eq!(outcome, CacheOutcome::Computed);
        assert_eq!(read_artifact(&path, &params().tag()).unwrap(), sequence(1.0));
    }

    #[test]
    fn test_load_never_computes() {
        let temp_dir = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(temp_dir.path());
        let key = reference("song");

        assert!(cache.load(&key, &params()).unwrap().is_none());

        let calls = AtomicUsize::new(0);
        cache
            .get_or_compute(&key, &params(), false, || counting(&calls, 1.0))
            .unwrap();
        assert!(cache.load(&key, &params()).unwrap().is_some());
    }

    #[test]
    fn test_failed_compute_persists_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(temp_dir.path());
        let key = reference("song");

        let result: Result<_, CacheError> = cache.get_or_compute(&key, &params(), false, || {
            Err(CacheError::Corrupt {
                path: PathBuf::from("x"),
                reason: "supplier failed".to_string(),
            })
        });

        assert!(result.is_err());
        assert!(!cache.artifact_path(&key, &params()).exists());
    }

    #[test]
    fn test_concurrent_callers_compute_once() {
        let temp_dir = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(temp_dir.path());
        let calls = AtomicUsize::new(0);
        let key = reference("song");

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    cache
                        .get_or_compute(&key, &params(), true, || {
                            std::thread::sleep(std::time::Duration::from_millis(20));
                            counting(&calls, 1.0)
                        })
                        .unwrap();
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
