//! Catalog discovery: songs, clip sources and clips under a root directory.
//!
//! ```text
//! root/<song>/<reference_dir>/<song>.mp3
//! root/<song>/<source_prefix><tag>/clip01.mp4
//! root/<song>/<source_prefix><tag>/<folder>/clip02_take2.mp4
//! root/<song>/<source_prefix><tag>/<wav_dir>/...        (decoded audio, skipped)
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use syntrack_core::{Clip, ReferenceTrack, SongId};
use walkdir::WalkDir;

use crate::audio::wav_artifact_path;
use crate::error::CatalogError;

/// Extensions accepted for reference tracks, in lookup order.
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "m4a", "ogg", "aac"];

/// Extensions accepted for clips.
const CLIP_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "mkv", "m4v", "webm", "mp3", "flac", "wav", "m4a", "ogg", "aac",
];

/// Directory names that define the catalog layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogLayout {
    /// Sub-directory of a song holding its studio recording.
    pub reference_dir: String,
    /// Prefix of clip-source directories; the rest of the name is the tag.
    pub source_prefix: String,
    /// Sub-directory of a clip source where decoded audio is written.
    pub wav_dir: String,
    /// File-name prefix of clips, followed by at least two digits.
    pub clip_prefix: String,
}

impl Default for CatalogLayout {
    fn default() -> Self {
        Self {
            reference_dir: "cancion_estudio".to_string(),
            source_prefix: "clips_".to_string(),
            wav_dir: "wavs".to_string(),
            clip_prefix: "clip".to_string(),
        }
    }
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| allowed.contains(&ext.as_str()))
}

/// Recognises clip file stems and pulls out their index.
#[derive(Debug, Clone)]
struct ClipMatcher {
    pattern: Regex,
}

impl ClipMatcher {
    fn new(prefix: &str) -> Result<Self, CatalogError> {
        let pattern = format!(r"(?i)^{}(\d{{2}}\d*)", regex::escape(prefix));
        let pattern =
            Regex::new(&pattern).map_err(|e| CatalogError::InvalidLayout(e.to_string()))?;
        Ok(Self { pattern })
    }

    /// The clip index when `stem` is `<prefix>` plus at least two digits.
    fn index(&self, stem: &str) -> Option<u32> {
        let digits = self.pattern.captures(stem)?.get(1)?.as_str();
        match digits.parse() {
            Ok(index) => Some(index),
            Err(_) => {
                log::debug!("Clip index out of range in {stem:?}");
                None
            }
        }
    }
}

/// A directory of clips from one origin (e.g. `clips_tiktok`).
#[derive(Debug, Clone, Serialize)]
pub struct ClipSource {
    pub tag: String,
    pub dir: PathBuf,
    pub clips: Vec<Clip>,
}

/// One song directory.
#[derive(Debug, Clone, Serialize)]
pub struct Song {
    pub id: SongId,
    pub dir: PathBuf,
    pub sources: Vec<ClipSource>,
}

impl Song {
    pub fn clips(&self) -> impl Iterator<Item = &Clip> {
        self.sources.iter().flat_map(|s| s.clips.iter())
    }

    pub fn clip_count(&self) -> usize {
        self.sources.iter().map(|s| s.clips.len()).sum()
    }
}

/// Read-only view of the catalog, discovered once per run.
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    root: PathBuf,
    layout: CatalogLayout,
    songs: Vec<Song>,
}

impl Catalog {
    /// Walk `root` and discover every song and clip.
    ///
    /// # Errors
    ///
    /// Fails when the root is missing or holds no songs. Unreadable entries
    /// below a song are logged and skipped.
    pub fn scan(root: impl Into<PathBuf>, layout: &CatalogLayout) -> Result<Self, CatalogError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(CatalogError::MissingRoot(root));
        }

        let matcher = ClipMatcher::new(&layout.clip_prefix)?;
        let mut songs = Vec::new();

        for dir in sorted_subdirs(&root)? {
            if !dir.join(&layout.reference_dir).is_dir() {
                continue;
            }
            let Some(name) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let id = SongId::new(name);

            let source_dirs = match sorted_subdirs(&dir) {
                Ok(dirs) => dirs,
                Err(e) => {
                    log::warn!("Skipping song {id}: {e}");
                    continue;
                }
            };
            let mut sources = Vec::new();
            for source_dir in source_dirs {
                let Some(tag) = source_dir
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_prefix(layout.source_prefix.as_str()))
                    .map(str::to_string)
                else {
                    continue;
                };
                let clips = scan_source(&id, &tag, &source_dir, layout, &matcher);
                log::debug!("{id}: source {tag} has {} clips", clips.len());
                sources.push(ClipSource {
                    tag,
                    dir: source_dir,
                    clips,
                });
            }

            songs.push(Song { id, dir, sources });
        }

        if songs.is_empty() {
            return Err(CatalogError::NoSongs(root));
        }

        let catalog = Self {
            root,
            layout: layout.clone(),
            songs,
        };
        log::info!(
            "Catalog {}: {} songs, {} clips",
            catalog.root.display(),
            catalog.songs.len(),
            catalog.clip_count()
        );
        Ok(catalog)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn layout(&self) -> &CatalogLayout {
        &self.layout
    }

    #[must_use]
    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn clips(&self) -> impl Iterator<Item = &Clip> {
        self.songs.iter().flat_map(Song::clips)
    }

    #[must_use]
    pub fn clip_count(&self) -> usize {
        self.songs.iter().map(Song::clip_count).sum()
    }

    pub fn song(&self, id: &str) -> Result<&Song, CatalogError> {
        self.songs
            .iter()
            .find(|s| s.id.as_str() == id)
            .ok_or_else(|| CatalogError::UnknownSong(id.to_string()))
    }

    /// Locate the studio recording of `song`.
    ///
    /// Prefers `<song>.<ext>` in the reference directory, otherwise accepts
    /// the directory's only audio file.
    pub fn reference_track(&self, song: &Song) -> Result<ReferenceTrack, CatalogError> {
        let dir = song.dir.join(&self.layout.reference_dir);
        let missing = || CatalogError::MissingReference {
            song: song.id.to_string(),
            dir: dir.clone(),
        };

        for ext in AUDIO_EXTENSIONS {
            let candidate = dir.join(format!("{}.{ext}", song.id));
            if candidate.is_file() {
                return Ok(ReferenceTrack {
                    song: song.id.clone(),
                    path: candidate,
                });
            }
        }

        let entries = std::fs::read_dir(&dir).map_err(|_| missing())?;
        let mut audio: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file() && has_extension(p, AUDIO_EXTENSIONS))
            .collect();
        if audio.len() == 1 {
            if let Some(path) = audio.pop() {
                return Ok(ReferenceTrack {
                    song: song.id.clone(),
                    path,
                });
            }
        }
        Err(missing())
    }

    /// Find the clip with `index` in `song`, optionally restricted to one
    /// source tag.
    pub fn find_clip(
        &self,
        song: &str,
        index: u32,
        source: Option<&str>,
    ) -> Result<&Clip, CatalogError> {
        let song = self.song(song)?;
        let matches: Vec<&Clip> = song
            .clips()
            .filter(|c| c.index == index)
            .filter(|c| source.map_or(true, |s| c.source == s))
            .collect();

        match matches.as_slice() {
            [] => Err(CatalogError::UnknownClip {
                song: song.id.to_string(),
                index,
            }),
            [clip] => Ok(*clip),
            many => Err(CatalogError::AmbiguousClip {
                song: song.id.to_string(),
                index,
                sources: many
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    /// Directory where decoded audio for `clip` is kept.
    #[must_use]
    pub fn wav_dir(&self, clip: &Clip) -> PathBuf {
        self.root
            .join(clip.song.as_str())
            .join(format!("{}{}", self.layout.source_prefix, clip.source))
            .join(&self.layout.wav_dir)
    }

    /// Decoded-audio artifact of `clip`. Clips from a sub-folder keep the
    /// folder below the WAV directory.
    #[must_use]
    pub fn wav_path(&self, clip: &Clip) -> PathBuf {
        let dir = match &clip.subfolder {
            Some(folder) => self.wav_dir(clip).join(folder),
            None => self.wav_dir(clip),
        };
        wav_artifact_path(&dir, &clip.name)
    }
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    let entries = std::fs::read_dir(dir).map_err(|source| CatalogError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Clips directly in `source_dir` plus those exactly one folder down.
fn scan_source(
    song: &SongId,
    tag: &str,
    source_dir: &Path,
    layout: &CatalogLayout,
    matcher: &ClipMatcher,
) -> Vec<Clip> {
    let mut clips = Vec::new();

    let walker = WalkDir::new(source_dir)
        .min_depth(1)
        .max_depth(2)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.depth() == 1 && e.file_type().is_dir() && e.file_name() == layout.wav_dir.as_str())
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry in {}: {}", source_dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || !has_extension(path, CLIP_EXTENSIONS) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(index) = matcher.index(stem) else {
            continue;
        };

        let subfolder = (entry.depth() == 2)
            .then(|| {
                path.parent()
                    .and_then(Path::file_name)
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .flatten();

        clips.push(Clip {
            song: song.clone(),
            source: tag.to_string(),
            name: stem.to_string(),
            index,
            subfolder,
            path: path.to_path_buf(),
        });
    }

    clips.sort_by(|a, b| {
        (a.index, &a.subfolder, &a.name).cmp(&(b.index, &b.subfolder, &b.name))
    });
    clips
}
