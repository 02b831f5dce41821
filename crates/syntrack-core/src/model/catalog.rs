use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifier of a song, equal to its directory name in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SongId(String);

impl SongId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SongId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A song's studio recording, the timeline clips are located in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceTrack {
    pub song: SongId,
    pub path: PathBuf,
}

/// A recorded excerpt of a song from one clip source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clip {
    pub song: SongId,

    /// Source tag, e.g. `youtube` for a `clips_youtube` directory.
    pub source: String,

    /// File stem, e.g. `clip04` or `clip04_concert`.
    pub name: String,

    /// Number parsed from the digits following the clip prefix.
    pub index: u32,

    /// Sub-folder of the source directory the clip was found in, if any.
    pub subfolder: Option<String>,

    /// Path to the clip media file.
    pub path: PathBuf,
}

impl Clip {
    /// Identifier of the clip within its song: `source/[subfolder/]name`.
    ///
    /// Components are directory and file names, so they never contain `/`
    /// and two different clips never share an id.
    #[must_use]
    pub fn id(&self) -> String {
        match &self.subfolder {
            Some(folder) => format!("{}/{}/{}", self.source, folder, self.name),
            None => format!("{}/{}", self.source, self.name),
        }
    }
}

impl fmt::Display for Clip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.song, self.id())
    }
}

/// Identifies one unit of work in a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemKey {
    Reference { song: SongId },
    /// `clip` is [`Clip::id`].
    Clip { song: SongId, clip: String },
}

impl ItemKey {
    #[must_use]
    pub fn song(&self) -> &SongId {
        match self {
            Self::Reference { song } | Self::Clip { song, .. } => song,
        }
    }
}

impl From<&Clip> for ItemKey {
    fn from(clip: &Clip) -> Self {
        Self::Clip {
            song: clip.song.clone(),
            clip: clip.id(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference { song } => write!(f, "{song} (reference)"),
            Self::Clip { song, clip } => write!(f, "{song}/{clip}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(subfolder: Option<&str>) -> Clip {
        Clip {
            song: SongId::new("clocks_coldplay"),
            source: "youtube".to_string(),
            name: "clip04".to_string(),
            index: 4,
            subfolder: subfolder.map(str::to_string),
            path: PathBuf::from("/catalog/clocks_coldplay/clips_youtube/clip04.mp4"),
        }
    }

    #[test]
    fn test_clip_id() {
        assert_eq!(clip(None).id(), "youtube/clip04");
        assert_eq!(clip(Some("night2")).id(), "youtube/night2/clip04");
        assert_eq!(clip(Some("night2")).to_string(), "clocks_coldplay/youtube/night2/clip04");
    }

    #[test]
    fn test_underscored_names_keep_distinct_ids() {
        let mut nested = clip(Some("live"));
        nested.source = "yt".to_string();
        let mut flat = clip(None);
        flat.source = "yt_live".to_string();

        assert_ne!(nested.id(), flat.id());
        assert_ne!(ItemKey::from(&nested), ItemKey::from(&flat));
    }

    #[test]
    fn test_item_key_display() {
        let key = ItemKey::from(&clip(None));
        assert_eq!(key.to_string(), "clocks_coldplay/youtube/clip04");
        assert_eq!(key.song().as_str(), "clocks_coldplay");

        let reference = ItemKey::Reference {
            song: SongId::new("clocks_coldplay"),
        };
        assert_eq!(reference.to_string(), "clocks_coldplay (reference)");
    }
}
