use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Spectrogram representation fed to the embedding model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputRepr {
    Linear,
    Mel128,
    Mel256,
}

impl InputRepr {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Mel128 => "mel128",
            Self::Mel256 => "mel256",
        }
    }
}

impl fmt::Display for InputRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputRepr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "mel128" => Ok(Self::Mel128),
            "mel256" => Ok(Self::Mel256),
            other => Err(Error::InvalidData(format!("unknown input representation: {other}"))),
        }
    }
}

/// The kind of content the embedding model was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Music,
    Env,
}

impl ContentType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Music => "music",
            Self::Env => "env",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "music" => Ok(Self::Music),
            "env" => Ok(Self::Env),
            other => Err(Error::InvalidData(format!("unknown content type: {other}"))),
        }
    }
}

/// Everything that influences the output of an embedding extraction.
///
/// Two sequences are only comparable, and a cached sequence only reusable,
/// when they were produced with equal parameters. [`Self::tag`] renders every
/// field into a string that is used verbatim in cache file names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionParameters {
    /// Name of the embedding model (must match the extractor in use).
    pub model: String,
    /// Sample rate the audio is decoded to before extraction, in Hz.
    pub sample_rate: u32,
    /// Time step between consecutive embedding frames, in seconds.
    pub hop_secs: f64,
    /// Dimensionality of each embedding vector.
    pub embedding_size: usize,
    pub input_repr: InputRepr,
    pub content_type: ContentType,
}

impl Default for ExtractionParameters {
    fn default() -> Self {
        Self {
            model: String::from("envelope"),
            sample_rate: 48_000,
            hop_secs: 0.1,
            embedding_size: 512,
            input_repr: InputRepr::Mel256,
            content_type: ContentType::Music,
        }
    }
}

impl ExtractionParameters {
    #[must_use]
    pub fn with_hop_secs(mut self, hop_secs: f64) -> Self {
        self.hop_secs = hop_secs;
        self
    }

    #[must_use]
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    #[must_use]
    pub fn with_embedding_size(mut self, embedding_size: usize) -> Self {
        self.embedding_size = embedding_size;
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Check that the parameters describe a usable extraction.
    pub fn validate(&self) -> Result<()> {
        if self.model.is_empty() || !is_file_safe(&self.model) {
            return Err(Error::InvalidData(format!(
                "model name must be non-empty and use [A-Za-z0-9.-] only: {:?}",
                self.model
            )));
        }
        if self.sample_rate == 0 {
            return Err(Error::InvalidData("sample_rate must be positive".to_string()));
        }
        if !self.hop_secs.is_finite() || self.hop_secs <= 0.0 {
            return Err(Error::InvalidData(format!(
                "hop_secs must be a positive number, got {}",
                self.hop_secs
            )));
        }
        if self.embedding_size == 0 {
            return Err(Error::InvalidData("embedding_size must be positive".to_string()));
        }
        Ok(())
    }

    /// Number of samples between consecutive frames at the configured rate.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    #[must_use]
    pub fn hop_samples(&self) -> usize {
        (self.hop_secs * f64::from(self.sample_rate)).round().max(1.0) as usize
    }

    /// The cache-key tag, e.g. `envelope_mel256_music_512d_48000sr_0.1s`.
    #[must_use]
    pub fn tag(&self) -> String {
        format!(
            "{}_{}_{}_{}d_{}sr_{}s",
            self.model,
            self.input_repr,
            self.content_type,
            self.embedding_size,
            self.sample_rate,
            self.hop_secs
        )
    }
}

fn is_file_safe(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tag() {
        let params = ExtractionParameters::default();
        assert_eq!(params.tag(), "envelope_mel256_music_512d_48000sr_0.1s");
    }

    #[test]
    fn test_tag_changes_with_every_field() {
        let base = ExtractionParameters::default();
        let variants = [
            base.clone().with_hop_secs(0.05),
            base.clone().with_sample_rate(44_100),
            base.clone().with_embedding_size(6144),
            base.clone().with_model("openl3"),
            ExtractionParameters {
                input_repr: InputRepr::Linear,
                ..base.clone()
            },
            ExtractionParameters {
                content_type: ContentType::Env,
                ..base.clone()
            },
        ];
        for variant in &variants {
            assert_ne!(variant.tag(), base.tag(), "{variant:?}");
        }
    }

    #[test]
    fn test_hop_samples() {
        let params = ExtractionParameters::default();
        assert_eq!(params.hop_samples(), 4800);
    }

    #[test]
    fn test_validate() {
        assert!(ExtractionParameters::default().validate().is_ok());
        assert!(ExtractionParameters::default().with_hop_secs(0.0).validate().is_err());
        assert!(ExtractionParameters::default().with_sample_rate(0).validate().is_err());
        assert!(ExtractionParameters::default().with_model("open_l3").validate().is_err());
    }

    #[test]
    fn test_repr_from_str() {
        assert_eq!("MEL128".parse::<InputRepr>().unwrap(), InputRepr::Mel128);
        assert!("mel64".parse::<InputRepr>().is_err());
        assert_eq!("env".parse::<ContentType>().unwrap(), ContentType::Env);
    }
}
