use anyhow::{Context, Result};
use confyg::{env, Confygery};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use syntrack_core::ExtractionParameters;

use crate::catalog::CatalogLayout;

/// Configuration for syntrack.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (SYNTRACK_* prefix)
/// 3. Config file (~/.config/syntrack/config.toml)
/// 4. Built-in defaults (lowest priority)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the song/clip collection.
    ///
    /// Can be set via:
    /// - CLI: --root /path/to/collection
    /// - ENV: SYNTRACK_CATALOG_ROOT
    /// - Config: catalog_root = "..."
    pub catalog_root: PathBuf,

    /// Where embedding artifacts are stored.
    ///
    /// Default: ~/.local/share/syntrack/embeddings
    pub embeddings_dir: PathBuf,

    /// Path to the SQLite results database.
    ///
    /// Default: ~/.local/share/syntrack/syntrack.db
    pub database_path: PathBuf,

    /// Items processed concurrently during `sync`. 1 runs sequentially.
    pub jobs: usize,

    /// Default log filter, overridden by RUST_LOG.
    pub log_level: String,

    pub extraction: ExtractionParameters,

    pub layout: CatalogLayout,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_root: PathBuf::from("clips_syntrack"),
            embeddings_dir: default_data_dir().join("embeddings"),
            database_path: default_db_path(),
            jobs: 1,
            log_level: "info".to_string(),
            extraction: ExtractionParameters::default(),
            layout: CatalogLayout::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Searches for config file at: ~/.config/syntrack/config.toml
    /// Reads environment variables with SYNTRACK_ prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(config_file_path())
    }

    /// Load configuration using `config_path` instead of the default file.
    pub fn load_from(config_path: PathBuf) -> Result<Self> {
        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("syntrack");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder.build().context("Failed to build configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        self.extraction
            .validate()
            .context("Invalid [extraction] settings")?;
        if self.layout.reference_dir.is_empty() || self.layout.clip_prefix.is_empty() {
            anyhow::bail!("[layout] reference_dir and clip_prefix must not be empty");
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("syntrack")
}

/// Get the default database path.
///
/// Returns: ~/.local/share/syntrack/syntrack.db (or platform equivalent)
fn default_db_path() -> PathBuf {
    default_data_dir().join("syntrack.db")
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/syntrack/config.toml
/// - macOS: ~/Library/Application Support/syntrack/config.toml
/// - Windows: %APPDATA%\syntrack\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("syntrack")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Syntrack Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (SYNTRACK_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# Root of the collection: one directory per song.
#
# Can also be set via:
# - CLI: syntrack sync --root /path/to/collection
# - Environment: SYNTRACK_CATALOG_ROOT=/path/to/collection
catalog_root = "clips_syntrack"

# Where embedding artifacts are kept (songs/ and clips/<song>/ inside).
#embeddings_dir = "/path/to/embeddings"

# SQLite database holding alignment results and run history.
#database_path = "/path/to/syntrack.db"

# Items processed concurrently by `syntrack sync`. 1 runs sequentially.
jobs = 1

# Default log filter; RUST_LOG takes precedence.
log_level = "info"

# Every value below is part of the embedding cache key: changing any of
# them makes existing embeddings a miss.
[extraction]
model = "envelope"
sample_rate = 48000
hop_secs = 0.1
embedding_size = 512
input_repr = "mel256"        # linear | mel128 | mel256
content_type = "music"       # music | env

# Directory names of the collection.
[layout]
reference_dir = "cancion_estudio"
source_prefix = "clips_"
wav_dir = "wavs"
clip_prefix = "clip"
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use syntrack_core::{ContentType, InputRepr};
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.database_path.as_os_str().is_empty());
        assert!(config.embeddings_dir.ends_with("embeddings"));
        assert_eq!(config.jobs, 1);
        assert_eq!(config.extraction, ExtractionParameters::default());
        assert_eq!(config.layout.reference_dir, "cancion_estudio");
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let parsed: Config = toml::from_str(example_config()).unwrap();
        let defaults = Config::default();
        assert_eq!(parsed.extraction, defaults.extraction);
        assert_eq!(parsed.layout, defaults.layout);
        assert_eq!(parsed.catalog_root, defaults.catalog_root);
        assert_eq!(parsed.jobs, defaults.jobs);
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [extraction]
            hop_secs = 0.5
            input_repr = "linear"
            content_type = "env"
            "#,
        )
        .unwrap();
        assert!((parsed.extraction.hop_secs - 0.5).abs() < f64::EPSILON);
        assert_eq!(parsed.extraction.input_repr, InputRepr::Linear);
        assert_eq!(parsed.extraction.content_type, ContentType::Env);
        assert_eq!(parsed.extraction.sample_rate, 48000);
        assert_eq!(parsed.layout, CatalogLayout::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            "catalog_root = \"/data/clips\"\n[layout]\nwav_dir = \"decoded\"\n",
        )
        .unwrap();

        let config = Config::load_from(path).unwrap();
        assert_eq!(config.catalog_root, PathBuf::from("/data/clips"));
        assert_eq!(config.layout.wav_dir, "decoded");
        assert_eq!(config.layout.clip_prefix, "clip");
    }

    #[test]
    fn test_load_without_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = Config::load_from(temp_dir.path().join("missing.toml"));
        assert!(result.is_ok());
    }

    #[test]
    fn test_invalid_extraction_is_rejected() {
        let mut config = Config::default();
        config.extraction.hop_secs = 0.0;
        assert!(config.validate().is_err());
    }
}
