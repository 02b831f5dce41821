pub mod align;
pub mod catalog;
pub mod config;
pub mod results;
pub mod sync;

pub use align::run_align;
pub use catalog::show_catalog;
pub use config::{init_config, show_config, show_example, show_path};
pub use results::{show_results, show_runs};
pub use sync::run_sync;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use syntrack_core::schema::Database;
use syntrack_etl::audio::SymphoniaDecoder;
use syntrack_etl::{Catalog, Config, EmbeddingCache, EnvelopeExtractor, ItemReport, Pipeline};

/// Scan the configured collection root.
pub(crate) fn open_catalog(config: &Config) -> Result<Catalog> {
    Catalog::scan(&config.catalog_root, &config.layout).with_context(|| {
        format!(
            "Cannot use collection root {}",
            config.catalog_root.display()
        )
    })
}

/// Build the pipeline from the configured extraction settings.
pub(crate) fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let cache = EmbeddingCache::new(&config.embeddings_dir);
    Pipeline::new(
        config.extraction.clone(),
        cache,
        Arc::new(SymphoniaDecoder),
        Arc::new(EnvelopeExtractor),
    )
    .context("Invalid extraction settings")
}

/// Open the results database, creating its directory if needed.
pub(crate) fn open_database(path: &Path) -> Result<Database> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Database::open(path).with_context(|| format!("Failed to open database {}", path.display()))
}

/// Print one item the way `sync` and `align` show them.
pub(crate) fn print_item(progress: &str, item: &ItemReport) {
    let label = match &item.clip {
        Some(clip) => clip.to_string(),
        None => format!("{} (studio track)", item.key.song()),
    };
    if item.status.is_failed() {
        println!("{progress} ✗ {label}: {}", item.status);
        return;
    }
    match (&item.alignment, &item.note) {
        (Some(alignment), _) => println!("{progress} ✓ {label}: {} → {alignment}", item.status),
        (None, Some(note)) => println!("{progress} ✓ {label}: {} ({note})", item.status),
        (None, None) => println!("{progress} ✓ {label}: {}", item.status),
    }
    for artifact in &item.artifacts {
        println!("      {}", artifact.display());
    }
}
