use anyhow::{Context, Result};
use std::sync::Arc;
use syntrack_etl::{Config, RunOptions};

use super::{build_pipeline, open_catalog, open_database, print_item};

pub async fn run_sync(config: &Config, options: RunOptions, json: bool) -> Result<()> {
    log::info!("Starting sync ({} mode)", options.mode);

    let catalog = Arc::new(open_catalog(config)?);
    let pipeline = Arc::new(build_pipeline(config)?);

    if !json {
        println!(
            "Found {} songs with {} clips in {}",
            catalog.songs().len(),
            catalog.clip_count(),
            catalog.root().display()
        );
        println!(
            "Embeddings: {} ({})",
            config.embeddings_dir.display(),
            pipeline.params().tag()
        );
        println!("This may take a while...\n");
    }

    let report = Arc::clone(&pipeline)
        .run_parallel(catalog, options)
        .await
        .context("Sync failed")?;

    let db = open_database(&config.database_path)?;
    let run = report
        .persist(&db)
        .context("Failed to store run results")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let total = report.items.len();
    for (idx, item) in report.items.iter().enumerate() {
        print_item(&format!("[{}/{}]", idx + 1, total), item);
    }

    let summary = report.summary();
    println!("\n✓ Sync complete (run {})", run.id);
    println!("  Studio tracks: {}", summary.references);
    println!("  Clips:         {}", summary.clips);
    println!("  Computed:      {}", summary.computed);
    println!("  Cached:        {}", summary.cached);
    println!("  Aligned:       {}", summary.aligned);
    println!("  Failed:        {}", summary.failed);
    println!(
        "  Cache:         {} hits, {} misses",
        summary.cache_hits, summary.cache_misses
    );

    let unaligned = report
        .items
        .iter()
        .filter(|i| i.note.is_some())
        .count();
    if unaligned > 0 {
        println!(
            "\nNote: {} clips were embedded but not aligned because their studio embedding is unavailable.",
            unaligned
        );
    }

    if summary.failed > 0 {
        println!(
            "\nNote: {} items failed. Check logs for details.",
            summary.failed
        );
    }

    Ok(())
}
