use anyhow::{Context, Result};
use syntrack_core::AlignmentRecord;
use syntrack_etl::{Config, RunOptions};

use super::{build_pipeline, open_catalog, open_database, print_item};

/// Align one clip and print where it falls in the studio track.
pub fn run_align(
    config: &Config,
    song: &str,
    clip: u32,
    source: Option<&str>,
    options: &RunOptions,
    json: bool,
) -> Result<()> {
    let catalog = open_catalog(config)?;
    let pipeline = build_pipeline(config)?;

    let item = pipeline
        .align_single(&catalog, song, clip, source, options)
        .with_context(|| format!("Failed to align clip {clip:02} of {song}"))?;

    if let (Some(clip), Some(alignment)) = (&item.clip, &item.alignment) {
        let db = open_database(&config.database_path)?;
        let record = AlignmentRecord::new(clip, alignment, pipeline.params().tag());
        db.upsert_alignment(&record)
            .context("Failed to store alignment")?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
        return Ok(());
    }

    print_item("", &item);
    if let Some(alignment) = &item.alignment {
        println!("\nOffset:     {:.2}s", alignment.offset_secs);
        println!("Confidence: {:.0}%", alignment.confidence() * 100.0);
        let candidates = alignment.top_candidates(3);
        if candidates.len() > 1 {
            println!("Runner-up frames:");
            for (frame, votes) in candidates.iter().skip(1) {
                println!("  frame {frame}: {votes} votes");
            }
        }
    }

    Ok(())
}
