use anyhow::{Context, Result};
use syntrack_etl::Config;

use super::open_database;

/// Show stored alignments, optionally for one song.
pub fn show_results(config: &Config, song: Option<&str>) -> Result<()> {
    let db = open_database(&config.database_path)?;
    let records = db
        .list_alignments(song)
        .context("Failed to read alignments")?;

    if records.is_empty() {
        match song {
            Some(song) => println!("No alignments stored for {song}"),
            None => println!("No alignments stored yet. Run 'syntrack sync' first."),
        }
        return Ok(());
    }

    println!("{} alignments\n", records.len());
    let mut current_song = "";
    for record in &records {
        if record.song_id != current_song {
            println!("{}", record.song_id);
            current_song = record.song_id.as_str();
        }
        println!(
            "  {:<32} {:>8.2}s  {:>3.0}%  ({})",
            record.clip_name,
            record.offset_secs,
            record.confidence() * 100.0,
            record.params_tag
        );
    }

    Ok(())
}

/// Show the most recent batch runs.
pub fn show_runs(config: &Config, limit: usize) -> Result<()> {
    let db = open_database(&config.database_path)?;
    let runs = db.list_runs(limit).context("Failed to read runs")?;

    if runs.is_empty() {
        println!("No runs recorded yet");
        return Ok(());
    }

    println!("Recent runs\n");
    for run in &runs {
        let finished = run
            .finished_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "unfinished".to_string());
        println!(
            "  {}  {:<10}  {}  ok {:>4}  failed {:>4}  aligned {:>4}",
            run.id, run.mode, finished, run.succeeded, run.failed, run.aligned
        );
    }

    Ok(())
}
