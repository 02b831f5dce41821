use anyhow::Result;
use syntrack_etl::Config;

use super::open_catalog;

/// List every song with its studio track and clip sources.
pub fn show_catalog(config: &Config, json: bool) -> Result<()> {
    let catalog = open_catalog(config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }

    println!("Collection: {}", catalog.root().display());
    println!(
        "{} songs, {} clips\n",
        catalog.songs().len(),
        catalog.clip_count()
    );

    for song in catalog.songs() {
        println!("{}", song.id);
        match catalog.reference_track(song) {
            Ok(reference) => println!("  studio: {}", reference.path.display()),
            Err(e) => println!("  studio: ✗ {e}"),
        }
        if song.sources.is_empty() {
            println!("  (no clip sources)");
        }
        for source in &song.sources {
            println!("  {} ({} clips)", source.tag, source.clips.len());
            for clip in &source.clips {
                let wav = if catalog.wav_path(clip).exists() {
                    "wav"
                } else {
                    "   "
                };
                match &clip.subfolder {
                    Some(folder) => println!("    [{wav}] {:02} {folder}/{}", clip.index, clip.name),
                    None => println!("    [{wav}] {:02} {}", clip.index, clip.name),
                }
            }
        }
    }

    Ok(())
}
