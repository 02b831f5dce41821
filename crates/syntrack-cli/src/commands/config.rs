use anyhow::{Context, Result};
use syntrack_etl::{config, Config};

/// Show the current effective configuration.
pub fn show_config() -> Result<()> {
    let config_path = config::config_file_path();
    let config = Config::load()
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config_path.display());
    let exists = config_path.exists();
    println!(
        "File exists: {}\n",
        if exists { "yes" } else { "no (using defaults)" }
    );

    println!("Settings:");
    println!("  catalog_root: {}", config.catalog_root.display());
    println!("  embeddings_dir: {}", config.embeddings_dir.display());
    println!("  database_path: {}", config.database_path.display());
    println!("  jobs: {}", config.jobs);
    println!("  log_level: {}", config.log_level);

    let extraction = &config.extraction;
    println!("\n[extraction]  (tag {})", extraction.tag());
    println!("  model: {}", extraction.model);
    println!("  sample_rate: {}", extraction.sample_rate);
    println!("  hop_secs: {}", extraction.hop_secs);
    println!("  embedding_size: {}", extraction.embedding_size);
    println!("  input_repr: {}", extraction.input_repr);
    println!("  content_type: {}", extraction.content_type);

    let layout = &config.layout;
    println!("\n[layout]");
    println!("  reference_dir: {}", layout.reference_dir);
    println!("  source_prefix: {}", layout.source_prefix);
    println!("  wav_dir: {}", layout.wav_dir);
    println!("  clip_prefix: {}", layout.clip_prefix);

    println!("\nPriority: CLI args > ENV vars (SYNTRACK_*) > Config file > Defaults");

    Ok(())
}

/// Show the config file path.
pub fn show_path() -> Result<()> {
    println!("{}", config::config_file_path().display());
    Ok(())
}

/// Show example configuration.
pub fn show_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}

/// Initialize config file with defaults.
pub fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to point syntrack at your collection.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}
