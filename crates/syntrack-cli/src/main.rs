use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use syntrack_etl::{Config, RunMode, RunOptions};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "syntrack", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the results database (default: ~/.local/share/syntrack/syntrack.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Root of the song/clip collection (default: catalog_root from the config file)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Directory holding embedding artifacts (default: embeddings_dir from the config file)
    #[arg(long, global = true)]
    embeddings: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Extract embeddings for the whole collection and align every clip
    ///
    /// Walks the collection root, where every song directory holds a
    /// reference folder with the studio track and one or more clip source
    /// folders (clips_<source>). For each song:
    ///
    /// - Embeds the studio track once and caches it on disk
    /// - Decodes each clip to a WAV next to the clip (skipped when present)
    /// - Embeds each clip and caches it on disk
    /// - Aligns the clip against the studio track by nearest-frame voting
    ///
    /// A failing song or clip is reported and the run continues. Cached
    /// embeddings are reused unless --refresh-embeddings is given; existing
    /// WAV files are reused unless --force-extract is given. The two flags
    /// are independent.
    ///
    /// Results and run history are stored in the database; use
    /// 'syntrack results' to review them.
    Sync {
        /// Decode clips again even when their WAV file exists
        #[arg(long)]
        force_extract: bool,

        /// Recompute embeddings even when cached ones exist
        #[arg(long)]
        refresh_embeddings: bool,

        /// Only embed the studio tracks
        #[arg(long, conflicts_with = "clips_only")]
        songs_only: bool,

        /// Only embed and align clips (studio embeddings must already be cached)
        #[arg(long)]
        clips_only: bool,

        /// Restrict the run to one song
        #[arg(long)]
        song: Option<String>,

        /// Restrict the run to one clip number
        #[arg(long)]
        clip: Option<u32>,

        /// Items processed concurrently (default: jobs from the config file)
        #[arg(long, short)]
        jobs: Option<usize>,

        /// Print the full run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Align a single clip against its song's studio track
    Align {
        /// Song directory name
        #[arg(long)]
        song: String,

        /// Clip number, e.g. 4 for clip04
        #[arg(long)]
        clip: u32,

        /// Clip source (the part after clips_), needed when the number is ambiguous
        #[arg(long)]
        source: Option<String>,

        /// Decode the clip again even when its WAV file exists
        #[arg(long)]
        force_extract: bool,

        /// Recompute embeddings even when cached ones exist
        #[arg(long)]
        refresh_embeddings: bool,

        /// Print the item report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the songs, studio tracks, and clips found in the collection
    Catalog {
        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show stored alignment results
    Results {
        /// Optional song filter
        song: Option<String>,

        /// Show recent runs instead of alignments
        #[arg(long)]
        runs: bool,

        /// Maximum number of runs shown with --runs
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, clap::Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Print an example config file
    Example,
    /// Create the config file with defaults if it does not exist
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config management must work even when the config file is broken.
    if let Commands::Config { action } = &cli.command {
        init_logging("info");
        return match action {
            ConfigAction::Show => commands::show_config(),
            ConfigAction::Path => commands::show_path(),
            ConfigAction::Example => commands::show_example(),
            ConfigAction::Init => commands::init_config(),
        };
    }

    let mut config = Config::load()?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    if let Some(root) = cli.root {
        config.catalog_root = root;
    }
    if let Some(embeddings) = cli.embeddings {
        config.embeddings_dir = embeddings;
    }
    init_logging(&config.log_level);

    match cli.command {
        Commands::Sync {
            force_extract,
            refresh_embeddings,
            songs_only,
            clips_only,
            song,
            clip,
            jobs,
            json,
        } => {
            let mode = if songs_only {
                RunMode::SongsOnly
            } else if clips_only {
                RunMode::ClipsOnly
            } else {
                RunMode::All
            };
            let options = RunOptions {
                mode,
                force_extract,
                refresh_embeddings,
                song,
                clip,
                jobs: jobs.unwrap_or(config.jobs).max(1),
            };
            commands::run_sync(&config, options, json).await?;
        }
        Commands::Align {
            song,
            clip,
            source,
            force_extract,
            refresh_embeddings,
            json,
        } => {
            let options = RunOptions {
                force_extract,
                refresh_embeddings,
                ..RunOptions::default()
            };
            commands::run_align(&config, &song, clip, source.as_deref(), &options, json)?;
        }
        Commands::Catalog { json } => {
            commands::show_catalog(&config, json)?;
        }
        Commands::Results { song, runs, limit } => {
            if runs {
                commands::show_runs(&config, limit)?;
            } else {
                commands::show_results(&config, song.as_deref())?;
            }
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn init_logging(default_level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}
