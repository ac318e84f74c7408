use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use musicstore::config::AppConfig;
use musicstore::db::Database;
use musicstore::filestore::{AudioFileStore, TrackOverride};
use musicstore::recommend::RecommendRequest;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "musicstore", version, about = "Music catalog with emotion-based recommendation")]
struct Cli {
    /// Config file (default: ~/.config/musicstore/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Send permissive CORS headers
        #[arg(long)]
        cors: bool,

        /// Print the resolved config and exit
        #[arg(long)]
        dry_run: bool,
    },

    /// Import every audio file under a store's directory
    Import {
        /// Store name from the config
        store: String,
    },

    /// Add a single audio file to a store
    Add {
        /// Store name from the config
        store: String,

        /// Audio file to ingest
        path: PathBuf,

        /// Track name (overrides the title tag)
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        artist: Option<String>,

        #[arg(long)]
        album: Option<String>,

        /// Cover image URL
        #[arg(long)]
        cover: Option<String>,
    },

    /// Find tracks close to a valence/arousal point
    Recommend {
        #[arg(long)]
        valence: f64,

        #[arg(long)]
        arousal: f64,

        /// Number of results (1-100)
        #[arg(short = 'n', long, default_value = "3")]
        limit: i64,
    },

    /// Show catalog statistics
    Stats,
}

fn open_store(config: &AppConfig, name: &str) -> Result<AudioFileStore> {
    let cfg = config.store(name).with_context(|| {
        let known: Vec<&str> = config.stores.iter().map(|s| s.name.as_str()).collect();
        format!("No store named {name:?} (configured: {})", known.join(", "))
    })?;
    AudioFileStore::from_config(cfg, &config.emotion.server)
        .with_context(|| format!("Failed to open store {name:?}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load config")?;

    if let Commands::Serve { dry_run: true, .. } = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    // Resolve database path: CLI > config > XDG default
    let db_path = cli
        .db_path
        .or(config.db_path.clone())
        .unwrap_or_else(musicstore::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    let db = Database::open(&db_path).context("Failed to open database")?;

    match cli.command {
        Commands::Serve { cors, .. } => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(musicstore::server::serve(&config, db, cors))?;
        }

        Commands::Import { store } => {
            let store = open_store(&config, &store)?;

            let pb = ProgressBar::new_spinner();
            pb.set_style(ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {pos} files ({per_sec}) {msg}",
            )?);
            pb.enable_steady_tick(Duration::from_millis(120));

            let result = store
                .add_tracks_from_dir(&db, &pb)
                .context("Import failed")?;
            println!(
                "Import complete: {} scanned, {} added, {} already cataloged, {} duplicates, {} errors",
                result.scanned, result.added, result.skipped, result.duplicates, result.failed
            );
        }

        Commands::Add { store, path, name, artist, album, cover } => {
            let store = open_store(&config, &store)?;
            let overrides = TrackOverride {
                name,
                artist,
                album,
                cover_image_url: cover,
            };
            let track = store
                .add_track(&db, &path, &[overrides])
                .with_context(|| format!("Failed to add {}", path.display()))?;

            println!("Added track {}: {} / {} / {}", track.id, track.name, track.artist, track.album);
            println!("  {}", track.audio_file_url);
            if let Some(e) = track.emotion {
                println!("  valence {:.3}  arousal {:.3}", e.valence, e.arousal);
            }
        }

        Commands::Recommend { valence, arousal, limit } => {
            let req = RecommendRequest { valence, arousal, limit };
            let tracks = musicstore::recommend::recommend(&db, &req)?;

            if tracks.is_empty() {
                println!("No tracks near valence {valence}, arousal {arousal}.");
                return Ok(());
            }

            println!("{:>6}  {:<32} {:<24} {:>5} {:>5}", "ID", "Name", "Artist", "Val", "Aro");
            println!("{}", "-".repeat(76));
            for t in &tracks {
                let (v, a) = t.emotion.map_or((0.0, 0.0), |e| (e.valence, e.arousal));
                println!(
                    "{:>6}  {:<32} {:<24} {:>5.2} {:>5.2}",
                    t.id,
                    truncate(&t.name, 32),
                    truncate(&t.artist, 24),
                    v,
                    a
                );
            }
        }

        Commands::Stats => {
            let stats = db.stats().context("Failed to get stats")?;

            println!("Catalog Statistics");
            println!("==================");
            println!("Total tracks:     {}", stats.total_tracks);
            println!("With emotion:     {}", stats.with_emotion);
            println!("Artists:          {}", stats.artists);
            if !config.stores.is_empty() {
                println!();
                println!("Stores:");
                for s in &config.stores {
                    println!("  {:<16} {}", s.name, s.file_dir.display());
                }
            }
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{cut}…")
    }
}
