use anyhow::{Context, Result};
use chordwise::chord;
use chordwise::db::Database;
use chordwise::keys::KeyTable;
use chordwise::similarity::{Corpus, RankedSong};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chordwise", version, about = "Chord-progression key detection and song similarity")]
struct Cli {
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
    /// Import songs, tab links and an optional key table from a JSON or YAML file
    Import {
        /// Catalog file (.json, .yaml, .yml)
        file: PathBuf,
    },

    /// Detect the key of a chord sequence and show it transposed to the canonical key
    Key {
        /// Comma-separated chords, e.g. "D,G,A,Bm"
        chords: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Rank catalog songs by transition similarity to a catalog song
    Similar {
        /// Song id (see `search`)
        song_id: i64,

        /// Number of results (defaults to config limit)
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Rank catalog songs by transition similarity to a typed chord sequence
    Match {
        /// Comma-separated chords, e.g. "G,D,Em,C"
        chords: String,

        /// Number of results (defaults to config limit)
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Find songs by title (substring match)
    Search {
        title: String,

        /// Number of results
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Show external tab links for a song
    Links {
        song_id: i64,

        /// Print JSON instead of a list
        #[arg(long)]
        json: bool,
    },

    /// Compare computed keys with the key labels stored in the catalog
    Validate {
        /// Number of parallel workers (0 = auto-detect from config)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,

        /// Number of disagreeing songs to list
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Print the key-reference table in use
    Keys,

    /// Show catalog statistics
    Stats,
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

    // Load config file (optional, defaults if missing)
    let config = chordwise::config::AppConfig::load();

    // Resolve database path: CLI > config > XDG default
    let db_path = cli.db_path
        .or(config.db_path.clone())
        .unwrap_or_else(chordwise::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    let db = Database::open(&db_path).context("Failed to open database")?;
    let target = config.canonical_key.as_str();

    match cli.command {
        Commands::Import { file } => {
            let result = chordwise::import::import_catalog(&db, &file)
                .with_context(|| format!("Import of {} failed", file.display()))?;
            println!(
                "Import complete: {} songs, {} tab links, {} rejected",
                result.songs, result.tabs, result.rejected
            );
            if result.keys > 0 {
                println!("Stored key table with {} keys", result.keys);
            }
        }

        Commands::Key { chords, json } => {
            let table = key_table(&db)?;
            let detection = table.classify_str(&chords).context("Invalid chord sequence")?;
            let transposed = chordwise::transpose::transpose(&table, &detection.cleaned, target)
                .context("Transpose failed")?;

            if json {
                let out = serde_json::json!({
                    "key": detection.key,
                    "ambiguous": detection.ambiguous,
                    "cleaned": detection.cleaned,
                    "transposed": transposed.chords,
                    "target": target,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }

            println!("Key:        {}", detection.key);
            println!("Votes:      {}/{}", detection.best_score(), detection.cleaned.len());
            println!("Cleaned:    {}", chord::format_sequence(&detection.cleaned));
            println!("In {}:{}{}", target, " ".repeat(8usize.saturating_sub(target.len())), chord::format_sequence(&transposed.chords));

            if detection.ambiguous {
                let tied: Vec<&str> = table.keys().iter()
                    .zip(&detection.scores)
                    .filter(|(_, s)| **s == detection.best_score())
                    .map(|(k, _)| k.name.as_str())
                    .collect();
                println!();
                println!("Note: tied with {} (first in table order wins)", tied.join(", "));
            }
        }

        Commands::Similar { song_id, limit, json } => {
            let song = db.get_song(song_id).context("Query failed")?;
            let Some(song) = song else {
                println!("No song with id {}.", song_id);
                return Ok(());
            };

            let table = key_table(&db)?;
            let songs = db.all_songs().context("Failed to load catalog")?;
            let corpus = Corpus::build(&table, &songs, target).context("Failed to build corpus")?;
            let mut ranked = corpus.rank_song(song_id).context("Ranking failed")?;
            ranked.truncate(limit.unwrap_or(config.limit));

            if json {
                println!("{}", serde_json::to_string_pretty(&ranked)?);
                return Ok(());
            }

            println!("Songs similar to \"{}\" by {}:", song.title, song.artist);
            println!();
            print_ranking(&ranked);
        }

        Commands::Match { chords, limit, json } => {
            let table = key_table(&db)?;
            let songs = db.all_songs().context("Failed to load catalog")?;
            if songs.is_empty() {
                println!("Catalog is empty. Run `chordwise import` first.");
                return Ok(());
            }

            let corpus = Corpus::build(&table, &songs, target).context("Failed to build corpus")?;
            let mut result = corpus.rank_chords(&chords).context("Ranking failed")?;
            result.ranked.truncate(limit.unwrap_or(config.limit));

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            println!("Detected key: {}", result.key);
            println!("In {}: {}", target, chord::format_sequence(&result.transposed));
            println!();
            print_ranking(&result.ranked);
        }

        Commands::Search { title, limit } => {
            let songs = db.find_songs(&title, limit).context("Search failed")?;
            if songs.is_empty() {
                println!("No songs matching \"{}\".", title);
                return Ok(());
            }

            println!("{:>6}  {:<35} {:<25} {:>4}", "Id", "Song", "Artist", "Key");
            println!("{}", "-".repeat(74));
            for s in &songs {
                println!(
                    "{:>6}  {:<35} {:<25} {:>4}",
                    s.id,
                    truncate(&s.title, 35),
                    truncate(&s.artist, 25),
                    s.key.as_deref().unwrap_or("-"),
                );
            }
        }

        Commands::Links { song_id, json } => {
            let links = match db.song_links(song_id) {
                Ok(links) => links,
                Err(chordwise::db::DbError::SongNotFound(id)) => {
                    println!("No song with id {}.", id);
                    return Ok(());
                }
                Err(e) => return Err(e).context("Query failed"),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&links)?);
                return Ok(());
            }

            if links.is_empty() {
                println!("No tab links for song {}.", song_id);
                return Ok(());
            }
            for link in &links {
                println!("{:>6}  {}", link.id, link.url);
            }
        }

        Commands::Validate { jobs, limit } => {
            let workers = if jobs > 0 { jobs } else { config.resolve_workers() };
            let table = key_table(&db)?;
            let songs = db.all_songs().context("Failed to load catalog")?;
            let result = chordwise::validate::validate_keys(&table, &songs, workers);

            if result.checked == 0 {
                println!("No songs with key labels to validate.");
                return Ok(());
            }

            println!(
                "Validation complete: {} checked: {} exact, {} relative minor, {} mismatched, {} unparseable",
                result.checked, result.exact, result.relative_minor, result.mismatched, result.unparseable
            );
            println!("Agreement: {:.1}%", result.agreement() * 100.0);

            if !result.failures.is_empty() && limit > 0 {
                println!();
                println!("{:>6}  {:<35} {:>8} {:>8}", "Id", "Song", "Label", "Computed");
                println!("{}", "-".repeat(62));
                for f in result.failures.iter().take(limit) {
                    println!(
                        "{:>6}  {:<35} {:>8} {:>8}",
                        f.song_id,
                        truncate(&f.title, 35),
                        f.supplied,
                        f.computed.as_deref().unwrap_or("?"),
                    );
                }
            }
        }

        Commands::Keys => {
            let table = key_table(&db)?;
            for entry in table.keys() {
                println!("{:<4} {}", entry.name, chord::format_sequence(&entry.chords).replace(',', " "));
            }
        }

        Commands::Stats => {
            let stats = db.stats().context("Failed to get stats")?;
            println!("Catalog Statistics");
            println!("==================");
            println!("Songs:            {}", stats.songs);
            println!("Unique titles:    {}", stats.unique_titles);
            println!("Artists:          {}", stats.artists);
            println!("Tab links:        {}", stats.tabs);
            println!("Key-labeled:      {}", stats.labeled_songs);
            println!(
                "Key table:        {}",
                if stats.stored_keys > 0 {
                    format!("{} stored keys", stats.stored_keys)
                } else {
                    "built-in (12 major keys)".to_string()
                }
            );
            println!();

            if !stats.top_artists.is_empty() {
                println!("Artists:");
                for (artist, count) in &stats.top_artists {
                    println!("  {:<30} {}", artist, count);
                }
            }
        }
    }

    Ok(())
}

/// Stored key table if one was imported, otherwise the built-in major keys.
fn key_table(db: &Database) -> Result<KeyTable> {
    let stored = db.load_key_table().context("Failed to load key table")?;
    Ok(stored.unwrap_or_else(|| {
        log::debug!("No stored key table, using built-in major keys");
        KeyTable::standard()
    }))
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let head: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

/// Print a ranked similarity table.
fn print_ranking(ranked: &[RankedSong]) {
    if ranked.is_empty() {
        println!("No results found.");
        return;
    }

    println!(
        "{:>4}  {:>6}  {:<35} {:<25} {:>7}",
        "Rank", "Id", "Song", "Artist", "Dist"
    );
    println!("{}", "-".repeat(83));

    for r in ranked {
        println!(
            "{:>4}  {:>6}  {:<35} {:<25} {:>7.4}",
            r.rank,
            r.song_id,
            truncate(&r.title, 35),
            truncate(&r.artist, 25),
            r.distance,
        );
    }

    println!();
    println!("Dist = transition-matrix distance in the canonical key (0 = identical)");
}
