//! Catalog import from JSON or YAML files.
//!
//! ```yaml
//! keys:            # optional; replaces the stored key table
//!   - key: C
//!     chords: [C, Dm, Em, F, G, Am, Bdim]
//! songs:
//!   - title: Wonderwall
//!     artist: Oasis
//!     chords: "Em7,G,Dsus4,A7sus4"   # or a list
//!     key: Em                        # optional source label
//!     tabs: ["https://..."]          # optional
//! tabs:                              # optional standalone links
//!   - { title: Wonderwall, artist: Oasis, url: "https://..." }
//! ```

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use thiserror::Error;

use crate::chord;
use crate::db::models::{NewSong, NewTab};
use crate::db::{Database, DbError};
use crate::keys::{KeyError, KeyTable};

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Unsupported catalog format {0:?} (expected .json, .yaml or .yml)")]
    UnsupportedFormat(String),
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("Key table error: {0}")]
    KeyTable(#[from] KeyError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CatalogFile {
    pub keys: Vec<KeyRecord>,
    pub songs: Vec<SongRecord>,
    pub tabs: Vec<TabRecord>,
}

#[derive(Debug, Deserialize)]
pub struct KeyRecord {
    pub key: String,
    pub chords: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SongRecord {
    pub title: String,
    pub artist: String,
    pub chords: ChordField,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub tabs: Vec<String>,
}

/// Chords as a comma-delimited string or as a list of tokens.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ChordField {
    Text(String),
    List(Vec<String>),
}

impl ChordField {
    fn to_sequence_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::List(items) => items.join(","),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TabRecord {
    pub title: String,
    pub artist: String,
    pub url: String,
}

#[derive(Debug, Default)]
pub struct ImportResult {
    pub songs: u64,
    pub tabs: u64,
    pub rejected: u64,
    pub keys: usize,
}

/// Read a catalog file, choosing the parser by extension.
pub fn read_catalog(path: &Path) -> Result<CatalogFile, ImportError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let contents = std::fs::read_to_string(path)?;
    parse_catalog(&contents, &ext)
}

pub fn parse_catalog(contents: &str, ext: &str) -> Result<CatalogFile, ImportError> {
    match ext {
        "json" => Ok(serde_json::from_str(contents)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(contents)?),
        other => Err(ImportError::UnsupportedFormat(other.to_string())),
    }
}

pub fn import_catalog(db: &Database, path: &Path) -> Result<ImportResult, ImportError> {
    let catalog = read_catalog(path)?;
    log::info!(
        "Read {} songs, {} tab links, {} keys from {}",
        catalog.songs.len(),
        catalog.tabs.len(),
        catalog.keys.len(),
        path.display()
    );
    import_records(db, &catalog)
}

/// Store a parsed catalog in one transaction. Songs whose chords do not parse,
/// or that have no chords, are skipped and counted.
pub fn import_records(db: &Database, catalog: &CatalogFile) -> Result<ImportResult, ImportError> {
    let mut result = ImportResult::default();

    let table = if catalog.keys.is_empty() {
        None
    } else {
        let rows: Vec<(String, Vec<String>)> = catalog
            .keys
            .iter()
            .map(|k| (k.key.clone(), k.chords.clone()))
            .collect();
        Some(KeyTable::from_rows(&rows)?)
    };

    let pb = ProgressBar::new(catalog.songs.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message("Importing...");

    // Key table, songs and links commit together or not at all
    let tx = db.conn.unchecked_transaction().map_err(DbError::from)?;

    if let Some(table) = &table {
        db.write_key_table(table)?;
        result.keys = table.keys().len();
    }

    for record in &catalog.songs {
        pb.inc(1);
        let chords = record.chords.to_sequence_string();
        let parsed = chord::parse_sequence(&chords).and_then(|seq| {
            if seq.is_empty() {
                Err(chord::ChordError::EmptySequence)
            } else {
                Ok(seq)
            }
        });
        if let Err(e) = parsed {
            log::warn!("Skipping {} - {}: {}", record.artist, record.title, e);
            result.rejected += 1;
            continue;
        }

        db.upsert_song(&NewSong {
            title: record.title.clone(),
            artist: record.artist.clone(),
            chords,
            key: record.key.clone().filter(|k| !k.trim().is_empty()),
        })?;
        result.songs += 1;

        for url in &record.tabs {
            let link = NewTab {
                title: record.title.clone(),
                artist: record.artist.clone(),
                url: url.clone(),
            };
            if db.insert_tab(&link)? {
                result.tabs += 1;
            }
        }
    }

    for tab in &catalog.tabs {
        let link = NewTab {
            title: tab.title.clone(),
            artist: tab.artist.clone(),
            url: tab.url.clone(),
        };
        if db.insert_tab(&link)? {
            result.tabs += 1;
        }
    }

    tx.commit().map_err(DbError::from)?;
    pb.finish_and_clear();

    log::info!(
        "Imported {} songs, {} tab links ({} rejected)",
        result.songs,
        result.tabs,
        result.rejected
    );
    Ok(result)
}
