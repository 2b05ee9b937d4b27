pub mod models;
pub mod queries;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

use crate::keys::KeyError;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("Song {0} not found")]
    SongNotFound(i64),
    #[error("Stored key table is invalid: {0}")]
    KeyTable(#[from] KeyError),
}

pub type Result<T> = std::result::Result<T, DbError>;

const SCHEMA_VERSION: i32 = 1;

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.migrate()?;
        Ok(())
    }

    fn migrate(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if version > SCHEMA_VERSION {
            return Err(DbError::Migration(format!(
                "database schema v{version} is newer than supported v{SCHEMA_VERSION}"
            )));
        }
        if version < 1 {
            self.migrate_v1()?;
        }

        self.conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// V1: songs, tab links, key-reference table
    fn migrate_v1(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS songs (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                title       TEXT NOT NULL,
                artist      TEXT NOT NULL,
                -- Comma-delimited chord sequence as written in the source tab
                chords      TEXT NOT NULL,
                -- Key label supplied by the source, if any
                key         TEXT,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(title, artist, chords)
            );

            CREATE INDEX IF NOT EXISTS idx_songs_title ON songs(title);
            CREATE INDEX IF NOT EXISTS idx_songs_artist ON songs(artist);

            CREATE TABLE IF NOT EXISTS tabs (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                title   TEXT NOT NULL,
                artist  TEXT NOT NULL,
                url     TEXT NOT NULL UNIQUE
            );

            CREATE INDEX IF NOT EXISTS idx_tabs_song ON tabs(title, artist);

            CREATE TABLE IF NOT EXISTS key_chords (
                key_name    TEXT NOT NULL,
                key_order   INTEGER NOT NULL,
                position    INTEGER NOT NULL,
                chord       TEXT NOT NULL,
                PRIMARY KEY (key_name, position)
            );
            ",
        )?;
        Ok(())
    }
}
