use super::models::{CatalogStats, NewSong, NewTab, Song, TabLink};
use super::{Database, DbError, Result};
use crate::keys::KeyTable;
use rusqlite::params;

fn song_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Song> {
    Ok(Song {
        id: row.get(0)?,
        title: row.get(1)?,
        artist: row.get(2)?,
        chords: row.get(3)?,
        key: row.get(4)?,
    })
}

impl Database {
    /// Insert or update a song. Returns the song id.
    /// Songs are identified by (title, artist, chords); re-importing updates the key label.
    pub fn upsert_song(&self, s: &NewSong) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO songs (title, artist, chords, key)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(title, artist, chords) DO UPDATE SET
                key = excluded.key",
            params![s.title, s.artist, s.chords, s.key],
        )?;

        let id: i64 = self.conn.query_row(
            "SELECT id FROM songs WHERE title = ?1 AND artist = ?2 AND chords = ?3",
            params![s.title, s.artist, s.chords],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Insert a tab link. Returns false if the URL was already stored.
    pub fn insert_tab(&self, t: &NewTab) -> Result<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO tabs (title, artist, url) VALUES (?1, ?2, ?3)",
            params![t.title, t.artist, t.url],
        )?;
        Ok(changed > 0)
    }

    /// Every song in the catalog, in id order.
    pub fn all_songs(&self) -> Result<Vec<Song>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, title, artist, chords, key FROM songs ORDER BY id")?;

        let songs = stmt
            .query_map([], song_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(songs)
    }

    pub fn get_song(&self, id: i64) -> Result<Option<Song>> {
        let result = self.conn.query_row(
            "SELECT id, title, artist, chords, key FROM songs WHERE id = ?1",
            params![id],
            song_from_row,
        );

        match result {
            Ok(song) => Ok(Some(song)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Songs whose title contains `text` (case-insensitive). `%` and `_` match
    /// literally.
    pub fn find_songs(&self, text: &str, limit: usize) -> Result<Vec<Song>> {
        let escaped = text
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let mut stmt = self.conn.prepare(
            "SELECT id, title, artist, chords, key FROM songs
             WHERE title LIKE '%' || ?1 || '%' ESCAPE '\\'
             ORDER BY title, artist, id
             LIMIT ?2",
        )?;

        let songs = stmt
            .query_map(params![escaped, limit as i64], song_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(songs)
    }

    /// Tab-source links for a song, matched on its title and artist.
    pub fn song_links(&self, song_id: i64) -> Result<Vec<TabLink>> {
        let song = self
            .get_song(song_id)?
            .ok_or(DbError::SongNotFound(song_id))?;
        log::debug!("Pulling tab links for song {} ({})", song_id, song.title);

        let mut stmt = self.conn.prepare(
            "SELECT id, title, artist, url FROM tabs
             WHERE title = ?1 AND artist = ?2
             ORDER BY id",
        )?;

        let links = stmt
            .query_map(params![song.title, song.artist], |row| {
                Ok(TabLink {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    artist: row.get(2)?,
                    url: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(links)
    }

    /// Replace the stored key-reference table. Runs inside whatever
    /// transaction the caller already has open.
    pub fn write_key_table(&self, table: &KeyTable) -> Result<()> {
        self.conn.execute("DELETE FROM key_chords", [])?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO key_chords (key_name, key_order, position, chord)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (order, entry) in table.keys().iter().enumerate() {
            for (pos, chord) in entry.chords.iter().enumerate() {
                stmt.execute(params![
                    entry.name,
                    order as i64,
                    pos as i64,
                    chord.to_string()
                ])?;
            }
        }
        Ok(())
    }

    /// Load the stored key-reference table, or `None` if none has been stored.
    pub fn load_key_table(&self) -> Result<Option<KeyTable>> {
        let mut stmt = self.conn.prepare(
            "SELECT key_name, chord FROM key_chords ORDER BY key_order, position",
        )?;
        let rows: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
        for (key, chord) in rows {
            if let Some((name, chords)) = grouped.last_mut() {
                if *name == key {
                    chords.push(chord);
                    continue;
                }
            }
            grouped.push((key, vec![chord]));
        }

        Ok(Some(KeyTable::from_rows(&grouped)?))
    }

    /// Get catalog statistics.
    pub fn stats(&self) -> Result<CatalogStats> {
        let count = |sql: &str| -> Result<i64> {
            Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
        };

        let songs = count("SELECT COUNT(*) FROM songs")?;
        let unique_titles = count("SELECT COUNT(DISTINCT title) FROM songs")?;
        let artists = count("SELECT COUNT(DISTINCT artist) FROM songs")?;
        let tabs = count("SELECT COUNT(*) FROM tabs")?;
        let labeled_songs = count("SELECT COUNT(*) FROM songs WHERE key IS NOT NULL AND key != ''")?;
        let stored_keys = count("SELECT COUNT(DISTINCT key_name) FROM key_chords")?;

        let mut artist_stmt = self.conn.prepare(
            "SELECT artist, COUNT(*) FROM songs
             GROUP BY artist
             ORDER BY COUNT(*) DESC, artist
             LIMIT 20",
        )?;
        let top_artists: Vec<(String, i64)> = artist_stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(CatalogStats {
            songs,
            unique_titles,
            artists,
            tabs,
            labeled_songs,
            stored_keys,
            top_artists,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_song() -> NewSong {
        NewSong {
            title: "Wonderwall".to_string(),
            artist: "Oasis".to_string(),
            chords: "Em7,G,Dsus4,A7sus4".to_string(),
            key: Some("Em".to_string()),
        }
    }

    #[test]
    fn test_upsert_and_retrieve() {
        let db = Database::open_in_memory().unwrap();
        let s = test_song();
        let id = db.upsert_song(&s).unwrap();
        assert!(id > 0);

        let songs = db.all_songs().unwrap();
        assert_eq!(songs.len(), 1);
        assert_eq!(songs[0].chords, s.chords);
        assert_eq!(songs[0].key.as_deref(), Some("Em"));

        let song = db.get_song(id).unwrap().unwrap();
        assert_eq!(song.title, "Wonderwall");
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let mut s = test_song();
        let id1 = db.upsert_song(&s).unwrap();
        s.key = Some("G".to_string());
        let id2 = db.upsert_song(&s).unwrap();
        assert_eq!(id1, id2);

        assert_eq!(db.stats().unwrap().songs, 1);
        assert_eq!(db.get_song(id1).unwrap().unwrap().key.as_deref(), Some("G"));
    }

    #[test]
    fn test_get_song_missing() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_song(42).unwrap().is_none());
    }

    #[test]
    fn test_song_links() {
        let db = Database::open_in_memory().unwrap();
        let id = db.upsert_song(&test_song()).unwrap();

        for url in ["https://tabs.example/wonderwall-1", "https://tabs.example/wonderwall-2"] {
            assert!(db.insert_tab(&NewTab {
                title: "Wonderwall".into(),
                artist: "Oasis".into(),
                url: url.into(),
            }).unwrap());
        }
        // Duplicate URL is ignored
        assert!(!db.insert_tab(&NewTab {
            title: "Wonderwall".into(),
            artist: "Oasis".into(),
            url: "https://tabs.example/wonderwall-1".into(),
        }).unwrap());
        // Same title, different artist is not linked
        db.insert_tab(&NewTab {
            title: "Wonderwall".into(),
            artist: "Ryan Adams".into(),
            url: "https://tabs.example/wonderwall-cover".into(),
        }).unwrap();

        let links = db.song_links(id).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].url, "https://tabs.example/wonderwall-1");
    }

    #[test]
    fn test_song_links_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.song_links(7), Err(DbError::SongNotFound(7))));
    }

    #[test]
    fn test_find_songs() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_song(&test_song()).unwrap();
        db.upsert_song(&NewSong {
            title: "Champagne Supernova".into(),
            artist: "Oasis".into(),
            chords: "A,Asus2,G,D".into(),
            key: None,
        }).unwrap();

        let found = db.find_songs("wonder", 10).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Wonderwall");
        assert_eq!(db.find_songs("", 10).unwrap().len(), 2);
    }

    #[test]
    fn test_find_songs_wildcards_are_literal() {
        let db = Database::open_in_memory().unwrap();
        for title in ["100% Pure", "1000 Pure", "snake_case", "snakeXcase"] {
            db.upsert_song(&NewSong {
                title: title.into(),
                artist: "Various".into(),
                chords: "C,G".into(),
                key: None,
            }).unwrap();
        }

        let pct = db.find_songs("100%", 10).unwrap();
        assert_eq!(pct.len(), 1);
        assert_eq!(pct[0].title, "100% Pure");

        let under = db.find_songs("e_c", 10).unwrap();
        assert_eq!(under.len(), 1);
        assert_eq!(under[0].title, "snake_case");
    }

    #[test]
    fn test_write_key_table_rolls_back_with_caller() {
        let db = Database::open_in_memory().unwrap();
        {
            let _tx = db.conn.unchecked_transaction().unwrap();
            db.write_key_table(&KeyTable::standard()).unwrap();
            // dropped without commit
        }
        assert!(db.load_key_table().unwrap().is_none());
    }

    #[test]
    fn test_key_table_round_trip() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.load_key_table().unwrap().is_none());

        let table = KeyTable::standard();
        db.write_key_table(&table).unwrap();
        let loaded = db.load_key_table().unwrap().unwrap();

        let names: Vec<&str> = loaded.keys().iter().map(|k| k.name.as_str()).collect();
        let expected: Vec<&str> = table.keys().iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, expected);
        assert_eq!(loaded.get("G").unwrap().chords, table.get("G").unwrap().chords);
        assert_eq!(db.stats().unwrap().stored_keys, 12);

        // Storing again replaces rather than appends
        db.write_key_table(&table).unwrap();
        assert_eq!(db.load_key_table().unwrap().unwrap().keys().len(), 12);
    }

    #[test]
    fn test_stats_empty() {
        let db = Database::open_in_memory().unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.songs, 0);
        assert_eq!(stats.tabs, 0);
        assert!(stats.top_artists.is_empty());
    }
}
