use serde::Serialize;

/// Data for inserting or updating a song (import phase).
pub struct NewSong {
    pub title: String,
    pub artist: String,
    pub chords: String,
    pub key: Option<String>,
}

/// A song row read from the database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Song {
    pub id: i64,
    pub title: String,
    pub artist: String,
    /// Raw comma-delimited chord sequence.
    pub chords: String,
    /// Externally supplied key label.
    pub key: Option<String>,
}

/// Data for inserting a tab-source link.
pub struct NewTab {
    pub title: String,
    pub artist: String,
    pub url: String,
}

/// An external tab-source link for a song (joined on title + artist).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TabLink {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub url: String,
}

/// Catalog statistics.
#[derive(Debug)]
pub struct CatalogStats {
    pub songs: i64,
    pub unique_titles: i64,
    pub artists: i64,
    pub tabs: i64,
    pub labeled_songs: i64,
    pub stored_keys: i64,
    pub top_artists: Vec<(String, i64)>,
}
