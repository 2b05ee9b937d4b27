use std::collections::HashSet;
use std::iter;

use serde::Serialize;
use thiserror::Error;

use crate::chord::{self, Chord, ChordError};
use crate::db::models::Song;
use crate::keys::KeyTable;
use crate::markov::{MatrixError, TransitionMatrix, Vocabulary};
use crate::transpose::{self, TransposeError, Transposed};

#[derive(Error, Debug)]
pub enum SimilarityError {
    #[error("Song {0} not found in catalog")]
    SongNotFound(i64),
    #[error("Song {id} ({title:?}) has a malformed chord: {source}")]
    MalformedSong {
        id: i64,
        title: String,
        source: ChordError,
    },
    #[error("Malformed query: {0}")]
    MalformedQuery(#[from] ChordError),
    #[error("Query has no chords")]
    EmptyQuery,
    #[error("Transpose error: {0}")]
    Transpose(#[from] TransposeError),
    #[error("Transition model error: {0}")]
    Matrix(#[from] MatrixError),
}

pub type Result<T> = std::result::Result<T, SimilarityError>;

/// One row of a similarity ranking.
#[derive(Debug, Clone, Serialize)]
pub struct RankedSong {
    pub song_id: i64,
    pub title: String,
    pub artist: String,
    pub distance: f64,
    pub rank: usize,
}

/// Ranking for a free-form chord query.
#[derive(Debug, Clone, Serialize)]
pub struct UserMatch {
    /// Key detected for the query before transposition.
    pub key: String,
    pub transposed: Vec<Chord>,
    pub ranked: Vec<RankedSong>,
}

struct CorpusEntry<'a> {
    song: &'a Song,
    transposed: Transposed,
}

/// A catalog transposed into the target key, with its finalized vocabulary.
///
/// Built in two passes: every song is transposed first, then the vocabulary
/// is frozen from the union of their chords. Matrices are only built after
/// that, so state indices never move.
pub struct Corpus<'a> {
    entries: Vec<CorpusEntry<'a>>,
    vocabulary: Vocabulary,
    table: &'a KeyTable,
    target: String,
}

impl<'a> Corpus<'a> {
    pub fn build(table: &'a KeyTable, songs: &'a [Song], target: &str) -> Result<Self> {
        let mut entries = Vec::with_capacity(songs.len());
        for song in songs {
            let chords = chord::parse_sequence(&song.chords).map_err(|source| {
                SimilarityError::MalformedSong {
                    id: song.id,
                    title: song.title.clone(),
                    source,
                }
            })?;
            let transposed = transpose::transpose(table, &chords, target)?;
            entries.push(CorpusEntry { song, transposed });
        }

        let vocabulary =
            Vocabulary::from_sequences(entries.iter().map(|e| e.transposed.chords.as_slice()));
        log::debug!(
            "Corpus: {} songs, {} states in key {}",
            entries.len(),
            vocabulary.len(),
            target
        );

        Ok(Self {
            entries,
            vocabulary,
            table,
            target: target.to_string(),
        })
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Transposed chords for a catalog song.
    pub fn transposed(&self, song_id: i64) -> Option<&Transposed> {
        self.entries
            .iter()
            .find(|e| e.song.id == song_id)
            .map(|e| &e.transposed)
    }

    /// Rank the catalog against one of its own songs.
    ///
    /// The query itself stays in the ranking and ranks start at 0. It wins every
    /// tie at distance 0, so a same-titled duplicate never displaces it.
    pub fn rank_song(&self, song_id: i64) -> Result<Vec<RankedSong>> {
        let query = self
            .transposed(song_id)
            .ok_or(SimilarityError::SongNotFound(song_id))?;
        let query_matrix = TransitionMatrix::build(&self.vocabulary, &query.chords)?;
        self.rank(&self.vocabulary, &query_matrix, 0, Some(song_id))
    }

    /// Rank the catalog against chords typed by a user. Ranks start at 1.
    pub fn rank_chords(&self, raw: &str) -> Result<UserMatch> {
        let chords = chord::parse_sequence(raw)?;
        if chords.is_empty() {
            return Err(SimilarityError::EmptyQuery);
        }
        let query = transpose::transpose(self.table, &chords, &self.target)?;

        // The query may bring states the catalog never uses
        let vocabulary = Vocabulary::from_sequences(
            self.entries
                .iter()
                .map(|e| e.transposed.chords.as_slice())
                .chain(iter::once(query.chords.as_slice())),
        );
        let query_matrix = TransitionMatrix::build(&vocabulary, &query.chords)?;
        let ranked = self.rank(&vocabulary, &query_matrix, 1, None)?;

        Ok(UserMatch {
            key: query.original_key,
            transposed: query.chords,
            ranked,
        })
    }

    fn rank(
        &self,
        vocabulary: &Vocabulary,
        query: &TransitionMatrix,
        first_rank: usize,
        query_id: Option<i64>,
    ) -> Result<Vec<RankedSong>> {
        let scored = self
            .entries
            .iter()
            .map(|e| {
                let m = TransitionMatrix::build(vocabulary, &e.transposed.chords)?;
                Ok((e.song, query.distance(&m)?))
            })
            .collect::<std::result::Result<Vec<_>, MatrixError>>()?;

        Ok(rank_by_distance(scored, first_rank, query_id))
    }
}

/// Sort ascending by distance, keep the closest entry per title, and number
/// the survivors from `first_rank`. On equal distances `query_id` sorts first,
/// then catalog order.
pub fn rank_by_distance(
    mut scored: Vec<(&Song, f64)>,
    first_rank: usize,
    query_id: Option<i64>,
) -> Vec<RankedSong> {
    let is_other = |song: &Song| query_id != Some(song.id);
    scored.sort_by(|a, b| {
        a.1.total_cmp(&b.1)
            .then_with(|| is_other(a.0).cmp(&is_other(b.0)))
    });

    let mut seen: HashSet<&str> = HashSet::new();
    scored
        .into_iter()
        .filter(|&(song, _)| seen.insert(song.title.as_str()))
        .enumerate()
        .map(|(i, (song, distance))| RankedSong {
            song_id: song.id,
            title: song.title.clone(),
            artist: song.artist.clone(),
            distance,
            rank: first_rank + i,
        })
        .collect()
}
