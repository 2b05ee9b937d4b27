//! Cross-check computed keys against the key labels that came with the catalog.

use rayon::prelude::*;

use crate::chord;
use crate::db::models::Song;
use crate::keys::{KeyTable, is_relative_minor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Computed key equals the supplied label (after enharmonic normalization).
    Exact,
    /// Supplied label is the relative minor of the computed major key.
    RelativeMinor,
    Mismatch,
    /// The song's chords do not parse.
    Unparseable,
}

#[derive(Debug, Clone)]
pub struct KeyCheck {
    pub song_id: i64,
    pub title: String,
    pub supplied: String,
    pub computed: Option<String>,
    pub verdict: Verdict,
}

#[derive(Debug, Default)]
pub struct ValidationResult {
    pub checked: usize,
    pub exact: usize,
    pub relative_minor: usize,
    pub mismatched: usize,
    pub unparseable: usize,
    /// Every song that did not match exactly or as a relative minor.
    pub failures: Vec<KeyCheck>,
}

impl ValidationResult {
    /// Share of checked songs whose key agreed (exactly or as relative minor).
    pub fn agreement(&self) -> f64 {
        if self.checked == 0 {
            0.0
        } else {
            (self.exact + self.relative_minor) as f64 / self.checked as f64
        }
    }
}

/// Compare one song's computed key with its supplied label.
pub fn check_song(table: &KeyTable, song: &Song, supplied: &str) -> KeyCheck {
    let (computed, verdict) = match table.classify_str(&song.chords) {
        Ok(detection) => {
            let verdict = if same_key(&detection.key, supplied) {
                Verdict::Exact
            } else if is_relative_minor(&detection.key, supplied) {
                Verdict::RelativeMinor
            } else {
                Verdict::Mismatch
            };
            (Some(detection.key), verdict)
        }
        Err(e) => {
            log::debug!("Song {} has unparseable chords: {}", song.id, e);
            (None, Verdict::Unparseable)
        }
    };

    KeyCheck {
        song_id: song.id,
        title: song.title.clone(),
        supplied: supplied.to_string(),
        computed,
        verdict,
    }
}

/// Key names compare as normalized chords so `Bb` matches `A#`.
fn same_key(computed: &str, supplied: &str) -> bool {
    match (chord::Chord::parse(computed), chord::Chord::parse(supplied)) {
        (Ok(a), Ok(b)) => a == b,
        _ => computed == supplied,
    }
}

/// Check every labeled song. Unlabeled songs are skipped.
pub fn validate_keys(table: &KeyTable, songs: &[Song], jobs: usize) -> ValidationResult {
    let labeled: Vec<(&Song, &str)> = songs
        .iter()
        .filter_map(|s| {
            s.key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(|k| (s, k))
        })
        .collect();

    let run = || -> Vec<KeyCheck> {
        labeled
            .par_iter()
            .map(|(song, supplied)| check_song(table, song, supplied))
            .collect()
    };

    let checks = match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
        Ok(pool) => pool.install(run),
        Err(e) => {
            log::warn!("Failed to build thread pool ({}), using global pool", e);
            run()
        }
    };

    let mut result = ValidationResult {
        checked: checks.len(),
        ..Default::default()
    };
    for check in checks {
        match check.verdict {
            Verdict::Exact => result.exact += 1,
            Verdict::RelativeMinor => result.relative_minor += 1,
            Verdict::Mismatch => {
                result.mismatched += 1;
                result.failures.push(check);
            }
            Verdict::Unparseable => {
                result.unparseable += 1;
                result.failures.push(check);
            }
        }
    }
    result
}
