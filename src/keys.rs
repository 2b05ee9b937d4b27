//! Key-reference table and chord-vote key classification.

use std::collections::HashMap;

use thiserror::Error;

use crate::chord::{self, Chord, ChordError, PitchClass, Quality, PITCH_NAMES};

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Key table is empty")]
    Empty,
    #[error("Invalid key name {name:?}: {source}")]
    InvalidName { name: String, source: ChordError },
    #[error("Invalid chord in key {key:?}: {source}")]
    InvalidChord { key: String, source: ChordError },
    #[error("Key {0:?} has no chords")]
    NoChords(String),
    #[error("Duplicate key {0:?}")]
    Duplicate(String),
}

/// Major-scale degrees (semitones above the tonic) and their triad qualities.
const MAJOR_SCALE: [(u8, Quality); 7] = [
    (0, Quality::Major),
    (2, Quality::Minor),
    (4, Quality::Minor),
    (5, Quality::Major),
    (7, Quality::Major),
    (9, Quality::Minor),
    (11, Quality::Diminished),
];

/// One row of the key table: a key and its diatonic chords by scale position.
#[derive(Debug, Clone)]
pub struct KeyEntry {
    pub name: String,
    pub root: PitchClass,
    pub mode: Quality,
    pub chords: Vec<Chord>,
}

/// Immutable key-reference table with a chord → (key, position) index.
#[derive(Debug, Clone)]
pub struct KeyTable {
    keys: Vec<KeyEntry>,
    index: HashMap<Chord, Vec<(usize, usize)>>,
}

/// Outcome of classifying one chord sequence.
#[derive(Debug, Clone)]
pub struct KeyDetection {
    /// Winning key name.
    pub key: String,
    pub key_index: usize,
    /// Total diatonic votes per key, in table order.
    pub scores: Vec<u32>,
    /// The normalized input sequence.
    pub cleaned: Vec<Chord>,
    /// More than one key reached the top score; the first in table order won.
    pub ambiguous: bool,
}

impl KeyDetection {
    pub fn best_score(&self) -> u32 {
        self.scores.get(self.key_index).copied().unwrap_or(0)
    }
}

impl KeyTable {
    pub fn new(keys: Vec<KeyEntry>) -> Result<Self, KeyError> {
        if keys.is_empty() {
            return Err(KeyError::Empty);
        }

        let mut seen = std::collections::HashSet::new();
        for entry in &keys {
            if !seen.insert(entry.name.as_str()) {
                return Err(KeyError::Duplicate(entry.name.clone()));
            }
            if entry.chords.is_empty() {
                return Err(KeyError::NoChords(entry.name.clone()));
            }
        }

        Ok(Self::indexed(keys))
    }

    fn indexed(keys: Vec<KeyEntry>) -> Self {
        let mut index: HashMap<Chord, Vec<(usize, usize)>> = HashMap::new();
        for (k, entry) in keys.iter().enumerate() {
            for (pos, chord) in entry.chords.iter().enumerate() {
                index.entry(*chord).or_default().push((k, pos));
            }
        }
        Self { keys, index }
    }

    /// Build from textual rows: `(key name, [chord, ...])`.
    pub fn from_rows<S: AsRef<str>>(rows: &[(String, Vec<S>)]) -> Result<Self, KeyError> {
        let entries = rows
            .iter()
            .map(|(name, chords)| {
                let tonic = Chord::parse(name).map_err(|source| KeyError::InvalidName {
                    name: name.clone(),
                    source,
                })?;
                let chords = chords
                    .iter()
                    .map(|c| {
                        Chord::parse(c.as_ref()).map_err(|source| KeyError::InvalidChord {
                            key: name.clone(),
                            source,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(KeyEntry {
                    name: name.clone(),
                    root: tonic.root,
                    mode: tonic.quality,
                    chords,
                })
            })
            .collect::<Result<Vec<_>, KeyError>>()?;
        Self::new(entries)
    }

    /// The 12 major keys, chromatic from C, each with its seven diatonic triads.
    pub fn standard() -> Self {
        let keys = (0..12u8)
            .map(|tonic| {
                let root = PitchClass::new(tonic);
                KeyEntry {
                    name: PITCH_NAMES[tonic as usize].to_string(),
                    root,
                    mode: Quality::Major,
                    chords: MAJOR_SCALE
                        .iter()
                        .map(|&(step, quality)| Chord::new(root.shift(step as i32), quality))
                        .collect(),
                }
            })
            .collect();

        Self::indexed(keys)
    }

    pub fn keys(&self) -> &[KeyEntry] {
        &self.keys
    }

    pub fn get(&self, name: &str) -> Option<&KeyEntry> {
        self.keys.iter().find(|k| k.name == name)
    }

    /// Every (key index, scale position) at which `chord` is diatonic.
    pub fn positions(&self, chord: &Chord) -> &[(usize, usize)] {
        self.index.get(chord).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Pick the key whose diatonic chords cover the most of `chords`.
    ///
    /// Ties go to the earliest key in table order. With no votes at all the
    /// first key wins.
    pub fn classify(&self, chords: &[Chord]) -> KeyDetection {
        let mut counts: Vec<Vec<u32>> = self
            .keys
            .iter()
            .map(|k| vec![0; k.chords.len()])
            .collect();

        for chord in chords {
            for &(k, pos) in self.positions(chord) {
                counts[k][pos] += 1;
            }
        }

        let scores: Vec<u32> = counts.iter().map(|row| row.iter().sum()).collect();

        let mut best = 0;
        for (k, &score) in scores.iter().enumerate() {
            if score > scores[best] {
                best = k;
            }
        }
        let ambiguous = scores.iter().filter(|&&s| s == scores[best]).count() > 1;
        if ambiguous {
            log::debug!(
                "Key tie at {} votes; taking {} by table order",
                scores[best],
                self.keys[best].name
            );
        }

        KeyDetection {
            key: self.keys[best].name.clone(),
            key_index: best,
            scores,
            cleaned: chords.to_vec(),
            ambiguous,
        }
    }

    /// Normalize a comma-separated sequence, then classify it.
    /// A sequence with no chords has no key and is an error.
    pub fn classify_str(&self, raw: &str) -> Result<KeyDetection, ChordError> {
        let chords = chord::parse_sequence(raw)?;
        if chords.is_empty() {
            return Err(ChordError::EmptySequence);
        }
        Ok(self.classify(&chords))
    }
}

/// Whether `supplied` names the relative minor of the major key `computed`
/// (e.g. computed `C`, supplied `Am`). Unparseable labels are never a match.
pub fn is_relative_minor(computed: &str, supplied: &str) -> bool {
    let (Ok(major), Ok(minor)) = (Chord::parse(computed), Chord::parse(supplied)) else {
        return false;
    };
    if major.quality != Quality::Major || minor.quality != Quality::Minor {
        return false;
    }
    major.root.offset_from(minor.root) == 3
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(raw: &str) -> Vec<Chord> {
        chord::parse_sequence(raw).unwrap()
    }

    #[test]
    fn test_standard_table_shape() {
        let table = KeyTable::standard();
        assert_eq!(table.keys().len(), 12);
        let c = table.get("C").unwrap();
        assert_eq!(chord::format_sequence(&c.chords), "C,Dm,Em,F,G,Am,Bdim");
        let fs = table.get("F#").unwrap();
        assert_eq!(chord::format_sequence(&fs.chords), "F#,G#m,A#m,B,C#,D#m,Fdim");
    }

    #[test]
    fn test_positions_lookup() {
        let table = KeyTable::standard();
        // G major is I of G, IV of D, V of C
        let g = Chord::parse("G").unwrap();
        let positions = table.positions(&g);
        assert_eq!(positions.len(), 3);
        let c_idx = table.keys().iter().position(|k| k.name == "C").unwrap();
        assert!(positions.contains(&(c_idx, 4)));

        let missing = KeyTable::from_rows(&[("C".to_string(), vec!["C", "G"])]).unwrap();
        assert!(missing.positions(&Chord::parse("Am").unwrap()).is_empty());
    }

    #[test]
    fn test_classify_c_major() {
        let table = KeyTable::standard();
        let detection = table.classify(&seq("C,F,G,Am"));
        assert_eq!(detection.key, "C");
        assert_eq!(detection.best_score(), 4);
        assert!(!detection.ambiguous);
    }

    #[test]
    fn test_classify_d_major() {
        let table = KeyTable::standard();
        let detection = table.classify_str("D,G,A,Bm,D").unwrap();
        assert_eq!(detection.key, "D");
        assert_eq!(chord::format_sequence(&detection.cleaned), "D,G,A,Bm,D");
    }

    #[test]
    fn test_classify_tie_takes_table_order() {
        let table = KeyTable::standard();
        // C and G are diatonic to C, G and F; each scores 2
        let detection = table.classify(&seq("C,G"));
        assert_eq!(detection.key, "C");
        assert!(detection.ambiguous);
    }

    #[test]
    fn test_classify_no_votes_falls_back_to_first_key() {
        let table = KeyTable::from_rows(&[
            ("G".to_string(), vec!["G", "Am", "Bm", "C", "D", "Em", "F#dim"]),
            ("C".to_string(), vec!["C", "Dm", "Em", "F", "G", "Am", "Bdim"]),
        ])
        .unwrap();
        let detection = table.classify(&seq("C#dim,D#dim"));
        assert_eq!(detection.key, "G");
        assert_eq!(detection.best_score(), 0);
        assert!(detection.ambiguous);
    }

    #[test]
    fn test_classify_str_rejects_malformed() {
        let table = KeyTable::standard();
        assert!(table.classify_str("C,Xm,G").is_err());
    }

    #[test]
    fn test_classify_str_rejects_empty() {
        let table = KeyTable::standard();
        assert!(matches!(table.classify_str(""), Err(ChordError::EmptySequence)));
        assert!(matches!(table.classify_str(" , ,"), Err(ChordError::EmptySequence)));
    }

    #[test]
    fn test_from_rows_errors() {
        assert!(matches!(KeyTable::from_rows::<&str>(&[]), Err(KeyError::Empty)));
        assert!(matches!(
            KeyTable::from_rows(&[("Q".to_string(), vec!["C"])]),
            Err(KeyError::InvalidName { .. })
        ));
        assert!(matches!(
            KeyTable::from_rows(&[("C".to_string(), vec!["C", "Zz"])]),
            Err(KeyError::InvalidChord { .. })
        ));
        assert!(matches!(
            KeyTable::from_rows(&[("C".to_string(), vec!["C"]), ("C".to_string(), vec!["F"])]),
            Err(KeyError::Duplicate(_))
        ));
    }

    #[test]
    fn test_relative_minor() {
        assert!(is_relative_minor("C", "Am"));
        assert!(is_relative_minor("G", "Em"));
        assert!(is_relative_minor("Eb", "Cm"));
        assert!(is_relative_minor("D#", "Cm"));
        assert!(is_relative_minor("A", "F#m"));
        assert!(is_relative_minor("C#", "Bbm"));

        assert!(!is_relative_minor("C", "A"));
        assert!(!is_relative_minor("C", "Em"));
        assert!(!is_relative_minor("Am", "F#m"));
        assert!(!is_relative_minor("C", "not a key"));
    }
}
