//! Rotate a chord sequence from its detected key into a target key.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::chord::{Chord, PitchClass};
use crate::keys::{KeyDetection, KeyTable};

/// Reference key every catalog song is compared in.
pub const CANONICAL_KEY: &str = "C";

#[derive(Error, Debug)]
pub enum TransposeError {
    #[error("Unknown target key {0:?}")]
    UnknownTarget(String),
}

/// A sequence rewritten into the target key.
#[derive(Debug, Clone)]
pub struct Transposed {
    /// Key detected for the input before transposition.
    pub original_key: String,
    /// Semitones the roots were moved by (`0..12`, applied downward).
    pub shift: i32,
    pub chords: Vec<Chord>,
    /// The tie flag from key detection.
    pub ambiguous_key: bool,
}

impl Transposed {
    /// Distinct chords in the transposed sequence.
    pub fn states(&self) -> BTreeSet<Chord> {
        self.chords.iter().copied().collect()
    }
}

/// Resolve a key name to its tonic: table entry first, then chord syntax.
fn target_root(table: &KeyTable, target: &str) -> Result<PitchClass, TransposeError> {
    if let Some(entry) = table.get(target) {
        return Ok(entry.root);
    }
    Chord::parse(target)
        .map(|c| c.root)
        .map_err(|_| TransposeError::UnknownTarget(target.to_string()))
}

/// Classify `chords`, then shift every root so the detected key lands on `target`.
/// Chord quality is never changed.
pub fn transpose(
    table: &KeyTable,
    chords: &[Chord],
    target: &str,
) -> Result<Transposed, TransposeError> {
    let target = target.trim();
    let to = target_root(table, target)?;
    let detection = table.classify(chords);
    Ok(rotate(table, detection, target, to))
}

fn rotate(table: &KeyTable, detection: KeyDetection, target: &str, to: PitchClass) -> Transposed {
    let KeyDetection {
        key,
        key_index,
        cleaned,
        ambiguous,
        ..
    } = detection;

    if key == target {
        return Transposed {
            original_key: key,
            shift: 0,
            chords: cleaned,
            ambiguous_key: ambiguous,
        };
    }

    let from = table.keys()[key_index].root;
    let shift = from.offset_from(to);
    let chords = cleaned.into_iter().map(|c| c.transpose(-shift)).collect();

    Transposed {
        original_key: key,
        shift,
        chords,
        ambiguous_key: ambiguous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::{format_sequence, parse_sequence};

    fn run(raw: &str) -> Transposed {
        let table = KeyTable::standard();
        transpose(&table, &parse_sequence(raw).unwrap(), CANONICAL_KEY).unwrap()
    }

    #[test]
    fn test_canonical_key_is_identity() {
        let t = run("C,Am,F,G,Em");
        assert_eq!(t.original_key, "C");
        assert_eq!(t.shift, 0);
        assert_eq!(format_sequence(&t.chords), "C,Am,F,G,Em");
    }

    #[test]
    fn test_d_major_to_c() {
        let t = run("D,G,A");
        assert_eq!(t.original_key, "D");
        assert_eq!(t.shift, 2);
        assert_eq!(format_sequence(&t.chords), "C,F,G");
    }

    #[test]
    fn test_quality_preserved() {
        let t = run("A,Bm,E,F#m,C#m,G#dim");
        assert_eq!(t.original_key, "A");
        assert_eq!(format_sequence(&t.chords), "C,Dm,G,Am,Em,Bdim");
    }

    #[test]
    fn test_wraps_below_c() {
        // B major: roots below the target wrap around the octave
        let t = run("B,E,F#,G#m");
        assert_eq!(t.original_key, "B");
        assert_eq!(t.shift, 11);
        assert_eq!(format_sequence(&t.chords), "C,F,G,Am");
    }

    #[test]
    fn test_flat_spellings_transpose_like_sharps() {
        let flats = run("Bb,Eb,F,Gm");
        let sharps = run("A#,D#,F,Gm");
        assert_eq!(flats.chords, sharps.chords);
        assert_eq!(format_sequence(&flats.chords), "C,F,G,Am");
    }

    #[test]
    fn test_states_are_distinct_chords() {
        let t = run("G,D,G,C,D,Em");
        let states: Vec<String> = t.states().iter().map(|c| c.to_string()).collect();
        assert_eq!(states, vec!["C", "F", "G", "Am"]);
    }

    #[test]
    fn test_other_target_key() {
        let table = KeyTable::standard();
        let chords = parse_sequence("C,F,G").unwrap();
        let t = transpose(&table, &chords, "E").unwrap();
        assert_eq!(format_sequence(&t.chords), "E,A,B");
    }

    #[test]
    fn test_unknown_target() {
        let table = KeyTable::standard();
        let chords = parse_sequence("C,F,G").unwrap();
        assert!(matches!(
            transpose(&table, &chords, "nope"),
            Err(TransposeError::UnknownTarget(_))
        ));
    }
}
