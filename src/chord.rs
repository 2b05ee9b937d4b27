//! Chord token parsing and enharmonic normalization.
//!
//! Grammar: `ROOT [ACCIDENTAL] [QUALITY] [EXTENSION...] [/BASS]`, where ROOT is
//! `A`-`G`, ACCIDENTAL is `#` or `b`, QUALITY is `m`/`min` (minor) or
//! `dim`/`°` (diminished), and extensions (`7`, `maj7`, `sus4`, `add9`, `b5`,
//! `aug`, ...) are accepted but dropped. The bass note is validated and dropped.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChordError {
    #[error("Empty chord token")]
    Empty,
    #[error("Invalid root in chord {token:?}: expected a letter A-G")]
    InvalidRoot { token: String },
    #[error("Unexpected suffix {suffix:?} in chord {token:?}")]
    InvalidSuffix { token: String, suffix: String },
    #[error("Invalid bass note in chord {token:?}")]
    InvalidBass { token: String },
    #[error("Chord sequence has no chords")]
    EmptySequence,
}

/// Natural note letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Letter {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl Letter {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'A' => Some(Self::A),
            'B' => Some(Self::B),
            'C' => Some(Self::C),
            'D' => Some(Self::D),
            'E' => Some(Self::E),
            'F' => Some(Self::F),
            'G' => Some(Self::G),
            _ => None,
        }
    }

    /// Semitones above C.
    fn semitone(self) -> u8 {
        match self {
            Self::C => 0,
            Self::D => 2,
            Self::E => 4,
            Self::F => 5,
            Self::G => 7,
            Self::A => 9,
            Self::B => 11,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accidental {
    Natural,
    Sharp,
    Flat,
}

/// Chord quality kept for analysis. Everything else is an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Quality {
    Major,
    Minor,
    Diminished,
}

impl Quality {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Major => "",
            Self::Minor => "m",
            Self::Diminished => "dim",
        }
    }
}

/// Sharp-only pitch class names, indexed by semitones above C.
pub const PITCH_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// One of the 12 equal-tempered pitch classes (0 = C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PitchClass(u8);

impl PitchClass {
    pub fn new(semitones: u8) -> Self {
        Self(semitones % 12)
    }

    pub fn index(self) -> u8 {
        self.0
    }

    pub fn name(self) -> &'static str {
        PITCH_NAMES[self.0 as usize]
    }

    /// Move by a signed number of semitones, wrapping around the octave.
    pub fn shift(self, semitones: i32) -> Self {
        Self((self.0 as i32 + semitones).rem_euclid(12) as u8)
    }

    /// Signed distance from `other` up to `self`, in `0..12`.
    pub fn offset_from(self, other: PitchClass) -> i32 {
        (self.0 as i32 - other.0 as i32).rem_euclid(12)
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A chord exactly as written: letter, accidental and retained quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChordSpelling {
    pub letter: Letter,
    pub accidental: Accidental,
    pub quality: Quality,
}

impl ChordSpelling {
    pub fn parse(raw: &str) -> Result<Self, ChordError> {
        let token = raw.trim();
        let mut chars = token.chars();
        let first = chars.next().ok_or(ChordError::Empty)?;
        let letter = Letter::from_char(first).ok_or_else(|| ChordError::InvalidRoot {
            token: token.to_string(),
        })?;
        let rest = chars.as_str();

        let (accidental, rest) = split_accidental(rest);

        let (body, bass) = match rest.split_once('/') {
            Some((body, bass)) => (body, Some(bass)),
            None => (rest, None),
        };
        if let Some(bass) = bass {
            if !is_valid_bass(bass) {
                return Err(ChordError::InvalidBass {
                    token: token.to_string(),
                });
            }
        }

        let (quality, extension) = split_quality(body);
        if let Some(bad) = invalid_extension(extension) {
            return Err(ChordError::InvalidSuffix {
                token: token.to_string(),
                suffix: bad.to_string(),
            });
        }

        Ok(Self {
            letter,
            accidental,
            quality,
        })
    }

    /// Canonical pitch class. `B#`→C, `E#`→F, `Cb`→B, `Fb`→E, `Db`→C#.
    pub fn pitch_class(&self) -> PitchClass {
        let base = PitchClass::new(self.letter.semitone());
        match self.accidental {
            Accidental::Natural => base,
            Accidental::Sharp => base.shift(1),
            Accidental::Flat => base.shift(-1),
        }
    }

    pub fn normalize(&self) -> Chord {
        Chord {
            root: self.pitch_class(),
            quality: self.quality,
        }
    }
}

fn split_accidental(s: &str) -> (Accidental, &str) {
    if let Some(rest) = s.strip_prefix('#').or_else(|| s.strip_prefix('♯')) {
        (Accidental::Sharp, rest)
    } else if let Some(rest) = s.strip_prefix('b').or_else(|| s.strip_prefix('♭')) {
        (Accidental::Flat, rest)
    } else {
        (Accidental::Natural, s)
    }
}

fn split_quality(body: &str) -> (Quality, &str) {
    if let Some(rest) = body.strip_prefix("dim").or_else(|| body.strip_prefix('°')) {
        (Quality::Diminished, rest)
    } else if body.starts_with("maj") {
        // maj7 etc. is a major-chord extension, not a minor quality
        (Quality::Major, body)
    } else if let Some(rest) = body.strip_prefix("min").or_else(|| body.strip_prefix('m')) {
        (Quality::Minor, rest)
    } else {
        (Quality::Major, body)
    }
}

const EXTENSION_WORDS: [&str; 5] = ["maj", "add", "sus", "aug", "dim"];

/// Returns the first unrecognised tail of the extension, if any.
fn invalid_extension(mut ext: &str) -> Option<&str> {
    while !ext.is_empty() {
        if let Some(word) = EXTENSION_WORDS.iter().find(|w| ext.starts_with(**w)) {
            ext = &ext[word.len()..];
            continue;
        }

        let mut chars = ext.chars();
        let c = chars.next()?;
        match c {
            '0'..='9' | '(' | ')' | 'M' | '+' => ext = chars.as_str(),
            '#' | 'b' | '♯' | '♭' => {
                // Alterations must carry a degree: b5, #9
                let rest = chars.as_str();
                if rest.starts_with(|d: char| d.is_ascii_digit()) {
                    ext = rest;
                } else {
                    return Some(ext);
                }
            }
            _ => return Some(ext),
        }
    }
    None
}

fn is_valid_bass(bass: &str) -> bool {
    // 6/9 chords put a degree after the slash instead of a note
    if !bass.is_empty() && bass.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    let mut chars = bass.chars();
    match chars.next().and_then(Letter::from_char) {
        Some(_) => {
            let (_, rest) = split_accidental(chars.as_str());
            rest.is_empty()
        }
        None => false,
    }
}

/// A normalized chord: sharp-spelled root plus major/minor/diminished quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Chord {
    pub root: PitchClass,
    pub quality: Quality,
}

impl Chord {
    pub fn new(root: PitchClass, quality: Quality) -> Self {
        Self { root, quality }
    }

    pub fn parse(raw: &str) -> Result<Self, ChordError> {
        ChordSpelling::parse(raw).map(|s| s.normalize())
    }

    /// Shift the root by `semitones`. Quality is untouched.
    pub fn transpose(self, semitones: i32) -> Self {
        Self {
            root: self.root.shift(semitones),
            quality: self.quality,
        }
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.root, self.quality.suffix())
    }
}

impl FromStr for Chord {
    type Err = ChordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Chord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parse a comma-separated chord sequence. Empty fields are skipped;
/// the first malformed token aborts the whole sequence.
pub fn parse_sequence(raw: &str) -> Result<Vec<Chord>, ChordError> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(Chord::parse)
        .collect()
}

/// Render a sequence back to the comma-separated form.
pub fn format_sequence(chords: &[Chord]) -> String {
    chords
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
