//! First-order chord transition model.
//!
//! A [`Vocabulary`] fixes the state order; every [`TransitionMatrix`] built
//! against the same vocabulary is directly comparable.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::chord::Chord;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatrixError {
    /// The sequence uses a chord the vocabulary was not built from.
    #[error("Chord {0} is not in the state vocabulary")]
    UnknownState(Chord),
    #[error("Matrix size mismatch: {left} vs {right} states")]
    SizeMismatch { left: usize, right: usize },
}

/// Finalized, ordered set of chord states.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vocabulary {
    states: Vec<Chord>,
    index: HashMap<Chord, usize>,
}

impl Vocabulary {
    pub fn new(states: BTreeSet<Chord>) -> Self {
        let states: Vec<Chord> = states.into_iter().collect();
        let index = states.iter().enumerate().map(|(i, c)| (*c, i)).collect();
        Self { states, index }
    }

    /// Union of all chords across `sequences`.
    pub fn from_sequences<'a, I>(sequences: I) -> Self
    where
        I: IntoIterator<Item = &'a [Chord]>,
    {
        let mut set = BTreeSet::new();
        for seq in sequences {
            set.extend(seq.iter().copied());
        }
        Self::new(set)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn states(&self) -> &[Chord] {
        &self.states
    }

    pub fn index_of(&self, chord: &Chord) -> Option<usize> {
        self.index.get(chord).copied()
    }
}

/// Row-stochastic `n × n` transition matrix, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionMatrix {
    size: usize,
    data: Vec<f64>,
}

impl TransitionMatrix {
    /// Count adjacent-pair transitions of `sequence` and normalize each row.
    /// Rows of states that never transition out stay all-zero.
    pub fn build(vocab: &Vocabulary, sequence: &[Chord]) -> Result<Self, MatrixError> {
        let n = vocab.len();
        let mut data = vec![0.0_f64; n * n];

        let indices = sequence
            .iter()
            .map(|c| vocab.index_of(c).ok_or(MatrixError::UnknownState(*c)))
            .collect::<Result<Vec<_>, _>>()?;
        if vocab.is_empty() {
            return Ok(Self { size: 0, data });
        }

        for pair in indices.windows(2) {
            data[pair[0] * n + pair[1]] += 1.0;
        }

        for row in data.chunks_mut(n) {
            let sum: f64 = row.iter().sum();
            if sum > 0.0 {
                for v in row.iter_mut() {
                    *v /= sum;
                }
            }
        }

        Ok(Self { size: n, data })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, from: usize, to: usize) -> f64 {
        self.data[from * self.size + to]
    }

    pub fn row(&self, from: usize) -> &[f64] {
        &self.data[from * self.size..(from + 1) * self.size]
    }

    /// `sqrt(Σ (A - B)²) / n`.
    ///
    /// Normalized by the number of states, not the number of entries; all
    /// stored rankings depend on this scaling.
    pub fn distance(&self, other: &TransitionMatrix) -> Result<f64, MatrixError> {
        if self.size != other.size {
            return Err(MatrixError::SizeMismatch {
                left: self.size,
                right: other.size,
            });
        }
        if self.size == 0 {
            return Ok(0.0);
        }

        let sum_sq: f64 = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        Ok(sum_sq.sqrt() / self.size as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::parse_sequence;

    fn seq(raw: &str) -> Vec<Chord> {
        parse_sequence(raw).unwrap()
    }

    fn vocab(raw: &str) -> Vocabulary {
        let chords = seq(raw);
        Vocabulary::from_sequences([chords.as_slice()])
    }

    #[test]
    fn test_vocabulary_order_and_union() {
        let a = seq("G,C,Am");
        let b = seq("F,C,Dm,G");
        let v = Vocabulary::from_sequences([a.as_slice(), b.as_slice()]);
        let names: Vec<String> = v.states().iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["C", "Dm", "F", "G", "Am"]);
        assert_eq!(v.index_of(&Chord::parse("G").unwrap()), Some(3));
        assert_eq!(v.index_of(&Chord::parse("E").unwrap()), None);
    }

    #[test]
    fn test_alternating_progression() {
        let v = vocab("C,G");
        let m = TransitionMatrix::build(&v, &seq("C,G,C,G")).unwrap();
        assert_eq!(m.size(), 2);
        assert_eq!(m.row(0), &[0.0, 1.0]);
        assert_eq!(m.row(1), &[1.0, 0.0]);
    }

    #[test]
    fn test_rows_are_stochastic_or_zero() {
        let v = vocab("C,F,G,Am,Dm");
        let m = TransitionMatrix::build(&v, &seq("C,F,G,C,Am,F,G,C,F")).unwrap();
        for i in 0..m.size() {
            let sum: f64 = m.row(i).iter().sum();
            assert!(sum.is_finite());
            assert!((sum - 1.0).abs() < 1e-12 || sum == 0.0, "row {i} sums to {sum}");
        }
        // Dm never appears as a source
        let dm = v.index_of(&Chord::parse("Dm").unwrap()).unwrap();
        assert!(m.row(dm).iter().all(|&x| x == 0.0));
        // C -> F twice, C -> Am once
        let c = v.index_of(&Chord::parse("C").unwrap()).unwrap();
        let f = v.index_of(&Chord::parse("F").unwrap()).unwrap();
        assert!((m.get(c, f) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_short_sequence_is_all_zero() {
        let v = vocab("C,G");
        let m = TransitionMatrix::build(&v, &seq("C")).unwrap();
        assert!((0..2).all(|i| m.row(i).iter().all(|&x| x == 0.0)));
        let empty = TransitionMatrix::build(&v, &[]).unwrap();
        assert_eq!(empty, m);
    }

    #[test]
    fn test_unknown_state_is_an_error() {
        let v = vocab("C,G");
        let err = TransitionMatrix::build(&v, &seq("C,G,D")).unwrap_err();
        assert_eq!(err, MatrixError::UnknownState(Chord::parse("D").unwrap()));
    }

    #[test]
    fn test_self_distance_is_zero() {
        let v = vocab("C,F,G,Am");
        let m = TransitionMatrix::build(&v, &seq("C,Am,F,G,C")).unwrap();
        assert_eq!(m.distance(&m).unwrap(), 0.0);
    }

    #[test]
    fn test_distance_scaled_by_state_count() {
        let v = vocab("C,G");
        let a = TransitionMatrix::build(&v, &seq("C,G,C,G")).unwrap();
        let b = TransitionMatrix::build(&v, &seq("C,C,G,G")).unwrap();
        // a = [[0,1],[1,0]], b = [[.5,.5],[0,1]]
        // diffs: .25 + .25 + 1 + 1 = 2.5
        let expected = 2.5_f64.sqrt() / 2.0;
        assert!((a.distance(&b).unwrap() - expected).abs() < 1e-12);
        assert_eq!(a.distance(&b).unwrap(), b.distance(&a).unwrap());
    }

    #[test]
    fn test_distance_size_mismatch() {
        let small = TransitionMatrix::build(&vocab("C,G"), &seq("C,G")).unwrap();
        let large = TransitionMatrix::build(&vocab("C,F,G"), &seq("C,G")).unwrap();
        assert!(matches!(
            small.distance(&large),
            Err(MatrixError::SizeMismatch { left: 2, right: 3 })
        ));
    }

    #[test]
    fn test_empty_vocabulary() {
        let v = Vocabulary::default();
        let m = TransitionMatrix::build(&v, &[]).unwrap();
        assert_eq!(m.size(), 0);
        assert_eq!(m.distance(&m).unwrap(), 0.0);
    }
}
