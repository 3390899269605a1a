use std::{fmt, str::FromStr, sync::Arc};

use bio::{
    alignment::{
        distance::{hamming, simd::bounded_levenshtein},
        pairwise::{Aligner, MatchFunc},
    },
    scores::blosum62,
};
use fnv::FnvHashMap;

use crate::dist_matrix::{self, encode, EncodedMatrix};

/// Computes an offset-encoded, cutoff-bounded distance matrix between two collections of
/// sequences.
///
/// With `seqs2 == None` the result is the symmetric self-distance matrix of `seqs`.
/// Implementations must satisfy `calc_dist_mat(a, Some(b)) == calc_dist_mat(b, Some(a))ᵀ`.
pub trait DistanceCalculator: Send + Sync {
    fn calc_dist_mat(&self, seqs: &[&str], seqs2: Option<&[&str]>)
        -> Result<EncodedMatrix, Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown distance metric {0:?}")]
    UnknownMetric(String),

    #[error("invalid residue {residue:?} in sequence {sequence:?} for alignment metric")]
    InvalidResidue { sequence: String, residue: char },

    #[error(
        "distance calculator returned a {}x{} matrix, expected {}x{}",
        .found.0,
        .found.1,
        .expected.0,
        .expected.1
    )]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("custom distance calculator failed: {0}")]
    Custom(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// Fills the matrix from a per-pair distance function returning `None` for unconnected pairs.
fn pairwise_dist_mat<F>(seqs: &[&str], seqs2: Option<&[&str]>, mut dist: F) -> EncodedMatrix
where
    F: FnMut(usize, usize) -> Option<u32>,
{
    let mut triplets = Vec::new();
    match seqs2 {
        Some(seqs2) => {
            for row in 0..seqs.len() {
                for col in 0..seqs2.len() {
                    if let Some(d) = dist(row, col) {
                        triplets.push((row, col, encode(d)));
                    }
                }
            }
            dist_matrix::from_triplets((seqs.len(), seqs2.len()), triplets)
        }

        None => {
            for row in 0..seqs.len() {
                for col in row..seqs.len() {
                    if let Some(d) = dist(row, col) {
                        triplets.push((row, col, encode(d)));
                        if col != row {
                            triplets.push((col, row, encode(d)));
                        }
                    }
                }
            }
            dist_matrix::from_triplets((seqs.len(), seqs.len()), triplets)
        }
    }
}

/// Exact matches only, at distance 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityDistanceCalculator;

impl DistanceCalculator for IdentityDistanceCalculator {
    fn calc_dist_mat(
        &self,
        seqs: &[&str],
        seqs2: Option<&[&str]>,
    ) -> Result<EncodedMatrix, Error> {
        let targets = seqs2.unwrap_or(seqs);
        let mut positions: FnvHashMap<&str, Vec<usize>> = FnvHashMap::default();
        for (index, &seq) in targets.iter().enumerate() {
            positions.entry(seq).or_default().push(index);
        }

        let triplets = seqs.iter().enumerate().flat_map(|(row, seq)| {
            positions
                .get(seq)
                .into_iter()
                .flatten()
                .map(move |&col| (row, col, encode(0)))
        });

        Ok(dist_matrix::from_triplets(
            (seqs.len(), targets.len()),
            triplets,
        ))
    }
}

/// Unit-cost edit distance.
#[derive(Debug, Clone, Copy)]
pub struct LevenshteinDistanceCalculator {
    pub cutoff: u32,
}

impl DistanceCalculator for LevenshteinDistanceCalculator {
    fn calc_dist_mat(
        &self,
        seqs: &[&str],
        seqs2: Option<&[&str]>,
    ) -> Result<EncodedMatrix, Error> {
        let targets = seqs2.unwrap_or(seqs);
        Ok(pairwise_dist_mat(seqs, seqs2, |row, col| {
            bounded_levenshtein(seqs[row].as_bytes(), targets[col].as_bytes(), self.cutoff)
        }))
    }
}

/// Number of mismatching positions. Sequences of different length are never connected.
#[derive(Debug, Clone, Copy)]
pub struct HammingDistanceCalculator {
    pub cutoff: u32,
}

impl DistanceCalculator for HammingDistanceCalculator {
    fn calc_dist_mat(
        &self,
        seqs: &[&str],
        seqs2: Option<&[&str]>,
    ) -> Result<EncodedMatrix, Error> {
        let targets = seqs2.unwrap_or(seqs);
        Ok(pairwise_dist_mat(seqs, seqs2, |row, col| {
            let (a, b) = (seqs[row].as_bytes(), targets[col].as_bytes());
            if a.len() != b.len() {
                return None;
            }

            u32::try_from(hamming(a, b))
                .ok()
                .filter(|&d| d <= self.cutoff)
        }))
    }
}

const ALIGNMENT_GAP_OPEN: i32 = 0;
const ALIGNMENT_GAP_EXTEND: i32 = -11;

/// Global BLOSUM62 alignment, turned into a distance through the self-alignment scores:
/// `min(score(a, a), score(b, b)) - score(a, b)`.
///
/// Each gap position costs 11.
#[derive(Debug, Clone, Copy)]
pub struct AlignmentDistanceCalculator {
    pub cutoff: u32,
}

impl AlignmentDistanceCalculator {
    fn check_residues(seqs: &[&str]) -> Result<(), Error> {
        seqs.iter().try_for_each(|seq| {
            match seq.bytes().find(|&c| !(c.is_ascii_uppercase() || c == b'*')) {
                Some(residue) => Err(Error::InvalidResidue {
                    sequence: (*seq).to_owned(),
                    residue: residue.into(),
                }),
                None => Ok(()),
            }
        })
    }
}

fn self_alignment_scores<F: MatchFunc>(aligner: &mut Aligner<F>, seqs: &[&str]) -> Vec<i32> {
    seqs.iter()
        .map(|seq| aligner.global(seq.as_bytes(), seq.as_bytes()).score)
        .collect()
}

impl DistanceCalculator for AlignmentDistanceCalculator {
    fn calc_dist_mat(
        &self,
        seqs: &[&str],
        seqs2: Option<&[&str]>,
    ) -> Result<EncodedMatrix, Error> {
        Self::check_residues(seqs)?;
        if let Some(seqs2) = seqs2 {
            Self::check_residues(seqs2)?;
        }

        let targets = seqs2.unwrap_or(seqs);
        let mut aligner = Aligner::new(ALIGNMENT_GAP_OPEN, ALIGNMENT_GAP_EXTEND, blosum62);
        let scores = self_alignment_scores(&mut aligner, seqs);
        let scores2 = match seqs2 {
            Some(seqs2) => self_alignment_scores(&mut aligner, seqs2),
            None => scores.clone(),
        };

        let cutoff = i64::from(self.cutoff);
        Ok(pairwise_dist_mat(seqs, seqs2, |row, col| {
            let score = aligner
                .global(seqs[row].as_bytes(), targets[col].as_bytes())
                .score;
            let max_score = scores[row].min(scores2[col]);
            let dist = (i64::from(max_score) - i64::from(score)).max(0);
            (dist <= cutoff).then(|| dist as u32)
        }))
    }
}

/// The distance metric used by [`crate::sequence_dist`].
#[derive(Clone)]
pub enum Metric {
    Identity,
    Levenshtein,
    Hamming,
    Alignment,
    Custom(Arc<dyn DistanceCalculator>),
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Levenshtein => "levenshtein",
            Self::Hamming => "hamming",
            Self::Alignment => "alignment",
            Self::Custom(_) => "custom",
        }
    }

    /// Cutoff used when none is given explicitly.
    pub fn default_cutoff(&self) -> u32 {
        match self {
            Self::Identity | Self::Custom(_) => 0,
            Self::Levenshtein | Self::Hamming => 2,
            Self::Alignment => 10,
        }
    }

    /// Cutoff actually applied for a requested one. Identity always uses 0 and custom
    /// calculators carry their own.
    pub fn effective_cutoff(&self, cutoff: Option<u32>) -> u32 {
        match self {
            Self::Identity | Self::Custom(_) => 0,
            _ => cutoff.unwrap_or_else(|| self.default_cutoff()),
        }
    }

    pub fn calculator(&self, cutoff: Option<u32>) -> Arc<dyn DistanceCalculator> {
        let cutoff = self.effective_cutoff(cutoff);
        match self {
            Self::Identity => Arc::new(IdentityDistanceCalculator),
            Self::Levenshtein => Arc::new(LevenshteinDistanceCalculator { cutoff }),
            Self::Hamming => Arc::new(HammingDistanceCalculator { cutoff }),
            Self::Alignment => Arc::new(AlignmentDistanceCalculator { cutoff }),
            Self::Custom(calculator) => Arc::clone(calculator),
        }
    }
}

impl Default for Metric {
    fn default() -> Self {
        Self::Identity
    }
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(_) => f.write_str("Custom(..)"),
            _ => f.write_str(self.name()),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identity" => Ok(Self::Identity),
            "levenshtein" => Ok(Self::Levenshtein),
            "hamming" => Ok(Self::Hamming),
            "alignment" => Ok(Self::Alignment),
            _ => Err(Error::UnknownMetric(s.to_owned())),
        }
    }
}
