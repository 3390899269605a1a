use std::collections::BTreeSet;

use fnv::FnvHashMap;
use log::info;

use crate::{
    cell_table::{self, CellTable},
    chain::{parse_sequence, Arm, ChainSlot, Priority, SequenceKind},
    dist_matrix::EncodedMatrix,
    metrics::Metric,
    sequence_dist::{self, unique_dist_mat, SequenceDistParams, DEFAULT_CHUNKSIZE},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no distances stored under key {0:?}, run ir_dist first")]
    MissingKey(String),

    #[error("distances stored under key {key:?} have no entry for the {arm} arm")]
    MissingLocus { key: String, arm: Arm },

    #[error("cell table error: {0}")]
    CellTable(#[from] cell_table::Error),

    #[error(transparent)]
    SequenceDist(#[from] sequence_dist::Error),
}

/// Unique sequences of one arm together with their encoded distance matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct LocusDistances {
    pub seqs: Vec<String>,

    /// Unique sequences of the second dataset, `None` when there is only one.
    pub seqs2: Option<Vec<String>>,

    /// Rows follow `seqs`, columns follow `seqs2` (or `seqs`).
    pub distances: EncodedMatrix,
}

impl LocusDistances {
    #[inline]
    pub fn seqs2(&self) -> &[String] {
        self.seqs2.as_deref().unwrap_or(&self.seqs)
    }
}

/// Distance matrices keyed by a user-chosen name and then by arm.
///
/// Populated by [`ir_dist`] and read by [`crate::ClonotypeNeighbors`].
#[derive(Debug, Clone, Default)]
pub struct DistanceCache {
    entries: FnvHashMap<String, FnvHashMap<Arm, LocusDistances>>,
}

impl DistanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, arm: Arm, distances: LocusDistances) {
        self.entries
            .entry(key.into())
            .or_default()
            .insert(arm, distances);
    }

    pub fn get(&self, key: &str, arm: Arm) -> Result<&LocusDistances, Error> {
        self.entries
            .get(key)
            .ok_or_else(|| Error::MissingKey(key.to_owned()))?
            .get(&arm)
            .ok_or_else(|| Error::MissingLocus {
                key: key.to_owned(),
                arm,
            })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

#[derive(Debug, Clone)]
pub struct IrDistParams {
    pub metric: Metric,
    pub sequence: SequenceKind,
    pub cutoff: Option<u32>,
    pub n_jobs: Option<usize>,
    pub chunksize: usize,

    /// Cache key, `ir_dist_{sequence}_{metric}` when `None`.
    pub key_added: Option<String>,
}

impl Default for IrDistParams {
    fn default() -> Self {
        Self {
            metric: Metric::default(),
            sequence: SequenceKind::default(),
            cutoff: None,
            n_jobs: None,
            chunksize: DEFAULT_CHUNKSIZE,
            key_added: None,
        }
    }
}

impl IrDistParams {
    pub fn key(&self) -> String {
        self.key_added
            .clone()
            .unwrap_or_else(|| default_key(&self.metric, self.sequence))
    }
}

pub fn default_key(metric: &Metric, sequence: SequenceKind) -> String {
    format!("ir_dist_{}_{}", sequence, metric.name())
}

/// Sorted unique sequences found in either chain of `arm`.
fn unique_arm_sequences(
    dataset: &dyn CellTable,
    arm: Arm,
    sequence: SequenceKind,
) -> Result<Vec<String>, Error> {
    let names = Priority::ALL.map(|priority| ChainSlot::new(arm, priority).column_name(sequence));
    let names = names.each_ref().map(String::as_str);

    let unique: BTreeSet<&str> = dataset
        .get_columns(&names, None)?
        .into_iter()
        .flatten()
        .filter_map(parse_sequence)
        .collect();

    Ok(unique.into_iter().map(str::to_owned).collect())
}

/// Computes the per-arm sequence distances of `dataset` (against `dataset2`, if any) and
/// stores them in `cache`. Returns the key the result was stored under.
pub fn ir_dist(
    dataset: &dyn CellTable,
    dataset2: Option<&dyn CellTable>,
    params: &IrDistParams,
    cache: &mut DistanceCache,
) -> Result<String, Error> {
    let key = params.key();
    let calculator = params.metric.calculator(params.cutoff);
    let seq_params = SequenceDistParams {
        cutoff: params.cutoff,
        n_jobs: params.n_jobs,
        chunksize: params.chunksize,
    };

    let loci = Arm::ALL
        .into_iter()
        .map(|arm| {
            let seqs = unique_arm_sequences(dataset, arm, params.sequence)?;
            let seqs2 = dataset2
                .map(|dataset2| unique_arm_sequences(dataset2, arm, params.sequence))
                .transpose()?;

            info!(
                "computing {} distances for the {arm} arm ({} x {} unique sequences)",
                params.metric,
                seqs.len(),
                seqs2.as_ref().unwrap_or(&seqs).len(),
            );

            let seq_refs: Vec<&str> = seqs.iter().map(String::as_str).collect();
            let seq2_refs: Option<Vec<&str>> = seqs2
                .as_ref()
                .map(|seqs2| seqs2.iter().map(String::as_str).collect());
            let distances = unique_dist_mat(
                calculator.as_ref(),
                &seq_refs,
                seq2_refs.as_deref(),
                seq_params,
            )?;

            Ok((
                arm,
                LocusDistances {
                    seqs,
                    seqs2,
                    distances,
                },
            ))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    // Nothing is stored unless every arm succeeded.
    for (arm, locus) in loci {
        cache.insert(key.clone(), arm, locus);
    }

    Ok(key)
}
