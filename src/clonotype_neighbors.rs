//! Clonotype-by-clonotype distances derived from the cached per-arm sequence distances.

use std::{borrow::Cow, ops::Range, sync::Arc};

use fnv::FnvHashMap;
use log::info;

use crate::{
    cell_table::CellTable,
    chain::{selected_slots, Arm, ChainSlot, DualIr, Priority, ReceptorArms, SequenceKind},
    chunks::map_chunks,
    clonotypes::{self, ClonotypeTable},
    dist_matrix::{self, EncodedMatrix},
    ir_dist::{self, default_key, DistanceCache, LocusDistances},
    metrics::Metric,
    sequence_dist::DEFAULT_CHUNKSIZE,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Clonotypes(#[from] clonotypes::Error),

    #[error(transparent)]
    Cache(#[from] ir_dist::Error),

    #[error(
        "sequence {sequence:?} of the {arm} arm has no cached distances, \
         the distance key does not match the input data"
    )]
    UnknownSequence { arm: Arm, sequence: String },

    #[error(
        "distances stored under key {key:?} for the {arm} arm {}",
        describe_mismatch(.cached_two_datasets)
    )]
    DatasetMismatch {
        key: String,
        arm: Arm,
        cached_two_datasets: bool,
    },

    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("unable to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

fn describe_mismatch(cached_two_datasets: &bool) -> &'static str {
    if *cached_two_datasets {
        "were computed against a second dataset, but none was given"
    } else {
        "were computed from a single dataset, but a second one was given"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborsParams {
    pub receptor_arms: ReceptorArms,
    pub dual_ir: DualIr,

    /// Key of the [`DistanceCache`] entry to read.
    pub distance_key: String,
    pub sequence_key: SequenceKind,
    pub n_jobs: Option<usize>,

    /// Number of clonotypes processed per block.
    pub chunksize: usize,
}

impl Default for NeighborsParams {
    fn default() -> Self {
        Self {
            receptor_arms: ReceptorArms::default(),
            dual_ir: DualIr::default(),
            distance_key: default_key(&Metric::default(), SequenceKind::default()),
            sequence_key: SequenceKind::default(),
            n_jobs: None,
            chunksize: DEFAULT_CHUNKSIZE,
        }
    }
}

/// How the partial results of a comparison are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reduction {
    /// Closest connected term wins. Terms that do not connect are ignored.
    Any,

    /// Farthest term wins. Every term present on at least one side has to connect.
    All,
}

/// Outcome of comparing one pair of chains, or one pair of arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Term {
    Absent,
    OneSided,
    Unconnected,
    Connected(u32),
}

impl Term {
    #[inline]
    fn new(present: bool, present2: bool, value: u32) -> Self {
        match (present, present2) {
            (false, false) => Self::Absent,
            (true, true) if value != 0 => Self::Connected(value),
            (true, true) => Self::Unconnected,
            _ => Self::OneSided,
        }
    }
}

impl Reduction {
    fn reduce<I: IntoIterator<Item = Term>>(self, terms: I) -> u32 {
        let mut result: Option<u32> = None;
        for term in terms {
            match (self, term) {
                (_, Term::Absent) | (Self::Any, Term::OneSided | Term::Unconnected) => {}
                (Self::All, Term::OneSided | Term::Unconnected) => return 0,
                (Self::Any, Term::Connected(value)) => {
                    result = Some(result.map_or(value, |current| current.min(value)));
                }
                (Self::All, Term::Connected(value)) => {
                    result = Some(result.map_or(value, |current| current.max(value)));
                }
            }
        }
        result.unwrap_or(0)
    }
}

const PRIMARY_PAIRINGS: &[(Priority, Priority)] = &[(Priority::Primary, Priority::Primary)];
const CROSS_PAIRINGS: &[(Priority, Priority)] = &[
    (Priority::Primary, Priority::Primary),
    (Priority::Primary, Priority::Secondary),
    (Priority::Secondary, Priority::Primary),
    (Priority::Secondary, Priority::Secondary),
];
const SAME_RANK_PAIRINGS: &[(Priority, Priority)] = &[
    (Priority::Primary, Priority::Primary),
    (Priority::Secondary, Priority::Secondary),
];

/// Chain pairings compared within one arm.
fn chain_pairings(dual_ir: DualIr) -> &'static [(Priority, Priority)] {
    match dual_ir {
        DualIr::PrimaryOnly => PRIMARY_PAIRINGS,
        DualIr::Any => CROSS_PAIRINGS,
        DualIr::All => SAME_RANK_PAIRINGS,
    }
}

fn chain_reduction(dual_ir: DualIr) -> Reduction {
    match dual_ir {
        DualIr::PrimaryOnly | DualIr::Any => Reduction::Any,
        DualIr::All => Reduction::All,
    }
}

fn arm_reduction(receptor_arms: ReceptorArms) -> Reduction {
    match receptor_arms {
        ReceptorArms::Vj | ReceptorArms::Vdj | ReceptorArms::Any => Reduction::Any,
        ReceptorArms::All => Reduction::All,
    }
}

/// Sequence distances of one arm, indexed by clonotype.
#[derive(Debug)]
struct ArmIndex<'c> {
    distances: Cow<'c, EncodedMatrix>,

    /// Row of `distances` for each clonotype, per chain priority.
    rows: [Vec<Option<usize>>; 2],

    /// Column of `distances` for each clonotype of the second table, per chain priority.
    cols: [Vec<Option<usize>>; 2],

    /// Clonotypes of the second table carrying the sequence of each column, per chain priority.
    clonotypes_by_col: [Vec<Vec<usize>>; 2],
}

fn sequence_lookup(seqs: &[String]) -> FnvHashMap<&str, usize> {
    seqs.iter()
        .enumerate()
        .map(|(index, seq)| (seq.as_str(), index))
        .collect()
}

fn sequence_positions(
    table: &ClonotypeTable,
    slot: ChainSlot,
    lookup: &FnvHashMap<&str, usize>,
) -> Result<Vec<Option<usize>>, Error> {
    let Some(index) = table.slot_index(slot) else {
        return Ok(vec![None; table.len()]);
    };

    table
        .rows()
        .iter()
        .map(|row| {
            row[index]
                .as_deref()
                .map(|seq| {
                    lookup
                        .get(seq)
                        .copied()
                        .ok_or_else(|| Error::UnknownSequence {
                            arm: slot.arm,
                            sequence: seq.to_owned(),
                        })
                })
                .transpose()
        })
        .collect()
}

impl<'c> ArmIndex<'c> {
    fn new(
        arm: Arm,
        entry: &'c LocusDistances,
        clonotypes: &ClonotypeTable,
        clonotypes2: &ClonotypeTable,
    ) -> Result<Self, Error> {
        let row_lookup = sequence_lookup(&entry.seqs);
        let col_lookup = sequence_lookup(entry.seqs2());
        let [primary, secondary] = Priority::ALL.map(|priority| ChainSlot::new(arm, priority));

        let rows = [
            sequence_positions(clonotypes, primary, &row_lookup)?,
            sequence_positions(clonotypes, secondary, &row_lookup)?,
        ];
        let cols = [
            sequence_positions(clonotypes2, primary, &col_lookup)?,
            sequence_positions(clonotypes2, secondary, &col_lookup)?,
        ];

        let clonotypes_by_col = cols.each_ref().map(|positions| {
            let mut by_col = vec![Vec::new(); entry.seqs2().len()];
            for (clonotype, position) in positions.iter().enumerate() {
                if let &Some(col) = position {
                    by_col[col].push(clonotype);
                }
            }
            by_col
        });

        let distances = if entry.distances.is_csr() {
            Cow::Borrowed(&entry.distances)
        } else {
            Cow::Owned(entry.distances.to_csr())
        };

        Ok(Self {
            distances,
            rows,
            cols,
            clonotypes_by_col,
        })
    }

    /// Appends every clonotype of the second table sharing at least one edge with `row`.
    fn extend_candidates(
        &self,
        row: usize,
        pairings: &[(Priority, Priority)],
        candidates: &mut Vec<usize>,
    ) {
        for &(priority, priority2) in pairings {
            let Some(seq_row) = self.rows[priority.index()][row] else {
                continue;
            };
            let Some(edges) = self.distances.outer_view(seq_row) else {
                continue;
            };
            let by_col = &self.clonotypes_by_col[priority2.index()];
            for (col, _) in edges.iter() {
                candidates.extend_from_slice(&by_col[col]);
            }
        }
    }

    fn chain_term(&self, row: usize, col: usize, priority: Priority, priority2: Priority) -> Term {
        let seq_row = self.rows[priority.index()][row];
        let seq_col = self.cols[priority2.index()][col];
        let value = match (seq_row, seq_col) {
            (Some(seq_row), Some(seq_col)) => self
                .distances
                .get(seq_row, seq_col)
                .copied()
                .unwrap_or(0),
            _ => 0,
        };
        Term::new(seq_row.is_some(), seq_col.is_some(), value)
    }

    #[inline]
    fn has_chain(&self, row: usize, priorities: &[Priority]) -> bool {
        priorities
            .iter()
            .any(|priority| self.rows[priority.index()][row].is_some())
    }

    #[inline]
    fn has_chain2(&self, col: usize, priorities: &[Priority]) -> bool {
        priorities
            .iter()
            .any(|priority| self.cols[priority.index()][col].is_some())
    }
}

/// Combines per-arm sequence distances into a clonotype distance matrix.
///
/// Rows follow [`ClonotypeNeighbors::clonotypes`], columns follow
/// [`ClonotypeNeighbors::clonotypes2`]. With a single dataset both are the same table and the
/// result is symmetric.
#[derive(Debug)]
pub struct ClonotypeNeighbors<'c> {
    params: NeighborsParams,
    clonotypes: Arc<ClonotypeTable>,
    clonotypes2: Arc<ClonotypeTable>,
    arms: Vec<ArmIndex<'c>>,
}

impl<'c> ClonotypeNeighbors<'c> {
    pub fn new(
        dataset: &dyn CellTable,
        dataset2: Option<&dyn CellTable>,
        cache: &'c DistanceCache,
        params: NeighborsParams,
    ) -> Result<Self, Error> {
        if params.chunksize == 0 {
            return Err(Error::ZeroChunkSize);
        }

        let slots = selected_slots(params.receptor_arms, params.dual_ir);
        let clonotypes = Arc::new(ClonotypeTable::build(
            dataset,
            &slots,
            params.sequence_key,
        )?);
        let clonotypes2 = match dataset2 {
            Some(dataset2) => Arc::new(ClonotypeTable::build(
                dataset2,
                &slots,
                params.sequence_key,
            )?),
            None => Arc::clone(&clonotypes),
        };

        let arms = params
            .receptor_arms
            .arms()
            .iter()
            .map(|&arm| {
                let entry = cache.get(&params.distance_key, arm)?;
                if entry.seqs2.is_some() != dataset2.is_some() {
                    return Err(Error::DatasetMismatch {
                        key: params.distance_key.clone(),
                        arm,
                        cached_two_datasets: entry.seqs2.is_some(),
                    });
                }
                ArmIndex::new(arm, entry, &clonotypes, &clonotypes2)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            params,
            clonotypes,
            clonotypes2,
            arms,
        })
    }

    #[inline]
    pub fn params(&self) -> &NeighborsParams {
        &self.params
    }

    #[inline]
    pub fn clonotypes(&self) -> &ClonotypeTable {
        &self.clonotypes
    }

    /// Clonotypes of the second dataset, the same table as [`Self::clonotypes`] when there is
    /// only one.
    #[inline]
    pub fn clonotypes2(&self) -> &ClonotypeTable {
        &self.clonotypes2
    }

    /// `true` with a single dataset. The cached distances are then guaranteed to share rows and
    /// columns.
    #[inline]
    pub fn is_symmetric(&self) -> bool {
        Arc::ptr_eq(&self.clonotypes, &self.clonotypes2)
    }

    /// Offset-encoded distance between every pair of clonotypes.
    pub fn compute_distances(&self) -> Result<EncodedMatrix, Error> {
        let shape = (self.clonotypes.len(), self.clonotypes2.len());
        info!(
            "computing clonotype distances ({} x {} clonotypes, receptor_arms={}, dual_ir={})",
            shape.0, shape.1, self.params.receptor_arms, self.params.dual_ir,
        );

        let blocks = map_chunks(
            shape.0,
            self.params.chunksize,
            self.params.n_jobs,
            |rows| Ok::<_, Error>(self.block_distances(rows)),
        )?;

        let distances = dist_matrix::from_triplets(shape, blocks.into_iter().flatten());
        info!("found {} connected clonotype pairs", distances.nnz());
        Ok(distances)
    }

    fn block_distances(&self, rows: Range<usize>) -> Vec<(usize, usize, u32)> {
        let pairings = chain_pairings(self.params.dual_ir);
        let mut candidates = Vec::new();
        let mut triplets = Vec::new();

        for row in rows {
            candidates.clear();
            for arm in &self.arms {
                arm.extend_candidates(row, pairings, &mut candidates);
            }
            candidates.sort_unstable();
            candidates.dedup();

            triplets.extend(candidates.iter().filter_map(|&col| {
                let value = self.pair_distance(row, col);
                (value != 0).then_some((row, col, value))
            }));
        }

        triplets
    }

    fn pair_distance(&self, row: usize, col: usize) -> u32 {
        let dual_ir = self.params.dual_ir;
        let pairings = chain_pairings(dual_ir);
        let priorities = dual_ir.priorities();
        let chains = chain_reduction(dual_ir);

        let arm_terms = self.arms.iter().map(|arm| {
            let value = chains.reduce(
                pairings
                    .iter()
                    .map(|&(priority, priority2)| arm.chain_term(row, col, priority, priority2)),
            );
            Term::new(
                arm.has_chain(row, priorities),
                arm.has_chain2(col, priorities),
                value,
            )
        });
        arm_reduction(self.params.receptor_arms).reduce(arm_terms)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array2};
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    use super::*;
    use crate::{
        cell_table::ColumnTable,
        dist_matrix::EncodedMatrixExt,
        ir_dist::{ir_dist, IrDistParams},
        test_utils::{cdr3, cdr3_2, MockDistanceCalculator},
    };

    #[derive(Debug)]
    struct Outcome {
        clonotypes: Vec<Vec<String>>,
        clonotypes2: Vec<Vec<String>>,
        symmetric: bool,
        distances: EncodedMatrix,
    }

    fn sequences(table: &ClonotypeTable) -> Vec<Vec<String>> {
        table
            .rows()
            .iter()
            .map(|row| {
                row.iter()
                    .map(|seq| seq.clone().unwrap_or_else(|| "nan".to_owned()))
                    .collect()
            })
            .collect()
    }

    fn mock() -> Metric {
        Metric::Custom(Arc::new(MockDistanceCalculator))
    }

    fn run(
        dataset: &dyn CellTable,
        dataset2: Option<&dyn CellTable>,
        metric: Metric,
        params: NeighborsParams,
    ) -> Result<Outcome, Error> {
        let mut cache = DistanceCache::new();
        let ir_params = IrDistParams {
            metric,
            key_added: Some(params.distance_key.clone()),
            ..Default::default()
        };
        ir_dist(dataset, dataset2, &ir_params, &mut cache).unwrap();

        let neighbors = ClonotypeNeighbors::new(dataset, dataset2, &cache, params)?;
        Ok(Outcome {
            clonotypes: sequences(neighbors.clonotypes()),
            clonotypes2: sequences(neighbors.clonotypes2()),
            symmetric: neighbors.is_symmetric(),
            distances: neighbors.compute_distances()?,
        })
    }

    fn params(receptor_arms: &str, dual_ir: &str) -> NeighborsParams {
        NeighborsParams {
            receptor_arms: receptor_arms.parse().unwrap(),
            dual_ir: dual_ir.parse().unwrap(),
            distance_key: "ir_dist_test".to_owned(),
            chunksize: 1,
            ..Default::default()
        }
    }

    fn check(
        metric: fn() -> Metric,
        receptor_arms: &str,
        dual_ir: &str,
        expected_clonotypes: &[&[&str]],
        expected: Array2<u32>,
    ) {
        let cells = cdr3();
        for with_dataset2 in [false, true] {
            for n_jobs in [Some(1), Some(2)] {
                let params = NeighborsParams {
                    n_jobs,
                    ..params(receptor_arms, dual_ir)
                };
                let dataset2 = with_dataset2.then_some(&cells as &dyn CellTable);
                let outcome = run(&cells, dataset2, metric(), params).unwrap();

                assert_eq!(outcome.clonotypes, expected_clonotypes);
                assert_eq!(outcome.clonotypes2, expected_clonotypes);
                assert_eq!(outcome.symmetric, !with_dataset2);
                assert_eq!(
                    outcome.distances.nnz(),
                    expected.iter().filter(|&&value| value != 0).count()
                );
                assert_eq!(
                    outcome.distances.to_dense(),
                    expected,
                    "receptor_arms={receptor_arms}, dual_ir={dual_ir}, n_jobs={n_jobs:?}"
                );
            }
        }
    }

    const VJ_PRIMARY: &[&[&str]] = &[&["AAA"], &["AHA"], &["nan"]];
    const VJ_BOTH: &[&[&str]] = &[
        &["AAA", "AHA"],
        &["AHA", "nan"],
        &["nan", "nan"],
        &["AAA", "AAA"],
        &["AAA", "nan"],
    ];
    const PRIMARY: &[&[&str]] = &[
        &["AAA", "KKY"],
        &["AHA", "KK"],
        &["nan", "nan"],
        &["AAA", "LLL"],
    ];
    const ALL_CHAINS: &[&[&str]] = &[
        &["AAA", "AHA", "KKY", "KKK"],
        &["AHA", "nan", "KK", "KKK"],
        &["nan", "nan", "nan", "nan"],
        &["AAA", "AAA", "LLL", "AAA"],
        &["AAA", "nan", "LLL", "nan"],
    ];

    #[test]
    fn single_chain_identity() {
        check(
            || Metric::Identity,
            "VJ",
            "primary_only",
            VJ_PRIMARY,
            array![[1, 0, 0], [0, 1, 0], [0, 0, 0]],
        );
    }

    #[test]
    fn single_arm_both_chains_identity() {
        check(
            || Metric::Identity,
            "VJ",
            "any",
            VJ_BOTH,
            array![
                [1, 1, 0, 1, 1],
                [1, 1, 0, 0, 0],
                [0, 0, 0, 0, 0],
                [1, 0, 0, 1, 1],
                [1, 0, 0, 1, 1],
            ],
        );
    }

    #[test]
    fn single_chain_custom() {
        check(
            mock,
            "VJ",
            "primary_only",
            VJ_PRIMARY,
            array![[1, 4, 0], [4, 1, 0], [0, 0, 0]],
        );
    }

    #[test]
    fn single_arm_any_chain_custom() {
        check(
            mock,
            "VJ",
            "any",
            VJ_BOTH,
            array![
                [1, 1, 0, 1, 1],
                [1, 1, 0, 4, 4],
                [0, 0, 0, 0, 0],
                [1, 4, 0, 1, 1],
                [1, 4, 0, 1, 1],
            ],
        );
    }

    #[test]
    fn single_arm_all_chains_custom() {
        check(
            mock,
            "VJ",
            "all",
            VJ_BOTH,
            array![
                [1, 0, 0, 4, 0],
                [0, 1, 0, 0, 4],
                [0, 0, 0, 0, 0],
                [4, 0, 0, 1, 0],
                [0, 4, 0, 0, 1],
            ],
        );
    }

    #[test]
    fn all_arms_primary_chain() {
        check(
            mock,
            "all",
            "primary_only",
            PRIMARY,
            array![[1, 10, 0, 0], [10, 1, 0, 0], [0, 0, 0, 0], [0, 0, 0, 1]],
        );
    }

    #[test]
    fn any_arm_primary_chain() {
        check(
            mock,
            "any",
            "primary_only",
            PRIMARY,
            array![[1, 4, 0, 1], [4, 1, 0, 4], [0, 0, 0, 0], [1, 4, 0, 1]],
        );
    }

    #[test]
    fn any_arm_all_chains() {
        check(
            mock,
            "any",
            "all",
            ALL_CHAINS,
            array![
                [1, 10, 0, 4, 0],
                [10, 1, 0, 0, 4],
                [0, 0, 0, 0, 0],
                [4, 0, 0, 1, 0],
                [0, 4, 0, 0, 1],
            ],
        );
    }

    #[test]
    fn any_arm_any_chain() {
        check(
            mock,
            "any",
            "any",
            ALL_CHAINS,
            array![
                [1, 1, 0, 1, 1],
                [1, 1, 0, 4, 4],
                [0, 0, 0, 0, 0],
                [1, 4, 0, 1, 1],
                [1, 4, 0, 1, 1],
            ],
        );
    }

    #[test]
    fn all_arms_any_chain() {
        check(
            mock,
            "all",
            "any",
            ALL_CHAINS,
            array![
                [1, 1, 0, 0, 0],
                [1, 1, 0, 0, 0],
                [0, 0, 0, 0, 0],
                [0, 0, 0, 1, 1],
                [0, 0, 0, 1, 1],
            ],
        );
    }

    #[test]
    fn all_arms_all_chains() {
        check(
            mock,
            "all",
            "all",
            ALL_CHAINS,
            array![
                [1, 0, 0, 0, 0],
                [0, 1, 0, 0, 0],
                [0, 0, 0, 0, 0],
                [0, 0, 0, 1, 0],
                [0, 0, 0, 0, 1],
            ],
        );
    }

    #[test]
    fn dual_ir_does_not_affect_arm_reduction() {
        let cells = cdr3_2();
        let cases = [
            ("all", array![[1, 0, 0], [0, 1, 0], [0, 0, 1]]),
            ("any", array![[1, 1, 0], [1, 1, 1], [0, 1, 1]]),
            ("VJ", array![[1, 0], [0, 0]]),
            ("VDJ", array![[1, 0], [0, 1]]),
        ];

        for (receptor_arms, expected) in cases {
            for dual_ir in ["all", "any", "primary_only"] {
                for with_dataset2 in [false, true] {
                    for n_jobs in [Some(1), Some(2)] {
                        let params = NeighborsParams {
                            n_jobs,
                            ..params(receptor_arms, dual_ir)
                        };
                        let dataset2 = with_dataset2.then_some(&cells as &dyn CellTable);
                        let outcome = run(&cells, dataset2, mock(), params).unwrap();
                        assert_eq!(
                            outcome.distances.to_dense(),
                            expected,
                            "receptor_arms={receptor_arms}, dual_ir={dual_ir}"
                        );
                    }
                }
            }
        }
    }

    fn without_primary_chains(mut cells: ColumnTable) -> ColumnTable {
        let n_rows = cells.n_rows();
        for column in ["IR_VJ_1_junction_aa", "IR_VDJ_1_junction_aa"] {
            cells
                .set_column(column, vec!["nan".to_owned(); n_rows])
                .unwrap();
        }
        cells
    }

    #[test]
    fn no_distances() {
        let cells = without_primary_chains(cdr3());
        for with_dataset2 in [false, true] {
            let dataset2 = with_dataset2.then_some(&cells as &dyn CellTable);
            let outcome = run(&cells, dataset2, mock(), params("all", "primary_only")).unwrap();
            assert_eq!(outcome.clonotypes, [["nan", "nan"]]);
            assert_eq!(outcome.distances.shape(), (1, 1));
            assert_eq!(outcome.distances.nnz(), 0);
        }
    }

    #[test]
    fn no_receptors() {
        let mut cells = without_primary_chains(cdr3());
        let n_rows = cells.n_rows();
        cells
            .set_column("has_ir", vec!["False".to_owned(); n_rows])
            .unwrap();

        let err = run(&cells, None, mock(), params("all", "primary_only")).unwrap_err();
        assert!(matches!(
            err,
            Error::Clonotypes(clonotypes::Error::NoReceptors)
        ));
    }

    #[test]
    fn second_dataset() {
        let cases: [(&str, &str, &[&[&str]], &[&[&str]], Array2<u32>); 3] = [
            (
                "VJ",
                "primary_only",
                VJ_PRIMARY,
                &[&["AAA"], &["nan"]],
                array![[1, 0], [0, 0], [0, 0]],
            ),
            (
                "all",
                "primary_only",
                PRIMARY,
                &[&["AAA", "KKK"], &["AAA", "LLL"], &["nan", "LLL"]],
                array![[0, 0, 0], [0, 0, 0], [0, 0, 0], [0, 1, 0]],
            ),
            (
                "all",
                "any",
                ALL_CHAINS,
                &[
                    &["AAA", "AAA", "KKK", "KKK"],
                    &["AAA", "AAA", "LLL", "LLL"],
                    &["nan", "nan", "LLL", "LLL"],
                ],
                array![[1, 0, 0], [0, 0, 0], [0, 0, 0], [0, 1, 0], [0, 1, 0]],
            ),
        ];

        let query = cdr3();
        let reference = cdr3_2();
        for (receptor_arms, dual_ir, expected_query, expected_reference, expected) in cases {
            let params = NeighborsParams {
                chunksize: DEFAULT_CHUNKSIZE,
                ..params(receptor_arms, dual_ir)
            };

            let outcome = run(&query, Some(&reference), Metric::Identity, params.clone()).unwrap();
            assert!(!outcome.symmetric);
            assert_eq!(outcome.clonotypes, expected_query);
            assert_eq!(outcome.clonotypes2, expected_reference);
            assert_eq!(outcome.distances.to_dense(), expected);

            let swapped = run(&reference, Some(&query), Metric::Identity, params).unwrap();
            assert_eq!(swapped.clonotypes, expected_reference);
            assert_eq!(swapped.clonotypes2, expected_query);
            assert_eq!(swapped.distances.to_dense(), expected.t());
        }
    }

    #[test]
    fn mismatched_cache() {
        let mut cache = DistanceCache::new();
        let ir_params = IrDistParams {
            key_added: Some("ir_dist_test".to_owned()),
            ..Default::default()
        };
        ir_dist(&cdr3_2(), None, &ir_params, &mut cache).unwrap();

        let cells = cdr3();
        let err = ClonotypeNeighbors::new(&cells, None, &cache, params("VJ", "any")).unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownSequence { arm: Arm::Vj, ref sequence } if sequence == "AHA"
        ));

        let err = ClonotypeNeighbors::new(&cells, None, &cache, NeighborsParams::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Cache(ir_dist::Error::MissingKey(key)) if key == "ir_dist_aa_identity"
        ));
    }

    #[test]
    fn cache_dataset_layout() {
        let query = cdr3();
        let reference = cdr3_2();
        let ir_params = IrDistParams {
            key_added: Some("ir_dist_test".to_owned()),
            ..Default::default()
        };

        let mut cache = DistanceCache::new();
        ir_dist(&query, Some(&reference), &ir_params, &mut cache).unwrap();
        let err = ClonotypeNeighbors::new(&query, None, &cache, params("VJ", "any")).unwrap_err();
        assert!(matches!(
            err,
            Error::DatasetMismatch {
                arm: Arm::Vj,
                cached_two_datasets: true,
                ..
            }
        ));

        let mut cache = DistanceCache::new();
        ir_dist(&query, None, &ir_params, &mut cache).unwrap();
        let err = ClonotypeNeighbors::new(&query, Some(&reference), &cache, params("VJ", "any"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DatasetMismatch {
                cached_two_datasets: false,
                ..
            }
        ));

        let neighbors =
            ClonotypeNeighbors::new(&query, None, &cache, params("VJ", "any")).unwrap();
        assert!(neighbors.is_symmetric());
        assert_eq!(neighbors.params().distance_key, "ir_dist_test");
    }

    #[test]
    fn zero_chunksize() {
        let cache = DistanceCache::new();
        let params = NeighborsParams {
            chunksize: 0,
            ..Default::default()
        };
        let err = ClonotypeNeighbors::new(&cdr3(), None, &cache, params).unwrap_err();
        assert!(matches!(err, Error::ZeroChunkSize));
    }

    fn random_cells(rng: &mut SmallRng, n_cells: usize) -> ColumnTable {
        const SEQS: [&str; 8] = ["nan", "nan", "CAS", "CAT", "CQS", "KAS", "CASS", "CA"];
        let slots = selected_slots(ReceptorArms::All, DualIr::Any);
        ColumnTable::from_columns(slots.iter().map(|slot| {
            let values: Vec<&str> = (0..n_cells)
                .map(|_| SEQS[rng.gen_range(0..SEQS.len())])
                .collect();
            (slot.column_name(SequenceKind::AminoAcid), values)
        }))
        .unwrap()
    }

    #[test]
    fn invariant_to_chunks_and_jobs() {
        let mut rng = SmallRng::seed_from_u64(11);
        let cells = random_cells(&mut rng, 80);
        let cells2 = random_cells(&mut rng, 30);

        for receptor_arms in ["VJ", "VDJ", "all", "any"] {
            for dual_ir in ["primary_only", "any", "all"] {
                let base = params(receptor_arms, dual_ir);
                let reference = run(
                    &cells,
                    None,
                    Metric::Levenshtein,
                    NeighborsParams {
                        n_jobs: Some(1),
                        chunksize: 1000,
                        ..base.clone()
                    },
                )
                .unwrap();
                assert!(reference.distances.is_symmetric());

                let rect = run(
                    &cells,
                    Some(&cells2),
                    Metric::Levenshtein,
                    base.clone(),
                )
                .unwrap();
                let rect_t = run(
                    &cells2,
                    Some(&cells),
                    Metric::Levenshtein,
                    base.clone(),
                )
                .unwrap();
                assert_eq!(rect.distances.transposed(), rect_t.distances);

                for chunksize in [1, 3, 17] {
                    for n_jobs in [Some(1), Some(3)] {
                        let outcome = run(
                            &cells,
                            None,
                            Metric::Levenshtein,
                            NeighborsParams {
                                n_jobs,
                                chunksize,
                                ..base.clone()
                            },
                        )
                        .unwrap();
                        assert_eq!(outcome.distances, reference.distances);
                    }
                }
            }
        }
    }

    #[test]
    fn reductions() {
        use super::Term::{Absent, Connected, OneSided, Unconnected};

        assert_eq!(Reduction::Any.reduce([Connected(3), Unconnected, Connected(2)]), 2);
        assert_eq!(Reduction::Any.reduce([OneSided, Absent]), 0);
        assert_eq!(Reduction::All.reduce([Connected(3), Absent, Connected(2)]), 3);
        assert_eq!(Reduction::All.reduce([Connected(3), OneSided]), 0);
        assert_eq!(Reduction::All.reduce([Absent, Absent]), 0);
        assert_eq!(Reduction::All.reduce([]), 0);

        assert_eq!(Term::new(false, false, 0), Absent);
        assert_eq!(Term::new(true, false, 0), OneSided);
        assert_eq!(Term::new(true, true, 0), Unconnected);
        assert_eq!(Term::new(true, true, 5), Connected(5));
    }
}
