use std::ops::Range;

use fnv::FnvHashMap;
use log::debug;

use crate::{
    chain::parse_sequence,
    chunks::map_chunks,
    dist_matrix::{self, EncodedMatrix},
    metrics::{self, DistanceCalculator, Metric},
};

pub const DEFAULT_CHUNKSIZE: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceDistParams {
    /// Maximum distance kept in the matrix. `None` picks the metric default.
    pub cutoff: Option<u32>,

    /// Number of worker threads. `None` uses all available processors.
    pub n_jobs: Option<usize>,

    /// Number of unique sequences handed to the calculator at a time.
    pub chunksize: usize,
}

impl Default for SequenceDistParams {
    fn default() -> Self {
        Self {
            cutoff: None,
            n_jobs: None,
            chunksize: DEFAULT_CHUNKSIZE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("unable to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("distance calculation failed: {0}")]
    Metric(#[from] metrics::Error),
}

/// First-occurrence deduplication of a sequence collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UniqueSequences<'a> {
    pub(crate) seqs: Vec<&'a str>,

    /// Index into `seqs` for every input sequence, `None` for the missing sentinel.
    pub(crate) positions: Vec<Option<usize>>,
}

impl<'a> UniqueSequences<'a> {
    pub(crate) fn new<S: AsRef<str>>(input: &'a [S]) -> Self {
        let mut index: FnvHashMap<&'a str, usize> = FnvHashMap::default();
        let mut seqs = Vec::new();
        let positions = input
            .iter()
            .map(|seq| {
                let seq = parse_sequence(seq.as_ref())?;
                Some(*index.entry(seq).or_insert_with(|| {
                    seqs.push(seq);
                    seqs.len() - 1
                }))
            })
            .collect();

        Self { seqs, positions }
    }

    /// Original positions of every unique sequence.
    fn occurrences(&self) -> Vec<Vec<usize>> {
        let mut occurrences = vec![Vec::new(); self.seqs.len()];
        for (original, position) in self.positions.iter().enumerate() {
            if let &Some(unique) = position {
                occurrences[unique].push(original);
            }
        }
        occurrences
    }
}

/// Computes the offset-encoded distance matrix between `seqs` and `seqs2` (or `seqs` itself).
///
/// The returned matrix has one row per element of `seqs` and one column per element of
/// `seqs2`, in input order. Missing sequences never connect to anything. The result does not
/// depend on `chunksize` or `n_jobs`.
pub fn sequence_dist<S>(
    seqs: &[S],
    seqs2: Option<&[S]>,
    metric: &Metric,
    params: SequenceDistParams,
) -> Result<EncodedMatrix, Error>
where
    S: AsRef<str>,
{
    if params.chunksize == 0 {
        return Err(Error::ZeroChunkSize);
    }

    let calculator = metric.calculator(params.cutoff);
    let unique = UniqueSequences::new(seqs);
    let unique2 = seqs2.map(UniqueSequences::new);
    debug!(
        "computing distances between {} and {} unique sequences",
        unique.seqs.len(),
        unique2.as_ref().unwrap_or(&unique).seqs.len(),
    );

    let unique_distances = unique_dist_mat(
        calculator.as_ref(),
        &unique.seqs,
        unique2.as_ref().map(|unique2| &*unique2.seqs),
        params,
    )?;

    Ok(broadcast(
        &unique_distances,
        &unique,
        unique2.as_ref().unwrap_or(&unique),
    ))
}

/// Distance matrix between unique sequences, computed block by block.
pub(crate) fn unique_dist_mat(
    calculator: &dyn DistanceCalculator,
    seqs: &[&str],
    seqs2: Option<&[&str]>,
    params: SequenceDistParams,
) -> Result<EncodedMatrix, Error> {
    let SequenceDistParams {
        n_jobs, chunksize, ..
    } = params;
    if chunksize == 0 {
        return Err(Error::ZeroChunkSize);
    }

    match seqs2 {
        None => {
            let len = seqs.len();
            let blocks = map_chunks(len, chunksize, n_jobs, |rows| {
                upper_triangle_block(calculator, seqs, rows)
            })?;

            let triplets = blocks.into_iter().flatten().flat_map(|(row, col, value)| {
                let mirrored = (row != col).then_some((col, row, value));
                [Some((row, col, value)), mirrored].into_iter().flatten()
            });
            Ok(dist_matrix::from_triplets((len, len), triplets))
        }

        Some(seqs2) if seqs.len() >= seqs2.len() => {
            let blocks = map_chunks(seqs.len(), chunksize, n_jobs, |rows| {
                block(calculator, &seqs[rows.clone()], seqs2, rows.start, 0)
            })?;
            Ok(dist_matrix::from_triplets(
                (seqs.len(), seqs2.len()),
                blocks.into_iter().flatten(),
            ))
        }

        Some(seqs2) => {
            let blocks = map_chunks(seqs2.len(), chunksize, n_jobs, |cols| {
                block(calculator, seqs, &seqs2[cols.clone()], 0, cols.start)
            })?;
            Ok(dist_matrix::from_triplets(
                (seqs.len(), seqs2.len()),
                blocks.into_iter().flatten(),
            ))
        }
    }
}

fn block(
    calculator: &dyn DistanceCalculator,
    seqs: &[&str],
    seqs2: &[&str],
    row_offset: usize,
    col_offset: usize,
) -> Result<Vec<(usize, usize, u32)>, Error> {
    let expected = (seqs.len(), seqs2.len());
    let block = calculator.calc_dist_mat(seqs, Some(seqs2))?;
    if block.shape() != expected {
        return Err(metrics::Error::ShapeMismatch {
            expected,
            found: block.shape(),
        }
        .into());
    }

    Ok(block
        .iter()
        .filter(|&(&value, _)| value != 0)
        .map(|(&value, (row, col))| (row + row_offset, col + col_offset, value))
        .collect())
}

/// Entries on or above the diagonal for the given rows of a self-distance matrix.
fn upper_triangle_block(
    calculator: &dyn DistanceCalculator,
    seqs: &[&str],
    rows: Range<usize>,
) -> Result<Vec<(usize, usize, u32)>, Error> {
    let start = rows.start;
    let mut triplets = block(calculator, &seqs[rows], &seqs[start..], start, start)?;
    triplets.retain(|&(row, col, _)| col >= row);
    Ok(triplets)
}

/// Expands a matrix over unique sequences back to the original input order.
fn broadcast(
    unique_distances: &EncodedMatrix,
    rows: &UniqueSequences,
    cols: &UniqueSequences,
) -> EncodedMatrix {
    let col_occurrences = cols.occurrences();
    let shape = (rows.positions.len(), cols.positions.len());

    let triplets = rows
        .positions
        .iter()
        .enumerate()
        .filter_map(|(row, position)| position.map(|unique| (row, unique)))
        .flat_map(|(row, unique)| {
            unique_distances
                .outer_view(unique)
                .into_iter()
                .flat_map(|view| {
                    view.iter()
                        .map(|(col, &value)| (col, value))
                        .collect::<Vec<_>>()
                })
                .flat_map(|(unique_col, value)| {
                    col_occurrences[unique_col]
                        .iter()
                        .map(move |&col| (row, col, value))
                })
                .collect::<Vec<_>>()
        });

    dist_matrix::from_triplets(shape, triplets)
}
