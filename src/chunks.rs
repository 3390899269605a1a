use std::ops::Range;

use log::debug;
use rayon::{
    iter::{IntoParallelIterator, ParallelIterator},
    ThreadPoolBuildError, ThreadPoolBuilder,
};

/// Contiguous `[start, end)` blocks of at most `chunksize` items.
pub(crate) fn chunk_ranges(len: usize, chunksize: usize) -> Vec<Range<usize>> {
    assert!(chunksize > 0);
    (0..len)
        .step_by(chunksize)
        .map(|start| start..(start + chunksize).min(len))
        .collect()
}

/// Runs `f` over every block of `0..len` and returns the results in block order.
///
/// Blocks run inline when there is only one of them or when `n_jobs == Some(1)`, otherwise
/// on a dedicated pool of `n_jobs` threads (the global pool for `None`). The first error
/// aborts the whole computation.
pub(crate) fn map_chunks<T, E, F>(
    len: usize,
    chunksize: usize,
    n_jobs: Option<usize>,
    f: F,
) -> Result<Vec<T>, E>
where
    F: Fn(Range<usize>) -> Result<T, E> + Sync,
    T: Send,
    E: Send + From<ThreadPoolBuildError>,
{
    let ranges = chunk_ranges(len, chunksize);
    debug!(
        "processing {len} rows in {} chunks of up to {chunksize} rows",
        ranges.len()
    );

    if ranges.len() <= 1 || n_jobs == Some(1) {
        return ranges.into_iter().map(f).collect();
    }

    let run = || ranges.into_par_iter().map(&f).collect::<Result<Vec<_>, _>>();
    match n_jobs {
        Some(n_jobs) => ThreadPoolBuilder::new()
            .num_threads(n_jobs)
            .build()?
            .install(run),
        None => run(),
    }
}
