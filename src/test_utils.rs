use crate::{
    cell_table::ColumnTable,
    dist_matrix::{self, EncodedMatrix},
    metrics::{self, DistanceCalculator},
};

pub(crate) fn cdr3() -> ColumnTable {
    ColumnTable::from_reader(include_str!("../test_data/cdr3.tsv").as_bytes(), b'\t').unwrap()
}

pub(crate) fn cdr3_2() -> ColumnTable {
    ColumnTable::from_reader(include_str!("../test_data/cdr3_2.tsv").as_bytes(), b'\t').unwrap()
}

/// Calculator with hand-picked (already encoded) distances between a few sequences.
pub(crate) struct MockDistanceCalculator;

impl MockDistanceCalculator {
    const SEQS: [&'static str; 6] = ["AAA", "AHA", "KK", "KKK", "KKY", "LLL"];
    const DISTANCES: [[u32; 6]; 6] = [
        [1, 4, 0, 0, 0, 0],
        [4, 1, 0, 0, 0, 0],
        [0, 0, 1, 10, 10, 0],
        [0, 0, 10, 1, 5, 0],
        [0, 0, 10, 5, 1, 0],
        [0, 0, 0, 0, 0, 1],
    ];

    fn lookup(a: &str, b: &str) -> u32 {
        let index = |seq: &str| Self::SEQS.iter().position(|&known| known == seq);
        match (index(a), index(b)) {
            (Some(a), Some(b)) => Self::DISTANCES[a][b],
            _ => 0,
        }
    }
}

impl DistanceCalculator for MockDistanceCalculator {
    fn calc_dist_mat(
        &self,
        seqs: &[&str],
        seqs2: Option<&[&str]>,
    ) -> Result<EncodedMatrix, metrics::Error> {
        let seqs2 = seqs2.unwrap_or(seqs);
        let triplets = seqs.iter().enumerate().flat_map(|(row, &a)| {
            seqs2.iter().enumerate().filter_map(move |(col, &b)| {
                let value = Self::lookup(a, b);
                (value != 0).then_some((row, col, value))
            })
        });
        Ok(dist_matrix::from_triplets((seqs.len(), seqs2.len()), triplets))
    }
}
