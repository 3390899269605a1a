pub mod cell_table;
pub mod chain;
mod chunks;
pub mod clonotype_neighbors;
pub mod clonotypes;
pub mod dist_matrix;
pub mod ir_dist;
pub mod metrics;
pub mod sequence_dist;

#[cfg(test)]
mod test_utils;

pub use cell_table::{CellTable, ColumnTable};
pub use chain::{Arm, ChainSlot, DualIr, Priority, ReceptorArms, SequenceKind};
pub use clonotype_neighbors::{ClonotypeNeighbors, NeighborsParams};
pub use clonotypes::ClonotypeTable;
pub use dist_matrix::{EncodedMatrix, EncodedMatrixExt};
pub use ir_dist::{ir_dist, DistanceCache, IrDistParams, LocusDistances};
pub use metrics::{DistanceCalculator, Metric};
pub use sequence_dist::{sequence_dist, SequenceDistParams};
