//! Grouping of cells into clonotypes, i.e. unique combinations of chain sequences.

use fnv::FnvHashMap;
use log::{debug, warn};
use smallvec::SmallVec;

use crate::{
    cell_table::{self, CellTable, ColumnTable},
    chain::{parse_sequence, Arm, ChainSlot, Priority, SequenceKind, MISSING},
};

pub const HAS_IR_COLUMN: &str = "has_ir";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no cell in the table has an immune receptor")]
    NoReceptors,

    #[error("cell table error: {0}")]
    CellTable(#[from] cell_table::Error),
}

/// Sequences of one clonotype, in the order of [`ClonotypeTable::slots`].
pub type ClonotypeRow = SmallVec<[Option<String>; 4]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClonotypeTable {
    sequence: SequenceKind,
    slots: Vec<ChainSlot>,
    rows: Vec<ClonotypeRow>,
    cell_clonotypes: Vec<Option<usize>>,
}

#[inline]
fn is_true(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Rows of the cells that carry at least one receptor chain.
///
/// The `has_ir` column is authoritative when present. Without it, a cell qualifies when any of
/// its chain columns holds a sequence.
pub fn receptor_cells(dataset: &dyn CellTable, sequence: SequenceKind) -> Vec<usize> {
    if let Some(has_ir) = dataset.column(HAS_IR_COLUMN) {
        return has_ir
            .iter()
            .enumerate()
            .filter_map(|(row, value)| is_true(value).then_some(row))
            .collect();
    }

    let columns: Vec<&[String]> = Arm::ALL
        .into_iter()
        .flat_map(|arm| Priority::ALL.map(|priority| ChainSlot::new(arm, priority)))
        .filter_map(|slot| dataset.column(&slot.column_name(sequence)))
        .collect();

    (0..dataset.n_rows())
        .filter(|&row| {
            columns
                .iter()
                .any(|column| parse_sequence(&column[row]).is_some())
        })
        .collect()
}

impl ClonotypeTable {
    /// Groups the cells with receptors by the sequences found in `slots`.
    ///
    /// Clonotypes are numbered in order of first appearance.
    pub fn build(
        dataset: &dyn CellTable,
        slots: &[ChainSlot],
        sequence: SequenceKind,
    ) -> Result<Self, Error> {
        let cells = receptor_cells(dataset, sequence);
        if cells.is_empty() {
            return Err(Error::NoReceptors);
        }

        let names: Vec<String> = slots
            .iter()
            .map(|slot| slot.column_name(sequence))
            .collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let values = dataset.get_columns(&names, Some(cells.as_slice()))?;

        let mut index: FnvHashMap<SmallVec<[Option<&str>; 4]>, usize> = FnvHashMap::default();
        let mut rows: Vec<ClonotypeRow> = Vec::new();
        let mut cell_clonotypes = vec![None; dataset.n_rows()];
        for (&cell, cell_values) in cells.iter().zip(&values) {
            let key: SmallVec<[Option<&str>; 4]> = cell_values
                .iter()
                .map(|&value| parse_sequence(value))
                .collect();

            let clonotype = *index.entry(key).or_insert_with_key(|key| {
                rows.push(key.iter().map(|seq| seq.map(str::to_owned)).collect());
                rows.len() - 1
            });
            cell_clonotypes[cell] = Some(clonotype);
        }

        if rows.len() == 1 && rows[0].iter().all(Option::is_none) {
            warn!(
                "none of the {} cells with receptors has a sequence in the selected chains",
                cells.len()
            );
        }
        debug!("grouped {} cells into {} clonotypes", cells.len(), rows.len());

        Ok(Self {
            sequence,
            slots: slots.to_vec(),
            rows,
            cell_clonotypes,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[inline]
    pub fn slots(&self) -> &[ChainSlot] {
        &self.slots
    }

    #[inline]
    pub fn rows(&self) -> &[ClonotypeRow] {
        &self.rows
    }

    pub fn slot_index(&self, slot: ChainSlot) -> Option<usize> {
        self.slots.iter().position(|&other| other == slot)
    }

    /// Sequence of `slot` for the given clonotype, `None` when missing or not selected.
    pub fn get(&self, row: usize, slot: ChainSlot) -> Option<&str> {
        let index = self.slot_index(slot)?;
        self.rows[row][index].as_deref()
    }

    /// Clonotype of every cell of the source table, `None` for cells without receptors.
    #[inline]
    pub fn cell_clonotypes(&self) -> &[Option<usize>] {
        &self.cell_clonotypes
    }

    /// Stores the clonotype index of every cell in `column` of `dataset`.
    pub fn write_cell_clonotypes(
        &self,
        dataset: &mut dyn CellTable,
        column: &str,
    ) -> Result<(), Error> {
        let values = self
            .cell_clonotypes
            .iter()
            .map(|clonotype| match clonotype {
                Some(clonotype) => clonotype.to_string(),
                None => MISSING.to_owned(),
            })
            .collect();
        dataset.set_column(column, values)?;
        Ok(())
    }

    /// The clonotypes as a table with one column per slot.
    pub fn to_column_table(&self) -> Result<ColumnTable, Error> {
        let columns = self.slots.iter().enumerate().map(|(index, slot)| {
            let values: Vec<&str> = self
                .rows
                .iter()
                .map(|row| row[index].as_deref().unwrap_or(MISSING))
                .collect();
            (slot.column_name(self.sequence), values)
        });
        Ok(ColumnTable::from_columns(columns)?)
    }
}
