//! Column access to the per-cell annotation table.

use std::{
    io::{self, Read},
    path::Path,
};

use fnv::FnvHashMap;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("column {0:?} not found in cell table")]
    MissingColumn(String),

    #[error("column {column:?} has {found} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("row {row} is out of range for a table with {n_rows} rows")]
    RowOutOfRange { row: usize, n_rows: usize },

    #[error("duplicated column {0:?}")]
    DuplicatedColumn(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Typed key-value access to a table with one row per cell.
pub trait CellTable {
    fn n_rows(&self) -> usize;

    fn column(&self, name: &str) -> Option<&[String]>;

    fn set_column(&mut self, name: &str, values: Vec<String>) -> Result<(), Error>;

    /// Values of the `names` columns for the selected rows (all rows when `rows` is `None`),
    /// one inner vector per row.
    ///
    /// Columns are only required to exist when at least one row is selected.
    fn get_columns(&self, names: &[&str], rows: Option<&[usize]>) -> Result<Vec<Vec<&str>>, Error> {
        let n_rows = self.n_rows();
        let selected_len = rows.map_or(n_rows, <[usize]>::len);
        if selected_len == 0 {
            return Ok(Vec::new());
        }

        let columns = names
            .iter()
            .map(|&name| {
                self.column(name)
                    .ok_or_else(|| Error::MissingColumn(name.to_owned()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let row_values = |row: usize| -> Result<Vec<&str>, Error> {
            if row >= n_rows {
                return Err(Error::RowOutOfRange { row, n_rows });
            }
            Ok(columns.iter().map(|column| column[row].as_str()).collect())
        };

        match rows {
            Some(rows) => rows.iter().map(|&row| row_values(row)).collect(),
            None => (0..n_rows).map(row_values).collect(),
        }
    }
}

/// In-memory, column-major [`CellTable`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnTable {
    n_rows: usize,
    names: Vec<String>,
    columns: Vec<Vec<String>>,
    index: FnvHashMap<String, usize>,
}

impl ColumnTable {
    pub fn new(n_rows: usize) -> Self {
        Self {
            n_rows,
            ..Default::default()
        }
    }

    /// Builds a table out of named columns, all of the same length.
    pub fn from_columns<I, N, V>(columns: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (N, Vec<V>)>,
        N: Into<String>,
        V: Into<String>,
    {
        let mut columns = columns.into_iter().peekable();
        let n_rows = columns.peek().map_or(0, |(_, values)| values.len());
        let mut table = Self::new(n_rows);
        for (name, values) in columns {
            let name = name.into();
            if table.index.contains_key(&name) {
                return Err(Error::DuplicatedColumn(name));
            }
            table.set_column(&name, values.into_iter().map(Into::into).collect())?;
        }
        Ok(table)
    }

    /// Reads a delimited text file with a header row. Files ending in `.tsv` or `.txt` are
    /// tab-separated, anything else is comma-separated.
    pub fn read_path(path: &Path) -> Result<Self, Error> {
        let delimiter = match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") || ext.eq_ignore_ascii_case("txt") => {
                b'\t'
            }
            _ => b',',
        };
        let file = std::fs::File::open(path)?;
        Self::from_reader(io::BufReader::new(file), delimiter)
    }

    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self, Error> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .from_reader(reader);

        let names: Vec<String> = reader.headers()?.iter().map(str::to_owned).collect();
        let mut columns = vec![Vec::new(); names.len()];
        for record in reader.records() {
            let record = record?;
            for (column, value) in columns.iter_mut().zip(record.iter()) {
                column.push(value.to_owned());
            }
        }

        Self::from_columns(names.into_iter().zip(columns))
    }

    pub fn write_path(&self, path: &Path) -> Result<(), Error> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)?;
        self.write(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    fn write<W: io::Write>(&self, writer: &mut csv::Writer<W>) -> Result<(), Error> {
        writer.write_record(&self.names)?;
        for row in 0..self.n_rows {
            writer.write_record(self.columns.iter().map(|column| column[row].as_str()))?;
        }
        Ok(())
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }
}

impl CellTable for ColumnTable {
    #[inline]
    fn n_rows(&self) -> usize {
        self.n_rows
    }

    fn column(&self, name: &str) -> Option<&[String]> {
        self.index.get(name).map(|&index| &*self.columns[index])
    }

    fn set_column(&mut self, name: &str, values: Vec<String>) -> Result<(), Error> {
        if values.len() != self.n_rows {
            return Err(Error::LengthMismatch {
                column: name.to_owned(),
                expected: self.n_rows,
                found: values.len(),
            });
        }

        match self.index.get(name) {
            Some(&index) => self.columns[index] = values,
            None => {
                self.index.insert(name.to_owned(), self.columns.len());
                self.names.push(name.to_owned());
                self.columns.push(values);
            }
        }
        Ok(())
    }
}
