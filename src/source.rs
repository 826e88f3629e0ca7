//! Tabular sources: named record sets the graph is built from.
//!
//! Cells are typed on load the way a dataframe reader would: empty cells
//! are null, then integer, then float, otherwise text.

use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};

use crate::model::{PropertyMap, Value};
use crate::{Error, Result};

/// One row: column name → cell.
pub type Record = PropertyMap;

/// A named record set with a known column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), columns: Vec::new(), rows: Vec::new() }
    }

    /// Append a row, registering any columns not seen before.
    pub fn push<I, K, V>(&mut self, cells: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut row = Record::new();
        for (column, value) in cells {
            let column = column.into();
            if !self.columns.contains(&column) {
                self.columns.push(column.clone());
            }
            row.insert(column, value.into());
        }
        self.rows.push(row);
        self
    }

    /// Builder form of [`Table::push`].
    pub fn with_row<I, K, V>(mut self, cells: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.push(cells);
        self
    }

    /// Read a headered CSV document.
    pub fn from_csv_reader<R: Read>(name: impl Into<String>, reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_owned).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let row: Record = columns
                .iter()
                .zip(record.iter())
                .map(|(column, cell)| (column.clone(), infer_cell(cell)))
                .collect();
            rows.push(row);
        }

        Ok(Self { name: name.into(), columns, rows })
    }

    pub fn from_path(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(name, std::io::BufReader::new(file))
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Type a raw CSV cell.
pub fn infer_cell(raw: &str) -> Value {
    let cell = raw.trim();
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Value::Int(i);
    }
    match cell.parse::<f64>() {
        Ok(f) if f.is_nan() => Value::Null,
        Ok(f) => Value::Float(f),
        Err(_) => Value::String(cell.to_owned()),
    }
}

/// Named sources in insertion order. Order matters: it decides which
/// source creates a node first.
#[derive(Debug, Clone, Default)]
pub struct Sources {
    tables: Vec<Table>,
}

impl Sources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a table under its own name, replacing any table with that name in place.
    pub fn insert(&mut self, table: Table) {
        match self.tables.iter_mut().find(|t| t.name == table.name) {
            Some(slot) => *slot = table,
            None => self.tables.push(table),
        }
    }

    pub fn with(mut self, table: Table) -> Self {
        self.insert(table);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl FromIterator<Table> for Sources {
    fn from_iter<I: IntoIterator<Item = Table>>(iter: I) -> Self {
        let mut sources = Sources::new();
        for table in iter {
            sources.insert(table);
        }
        sources
    }
}

/// Load CSV sources by name.
///
/// A source that cannot be read is skipped with a warning: the remaining
/// sources can still produce a usable graph. Only when nothing at all can
/// be read is this a [`Error::DataSource`].
pub fn load_sources<I, N, P>(paths: I) -> Result<Sources>
where
    I: IntoIterator<Item = (N, P)>,
    N: Into<String>,
    P: AsRef<Path>,
{
    let mut sources = Sources::new();
    let mut failures: Vec<(String, String)> = Vec::new();

    for (name, path) in paths {
        let name = name.into();
        let path = path.as_ref();
        match Table::from_path(name.clone(), path) {
            Ok(table) => {
                debug!(source = %name, path = %path.display(), rows = table.len(), "loaded source");
                sources.insert(table);
            }
            Err(e) => {
                warn!(source = %name, path = %path.display(), error = %e, "skipping unreadable source");
                failures.push((name, e.to_string()));
            }
        }
    }

    if sources.is_empty() && !failures.is_empty() {
        let message = failures
            .iter()
            .map(|(name, err)| format!("{name}: {err}"))
            .collect::<Vec<_>>()
            .join("; ");
        let source_name = failures
            .into_iter()
            .map(|(name, _)| name)
            .collect::<Vec<_>>()
            .join(", ");
        return Err(Error::DataSource { source_name, message });
    }

    Ok(sources)
}
