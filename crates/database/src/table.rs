//! The date-indexed tables returned by every series fetch.

use crate::error::DbError;
use chrono::NaiveDate;
use core_types::Value;
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// A table indexed by date, with one nullable `f64` column per series.
///
/// Stored as a polars `DataFrame` whose first column is the date index.
#[derive(Debug, Clone)]
pub struct TimeSeriesTable {
    index: String,
    frame: DataFrame,
}

impl TimeSeriesTable {
    /// Builds a single-series table from `(index, value)` rows, naming the value column `name`.
    ///
    /// Dates are unique and ascending. A date seen twice with different
    /// values is rejected, the same way the pivot rejects a conflicting cell.
    pub fn from_series_rows(index: &str, name: &str, rows: &[Vec<Value>]) -> Result<Self, DbError> {
        let mut cells: BTreeMap<NaiveDate, Option<f64>> = BTreeMap::new();

        for (n, row) in rows.iter().enumerate() {
            let (date, value) = match row.as_slice() {
                [date, value, ..] => (date, value),
                _ => return Err(short_row(n, 2, row.len())),
            };
            let date = parse_index(index, date)?;
            let value = parse_value(name, value)?;

            match cells.get(&date) {
                Some(existing) if *existing != value => {
                    return Err(DbError::Reshape(format!(
                        "conflicting values for {name} on {date}"
                    )));
                }
                Some(_) => continue,
                None => {
                    cells.insert(date, value);
                }
            }
        }

        let dates: Vec<NaiveDate> = cells.keys().copied().collect();
        let values: Vec<Option<f64>> = cells.into_values().collect();
        let frame = DataFrame::new(vec![Series::new(index, dates), Series::new(name, values)])?;
        Ok(Self { index: index.to_string(), frame })
    }

    /// Pivots `(index, value, symbol)` rows into one column per symbol.
    ///
    /// Columns exist only for symbols that appear in `rows` and are sorted by name;
    /// dates are unique and ascending. A (date, symbol) pair seen twice with
    /// different values cannot be placed in a single cell and is rejected.
    pub fn pivot_rows(index: &str, rows: &[Vec<Value>]) -> Result<Self, DbError> {
        let mut symbols = BTreeSet::new();
        let mut cells: BTreeMap<NaiveDate, BTreeMap<String, Option<f64>>> = BTreeMap::new();

        for (n, row) in rows.iter().enumerate() {
            let (date, value, symbol) = match row.as_slice() {
                [date, value, symbol, ..] => (date, value, symbol),
                _ => return Err(short_row(n, 3, row.len())),
            };
            let date = parse_index(index, date)?;
            let symbol = symbol
                .as_str()
                .ok_or_else(|| DbError::Reshape(format!("row {n}: symbol is not text: {symbol}")))?
                .to_string();
            let value = parse_value(&symbol, value)?;

            let slot = cells.entry(date).or_default();
            if let Some(existing) = slot.get(&symbol) {
                if *existing != value {
                    return Err(DbError::Reshape(format!(
                        "conflicting values for {symbol} on {date}"
                    )));
                }
                continue;
            }
            slot.insert(symbol.clone(), value);
            symbols.insert(symbol);
        }

        let dates: Vec<NaiveDate> = cells.keys().copied().collect();
        let mut columns = vec![Series::new(index, dates)];
        for symbol in &symbols {
            let values: Vec<Option<f64>> = cells
                .values()
                .map(|row| row.get(symbol).copied().flatten())
                .collect();
            columns.push(Series::new(symbol, values));
        }

        let frame = DataFrame::new(columns)?;
        Ok(Self { index: index.to_string(), frame })
    }

    /// An empty table with only the index column.
    pub fn empty(index: &str) -> Result<Self, DbError> {
        let frame = DataFrame::new(vec![Series::new(index, Vec::<NaiveDate>::new())])?;
        Ok(Self { index: index.to_string(), frame })
    }

    /// Name of the date index column (`trade_date` or `f_ann_date`).
    pub fn index_name(&self) -> &str {
        &self.index
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value column names, excluding the index.
    pub fn columns(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .filter(|name| *name != self.index)
            .map(str::to_string)
            .collect()
    }

    pub fn dates(&self) -> Result<Vec<NaiveDate>, DbError> {
        let index = self.frame.column(&self.index)?.date()?;
        index
            .as_date_iter()
            .map(|d| d.ok_or_else(|| DbError::Reshape("null in date index".to_string())))
            .collect()
    }

    pub fn column(&self, name: &str) -> Result<Vec<Option<f64>>, DbError> {
        Ok(self.frame.column(name)?.f64()?.into_iter().collect())
    }
}

fn parse_index(index: &str, cell: &Value) -> Result<NaiveDate, DbError> {
    cell.as_naive_date()
        .ok_or_else(|| DbError::Reshape(format!("{index} value '{cell}' is not a date")))
}

fn parse_value(column: &str, cell: &Value) -> Result<Option<f64>, DbError> {
    if cell.is_null() {
        return Ok(None);
    }
    cell.as_f64()
        .map(Some)
        .ok_or_else(|| DbError::Reshape(format!("{column} value '{cell}' is not numeric")))
}

fn short_row(n: usize, expected: usize, got: usize) -> DbError {
    DbError::Reshape(format!("row {n} has {got} columns, expected {expected}"))
}
