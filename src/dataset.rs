//! The [`Dataset`] value type: ordered unique column names over ordered rows of text fields.
//!
//! Datasets are immutable. Every operation (`select`, `add_const_if_missing`,
//! `union`, ...) returns a new `Dataset`, and every constructor re-validates
//! that each row carries exactly one field per column. An arity mismatch is a
//! construction error ([`Error::ArityViolation`]); rows are never padded or
//! truncated.
//!
//! # Example
//!
//! ```
//! use tsvbeam::Dataset;
//!
//! # fn main() -> tsvbeam::Result<()> {
//! let ds = Dataset::new(
//!     vec!["id".into(), "name".into()],
//!     vec![vec!["1".into(), "alice".into()]],
//! )?;
//! let names = ds.select(&["name"])?;
//! assert_eq!(names.columns(), ["name"]);
//! # Ok(())
//! # }
//! ```

use crate::args::OneOrMany;
use crate::error::{Error, Result};
use crate::io::tsv::TsvFormat;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

/// One row viewed as a column name → value mapping.
pub type Record = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    /// Build a dataset from a header and rows.
    ///
    /// # Errors
    /// [`Error::DuplicateColumn`] if a column name repeats, [`Error::ArityViolation`]
    /// if any row's length differs from the header's.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        check_unique(&columns)?;
        check_arity(columns.len(), &rows)?;
        Ok(Self { columns, rows })
    }

    /// A dataset with the given header and no rows.
    ///
    /// # Errors
    /// [`Error::DuplicateColumn`] if a column name repeats.
    pub fn empty(columns: Vec<String>) -> Result<Self> {
        Self::new(columns, Vec::new())
    }

    /// Parse a header line and data lines split on `format.delimiter`.
    ///
    /// An empty header line yields a zero-column dataset; such datasets are
    /// skipped by reconciliation.
    ///
    /// # Errors
    /// See [`Dataset::new`].
    pub fn from_lines<S: AsRef<str>>(header: &str, lines: &[S], format: &TsvFormat) -> Result<Self> {
        let columns = format.split_header(header);
        let rows = lines
            .iter()
            .map(|line| format.split(line.as_ref()))
            .collect();
        Self::new(columns, rows)
    }

    /// Build a dataset from name → value mappings.
    ///
    /// The header is the sorted union of all keys; a record missing a key
    /// contributes an empty string for it.
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let records: Vec<&Record> = records.into_iter().collect();
        let columns: Vec<String> = records
            .iter()
            .flat_map(|r| r.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let rows = records
            .iter()
            .map(|r| {
                columns
                    .iter()
                    .map(|c| r.get(c).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    /// Concatenate rows of datasets already known to share one header.
    pub(crate) fn from_uniform(columns: Vec<String>, parts: Vec<Dataset>) -> Self {
        let total = parts.iter().map(Dataset::num_rows).sum();
        let mut rows = Vec::with_capacity(total);
        for part in parts {
            debug_assert_eq!(part.columns, columns);
            rows.extend(part.rows);
        }
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// True when the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// All values of one column, in row order.
    ///
    /// # Errors
    /// [`Error::MissingColumn`] if the column is absent.
    pub fn column_values(&self, column: &str) -> Result<Vec<&str>> {
        let idx = self.require(column)?;
        Ok(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }

    /// Project onto `columns`, in the requested order.
    ///
    /// # Errors
    /// [`Error::MissingColumn`] if a requested column is absent,
    /// [`Error::DuplicateColumn`] if one is requested twice.
    pub fn select<S: AsRef<str>>(&self, columns: &[S]) -> Result<Self> {
        let names: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
        check_unique(&names)?;
        let indices = names
            .iter()
            .map(|c| self.require(c))
            .collect::<Result<Vec<_>>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Self {
            columns: names,
            rows,
        })
    }

    /// Append `column` filled with `value` unless it already exists.
    pub fn add_const_if_missing(&self, column: &str, value: &str) -> Self {
        if self.has_column(column) {
            return self.clone();
        }
        let mut columns = self.columns.clone();
        columns.push(column.to_string());
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                row.push(value.to_string());
                row
            })
            .collect();
        Self { columns, rows }
    }

    /// Concatenate the rows of `others` after this dataset's rows.
    ///
    /// Callers are expected to pass datasets with the identical column sequence;
    /// anything else is reported rather than silently misaligned.
    ///
    /// # Errors
    /// [`Error::EmptyArgument`] for an explicitly empty list,
    /// [`Error::SchemaMismatch`] if any header differs from this one.
    pub fn union(&self, others: impl Into<OneOrMany<Dataset>>) -> Result<Self> {
        let others = others.into().into_vec("union")?;
        if let Some(bad) = others.iter().find(|o| o.columns != self.columns) {
            return Err(Error::schema_mismatch("union", &self.columns, &bad.columns));
        }
        let mut parts = Vec::with_capacity(others.len() + 1);
        parts.push(self.clone());
        parts.extend(others);
        Ok(Self::from_uniform(self.columns.clone(), parts))
    }

    /// A lazy, finite, restartable view of the rows as name → value mappings.
    ///
    /// Each call starts from the first row; the returned iterator is `Clone`.
    pub fn export_to_records(&self) -> Records<'_> {
        Records {
            dataset: self,
            next: 0,
        }
    }

    /// Render as a JSON array of objects, one per row.
    pub fn to_json_records(&self) -> serde_json::Value {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let obj = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(c, v)| (c.clone(), serde_json::Value::String(v.clone())))
                    .collect::<serde_json::Map<_, _>>();
                serde_json::Value::Object(obj)
            })
            .collect();
        serde_json::Value::Array(rows)
    }

    /// Header line followed by one line per row.
    pub fn to_lines(&self, format: &TsvFormat) -> Vec<String> {
        let mut out = Vec::with_capacity(self.rows.len() + 1);
        out.push(format.join(&self.columns));
        out.extend(self.rows.iter().map(|r| format.join(r)));
        out
    }

    fn require(&self, column: &str) -> Result<usize> {
        self.column_index(column).ok_or_else(|| Error::MissingColumn {
            column: column.to_string(),
        })
    }
}

/// Iterator returned by [`Dataset::export_to_records`].
#[derive(Clone)]
pub struct Records<'a> {
    dataset: &'a Dataset,
    next: usize,
}

impl Iterator for Records<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        let row = self.dataset.rows.get(self.next)?;
        self.next += 1;
        Some(
            self.dataset
                .columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect(),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.dataset.rows.len() - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Records<'_> {}

/// Replace tab, newline, vertical tab, and carriage return with a space so the
/// value can be stored in a delimited field.
pub fn sanitize_value(value: &str) -> String {
    value.replace(['\t', '\n', '\u{0b}', '\r'], " ")
}

fn check_unique(columns: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(columns.len());
    for c in columns {
        if !seen.insert(c.as_str()) {
            return Err(Error::DuplicateColumn { column: c.clone() });
        }
    }
    Ok(())
}

fn check_arity(expected: usize, rows: &[Vec<String>]) -> Result<()> {
    match rows.iter().position(|r| r.len() != expected) {
        Some(row) => Err(Error::ArityViolation {
            row,
            expected,
            found: rows[row].len(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn people() -> Dataset {
        Dataset::new(
            vec!["id".into(), "name".into(), "age".into()],
            vec![
                vec!["1".into(), "alice".into(), "30".into()],
                vec!["2".into(), "bob".into(), "41".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn arity_violation_is_construction_error() {
        let err = Dataset::new(
            vec!["a".into(), "b".into()],
            vec![vec!["1".into(), "2".into()], vec!["3".into()]],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::ArityViolation {
                row: 1,
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn duplicate_header_rejected() {
        let err = Dataset::empty(vec!["a".into(), "a".into()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSchema);
    }

    #[test]
    fn select_reorders_and_rejects_missing() {
        let ds = people();
        let out = ds.select(&["age", "id"]).unwrap();
        assert_eq!(out.columns(), ["age", "id"]);
        assert_eq!(out.rows()[1], vec!["41".to_string(), "2".to_string()]);

        let err = ds.select(&["id", "email"]).unwrap_err();
        assert!(matches!(err, Error::MissingColumn { column } if column == "email"));
    }

    #[test]
    fn add_const_only_when_missing() {
        let ds = people();
        let same = ds.add_const_if_missing("name", "x");
        assert_eq!(same, ds);

        let with_city = ds.add_const_if_missing("city", "nyc");
        assert_eq!(with_city.columns().last().map(String::as_str), Some("city"));
        assert_eq!(with_city.column_values("city").unwrap(), ["nyc", "nyc"]);
        // source untouched
        assert_eq!(ds.num_columns(), 3);
    }

    #[test]
    fn union_accepts_one_or_many() {
        let ds = people();
        let single = ds.union(ds.clone()).unwrap();
        let list = ds.union(vec![ds.clone()]).unwrap();
        assert_eq!(single, list);
        assert_eq!(single.num_rows(), 4);

        let err = ds.union(Vec::<Dataset>::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyArgument);
    }

    #[test]
    fn union_rejects_reordered_header() {
        let ds = people();
        let reordered = ds.select(&["name", "id", "age"]).unwrap();
        let err = ds.union(reordered).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn records_are_restartable() {
        let ds = people();
        let first: Vec<Record> = ds.export_to_records().collect();
        let again: Vec<Record> = ds.export_to_records().collect();
        assert_eq!(first, again);
        assert_eq!(first[0]["name"], "alice");
        assert_eq!(ds.export_to_records().len(), 2);
    }

    #[test]
    fn from_records_sorts_keys_and_fills_blanks() {
        let a: Record = [("z", "1"), ("a", "2")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let b: Record = [("m".to_string(), "3".to_string())].into_iter().collect();
        let ds = Dataset::from_records([&a, &b]);
        assert_eq!(ds.columns(), ["a", "m", "z"]);
        assert_eq!(ds.rows()[1], vec!["", "3", ""]);
    }

    #[test]
    fn json_rendering() {
        let ds = people().select(&["id"]).unwrap();
        assert_eq!(
            ds.to_json_records(),
            serde_json::json!([{ "id": "1" }, { "id": "2" }])
        );
    }

    #[test]
    fn sanitize_strips_delimiters() {
        assert_eq!(sanitize_value("a\tb\nc\rd"), "a b c d");
    }
}
