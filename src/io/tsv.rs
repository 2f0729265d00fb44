//! Line-oriented delimited text I/O.
//!
//! A file holds one header line followed by one line per row, fields separated
//! by a single delimiter (tab by default). There is no quoting or escaping: a
//! value containing the delimiter or a newline must be cleaned with
//! [`sanitize_value`](crate::dataset::sanitize_value) before it is stored.
//!
//! Reads go through the [`LineSource`] trait so the scanner can run against the
//! local filesystem ([`LocalFs`]) or any other store. Compressed files are
//! handled transparently by [`crate::io::compression`].

use crate::args::OneOrMany;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::io::compression::{FinishWrite, auto_detect_reader, auto_detect_writer, known_extensions};
use crate::reconcile;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::{File, create_dir_all};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Field delimiter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TsvFormat {
    pub delimiter: char,
}

impl Default for TsvFormat {
    fn default() -> Self {
        Self { delimiter: '\t' }
    }
}

impl TsvFormat {
    #[must_use]
    pub const fn with_delimiter(delimiter: char) -> Self {
        Self { delimiter }
    }

    /// Split a data line into fields. An empty line is one empty field.
    pub fn split(&self, line: &str) -> Vec<String> {
        line.split(self.delimiter).map(str::to_string).collect()
    }

    /// Split a header line into column names. An empty line has no columns.
    pub fn split_header(&self, line: &str) -> Vec<String> {
        if line.is_empty() {
            Vec::new()
        } else {
            self.split(line)
        }
    }

    pub fn join<S: AsRef<str>>(&self, fields: &[S]) -> String {
        let mut out = String::new();
        for (i, f) in fields.iter().enumerate() {
            if i > 0 {
                out.push(self.delimiter);
            }
            out.push_str(f.as_ref());
        }
        out
    }
}

/// Where raw lines come from.
pub trait LineSource: Send + Sync {
    /// All lines of `path`, header first, without line terminators.
    ///
    /// # Errors
    /// Returns an error if the location cannot be read.
    fn read_lines(&self, path: &str) -> anyhow::Result<Vec<String>>;

    /// Only the header line; empty for an empty file.
    ///
    /// # Errors
    /// Returns an error if the location cannot be read.
    fn read_header(&self, path: &str) -> anyhow::Result<String> {
        Ok(self.read_lines(path)?.into_iter().next().unwrap_or_default())
    }
}

/// Local filesystem [`LineSource`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LineSource for LocalFs {
    fn read_lines(&self, path: &str) -> anyhow::Result<Vec<String>> {
        read_lines(path)
    }

    fn read_header(&self, path: &str) -> anyhow::Result<String> {
        let mut lines = open_lines(Path::new(path))?;
        match lines.next() {
            Some(line) => Ok(strip_cr(line.with_context(|| format!("read header of {path}"))?)),
            None => Ok(String::new()),
        }
    }
}

fn open_lines(path: &Path) -> anyhow::Result<std::io::Lines<BufReader<Box<dyn std::io::Read>>>> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let rdr = auto_detect_reader(f, path)
        .with_context(|| format!("setup decompression for {}", path.display()))?;
    Ok(BufReader::new(rdr).lines())
}

fn strip_cr(mut line: String) -> String {
    if line.ends_with('\r') {
        line.pop();
    }
    line
}

/// Read every line of a local (optionally compressed) file.
///
/// # Errors
/// Returns an error if the file cannot be opened or decoded.
pub fn read_lines(path: impl AsRef<Path>) -> anyhow::Result<Vec<String>> {
    let path = path.as_ref();
    open_lines(path)?
        .enumerate()
        .map(|(i, line)| {
            line.map(strip_cr)
                .with_context(|| format!("read line #{} of {}", i + 1, path.display()))
        })
        .collect()
}

/// Write lines to a local file, creating parent directories and compressing by extension.
///
/// # Returns
/// The number of lines written.
///
/// # Errors
/// Returns an error if the file or directories cannot be created or written.
pub fn write_lines<S: AsRef<str>>(path: impl AsRef<Path>, lines: &[S]) -> anyhow::Result<usize> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = auto_detect_writer(f, path)
        .with_context(|| format!("setup compression for {}", path.display()))?;
    for line in lines {
        w.write_all(line.as_ref().as_bytes())?;
        w.write_all(b"\n")?;
    }
    w.finish_dyn()
        .with_context(|| format!("finish {}", path.display()))?;
    Ok(lines.len())
}

/// Read one location into a [`Dataset`]. An empty file yields a zero-column dataset.
///
/// # Errors
/// I/O failures, or [`Error::ArityViolation`](crate::Error::ArityViolation) /
/// [`Error::DuplicateColumn`](crate::Error::DuplicateColumn) for malformed content.
pub fn read_dataset(source: &dyn LineSource, path: &str, format: &TsvFormat) -> Result<Dataset> {
    let lines = source.read_lines(path)?;
    let Some((header, data)) = lines.split_first() else {
        return Dataset::empty(Vec::new());
    };
    Dataset::from_lines(header, data, format).inspect_err(|e| {
        tracing::error!(path, error = %e, "malformed tabular file");
    })
}

/// Write `dataset` to a local file, header first.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_dataset(path: impl AsRef<Path>, dataset: &Dataset, format: &TsvFormat) -> Result<usize> {
    let path = path.as_ref();
    let written = write_lines(path, &dataset.to_lines(format))?;
    tracing::debug!(path = %path.display(), rows = dataset.num_rows(), "dataset saved");
    Ok(written)
}

/// Read one or many locations and merge them with [`reconcile::merge`].
///
/// # Errors
/// [`Error::EmptyArgument`](crate::Error::EmptyArgument) for an empty list, plus
/// read and merge errors.
pub fn read_datasets(
    source: &dyn LineSource,
    paths: impl Into<OneOrMany<String>>,
    format: &TsvFormat,
) -> Result<Dataset> {
    let paths = paths.into().into_vec("read_datasets")?;
    let datasets = paths
        .iter()
        .map(|p| read_dataset(source, p, format))
        .collect::<Result<Vec<_>>>()?;
    reconcile::merge(datasets, None)
}

/// True when every location has the same header line as the first.
///
/// # Errors
/// Returns an error if a header cannot be read.
pub fn has_same_headers(source: &dyn LineSource, paths: &[String]) -> Result<bool> {
    Ok(first_header_mismatch(source, paths)?.is_none())
}

/// The first path whose header differs from `paths[0]`, with both headers.
pub(crate) fn first_header_mismatch(
    source: &dyn LineSource,
    paths: &[String],
) -> Result<Option<(String, String, String)>> {
    let Some((first, rest)) = paths.split_first() else {
        return Ok(None);
    };
    let expected = source.read_header(first)?;
    for path in rest {
        let found = source.read_header(path)?;
        if found != expected {
            return Ok(Some((path.clone(), expected, found)));
        }
    }
    Ok(None)
}

/// `.tsv` or `.csv`, optionally followed by a registered compression extension.
pub fn is_tabular_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    let stem = known_extensions()
        .iter()
        .find_map(|ext| lower.strip_suffix(ext.as_str()))
        .unwrap_or(&lower);
    stem.ends_with(".tsv") || stem.ends_with(".csv")
}
