//! Pre-built datasets and partition trees for common test scenarios.

use crate::dataset::Dataset;
use crate::io::tsv::{TsvFormat, write_dataset};
use std::path::Path;

/// Build a dataset from string slices.
///
/// # Panics
///
/// Panics if a row's length differs from the header's or a column repeats.
///
/// # Example
///
/// ```
/// use tsvbeam::testing::dataset;
///
/// let ds = dataset(&["id", "name"], &[&["1", "alice"]]);
/// assert_eq!(ds.num_rows(), 1);
/// ```
#[must_use]
pub fn dataset(columns: &[&str], rows: &[&[&str]]) -> Dataset {
    Dataset::new(
        columns.iter().map(|c| (*c).to_string()).collect(),
        rows.iter()
            .map(|r| r.iter().map(|v| (*v).to_string()).collect())
            .collect(),
    )
    .expect("fixture rows must match the header")
}

/// Three one-row datasets with headers `id,name`, `id,name,age` and `id,name`.
#[must_use]
pub fn people_trio() -> Vec<Dataset> {
    vec![
        dataset(&["id", "name"], &[&["1", "alice"]]),
        dataset(&["id", "name", "age"], &[&["2", "bob", "41"]]),
        dataset(&["id", "name"], &[&["3", "carol"]]),
    ]
}

/// Application events for one day: `ts`, `user`, `level`, `msg`.
///
/// Every third event is an `error`; timestamps are prefixed with `day`.
#[must_use]
pub fn sample_events(day: &str, count: usize) -> Dataset {
    let rows = (0..count)
        .map(|i| {
            let level = if i % 3 == 2 { "error" } else { "info" };
            vec![
                format!("{day}T{:02}:00:00", i % 24),
                format!("user{}", i % 4),
                level.to_string(),
                format!("event {i}"),
            ]
        })
        .collect();
    Dataset::new(
        ["ts", "user", "level", "msg"].map(String::from).to_vec(),
        rows,
    )
    .expect("sample events are well formed")
}

/// Write `files` (relative path, dataset) under `root` as tab-separated files.
///
/// # Errors
///
/// Returns an error if a file cannot be written.
pub fn write_partition_tree(root: &Path, files: &[(&str, &Dataset)]) -> crate::Result<()> {
    for (rel, ds) in files {
        write_dataset(root.join(rel), ds, &TsvFormat::default())?;
    }
    Ok(())
}
