//! Assertion functions for datasets.

use crate::dataset::Dataset;

/// Assert that two datasets have the same header and the same rows in order.
///
/// # Panics
///
/// Panics with the first differing row if the datasets differ.
///
/// # Example
///
/// ```
/// use tsvbeam::testing::{assert_dataset_eq, dataset};
///
/// let a = dataset(&["k"], &[&["1"]]);
/// assert_dataset_eq(&a, &a.clone());
/// ```
pub fn assert_dataset_eq(actual: &Dataset, expected: &Dataset) {
    assert_header(actual, expected.columns());
    assert_eq!(
        actual.num_rows(),
        expected.num_rows(),
        "Row count mismatch:\n  Expected: {}\n  Actual: {}\n  Expected rows: {:?}\n  Actual rows: {:?}",
        expected.num_rows(),
        actual.num_rows(),
        expected.rows(),
        actual.rows()
    );
    for (i, (a, e)) in actual.rows().iter().zip(expected.rows()).enumerate() {
        assert_eq!(a, e, "Row mismatch at index {i}:\n  Expected: {e:?}\n  Actual: {a:?}");
    }
}

/// Assert the dataset's column names, in order.
///
/// # Panics
///
/// Panics if the header differs.
pub fn assert_header<S: AsRef<str>>(actual: &Dataset, expected: &[S]) {
    let expected: Vec<&str> = expected.iter().map(AsRef::as_ref).collect();
    assert_eq!(
        actual.columns(),
        expected.as_slice(),
        "Header mismatch:\n  Expected: {expected:?}\n  Actual: {:?}",
        actual.columns()
    );
}

/// Assert every value of one column, in row order.
///
/// # Panics
///
/// Panics if the column is missing or its values differ.
pub fn assert_column_values(actual: &Dataset, column: &str, expected: &[&str]) {
    let values = match actual.column_values(column) {
        Ok(v) => v,
        Err(e) => panic!("Column {column:?} not found: {e}\n  Header: {:?}", actual.columns()),
    };
    assert_eq!(
        values, expected,
        "Values mismatch in column {column:?}:\n  Expected: {expected:?}\n  Actual: {values:?}"
    );
}
