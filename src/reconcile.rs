//! Schema reconciliation: merging datasets whose headers differ.
//!
//! [`merge`] dispatches on how the headers relate:
//!
//! 1. identical headers (same names, same order) are concatenated as-is;
//! 2. the same column set in a different order is projected onto the common
//!    columns and concatenated;
//! 3. anything else is a true mismatch and goes through [`merge_intersect`],
//!    which either drops the diff columns or backfills them from
//!    `default_values`.
//!
//! Every path ends in one uniform-header concatenation. Column order is decided
//! by precedence: common columns follow the first dataset's header, diff columns
//! follow first-seen order scanning inputs left to right. Because of that,
//! `merge([a, b])` and `merge([b, a])` may disagree on header order when `a`
//! and `b` carry different extra columns.

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Fill values for columns some inputs lack, keyed by column name.
pub type DefaultValues = HashMap<String, String>;

/// Column split computed once per reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReconcilePlan {
    /// Columns present in every input, in the first input's order.
    pub common_columns: Vec<String>,
    /// Columns present in some but not all inputs, in first-seen order.
    pub diff_columns: Vec<String>,
}

impl SchemaReconcilePlan {
    pub fn compute(datasets: &[Dataset]) -> Self {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut seen_order: Vec<&str> = Vec::new();
        for ds in datasets {
            for col in ds.columns() {
                let n = counts.entry(col.as_str()).or_insert(0);
                if *n == 0 {
                    seen_order.push(col.as_str());
                }
                *n += 1;
            }
        }

        let total = datasets.len();
        let common_columns = datasets
            .first()
            .map(|first| {
                first
                    .columns()
                    .iter()
                    .filter(|c| counts.get(c.as_str()) == Some(&total))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let diff_columns = seen_order
            .into_iter()
            .filter(|c| counts.get(c) != Some(&total))
            .map(str::to_string)
            .collect();

        Self {
            common_columns,
            diff_columns,
        }
    }

    /// True when every input carries the same column set.
    pub fn is_uniform(&self) -> bool {
        self.diff_columns.is_empty()
    }

    /// `common_columns` followed by `diff_columns`.
    pub fn superset_columns(&self) -> Vec<String> {
        self.common_columns
            .iter()
            .chain(&self.diff_columns)
            .cloned()
            .collect()
    }

    /// Every default key must name a column some input carries.
    ///
    /// # Errors
    /// [`Error::InvalidDefaultColumn`] for the first unknown key (in sorted order).
    pub fn validate_defaults(&self, defaults: &DefaultValues) -> Result<()> {
        let known: HashSet<&str> = self
            .common_columns
            .iter()
            .chain(&self.diff_columns)
            .map(String::as_str)
            .collect();
        let mut unknown: Vec<&String> = defaults
            .keys()
            .filter(|k| !known.contains(k.as_str()))
            .collect();
        unknown.sort();
        match unknown.first() {
            Some(column) => Err(Error::InvalidDefaultColumn {
                column: (*column).clone(),
            }),
            None => Ok(()),
        }
    }

    /// Fill value for each diff column; columns without an explicit default get `""`.
    pub fn resolve_defaults<'a>(&'a self, defaults: &'a DefaultValues) -> Vec<(&'a str, &'a str)> {
        self.diff_columns
            .iter()
            .map(|col| {
                let value = match defaults.get(col) {
                    Some(v) => {
                        debug!(column = %col, value = %v, "backfilling with default value");
                        v.as_str()
                    }
                    None => {
                        debug!(column = %col, "backfilling with empty string");
                        ""
                    }
                };
                (col.as_str(), value)
            })
            .collect()
    }
}

/// Merge datasets into one, reconciling differing headers.
///
/// Zero-column datasets are ignored.
///
/// # Errors
/// [`Error::EmptyInput`] if nothing usable remains,
/// [`Error::InvalidDefaultColumn`] if a default names a column no input has,
/// plus anything [`merge_intersect`] reports on the mismatch path.
pub fn merge(datasets: Vec<Dataset>, default_values: Option<&DefaultValues>) -> Result<Dataset> {
    let datasets: Vec<Dataset> = datasets
        .into_iter()
        .filter(|d| d.num_columns() > 0)
        .collect();
    let Some(first) = datasets.first() else {
        return Err(Error::empty_input("merge"));
    };

    let plan = SchemaReconcilePlan::compute(&datasets);
    if let Some(defaults) = default_values {
        plan.validate_defaults(defaults)?;
    }

    let header = first.columns().to_vec();
    if datasets.iter().all(|d| d.columns() == header.as_slice()) {
        return Ok(Dataset::from_uniform(header, datasets));
    }

    if plan.is_uniform() {
        warn!(columns = ?plan.common_columns, "header order differs between inputs; reordering");
        return concat_projected(datasets, plan.common_columns);
    }

    warn!(diff = ?plan.diff_columns, "header mismatch between inputs; reconciling");
    merge_intersect(datasets, default_values)
}

/// Reconcile datasets with divergent headers.
///
/// Default keys are checked against every input's header. Zero-row datasets
/// are then ignored, and a default naming a column only they carried goes
/// unused. Without `default_values` the result keeps
/// only the columns common to all inputs. With `default_values`, every input is
/// backfilled to `common_columns ++ diff_columns`, diff columns lacking an
/// explicit default filling with `""`.
///
/// # Errors
/// [`Error::EmptyInput`] if no dataset has rows or the inputs share no column,
/// [`Error::InvalidDefaultColumn`] if a default names an unknown column.
pub fn merge_intersect(
    datasets: Vec<Dataset>,
    default_values: Option<&DefaultValues>,
) -> Result<Dataset> {
    if datasets.is_empty() {
        return Err(Error::empty_input("merge_intersect"));
    }
    if let Some(defaults) = default_values {
        SchemaReconcilePlan::compute(&datasets).validate_defaults(defaults)?;
    }

    let datasets: Vec<Dataset> = datasets.into_iter().filter(|d| !d.is_empty()).collect();
    if datasets.is_empty() {
        return Err(Error::empty_input("merge_intersect"));
    }

    let plan = SchemaReconcilePlan::compute(&datasets);

    match default_values {
        Some(defaults) if !plan.is_uniform() => {
            let fills = plan.resolve_defaults(defaults);
            let backfilled = datasets
                .iter()
                .map(|ds| {
                    fills
                        .iter()
                        .fold(ds.clone(), |acc, (col, val)| acc.add_const_if_missing(col, val))
                })
                .collect();
            concat_projected(backfilled, plan.superset_columns())
        }
        _ => {
            if !plan.is_uniform() {
                warn!(dropped = ?plan.diff_columns, "dropping columns missing from some inputs");
            }
            concat_projected(datasets, plan.common_columns)
        }
    }
}

/// Project every dataset onto `columns` and concatenate in input order.
fn concat_projected(datasets: Vec<Dataset>, columns: Vec<String>) -> Result<Dataset> {
    if columns.is_empty() {
        return Err(Error::empty_input("merge: inputs share no columns"));
    }
    let parts = datasets
        .iter()
        .map(|ds| ds.select(&columns))
        .collect::<Result<Vec<_>>>()?;
    Ok(Dataset::from_uniform(columns, parts))
}
