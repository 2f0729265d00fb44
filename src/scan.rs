//! Date-range scans over partitioned tabular files.
//!
//! A scan resolves the partitions covering a date range, checks that every
//! file shares one header, reads all files in parallel while applying a
//! per-record transform, and reconciles the per-file results into a single
//! [`Dataset`].
//!
//! The transform sees each row as a [`Record`] and returns `None` (or an empty
//! record) to drop it. It may rename, add or remove keys, so each file's header
//! is re-derived from what survives: keys the file's own header knows keep
//! that order, new keys follow in sorted order.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tsvbeam::Record;
//! use tsvbeam::io::parse_date;
//! use tsvbeam::scan::{ScanOptions, Transform, scan};
//!
//! # fn main() -> tsvbeam::Result<()> {
//! let only_errors: Transform =
//!     Arc::new(|r: Record| (r.get("level")? == "error").then_some(r));
//! let ds = scan(
//!     "/data/events",
//!     parse_date("2024-01-01")?,
//!     parse_date("2024-01-07")?,
//!     "events",
//!     Some(only_errors),
//!     &ScanOptions::default(),
//! )?;
//! println!("{} matching rows", ds.num_rows());
//! # Ok(())
//! # }
//! ```

use crate::config::{config_from_env, parse_env_value};
use crate::dataset::{Dataset, Record};
use crate::error::{Error, Result};
use crate::io::partitions::{DailyPartitionLister, PathLister};
use crate::io::tsv::{LineSource, LocalFs, TsvFormat, first_header_mismatch, read_dataset};
use crate::reconcile::{self, DefaultValues};
use crate::scheduler::{CancellationToken, SchedulerConfig, Task, TaskScheduler};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-record filter and rewrite; `None` drops the record.
pub type Transform = Arc<dyn Fn(Record) -> Option<Record> + Send + Sync>;

/// Settings for one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Extra days past `end` to include, for late-arriving partitions.
    pub spillover_window: u32,
    pub scheduler: SchedulerConfig,
    /// Backfill values used when per-file headers diverge.
    pub default_values: Option<DefaultValues>,
    pub format: TsvFormat,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            spillover_window: 1,
            scheduler: SchedulerConfig::default()
                .with_max_parallel(5)
                .with_poll_interval(Duration::from_secs(5))
                .with_timeout(Some(Duration::from_secs(600))),
            default_values: None,
            format: TsvFormat::default(),
        }
    }
}

impl ScanOptions {
    #[must_use]
    pub const fn with_spillover_window(mut self, days: u32) -> Self {
        self.spillover_window = days;
        self
    }

    #[must_use]
    pub const fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    #[must_use]
    pub fn with_default_values(mut self, defaults: DefaultValues) -> Self {
        self.default_values = Some(defaults);
        self
    }

    #[must_use]
    pub const fn with_format(mut self, format: TsvFormat) -> Self {
        self.format = format;
        self
    }

    /// Defaults overridden by `{prefix}SPILLOVER_WINDOW` and the scheduler
    /// variables read by [`SchedulerConfig::from_env`].
    ///
    /// # Errors
    /// Returns an error naming the variable if a value does not parse.
    pub fn from_env(prefix: &str) -> Result<Self> {
        let vars = config_from_env(prefix);
        let mut options = Self::default();
        options.scheduler = options.scheduler.overridden_by(&vars, prefix)?;
        if let Some(days) = parse_env_value::<u32>(&vars, prefix, "spillover_window")? {
            options.spillover_window = days;
        }
        Ok(options)
    }
}

/// What a scan touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Files read, in listing order.
    pub paths: Vec<String>,
    /// Surviving rows per file, aligned with `paths`.
    pub rows_per_path: Vec<usize>,
    pub elapsed: Duration,
}

/// One file after its transform ran.
struct PathResult {
    header: Vec<String>,
    dataset: Dataset,
}

/// Scans partitions listed by a [`PathLister`] and read through a [`LineSource`].
#[derive(Clone)]
pub struct PartitionScanner {
    lister: Arc<dyn PathLister>,
    source: Arc<dyn LineSource>,
    options: ScanOptions,
    cancel: CancellationToken,
}

impl PartitionScanner {
    pub fn new(lister: Arc<dyn PathLister>, source: Arc<dyn LineSource>) -> Self {
        Self {
            lister,
            source,
            options: ScanOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Daily partition directories on the local filesystem.
    pub fn local() -> Self {
        Self::new(Arc::new(DailyPartitionLister), Arc::new(LocalFs))
    }

    #[must_use]
    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    /// Abort the parallel read when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Scan `start ..= end` (plus spillover) under `root` for files starting with `prefix`.
    ///
    /// # Errors
    /// [`Error::EmptyInput`] if nothing is listed, [`Error::SchemaMismatch`]
    /// if listed files disagree on their header, and any read, scheduling or
    /// reconciliation error.
    pub fn scan(
        &self,
        root: &str,
        start: NaiveDate,
        end: NaiveDate,
        prefix: &str,
        transform: Option<Transform>,
    ) -> Result<Dataset> {
        self.scan_with_report(root, start, end, prefix, transform)
            .map(|(dataset, _)| dataset)
    }

    /// Like [`scan`](Self::scan), also reporting which files were read.
    ///
    /// # Errors
    /// See [`scan`](Self::scan).
    pub fn scan_with_report(
        &self,
        root: &str,
        start: NaiveDate,
        end: NaiveDate,
        prefix: &str,
        transform: Option<Transform>,
    ) -> Result<(Dataset, ScanReport)> {
        let started = Instant::now();
        let paths = self
            .lister
            .list_paths(root, start, end, prefix, self.options.spillover_window)?;
        if paths.is_empty() {
            return Err(Error::empty_input(format!(
                "scan: no files under {root} for {start}..={end} with prefix {prefix:?}"
            )));
        }
        check_headers(self.source.as_ref(), &paths, &self.options.format)?;

        let scheduler = &self.options.scheduler;
        info!(
            paths = paths.len(),
            max_parallel = scheduler.max_parallel,
            timeout = ?scheduler.timeout,
            "scanning partitions"
        );

        let tasks = paths
            .iter()
            .map(|path| {
                let source = Arc::clone(&self.source);
                let transform = transform.clone();
                let format = self.options.format;
                let task_path = path.clone();
                Task::new(move || {
                    Ok(read_transformed(source.as_ref(), &task_path, transform.as_ref(), &format)?)
                })
                .with_label(path.clone())
            })
            .collect();
        let results = TaskScheduler::new(*scheduler)
            .with_cancellation(self.cancel.clone())
            .run(tasks)
            .map_err(unwrap_task_error)?;

        let rows_per_path = results.iter().map(|r| r.dataset.num_rows()).collect();
        let dataset = combine(results, self.options.default_values.as_ref())?;
        debug!(rows = dataset.num_rows(), "scan merged");

        let report = ScanReport {
            paths,
            rows_per_path,
            elapsed: started.elapsed(),
        };
        Ok((dataset, report))
    }
}

/// Scan daily partitions on the local filesystem. See [`PartitionScanner::scan`].
///
/// # Errors
/// See [`PartitionScanner::scan`].
pub fn scan(
    root: &str,
    start: NaiveDate,
    end: NaiveDate,
    prefix: &str,
    transform: Option<Transform>,
    options: &ScanOptions,
) -> Result<Dataset> {
    PartitionScanner::local()
        .with_options(options.clone())
        .scan(root, start, end, prefix, transform)
}

/// Sequentially read `paths`, applying `transform`, and merge the results
/// exactly as a scan would.
///
/// # Errors
/// [`Error::EmptyArgument`] for an empty list, plus read and reconciliation errors.
pub fn read_filtered(
    source: &dyn LineSource,
    paths: &[String],
    transform: Option<&Transform>,
    format: &TsvFormat,
    default_values: Option<&DefaultValues>,
) -> Result<Dataset> {
    if paths.is_empty() {
        return Err(Error::EmptyArgument {
            context: "read_filtered".to_string(),
        });
    }
    let results = paths
        .iter()
        .map(|p| read_transformed(source, p, transform, format))
        .collect::<Result<Vec<_>>>()?;
    combine(results, default_values)
}

fn check_headers(source: &dyn LineSource, paths: &[String], format: &TsvFormat) -> Result<()> {
    match first_header_mismatch(source, paths)? {
        Some((path, expected, found)) => {
            warn!(path = %path, "header differs from first listed file");
            Err(Error::schema_mismatch(
                format!("scan: header of {path}"),
                &format.split_header(&expected),
                &format.split_header(&found),
            ))
        }
        None => Ok(()),
    }
}

fn read_transformed(
    source: &dyn LineSource,
    path: &str,
    transform: Option<&Transform>,
    format: &TsvFormat,
) -> Result<PathResult> {
    let raw = read_dataset(source, path, format)?;
    let header = raw.columns().to_vec();
    let Some(transform) = transform else {
        debug!(path, rows = raw.num_rows(), "read");
        return Ok(PathResult { header, dataset: raw });
    };

    let surviving: Vec<Record> = raw
        .export_to_records()
        .filter_map(|r| transform(r))
        .filter(|r| !r.is_empty())
        .collect();
    debug!(path, read = raw.num_rows(), kept = surviving.len(), "read with transform");
    if surviving.is_empty() {
        return Ok(PathResult {
            header,
            dataset: Dataset::empty(Vec::new())?,
        });
    }

    let columns = derive_header(&header, &surviving);
    let rows = surviving
        .iter()
        .enumerate()
        .map(|(row, r)| record_to_row(&columns, row, r))
        .collect::<Result<Vec<_>>>()
        .inspect_err(|e| warn!(path, error = %e, "transform emitted records with differing keys"))?;
    Ok(PathResult {
        header,
        dataset: Dataset::new(columns, rows)?,
    })
}

/// Lay `record` out along `columns`; a record lacking any of them is rejected, never padded.
fn record_to_row(columns: &[String], row: usize, record: &Record) -> Result<Vec<String>> {
    columns
        .iter()
        .map(|c| record.get(c).cloned())
        .collect::<Option<Vec<_>>>()
        .ok_or(Error::ArityViolation {
            row,
            expected: columns.len(),
            found: record.len(),
        })
}

/// Known columns in `original` order, then keys the transform introduced, sorted.
fn derive_header(original: &[String], records: &[Record]) -> Vec<String> {
    let emitted: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.keys().map(String::as_str))
        .collect();
    let known: HashSet<&str> = original.iter().map(String::as_str).collect();

    original
        .iter()
        .filter(|c| emitted.contains(c.as_str()))
        .cloned()
        .chain(
            emitted
                .iter()
                .filter(|k| !known.contains(*k))
                .map(|k| (*k).to_string()),
        )
        .collect()
}

fn combine(results: Vec<PathResult>, default_values: Option<&DefaultValues>) -> Result<Dataset> {
    if results.iter().all(|r| r.dataset.is_empty()) {
        let mut common: Vec<String> = results.first().map(|r| r.header.clone()).unwrap_or_default();
        for r in results.iter().skip(1) {
            common.retain(|c| r.header.contains(c));
        }
        debug!(columns = ?common, "no rows survived; returning empty dataset");
        return Dataset::empty(common);
    }
    reconcile::merge(results.into_iter().map(|r| r.dataset).collect(), default_values)
}

/// Surface the crate error a task returned instead of the wrapper.
fn unwrap_task_error(err: Error) -> Error {
    match err {
        Error::TaskFailed { index, source } => match source.downcast::<Error>() {
            Ok(inner) => inner,
            Err(source) => Error::TaskFailed { index, source },
        },
        other => other,
    }
}
