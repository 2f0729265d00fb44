//! # tsvbeam
//!
//! Schema-reconciling scans over date-partitioned, tab-separated files.
//!
//! Data lands as one directory per day, each holding delimited text files that
//! share a header most of the time but drift as producers add columns. tsvbeam
//! reads a date range of such files in parallel, filters and rewrites records
//! on the way in, and merges everything into one [`Dataset`] even when the
//! headers disagree.
//!
//! ## Key Features
//!
//! - **Immutable datasets** - ordered unique columns over rows of text, arity checked at construction
//! - **Schema reconciliation** - identical, reordered and divergent headers, with optional default backfill
//! - **Bounded-parallel scheduler** - ordered results, exact deadlines, cancellation, all-or-nothing
//! - **Partition scans** - date range plus spillover, header pre-check, per-record transforms
//! - **Compression** - gzip and zstd detected by extension or magic bytes (feature flags)
//! - **Testing helpers** - fixtures, dataset assertions and an in-memory store
//!
//! ## Quick Start
//!
//! ```
//! use tsvbeam::*;
//!
//! # fn main() -> tsvbeam::Result<()> {
//! let a = Dataset::new(
//!     vec!["id".into(), "name".into()],
//!     vec![vec!["1".into(), "alice".into()]],
//! )?;
//! let b = Dataset::new(
//!     vec!["id".into(), "name".into(), "age".into()],
//!     vec![vec!["2".into(), "bob".into(), "41".into()]],
//! )?;
//!
//! // without defaults only the shared columns survive
//! assert_eq!(merge(vec![a.clone(), b.clone()], None)?.columns(), ["id", "name"]);
//!
//! // with defaults the missing column is backfilled
//! let defaults: DefaultValues = [("age".to_string(), "unknown".to_string())].into();
//! let merged = merge(vec![a, b], Some(&defaults))?;
//! assert_eq!(merged.column_values("age")?, ["unknown", "41"]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Scanning partitions
//!
//! ```no_run
//! use tsvbeam::*;
//!
//! # fn main() -> tsvbeam::Result<()> {
//! let options = ScanOptions::from_env(config::DEFAULT_ENV_PREFIX)?;
//! let ds = scan(
//!     "/data/events",
//!     io::parse_date("2024-01-01")?,
//!     io::parse_date("2024-01-31")?,
//!     "events",
//!     None,
//!     &options,
//! )?;
//! println!("{} rows", ds.num_rows());
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! Progress and reconciliation decisions are emitted through `tracing`; install
//! any subscriber to see them. [`logging::MessageCache`] deduplicates repeated
//! warnings in long-running callers.

pub mod args;
pub mod config;
pub mod dataset;
pub mod error;
pub mod io;
pub mod logging;
pub mod reconcile;
pub mod scan;
pub mod scheduler;
pub mod testing;

pub use args::OneOrMany;
pub use dataset::{Dataset, Record};
pub use error::{Error, ErrorKind, Result};
pub use io::TsvFormat;
pub use reconcile::{DefaultValues, SchemaReconcilePlan, merge, merge_intersect};
pub use scan::{PartitionScanner, ScanOptions, ScanReport, Transform, scan};
pub use scheduler::{CancellationToken, SchedulerConfig, Task, TaskScheduler, run_tasks};
