//! In-memory storage for exercising scans without files.
//!
//! [`InMemoryStore`] is both a [`PathLister`] and a [`LineSource`]. Objects are
//! keyed by `<root>/<partition>/<file>` exactly like the on-disk layout read
//! by [`DailyPartitionLister`](crate::io::DailyPartitionLister), and individual
//! objects can be made slow or failing.

use crate::dataset::Dataset;
use crate::error::Result;
use crate::io::partitions::{PathLister, parse_partition_name, scan_window_end};
use crate::io::tsv::{LineSource, TsvFormat, is_tabular_path};
use anyhow::bail;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct StoreInner {
    objects: BTreeMap<String, Vec<String>>,
    latency: HashMap<String, Duration>,
    failures: HashMap<String, String>,
}

/// Thread-safe in-memory object store.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tsvbeam::io::parse_date;
/// use tsvbeam::scan::PartitionScanner;
/// use tsvbeam::testing::{InMemoryStore, sample_events};
///
/// # fn main() -> tsvbeam::Result<()> {
/// let store = Arc::new(InMemoryStore::new());
/// store.insert_dataset("bucket/2024-01-01/events.tsv", &sample_events("2024-01-01", 3));
///
/// let ds = PartitionScanner::new(store.clone(), store.clone()).scan(
///     "bucket",
///     parse_date("2024-01-01")?,
///     parse_date("2024-01-01")?,
///     "events",
///     None,
/// )?;
/// assert_eq!(ds.num_rows(), 3);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<StoreInner>,
    reads: AtomicUsize,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Store raw lines (header first) at `path`.
    pub fn insert<S: AsRef<str>>(&self, path: &str, lines: &[S]) {
        let lines = lines.iter().map(|l| l.as_ref().to_string()).collect();
        self.lock().objects.insert(path.to_string(), lines);
    }

    /// Store `dataset` as tab-separated lines at `path`.
    pub fn insert_dataset(&self, path: &str, dataset: &Dataset) {
        self.insert(path, &dataset.to_lines(&TsvFormat::default()));
    }

    /// Delay every full read of `path`. Header reads are not delayed.
    pub fn set_latency(&self, path: &str, latency: Duration) {
        self.lock().latency.insert(path.to_string(), latency);
    }

    /// Make every read of `path` fail with `message`.
    pub fn fail_reads(&self, path: &str, message: &str) {
        self.lock()
            .failures
            .insert(path.to_string(), message.to_string());
    }

    /// Number of full reads served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LineSource for InMemoryStore {
    fn read_lines(&self, path: &str) -> anyhow::Result<Vec<String>> {
        let (latency, outcome) = {
            let inner = self.lock();
            let outcome = match inner.failures.get(path) {
                Some(message) => Err(message.clone()),
                None => Ok(inner.objects.get(path).cloned()),
            };
            (inner.latency.get(path).copied(), outcome)
        };
        if let Some(latency) = latency {
            thread::sleep(latency);
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        match outcome {
            Err(message) => bail!("{path}: {message}"),
            Ok(None) => bail!("no such object: {path}"),
            Ok(Some(lines)) => Ok(lines),
        }
    }

    fn read_header(&self, path: &str) -> anyhow::Result<String> {
        let inner = self.lock();
        if let Some(message) = inner.failures.get(path) {
            bail!("{path}: {message}");
        }
        match inner.objects.get(path) {
            Some(lines) => Ok(lines.first().cloned().unwrap_or_default()),
            None => bail!("no such object: {path}"),
        }
    }
}

impl PathLister for InMemoryStore {
    fn list_paths(
        &self,
        root: &str,
        start: NaiveDate,
        end: NaiveDate,
        prefix: &str,
        spillover_window: u32,
    ) -> Result<Vec<String>> {
        let last = scan_window_end(start, end, spillover_window)?;
        let root = root.trim_end_matches('/');
        let mut found: Vec<(NaiveDate, String)> = self
            .lock()
            .objects
            .keys()
            .filter_map(|key| {
                let rest = key.strip_prefix(root)?.strip_prefix('/')?;
                let (partition, file) = rest.split_once('/')?;
                let date = parse_partition_name(partition)?;
                let keep = (start..=last).contains(&date)
                    && !file.contains('/')
                    && file.starts_with(prefix)
                    && is_tabular_path(file);
                keep.then(|| (date, key.clone()))
            })
            .collect();
        found.sort();
        Ok(found.into_iter().map(|(_, path)| path).collect())
    }
}
