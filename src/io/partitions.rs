//! Date-partitioned path listing.
//!
//! Scans read data laid out as one directory per day:
//!
//! ```text
//! <root>/2024-01-05/events-00.tsv.gz
//! <root>/20240106/events-00.tsv
//! <root>/dt=2024-01-07/events-00.tsv
//! ```
//!
//! [`DailyPartitionLister`] resolves a date range to the tabular files under
//! the matching partitions. The spillover window extends the range past `end`
//! by that many days so late-arriving rows filed under a later partition are
//! still picked up.

use crate::error::{Error, Result};
use crate::io::tsv::is_tabular_path;
use anyhow::Context;
use chrono::{Days, NaiveDate};
use glob::{Pattern, glob};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

static PARTITION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:dt=)?(\d{4})-?(\d{2})-?(\d{2})$").expect("valid partition regex")
});

/// Resolves a date range to an ordered list of file locations.
pub trait PathLister: Send + Sync {
    /// Locations under `root` whose partition falls in
    /// `start ..= end + spillover_window` days and whose file name starts with `prefix`.
    ///
    /// # Errors
    /// Returns an error for a reversed range or when the store cannot be listed.
    fn list_paths(
        &self,
        root: &str,
        start: NaiveDate,
        end: NaiveDate,
        prefix: &str,
        spillover_window: u32,
    ) -> Result<Vec<String>>;
}

/// Parse `YYYY-MM-DD` or `YYYYMMDD` (an optional `dt=` prefix is accepted).
///
/// # Errors
/// [`Error::InvalidArgument`] if `s` is not a valid calendar date in either form.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    parse_partition_name(s.trim())
        .ok_or_else(|| Error::invalid_argument(format!("unparseable date {s:?}")))
}

pub(crate) fn parse_partition_name(name: &str) -> Option<NaiveDate> {
    let caps = PARTITION_NAME.captures(name)?;
    let year = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    let day = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Last partition date covered by a scan, spillover included.
///
/// # Errors
/// [`Error::InvalidArgument`] if `start > end` or the window overflows the calendar.
pub fn scan_window_end(start: NaiveDate, end: NaiveDate, spillover_window: u32) -> Result<NaiveDate> {
    if start > end {
        return Err(Error::invalid_argument(format!(
            "start date {start} is after end date {end}"
        )));
    }
    end.checked_add_days(Days::new(u64::from(spillover_window)))
        .ok_or_else(|| Error::invalid_argument(format!("spillover window {spillover_window} out of range")))
}

/// Local-filesystem lister over daily partition directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct DailyPartitionLister;

impl DailyPartitionLister {
    fn partitions(root: &Path, start: NaiveDate, last: NaiveDate) -> Result<Vec<(NaiveDate, PathBuf)>> {
        let entries =
            std::fs::read_dir(root).with_context(|| format!("list partitions of {}", root.display()))?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("read entry of {}", root.display()))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(date) = parse_partition_name(&name.to_string_lossy())
                && (start..=last).contains(&date)
            {
                out.push((date, path));
            }
        }
        out.sort();
        Ok(out)
    }

    fn files_in(dir: &Path, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!(
            "{}/{}*",
            Pattern::escape(&dir.to_string_lossy()),
            Pattern::escape(prefix)
        );
        let mut files = Vec::new();
        for entry in glob(&pattern).with_context(|| format!("invalid glob pattern: {pattern}"))? {
            let path = entry.with_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
            let location = path.to_string_lossy().to_string();
            if path.is_file() && is_tabular_path(&location) {
                files.push(location);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl PathLister for DailyPartitionLister {
    fn list_paths(
        &self,
        root: &str,
        start: NaiveDate,
        end: NaiveDate,
        prefix: &str,
        spillover_window: u32,
    ) -> Result<Vec<String>> {
        let last = scan_window_end(start, end, spillover_window)?;
        let partitions = Self::partitions(Path::new(root), start, last)?;
        debug!(root, %start, %last, partitions = partitions.len(), "resolved partitions");

        let mut paths = Vec::new();
        for (_, dir) in &partitions {
            paths.extend(Self::files_in(dir, prefix)?);
        }
        Ok(paths)
    }
}
