//! Environment-driven configuration.
//!
//! Configuration structs ([`SchedulerConfig`](crate::scheduler::SchedulerConfig),
//! [`ScanOptions`](crate::scan::ScanOptions)) carry code defaults and can be
//! overridden from `PREFIX_*` environment variables, e.g. `TSVBEAM_MAX_PARALLEL=8`.

use crate::error::Result;
use anyhow::anyhow;
use std::collections::HashMap;
use std::str::FromStr;

pub const DEFAULT_ENV_PREFIX: &str = "TSVBEAM_";

/// Collect every `{prefix}*` variable, keyed by the lower-cased remainder.
#[must_use]
pub fn config_from_env(prefix: &str) -> HashMap<String, String> {
    std::env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix(prefix)
                .map(|name| (name.to_lowercase(), value))
        })
        .collect()
}

/// Parse `vars[key]` if present.
///
/// # Errors
/// Returns an error naming `{prefix}{KEY}` when the value does not parse.
pub(crate) fn parse_env_value<T>(
    vars: &HashMap<String, String>,
    prefix: &str,
    key: &str,
) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = vars.get(key) else {
        return Ok(None);
    };
    raw.trim().parse::<T>().map(Some).map_err(|e| {
        anyhow!(
            "invalid value {raw:?} for {prefix}{}: {e}",
            key.to_uppercase()
        )
        .into()
    })
}
