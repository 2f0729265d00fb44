//! Log helpers layered over `tracing`.
//!
//! The crate emits `tracing` events and installs no subscriber. [`MessageCache`]
//! provides "log once" behaviour through an explicitly owned, bounded cache
//! instead of process-global state, so it can be shared by reference (or `Arc`)
//! with worker tasks.

use crate::error::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// Bounded message dedup cache.
///
/// Remembers up to `capacity` distinct messages; inserting past capacity evicts
/// the oldest entry, after which that message may be emitted again.
#[derive(Debug)]
pub struct MessageCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    counts: HashMap<String, usize>,
    order: VecDeque<String>,
}

impl CacheInner {
    /// Bump the counter for `msg`, returning the new count.
    fn hit(&mut self, msg: &str, capacity: usize) -> usize {
        if let Some(n) = self.counts.get_mut(msg) {
            *n += 1;
            return *n;
        }
        while self.order.len() >= capacity {
            match self.order.pop_front() {
                Some(old) => {
                    self.counts.remove(&old);
                }
                None => break,
            }
        }
        self.counts.insert(msg.to_string(), 1);
        self.order.push_back(msg.to_string());
        1
    }

    fn forget(&mut self, msg: &str) {
        self.counts.remove(msg);
        self.order.retain(|m| m != msg);
    }
}

impl Default for MessageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl MessageCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of distinct messages currently remembered.
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.counts.clear();
        inner.order.clear();
    }

    /// Returns `true` if the message was emitted.
    pub fn debug_once(&self, msg: &str) -> bool {
        self.once(Level::Debug, msg)
    }

    pub fn info_once(&self, msg: &str) -> bool {
        self.once(Level::Info, msg)
    }

    pub fn warn_once(&self, msg: &str) -> bool {
        self.once(Level::Warn, msg)
    }

    pub fn error_once(&self, msg: &str) -> bool {
        self.once(Level::Error, msg)
    }

    /// Warn about `msg` until it has been seen `limit` times, then fail.
    ///
    /// The counter for `msg` is reset when the error is returned.
    ///
    /// # Errors
    /// [`Error::WarningLimitExceeded`] on the `limit`-th occurrence.
    pub fn warn_then_fail(&self, msg: &str, limit: usize) -> Result<()> {
        let count = {
            let mut inner = self.lock();
            let count = inner.hit(msg, self.capacity);
            if count >= limit {
                inner.forget(msg);
            }
            count
        };
        if count >= limit {
            let message = truncate_message(msg, DEFAULT_MAX_MESSAGE_LEN);
            tracing::error!(count, "{message}");
            return Err(Error::WarningLimitExceeded { message, count });
        }
        if count == 1 {
            tracing::warn!("{msg}");
        } else {
            tracing::trace!(count, "{msg}");
        }
        Ok(())
    }

    fn once(&self, level: Level, msg: &str) -> bool {
        let first = self.lock().hit(msg, self.capacity) == 1;
        if !first {
            tracing::trace!("{msg}");
            return false;
        }
        match level {
            Level::Debug => tracing::debug!(once = true, "{msg}"),
            Level::Info => tracing::info!(once = true, "{msg}"),
            Level::Warn => tracing::warn!(once = true, "{msg}"),
            Level::Error => tracing::error!(once = true, "{msg}"),
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Clip `msg` to `max_len` characters, marking the cut with `" ..."`.
pub fn truncate_message(msg: &str, max_len: usize) -> String {
    match msg.char_indices().nth(max_len) {
        Some((cut, _)) if max_len > 0 => format!("{} ...", &msg[..cut]),
        _ => msg.to_string(),
    }
}

/// Extend a `"a: b"` style context prefix with `child`.
///
/// When `child` has the form `"func: detail"` and `func` already appears among
/// the last four segments of `parent`, only `detail` is appended.
pub fn scoped(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        return child.to_string();
    }
    let parents: Vec<&str> = parent.split(':').map(str::trim).collect();
    let childs: Vec<&str> = child.split(':').map(str::trim).collect();
    let tail = if let [head, detail] = childs.as_slice()
        && (2..=5).any(|back| parents.len() >= back && parents[parents.len() - back] == *head)
    {
        *detail
    } else {
        child
    };
    format!("{parent}: {tail}")
}
