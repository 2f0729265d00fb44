//! Bounded-parallel task execution with a hard deadline.
//!
//! [`TaskScheduler::run`] submits every [`Task`] at once to a worker pool of
//! `max_parallel` threads, waits for all of them, and returns their values in
//! submission order regardless of completion order. The call is all-or-nothing:
//!
//! - if the deadline passes first, the pool is shut down without joining the
//!   in-flight work and the call fails with [`Error::TimeoutExceeded`];
//! - if a [`CancellationToken`] fires, the same happens with [`Error::Cancelled`];
//! - otherwise the first failed task in submission order is reported as
//!   [`Error::TaskFailed`].
//!
//! `max_parallel = 0` runs the tasks inline on the calling thread, in order,
//! and yields exactly what a pooled run would for deterministic tasks.
//!
//! Waiting blocks on a completion channel. The wait is sliced by
//! `poll_interval` only to log progress and observe cancellation; the deadline
//! itself is enforced to the instant.
//!
//! # Example
//!
//! ```
//! use tsvbeam::scheduler::{SchedulerConfig, Task, TaskScheduler};
//! use std::time::Duration;
//!
//! # fn main() -> tsvbeam::Result<()> {
//! let tasks: Vec<Task<u64>> = (0..8u64).map(|i| Task::new(move || Ok(i * i))).collect();
//! let scheduler = TaskScheduler::new(
//!     SchedulerConfig::default()
//!         .with_max_parallel(4)
//!         .with_poll_interval(Duration::from_millis(10)),
//! );
//! assert_eq!(scheduler.run(tasks)?, vec![0, 1, 4, 9, 16, 25, 36, 49]);
//! # Ok(())
//! # }
//! ```

use crate::config::{config_from_env, parse_env_value};
use crate::error::{Error, Result};
use crossbeam_channel::{RecvTimeoutError, unbounded};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

type TaskFn<T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send + 'static>;

/// An independent unit of work.
///
/// Tasks must not depend on one another; the scheduler runs them in any order.
pub struct Task<T> {
    label: Option<String>,
    func: TaskFn<T>,
}

impl<T> Task<T> {
    pub fn new<F>(func: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        Self {
            label: None,
            func: Box::new(func),
        }
    }

    /// Attach a label shown in log lines (e.g. the path being read).
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Run the task body, converting a panic into an error.
    fn call(self) -> anyhow::Result<T> {
        match catch_unwind(AssertUnwindSafe(self.func)) {
            Ok(out) => out,
            Err(payload) => Err(anyhow::anyhow!("task panicked: {}", panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Shared flag that aborts a running [`TaskScheduler::run`] at its next wake-up.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Knobs for one [`TaskScheduler::run`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Worker count; `0` runs tasks inline on the calling thread.
    pub max_parallel: usize,
    /// Upper bound on a single wait before progress is logged and
    /// cancellation is re-checked.
    pub poll_interval: Duration,
    /// Idle time after all results are collected, for downstream systems with
    /// delayed visibility.
    pub post_delay: Duration,
    /// Deadline for the whole batch.
    pub timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            poll_interval: Duration::from_secs(10),
            post_delay: Duration::ZERO,
            timeout: None,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub const fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// One worker per logical CPU, at least two.
    #[must_use]
    pub fn with_cpu_parallelism(self) -> Self {
        self.with_max_parallel(num_cpus::get().max(2))
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub const fn with_post_delay(mut self, post_delay: Duration) -> Self {
        self.post_delay = post_delay;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Defaults overridden by `{prefix}MAX_PARALLEL` (a count, or `auto` for one
    /// worker per CPU), `{prefix}POLL_INTERVAL_MS`, `{prefix}POST_DELAY_MS` and
    /// `{prefix}TIMEOUT_SECS`.
    ///
    /// # Errors
    /// Returns an error naming the variable if a value does not parse.
    pub fn from_env(prefix: &str) -> Result<Self> {
        Self::default().overridden_by(&config_from_env(prefix), prefix)
    }

    pub(crate) fn overridden_by(
        mut self,
        vars: &std::collections::HashMap<String, String>,
        prefix: &str,
    ) -> Result<Self> {
        if vars
            .get("max_parallel")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("auto"))
        {
            self = self.with_cpu_parallelism();
        } else if let Some(v) = parse_env_value::<usize>(vars, prefix, "max_parallel")? {
            self.max_parallel = v;
        }
        if let Some(ms) = parse_env_value::<u64>(vars, prefix, "poll_interval_ms")? {
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env_value::<u64>(vars, prefix, "post_delay_ms")? {
            self.post_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_env_value::<u64>(vars, prefix, "timeout_secs")? {
            self.timeout = Some(Duration::from_secs(secs));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskScheduler {
    config: SchedulerConfig,
    cancel: CancellationToken,
}

impl TaskScheduler {
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Observe `token` between waits.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run all tasks and return their values in submission order.
    ///
    /// # Errors
    /// [`Error::TimeoutExceeded`], [`Error::Cancelled`], [`Error::TaskFailed`],
    /// or [`Error::Pool`] if the worker pool cannot be built.
    pub fn run<T: Send + 'static>(&self, tasks: Vec<Task<T>>) -> Result<Vec<T>> {
        if self.config.max_parallel == 0 {
            debug!(tasks = tasks.len(), "running tasks inline");
            return run_inline(tasks);
        }
        let results = self.run_pooled(tasks)?;
        if !self.config.post_delay.is_zero() {
            info!(post_delay = ?self.config.post_delay, "sleeping after task completion");
            thread::sleep(self.config.post_delay);
        }
        Ok(results)
    }

    fn run_pooled<T: Send + 'static>(&self, tasks: Vec<Task<T>>) -> Result<Vec<T>> {
        let total = tasks.len();
        let max_parallel = self.config.max_parallel;
        info!(tasks = total, max_parallel, "running tasks with worker pool");
        if total == 0 {
            return Ok(Vec::new());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_parallel)
            .thread_name(|i| format!("tsvbeam-worker-{i}"))
            .build()
            .map_err(|e| Error::Pool(e.to_string()))?;

        let (tx, rx) = unbounded::<(usize, anyhow::Result<T>)>();
        for (index, task) in tasks.into_iter().enumerate() {
            let tx = tx.clone();
            if let Some(label) = task.label() {
                debug!(index, label, "submitting task");
            }
            pool.spawn(move || {
                // receiver gone means the run was abandoned
                let _ = tx.send((index, task.call()));
            });
        }
        drop(tx);

        let started = Instant::now();
        let deadline = self.config.timeout.map(|t| started + t);
        let poll = self.config.poll_interval.max(Duration::from_millis(1));
        let mut slots: Vec<Option<anyhow::Result<T>>> = (0..total).map(|_| None).collect();
        let mut completed = 0usize;

        while completed < total {
            if self.cancel.is_cancelled() {
                warn!(completed, total, "cancelled; shutting down worker pool");
                drop(pool);
                return Err(Error::Cancelled { completed, total });
            }

            let wait = match deadline {
                Some(d) => poll.min(d.saturating_duration_since(Instant::now())),
                None => poll,
            };
            match rx.recv_timeout(wait) {
                Ok((index, out)) => {
                    slots[index] = Some(out);
                    completed += 1;
                    while let Ok((index, out)) = rx.try_recv() {
                        slots[index] = Some(out);
                        completed += 1;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    info!(
                        completed,
                        total,
                        waited = ?started.elapsed(),
                        "tasks not finished yet"
                    );
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Pool(format!(
                        "workers exited with {completed}/{total} results delivered"
                    )));
                }
            }

            if completed < total
                && let (Some(d), Some(timeout)) = (deadline, self.config.timeout)
                && Instant::now() >= d
            {
                warn!(?timeout, completed, total, "timeout reached; shutting down worker pool");
                drop(pool);
                return Err(Error::TimeoutExceeded {
                    timeout,
                    completed,
                    total,
                });
            }
        }
        info!(tasks = total, elapsed = ?started.elapsed(), "all tasks finished");

        collect_ordered(slots)
    }
}

/// Convenience wrapper: `TaskScheduler::new(*config).run(tasks)`.
///
/// # Errors
/// See [`TaskScheduler::run`].
pub fn run_tasks<T: Send + 'static>(tasks: Vec<Task<T>>, config: &SchedulerConfig) -> Result<Vec<T>> {
    TaskScheduler::new(*config).run(tasks)
}

fn run_inline<T>(tasks: Vec<Task<T>>) -> Result<Vec<T>> {
    tasks
        .into_iter()
        .enumerate()
        .map(|(index, task)| task.call().map_err(|source| Error::TaskFailed { index, source }))
        .collect()
}

fn collect_ordered<T>(slots: Vec<Option<anyhow::Result<T>>>) -> Result<Vec<T>> {
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| match slot {
            Some(Ok(v)) => Ok(v),
            Some(Err(source)) => Err(Error::TaskFailed { index, source }),
            None => Err(Error::Pool(format!("missing result for task #{index}"))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::AtomicUsize;

    fn fast() -> SchedulerConfig {
        SchedulerConfig::default().with_poll_interval(Duration::from_millis(5))
    }

    fn squares(n: u64) -> Vec<Task<u64>> {
        (0..n).map(|i| Task::new(move || Ok(i * i))).collect()
    }

    #[test]
    fn results_follow_submission_order() -> Result<()> {
        // later tasks finish first
        let tasks: Vec<Task<usize>> = (0..6)
            .map(|i| {
                Task::new(move || {
                    thread::sleep(Duration::from_millis(5 * (6 - i) as u64));
                    Ok(i)
                })
            })
            .collect();
        let out = TaskScheduler::new(fast().with_max_parallel(6)).run(tasks)?;
        assert_eq!(out, vec![0, 1, 2, 3, 4, 5]);
        Ok(())
    }

    #[test]
    fn inline_matches_pooled() -> Result<()> {
        let inline = run_tasks(squares(20), &fast().with_max_parallel(0))?;
        let pooled = run_tasks(squares(20), &fast().with_max_parallel(4))?;
        assert_eq!(inline, pooled);
        Ok(())
    }

    #[test]
    fn first_failure_in_submission_order_wins() {
        let tasks: Vec<Task<u32>> = vec![
            Task::new(|| Ok(1)),
            Task::new(|| {
                thread::sleep(Duration::from_millis(20));
                anyhow::bail!("slow failure")
            }),
            Task::new(|| anyhow::bail!("fast failure")),
        ];
        let err = TaskScheduler::new(fast().with_max_parallel(3))
            .run(tasks)
            .unwrap_err();
        match err {
            Error::TaskFailed { index, source } => {
                assert_eq!(index, 1);
                assert_eq!(source.to_string(), "slow failure");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn panics_become_task_failures() {
        let tasks: Vec<Task<u32>> = vec![Task::new(|| panic!("boom"))];
        let err = TaskScheduler::new(fast().with_max_parallel(1))
            .run(tasks)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TaskFailed);
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn timeout_abandons_work() {
        let tasks: Vec<Task<u32>> = vec![
            Task::new(|| Ok(1)),
            Task::new(|| {
                thread::sleep(Duration::from_millis(500));
                Ok(2)
            }),
        ];
        let config = fast()
            .with_max_parallel(2)
            .with_timeout(Some(Duration::from_millis(50)));
        let started = Instant::now();
        let err = TaskScheduler::new(config).run(tasks).unwrap_err();
        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(matches!(err, Error::TimeoutExceeded { total: 2, .. }));
    }

    #[test]
    fn cancellation_is_observed_between_waits() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let tasks: Vec<Task<u32>> = vec![
            Task::new(move || {
                trigger.cancel();
                Ok(0)
            }),
            Task::new(|| {
                thread::sleep(Duration::from_millis(300));
                Ok(1)
            }),
        ];
        let err = TaskScheduler::new(fast().with_max_parallel(2))
            .with_cancellation(token)
            .run(tasks)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn pool_bounds_concurrency() -> Result<()> {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<Task<()>> = (0..12)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                Task::new(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();
        TaskScheduler::new(fast().with_max_parallel(3)).run(tasks)?;
        assert!(peak.load(Ordering::SeqCst) <= 3);
        Ok(())
    }

    #[test]
    fn post_delay_is_applied() -> Result<()> {
        let config = fast()
            .with_max_parallel(2)
            .with_post_delay(Duration::from_millis(40));
        let started = Instant::now();
        run_tasks(squares(2), &config)?;
        assert!(started.elapsed() >= Duration::from_millis(40));
        Ok(())
    }

    #[test]
    fn env_overrides() -> Result<()> {
        let vars = [
            ("max_parallel".to_string(), "7".to_string()),
            ("timeout_secs".to_string(), "90".to_string()),
        ]
        .into_iter()
        .collect();
        let config = SchedulerConfig::default().overridden_by(&vars, "T_")?;
        assert_eq!(config.max_parallel, 7);
        assert_eq!(config.timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.poll_interval, Duration::from_secs(10));

        let bad = [("max_parallel".to_string(), "many".to_string())]
            .into_iter()
            .collect();
        assert!(SchedulerConfig::default().overridden_by(&bad, "T_").is_err());

        let auto = [("max_parallel".to_string(), "AUTO".to_string())]
            .into_iter()
            .collect();
        let config = SchedulerConfig::default().overridden_by(&auto, "T_")?;
        assert!(config.max_parallel >= 2);
        Ok(())
    }
}
