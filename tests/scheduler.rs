//! Integration tests for the bounded-parallel task scheduler.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tsvbeam::*;

fn quick(max_parallel: usize) -> SchedulerConfig {
    SchedulerConfig::default()
        .with_max_parallel(max_parallel)
        .with_poll_interval(Duration::from_millis(5))
}

/// Deterministic tasks whose completion order is the reverse of submission order.
fn staggered(n: u64) -> Vec<Task<String>> {
    (0..n)
        .map(|i| {
            Task::new(move || {
                thread::sleep(Duration::from_millis((n - i) * 3));
                Ok(format!("row-{i}"))
            })
        })
        .collect()
}

#[test]
fn inline_and_pooled_runs_agree() -> Result<()> {
    let inline = TaskScheduler::new(quick(0)).run(staggered(8))?;
    let pooled = TaskScheduler::new(quick(4)).run(staggered(8))?;
    assert_eq!(inline, pooled);
    assert_eq!(pooled[0], "row-0");
    assert_eq!(pooled[7], "row-7");
    Ok(())
}

#[test]
fn never_exceeds_max_parallel() -> Result<()> {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let tasks = (0..12)
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
    run_tasks(tasks, &quick(3))?;
    assert!(peak.load(Ordering::SeqCst) <= 3);
    Ok(())
}

#[test]
fn timeout_abandons_in_flight_work() {
    let mut tasks: Vec<Task<u32>> = (0..3).map(|i| Task::new(move || Ok(i))).collect();
    tasks.push(Task::new(|| {
        thread::sleep(Duration::from_secs(3));
        Ok(99)
    }));

    let config = quick(2).with_timeout(Some(Duration::from_millis(100)));
    let started = Instant::now();
    let err = TaskScheduler::new(config).run(tasks).unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2));
    match err {
        Error::TimeoutExceeded {
            timeout,
            completed,
            total,
        } => {
            assert_eq!(timeout, Duration::from_millis(100));
            assert_eq!(total, 4);
            assert!(completed < total);
        }
        other => panic!("expected timeout, got {other}"),
    }
}

#[test]
fn cancellation_from_another_thread() {
    let token = CancellationToken::new();
    let remote = token.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        remote.cancel();
    });

    let tasks: Vec<Task<()>> = vec![Task::new(|| {
        thread::sleep(Duration::from_secs(2));
        Ok(())
    })];
    let err = TaskScheduler::new(quick(1))
        .with_cancellation(token)
        .run(tasks)
        .unwrap_err();
    canceller.join().unwrap();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[test]
fn first_failure_in_submission_order_wins() {
    let tasks: Vec<Task<u8>> = vec![
        Task::new(|| Ok(1)),
        Task::new(|| {
            thread::sleep(Duration::from_millis(30));
            anyhow::bail!("slow failure")
        }),
        Task::new(|| anyhow::bail!("fast failure")),
    ];
    let err = TaskScheduler::new(quick(3)).run(tasks).unwrap_err();
    assert!(matches!(err, Error::TaskFailed { index: 1, .. }));
    assert!(err.to_string().contains("slow failure"));
}

#[test]
fn empty_batch_returns_empty() -> Result<()> {
    let out: Vec<u8> = TaskScheduler::new(quick(4)).run(Vec::new())?;
    assert!(out.is_empty());
    Ok(())
}
