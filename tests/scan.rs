//! Integration tests for date-range partition scans.

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tsvbeam::io::{PathLister, parse_date};
use tsvbeam::testing::*;
use tsvbeam::*;

fn quick_options() -> ScanOptions {
    ScanOptions::default().with_scheduler(
        SchedulerConfig::default()
            .with_max_parallel(3)
            .with_poll_interval(Duration::from_millis(5))
            .with_timeout(Some(Duration::from_secs(10))),
    )
}

fn scanner(store: &Arc<InMemoryStore>) -> PartitionScanner {
    PartitionScanner::new(store.clone(), store.clone()).with_options(quick_options())
}

fn errors_only() -> Transform {
    Arc::new(|r: Record| (r.get("level")? == "error").then_some(r))
}

fn day(s: &str) -> chrono::NaiveDate {
    parse_date(s).unwrap()
}

fn event_store(days: &[&str], rows_per_day: usize) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for d in days {
        store.insert_dataset(&format!("logs/{d}/events-0.tsv"), &sample_events(d, rows_per_day));
    }
    store
}

#[test]
fn scan_filters_and_orders_by_partition() -> Result<()> {
    let store = event_store(&["2024-01-02", "2024-01-01", "2024-01-03", "2024-01-09"], 6);
    let (ds, report) = scanner(&store).scan_with_report(
        "logs",
        day("2024-01-01"),
        day("2024-01-02"),
        "events",
        Some(errors_only()),
    )?;

    // spillover of one day pulls in 01-03 but not 01-09
    assert_eq!(report.paths.len(), 3);
    assert_eq!(report.rows_per_path, [2, 2, 2]);
    assert_header(&ds, &["ts", "user", "level", "msg"]);
    assert_eq!(ds.num_rows(), 6);
    let ts = ds.column_values("ts")?;
    assert!(ts[0].starts_with("2024-01-01"));
    assert!(ts[5].starts_with("2024-01-03"));
    Ok(())
}

#[test]
fn transform_introduced_keys_follow_known_columns() -> Result<()> {
    let store = event_store(&["2024-01-01"], 3);
    let tag: Transform = Arc::new(|mut r: Record| {
        r.remove("msg");
        r.insert("source".into(), "app".into());
        r.insert("bucket".into(), "b0".into());
        Some(r)
    });
    let ds = scanner(&store).scan("logs", day("2024-01-01"), day("2024-01-01"), "events", Some(tag))?;
    assert_header(&ds, &["ts", "user", "level", "bucket", "source"]);
    assert_column_values(&ds, "source", &["app", "app", "app"]);
    Ok(())
}

#[test]
fn divergent_transform_output_is_reconciled_with_defaults() -> Result<()> {
    let store = event_store(&["2024-01-01", "2024-01-02"], 3);
    let add_on_second_day: Transform = Arc::new(|mut r: Record| {
        if r.get("ts")?.starts_with("2024-01-02") {
            r.insert("region".into(), "eu".into());
        }
        Some(r)
    });
    let options = quick_options()
        .with_spillover_window(0)
        .with_default_values([("region".to_string(), "unknown".to_string())].into());

    let ds = PartitionScanner::new(store.clone(), store.clone())
        .with_options(options)
        .scan("logs", day("2024-01-01"), day("2024-01-02"), "events", Some(add_on_second_day))?;
    assert_header(&ds, &["ts", "user", "level", "msg", "region"]);
    assert_column_values(
        &ds,
        "region",
        &["unknown", "unknown", "unknown", "eu", "eu", "eu"],
    );
    Ok(())
}

#[test]
fn nothing_survives_returns_empty_with_file_header() -> Result<()> {
    let store = event_store(&["2024-01-01", "2024-01-02"], 4);
    let drop_all: Transform = Arc::new(|_: Record| -> Option<Record> { None });
    let ds = scanner(&store).scan("logs", day("2024-01-01"), day("2024-01-02"), "events", Some(drop_all))?;
    assert_eq!(ds.num_rows(), 0);
    assert_header(&ds, &["ts", "user", "level", "msg"]);
    Ok(())
}

#[test]
fn header_mismatch_aborts_before_reading() {
    let store = event_store(&["2024-01-01"], 2);
    store.insert("logs/2024-01-02/events-0.tsv", &["ts\tuser", "t\tu"]);

    let err = scanner(&store)
        .scan("logs", day("2024-01-01"), day("2024-01-02"), "events", None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    assert!(err.to_string().contains("logs/2024-01-02/events-0.tsv"));
    assert_eq!(store.read_count(), 0);
}

#[test]
fn empty_listing_is_empty_input() {
    let store = event_store(&["2024-01-01"], 2);
    let err = scanner(&store)
        .scan("logs", day("2024-03-01"), day("2024-03-02"), "events", None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyInput);
}

#[test]
fn slow_partition_times_out() {
    let store = event_store(&["2024-01-01", "2024-01-02"], 2);
    store.set_latency("logs/2024-01-02/events-0.tsv", Duration::from_secs(3));
    let options = quick_options().with_scheduler(
        quick_options()
            .scheduler
            .with_timeout(Some(Duration::from_millis(150))),
    );

    let err = PartitionScanner::new(store.clone(), store.clone())
        .with_options(options)
        .scan("logs", day("2024-01-01"), day("2024-01-01"), "events", None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TimeoutExceeded);
}

#[test]
fn read_failure_surfaces() {
    let store = event_store(&["2024-01-01", "2024-01-02"], 2);
    store.fail_reads("logs/2024-01-02/events-0.tsv", "access denied");
    // the header pre-check hits the failure first
    let err = scanner(&store)
        .scan("logs", day("2024-01-01"), day("2024-01-02"), "events", None)
        .unwrap_err();
    assert!(format!("{err:#}").contains("access denied"));
}

#[test]
fn malformed_row_keeps_its_error_kind() {
    let store = event_store(&["2024-01-01"], 2);
    store.insert("logs/2024-01-02/events-0.tsv", &["ts\tuser\tlevel\tmsg", "only\ttwo"]);
    let err = scanner(&store)
        .scan("logs", day("2024-01-01"), day("2024-01-02"), "events", None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArityViolation);
}

#[test]
fn inline_scan_matches_parallel_scan() -> Result<()> {
    let store = event_store(&["2024-01-01", "2024-01-02", "2024-01-03"], 5);
    let parallel = scanner(&store).scan(
        "logs",
        day("2024-01-01"),
        day("2024-01-03"),
        "events",
        Some(errors_only()),
    )?;
    let inline = PartitionScanner::new(store.clone(), store.clone())
        .with_options(quick_options().with_scheduler(SchedulerConfig::default().with_max_parallel(0)))
        .scan("logs", day("2024-01-01"), day("2024-01-03"), "events", Some(errors_only()))?;
    assert_dataset_eq(&inline, &parallel);
    Ok(())
}

#[test]
fn local_filesystem_scan() -> anyhow::Result<()> {
    let root = TempDir::new()?;
    let d1 = sample_events("2024-05-01", 3);
    let d2 = sample_events("2024-05-02", 3);
    write_partition_tree(
        root.path(),
        &[
            ("2024-05-01/events-a.tsv", &d1),
            ("20240502/events-a.tsv", &d2),
            ("2024-05-02/unrelated.tsv", &d2),
        ],
    )?;

    let ds = scan(
        &root.path().to_string_lossy(),
        day("2024-05-01"),
        day("2024-05-01"),
        "events",
        None,
        &quick_options(),
    )?;
    assert_dataset_eq(&ds, &d1.union(d2.clone())?);
    Ok(())
}

#[test]
fn sequential_read_filtered_matches_scan() -> Result<()> {
    let store = event_store(&["2024-01-01", "2024-01-02"], 6);
    let paths = store.list_paths("logs", day("2024-01-01"), day("2024-01-02"), "events", 1)?;
    let seq = scan::read_filtered(
        &*store,
        &paths,
        Some(&errors_only()),
        &TsvFormat::default(),
        None,
    )?;
    let par = scanner(&store).scan(
        "logs",
        day("2024-01-01"),
        day("2024-01-02"),
        "events",
        Some(errors_only()),
    )?;
    assert_dataset_eq(&seq, &par);
    Ok(())
}

#[test]
fn records_with_differing_keys_are_not_padded() {
    let store = Arc::new(InMemoryStore::new());
    store.insert("logs/2024-01-01/events-0.tsv", &["a\tb", "1\tx", "2\ty"]);
    let drop_b_on_second: Transform = Arc::new(|mut r: Record| {
        if r.get("a")? == "2" {
            r.remove("b");
        }
        Some(r)
    });

    let err = scanner(&store)
        .scan("logs", day("2024-01-01"), day("2024-01-01"), "events", Some(drop_b_on_second))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArityViolation);
}
