//! End-to-end runs over the in-memory collaborators.
//!
//! Scan → classify → bounded delivery → write-back, driven through
//! `RunOrchestrator::run_once`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use remindr_core::{FixedClock, Record, RunOutcome, RunSkipReason, RunSummary};
use remindr_infra::jobs::RetrySettings;
use remindr_infra::memory::{InMemoryBatchWriter, InMemorySource, RecordingNotifier};
use remindr_infra::{delivery_queue, EngineConfig, RunOrchestrator};

/// 2026-10-19 is a Monday.
fn monday(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, hour, 0, 0).unwrap()
}

fn overdue_rows(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| Record::new(format!("Task {i}"), format!("r{i}@example.com"), "2026-10-12"))
        .collect()
}

fn orchestrator(
    config: &EngineConfig,
    source: Arc<InMemorySource>,
    notifier: Arc<RecordingNotifier>,
    writer: Arc<InMemoryBatchWriter>,
    now: DateTime<Utc>,
) -> RunOrchestrator {
    let queue = delivery_queue(config, notifier);
    RunOrchestrator::new(config, source, queue, writer)
        .unwrap()
        .with_clock(Arc::new(FixedClock(now)))
}

fn completed(outcome: RunOutcome) -> RunSummary {
    match outcome {
        RunOutcome::Completed(summary) => summary,
        other => panic!("expected a completed run, got {other:?}"),
    }
}

#[tokio::test]
async fn twelve_thousand_rows_are_scanned_in_three_pages() {
    let config = EngineConfig::default()
        .with_groups(["Tasks"])
        .with_page_size(5_000);
    let source = Arc::new(InMemorySource::new().with_group("Tasks", overdue_rows(12_000)));
    let writer = Arc::new(InMemoryBatchWriter::new());
    let orch = orchestrator(
        &config,
        source.clone(),
        Arc::new(RecordingNotifier::new()),
        writer.clone(),
        monday(9),
    );

    let summary = completed(orch.run_once().await.unwrap());

    assert_eq!(summary.scanned, 12_000);
    assert_eq!(
        source.page_requests("Tasks"),
        vec![(2, 5_001), (5_002, 10_001), (10_002, 12_001)]
    );
    assert_eq!(summary.delivered, 12_000);
    assert_eq!(summary.write_back["Tasks"].units_written, 12_000);
    assert_eq!(writer.batch_sizes().len(), 24);
}

#[tokio::test(start_paused = true)]
async fn permanent_failures_are_isolated_and_reported() {
    let config = EngineConfig::default()
        .with_groups(["Tasks"])
        .with_concurrency(5)
        .with_delivery_retry(RetrySettings::new(5, 1_000, 30_000));
    let source = Arc::new(InMemorySource::new().with_group("Tasks", overdue_rows(17)));
    let notifier = Arc::new(
        RecordingNotifier::new()
            .failing_for("r3@example.com")
            .failing_for("r11@example.com")
            .with_latency(Duration::from_millis(50)),
    );
    let writer = Arc::new(InMemoryBatchWriter::new());
    let orch = orchestrator(&config, source, notifier.clone(), writer.clone(), monday(9));

    let summary = completed(orch.run_once().await.unwrap());

    assert_eq!(summary.eligible, 17);
    assert_eq!(summary.delivered, 15);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.failures.len(), 2);

    let mut failed: Vec<_> = summary
        .failures
        .iter()
        .map(|f| (f.recipient.as_str(), f.position, f.attempts))
        .collect();
    failed.sort();
    assert_eq!(
        failed,
        vec![("r11@example.com", 13, 6), ("r3@example.com", 5, 6)]
    );
    assert_eq!(notifier.attempts_for("r3@example.com"), 6);
    assert!(notifier.max_in_flight() <= 5);

    // Attempted rows are marked even when delivery failed.
    assert_eq!(summary.write_back["Tasks"].units_written, 17);
    assert_eq!(writer.cell("Tasks", 5).as_deref(), Some("2026-10-19 09:00:00"));
    assert_eq!(orch.queue_stats().total_failed, 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_run_is_skipped_without_scanning() {
    let config = EngineConfig::default().with_groups(["Tasks"]);
    let source = Arc::new(InMemorySource::new().with_group("Tasks", overdue_rows(3)));
    let notifier = Arc::new(RecordingNotifier::new().with_latency(Duration::from_secs(1)));
    let orch = Arc::new(orchestrator(
        &config,
        source.clone(),
        notifier,
        Arc::new(InMemoryBatchWriter::new()),
        monday(9),
    ));

    let first = tokio::spawn({
        let orch = orch.clone();
        async move { orch.run_once().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(orch.is_running());

    let second = orch.run_once().await.unwrap();
    assert_eq!(second.skip_reason(), Some(RunSkipReason::Overlap));
    assert_eq!(source.count_requests("Tasks"), 1);

    let first = completed(first.await.unwrap().unwrap());
    assert_eq!(first.delivered, 3);
    assert!(!orch.is_running());

    // The guard is released once the first run finished.
    let third = orch.run_once().await.unwrap();
    assert!(third.summary().is_some());
}

#[tokio::test]
async fn weekend_is_judged_in_the_configured_timezone() {
    let config = EngineConfig::default()
        .with_groups(["Tasks"])
        .with_skip_weekends(true)
        .with_timezone("America/New_York");
    let source = Arc::new(InMemorySource::new().with_group("Tasks", overdue_rows(1)));
    // Monday 02:00 UTC is still Sunday evening in New York.
    let orch = orchestrator(
        &config,
        source.clone(),
        Arc::new(RecordingNotifier::new()),
        Arc::new(InMemoryBatchWriter::new()),
        monday(2),
    );

    let outcome = orch.run_once().await.unwrap();

    assert_eq!(outcome.skip_reason(), Some(RunSkipReason::Weekend));
    assert_eq!(source.count_requests("Tasks"), 0);
}

#[tokio::test]
async fn second_run_on_the_same_day_sends_nothing() {
    let config = EngineConfig::default().with_groups(["Tasks"]);
    let source = Arc::new(InMemorySource::new().with_group("Tasks", overdue_rows(4)));
    let notifier = Arc::new(RecordingNotifier::new());
    let queue = delivery_queue(&config, notifier.clone());
    let orch = RunOrchestrator::new(&config, source.clone(), queue, source.clone())
        .unwrap()
        .with_clock(Arc::new(FixedClock(monday(9))));

    let first = completed(orch.run_once().await.unwrap());
    assert_eq!(first.delivered, 4);
    assert!(source
        .rows("Tasks")
        .iter()
        .all(|r| r.last_action.as_deref() == Some("2026-10-19 09:00:00")));

    let second = completed(orch.run_once().await.unwrap());
    assert_eq!(second.scanned, 4);
    assert_eq!(second.eligible, 0);
    assert_eq!(second.skipped.duplicate_today, 4);
    assert!(second.write_back.is_empty());
    assert_eq!(notifier.sent().len(), 4);
}

#[tokio::test]
async fn broken_group_does_not_affect_the_others() {
    let config = EngineConfig::default().with_groups(["Archive", "Tasks"]);
    let source = Arc::new(InMemorySource::new().with_group("Tasks", overdue_rows(2)));
    let writer = Arc::new(InMemoryBatchWriter::new());
    let orch = orchestrator(
        &config,
        source,
        Arc::new(RecordingNotifier::new()),
        writer.clone(),
        monday(9),
    );

    let summary = completed(orch.run_once().await.unwrap());

    assert_eq!(summary.group_failures.len(), 1);
    assert_eq!(summary.group_failures[0].group.name(), "Archive");
    assert_eq!(summary.delivered, 2);
    assert!(!summary.is_clean());
    assert!(writer.calls().iter().all(|(g, _)| g.name() == "Tasks"));
}

#[tokio::test]
async fn write_back_is_chunked_per_group() {
    let config = EngineConfig::default()
        .with_groups(["Tasks"])
        .with_write_chunk_size(500);
    let source = Arc::new(InMemorySource::new().with_group("Tasks", overdue_rows(1_203)));
    let writer = Arc::new(InMemoryBatchWriter::new());
    let orch = orchestrator(
        &config,
        source,
        Arc::new(RecordingNotifier::new()),
        writer.clone(),
        monday(9),
    );

    let summary = completed(orch.run_once().await.unwrap());

    assert_eq!(writer.batch_sizes(), vec![500, 500, 203]);
    let report = &summary.write_back["Tasks"];
    assert_eq!(report.chunks_total, 3);
    assert!(report.is_complete());
}

#[tokio::test(start_paused = true)]
async fn rejected_delivery_is_not_retried() {
    let config = EngineConfig::default().with_groups(["Tasks"]);
    let source = Arc::new(InMemorySource::new().with_group("Tasks", overdue_rows(2)));
    let notifier = Arc::new(RecordingNotifier::new().rejecting("r0@example.com"));
    let orch = orchestrator(
        &config,
        source,
        notifier.clone(),
        Arc::new(InMemoryBatchWriter::new()),
        monday(9),
    );

    let summary = completed(orch.run_once().await.unwrap());

    assert_eq!(summary.delivered, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].attempts, 1);
    assert_eq!(notifier.attempts_for("r0@example.com"), 1);
}
