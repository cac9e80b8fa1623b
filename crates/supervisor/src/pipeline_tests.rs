// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::stats::Counters;
use compass_core::test_support::test_epoch;
use compass_core::LogKind;
use std::time::Duration;
use tempfile::TempDir;

fn test_config() -> LogPipelineConfig {
    LogPipelineConfig {
        batch_size: 4,
        flush_interval: Duration::from_millis(20),
        max_buffer_size: 100,
        channel_capacity: 64,
        slow_save_threshold: Duration::from_millis(500),
        shutdown_flush_timeout: Duration::from_secs(2),
    }
}

fn harness(config: LogPipelineConfig) -> (TempDir, LogPipelineHandle, ProcessStore) {
    let dir = TempDir::new().unwrap();
    let store = ProcessStore::new(dir.path());
    let handle = spawn(store.clone(), config, Arc::new(Counters::default()));
    (dir, handle, store)
}

fn entry(id: u32, message: &str) -> ProcessLog {
    ProcessLog::line(
        format!("l-{id}"),
        ProcessId::new("p-1"),
        LogKind::Stdout,
        message,
        test_epoch(),
    )
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn submitted_entries_are_readable_from_the_buffer() {
    let (_dir, pipeline, _store) = harness(test_config());
    let sink = pipeline.sink();

    assert!(sink.submit(entry(1, "one")));
    assert!(sink.submit(entry(2, "two")));
    settle().await;

    let logs = pipeline.get_logs(&ProcessId::new("p-1"), 0).await.unwrap();
    let messages: Vec<_> = logs.iter().map(|l| l.message.as_str()).collect();
    assert_eq!(messages, vec!["one", "two"]);
}

#[tokio::test]
async fn limit_returns_most_recent_window_oldest_first() {
    let (_dir, pipeline, _store) = harness(test_config());
    let sink = pipeline.sink();
    for i in 0..10 {
        sink.submit(entry(i, &format!("line {i}")));
    }
    settle().await;

    let logs = pipeline.get_logs(&ProcessId::new("p-1"), 3).await.unwrap();
    let messages: Vec<_> = logs.iter().map(|l| l.message.as_str()).collect();
    assert_eq!(messages, vec!["line 7", "line 8", "line 9"]);
}

#[tokio::test]
async fn batches_persist_to_the_store() {
    let (_dir, pipeline, store) = harness(test_config());
    pipeline
        .register(ProcessId::new("p-1"), ProjectId::new("proj-test"))
        .await;
    let sink = pipeline.sink();
    for i in 0..6 {
        sink.submit(entry(i, &format!("line {i}")));
    }
    settle().await;

    let persisted = store
        .load_logs(&ProjectId::new("proj-test"), &ProcessId::new("p-1"), 0)
        .unwrap();
    assert!(persisted.len() >= 4, "expected a flushed batch, got {}", persisted.len());
}

#[tokio::test]
async fn read_tops_up_from_the_store_when_buffer_is_short() {
    let (_dir, pipeline, store) = harness(test_config());
    let project = ProjectId::new("proj-test");
    let process = ProcessId::new("p-1");
    pipeline.register(process.clone(), project.clone()).await;

    // Older entries only on disk
    let old: Vec<ProcessLog> = (0..5).map(|i| entry(i, &format!("old {i}"))).collect();
    store.append_logs(&project, &process, &old).unwrap();

    // Newer entries through the pipeline
    let sink = pipeline.sink();
    sink.submit(entry(100, "new 0"));
    sink.submit(entry(101, "new 1"));
    settle().await;

    let logs = pipeline.get_logs(&process, 6).await.unwrap();
    let messages: Vec<_> = logs.iter().map(|l| l.message.as_str()).collect();
    // Window is as large as available, oldest first, no duplicates
    assert_eq!(messages.len(), 6);
    assert_eq!(messages[messages.len() - 2..], ["new 0", "new 1"]);
    assert!(messages[0].starts_with("old"));
}

#[tokio::test]
async fn buffer_overflow_discards_the_oldest_quarter() {
    let config = LogPipelineConfig {
        max_buffer_size: 8,
        batch_size: 1_000, // keep persistence out of the way
        ..test_config()
    };
    let (_dir, pipeline, _store) = harness(config);
    let sink = pipeline.sink();
    for i in 0..9 {
        sink.submit(entry(i, &format!("line {i}")));
    }
    settle().await;

    let logs = pipeline.get_logs(&ProcessId::new("p-1"), 0).await.unwrap();
    // 9th entry overflows: keep the most recent 75% (6) of the cap
    assert_eq!(logs.len(), 6);
    assert_eq!(logs[0].message, "line 3");
    assert_eq!(logs[5].message, "line 8");
}

#[tokio::test]
async fn reads_return_copies() {
    let (_dir, pipeline, _store) = harness(test_config());
    let sink = pipeline.sink();
    sink.submit(entry(1, "immutable"));
    settle().await;

    let mut logs = pipeline.get_logs(&ProcessId::new("p-1"), 0).await.unwrap();
    logs[0].message = "mutated".to_string();

    let again = pipeline.get_logs(&ProcessId::new("p-1"), 0).await.unwrap();
    assert_eq!(again[0].message, "immutable");
}

#[tokio::test]
async fn remove_buffer_clears_in_memory_entries() {
    let (_dir, pipeline, _store) = harness(test_config());
    let sink = pipeline.sink();
    sink.submit(entry(1, "gone"));
    settle().await;

    pipeline.remove_buffer(ProcessId::new("p-1")).await;
    settle().await;

    let logs = pipeline.get_logs(&ProcessId::new("p-1"), 0).await.unwrap();
    assert!(logs.is_empty());
}

#[tokio::test]
async fn shutdown_flushes_buffers_to_the_store() {
    let config = LogPipelineConfig {
        batch_size: 1_000,
        flush_interval: Duration::from_secs(60), // no timed flush
        ..test_config()
    };
    let (_dir, pipeline, store) = harness(config);
    let project = ProjectId::new("proj-test");
    let process = ProcessId::new("p-1");
    pipeline.register(process.clone(), project.clone()).await;

    let sink = pipeline.sink();
    sink.submit(entry(1, "pending"));
    settle().await;

    pipeline.shutdown().await;

    let persisted = store.load_logs(&project, &process, 0).unwrap();
    assert!(persisted.iter().any(|l| l.message == "pending"));
}

#[tokio::test]
async fn submit_after_shutdown_counts_as_dropped() {
    let (_dir, pipeline, _store) = harness(test_config());
    let sink = pipeline.sink();
    pipeline.shutdown().await;
    settle().await;

    // Writer gone: the non-blocking send fails and is counted
    assert!(!sink.submit(entry(1, "lost")));
    assert!(!sink.submit(entry(2, "lost too")));
}
