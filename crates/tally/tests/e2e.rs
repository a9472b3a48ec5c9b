// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end pipeline tests over the mock platform and engine.

use std::time::Duration;

use tally_core::types::Segment;
use tally_test_utils::harness::{file_event, text_event};
use tally_test_utils::{CannedOutcome, PipelineHarness};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn upload_then_query_delivers_rendered_report() {
    let harness = PipelineHarness::builder()
        .with_engine_script(vec![CannedOutcome::Report {
            markdown: "# Sales Report\n\nRevenue is up.".to_string(),
        }])
        .build()
        .unwrap();

    harness.platform.seed_file("fk-1", b"month,revenue\njan,100\n");
    harness.send_file("u1", "fk-1", "sales.csv").await;
    harness
        .await_text("u1", WAIT, |t| t.contains("Got your file"))
        .await;

    harness.send_text("u1", "summarize revenue").await;

    // Start acknowledgement precedes the result.
    harness
        .await_text("u1", WAIT, |t| t.contains("Starting your analysis"))
        .await;
    let segments = harness.await_segments("u1", WAIT).await;
    assert!(
        matches!(&segments[0], Segment::Text { text } if text.contains("Revenue is up"))
    );

    // The engine saw the downloaded file, not the file key.
    let requests = harness.engine.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].attachment_paths[0].ends_with("sales.csv"));

    harness.shutdown().await;
}

#[tokio::test]
async fn duplicate_event_id_runs_the_analysis_once() {
    let harness = PipelineHarness::builder().build().unwrap();

    harness.platform.seed_file("fk-1", b"data");
    harness.send_file("u1", "fk-1", "data.csv").await;

    let event = text_event("ev-dup", "u1", "analyze");
    harness.send_event(event.clone()).await;
    harness.send_event(event).await;

    harness.await_text("u1", WAIT, |t| t == "ok").await;
    // Give a hypothetical second task time to surface, then verify
    // exactly one engine call happened.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.engine.call_count(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn query_without_files_prompts_for_upload() {
    let harness = PipelineHarness::builder().build().unwrap();

    harness.send_text("u1", "analyze my data").await;
    harness
        .await_text("u1", WAIT, |t| t.contains("upload a data file"))
        .await;
    assert_eq!(harness.engine.call_count(), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn file_upload_defers_download_until_query() {
    let harness = PipelineHarness::builder().build().unwrap();

    // The platform has no bytes for this key yet; recording must still
    // succeed because nothing is downloaded at upload time.
    harness.send_file("u1", "fk-later", "later.csv").await;
    harness
        .await_text("u1", WAIT, |t| t.contains("Got your file"))
        .await;

    // Seed the bytes only now, then trigger the analysis.
    harness.platform.seed_file("fk-later", b"late bytes");
    harness.send_text("u1", "go").await;
    harness.await_text("u1", WAIT, |t| t == "ok").await;

    harness.shutdown().await;
}

#[tokio::test]
async fn full_queue_sends_busy_notice() {
    let harness = PipelineHarness::builder()
        .with_workers(1)
        .with_queue_capacity(1)
        .with_engine_script(vec![CannedOutcome::Slow {
            delay: Duration::from_millis(300),
            text: "slow done".to_string(),
        }])
        .build()
        .unwrap();

    harness.platform.seed_file("fk-1", b"a");
    harness.platform.seed_file("fk-2", b"b");
    harness.platform.seed_file("fk-3", b"c");
    harness.send_file("u1", "fk-1", "a.csv").await;
    harness.send_file("u2", "fk-2", "b.csv").await;
    harness.send_file("u3", "fk-3", "c.csv").await;

    // First task occupies the single worker, second fills the queue,
    // third must bounce.
    harness.send_text("u1", "first").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.send_text("u2", "second").await;
    harness.send_text("u3", "third").await;

    harness
        .await_text("u3", WAIT, |t| t.contains("at capacity"))
        .await;

    harness.shutdown().await;
}

#[tokio::test]
async fn engine_failure_text_reaches_the_user() {
    let harness = PipelineHarness::builder()
        .with_engine_script(vec![CannedOutcome::Failure {
            reason: "unsupported file format".to_string(),
        }])
        .build()
        .unwrap();

    harness.platform.seed_file("fk-1", b"binary blob");
    harness.send_file("u1", "fk-1", "blob.bin").await;
    harness.send_text("u1", "analyze this").await;

    harness
        .await_text("u1", WAIT, |t| t.contains("unsupported file format"))
        .await;

    harness.shutdown().await;
}

#[tokio::test]
async fn engine_timeout_notifies_the_user() {
    let harness = PipelineHarness::builder()
        .with_engine_timeout(Duration::from_millis(100))
        .with_engine_script(vec![CannedOutcome::Slow {
            delay: Duration::from_secs(30),
            text: "never delivered".to_string(),
        }])
        .build()
        .unwrap();

    harness.platform.seed_file("fk-1", b"x");
    harness.send_file("u1", "fk-1", "x.csv").await;
    harness.send_text("u1", "slow analysis").await;

    harness
        .await_text("u1", WAIT, |t| t.contains("cancelled"))
        .await;

    harness.shutdown().await;
}

#[tokio::test]
async fn failed_download_still_runs_with_remaining_files() {
    let harness = PipelineHarness::builder().build().unwrap();

    harness.platform.seed_file("fk-good", b"usable");
    harness.send_file("u1", "fk-good", "good.csv").await;
    harness.send_file("u1", "fk-missing", "gone.csv").await;

    harness.send_text("u1", "analyze what you have").await;
    harness.await_text("u1", WAIT, |t| t == "ok").await;

    // The engine ran with the one resolvable file and the query noted
    // the missing one.
    let requests = harness.engine.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].attachment_paths.len(), 1);
    assert!(requests[0].query_text.contains("fk-missing"));

    harness.shutdown().await;
}

#[tokio::test]
async fn distinct_users_are_processed_concurrently() {
    let harness = PipelineHarness::builder()
        .with_workers(2)
        .with_engine_script(vec![CannedOutcome::Slow {
            delay: Duration::from_millis(200),
            text: "done".to_string(),
        }])
        .build()
        .unwrap();

    harness.platform.seed_file("fk-1", b"a");
    harness.platform.seed_file("fk-2", b"b");
    harness.send_file("u1", "fk-1", "a.csv").await;
    harness.send_file("u2", "fk-2", "b.csv").await;

    let started = tokio::time::Instant::now();
    harness.send_text("u1", "analyze a").await;
    harness.send_text("u2", "analyze b").await;

    harness.await_text("u1", WAIT, |t| t == "done").await;
    harness.await_text("u2", WAIT, |t| t == "done").await;

    // Two 200ms tasks on two workers finish well under 400ms of
    // serialized time plus overhead.
    assert!(started.elapsed() < Duration::from_millis(390));

    harness.shutdown().await;
}

#[tokio::test]
async fn ack_send_failure_does_not_cost_the_result() {
    let harness = PipelineHarness::builder().build().unwrap();

    harness.platform.seed_file("fk-1", b"rows");
    harness.send_file("u1", "fk-1", "rows.csv").await;
    harness
        .await_text("u1", WAIT, |t| t.contains("Got your file"))
        .await;

    // The next send is the start acknowledgement; make it fail.
    harness.platform.fail_next_sends(1);
    harness.send_text("u1", "analyze").await;

    harness.await_text("u1", WAIT, |t| t == "ok").await;
    // The ack was swallowed by the failure; the result still arrived.
    let texts = harness.platform.texts_for(&harness.chat_for("u1"));
    assert!(!texts.iter().any(|t| t.contains("Starting your analysis")));
    assert_eq!(harness.engine.call_count(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn transient_download_failure_recovers_on_retry_query() {
    let harness = PipelineHarness::builder().build().unwrap();

    harness.platform.seed_file("fk-1", b"rows");
    harness.send_file("u1", "fk-1", "rows.csv").await;
    harness
        .await_text("u1", WAIT, |t| t.contains("Got your file"))
        .await;

    // First query: the only download fails, leaving no data files, so
    // the user is prompted and the engine never runs.
    harness.platform.fail_next_downloads(1);
    harness.send_text("u1", "analyze").await;
    harness
        .await_text("u1", WAIT, |t| t.contains("upload a data file"))
        .await;
    assert_eq!(harness.engine.call_count(), 0);

    // The record stayed pending, so the retried query downloads it.
    harness.send_text("u1", "analyze again").await;
    harness.await_text("u1", WAIT, |t| t == "ok").await;
    let requests = harness.engine.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].attachment_paths[0].ends_with("rows.csv"));

    harness.shutdown().await;
}

#[tokio::test]
async fn files_attach_to_the_next_query_only() {
    let harness = PipelineHarness::builder().build().unwrap();

    harness.platform.seed_file("fk-1", b"first");
    harness.send_file("u1", "fk-1", "first.csv").await;
    harness.send_text("u1", "query one").await;
    harness.await_text("u1", WAIT, |t| t == "ok").await;

    // A second query with no new upload still sees the file on disk,
    // but claims no new keys.
    harness.send_event(file_event("ev-f2", "u1", "fk-2", "second.csv")).await;
    harness.platform.seed_file("fk-2", b"second");
    harness.send_text("u1", "query two").await;

    tokio::time::timeout(WAIT, async {
        while harness.engine.call_count() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let requests = harness.engine.requests();
    // Second request carries the new file plus the previously
    // downloaded one from the data directory.
    assert_eq!(requests[1].attachment_paths.len(), 2);

    harness.shutdown().await;
}
