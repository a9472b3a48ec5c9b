// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graceful shutdown coordination with signal handling.
//!
//! Installs handlers for SIGTERM and SIGINT (Ctrl+C), triggering a
//! [`CancellationToken`] that the serve loop monitors. On shutdown the
//! queue is closed (waiting tasks are discarded and counted) and
//! in-flight tasks are given a bounded window to finish.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::queue::TaskQueue;

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is received.
/// The signal handler task runs in the background until the token is cancelled.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

/// Waits up to `timeout` for in-flight tasks to finish.
///
/// The queue must already be closed so no new work starts. Tasks still
/// running when the window expires are interrupted by process exit;
/// their users never received a result, which is logged.
pub async fn drain_in_flight(queue: &Arc<TaskQueue>, timeout: Duration) {
    let in_flight = queue.in_flight_count();
    if in_flight == 0 {
        info!("no in-flight tasks to drain");
        return;
    }

    info!(in_flight, "waiting for in-flight tasks to complete");

    let deadline = tokio::time::Instant::now() + timeout;
    while queue.in_flight_count() > 0 {
        if tokio::time::Instant::now() >= deadline {
            warn!(
                remaining = queue.in_flight_count(),
                "drain timeout reached, interrupting remaining tasks"
            );
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    info!("all in-flight tasks drained");
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;

    use tally_core::types::{ChatId, TaskId, UserId};

    use crate::queue::Task;

    #[tokio::test]
    async fn install_signal_handler_returns_token() {
        let token = install_signal_handler();
        assert!(!token.is_cancelled());
        // Cancel it manually to clean up the background task.
        token.cancel();
    }

    #[tokio::test]
    async fn drain_with_no_in_flight_returns_immediately() {
        let queue = Arc::new(TaskQueue::new(4));
        drain_in_flight(&queue, Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn drain_waits_for_guard_release() {
        let queue = Arc::new(TaskQueue::new(4));
        queue.submit(Task {
            task_id: TaskId("t1".to_string()),
            user_id: UserId("u1".to_string()),
            chat_id: ChatId("c1".to_string()),
            query_text: "q".to_string(),
            attached_file_keys: Vec::new(),
            enqueued_at: Utc::now(),
        });
        let guard = queue.take().await.unwrap();
        queue.close();

        let releaser = {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                drop(guard);
            })
        };

        drain_in_flight(&queue, Duration::from_secs(2)).await;
        assert_eq!(queue.in_flight_count(), 0);
        releaser.await.unwrap();
    }
}
