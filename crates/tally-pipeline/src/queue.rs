// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded task queue with per-user exclusivity.
//!
//! Tasks wait in a single FIFO. A worker taking work receives the
//! oldest task whose user has nothing in flight; tasks for busy users
//! stay queued and do not block younger tasks for idle users. Admission
//! is non-blocking: a full or closed queue rejects with
//! [`SubmitOutcome::Busy`] and the caller tells the user to retry.
//!
//! The returned [`TaskGuard`] releases the user's exclusivity slot on
//! drop, so a panicking worker cannot wedge a user forever.

use std::collections::{HashSet, VecDeque};
use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, info};

use tally_core::types::{ChatId, TaskId, UserId};

/// A queued analysis request for one user.
#[derive(Debug, Clone)]
pub struct Task {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub query_text: String,
    /// File keys claimed for this task at submission time.
    pub attached_file_keys: Vec<String>,
    pub enqueued_at: DateTime<Utc>,
}

/// Result of a non-blocking submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The task is queued and will run.
    Accepted,
    /// The queue is full or closed; nothing was enqueued.
    Busy,
}

struct QueueState {
    fifo: VecDeque<Task>,
    /// Users with a task currently being processed.
    in_flight: HashSet<String>,
    /// Tasks rejected or discarded since startup.
    dropped: u64,
    closed: bool,
}

/// Bounded FIFO queue that never hands two tasks for one user out at once.
pub struct TaskQueue {
    capacity: usize,
    state: std::sync::Mutex<QueueState>,
    wakeup: Notify,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: std::sync::Mutex::new(QueueState {
                fifo: VecDeque::new(),
                in_flight: HashSet::new(),
                dropped: 0,
                closed: false,
            }),
            wakeup: Notify::new(),
        }
    }

    /// Enqueues a task without blocking.
    ///
    /// Returns [`SubmitOutcome::Busy`] when the queue is at capacity or
    /// closed; the task is counted as dropped and the caller owns the
    /// user-facing retry notice.
    pub fn submit(&self, task: Task) -> SubmitOutcome {
        let mut state = self.lock();
        if state.closed || state.fifo.len() >= self.capacity {
            state.dropped += 1;
            debug!(
                task_id = %task.task_id.0,
                user_id = %task.user_id.0,
                closed = state.closed,
                "task rejected, queue unavailable"
            );
            return SubmitOutcome::Busy;
        }

        info!(
            task_id = %task.task_id.0,
            user_id = %task.user_id.0,
            depth = state.fifo.len() + 1,
            "task enqueued"
        );
        state.fifo.push_back(task);
        drop(state);
        self.wakeup.notify_waiters();
        SubmitOutcome::Accepted
    }

    /// Takes the oldest task whose user is idle, waiting if none is ready.
    ///
    /// Returns `None` once the queue is closed and will never yield work
    /// again. The task's user is marked in flight until the returned
    /// guard drops.
    pub async fn take(self: &Arc<Self>) -> Option<TaskGuard> {
        loop {
            // Arm the wakeup before inspecting state so a notify racing
            // with the check is not lost.
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                let QueueState {
                    fifo,
                    in_flight,
                    closed,
                    ..
                } = &mut *state;

                let ready = fifo
                    .iter()
                    .position(|task| !in_flight.contains(&task.user_id.0));
                if let Some(task) = ready.and_then(|pos| fifo.remove(pos)) {
                    in_flight.insert(task.user_id.0.clone());
                    return Some(TaskGuard {
                        queue: Arc::clone(self),
                        task,
                    });
                }

                if *closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Closes the queue and discards everything still waiting.
    ///
    /// Subsequent submits reject, blocked takers return `None` once
    /// in-flight users release. Returns the number of tasks discarded
    /// by this call.
    pub fn close(&self) -> u64 {
        let discarded;
        {
            let mut state = self.lock();
            state.closed = true;
            discarded = state.fifo.len() as u64;
            state.dropped += discarded;
            state.fifo.clear();
        }
        self.wakeup.notify_waiters();
        if discarded > 0 {
            info!(discarded, "queue closed with tasks still waiting");
        }
        discarded
    }

    /// Number of tasks waiting (not counting in-flight ones).
    pub fn len(&self) -> usize {
        self.lock().fifo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().fifo.is_empty()
    }

    /// Users currently being processed.
    pub fn in_flight_count(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Total tasks rejected or discarded since startup.
    pub fn dropped_count(&self) -> u64 {
        self.lock().dropped
    }

    fn release(&self, user_id: &UserId) {
        {
            let mut state = self.lock();
            state.in_flight.remove(&user_id.0);
        }
        self.wakeup.notify_waiters();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// A task checked out by a worker.
///
/// Dropping the guard releases the user's exclusivity slot and wakes
/// waiting takers, whether the worker finished cleanly or panicked.
pub struct TaskGuard {
    queue: Arc<TaskQueue>,
    task: Task,
}

impl Deref for TaskGuard {
    type Target = Task;

    fn deref(&self) -> &Task {
        &self.task
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.queue.release(&self.task.user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    fn task(id: &str, user: &str) -> Task {
        Task {
            task_id: TaskId(id.to_string()),
            user_id: UserId(user.to_string()),
            chat_id: ChatId(format!("chat-{user}")),
            query_text: "analyze".to_string(),
            attached_file_keys: Vec::new(),
            enqueued_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_when_full_and_counts_drops() {
        let queue = TaskQueue::new(2);
        assert_eq!(queue.submit(task("t1", "u1")), SubmitOutcome::Accepted);
        assert_eq!(queue.submit(task("t2", "u2")), SubmitOutcome::Accepted);
        assert_eq!(queue.submit(task("t3", "u3")), SubmitOutcome::Busy);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped_count(), 1);
    }

    #[tokio::test]
    async fn same_user_tasks_run_in_fifo_order() {
        let queue = Arc::new(TaskQueue::new(8));
        queue.submit(task("t1", "u1"));
        queue.submit(task("t2", "u1"));

        let first = queue.take().await.unwrap();
        assert_eq!(first.task_id.0, "t1");
        drop(first);

        let second = queue.take().await.unwrap();
        assert_eq!(second.task_id.0, "t2");
    }

    #[tokio::test]
    async fn busy_user_does_not_block_other_users() {
        let queue = Arc::new(TaskQueue::new(8));
        queue.submit(task("t1", "u1"));
        queue.submit(task("t2", "u1"));
        queue.submit(task("t3", "u2"));

        let held = queue.take().await.unwrap();
        assert_eq!(held.task_id.0, "t1");

        // u1 is in flight, so the next take skips t2 and yields t3.
        let next = queue.take().await.unwrap();
        assert_eq!(next.task_id.0, "t3");
        assert_eq!(queue.in_flight_count(), 2);
    }

    #[tokio::test]
    async fn second_task_for_user_waits_for_release() {
        let queue = Arc::new(TaskQueue::new(8));
        queue.submit(task("t1", "u1"));
        queue.submit(task("t2", "u1"));

        let held = queue.take().await.unwrap();

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.take().await.map(|g| g.task_id.0.clone()) })
        };

        // The waiter cannot proceed while u1 is held.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(held);
        let taken = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(taken.as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn guard_drop_releases_even_on_panic() {
        let queue = Arc::new(TaskQueue::new(8));
        queue.submit(task("t1", "u1"));
        queue.submit(task("t2", "u1"));

        let worker = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let _guard = queue.take().await.unwrap();
                panic!("worker crashed");
            })
        };
        assert!(worker.await.is_err());

        assert_eq!(queue.in_flight_count(), 0);
        let next = queue.take().await.unwrap();
        assert_eq!(next.task_id.0, "t2");
    }

    #[tokio::test]
    async fn close_unblocks_waiting_takers() {
        let queue = Arc::new(TaskQueue::new(8));
        queue.submit(task("t1", "u1"));

        let blocked = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                // Drain t1 then block on an empty queue.
                let first = queue.take().await.unwrap();
                drop(first);
                queue.take().await.is_none()
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        queue.close();

        assert_eq!(queue.submit(task("t3", "u3")), SubmitOutcome::Busy);
        let unblocked = tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .unwrap()
            .unwrap();
        assert!(unblocked);
    }

    #[tokio::test]
    async fn close_reports_discarded_count() {
        let queue = Arc::new(TaskQueue::new(8));
        queue.submit(task("t1", "u1"));
        queue.submit(task("t2", "u2"));

        assert_eq!(queue.close(), 2);
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.dropped_count(), 2);
        assert!(queue.take().await.is_none());
    }
}
