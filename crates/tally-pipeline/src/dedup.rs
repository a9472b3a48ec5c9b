// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Idempotency cache for inbound event identifiers.
//!
//! The chat platform delivers webhook events at-least-once, so the same
//! `event_id` can arrive more than once within a retry window. The
//! deduplicator admits each id exactly once per retention window;
//! duplicates are dropped by the caller with no side effects.
//!
//! Expired entries are reclaimed lazily: re-admission overwrites them
//! in place, and an opportunistic sweep runs at most once per sweep
//! interval from inside `admit` to bound memory without a dedicated
//! background thread.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use tally_core::types::EventId;

/// Minimum interval between opportunistic full sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Concurrent idempotency cache keyed by platform event id.
pub struct Deduplicator {
    retention: Duration,
    admitted: DashMap<String, Instant>,
    last_sweep: std::sync::Mutex<Instant>,
}

impl Deduplicator {
    /// Creates a deduplicator with the given retention window.
    ///
    /// An admitted id becomes eligible for re-admission strictly after
    /// the window elapses.
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            admitted: DashMap::new(),
            last_sweep: std::sync::Mutex::new(Instant::now()),
        }
    }

    /// Admits an event id, returning `true` exactly once per retention window.
    ///
    /// Returns `false` for a duplicate still inside the window; the
    /// caller must then drop the event without any observable effect.
    /// Safe under concurrent calls: for N racing admissions of the same
    /// fresh id, exactly one returns `true`.
    pub fn admit(&self, event_id: &EventId) -> bool {
        self.maybe_sweep();

        let now = Instant::now();
        let mut admitted = false;
        self.admitted
            .entry(event_id.0.clone())
            .and_modify(|admitted_at| {
                // Entries expire strictly after the window elapses;
                // an expired one is reclaimed and admitted again.
                if now.duration_since(*admitted_at) > self.retention {
                    *admitted_at = now;
                    admitted = true;
                }
            })
            .or_insert_with(|| {
                admitted = true;
                now
            });

        if !admitted {
            debug!(event_id = %event_id.0, "duplicate event suppressed");
        }
        admitted
    }

    /// Removes every entry older than the retention window.
    ///
    /// Returns the number of entries reclaimed. Invoked opportunistically
    /// from `admit`; also callable directly by an embedder that wants to
    /// bound memory under idle load.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.admitted.len();
        self.admitted
            .retain(|_, admitted_at| now.duration_since(*admitted_at) <= self.retention);
        let reclaimed = before - self.admitted.len();
        if reclaimed > 0 {
            debug!(reclaimed, "swept expired dedup records");
        }
        reclaimed
    }

    /// Number of ids currently recorded (including expired, not yet swept).
    pub fn len(&self) -> usize {
        self.admitted.len()
    }

    /// True when no ids are recorded.
    pub fn is_empty(&self) -> bool {
        self.admitted.is_empty()
    }

    fn maybe_sweep(&self) {
        let mut last = match self.last_sweep.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if last.elapsed() < SWEEP_INTERVAL {
            return;
        }
        *last = Instant::now();
        drop(last);
        self.sweep_expired();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> EventId {
        EventId(raw.to_string())
    }

    #[test]
    fn admits_fresh_id_once() {
        let dedup = Deduplicator::new(Duration::from_secs(60));
        assert!(dedup.admit(&id("ev-1")));
        assert!(!dedup.admit(&id("ev-1")));
        assert!(!dedup.admit(&id("ev-1")));
    }

    #[test]
    fn distinct_ids_are_independent() {
        let dedup = Deduplicator::new(Duration::from_secs(60));
        assert!(dedup.admit(&id("ev-1")));
        assert!(dedup.admit(&id("ev-2")));
        assert!(!dedup.admit(&id("ev-1")));
    }

    #[test]
    fn expired_id_is_admitted_again() {
        let dedup = Deduplicator::new(Duration::from_millis(30));
        assert!(dedup.admit(&id("ev-1")));
        assert!(!dedup.admit(&id("ev-1")));
        std::thread::sleep(Duration::from_millis(40));
        assert!(dedup.admit(&id("ev-1")));
    }

    #[test]
    fn sweep_reclaims_only_expired_entries() {
        let dedup = Deduplicator::new(Duration::from_millis(30));
        dedup.admit(&id("old"));
        std::thread::sleep(Duration::from_millis(40));
        dedup.admit(&id("fresh"));

        let reclaimed = dedup.sweep_expired();
        assert_eq!(reclaimed, 1);
        assert_eq!(dedup.len(), 1);
        // The fresh id is still a duplicate.
        assert!(!dedup.admit(&id("fresh")));
    }

    #[test]
    fn concurrent_admissions_yield_exactly_one_winner() {
        use std::sync::Arc;

        let dedup = Arc::new(Deduplicator::new(Duration::from_secs(60)));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let dedup = Arc::clone(&dedup);
            handles.push(std::thread::spawn(move || dedup.admit(&id("ev-race"))));
        }

        let admitted: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(admitted, 1);
    }
}
