//! Per-segment run state.
//!
//! Each segment's scheduler task owns one `SegmentState`; the dashboard
//! reads point-in-time snapshots. This replaces ad-hoc global status maps
//! with an explicit object: the run flag is an atomic (checked on every
//! loop iteration and inside sleeps), everything else sits behind an
//! async `RwLock`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::hours;
use crate::types::{Segment, TargetDecision};

/// Most-recent entries kept in the in-memory log feed.
pub const LOG_CAPACITY: usize = 50;

struct Inner {
    last_update: Option<DateTime<Utc>>,
    target: Option<TargetDecision>,
    /// Newest first.
    log: VecDeque<String>,
}

pub struct SegmentState {
    segment: Segment,
    running: AtomicBool,
    /// Bumped on every successful start. A loop that captured an older
    /// generation exits even if the flag has been re-raised in the
    /// meantime, so a quick stop/start can never leave two loops alive.
    generation: AtomicU64,
    inner: RwLock<Inner>,
}

impl SegmentState {
    pub fn new(segment: Segment) -> Self {
        Self {
            segment,
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            inner: RwLock::new(Inner {
                last_update: None,
                target: None,
                log: VecDeque::with_capacity(LOG_CAPACITY),
            }),
        }
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Transition Stopped → Running. Returns the new run generation, or
    /// `None` if already running, in which case the caller must not
    /// spawn a second loop.
    pub fn try_start(&self) -> Option<u64> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Some(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
        } else {
            None
        }
    }

    /// Whether the loop holding `generation` should keep running.
    pub fn is_live(&self, generation: u64) -> bool {
        self.is_running() && self.generation.load(Ordering::SeqCst) == generation
    }

    /// Request cooperative shutdown; the loop observes the flag at its
    /// next check point.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Append a timestamped line to the bounded log feed (newest first).
    pub async fn push_log(&self, msg: &str) {
        let line = format!("[{}] {}", hours::kst_clock(), msg);
        let mut inner = self.inner.write().await;
        inner.log.push_front(line);
        inner.log.truncate(LOG_CAPACITY);
    }

    pub async fn set_target(&self, target: TargetDecision) {
        self.inner.write().await.target = Some(target);
    }

    /// Stamp `last_update` with the current time.
    pub async fn touch(&self) {
        self.inner.write().await.last_update = Some(Utc::now());
    }

    /// Point-in-time copy for the status endpoint.
    pub async fn snapshot(&self) -> StatusSnapshot {
        let inner = self.inner.read().await;
        StatusSnapshot {
            segment: self.segment,
            is_running: self.is_running(),
            target: inner.target,
            last_update: inner.last_update.map(|t| t.to_rfc3339()),
            log: inner.log.iter().cloned().collect(),
        }
    }
}

/// Read-only view of a segment's state, serialized to the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub segment: Segment,
    pub is_running: bool,
    pub target: Option<TargetDecision>,
    pub last_update: Option<String>,
    pub log: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssetRole, Candidate};

    #[tokio::test]
    async fn test_log_is_bounded_and_newest_first() {
        let state = SegmentState::new(Segment::Domestic);
        for i in 0..(LOG_CAPACITY + 5) {
            state.push_log(&format!("event {i}")).await;
        }
        let snap = state.snapshot().await;
        assert_eq!(snap.log.len(), LOG_CAPACITY);
        assert!(snap.log[0].contains("event 54"));
        assert!(snap.log.last().unwrap().contains("event 5"));
    }

    #[test]
    fn test_try_start_rejects_second_start() {
        let state = SegmentState::new(Segment::Overseas);
        assert_eq!(state.try_start(), Some(1));
        assert_eq!(state.try_start(), None);
        state.request_stop();
        assert_eq!(state.try_start(), Some(2));
    }

    #[test]
    fn test_stale_generation_is_not_live() {
        let state = SegmentState::new(Segment::Overseas);
        let first = state.try_start().unwrap();
        assert!(state.is_live(first));

        // stop + immediate restart: the old loop's generation is dead
        // even though the run flag is raised again.
        state.request_stop();
        let second = state.try_start().unwrap();
        assert!(!state.is_live(first));
        assert!(state.is_live(second));
    }

    #[tokio::test]
    async fn test_snapshot_carries_target() {
        let state = SegmentState::new(Segment::Domestic);
        assert!(state.snapshot().await.target.is_none());

        state
            .set_target(TargetDecision {
                candidate: Candidate {
                    code: "069500",
                    name: "KODEX 200",
                    exchange: "KRX",
                    role: AssetRole::Risky,
                },
                segment: Segment::Domestic,
                decided_at: Utc::now(),
            })
            .await;
        state.touch().await;

        let snap = state.snapshot().await;
        assert_eq!(snap.target.unwrap().candidate.code, "069500");
        assert!(snap.last_update.is_some());
        assert!(!snap.is_running);
    }
}
