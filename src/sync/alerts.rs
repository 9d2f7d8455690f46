//! Edge detectors for user-facing alerts.
//!
//! Both detectors remember what was already observed and fire only on a
//! genuine transition, never on a plain refetch of unchanged data.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::{SmsCodeRequest, SmsRequestId, TaskId};

/// Alerts emitted by the live sync coordinator.
///
/// These feed the session-wide task list (badges, the task inbox). The
/// confirmation shown inside an open task is the view's
/// `Notice::SmsCodeReceived`, so each surface reports a code once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncAlert {
    TaskAssigned { task_id: TaskId, title: String },
    /// Marks the task in the inbox; never played as the confirmation itself.
    SmsCodeReceived { task_id: TaskId, request_id: SmsRequestId },
    AssignmentRevoked { task_id: TaskId },
    RefetchFailed { message: String },
}

/// Fires once per request when its code goes from absent to present.
#[derive(Debug, Default)]
pub struct CodeEdgeDetector {
    known: HashMap<SmsRequestId, bool>,
}

impl CodeEdgeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation; `true` exactly on the absent -> present edge.
    ///
    /// The first observation of a request only establishes its baseline, so
    /// a request first seen with a code already attached raises nothing.
    pub fn observe(&mut self, request: &SmsCodeRequest) -> bool {
        let has_code = request.has_code();
        matches!(self.known.insert(request.id, has_code), Some(false) if has_code)
    }

    pub fn forget(&mut self, request_id: SmsRequestId) {
        self.known.remove(&request_id);
    }

    pub fn tracked(&self) -> usize {
        self.known.len()
    }
}

/// Detects items that appear after the initial snapshot.
#[derive(Debug, Default)]
pub struct NewItemDetector {
    seen: HashSet<Uuid>,
    baseline: Option<DateTime<Utc>>,
    grace_until: Option<Instant>,
}

impl NewItemDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_seeded(&self) -> bool {
        self.baseline.is_some()
    }

    /// Record the initial snapshot silently.
    pub fn seed(&mut self, ids: impl IntoIterator<Item = Uuid>, loaded_at: DateTime<Utc>) {
        self.seen.extend(ids);
        self.baseline = Some(loaded_at);
    }

    /// Open the suppression window that follows subscription confirmation.
    pub fn start_grace(&mut self, now: Instant, grace: Duration) {
        self.grace_until = Some(now + grace);
    }

    fn in_grace(&self, now: Instant) -> bool {
        self.grace_until.is_some_and(|until| now < until)
    }

    /// `true` when the item is new and should be announced.
    ///
    /// During the grace window, unseen items created no later than the
    /// initial load are absorbed without an alert.
    pub fn observe(&mut self, id: Uuid, created_at: DateTime<Utc>, now: Instant) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        match self.baseline {
            None => false,
            Some(baseline) => !(self.in_grace(now) && created_at <= baseline),
        }
    }

    pub fn forget(&mut self, id: Uuid) {
        self.seen.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(code: Option<&str>) -> SmsCodeRequest {
        let mut request = SmsCodeRequest::new(Uuid::new_v4(), Uuid::new_v4());
        request.code = code.map(str::to_string);
        request
    }

    #[test]
    fn test_code_edge_fires_once() {
        let mut detector = CodeEdgeDetector::new();
        let mut r = request(None);

        assert!(!detector.observe(&r));
        assert!(!detector.observe(&r));

        r.code = Some("482913".into());
        assert!(detector.observe(&r));
        assert!(!detector.observe(&r));
        assert!(!detector.observe(&r));
    }

    #[test]
    fn test_code_present_on_first_sight_is_not_an_edge() {
        let mut detector = CodeEdgeDetector::new();
        assert!(!detector.observe(&request(Some("111111"))));
    }

    #[test]
    fn test_empty_code_counts_as_absent() {
        let mut detector = CodeEdgeDetector::new();
        let mut r = request(Some(""));
        assert!(!detector.observe(&r));
        r.code = Some("900100".into());
        assert!(detector.observe(&r));
    }

    #[test]
    fn test_new_requests_are_tracked_independently() {
        let mut detector = CodeEdgeDetector::new();
        let mut first = request(None);
        let mut second = request(None);
        detector.observe(&first);
        detector.observe(&second);

        second.code = Some("222222".into());
        assert!(detector.observe(&second));
        first.code = Some("111111".into());
        assert!(detector.observe(&first));
        assert_eq!(detector.tracked(), 2);
    }

    #[test]
    fn test_seeded_items_never_alert() {
        let mut detector = NewItemDetector::new();
        let existing = Uuid::new_v4();
        let now = Instant::now();
        detector.seed([existing], Utc::now());

        assert!(!detector.observe(existing, Utc::now(), now));
        assert!(detector.observe(Uuid::new_v4(), Utc::now(), now));
    }

    #[test]
    fn test_unseeded_detector_stays_silent() {
        let mut detector = NewItemDetector::new();
        assert!(!detector.observe(Uuid::new_v4(), Utc::now(), Instant::now()));
    }

    #[test]
    fn test_grace_window_absorbs_preexisting_items_only() {
        let mut detector = NewItemDetector::new();
        let loaded_at = Utc::now();
        let now = Instant::now();
        detector.seed([], loaded_at);
        detector.start_grace(now, Duration::from_secs(1));

        let late_visible = loaded_at - chrono::Duration::seconds(5);
        assert!(!detector.observe(Uuid::new_v4(), late_visible, now));

        let created_after = loaded_at + chrono::Duration::seconds(1);
        assert!(detector.observe(Uuid::new_v4(), created_after, now));

        let after_grace = now + Duration::from_secs(2);
        assert!(detector.observe(Uuid::new_v4(), late_visible, after_grace));
    }
}
