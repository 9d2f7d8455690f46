// SMS Code Module - waiting on an externally delivered confirmation code
//
// The tracker runs a refetch timer and a countdown only while its wait
// condition holds, and raises the "code received" event on the edge.

pub mod countdown;
pub mod tracker;

use async_trait::async_trait;

use crate::backend::BackendError;
use crate::domain::{SmsCodeRequest, TaskId};
use crate::workflow::Step;

#[cfg(test)]
use mockall::automock;

pub use countdown::Countdown;
pub use tracker::{SmsCodeTracker, TrackerEvent};

/// Where the tracker gets fresh request rows from.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CodeSource: Send + Sync {
    /// Refetch and return the newest request for the task.
    async fn latest_request(&self, task_id: TaskId) -> Result<Option<SmsCodeRequest>, BackendError>;

    /// Insert a new request row; older rows are superseded, never edited.
    async fn create_request(&self, task_id: TaskId) -> Result<SmsCodeRequest, BackendError>;
}

/// Receives a copied code. Copying has no workflow consequence.
pub trait ClipboardSink {
    fn copy(&self, text: &str);
}

/// When the tracker should be running: the assignment sits at one of the
/// wait steps and its newest request has no code yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsWaitCondition {
    wait_steps: Vec<Step>,
}

impl Default for SmsWaitCondition {
    fn default() -> Self {
        Self::new(vec![Step::DOCUMENT_UPLOAD, Step::SMS_CODE])
    }
}

impl SmsWaitCondition {
    pub fn new(wait_steps: Vec<Step>) -> Self {
        Self { wait_steps }
    }

    pub fn wait_steps(&self) -> &[Step] {
        &self.wait_steps
    }

    pub fn is_wait_step(&self, step: Step) -> bool {
        self.wait_steps.contains(&step)
    }

    pub fn holds(&self, step: Step, request: Option<&SmsCodeRequest>) -> bool {
        self.is_wait_step(step) && request.is_some_and(|r| !r.has_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_condition_needs_wait_step_and_open_request() {
        let condition = SmsWaitCondition::default();
        let mut request = SmsCodeRequest::new(Uuid::new_v4(), Uuid::new_v4());

        assert!(condition.holds(Step::DOCUMENT_UPLOAD, Some(&request)));
        assert!(condition.holds(Step::SMS_CODE, Some(&request)));
        assert!(!condition.holds(Step::RATING, Some(&request)));
        assert!(!condition.holds(Step::SMS_CODE, None));

        request.code = Some("119900".into());
        assert!(!condition.holds(Step::SMS_CODE, Some(&request)));
    }
}
