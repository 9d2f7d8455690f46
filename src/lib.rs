// Workforce Panel Library - gated task workflow with live sync
// This exposes the core components for testing and integration

pub mod backend;
pub mod cli;
pub mod config;
pub mod domain;
pub mod observability;
pub mod panel;
pub mod priority;
pub mod shutdown;
pub mod sms;
pub mod sync;
pub mod telemetry;
pub mod timers;
pub mod workflow;

// Re-export key types for easy access
pub use backend::{BackendError, ChangeFeed, InMemoryBackend, PanelBackend};
pub use config::{config, init_config, PanelConfig};
pub use domain::{Assignment, AssignmentPatch, SmsCodeRequest, Task, TaskStatus};
pub use observability::{OperationTimer, SyncMetrics, SyncStats};
pub use panel::{ActionFeedback, PanelSession, TaskView, ViewAction, ViewError};
pub use priority::TaskPriority;
pub use shutdown::{ShutdownCoordinator, Teardown};
pub use sms::{SmsCodeTracker, SmsWaitCondition};
pub use sync::{ChannelMode, LiveSyncCoordinator, SyncAlert, SyncedView};
pub use telemetry::{create_view_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
pub use timers::TimerSet;
pub use workflow::{DigitalDecision, GateReason, GateRejection, Step, UiHint, WorkflowMachine};
