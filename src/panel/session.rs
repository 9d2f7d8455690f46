use std::sync::Arc;
use tracing::info;

use super::in_flight::InFlightRegistry;
use super::task_view::TaskView;
use super::ViewError;
use crate::backend::{BackendError, ChangeFeed, PanelBackend};
use crate::config::PanelConfig;
use crate::domain::{EmployeeId, TaskId};
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::sync::LiveSyncCoordinator;

/// A logged-in employee: one live sync coordinator shared by every task
/// view they open.
pub struct PanelSession {
    config: PanelConfig,
    coordinator: Arc<LiveSyncCoordinator>,
    in_flight: InFlightRegistry,
    shutdown: ShutdownCoordinator,
}

impl PanelSession {
    pub async fn login(
        backend: Arc<dyn PanelBackend>,
        feed: Arc<dyn ChangeFeed>,
        employee_id: EmployeeId,
        config: PanelConfig,
    ) -> Result<Self, BackendError> {
        let coordinator =
            Arc::new(LiveSyncCoordinator::start(backend, feed, employee_id, config.sync.clone()).await?);

        let shutdown = ShutdownCoordinator::default();
        shutdown.register(coordinator.clone());

        info!(employee_id = %employee_id, "Employee session started");
        Ok(Self {
            config,
            coordinator,
            in_flight: InFlightRegistry::new(),
            shutdown,
        })
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn employee_id(&self) -> EmployeeId {
        self.coordinator.employee_id()
    }

    pub fn coordinator(&self) -> &Arc<LiveSyncCoordinator> {
        &self.coordinator
    }

    /// Open a view on one of the employee's tasks.
    ///
    /// Views opened from the same session share the in-flight registry, so
    /// two tabs cannot race the same assignment forward.
    pub fn open_task(&self, task_id: TaskId) -> Result<Arc<TaskView>, ViewError> {
        let view = TaskView::open(
            self.coordinator.clone(),
            self.in_flight.clone(),
            &self.config,
            task_id,
        )?;
        self.shutdown.register(view.clone());
        Ok(view)
    }

    /// Close every open view, then stop live sync.
    pub async fn logout(&self) -> ShutdownReport {
        let report = self.shutdown.shutdown_all("logout").await;
        info!(
            employee_id = %self.employee_id(),
            completed = report.completed.len(),
            timed_out = report.timed_out.len(),
            "Employee session ended"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::domain::Task;
    use crate::panel::CloseReason;
    use crate::sync::ChannelMode;
    use uuid::Uuid;

    #[tokio::test(start_paused = true)]
    async fn test_logout_closes_views_and_sync() {
        let backend = Arc::new(InMemoryBackend::new());
        let employee = Uuid::new_v4();
        let task_id = backend.create_task(Task::new("Session")).await;
        backend.assign_task(task_id, employee).await.unwrap();

        let session = PanelSession::login(backend.clone(), backend.clone(), employee, PanelConfig::default())
            .await
            .unwrap();
        let view = session.open_task(task_id).unwrap();

        let report = session.logout().await;
        assert_eq!(report.completed.len(), 2);
        assert!(report.timed_out.is_empty());
        assert_eq!(view.close_reason(), Some(CloseReason::LoggedOut));
        assert_eq!(session.coordinator().mode(), ChannelMode::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_task_has_nothing_to_show() {
        let backend = Arc::new(InMemoryBackend::new());
        let session = PanelSession::login(backend.clone(), backend, Uuid::new_v4(), PanelConfig::default())
            .await
            .unwrap();
        assert!(matches!(
            session.open_task(Uuid::new_v4()),
            Err(ViewError::NotFound { .. })
        ));
    }
}
