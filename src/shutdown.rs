use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Something owning timers or background tasks that must stop on logout.
#[async_trait]
pub trait Teardown: Send + Sync {
    fn label(&self) -> String;

    /// Cancel everything this owner started. Must be idempotent.
    async fn shutdown(&self);
}

/// Outcome of a [`ShutdownCoordinator::shutdown_all`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub completed: Vec<String>,
    pub timed_out: Vec<String>,
}

/// Graceful shutdown coordinator for one logged-in session
pub struct ShutdownCoordinator {
    per_owner_timeout: Duration,
    owners: Mutex<Vec<Arc<dyn Teardown>>>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl ShutdownCoordinator {
    pub fn new(per_owner_timeout: Duration) -> Self {
        Self {
            per_owner_timeout,
            owners: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, owner: Arc<dyn Teardown>) {
        if let Ok(mut owners) = self.owners.lock() {
            owners.push(owner);
        }
    }

    pub fn registered(&self) -> usize {
        self.owners.lock().map(|owners| owners.len()).unwrap_or(0)
    }

    /// Tear down every registered owner, most recent first.
    pub async fn shutdown_all(&self, reason: &str) -> ShutdownReport {
        info!(reason, "Initiating shutdown of all session timers...");

        let owners: Vec<Arc<dyn Teardown>> = match self.owners.lock() {
            Ok(mut owners) => owners.drain(..).rev().collect(),
            Err(_) => Vec::new(),
        };

        let mut report = ShutdownReport::default();
        for owner in owners {
            let label = owner.label();
            match timeout(self.per_owner_timeout, owner.shutdown()).await {
                Ok(()) => {
                    info!(owner = %label, "Stopped");
                    report.completed.push(label);
                }
                Err(_) => {
                    warn!(owner = %label, "Timeout waiting for shutdown");
                    report.timed_out.push(label);
                }
            }
        }

        info!(
            completed = report.completed.len(),
            timed_out = report.timed_out.len(),
            "Shutdown completed"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        name: &'static str,
        stops: AtomicUsize,
        hang: bool,
    }

    #[async_trait]
    impl Teardown for Counting {
        fn label(&self) -> String {
            self.name.to_string()
        }

        async fn shutdown(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
        }
    }

    fn counting(name: &'static str, hang: bool) -> Arc<Counting> {
        Arc::new(Counting {
            name,
            stops: AtomicUsize::new(0),
            hang,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_reaches_every_owner_once() {
        let coordinator = ShutdownCoordinator::default();
        let first = counting("first", false);
        let second = counting("second", false);
        coordinator.register(first.clone());
        coordinator.register(second.clone());

        let report = coordinator.shutdown_all("logout").await;
        assert_eq!(report.completed, vec!["second".to_string(), "first".to_string()]);
        assert_eq!(coordinator.registered(), 0);

        coordinator.shutdown_all("logout").await;
        assert_eq!(first.stops.load(Ordering::SeqCst), 1);
        assert_eq!(second.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_owner_is_reported() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        coordinator.register(counting("stuck", true));
        coordinator.register(counting("fine", false));

        let report = coordinator.shutdown_all("logout").await;
        assert_eq!(report.completed, vec!["fine".to_string()]);
        assert_eq!(report.timed_out, vec!["stuck".to_string()]);
    }
}
