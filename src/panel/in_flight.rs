use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::AssignmentId;

/// Assignments with a workflow mutation currently pending.
///
/// Shared by every view of one client so a second advance for the same
/// assignment is refused while the first is still on the wire.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    pending: Arc<Mutex<HashSet<AssignmentId>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, HashSet<AssignmentId>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark the assignment busy; `None` if it already is.
    pub fn try_begin(&self, assignment_id: AssignmentId) -> Option<InFlightGuard> {
        if !self.pending().insert(assignment_id) {
            return None;
        }
        Some(InFlightGuard {
            registry: self.clone(),
            assignment_id,
        })
    }

    pub fn is_in_flight(&self, assignment_id: AssignmentId) -> bool {
        self.pending().contains(&assignment_id)
    }
}

/// Clears the busy flag when dropped, whether the call succeeded or not.
#[derive(Debug)]
pub struct InFlightGuard {
    registry: InFlightRegistry,
    assignment_id: AssignmentId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.pending().remove(&self.assignment_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_second_begin_is_refused_until_guard_drops() {
        let registry = InFlightRegistry::new();
        let id = Uuid::new_v4();

        let guard = registry.try_begin(id).unwrap();
        assert!(registry.is_in_flight(id));
        assert!(registry.try_begin(id).is_none());
        assert!(registry.try_begin(Uuid::new_v4()).is_some());

        drop(guard);
        assert!(!registry.is_in_flight(id));
        assert!(registry.try_begin(id).is_some());
    }
}
