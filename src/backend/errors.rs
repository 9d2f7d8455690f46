use thiserror::Error;
use uuid::Uuid;

/// Failures of remote calls. All of them are transient from the workflow's
/// point of view: state is left as it was and the employee may retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Network error: {message}")]
    Network { message: String },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("Rejected by backend: {message}")]
    Rejected { message: String },
    #[error("Backend unavailable: {message}")]
    Unavailable { message: String },
}

impl BackendError {
    pub fn network(message: impl Into<String>) -> Self {
        BackendError::Network {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        BackendError::Rejected {
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        BackendError::NotFound { entity, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound { .. })
    }
}
