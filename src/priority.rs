use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority levels for field tasks
/// Higher values sort first in an employee's task list
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Routine work (0)
    Low = 0,
    /// Default when the administrator picks nothing (1)
    Normal = 1,
    /// Customer is waiting (2)
    High = 2,
    /// Deadline today or escalated by an administrator (3)
    Urgent = 3,
}

impl TaskPriority {
    /// Parse the label an administrator picked; unknown labels fall back to normal
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => TaskPriority::Low,
            "high" => TaskPriority::High,
            "urgent" | "critical" => TaskPriority::Urgent,
            _ => TaskPriority::Normal,
        }
    }

    /// Get the numeric priority value
    pub fn value(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskPriority::Urgent => "URGENT",
            TaskPriority::High => "HIGH",
            TaskPriority::Normal => "NORMAL",
            TaskPriority::Low => "LOW",
        };
        write!(f, "{}", label)
    }
}
