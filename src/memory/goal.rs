//! Goal data types
//!
//! Goals are created and updated by the control loop; the Consolidator reads
//! them but never mutates them. Terminal statuses are final.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Goal lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    /// Being pursued
    Active,
    /// Waiting on something external
    Blocked,
    /// Reached; terminal
    Completed,
    /// Given up; terminal
    Abandoned,
}

impl GoalStatus {
    /// Terminal goals accept no further updates.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GoalStatus::Completed | GoalStatus::Abandoned)
    }
}

/// A tracked objective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Unique goal identifier
    pub id: Uuid,
    /// What the goal is
    pub description: String,
    /// Lifecycle status
    pub status: GoalStatus,
    /// Relative priority, higher is more urgent
    pub priority: i32,
    /// Completion fraction in [0, 1]
    pub progress: f64,
    /// Decomposed subgoals
    pub subgoals: Vec<String>,
    /// Optional deadline
    pub deadline: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    /// Create a new active goal
    pub fn new(description: impl Into<String>, priority: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            status: GoalStatus::Active,
            priority,
            progress: 0.0,
            subgoals: Vec::new(),
            deadline: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_goal_defaults() {
        let goal = Goal::new("ship the release", 5);
        assert_eq!(goal.status, GoalStatus::Active);
        assert!((goal.progress - 0.0).abs() < f64::EPSILON);
        assert!(goal.subgoals.is_empty());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!GoalStatus::Active.is_terminal());
        assert!(!GoalStatus::Blocked.is_terminal());
        assert!(GoalStatus::Completed.is_terminal());
        assert!(GoalStatus::Abandoned.is_terminal());
    }
}
