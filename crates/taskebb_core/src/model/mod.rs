pub mod ids;
pub mod task;
pub mod template;
pub mod tracker;

pub use ids::{SubscriberId, TaskId, TemplateId};
pub use task::{MAX_INTERVAL_HOURS, TaskState, TaskType, validate_interval_hours};
pub use template::{Recurrence, TaskTemplate, TemplateKind};
pub use tracker::{IntervalTracker, TrackerError};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Add,
    Edit,
    Complete,
    Delete,
    Remind,
    Prune,
    Template,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::Add => "add",
            ActivityAction::Edit => "edit",
            ActivityAction::Complete => "complete",
            ActivityAction::Delete => "delete",
            ActivityAction::Remind => "remind",
            ActivityAction::Prune => "prune",
            ActivityAction::Template => "template",
        }
    }
}

/// One line of the store's activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub action: ActivityAction,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    pub message: String,
}

impl ActivityEntry {
    pub fn new<M: Into<String>>(
        action: ActivityAction,
        task_id: Option<&TaskId>,
        message: M,
    ) -> Self {
        Self {
            at: OffsetDateTime::now_utc(),
            action,
            task_id: task_id.cloned(),
            message: message.into(),
        }
    }
}
