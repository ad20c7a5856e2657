pub mod actor;
pub mod json_store;

pub use actor::{StoreHandle, spawn_store};
pub use json_store::JsonStore;

use crate::error::AppError;
use crate::model::{ActivityEntry, SubscriberId, TaskId, TaskState, TaskTemplate, TemplateId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::OffsetDateTime;

pub const ACTIVITY_LIMIT: usize = 500;

/// Durable CRUD over tasks, templates, subscribers and the activity log.
///
/// Implementations are driven from a single thread by [`spawn_store`]; they
/// do not need interior locking.
pub trait TaskStore: Send {
    fn load_all_tasks(&self) -> Result<Vec<TaskState>, AppError>;
    fn get_task(&self, id: &TaskId) -> Result<TaskState, AppError>;
    fn save_task(&mut self, task: &TaskState) -> Result<(), AppError>;
    fn update_task(&mut self, task: &TaskState) -> Result<(), AppError>;
    fn delete_task(&mut self, id: &TaskId) -> Result<TaskState, AppError>;

    /// Returns `true` when the subscriber was not registered before.
    fn register_subscriber(&mut self, id: &SubscriberId) -> Result<bool, AppError>;
    fn list_subscribers(&self) -> Result<Vec<SubscriberId>, AppError>;
    fn unregister_all_subscribers(&mut self) -> Result<usize, AppError>;

    fn save_template(&mut self, template: &TaskTemplate) -> Result<(), AppError>;
    fn update_template(&mut self, template: &TaskTemplate) -> Result<(), AppError>;
    fn list_templates(&self) -> Result<Vec<TaskTemplate>, AppError>;
    /// Runs every template up to `horizon` and stores the new tasks and
    /// generation points together. On error nothing is stored.
    fn expand_templates(
        &mut self,
        now: OffsetDateTime,
        horizon: OffsetDateTime,
    ) -> Result<Vec<TaskState>, AppError>;

    fn append_activity(&mut self, entry: ActivityEntry) -> Result<(), AppError>;
    /// Most recent entries first.
    fn list_activity(&self, limit: usize) -> Result<Vec<ActivityEntry>, AppError>;
}

/// Everything a store persists. Both store implementations apply their
/// operations to this value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default)]
    pub tasks: Vec<TaskState>,
    #[serde(default)]
    pub templates: Vec<TaskTemplate>,
    #[serde(default)]
    pub subscribers: BTreeSet<SubscriberId>,
    #[serde(default)]
    pub activity: Vec<ActivityEntry>,
}

impl StoreState {
    fn task_index(&self, id: &TaskId) -> Result<usize, AppError> {
        self.tasks
            .iter()
            .position(|task| task.id() == id)
            .ok_or_else(|| AppError::invalid_input("task not found"))
    }

    fn template_index(&self, id: &TemplateId) -> Result<usize, AppError> {
        self.templates
            .iter()
            .position(|template| &template.id == id)
            .ok_or_else(|| AppError::invalid_input("template not found"))
    }

    fn get_task(&self, id: &TaskId) -> Result<TaskState, AppError> {
        let index = self.task_index(id)?;
        Ok(self.tasks[index].clone())
    }

    fn save_task(&mut self, task: &TaskState) -> Result<(), AppError> {
        if self.tasks.iter().any(|existing| existing.id() == task.id()) {
            return Err(AppError::invalid_input("task already exists"));
        }
        self.tasks.push(task.clone());
        Ok(())
    }

    fn update_task(&mut self, task: &TaskState) -> Result<(), AppError> {
        let index = self.task_index(task.id())?;
        self.tasks[index] = task.clone();
        Ok(())
    }

    fn delete_task(&mut self, id: &TaskId) -> Result<TaskState, AppError> {
        let index = self.task_index(id)?;
        Ok(self.tasks.remove(index))
    }

    fn save_template(&mut self, template: &TaskTemplate) -> Result<(), AppError> {
        if self.templates.iter().any(|existing| existing.id == template.id) {
            return Err(AppError::invalid_input("template already exists"));
        }
        self.templates.push(template.clone());
        Ok(())
    }

    fn update_template(&mut self, template: &TaskTemplate) -> Result<(), AppError> {
        let index = self.template_index(&template.id)?;
        self.templates[index] = template.clone();
        Ok(())
    }

    fn expand_templates(
        &mut self,
        now: OffsetDateTime,
        horizon: OffsetDateTime,
    ) -> Result<Vec<TaskState>, AppError> {
        let mut staged = StoreState {
            tasks: self.tasks.clone(),
            templates: self.templates.clone(),
            ..StoreState::default()
        };
        let mut created = Vec::new();
        for index in 0..staged.templates.len() {
            let tasks = staged.templates[index].generate_tasks(now, horizon)?;
            for task in &tasks {
                staged.save_task(task)?;
            }
            created.extend(tasks);
        }

        self.tasks = staged.tasks;
        self.templates = staged.templates;
        Ok(created)
    }

    fn append_activity(&mut self, entry: ActivityEntry) {
        self.activity.push(entry);
        if self.activity.len() > ACTIVITY_LIMIT {
            let excess = self.activity.len() - ACTIVITY_LIMIT;
            self.activity.drain(..excess);
        }
    }

    fn recent_activity(&self, limit: usize) -> Vec<ActivityEntry> {
        self.activity.iter().rev().take(limit).cloned().collect()
    }
}

/// Volatile store, used by tests and by callers that bring their own
/// persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: StoreState,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for MemoryStore {
    fn load_all_tasks(&self) -> Result<Vec<TaskState>, AppError> {
        Ok(self.state.tasks.clone())
    }

    fn get_task(&self, id: &TaskId) -> Result<TaskState, AppError> {
        self.state.get_task(id)
    }

    fn save_task(&mut self, task: &TaskState) -> Result<(), AppError> {
        self.state.save_task(task)
    }

    fn update_task(&mut self, task: &TaskState) -> Result<(), AppError> {
        self.state.update_task(task)
    }

    fn delete_task(&mut self, id: &TaskId) -> Result<TaskState, AppError> {
        self.state.delete_task(id)
    }

    fn register_subscriber(&mut self, id: &SubscriberId) -> Result<bool, AppError> {
        Ok(self.state.subscribers.insert(id.clone()))
    }

    fn list_subscribers(&self) -> Result<Vec<SubscriberId>, AppError> {
        Ok(self.state.subscribers.iter().cloned().collect())
    }

    fn unregister_all_subscribers(&mut self) -> Result<usize, AppError> {
        let removed = self.state.subscribers.len();
        self.state.subscribers.clear();
        Ok(removed)
    }

    fn save_template(&mut self, template: &TaskTemplate) -> Result<(), AppError> {
        self.state.save_template(template)
    }

    fn update_template(&mut self, template: &TaskTemplate) -> Result<(), AppError> {
        self.state.update_template(template)
    }

    fn list_templates(&self) -> Result<Vec<TaskTemplate>, AppError> {
        Ok(self.state.templates.clone())
    }

    fn expand_templates(
        &mut self,
        now: OffsetDateTime,
        horizon: OffsetDateTime,
    ) -> Result<Vec<TaskState>, AppError> {
        self.state.expand_templates(now, horizon)
    }

    fn append_activity(&mut self, entry: ActivityEntry) -> Result<(), AppError> {
        self.state.append_activity(entry);
        Ok(())
    }

    fn list_activity(&self, limit: usize) -> Result<Vec<ActivityEntry>, AppError> {
        Ok(self.state.recent_activity(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::{ACTIVITY_LIMIT, MemoryStore, TaskStore};
    use crate::model::{
        ActivityAction, ActivityEntry, Recurrence, SubscriberId, TaskId, TaskState, TaskTemplate,
        TemplateKind,
    };
    use time::Duration;
    use time::macros::datetime;

    #[test]
    fn save_rejects_duplicate_ids() {
        let mut store = MemoryStore::new();
        let task = TaskState::one_time("demo", "").unwrap();

        store.save_task(&task).unwrap();
        let err = store.save_task(&task).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn update_and_delete_require_existing_task() {
        let mut store = MemoryStore::new();
        let task = TaskState::one_time("demo", "").unwrap();

        assert!(store.update_task(&task).is_err());
        assert!(store.delete_task(task.id()).is_err());
        assert!(store.get_task(&TaskId::from("missing")).is_err());
    }

    #[test]
    fn failed_expansion_stores_nothing() {
        let mut store = MemoryStore::new();
        let now = datetime!(2025-12-20 08:00 UTC);
        let healthy = TaskTemplate::new("standup", "", 24, TemplateKind::Periodic).unwrap();
        let mut broken = TaskTemplate::new("broken", "", 24, TemplateKind::Periodic).unwrap();
        broken.recurrence = Recurrence::Custom { hours: i64::MAX / 2 };
        store.save_template(&healthy).unwrap();
        store.save_template(&broken).unwrap();

        let err = store
            .expand_templates(now, now + Duration::days(2))
            .unwrap_err();

        assert_eq!(err.code(), "invalid_input");
        assert!(store.load_all_tasks().unwrap().is_empty());
        assert_eq!(store.list_templates().unwrap(), vec![healthy, broken]);
    }

    #[test]
    fn subscribers_are_a_set() {
        let mut store = MemoryStore::new();
        let id = SubscriberId::new("42");

        assert!(store.register_subscriber(&id).unwrap());
        assert!(!store.register_subscriber(&id).unwrap());
        assert_eq!(store.list_subscribers().unwrap(), vec![id]);

        assert_eq!(store.unregister_all_subscribers().unwrap(), 1);
        assert!(store.list_subscribers().unwrap().is_empty());
    }

    #[test]
    fn activity_is_capped_and_newest_first() {
        let mut store = MemoryStore::new();
        for index in 0..ACTIVITY_LIMIT + 10 {
            store
                .append_activity(ActivityEntry::new(
                    ActivityAction::Add,
                    None,
                    format!("entry {index}"),
                ))
                .unwrap();
        }

        let recent = store.list_activity(usize::MAX).unwrap();
        assert_eq!(recent.len(), ACTIVITY_LIMIT);
        assert_eq!(recent[0].message, format!("entry {}", ACTIVITY_LIMIT + 9));
        assert_eq!(recent.last().unwrap().message, "entry 10");
    }
}
