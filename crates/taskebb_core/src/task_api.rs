use crate::error::AppError;
use crate::model::{
    ActivityAction, ActivityEntry, SubscriberId, TaskId, TaskState, TaskTemplate, TemplateKind,
};
use crate::storage::StoreHandle;
use time::OffsetDateTime;
use tracing::{info, warn};

/// How a new task is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSchedule {
    OneTime,
    Deadline(OffsetDateTime),
    Recurring {
        every_hours: i64,
        until: Option<OffsetDateTime>,
    },
}

pub async fn add_task(
    store: &StoreHandle,
    title: &str,
    description: &str,
    schedule: TaskSchedule,
) -> Result<TaskState, AppError> {
    let now = OffsetDateTime::now_utc();
    let task = match schedule {
        TaskSchedule::OneTime => TaskState::one_time(title, description)?,
        TaskSchedule::Deadline(deadline) => {
            TaskState::with_deadline(title, description, deadline, now)?
        }
        TaskSchedule::Recurring { every_hours, until } => {
            TaskState::recurring(title, description, every_hours, until, now)?
        }
    };

    store.save_task(task.clone()).await?;
    info!(task_id = %task.id(), task_type = task.task_type().as_str(), "task added");
    record(store, ActivityAction::Add, Some(task.id()), task.title()).await;

    Ok(task)
}

pub async fn edit_task(
    store: &StoreHandle,
    id: &str,
    new_title: &str,
) -> Result<TaskState, AppError> {
    let id = parse_task_id(id)?;
    let title = new_title.to_string();
    let task = store
        .modify_task(id, Box::new(move |task| task.set_title(&title)))
        .await?;

    record(store, ActivityAction::Edit, Some(task.id()), task.title()).await;
    Ok(task)
}

/// Records an execution at `now`. One-time and deadline tasks become
/// completed; recurring tasks stay open and feed their tracker.
pub async fn complete_task(
    store: &StoreHandle,
    id: &str,
    now: OffsetDateTime,
) -> Result<TaskState, AppError> {
    let id = parse_task_id(id)?;
    let task = store
        .modify_task(id, Box::new(move |task| task.mark_execution(now)))
        .await?;

    info!(
        task_id = %task.id(),
        completed = task.is_completed(),
        executions = task.tracker().execution_count(),
        "task execution recorded"
    );
    record(store, ActivityAction::Complete, Some(task.id()), task.title()).await;
    Ok(task)
}

pub async fn delete_task(store: &StoreHandle, id: &str) -> Result<TaskState, AppError> {
    let id = parse_task_id(id)?;
    let task = store.delete_task(id).await?;

    record(store, ActivityAction::Delete, Some(task.id()), task.title()).await;
    Ok(task)
}

pub async fn get_task(store: &StoreHandle, id: &str) -> Result<TaskState, AppError> {
    let id = parse_task_id(id)?;
    store.get_task(id).await
}

/// All tasks, oldest first.
pub async fn list_tasks(store: &StoreHandle) -> Result<Vec<TaskState>, AppError> {
    let mut tasks = store.load_all_tasks().await?;
    tasks.sort_by_key(|task| task.created_at());
    Ok(tasks)
}

pub async fn add_template(
    store: &StoreHandle,
    title: &str,
    description: &str,
    interval_hours: i64,
    kind: TemplateKind,
) -> Result<TaskTemplate, AppError> {
    let template = TaskTemplate::new(title, description, interval_hours, kind)?;
    store.save_template(template.clone()).await?;

    record(
        store,
        ActivityAction::Template,
        None,
        format!("template {} created: {}", template.id, template.title),
    )
    .await;
    Ok(template)
}

pub async fn list_templates(store: &StoreHandle) -> Result<Vec<TaskTemplate>, AppError> {
    store.list_templates().await
}

/// Expands every template up to `horizon` and returns the tasks it created.
pub async fn expand_templates(
    store: &StoreHandle,
    now: OffsetDateTime,
    horizon: OffsetDateTime,
) -> Result<Vec<TaskState>, AppError> {
    let created = store.expand_templates(now, horizon).await?;

    for task in &created {
        record(store, ActivityAction::Add, Some(task.id()), task.title()).await;
    }
    info!(created = created.len(), "templates expanded");
    Ok(created)
}

/// Returns `true` when the subscriber is new.
pub async fn register_subscriber(
    store: &StoreHandle,
    subscriber: SubscriberId,
) -> Result<bool, AppError> {
    let added = store.register_subscriber(subscriber.clone()).await?;
    if added {
        info!(%subscriber, "subscriber registered");
    }
    Ok(added)
}

pub async fn is_registered(
    store: &StoreHandle,
    subscriber: &SubscriberId,
) -> Result<bool, AppError> {
    Ok(store.list_subscribers().await?.contains(subscriber))
}

pub async fn list_subscribers(store: &StoreHandle) -> Result<Vec<SubscriberId>, AppError> {
    store.list_subscribers().await
}

/// Forgets every subscriber and returns how many were removed.
pub async fn unlink_subscribers(store: &StoreHandle) -> Result<usize, AppError> {
    let removed = store.unregister_all_subscribers().await?;
    info!(removed, "subscribers unlinked");
    Ok(removed)
}

pub async fn recent_activity(
    store: &StoreHandle,
    limit: usize,
) -> Result<Vec<ActivityEntry>, AppError> {
    store.list_activity(limit).await
}

/// Appends to the activity log. The log is informational, so a failure here
/// never undoes the operation being recorded.
pub(crate) async fn record<M: Into<String>>(
    store: &StoreHandle,
    action: ActivityAction,
    task_id: Option<&TaskId>,
    message: M,
) {
    let entry = ActivityEntry::new(action, task_id, message);
    if let Err(err) = store.append_activity(entry).await {
        warn!(error = %err, "failed to append activity");
    }
}

fn parse_task_id(id: &str) -> Result<TaskId, AppError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("id is required"));
    }
    Ok(TaskId::from(trimmed))
}
