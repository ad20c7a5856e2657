use std::sync::Arc;

use time::OffsetDateTime;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::EngineContext;
use crate::error::AppError;
use crate::model::{ActivityAction, SubscriberId, TaskId, TaskState};
use crate::notify::Notifier;
use crate::storage::StoreHandle;
use crate::task_api;

/// Outcome of one reminder evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tasks whose reminder went out and whose execution was recorded.
    pub reminded: Vec<TaskId>,
    /// Completed non-recurring tasks deleted during the tick.
    pub pruned: Vec<TaskId>,
    /// Due tasks left alone because their learned interval is not positive.
    pub skipped: Vec<TaskId>,
    pub failures: Vec<TickFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickFailure {
    pub task_id: TaskId,
    pub subscriber: Option<SubscriberId>,
    pub error: AppError,
}

/// Runs [`tick`] every `reminder_period` until `cancel` fires. The first
/// evaluation happens one period after start; missed ticks are skipped.
pub(crate) async fn reminder_loop(ctx: Arc<EngineContext>, cancel: CancellationToken) {
    let period = ctx.config.reminder_period;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(period_secs = period.as_secs(), "reminder loop started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let now = OffsetDateTime::now_utc();
        match tick(
            &ctx.store,
            ctx.notifier.as_ref(),
            now,
            ctx.config.prune_completed,
        )
        .await
        {
            Ok(report) => debug!(
                reminded = report.reminded.len(),
                pruned = report.pruned.len(),
                failures = report.failures.len(),
                "reminder tick finished"
            ),
            Err(err) => error!(error = %err, "reminder tick failed"),
        }
    }

    info!("reminder loop exited");
}

/// Evaluates every task once at `now`.
///
/// Each due recurring task is announced to every subscriber; when at least
/// one send succeeds a single execution is recorded for it. Only loading the
/// snapshot can fail the tick; per-task errors land in the report.
pub async fn tick(
    store: &StoreHandle,
    notifier: &dyn Notifier,
    now: OffsetDateTime,
    prune_completed: bool,
) -> Result<TickReport, AppError> {
    let subscribers = store.list_subscribers().await?;
    let tasks = store.load_all_tasks().await?;
    let mut report = TickReport::default();

    for task in &tasks {
        if task.is_recurring() {
            if is_due(task, now) {
                remind(store, notifier, &subscribers, task, now, &mut report).await;
            }
        } else if prune_completed && task.is_completed() {
            prune(store, notifier, &subscribers, task, &mut report).await;
        }
    }

    if !report.reminded.is_empty() || !report.pruned.is_empty() {
        info!(
            reminded = report.reminded.len(),
            pruned = report.pruned.len(),
            "reminders dispatched"
        );
    }
    Ok(report)
}

fn is_due(task: &TaskState, now: OffsetDateTime) -> bool {
    if task.is_completed() || task.is_expired(now) {
        return false;
    }
    task.tracker()
        .get_next_execution_time()
        .is_some_and(|next| next <= now)
}

async fn remind(
    store: &StoreHandle,
    notifier: &dyn Notifier,
    subscribers: &[SubscriberId],
    task: &TaskState,
    now: OffsetDateTime,
    report: &mut TickReport,
) {
    let task_id = task.id().clone();

    if let Ok(interval) = task.tracker().get_interval()
        && !interval.is_positive()
    {
        warn!(
            %task_id,
            interval_secs = interval.whole_seconds(),
            "skipping task with non-positive interval"
        );
        report.skipped.push(task_id);
        return;
    }

    if subscribers.is_empty() {
        debug!(%task_id, "task is due but nobody is subscribed");
        return;
    }

    let text = format!("Reminder: {}", task.title());
    let delivered = broadcast(notifier, subscribers, &task_id, &text, report).await;
    if delivered == 0 {
        return;
    }

    match store
        .modify_task(task_id.clone(), Box::new(move |task| task.mark_reminded(now)))
        .await
    {
        Ok(_) => {
            info!(%task_id, delivered, "reminder sent");
            task_api::record(store, ActivityAction::Remind, Some(&task_id), task.title()).await;
            report.reminded.push(task_id);
        }
        Err(err) => {
            warn!(%task_id, error = %err, "failed to record reminder execution");
            report.failures.push(TickFailure {
                task_id,
                subscriber: None,
                error: err,
            });
        }
    }
}

async fn prune(
    store: &StoreHandle,
    notifier: &dyn Notifier,
    subscribers: &[SubscriberId],
    task: &TaskState,
    report: &mut TickReport,
) {
    let task_id = task.id().clone();

    if let Err(err) = store.delete_task(task_id.clone()).await {
        warn!(%task_id, error = %err, "failed to prune completed task");
        report.failures.push(TickFailure {
            task_id,
            subscriber: None,
            error: err,
        });
        return;
    }

    let text = format!("Task removed: {}", task.title());
    broadcast(notifier, subscribers, &task_id, &text, report).await;
    task_api::record(store, ActivityAction::Prune, Some(&task_id), task.title()).await;
    report.pruned.push(task_id);
}

/// Sends `text` to every subscriber and returns how many sends succeeded.
async fn broadcast(
    notifier: &dyn Notifier,
    subscribers: &[SubscriberId],
    task_id: &TaskId,
    text: &str,
    report: &mut TickReport,
) -> usize {
    let mut delivered = 0;
    for subscriber in subscribers {
        match notifier.send(subscriber, text).await {
            Ok(()) => delivered += 1,
            Err(err) => {
                warn!(%task_id, %subscriber, error = %err, "notification failed");
                report.failures.push(TickFailure {
                    task_id: task_id.clone(),
                    subscriber: Some(subscriber.clone()),
                    error: err,
                });
            }
        }
    }
    delivered
}
