use std::sync::Arc;

use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::EngineContext;
use crate::engine::commands::{Command, HELP_TEXT, parse_command};
use crate::error::AppError;
use crate::model::{TaskState, TemplateKind};
use crate::storage::StoreHandle;
use crate::task_api::{self, TaskSchedule};
use crate::transport::InboundMessage;

pub const NOT_REGISTERED_REPLY: &str = "Please /start first.";

/// Long-polls the inbound transport until `cancel` fires. Poll failures are
/// retried after `retry_delay` with the same offset.
pub(crate) async fn listener_loop(ctx: Arc<EngineContext>, cancel: CancellationToken) {
    let mut offset: i64 = 0;
    let mut attempt: u32 = 0;

    info!("listener started");

    loop {
        let polled = tokio::select! {
            _ = cancel.cancelled() => break,
            result = ctx.transport.poll(offset, ctx.config.poll_timeout) => result,
        };

        match polled {
            Ok(batch) => {
                attempt = 0;
                offset = batch.next_offset;
                for message in batch.messages {
                    handle_message(&ctx, message).await;
                }
            }
            Err(err) => {
                attempt += 1;
                warn!(offset, attempt, error = %err, "poll failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(ctx.config.retry_delay) => {}
                }
            }
        }
    }

    info!(offset, "listener exited");
}

async fn handle_message(ctx: &EngineContext, message: InboundMessage) {
    let Some(reply) = dispatch(&ctx.store, &message, OffsetDateTime::now_utc()).await else {
        debug!(subscriber = %message.subscriber, "ignoring plain text");
        return;
    };

    if let Err(err) = ctx.notifier.send(&message.subscriber, &reply).await {
        warn!(subscriber = %message.subscriber, error = %err, "failed to send reply");
    }
}

/// Applies one inbound message and returns the reply for its sender, or
/// `None` when the message is not a command.
pub async fn dispatch(
    store: &StoreHandle,
    message: &InboundMessage,
    now: OffsetDateTime,
) -> Option<String> {
    let command = parse_command(&message.text)?;
    debug!(subscriber = %message.subscriber, ?command, "command received");

    if !command.allowed_before_start() {
        match task_api::is_registered(store, &message.subscriber).await {
            Ok(true) => {}
            Ok(false) => return Some(NOT_REGISTERED_REPLY.to_string()),
            Err(err) => return Some(error_reply(&err)),
        }
    }

    let reply = match apply(store, message, command, now).await {
        Ok(reply) => reply,
        Err(err) => {
            warn!(subscriber = %message.subscriber, error = %err, "command failed");
            error_reply(&err)
        }
    };
    Some(reply)
}

async fn apply(
    store: &StoreHandle,
    message: &InboundMessage,
    command: Command,
    now: OffsetDateTime,
) -> Result<String, AppError> {
    match command {
        Command::Start => {
            let added = task_api::register_subscriber(store, message.subscriber.clone()).await?;
            Ok(if added {
                "Account linked.".to_string()
            } else {
                "Account already linked.".to_string()
            })
        }
        Command::AddTask { title, description } => {
            let task =
                task_api::add_task(store, &title, &description, TaskSchedule::OneTime).await?;
            Ok(format!("Task added: {} ({})", task.title(), task.id()))
        }
        Command::AddTemplate {
            title,
            description,
            interval_hours,
        } => {
            let template = task_api::add_template(
                store,
                &title,
                &description,
                interval_hours,
                TemplateKind::Periodic,
            )
            .await?;
            Ok(format!(
                "Template created: {} (every {}h)",
                template.title,
                template.interval_hours()
            ))
        }
        Command::CompleteTask { id } => {
            let task = task_api::complete_task(store, &id, now).await?;
            Ok(completion_reply(&task))
        }
        Command::List => {
            let tasks = task_api::list_tasks(store).await?;
            Ok(list_reply(&tasks))
        }
        Command::Help => Ok(HELP_TEXT.to_string()),
        Command::Invalid { usage } => Ok(format!("Usage: {usage}")),
        Command::Unknown(name) => Ok(format!("Unknown command {name}.\n{HELP_TEXT}")),
    }
}

fn completion_reply(task: &TaskState) -> String {
    if task.is_completed() {
        return format!("Task completed: {}", task.title());
    }
    match task.tracker().get_next_execution_time() {
        Some(next) => format!(
            "Execution recorded: {} (next around {})",
            task.title(),
            next.date()
        ),
        None => format!("Execution recorded: {}", task.title()),
    }
}

fn list_reply(tasks: &[TaskState]) -> String {
    let open: Vec<String> = tasks
        .iter()
        .filter(|task| !task.is_completed())
        .map(|task| format!("{} {} [{}]", task.id(), task.title(), task.task_type().as_str()))
        .collect();

    if open.is_empty() {
        "No open tasks.".to_string()
    } else {
        open.join("\n")
    }
}

fn error_reply(err: &AppError) -> String {
    format!("Error: {}", err.message())
}
