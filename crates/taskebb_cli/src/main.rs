mod cli;

use clap::Parser;
use cli::{Cli, Command, SubscribersCommand, TemplateCommand, collect_overrides};
use std::sync::Arc;
use tabled::{Table, Tabled};
use taskebb_core::config::{self, Config};
use taskebb_core::engine::{ReminderEngine, TickReport, tick};
use taskebb_core::error::AppError;
use taskebb_core::logging;
use taskebb_core::model::{
    ActivityEntry, MAX_INTERVAL_HOURS, TaskState, TaskTemplate, TaskType, TemplateKind,
};
use taskebb_core::notify::{Notifier, notifications_disabled, notifier_from_env};
use taskebb_core::storage::{JsonStore, StoreHandle, spawn_store};
use taskebb_core::task_api::{self, TaskSchedule};
use taskebb_core::telegram::TelegramClient;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

#[derive(Tabled)]
struct TaskRow {
    id: String,
    title: String,
    #[tabled(rename = "type")]
    task_type: &'static str,
    status: &'static str,
    next: String,
}

impl TaskRow {
    fn from_task(task: &TaskState, now: OffsetDateTime) -> Self {
        Self {
            id: task.id().to_string(),
            title: task.title().to_string(),
            task_type: task.task_type().as_str(),
            status: status_label(task, now),
            next: format_time(next_due(task)),
        }
    }
}

#[derive(Tabled)]
struct TemplateRow {
    id: String,
    title: String,
    kind: &'static str,
    every: String,
    #[tabled(rename = "last generated")]
    last_generated: String,
}

impl TemplateRow {
    fn from_template(template: &TaskTemplate) -> Self {
        Self {
            id: template.id.to_string(),
            title: template.title.clone(),
            kind: kind_label(template.kind),
            every: format!("{}h", template.interval_hours()),
            last_generated: format_time(template.last_generated),
        }
    }
}

fn status_label(task: &TaskState, now: OffsetDateTime) -> &'static str {
    if task.is_completed() {
        "completed"
    } else if task.is_expired(now) {
        "expired"
    } else {
        "open"
    }
}

fn kind_label(kind: TemplateKind) -> &'static str {
    match kind {
        TemplateKind::Periodic => "periodic",
        TemplateKind::DeadlineDriven => "deadline_driven",
    }
}

fn next_due(task: &TaskState) -> Option<OffsetDateTime> {
    match task.task_type() {
        TaskType::OneTime => None,
        TaskType::Deadline => task.deadline(),
        TaskType::Recurring => task.tracker().get_next_execution_time(),
    }
}

fn format_time(value: Option<OffsetDateTime>) -> String {
    value
        .and_then(|at| at.format(&Rfc3339).ok())
        .unwrap_or_else(|| "-".to_string())
}

fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339)
        .map_err(|err| AppError::invalid_input(format!("invalid timestamp '{raw}': {err}")))
}

fn json_error(err: serde_json::Error) -> AppError {
    AppError::invalid_data(err.to_string())
}

fn print_task_json(task: &TaskState) -> Result<(), AppError> {
    let value = serde_json::to_value(task).map_err(json_error)?;
    println!("{value}");
    Ok(())
}

fn print_tasks_json(tasks: &[TaskState]) -> Result<(), AppError> {
    let value = serde_json::to_value(tasks).map_err(json_error)?;
    println!("{value}");
    Ok(())
}

fn print_tasks_plain(tasks: &[TaskState]) {
    if tasks.is_empty() {
        println!("No tasks.");
        return;
    }

    let now = OffsetDateTime::now_utc();
    let rows: Vec<TaskRow> = tasks.iter().map(|task| TaskRow::from_task(task, now)).collect();
    println!("{}", Table::new(rows));
}

fn print_task_details(task: &TaskState) {
    let tracker = task.tracker();
    println!("id:          {}", task.id());
    println!("title:       {}", task.title());
    if !task.description().is_empty() {
        println!("description: {}", task.description());
    }
    println!("type:        {}", task.task_type().as_str());
    println!(
        "status:      {}",
        status_label(task, OffsetDateTime::now_utc())
    );
    println!("created:     {}", format_time(Some(task.created_at())));
    match task.task_type() {
        TaskType::OneTime => {}
        TaskType::Deadline => println!("deadline:    {}", format_time(task.deadline())),
        TaskType::Recurring => {
            println!("every:       {}h", task.interval_hours());
            println!("until:       {}", format_time(task.end_date()));
            println!("executions:  {}", tracker.execution_count());
            println!(
                "last done:   {}",
                format_time(tracker.get_last_execution())
            );
            println!(
                "next due:    {}",
                format_time(tracker.get_next_execution_time())
            );
        }
    }
}

fn print_activity_plain(entries: &[ActivityEntry]) {
    if entries.is_empty() {
        println!("No activity.");
        return;
    }

    for entry in entries {
        let task_id = entry
            .task_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} | {} | {} | {}",
            format_time(Some(entry.at)),
            entry.action.as_str(),
            task_id,
            entry.message
        );
    }
}

fn print_tick_report(report: &TickReport, json: bool) {
    if json {
        let failures: Vec<serde_json::Value> = report
            .failures
            .iter()
            .map(|failure| {
                serde_json::json!({
                    "task_id": failure.task_id,
                    "subscriber": failure.subscriber,
                    "error": failure.error.to_string(),
                })
            })
            .collect();
        let payload = serde_json::json!({
            "reminded": report.reminded,
            "pruned": report.pruned,
            "skipped": report.skipped,
            "failures": failures,
        });
        println!("{payload}");
        return;
    }

    println!(
        "Reminded {}, pruned {}, skipped {}, failures {}",
        report.reminded.len(),
        report.pruned.len(),
        report.skipped.len(),
        report.failures.len()
    );
    for failure in &report.failures {
        let subscriber = failure
            .subscriber
            .as_ref()
            .map(|subscriber| subscriber.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  {} -> {}: {}", failure.task_id, subscriber, failure.error);
    }
}

fn normalize_parse_error(err: clap::Error) -> AppError {
    let rendered = err.to_string();
    let first_line = rendered.lines().next().unwrap_or("invalid command").trim();
    let message = first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_string();
    AppError::invalid_input(message)
}

/// Reminders are recorded as delivered, so a pass without the chat channel
/// is refused unless notifications are switched off entirely.
fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>, AppError> {
    if notifications_disabled() {
        return notifier_from_env(None, false);
    }
    let token = config.require_bot_token()?;
    let remote: Arc<dyn Notifier> = Arc::new(TelegramClient::new(&config.api_base_url, token)?);
    notifier_from_env(Some(remote), config.desktop_notifications)
}

async fn serve(config: &Config, store: &StoreHandle) -> Result<(), AppError> {
    let token = config.require_bot_token()?;
    let engine_config = config.engine_config()?;
    let client = Arc::new(TelegramClient::new(&config.api_base_url, token)?);
    let remote: Arc<dyn Notifier> = client.clone();
    let notifier = notifier_from_env(Some(remote), config.desktop_notifications)?;

    let handle = ReminderEngine::new(store.clone(), client, notifier, engine_config).start();
    info!("serving; press Ctrl-C to stop");

    let signal = tokio::signal::ctrl_c().await;
    handle.stop().await;
    signal.map_err(AppError::from)
}

async fn run_command(
    command: Command,
    json: bool,
    config: &Config,
    store: &StoreHandle,
) -> Result<(), AppError> {
    match command {
        Command::Add {
            title,
            description,
            deadline,
            every_hours,
            until,
        } => {
            let schedule = match (deadline, every_hours) {
                (Some(deadline), _) => TaskSchedule::Deadline(parse_timestamp(&deadline)?),
                (None, Some(every_hours)) => TaskSchedule::Recurring {
                    every_hours,
                    until: until.as_deref().map(parse_timestamp).transpose()?,
                },
                (None, None) => TaskSchedule::OneTime,
            };

            let task = task_api::add_task(store, &title, &description, schedule).await?;
            if json {
                print_task_json(&task)?;
            } else {
                println!("Added task: {} ({})", task.title(), task.id());
            }
        }
        Command::List => {
            let tasks = task_api::list_tasks(store).await?;
            if json {
                print_tasks_json(&tasks)?;
            } else {
                print_tasks_plain(&tasks);
            }
        }
        Command::Show { id } => {
            let task = task_api::get_task(store, &id).await?;
            if json {
                print_task_json(&task)?;
            } else {
                print_task_details(&task);
            }
        }
        Command::Edit { id, new_title } => {
            let task = task_api::edit_task(store, &id, &new_title).await?;
            if json {
                print_task_json(&task)?;
            } else {
                println!("Updated task: {} ({})", task.title(), task.id());
            }
        }
        Command::Done { id } => {
            let task = task_api::complete_task(store, &id, OffsetDateTime::now_utc()).await?;
            if json {
                print_task_json(&task)?;
            } else if task.is_completed() {
                println!("Completed task: {} ({})", task.title(), task.id());
            } else {
                println!(
                    "Recorded execution: {} ({}), next due {}",
                    task.title(),
                    task.id(),
                    format_time(task.tracker().get_next_execution_time())
                );
            }
        }
        Command::Delete { id } => {
            let task = task_api::delete_task(store, &id).await?;
            if json {
                print_task_json(&task)?;
            } else {
                println!("Deleted task: {} ({})", task.title(), task.id());
            }
        }
        Command::Template { template } => match template {
            TemplateCommand::Add {
                title,
                description,
                interval_hours,
                deadline_driven,
            } => {
                let kind = if deadline_driven {
                    TemplateKind::DeadlineDriven
                } else {
                    TemplateKind::Periodic
                };
                let template =
                    task_api::add_template(store, &title, &description, interval_hours, kind)
                        .await?;
                if json {
                    let value = serde_json::to_value(&template).map_err(json_error)?;
                    println!("{value}");
                } else {
                    println!(
                        "Created template: {} ({}) every {}h",
                        template.title,
                        template.id,
                        template.interval_hours()
                    );
                }
            }
            TemplateCommand::List => {
                let templates = task_api::list_templates(store).await?;
                if json {
                    let value = serde_json::to_value(&templates).map_err(json_error)?;
                    println!("{value}");
                } else if templates.is_empty() {
                    println!("No templates.");
                } else {
                    let rows: Vec<TemplateRow> =
                        templates.iter().map(TemplateRow::from_template).collect();
                    println!("{}", Table::new(rows));
                }
            }
            TemplateCommand::Expand { horizon_hours } => {
                if horizon_hours <= 0 {
                    return Err(AppError::invalid_input(
                        "horizon must be greater than zero",
                    ));
                }
                if horizon_hours > MAX_INTERVAL_HOURS {
                    return Err(AppError::invalid_input(format!(
                        "horizon must be at most {MAX_INTERVAL_HOURS} hours"
                    )));
                }
                let now = OffsetDateTime::now_utc();
                let horizon = now
                    .checked_add(Duration::hours(horizon_hours))
                    .ok_or_else(|| AppError::invalid_input("horizon is out of range"))?;
                let created = task_api::expand_templates(store, now, horizon).await?;
                if json {
                    print_tasks_json(&created)?;
                } else {
                    println!("Generated {} task(s)", created.len());
                    for task in &created {
                        println!("  {} {}", task.id(), task.title());
                    }
                }
            }
        },
        Command::Subscribers { subscribers } => match subscribers {
            SubscribersCommand::List => {
                let subscribers = task_api::list_subscribers(store).await?;
                if json {
                    let value = serde_json::to_value(&subscribers).map_err(json_error)?;
                    println!("{value}");
                } else if subscribers.is_empty() {
                    println!("No subscribers.");
                } else {
                    for subscriber in &subscribers {
                        println!("{subscriber}");
                    }
                }
            }
            SubscribersCommand::Unlink => {
                let removed = task_api::unlink_subscribers(store).await?;
                if json {
                    println!("{}", serde_json::json!({ "removed": removed }));
                } else {
                    println!("Unlinked {removed} subscriber(s)");
                }
            }
        },
        Command::Log { limit } => {
            let entries = task_api::recent_activity(store, limit).await?;
            if json {
                let value = serde_json::to_value(&entries).map_err(json_error)?;
                println!("{value}");
            } else {
                print_activity_plain(&entries);
            }
        }
        Command::Remind => {
            let notifier = build_notifier(config)?;
            let report = tick(
                store,
                notifier.as_ref(),
                OffsetDateTime::now_utc(),
                config.prune_completed,
            )
            .await?;
            print_tick_report(&report, json);
        }
        Command::Serve => serve(config, store).await?,
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let overrides = collect_overrides(&cli.config_override)?;
    let load = config::load_config_with_fallback();
    let config = config::merge_overrides(&load.config, &overrides);

    // One-shot commands stay quiet unless asked; the server logs at info.
    let default_filter = match cli.command {
        Command::Serve => None,
        _ => Some("warn"),
    };
    logging::init_tracing(config.log_filter.as_deref().or(default_filter));

    if let Some(err) = load.error {
        warn!(error = %err, "falling back to default configuration");
    }

    let store = spawn_store(JsonStore::open(config.store_path()?)?)?;
    let result = run_command(cli.command, cli.json, &config, &store).await;
    store.shutdown().await;
    result
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => err.exit(),
        Err(err) => {
            eprintln!("ERROR: {}", normalize_parse_error(err));
            std::process::exit(1);
        }
    };

    if let Err(err) = run(cli).await {
        eprintln!("ERROR: {err}");
        std::process::exit(1);
    }
}
