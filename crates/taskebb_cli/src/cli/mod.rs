use clap::{Parser, Subcommand};
use taskebb_core::config::{ConfigKey, ConfigOverrides};
use taskebb_core::error::AppError;

#[derive(Parser, Debug)]
#[command(author, version, about = "Tasks that learn their own rhythm", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Override configuration values (format KEY=VALUE)
    #[arg(long = "config-override", value_name = "KEY=VALUE", global = true)]
    pub config_override: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a new task
    ///
    /// Example: taskebb add "Buy milk"
    /// Example: taskebb add "File taxes" --deadline 2026-04-30T17:00:00Z
    /// Example: taskebb add "Water plants" --every-hours 72
    Add {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// RFC 3339 timestamp the task is due by
        #[arg(long, value_name = "RFC3339", conflicts_with = "every_hours")]
        deadline: Option<String>,
        /// Initial reminder cadence for a recurring task
        #[arg(long, value_name = "HOURS")]
        every_hours: Option<i64>,
        /// Last moment a recurring task stays active
        #[arg(long, value_name = "RFC3339", requires = "every_hours")]
        until: Option<String>,
    },
    /// List all tasks
    ///
    /// Example: taskebb list
    List,
    /// Show details of a task
    ///
    /// Example: taskebb show 1767225600000_0042
    Show { id: String },
    /// Edit a task's title
    ///
    /// Example: taskebb edit 1767225600000_0042 "Buy oat milk"
    Edit { id: String, new_title: String },
    /// Record an execution; one-time and deadline tasks become completed
    ///
    /// Example: taskebb done 1767225600000_0042
    Done { id: String },
    /// Delete a task
    ///
    /// Example: taskebb delete 1767225600000_0042
    Delete { id: String },
    /// Manage task templates
    Template {
        #[command(subcommand)]
        template: TemplateCommand,
    },
    /// Manage chat subscribers
    Subscribers {
        #[command(subcommand)]
        subscribers: SubscribersCommand,
    },
    /// Show recent activity, newest first
    ///
    /// Example: taskebb log --limit 10
    Log {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Run a single reminder pass now
    ///
    /// Example: taskebb remind
    Remind,
    /// Run the bot until Ctrl-C
    ///
    /// Example: TASKEBB_BOT_TOKEN=123:abc taskebb serve
    Serve,
}

#[derive(Subcommand, Debug)]
pub enum TemplateCommand {
    /// Create a template
    ///
    /// Example: taskebb template add "Standup notes" "post in channel" 24
    Add {
        title: String,
        description: String,
        interval_hours: i64,
        /// Generate deadline tasks instead of recurring ones
        #[arg(long)]
        deadline_driven: bool,
    },
    /// List templates
    ///
    /// Example: taskebb template list
    List,
    /// Generate tasks from every template up to a horizon
    ///
    /// Example: taskebb template expand --horizon-hours 48
    Expand {
        #[arg(long, default_value_t = 24)]
        horizon_hours: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum SubscribersCommand {
    /// List registered subscribers
    ///
    /// Example: taskebb subscribers list
    List,
    /// Forget every registered subscriber
    ///
    /// Example: taskebb subscribers unlink
    Unlink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfigOverride {
    pub key: ConfigKey,
    pub value: String,
}

/// Parse a raw `KEY=VALUE` override string into a structured target.
pub fn parse_config_override(raw: &str) -> Result<ParsedConfigOverride, String> {
    let trimmed = raw.trim();
    let (key_raw, value_raw) = trimmed
        .split_once('=')
        .ok_or_else(|| "override must be in KEY=VALUE format".to_string())?;

    let canonical =
        canonicalize_flag_name(key_raw).ok_or_else(|| "override key cannot be empty".to_string())?;
    let key = ConfigKey::from_name(&canonical)
        .ok_or_else(|| format!("unknown config field '{canonical}'"))?;

    Ok(ParsedConfigOverride {
        key,
        value: value_raw.trim().to_string(),
    })
}

/// Folds every `--config-override` flag into one set of overrides; later
/// flags win.
pub fn collect_overrides(raw: &[String]) -> Result<ConfigOverrides, AppError> {
    let mut overrides = ConfigOverrides::default();
    for entry in raw {
        let parsed = parse_config_override(entry).map_err(AppError::invalid_input)?;
        overrides.set(parsed.key, &parsed.value)?;
    }
    Ok(overrides)
}

fn canonicalize_flag_name(name: &str) -> Option<String> {
    let mut cleaned = String::new();
    let mut previous_underscore = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch.to_ascii_lowercase());
            previous_underscore = false;
        } else if !previous_underscore && !cleaned.is_empty() {
            cleaned.push('_');
            previous_underscore = true;
        }
    }

    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
