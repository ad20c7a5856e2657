pub const ADD_TASK_USAGE: &str = "/add_task <title>[, <description>]";
pub const ADD_TEMPLATE_USAGE: &str = "/add_template <title>, <description>, <interval_hours>";
pub const COMPLETE_TASK_USAGE: &str = "/complete_task <id>";

pub const HELP_TEXT: &str = "Commands:\n\
/start - link this chat\n\
/add_task <title>[, <description>] - add a one-time task\n\
/add_template <title>, <description>, <interval_hours> - add a periodic template\n\
/complete_task <id> - record a completion\n\
/list - show open tasks\n\
/help - show this message";

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    AddTask {
        title: String,
        description: String,
    },
    AddTemplate {
        title: String,
        description: String,
        interval_hours: i64,
    },
    CompleteTask {
        id: String,
    },
    List,
    Help,
    /// A known command with missing or malformed arguments.
    Invalid {
        usage: &'static str,
    },
    Unknown(String),
}

impl Command {
    /// Commands an unregistered sender may use.
    pub fn allowed_before_start(&self) -> bool {
        matches!(self, Command::Start | Command::Help)
    }
}

/// Parses a chat message. Plain text that is not a slash command yields
/// `None`.
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }

    let (head, rest) = match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    };
    let name = head.split('@').next().unwrap_or(head);

    let command = match name {
        "/start" => Command::Start,
        "/add_task" => parse_add_task(rest),
        "/add_template" => parse_add_template(rest),
        "/complete_task" => match rest.split_whitespace().next() {
            Some(id) => Command::CompleteTask { id: id.to_string() },
            None => Command::Invalid {
                usage: COMPLETE_TASK_USAGE,
            },
        },
        "/list" => Command::List,
        "/help" => Command::Help,
        other => Command::Unknown(other.to_string()),
    };

    Some(command)
}

fn parse_add_task(rest: &str) -> Command {
    let (title, description) = match rest.split_once(',') {
        Some((title, description)) => (title.trim(), description.trim()),
        None => (rest, ""),
    };

    if title.is_empty() {
        return Command::Invalid {
            usage: ADD_TASK_USAGE,
        };
    }

    Command::AddTask {
        title: title.to_string(),
        description: description.to_string(),
    }
}

// The title ends at the first comma and the interval starts after the last,
// so the description may itself contain commas.
fn parse_add_template(rest: &str) -> Command {
    let invalid = Command::Invalid {
        usage: ADD_TEMPLATE_USAGE,
    };

    let Some((title, tail)) = rest.split_once(',') else {
        return invalid;
    };
    let Some((description, interval)) = tail.rsplit_once(',') else {
        return invalid;
    };
    let title = title.trim();
    let Ok(interval_hours) = interval.trim().parse::<i64>() else {
        return invalid;
    };
    if title.is_empty() {
        return invalid;
    }

    Command::AddTemplate {
        title: title.to_string(),
        description: description.trim().to_string(),
        interval_hours,
    }
}
