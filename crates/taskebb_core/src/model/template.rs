use crate::error::AppError;
use crate::model::ids::TemplateId;
use crate::model::task::{TaskState, validate_interval_hours};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

const HOURS_PER_DAY: i64 = 24;
const HOURS_PER_WEEK: i64 = 7 * HOURS_PER_DAY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    Daily,
    Weekly,
    Custom { hours: i64 },
}

impl Recurrence {
    pub fn from_hours(hours: i64) -> Self {
        match hours {
            HOURS_PER_DAY => Recurrence::Daily,
            HOURS_PER_WEEK => Recurrence::Weekly,
            other => Recurrence::Custom { hours: other },
        }
    }

    pub fn step(&self) -> Duration {
        match self {
            Recurrence::Daily => Duration::hours(HOURS_PER_DAY),
            Recurrence::Weekly => Duration::hours(HOURS_PER_WEEK),
            Recurrence::Custom { hours } => Duration::hours(*hours),
        }
    }

    pub fn hours(&self) -> i64 {
        match self {
            Recurrence::Daily => HOURS_PER_DAY,
            Recurrence::Weekly => HOURS_PER_WEEK,
            Recurrence::Custom { hours } => *hours,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// Expands into recurring tasks that remind on the template's cadence.
    Periodic,
    /// Expands into deadline tasks due one step after their slot.
    DeadlineDriven,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub id: TemplateId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub kind: TemplateKind,
    pub recurrence: Recurrence,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_generated: Option<OffsetDateTime>,
}

impl TaskTemplate {
    pub fn new(
        title: &str,
        description: &str,
        interval_hours: i64,
        kind: TemplateKind,
    ) -> Result<Self, AppError> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(AppError::invalid_input("title is required"));
        }
        validate_interval_hours(interval_hours)?;

        Ok(Self {
            id: TemplateId::generate(),
            title: trimmed.to_string(),
            description: description.trim().to_string(),
            kind,
            recurrence: Recurrence::from_hours(interval_hours),
            last_generated: None,
        })
    }

    pub fn interval_hours(&self) -> i64 {
        self.recurrence.hours()
    }

    /// Produces one task per slot from the last generation point (or `now`)
    /// up to, but excluding, `horizon`, and advances the generation point.
    pub fn generate_tasks(
        &mut self,
        now: OffsetDateTime,
        horizon: OffsetDateTime,
    ) -> Result<Vec<TaskState>, AppError> {
        let step = Duration::hours(validate_interval_hours(self.interval_hours())?);
        let mut cursor = self.last_generated.unwrap_or(now);
        if horizon <= cursor {
            return Ok(Vec::new());
        }

        let prototype = self.prototype(now)?;
        let mut tasks = Vec::new();

        while cursor < horizon {
            match self.kind {
                TemplateKind::Periodic => tasks.push(prototype.duplicate()),
                TemplateKind::DeadlineDriven => {
                    let due = next_slot(cursor, step)?;
                    if due >= now {
                        let mut task = prototype.duplicate();
                        task.set_deadline(Some(due), now)?;
                        tasks.push(task);
                    }
                }
            }
            cursor = next_slot(cursor, step)?;
        }

        self.last_generated = Some(horizon);
        Ok(tasks)
    }

    fn prototype(&self, now: OffsetDateTime) -> Result<TaskState, AppError> {
        match self.kind {
            TemplateKind::Periodic => TaskState::recurring(
                &self.title,
                &self.description,
                self.interval_hours(),
                None,
                now,
            ),
            TemplateKind::DeadlineDriven => TaskState::with_deadline(
                &self.title,
                &self.description,
                next_slot(now, self.recurrence.step())?,
                now,
            ),
        }
    }
}

fn next_slot(cursor: OffsetDateTime, step: Duration) -> Result<OffsetDateTime, AppError> {
    cursor
        .checked_add(step)
        .ok_or_else(|| AppError::invalid_input("generation slot is out of range"))
}
