use crate::error::AppError;
use crate::model::ids::TaskId;
use crate::model::tracker::IntervalTracker;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Upper bound for any recurrence interval: ten years.
pub const MAX_INTERVAL_HOURS: i64 = 24 * 366 * 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    OneTime,
    Deadline,
    Recurring,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::OneTime => "one_time",
            TaskType::Deadline => "deadline",
            TaskType::Recurring => "recurring",
        }
    }
}

/// A task together with its lifecycle classification and interval tracker.
///
/// Fields are private: every mutation goes through a setter that checks the
/// invariants of the current [`TaskType`]. Deserialization checks the
/// invariants that do not depend on the clock: a non-empty title, a deadline
/// for deadline tasks and a bounded positive interval for recurring ones. A
/// deadline that was valid when set may have passed since, so it is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TaskRecord")]
pub struct TaskState {
    id: TaskId,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type")]
    task_type: TaskType,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    interval_hours: i64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    deadline: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    end_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(default)]
    tracker: IntervalTracker,
}

#[derive(Deserialize)]
struct TaskRecord {
    id: TaskId,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type")]
    task_type: TaskType,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    interval_hours: i64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    deadline: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    end_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(default)]
    tracker: IntervalTracker,
}

impl TryFrom<TaskRecord> for TaskState {
    type Error = String;

    fn try_from(record: TaskRecord) -> Result<Self, Self::Error> {
        if record.title.trim().is_empty() {
            return Err("title is required".into());
        }
        match record.task_type {
            TaskType::OneTime => {}
            TaskType::Deadline => {
                if record.deadline.is_none() {
                    return Err("deadline is required".into());
                }
            }
            TaskType::Recurring => {
                validate_interval_hours(record.interval_hours)
                    .map_err(|err| err.message().to_string())?;
            }
        }

        Ok(Self {
            id: record.id,
            title: record.title,
            description: record.description,
            task_type: record.task_type,
            completed: record.completed,
            interval_hours: record.interval_hours,
            deadline: record.deadline,
            end_date: record.end_date,
            created_at: record.created_at,
            tracker: record.tracker,
        })
    }
}

impl TaskState {
    pub fn one_time(title: &str, description: &str) -> Result<Self, AppError> {
        Ok(Self {
            id: TaskId::generate(),
            title: validate_title(title)?,
            description: description.trim().to_string(),
            task_type: TaskType::OneTime,
            completed: false,
            interval_hours: 0,
            deadline: None,
            end_date: None,
            created_at: OffsetDateTime::now_utc(),
            tracker: IntervalTracker::new(),
        })
    }

    pub fn with_deadline(
        title: &str,
        description: &str,
        deadline: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<Self, AppError> {
        let mut task = Self::one_time(title, description)?;
        task.deadline = Some(deadline);
        task.set_type(TaskType::Deadline, now)?;
        Ok(task)
    }

    pub fn recurring(
        title: &str,
        description: &str,
        interval_hours: i64,
        end_date: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> Result<Self, AppError> {
        let mut task = Self::one_time(title, description)?;
        task.interval_hours = interval_hours;
        task.end_date = end_date;
        task.set_type(TaskType::Recurring, now)?;
        Ok(task)
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_recurring(&self) -> bool {
        self.task_type == TaskType::Recurring
    }

    pub fn interval_hours(&self) -> i64 {
        self.interval_hours
    }

    pub fn interval(&self) -> Duration {
        Duration::hours(self.interval_hours)
    }

    pub fn deadline(&self) -> Option<OffsetDateTime> {
        self.deadline
    }

    pub fn end_date(&self) -> Option<OffsetDateTime> {
        self.end_date
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn tracker(&self) -> &IntervalTracker {
        &self.tracker
    }

    /// A recurring task whose end date has passed.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.is_recurring() && self.end_date.is_some_and(|end| end <= now)
    }

    pub fn set_title(&mut self, title: &str) -> Result<(), AppError> {
        self.title = validate_title(title)?;
        Ok(())
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = description.trim().to_string();
    }

    pub fn mark_completed(&mut self, completed: bool) {
        self.completed = completed;
    }

    pub fn set_type(&mut self, task_type: TaskType, now: OffsetDateTime) -> Result<(), AppError> {
        validate_for(
            task_type,
            self.interval_hours,
            self.deadline,
            self.end_date,
            now,
        )?;
        self.task_type = task_type;
        Ok(())
    }

    pub fn set_interval_hours(&mut self, hours: i64, now: OffsetDateTime) -> Result<(), AppError> {
        validate_for(self.task_type, hours, self.deadline, self.end_date, now)?;
        self.interval_hours = hours;
        Ok(())
    }

    pub fn set_deadline(
        &mut self,
        deadline: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> Result<(), AppError> {
        if let Some(value) = deadline
            && value < now
        {
            return Err(AppError::invalid_input("deadline must not be in the past"));
        }
        validate_for(self.task_type, self.interval_hours, deadline, self.end_date, now)?;
        self.deadline = deadline;
        Ok(())
    }

    pub fn set_end_date(
        &mut self,
        end_date: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> Result<(), AppError> {
        validate_for(self.task_type, self.interval_hours, self.deadline, end_date, now)?;
        self.end_date = end_date;
        Ok(())
    }

    /// Records that the task was carried out at `timestamp`.
    ///
    /// One-time and deadline tasks become completed. Recurring tasks feed the
    /// tracker and stay open; once the tracker holds two executions, further
    /// executions slide its window so the interval follows the latest pair.
    pub fn mark_execution(&mut self, timestamp: OffsetDateTime) -> Result<(), AppError> {
        match self.task_type {
            TaskType::OneTime | TaskType::Deadline => {
                self.completed = true;
                Ok(())
            }
            TaskType::Recurring => {
                if let Some(last) = self.tracker.get_last_execution()
                    && timestamp < last
                {
                    return Err(AppError::invalid_input(
                        "execution precedes the last recorded execution",
                    ));
                }
                if self.tracker.execution_count() < 2 {
                    self.tracker.mark_execution(timestamp)?;
                } else {
                    self.tracker.advance(timestamp)?;
                }
                Ok(())
            }
        }
    }

    /// Records a reminder sent at `now`. Recurring tasks move their tracker
    /// onto the latest due slot, keeping the learned interval; other tasks
    /// count it as an execution.
    pub fn mark_reminded(&mut self, now: OffsetDateTime) -> Result<(), AppError> {
        if !self.is_recurring() {
            return self.mark_execution(now);
        }
        self.tracker.catch_up(now)?;
        Ok(())
    }

    /// Copy of this task under a fresh id, used by template expansion.
    pub(crate) fn duplicate(&self) -> Self {
        Self {
            id: TaskId::generate(),
            created_at: OffsetDateTime::now_utc(),
            completed: false,
            tracker: IntervalTracker::new(),
            ..self.clone()
        }
    }
}

fn validate_title(title: &str) -> Result<String, AppError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("title is required"));
    }
    Ok(trimmed.to_string())
}

/// Accepts intervals in `1..=MAX_INTERVAL_HOURS`.
pub fn validate_interval_hours(hours: i64) -> Result<i64, AppError> {
    if hours <= 0 {
        return Err(AppError::invalid_input("interval must be greater than zero"));
    }
    if hours > MAX_INTERVAL_HOURS {
        return Err(AppError::invalid_input(format!(
            "interval must be at most {MAX_INTERVAL_HOURS} hours"
        )));
    }
    Ok(hours)
}

fn validate_for(
    task_type: TaskType,
    interval_hours: i64,
    deadline: Option<OffsetDateTime>,
    end_date: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> Result<(), AppError> {
    match task_type {
        TaskType::OneTime => Ok(()),
        TaskType::Deadline => match deadline {
            None => Err(AppError::invalid_input("deadline is required")),
            Some(value) if value < now => {
                Err(AppError::invalid_input("deadline must not be in the past"))
            }
            Some(_) => Ok(()),
        },
        TaskType::Recurring => {
            validate_interval_hours(interval_hours)?;
            if let Some(end) = end_date {
                if end <= now {
                    return Err(AppError::invalid_input("end date must be in the future"));
                }
                let first_slot = now.checked_add(Duration::hours(interval_hours));
                if first_slot.is_none_or(|slot| end < slot) {
                    return Err(AppError::invalid_input(
                        "end date must span at least one interval",
                    ));
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MAX_INTERVAL_HOURS, TaskState, TaskType};
    use time::macros::datetime;
    use time::{Duration, OffsetDateTime};

    const NOW: OffsetDateTime = datetime!(2025-12-20 12:00 UTC);

    #[test]
    fn one_time_task_trims_and_defaults() {
        let task = TaskState::one_time("  Buy milk ", " 2 liters ").unwrap();

        assert_eq!(task.title(), "Buy milk");
        assert_eq!(task.description(), "2 liters");
        assert_eq!(task.task_type(), TaskType::OneTime);
        assert!(!task.is_completed());
        assert!(!task.is_recurring());
    }

    #[test]
    fn blank_title_is_rejected() {
        let err = TaskState::one_time("   ", "").unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        let mut task = TaskState::one_time("demo", "").unwrap();
        assert!(task.set_title("").is_err());
        assert_eq!(task.title(), "demo");
    }

    #[test]
    fn recurring_requires_positive_interval() {
        for hours in [0, -1, -24] {
            let err = TaskState::recurring("water plants", "", hours, None, NOW).unwrap_err();
            assert_eq!(err.code(), "invalid_input");
        }

        let task = TaskState::recurring("water plants", "", 24, None, NOW).unwrap();
        assert!(task.is_recurring());
        assert_eq!(task.interval(), Duration::hours(24));
    }

    #[test]
    fn interval_is_bounded_above() {
        let err = TaskState::recurring("x", "", 100_000_000, None, NOW).unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        let mut task = TaskState::recurring("x", "", MAX_INTERVAL_HOURS, None, NOW).unwrap();
        assert!(task.set_interval_hours(i64::MAX, NOW).is_err());
        assert_eq!(task.interval_hours(), MAX_INTERVAL_HOURS);
    }

    #[test]
    fn recurring_end_date_must_span_an_interval() {
        let too_soon = NOW + Duration::hours(12);
        assert!(TaskState::recurring("x", "", 24, Some(too_soon), NOW).is_err());

        let past = NOW - Duration::hours(1);
        assert!(TaskState::recurring("x", "", 1, Some(past), NOW).is_err());

        let fine = NOW + Duration::days(3);
        let task = TaskState::recurring("x", "", 24, Some(fine), NOW).unwrap();
        assert_eq!(task.end_date(), Some(fine));
    }

    #[test]
    fn end_date_setter_keeps_previous_value_on_error() {
        let mut task = TaskState::recurring("x", "", 24, None, NOW).unwrap();

        assert!(task.set_end_date(Some(NOW + Duration::hours(2)), NOW).is_err());
        assert_eq!(task.end_date(), None);

        task.set_end_date(Some(NOW + Duration::days(2)), NOW).unwrap();
        assert_eq!(task.end_date(), Some(NOW + Duration::days(2)));

        task.set_end_date(None, NOW).unwrap();
        assert_eq!(task.end_date(), None);
    }

    #[test]
    fn deadline_must_not_be_in_the_past() {
        let err =
            TaskState::with_deadline("report", "", NOW - Duration::minutes(1), NOW).unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        let task = TaskState::with_deadline("report", "", NOW + Duration::days(1), NOW).unwrap();
        assert_eq!(task.task_type(), TaskType::Deadline);
    }

    #[test]
    fn switching_type_revalidates() {
        let mut task = TaskState::one_time("demo", "").unwrap();

        assert!(task.set_type(TaskType::Deadline, NOW).is_err());
        assert!(task.set_type(TaskType::Recurring, NOW).is_err());
        assert_eq!(task.task_type(), TaskType::OneTime);

        task.set_type(TaskType::OneTime, NOW).unwrap();
        task.set_deadline(Some(NOW + Duration::hours(2)), NOW).unwrap();
        task.set_type(TaskType::Deadline, NOW).unwrap();
        assert_eq!(task.task_type(), TaskType::Deadline);

        assert!(task.set_deadline(None, NOW).is_err());
        assert!(task.set_deadline(Some(NOW - Duration::hours(2)), NOW).is_err());
    }

    #[test]
    fn interval_changes_are_checked_for_recurring_tasks() {
        let mut task = TaskState::recurring("x", "", 6, None, NOW).unwrap();
        assert!(task.set_interval_hours(0, NOW).is_err());
        assert_eq!(task.interval_hours(), 6);

        task.set_interval_hours(48, NOW).unwrap();
        assert_eq!(task.interval_hours(), 48);
    }

    #[test]
    fn one_time_execution_completes_without_tracking() {
        let mut task = TaskState::one_time("demo", "").unwrap();
        task.mark_execution(NOW).unwrap();

        assert!(task.is_completed());
        assert_eq!(task.tracker().execution_count(), 0);
    }

    #[test]
    fn recurring_execution_feeds_tracker_and_stays_open() {
        let mut task = TaskState::recurring("stretch", "", 1, None, NOW).unwrap();
        task.mark_execution(NOW).unwrap();
        task.mark_execution(NOW + Duration::hours(2)).unwrap();

        assert!(!task.is_completed());
        assert_eq!(task.tracker().get_interval(), Ok(Duration::hours(2)));

        task.mark_execution(NOW + Duration::hours(5)).unwrap();
        assert_eq!(task.tracker().get_interval(), Ok(Duration::hours(3)));
        assert_eq!(
            task.tracker().get_next_execution_time(),
            Some(NOW + Duration::hours(8))
        );
    }

    #[test]
    fn late_reminder_keeps_learned_interval() {
        let mut task = TaskState::recurring("stretch", "", 1, None, NOW).unwrap();
        task.mark_execution(NOW).unwrap();
        task.mark_execution(NOW + Duration::hours(2)).unwrap();

        task.mark_reminded(NOW + Duration::hours(9)).unwrap();

        assert_eq!(task.tracker().get_interval(), Ok(Duration::hours(2)));
        assert_eq!(task.tracker().get_last_execution(), Some(NOW + Duration::hours(8)));
        assert_eq!(
            task.tracker().get_next_execution_time(),
            Some(NOW + Duration::hours(10))
        );
        assert!(!task.is_completed());
    }

    #[test]
    fn out_of_order_execution_is_rejected() {
        let mut task = TaskState::recurring("stretch", "", 1, None, NOW).unwrap();
        task.mark_execution(NOW).unwrap();

        let err = task.mark_execution(NOW - Duration::hours(1)).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
        assert_eq!(task.tracker().execution_count(), 1);
    }

    #[test]
    fn expiry_only_applies_to_recurring_tasks() {
        let end = NOW + Duration::days(2);
        let task = TaskState::recurring("x", "", 24, Some(end), NOW).unwrap();

        assert!(!task.is_expired(NOW));
        assert!(task.is_expired(end));
    }

    #[test]
    fn serde_round_trip_preserves_tracker_history() {
        let mut task = TaskState::recurring("x", "desc", 24, None, NOW).unwrap();
        task.mark_execution(NOW).unwrap();
        task.mark_execution(NOW + Duration::hours(3)).unwrap();

        let json = serde_json::to_string(&task).unwrap();
        let loaded: TaskState = serde_json::from_str(&json).unwrap();

        assert_eq!(loaded, task);
        assert_eq!(loaded.tracker().get_interval(), Ok(Duration::hours(3)));
    }

    #[test]
    fn deserialization_rejects_broken_records() {
        let task = TaskState::recurring("x", "", 24, None, NOW).unwrap();
        let valid = serde_json::to_value(&task).unwrap();

        let mut blank = valid.clone();
        blank["title"] = "  ".into();
        let err = serde_json::from_value::<TaskState>(blank).unwrap_err();
        assert!(err.to_string().contains("title is required"));

        for hours in [0, -5, 100_000_000] {
            let mut bad = valid.clone();
            bad["interval_hours"] = hours.into();
            assert!(serde_json::from_value::<TaskState>(bad).is_err());
        }

        let mut no_deadline = valid.clone();
        no_deadline["type"] = "deadline".into();
        assert!(serde_json::from_value::<TaskState>(no_deadline).is_err());
    }

    #[test]
    fn deserialization_keeps_deadlines_that_have_passed() {
        let task = TaskState::with_deadline("report", "", NOW + Duration::hours(1), NOW).unwrap();
        let json = serde_json::to_string(&task).unwrap();

        let loaded: TaskState = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.deadline(), Some(NOW + Duration::hours(1)));
    }
}
