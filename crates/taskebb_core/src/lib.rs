pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod notify;
pub mod storage;
pub mod task_api;
pub mod telegram;
pub mod transport;

#[cfg(test)]
mod tests {
    use crate::error::AppError;
    use crate::model::{TaskState, TaskType};

    #[test]
    fn task_has_required_fields() {
        let task = TaskState::one_time("demo", "").unwrap();

        assert_eq!(task.title(), "demo");
        assert_eq!(task.description(), "");
        assert_eq!(task.task_type(), TaskType::OneTime);
        assert!(!task.is_completed());
        assert!(!task.is_recurring());
        assert_eq!(task.deadline(), None);
        assert_eq!(task.tracker().execution_count(), 0);
    }

    #[test]
    fn app_error_exposes_code() {
        let err = AppError::invalid_input("missing title");
        assert_eq!(err.code(), "invalid_input");
    }
}
