use crate::error::AppError;
use crate::model::{ActivityEntry, SubscriberId, TaskId, TaskState, TaskTemplate};
use crate::storage::{StoreState, TaskStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

pub const SCHEMA_VERSION: u32 = 1;
const STORE_FILE_NAME: &str = "store.json";
const STORE_ENV_VAR: &str = "TASKEBB_STORE_PATH";

#[derive(Debug, Serialize, Deserialize)]
struct StoredState {
    schema_version: u32,
    #[serde(flatten)]
    state: StoreState,
}

pub fn store_path() -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(STORE_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata).join("taskebb").join(STORE_FILE_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("taskebb")
            .join(STORE_FILE_NAME))
    }
}

pub fn load_state(path: &Path) -> Result<StoreState, AppError> {
    if !path.exists() {
        return Ok(StoreState::default());
    }

    let content = std::fs::read_to_string(path).map_err(|err| AppError::io(err.to_string()))?;
    let stored: StoredState =
        serde_json::from_str(&content).map_err(|err| AppError::invalid_data(err.to_string()))?;

    if stored.schema_version != SCHEMA_VERSION {
        return Err(AppError::invalid_data("schema_version mismatch"));
    }

    Ok(stored.state)
}

pub fn save_state(path: &Path, state: &StoreState) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| AppError::io(err.to_string()))?;
    }

    let stored = StoredState {
        schema_version: SCHEMA_VERSION,
        state: state.clone(),
    };
    let content = serde_json::to_string_pretty(&stored)
        .map_err(|err| AppError::invalid_data(err.to_string()))?;
    std::fs::write(path, content).map_err(|err| AppError::io(err.to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, permissions).map_err(|err| AppError::io(err.to_string()))?;
    }

    Ok(())
}

/// File-backed store. Every operation reads the document, applies the change
/// and writes it back, so edits made by another process between operations
/// are picked up.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    /// Opens the store at `path`, failing early if an existing file is
    /// unreadable.
    pub fn open(path: PathBuf) -> Result<Self, AppError> {
        load_state(&path)?;
        Ok(Self { path })
    }

    fn read<T>(&self, f: impl FnOnce(&StoreState) -> Result<T, AppError>) -> Result<T, AppError> {
        let state = load_state(&self.path)?;
        f(&state)
    }

    fn write<T>(
        &mut self,
        f: impl FnOnce(&mut StoreState) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut state = load_state(&self.path)?;
        let result = f(&mut state)?;
        save_state(&self.path, &state)?;
        Ok(result)
    }
}

impl TaskStore for JsonStore {
    fn load_all_tasks(&self) -> Result<Vec<TaskState>, AppError> {
        self.read(|state| Ok(state.tasks.clone()))
    }

    fn get_task(&self, id: &TaskId) -> Result<TaskState, AppError> {
        self.read(|state| state.get_task(id))
    }

    fn save_task(&mut self, task: &TaskState) -> Result<(), AppError> {
        self.write(|state| state.save_task(task))
    }

    fn update_task(&mut self, task: &TaskState) -> Result<(), AppError> {
        self.write(|state| state.update_task(task))
    }

    fn delete_task(&mut self, id: &TaskId) -> Result<TaskState, AppError> {
        self.write(|state| state.delete_task(id))
    }

    fn register_subscriber(&mut self, id: &SubscriberId) -> Result<bool, AppError> {
        self.write(|state| Ok(state.subscribers.insert(id.clone())))
    }

    fn list_subscribers(&self) -> Result<Vec<SubscriberId>, AppError> {
        self.read(|state| Ok(state.subscribers.iter().cloned().collect()))
    }

    fn unregister_all_subscribers(&mut self) -> Result<usize, AppError> {
        self.write(|state| {
            let removed = state.subscribers.len();
            state.subscribers.clear();
            Ok(removed)
        })
    }

    fn save_template(&mut self, template: &TaskTemplate) -> Result<(), AppError> {
        self.write(|state| state.save_template(template))
    }

    fn update_template(&mut self, template: &TaskTemplate) -> Result<(), AppError> {
        self.write(|state| state.update_template(template))
    }

    fn list_templates(&self) -> Result<Vec<TaskTemplate>, AppError> {
        self.read(|state| Ok(state.templates.clone()))
    }

    fn expand_templates(
        &mut self,
        now: OffsetDateTime,
        horizon: OffsetDateTime,
    ) -> Result<Vec<TaskState>, AppError> {
        self.write(|state| state.expand_templates(now, horizon))
    }

    fn append_activity(&mut self, entry: ActivityEntry) -> Result<(), AppError> {
        self.write(|state| {
            state.append_activity(entry);
            Ok(())
        })
    }

    fn list_activity(&self, limit: usize) -> Result<Vec<ActivityEntry>, AppError> {
        self.read(|state| Ok(state.recent_activity(limit)))
    }
}

#[cfg(test)]
mod tests {
    use super::{JsonStore, SCHEMA_VERSION, load_state};
    use crate::model::{Recurrence, SubscriberId, TaskState, TaskTemplate, TemplateKind};
    use crate::storage::TaskStore;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};
    use time::{Duration, OffsetDateTime};

    fn temp_path(file_name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("taskebb-{nanos}-{file_name}"))
    }

    #[test]
    fn missing_file_loads_empty_state() {
        let path = temp_path("missing.json");
        let state = load_state(&path).unwrap();

        assert!(state.tasks.is_empty());
        assert!(state.subscribers.is_empty());
    }

    #[test]
    fn save_and_reload_reproduces_every_task_field() {
        let path = temp_path("round-trip.json");
        let now = OffsetDateTime::now_utc();
        let mut recurring =
            TaskState::recurring("stretch", "neck", 2, Some(now + Duration::days(7)), now).unwrap();
        recurring.mark_execution(now - Duration::hours(3)).unwrap();
        recurring.mark_execution(now - Duration::hours(1)).unwrap();
        let deadline = TaskState::with_deadline("report", "q4", now + Duration::days(1), now).unwrap();
        let mut done = TaskState::one_time("milk", "").unwrap();
        done.mark_completed(true);

        let mut store = JsonStore::open(path.clone()).unwrap();
        for task in [&recurring, &deadline, &done] {
            store.save_task(task).unwrap();
        }

        let reopened = JsonStore::open(path.clone()).unwrap();
        let loaded = reopened.load_all_tasks().unwrap();
        let fetched = reopened.get_task(recurring.id()).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded, vec![recurring.clone(), deadline, done]);
        assert_eq!(fetched, recurring);
        assert_eq!(
            fetched.tracker().get_interval(),
            recurring.tracker().get_interval()
        );
    }

    #[test]
    fn update_and_delete_persist() {
        let path = temp_path("update-delete.json");
        let mut store = JsonStore::open(path.clone()).unwrap();
        let mut task = TaskState::one_time("old", "").unwrap();
        store.save_task(&task).unwrap();

        task.set_title("new").unwrap();
        store.update_task(&task).unwrap();
        assert_eq!(store.get_task(task.id()).unwrap().title(), "new");

        let removed = store.delete_task(task.id()).unwrap();
        let remaining = store.load_all_tasks().unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(removed.id(), task.id());
        assert!(remaining.is_empty());
    }

    #[test]
    fn subscribers_and_templates_persist() {
        let path = temp_path("subscribers.json");
        let mut store = JsonStore::open(path.clone()).unwrap();
        store.register_subscriber(&SubscriberId::new("100")).unwrap();
        store.register_subscriber(&SubscriberId::new("100")).unwrap();
        let mut template = TaskTemplate::new("rent", "", 168, TemplateKind::Periodic).unwrap();
        store.save_template(&template).unwrap();
        template.last_generated = Some(OffsetDateTime::now_utc());
        store.update_template(&template).unwrap();

        let reopened = JsonStore::open(path.clone()).unwrap();
        let subscribers = reopened.list_subscribers().unwrap();
        let templates = reopened.list_templates().unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(subscribers, vec![SubscriberId::new("100")]);
        assert_eq!(templates, vec![template]);
    }

    #[test]
    fn failed_expansion_leaves_the_file_untouched() {
        let path = temp_path("expand-atomic.json");
        let now = OffsetDateTime::now_utc();
        let mut store = JsonStore::open(path.clone()).unwrap();
        let healthy = TaskTemplate::new("standup", "", 24, TemplateKind::Periodic).unwrap();
        let mut broken =
            TaskTemplate::new("broken", "", 24, TemplateKind::DeadlineDriven).unwrap();
        broken.recurrence = Recurrence::Custom { hours: i64::MAX / 2 };
        store.save_template(&healthy).unwrap();
        store.save_template(&broken).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        let result = store.expand_templates(now, now + Duration::days(3));
        let after = fs::read_to_string(&path).unwrap();
        fs::remove_file(&path).ok();

        assert!(result.is_err());
        assert_eq!(after, before);
    }

    #[test]
    fn expansion_is_saved_in_one_document() {
        let path = temp_path("expand-saved.json");
        let now = OffsetDateTime::now_utc();
        let mut store = JsonStore::open(path.clone()).unwrap();
        store
            .save_template(&TaskTemplate::new("standup", "", 24, TemplateKind::Periodic).unwrap())
            .unwrap();

        let created = store.expand_templates(now, now + Duration::days(2)).unwrap();
        let reloaded = load_state(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(created.len(), 2);
        assert_eq!(reloaded.tasks, created);
        assert_eq!(reloaded.templates[0].last_generated, Some(now + Duration::days(2)));
    }

    #[test]
    fn schema_version_must_match() {
        let path = temp_path("bad-schema.json");
        let bad = format!(
            "{{\n  \"schema_version\": {},\n  \"tasks\": []\n}}",
            SCHEMA_VERSION + 1
        );
        fs::write(&path, bad).unwrap();

        let err = JsonStore::open(path.clone()).unwrap_err();
        fs::remove_file(&path).ok();

        assert_eq!(err.code(), "invalid_data");
    }

    #[test]
    fn rejects_unknown_task_type() {
        let path = temp_path("bad-type.json");
        let content = "{\n  \"schema_version\": 1,\n  \"tasks\": [\n    {\n      \"id\": \"1766188800000_0001\",\n      \"title\": \"demo\",\n      \"type\": \"someday\",\n      \"created_at\": \"2025-12-20T00:00:00Z\"\n    }\n  ]\n}";
        fs::write(&path, content).unwrap();

        let err = load_state(&path).unwrap_err();
        fs::remove_file(&path).ok();

        assert_eq!(err.code(), "invalid_data");
    }

    #[test]
    fn rejects_task_records_that_break_invariants() {
        let records = [
            "{\"id\": \"1766188800000_0001\", \"title\": \"\", \"type\": \"one_time\", \"created_at\": \"2025-12-20T00:00:00Z\"}",
            "{\"id\": \"1766188800000_0002\", \"title\": \"water\", \"type\": \"recurring\", \"interval_hours\": 0, \"created_at\": \"2025-12-20T00:00:00Z\"}",
            "{\"id\": \"1766188800000_0003\", \"title\": \"water\", \"type\": \"recurring\", \"interval_hours\": 9223372036854775807, \"created_at\": \"2025-12-20T00:00:00Z\"}",
        ];

        for (index, record) in records.iter().enumerate() {
            let path = temp_path(&format!("broken-{index}.json"));
            fs::write(
                &path,
                format!("{{\"schema_version\": 1, \"tasks\": [{record}]}}"),
            )
            .unwrap();

            let err = load_state(&path).unwrap_err();
            let open = JsonStore::open(path.clone()).unwrap_err();
            fs::remove_file(&path).ok();

            assert_eq!(err.code(), "invalid_data", "{record}");
            assert_eq!(open.code(), "invalid_data");
        }
    }

    #[test]
    fn accepts_minimal_task_records() {
        let path = temp_path("minimal.json");
        let content = "{\n  \"schema_version\": 1,\n  \"tasks\": [\n    {\n      \"id\": \"1766188800000_0001\",\n      \"title\": \"demo\",\n      \"type\": \"one_time\",\n      \"created_at\": \"2025-12-20T00:00:00Z\"\n    }\n  ]\n}";
        fs::write(&path, content).unwrap();

        let state = load_state(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(state.tasks.len(), 1);
        assert_eq!(state.tasks[0].description(), "");
        assert!(!state.tasks[0].is_completed());
        assert_eq!(state.tasks[0].tracker().execution_count(), 0);
    }
}
