use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::error::AppError;
use crate::model::{ActivityEntry, SubscriberId, TaskId, TaskState, TaskTemplate, TemplateId};
use crate::storage::TaskStore;

type StoreJob = Box<dyn FnOnce(&mut dyn TaskStore) + Send>;

pub type TaskMutation = Box<dyn FnOnce(&mut TaskState) -> Result<(), AppError> + Send>;
pub type TemplateMutation = Box<dyn FnOnce(&mut TaskTemplate) -> Result<(), AppError> + Send>;

enum StoreCommand {
    Run(StoreJob),
    Shutdown,
}

const STORE_CHANNEL_CAPACITY: usize = 256;

/// Moves `store` onto a dedicated thread and returns a handle to it. Every
/// operation submitted through the handle runs to completion before the next
/// one starts.
pub fn spawn_store<S>(store: S) -> Result<StoreHandle, AppError>
where
    S: TaskStore + 'static,
{
    let (tx, rx) = mpsc::channel(STORE_CHANNEL_CAPACITY);

    std::thread::Builder::new()
        .name("taskebb-store".to_string())
        .spawn(move || store_loop(Box::new(store), rx))
        .map_err(|err| AppError::io(format!("failed to start store thread: {err}")))?;

    Ok(StoreHandle { tx })
}

fn store_loop(mut store: Box<dyn TaskStore>, mut rx: mpsc::Receiver<StoreCommand>) {
    info!("store started");

    while let Some(command) = rx.blocking_recv() {
        match command {
            StoreCommand::Run(job) => job(store.as_mut()),
            StoreCommand::Shutdown => break,
        }
    }

    info!("store exited");
}

#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl StoreHandle {
    async fn call<T, F>(&self, f: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn TaskStore) -> Result<T, AppError> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: StoreJob = Box::new(move |store| {
            let _ = reply_tx.send(f(store));
        });

        self.tx
            .send(StoreCommand::Run(job))
            .await
            .map_err(|_| AppError::io("store is closed"))?;

        reply_rx
            .await
            .map_err(|_| AppError::io("store dropped the request"))?
    }

    pub async fn load_all_tasks(&self) -> Result<Vec<TaskState>, AppError> {
        self.call(|store| store.load_all_tasks()).await
    }

    pub async fn get_task(&self, id: TaskId) -> Result<TaskState, AppError> {
        self.call(move |store| store.get_task(&id)).await
    }

    pub async fn save_task(&self, task: TaskState) -> Result<(), AppError> {
        self.call(move |store| store.save_task(&task)).await
    }

    pub async fn update_task(&self, task: TaskState) -> Result<(), AppError> {
        self.call(move |store| store.update_task(&task)).await
    }

    pub async fn delete_task(&self, id: TaskId) -> Result<TaskState, AppError> {
        self.call(move |store| store.delete_task(&id)).await
    }

    /// Reads, mutates and writes back one task as a single store operation.
    /// Nothing is written when `apply` fails.
    pub async fn modify_task(
        &self,
        id: TaskId,
        apply: TaskMutation,
    ) -> Result<TaskState, AppError> {
        self.call(move |store| {
            let mut task = store.get_task(&id)?;
            apply(&mut task)?;
            store.update_task(&task)?;
            debug!(task_id = %task.id(), "task modified");
            Ok(task)
        })
        .await
    }

    pub async fn register_subscriber(&self, id: SubscriberId) -> Result<bool, AppError> {
        self.call(move |store| store.register_subscriber(&id)).await
    }

    pub async fn list_subscribers(&self) -> Result<Vec<SubscriberId>, AppError> {
        self.call(|store| store.list_subscribers()).await
    }

    pub async fn unregister_all_subscribers(&self) -> Result<usize, AppError> {
        self.call(|store| store.unregister_all_subscribers()).await
    }

    pub async fn save_template(&self, template: TaskTemplate) -> Result<(), AppError> {
        self.call(move |store| store.save_template(&template)).await
    }

    pub async fn list_templates(&self) -> Result<Vec<TaskTemplate>, AppError> {
        self.call(|store| store.list_templates()).await
    }

    pub async fn modify_template(
        &self,
        id: TemplateId,
        apply: TemplateMutation,
    ) -> Result<TaskTemplate, AppError> {
        self.call(move |store| {
            let mut template = store
                .list_templates()?
                .into_iter()
                .find(|template| template.id == id)
                .ok_or_else(|| AppError::invalid_input("template not found"))?;
            apply(&mut template)?;
            store.update_template(&template)?;
            Ok(template)
        })
        .await
    }

    /// Expands every template up to `horizon` and stores the produced tasks
    /// together with the templates' new generation points.
    pub async fn expand_templates(
        &self,
        now: time::OffsetDateTime,
        horizon: time::OffsetDateTime,
    ) -> Result<Vec<TaskState>, AppError> {
        self.call(move |store| store.expand_templates(now, horizon)).await
    }

    pub async fn append_activity(&self, entry: ActivityEntry) -> Result<(), AppError> {
        self.call(move |store| store.append_activity(entry)).await
    }

    pub async fn list_activity(&self, limit: usize) -> Result<Vec<ActivityEntry>, AppError> {
        self.call(move |store| store.list_activity(limit)).await
    }

    /// Stops the store thread once the commands queued before this one have
    /// run.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(StoreCommand::Shutdown).await;
    }
}
