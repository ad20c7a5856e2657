//! The reminder engine: an inbound command listener and a periodic
//! reminder evaluator sharing one store.

pub mod commands;
pub mod listener;
pub mod reminders;

pub use commands::{Command, parse_command};
pub use listener::dispatch;
pub use reminders::{TickFailure, TickReport, tick};

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::notify::Notifier;
use crate::storage::StoreHandle;
use crate::transport::InboundTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Long-poll wait passed to the transport.
    pub poll_timeout: Duration,
    /// Pause after a failed poll.
    pub retry_delay: Duration,
    pub reminder_period: Duration,
    /// How long `stop` waits for the listener before aborting it.
    pub shutdown_grace: Duration,
    pub prune_completed: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(20),
            retry_delay: Duration::from_millis(2000),
            reminder_period: Duration::from_secs(60),
            shutdown_grace: Duration::from_millis(500),
            prune_completed: true,
        }
    }
}

pub(crate) struct EngineContext {
    pub(crate) store: StoreHandle,
    pub(crate) transport: Arc<dyn InboundTransport>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) config: EngineConfig,
}

pub struct ReminderEngine {
    ctx: Arc<EngineContext>,
}

impl ReminderEngine {
    pub fn new(
        store: StoreHandle,
        transport: Arc<dyn InboundTransport>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            ctx: Arc::new(EngineContext {
                store,
                transport,
                notifier,
                config,
            }),
        }
    }

    /// Spawns the listener and the reminder loop on the current tokio runtime.
    pub fn start(self) -> EngineHandle {
        let cancel = CancellationToken::new();
        let grace = self.ctx.config.shutdown_grace;

        let listener = tokio::spawn(listener::listener_loop(
            Arc::clone(&self.ctx),
            cancel.child_token(),
        ));
        let reminders = tokio::spawn(reminders::reminder_loop(
            Arc::clone(&self.ctx),
            cancel.child_token(),
        ));

        info!("reminder engine started");

        EngineHandle {
            cancel,
            listener,
            reminders,
            grace,
        }
    }
}

pub struct EngineHandle {
    cancel: CancellationToken,
    listener: JoinHandle<()>,
    reminders: JoinHandle<()>,
    grace: Duration,
}

impl EngineHandle {
    /// Signals both loops, aborts the reminder loop, and gives the listener
    /// up to the shutdown grace period before aborting it too.
    pub async fn stop(self) {
        info!("reminder engine stopping");
        self.cancel.cancel();
        self.reminders.abort();

        let abort = self.listener.abort_handle();
        match tokio::time::timeout(self.grace, self.listener).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) if err.is_cancelled() => {}
            Ok(Err(err)) => warn!(error = %err, "listener task failed"),
            Err(_) => {
                warn!(
                    grace_ms = self.grace.as_millis() as u64,
                    "listener did not stop in time; aborting"
                );
                abort.abort();
            }
        }

        let _ = self.reminders.await;
        info!("reminder engine stopped");
    }
}
