use crate::error::AppError;
use crate::model::SubscriberId;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::DesktopNotifier;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::DesktopNotifier;

pub const APP_NAME: &str = "taskebb";
const DISABLE_ENV_VAR: &str = "TASKEBB_DISABLE_NOTIFICATIONS";

/// Outbound channel for replies and reminders.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subscriber: &SubscriberId, text: &str) -> Result<(), AppError>;
}

pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, subscriber: &SubscriberId, text: &str) -> Result<(), AppError> {
        debug!(%subscriber, text, "notification suppressed");
        Ok(())
    }
}

/// Delivers every message through each inner notifier. Succeeds when at least
/// one of them did; otherwise returns the last failure.
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn send(&self, subscriber: &SubscriberId, text: &str) -> Result<(), AppError> {
        let mut delivered = false;
        let mut last_error = None;

        for notifier in &self.notifiers {
            match notifier.send(subscriber, text).await {
                Ok(()) => delivered = true,
                Err(err) => {
                    warn!(%subscriber, error = %err, "notifier failed");
                    last_error = Some(err);
                }
            }
        }

        match (delivered, last_error) {
            (true, _) => Ok(()),
            (false, Some(err)) => Err(err),
            (false, None) => Ok(()),
        }
    }
}

/// Whether `TASKEBB_DISABLE_NOTIFICATIONS` is set.
pub fn notifications_disabled() -> bool {
    std::env::var_os(DISABLE_ENV_VAR).is_some()
}

/// Combines the remote channel with an optional desktop mirror.
///
/// `TASKEBB_DISABLE_NOTIFICATIONS` replaces everything with [`NoopNotifier`].
pub fn notifier_from_env(
    remote: Option<Arc<dyn Notifier>>,
    desktop: bool,
) -> Result<Arc<dyn Notifier>, AppError> {
    if notifications_disabled() {
        return Ok(Arc::new(NoopNotifier));
    }

    let mut notifiers: Vec<Arc<dyn Notifier>> = remote.into_iter().collect();
    if desktop {
        match platform_notifier() {
            Ok(notifier) => notifiers.push(notifier),
            Err(AppError::InvalidData(message)) => {
                warn!(%message, "desktop notifications unavailable")
            }
            Err(other) => return Err(other),
        }
    }

    Ok(match notifiers.len() {
        0 => Arc::new(NoopNotifier),
        1 => notifiers.remove(0),
        _ => Arc::new(FanoutNotifier::new(notifiers)),
    })
}

#[cfg(any(target_os = "linux", windows))]
pub fn platform_notifier() -> Result<Arc<dyn Notifier>, AppError> {
    Ok(Arc::new(DesktopNotifier))
}

#[cfg(not(any(target_os = "linux", windows)))]
pub fn platform_notifier() -> Result<Arc<dyn Notifier>, AppError> {
    Err(AppError::invalid_data(
        "notifications are not supported on this platform",
    ))
}
