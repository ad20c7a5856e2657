use crate::error::AppError;
use crate::model::SubscriberId;
use crate::notify::{APP_NAME, Notifier};
use async_trait::async_trait;
use notify_rust::Notification;

/// Mirrors messages to the freedesktop notification daemon.
pub struct DesktopNotifier;

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn send(&self, _subscriber: &SubscriberId, text: &str) -> Result<(), AppError> {
        let body = text.to_string();

        tokio::task::spawn_blocking(move || {
            let mut notification = Notification::new();
            notification.summary(APP_NAME);
            notification.body(&body);
            notification
                .show()
                .map(|_| ())
                .map_err(|err| AppError::io(err.to_string()))
        })
        .await
        .map_err(|err| AppError::io(err.to_string()))?
    }
}
