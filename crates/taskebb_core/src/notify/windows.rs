use crate::error::AppError;
use crate::model::SubscriberId;
use crate::notify::{APP_NAME, Notifier};
use async_trait::async_trait;
use tauri_winrt_notification::Toast;

/// Mirrors messages as Windows toast notifications.
pub struct DesktopNotifier;

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn send(&self, subscriber: &SubscriberId, text: &str) -> Result<(), AppError> {
        let body = text.to_string();
        let recipient = subscriber.to_string();

        tokio::task::spawn_blocking(move || {
            Toast::new(Toast::POWERSHELL_APP_ID)
                .title(APP_NAME)
                .text1(&body)
                .text2(&recipient)
                .show()
                .map_err(|err| AppError::io(err.to_string()))
        })
        .await
        .map_err(|err| AppError::io(err.to_string()))?
    }
}
