use crate::error::AppError;
use crate::model::SubscriberId;
use crate::notify::Notifier;
use crate::transport::{InboundMessage, InboundTransport, PollBatch};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";
const USER_AGENT: &str = "TaskEbbBot/1.0";
const POLL_SLACK: Duration = Duration::from_secs(5);
const SEND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Bot API client used both to receive commands and to deliver messages.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, AppError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::invalid_input("bot token is required"));
        }

        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn decode<T>(response: reqwest::Response) -> Result<T, AppError>
    where
        T: serde::de::DeserializeOwned,
    {
        let status = response.status();
        let body = response.text().await?;
        let parsed: ApiResponse<T> = serde_json::from_str(&body).map_err(|err| {
            AppError::transport(format!("unexpected response ({status}): {err}"))
        })?;

        if !parsed.ok {
            let description = parsed
                .description
                .unwrap_or_else(|| format!("request failed with status {status}"));
            return Err(AppError::transport(description));
        }

        parsed
            .result
            .ok_or_else(|| AppError::transport("response is missing a result"))
    }
}

#[async_trait]
impl InboundTransport for TelegramClient {
    async fn poll(&self, offset: i64, timeout: Duration) -> Result<PollBatch, AppError> {
        let response = self
            .http
            .get(self.method_url("getUpdates"))
            .query(&[("offset", offset), ("timeout", timeout.as_secs() as i64)])
            .timeout(timeout + POLL_SLACK)
            .send()
            .await?;

        let updates: Vec<Value> = Self::decode(response).await?;
        Ok(parse_updates(offset, &updates))
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn send(&self, subscriber: &SubscriberId, text: &str) -> Result<(), AppError> {
        let response = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&json!({ "chat_id": subscriber.as_str(), "text": text }))
            .timeout(SEND_TIMEOUT)
            .send()
            .await?;

        let _: Value = Self::decode(response).await?;
        Ok(())
    }
}

/// Extracts text messages from raw updates. Updates without a numeric
/// `update_id`, chat id or text are skipped; any update id still moves the
/// offset forward so the update is not delivered again.
pub fn parse_updates(offset: i64, updates: &[Value]) -> PollBatch {
    let mut batch = PollBatch {
        messages: Vec::new(),
        next_offset: offset,
    };

    for update in updates {
        let Some(update_id) = update.get("update_id").and_then(Value::as_i64) else {
            debug!("skipping update without update_id");
            continue;
        };
        batch.next_offset = batch.next_offset.max(update_id + 1);

        let message = update.get("message");
        let chat_id = message
            .and_then(|message| message.get("chat"))
            .and_then(|chat| chat.get("id"))
            .and_then(Value::as_i64);
        let text = message
            .and_then(|message| message.get("text"))
            .and_then(Value::as_str);

        match (chat_id, text) {
            (Some(chat_id), Some(text)) => batch.messages.push(InboundMessage::new(
                SubscriberId::new(chat_id.to_string()),
                text,
            )),
            _ => debug!(update_id, "skipping update without text message"),
        }
    }

    batch
}
