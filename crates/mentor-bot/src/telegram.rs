//! Telegram Bot API gateway. A thin wrapper: JSON in, JSON out, no retry
//! logic and no timeout on sends.

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use mentor_types::gateway::{Incoming, Keyboard, Update};
use mentor_types::models::UserId;

use crate::gateway::MessengerGateway;

/// Long-poll timeout passed to getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u32 = 30;

pub struct TelegramGateway {
    client: reqwest::Client,
    base: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
    callback_query: Option<TgCallback>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    from: Option<TgUser>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgCallback {
    id: String,
    from: TgUser,
    data: Option<String>,
}

impl TelegramGateway {
    pub fn new(token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: format!("https://api.telegram.org/bot{token}"),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(&self, method: &str, payload: Value) -> Result<T> {
        let response: ApiResponse<T> = self
            .client
            .post(format!("{}/{}", self.base, method))
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            bail!(
                "telegram {} failed: {}",
                method,
                response.description.unwrap_or_else(|| "unknown error".into())
            );
        }
        response
            .result
            .ok_or_else(|| anyhow!("telegram {} returned ok without a result", method))
    }

    /// One long-poll round. Returns the next offset to poll with and the
    /// flattened updates. Callback queries are acknowledged here so the
    /// client stops showing a spinner.
    pub async fn poll_updates(&self, offset: i64) -> Result<(i64, Vec<Update>)> {
        let raw: Vec<TgUpdate> = self
            .call(
                "getUpdates",
                json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message", "callback_query"],
                }),
            )
            .await?;

        let mut next_offset = offset;
        let mut updates = Vec::new();

        for update in raw {
            next_offset = next_offset.max(update.update_id + 1);

            if let Some(message) = update.message {
                let (Some(from), Some(text)) = (message.from, message.text) else {
                    debug!("ignoring non-text message in update {}", update.update_id);
                    continue;
                };
                updates.push(Update {
                    user_id: from.id,
                    incoming: Incoming::from_text(&text),
                });
            } else if let Some(callback) = update.callback_query {
                if let Err(e) = self.answer_callback(&callback.id).await {
                    warn!("answerCallbackQuery failed: {}", e);
                }
                let Some(data) = callback.data else { continue };
                updates.push(Update {
                    user_id: callback.from.id,
                    incoming: Incoming::Callback(data),
                });
            }
        }

        Ok((next_offset, updates))
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        let _: bool = self
            .call("answerCallbackQuery", json!({ "callback_query_id": callback_id }))
            .await?;
        Ok(())
    }

    async fn send_message(&self, user_id: UserId, text: &str, keyboard: Option<&Keyboard>) -> Result<()> {
        let mut payload = json!({ "chat_id": user_id, "text": text });

        if let Some(keyboard) = keyboard {
            let rows: Vec<Vec<Value>> = keyboard
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| json!({ "text": b.label, "callback_data": b.data }))
                        .collect()
                })
                .collect();
            payload["reply_markup"] = json!({ "inline_keyboard": rows });
        }

        let _: Value = self.call("sendMessage", payload).await?;
        Ok(())
    }
}

#[async_trait]
impl MessengerGateway for TelegramGateway {
    async fn send_text(&self, user_id: UserId, text: &str) -> Result<()> {
        self.send_message(user_id, text, None).await
    }

    async fn send_menu(&self, user_id: UserId, text: &str, keyboard: &Keyboard) -> Result<()> {
        self.send_message(user_id, text, Some(keyboard)).await
    }
}
