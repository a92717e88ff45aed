use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{sleep, Duration};

use crate::platforms::PlatformConnection;
use crate::types::{
    Button, CallbackQuery, ChatId, ChatKind, ChatMessage, ChatUser, InboundEvent, MemberStatus, MessageHandle,
    PlatformError, PlatformResult, TextFormat, UserId,
};

const API_BASE: &str = "https://api.telegram.org";

/// Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TgMessage>,
    callback_query: Option<TgCallbackQuery>,
    my_chat_member: Option<TgChatMemberUpdated>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    from: Option<TgUser>,
    chat: TgChat,
    date: i64,
    text: Option<String>,
    new_chat_members: Option<Vec<TgUser>>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
    first_name: String,
    last_name: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgCallbackQuery {
    id: String,
    from: TgUser,
    message: Option<TgMessage>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChatMemberUpdated {
    chat: TgChat,
    new_chat_member: TgChatMember,
}

#[derive(Debug, Deserialize)]
struct TgChatMember {
    status: String,
    user: Option<TgUser>,
}

impl From<TgUser> for ChatUser {
    fn from(user: TgUser) -> Self {
        ChatUser {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            username: user.username,
        }
    }
}

impl TgMessage {
    fn handle(&self) -> MessageHandle {
        MessageHandle {
            chat_id: self.chat.id,
            message_id: self.message_id,
        }
    }
}

/// Configuration for the Telegram connection
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub token: String,
    /// Long-poll timeout passed to `getUpdates`
    pub poll_timeout_seconds: u64,
    /// Pause before polling again after a failed request
    pub retry_delay_seconds: u64,
}

impl TelegramConfig {
    pub fn new(token: String) -> Self {
        Self {
            token,
            poll_timeout_seconds: 30,
            retry_delay_seconds: 5,
        }
    }
}

/// Telegram Bot API connection over HTTP long polling
pub struct TelegramConnection {
    config: TelegramConfig,
    http_client: reqwest::Client,
    event_sender: broadcast::Sender<InboundEvent>,
    is_connected: Arc<RwLock<bool>>,
    shutdown_signal: Arc<AtomicBool>,
}

impl TelegramConnection {
    pub fn new(config: TelegramConfig) -> Self {
        let (event_sender, _) = broadcast::channel(1000);
        Self {
            config,
            http_client: reqwest::Client::new(),
            event_sender,
            is_connected: Arc::new(RwLock::new(false)),
            shutdown_signal: Arc::new(AtomicBool::new(false)),
        }
    }

    fn method_url(token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", API_BASE, token, method)
    }

    fn unwrap_response<T>(method: &str, response: ApiResponse<T>) -> PlatformResult<T> {
        match (response.ok, response.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(PlatformError::Api {
                method: method.to_string(),
                description: response.description.unwrap_or_else(|| "no description".to_string()),
            }),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> PlatformResult<T> {
        let response: ApiResponse<T> = self
            .http_client
            .post(Self::method_url(&self.config.token, method))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        Self::unwrap_response(method, response)
    }

    fn keyboard_markup(keyboard: &[Vec<Button>]) -> Value {
        let rows: Vec<Vec<Value>> = keyboard
            .iter()
            .map(|row| {
                row.iter()
                    .map(|button| match button {
                        Button::Url { label, url } => json!({ "text": label, "url": url }),
                        Button::Callback { label, data } => json!({ "text": label, "callback_data": data }),
                    })
                    .collect()
            })
            .collect();
        json!({ "inline_keyboard": rows })
    }

    /// Convert one update into the events the bot understands
    fn convert_update(update: Update) -> Option<InboundEvent> {
        if let Some(member_update) = update.my_chat_member {
            let status = MemberStatus::from_str(&member_update.new_chat_member.status)?;
            let kind = ChatKind::from_str(&member_update.chat.kind)?;
            return Some(InboundEvent::MembershipChanged {
                chat_id: member_update.chat.id,
                title: member_update.chat.title.unwrap_or_default(),
                kind,
                status,
            });
        }

        if let Some(query) = update.callback_query {
            return Some(InboundEvent::CallbackQuery(CallbackQuery {
                id: query.id,
                message: query.message.as_ref().map(TgMessage::handle),
                from: query.from.into(),
                data: query.data.unwrap_or_default(),
            }));
        }

        let message = update.message?;
        if let Some(members) = message.new_chat_members {
            if !members.is_empty() {
                return Some(InboundEvent::MembersJoined {
                    chat_id: message.chat.id,
                    members: members.into_iter().map(ChatUser::from).collect(),
                });
            }
        }

        let kind = ChatKind::from_str(&message.chat.kind)?;
        let text = message.text?;
        let from = message.from?;
        Some(InboundEvent::Message(ChatMessage {
            chat_id: message.chat.id,
            chat_kind: kind,
            message_id: message.message_id,
            from: from.into(),
            text,
            timestamp: Utc.timestamp_opt(message.date, 0).single().unwrap_or_else(Utc::now),
        }))
    }

    async fn poll_updates(
        client: &reqwest::Client,
        config: &TelegramConfig,
        offset: i64,
    ) -> PlatformResult<Vec<Update>> {
        let body = json!({
            "offset": offset,
            "timeout": config.poll_timeout_seconds,
            "allowed_updates": ["message", "callback_query", "my_chat_member"],
        });

        let response: ApiResponse<Vec<Update>> = client
            .post(Self::method_url(&config.token, "getUpdates"))
            .timeout(Duration::from_secs(config.poll_timeout_seconds + 10))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        Self::unwrap_response("getUpdates", response)
    }
}

#[async_trait]
impl PlatformConnection for TelegramConnection {
    async fn connect(&self) -> Result<()> {
        info!("Connecting to Telegram Bot API...");

        let me: Value = self
            .call("getMe", json!({}))
            .await
            .context("Failed to authenticate with the Telegram Bot API")?;
        info!(
            "Authenticated as @{}",
            me.get("username").and_then(Value::as_str).unwrap_or("unknown")
        );

        *self.is_connected.write().await = true;
        self.shutdown_signal.store(false, Ordering::Relaxed);

        let client = self.http_client.clone();
        let config = self.config.clone();
        let sender = self.event_sender.clone();
        let is_connected = Arc::clone(&self.is_connected);
        let shutdown_signal = Arc::clone(&self.shutdown_signal);

        tokio::spawn(async move {
            info!("Telegram update poller started");
            let mut offset = 0i64;

            while !shutdown_signal.load(Ordering::Relaxed) {
                match Self::poll_updates(&client, &config, offset).await {
                    Ok(updates) => {
                        for update in updates {
                            offset = offset.max(update.update_id + 1);
                            if let Some(event) = Self::convert_update(update) {
                                if let Err(e) = sender.send(event) {
                                    warn!("No receiver for inbound event: {}", e);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!("Failed to poll Telegram updates: {}", e);
                        sleep(Duration::from_secs(config.retry_delay_seconds)).await;
                    }
                }
            }

            *is_connected.write().await = false;
            info!("Telegram update poller stopped");
        });

        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.shutdown_signal.store(true, Ordering::Relaxed);
        *self.is_connected.write().await = false;
        info!("Disconnected from Telegram");
        Ok(())
    }

    fn platform_name(&self) -> &str {
        "telegram"
    }

    async fn is_connected(&self) -> bool {
        *self.is_connected.read().await
    }

    fn get_event_receiver(&self) -> Option<broadcast::Receiver<InboundEvent>> {
        Some(self.event_sender.subscribe())
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        image: &str,
        caption: &str,
        keyboard: &[Vec<Button>],
    ) -> PlatformResult<MessageHandle> {
        let markup = Self::keyboard_markup(keyboard);

        // Remote images are passed by URL, local ones uploaded
        if image.starts_with("http://") || image.starts_with("https://") {
            let message: TgMessage = self
                .call(
                    "sendPhoto",
                    json!({ "chat_id": chat_id, "photo": image, "caption": caption, "reply_markup": markup }),
                )
                .await?;
            return Ok(message.handle());
        }

        let bytes = match tokio::fs::read(image).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PlatformError::AssetNotFound(image.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let file_name = Path::new(image)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .text("reply_markup", markup.to_string())
            .part("photo", reqwest::multipart::Part::bytes(bytes).file_name(file_name));

        let response: ApiResponse<TgMessage> = self
            .http_client
            .post(Self::method_url(&self.config.token, "sendPhoto"))
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;
        let message = Self::unwrap_response("sendPhoto", response)?;
        debug!("Sent photo {} to chat {}", image, chat_id);
        Ok(message.handle())
    }

    async fn send_text(&self, chat_id: ChatId, text: &str, format: TextFormat) -> PlatformResult<MessageHandle> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if format == TextFormat::Markdown {
            body["parse_mode"] = json!("Markdown");
        }
        let message: TgMessage = self.call("sendMessage", body).await?;
        debug!("Sent message to chat {}: {}", chat_id, text);
        Ok(message.handle())
    }

    async fn send_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: &[Vec<Button>],
    ) -> PlatformResult<MessageHandle> {
        let message: TgMessage = self
            .call(
                "sendMessage",
                json!({ "chat_id": chat_id, "text": text, "reply_markup": Self::keyboard_markup(keyboard) }),
            )
            .await?;
        Ok(message.handle())
    }

    async fn delete_message(&self, message: MessageHandle) -> PlatformResult<()> {
        let _: bool = self
            .call(
                "deleteMessage",
                json!({ "chat_id": message.chat_id, "message_id": message.message_id }),
            )
            .await?;
        Ok(())
    }

    async fn restrict_member(&self, chat_id: ChatId, user_id: UserId, until: DateTime<Utc>) -> PlatformResult<()> {
        let _: bool = self
            .call(
                "restrictChatMember",
                json!({
                    "chat_id": chat_id,
                    "user_id": user_id,
                    "permissions": { "can_send_messages": false },
                    "until_date": until.timestamp(),
                }),
            )
            .await?;
        Ok(())
    }

    async fn ban_member(&self, chat_id: ChatId, user_id: UserId) -> PlatformResult<()> {
        let _: bool = self
            .call("banChatMember", json!({ "chat_id": chat_id, "user_id": user_id }))
            .await?;
        Ok(())
    }

    async fn member_name(&self, chat_id: ChatId, user_id: UserId) -> PlatformResult<String> {
        let member: TgChatMember = self
            .call("getChatMember", json!({ "chat_id": chat_id, "user_id": user_id }))
            .await?;
        match member.user {
            Some(user) => Ok(ChatUser::from(user).full_name()),
            None => Err(PlatformError::Api {
                method: "getChatMember".to_string(),
                description: format!("member {} has no user record", user_id),
            }),
        }
    }

    async fn answer_callback(&self, callback_id: &str) -> PlatformResult<()> {
        let _: bool = self
            .call("answerCallbackQuery", json!({ "callback_query_id": callback_id }))
            .await?;
        Ok(())
    }

    async fn edit_message_text(&self, message: MessageHandle, text: &str) -> PlatformResult<()> {
        let _: Value = self
            .call(
                "editMessageText",
                json!({ "chat_id": message.chat_id, "message_id": message.message_id, "text": text }),
            )
            .await?;
        Ok(())
    }
}
