// In-memory connection that records every successful call and fails on demand

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::platforms::PlatformConnection;
use crate::types::{
    Button, ChatId, InboundEvent, Keyboard, MessageHandle, PlatformError, PlatformResult, TextFormat, UserId,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Photo { chat_id: ChatId, image: String, caption: String, keyboard: Keyboard },
    Text { chat_id: ChatId, text: String, format: TextFormat },
    Keyboard { chat_id: ChatId, text: String, keyboard: Keyboard },
    Delete(MessageHandle),
    Restrict { chat_id: ChatId, user_id: UserId, until: DateTime<Utc> },
    Ban { chat_id: ChatId, user_id: UserId },
    AnswerCallback(String),
    Edit { message: MessageHandle, text: String },
}

pub struct RecordingConnection {
    calls: Mutex<Vec<Call>>,
    failing_chats: Mutex<HashSet<ChatId>>,
    missing_assets: Mutex<HashSet<String>>,
    member_names: Mutex<HashMap<UserId, String>>,
    failed_deletes: Mutex<Vec<MessageHandle>>,
    fail_deletes: AtomicBool,
    fail_moderation: AtomicBool,
    latency_ms: AtomicU64,
    next_message_id: AtomicI64,
    sender: broadcast::Sender<InboundEvent>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self {
            calls: Mutex::new(Vec::new()),
            failing_chats: Mutex::new(HashSet::new()),
            missing_assets: Mutex::new(HashSet::new()),
            member_names: Mutex::new(HashMap::new()),
            failed_deletes: Mutex::new(Vec::new()),
            fail_deletes: AtomicBool::new(false),
            fail_moderation: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
            next_message_id: AtomicI64::new(1000),
            sender,
        }
    }

    /// Every call targeting this chat fails with an API error
    pub fn fail_chat(&self, chat_id: ChatId) {
        self.failing_chats.lock().unwrap().insert(chat_id);
    }

    /// `send_photo` with this image fails with `AssetNotFound`
    pub fn remove_asset(&self, image: &str) {
        self.missing_assets.lock().unwrap().insert(image.to_string());
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    /// Deletions attempted while `fail_deletes` was set
    pub fn failed_deletes(&self) -> Vec<MessageHandle> {
        self.failed_deletes.lock().unwrap().clone()
    }

    /// Sending and deleting messages take this long before completing
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Restrict and ban calls fail
    pub fn fail_moderation(&self) {
        self.fail_moderation.store(true, Ordering::SeqCst);
    }

    pub fn set_member_name(&self, user_id: UserId, name: &str) {
        self.member_names.lock().unwrap().insert(user_id, name.to_string());
    }

    pub fn inject(&self, event: InboundEvent) {
        let _ = self.sender.send(event);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn texts_to(&self, chat_id: ChatId) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Text { chat_id: c, text, .. } if c == chat_id => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn photos_to(&self, chat_id: ChatId) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Photo { chat_id: c, caption, .. } if c == chat_id => Some(caption),
                _ => None,
            })
            .collect()
    }

    fn check_chat(&self, method: &str, chat_id: ChatId) -> PlatformResult<()> {
        if self.failing_chats.lock().unwrap().contains(&chat_id) {
            return Err(PlatformError::Api {
                method: method.to_string(),
                description: "Forbidden: bot was kicked from the group chat".to_string(),
            });
        }
        Ok(())
    }

    async fn delay(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_handle(&self, chat_id: ChatId) -> MessageHandle {
        MessageHandle {
            chat_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl PlatformConnection for RecordingConnection {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    fn platform_name(&self) -> &str {
        "recording"
    }

    async fn is_connected(&self) -> bool {
        true
    }

    fn get_event_receiver(&self) -> Option<broadcast::Receiver<InboundEvent>> {
        Some(self.sender.subscribe())
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        image: &str,
        caption: &str,
        keyboard: &[Vec<Button>],
    ) -> PlatformResult<MessageHandle> {
        self.check_chat("sendPhoto", chat_id)?;
        if self.missing_assets.lock().unwrap().contains(image) {
            return Err(PlatformError::AssetNotFound(image.to_string()));
        }
        self.record(Call::Photo {
            chat_id,
            image: image.to_string(),
            caption: caption.to_string(),
            keyboard: keyboard.to_vec(),
        });
        Ok(self.next_handle(chat_id))
    }

    async fn send_text(&self, chat_id: ChatId, text: &str, format: TextFormat) -> PlatformResult<MessageHandle> {
        self.check_chat("sendMessage", chat_id)?;
        self.delay().await;
        self.record(Call::Text {
            chat_id,
            text: text.to_string(),
            format,
        });
        Ok(self.next_handle(chat_id))
    }

    async fn send_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: &[Vec<Button>],
    ) -> PlatformResult<MessageHandle> {
        self.check_chat("sendMessage", chat_id)?;
        self.record(Call::Keyboard {
            chat_id,
            text: text.to_string(),
            keyboard: keyboard.to_vec(),
        });
        Ok(self.next_handle(chat_id))
    }

    async fn delete_message(&self, message: MessageHandle) -> PlatformResult<()> {
        self.check_chat("deleteMessage", message.chat_id)?;
        self.delay().await;
        if self.fail_deletes.load(Ordering::SeqCst) {
            self.failed_deletes.lock().unwrap().push(message);
            return Err(PlatformError::Api {
                method: "deleteMessage".to_string(),
                description: "Bad Request: message to delete not found".to_string(),
            });
        }
        self.record(Call::Delete(message));
        Ok(())
    }

    async fn restrict_member(&self, chat_id: ChatId, user_id: UserId, until: DateTime<Utc>) -> PlatformResult<()> {
        self.check_chat("restrictChatMember", chat_id)?;
        if self.fail_moderation.load(Ordering::SeqCst) {
            return Err(PlatformError::Api {
                method: "restrictChatMember".to_string(),
                description: "Bad Request: not enough rights".to_string(),
            });
        }
        self.record(Call::Restrict { chat_id, user_id, until });
        Ok(())
    }

    async fn ban_member(&self, chat_id: ChatId, user_id: UserId) -> PlatformResult<()> {
        self.check_chat("banChatMember", chat_id)?;
        if self.fail_moderation.load(Ordering::SeqCst) {
            return Err(PlatformError::Api {
                method: "banChatMember".to_string(),
                description: "Bad Request: not enough rights".to_string(),
            });
        }
        self.record(Call::Ban { chat_id, user_id });
        Ok(())
    }

    async fn member_name(&self, chat_id: ChatId, user_id: UserId) -> PlatformResult<String> {
        self.check_chat("getChatMember", chat_id)?;
        self.member_names
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .ok_or_else(|| PlatformError::Api {
                method: "getChatMember".to_string(),
                description: "Bad Request: user not found".to_string(),
            })
    }

    async fn answer_callback(&self, callback_id: &str) -> PlatformResult<()> {
        self.record(Call::AnswerCallback(callback_id.to_string()));
        Ok(())
    }

    async fn edit_message_text(&self, message: MessageHandle, text: &str) -> PlatformResult<()> {
        self.check_chat("editMessageText", message.chat_id)?;
        self.record(Call::Edit {
            message,
            text: text.to_string(),
        });
        Ok(())
    }
}
