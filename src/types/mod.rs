// src/types/mod.rs - Shared domain types for moderation and broadcasting

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type UserId = i64;
pub type ChatId = i64;

/// Kind of chat a message or destination belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Self::Private),
            "group" => Some(Self::Group),
            "supergroup" => Some(Self::Supergroup),
            "channel" => Some(Self::Channel),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Supergroup => "supergroup",
            Self::Channel => "channel",
        }
    }

    /// Only groups and supergroups are tracked as broadcast destinations
    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group | Self::Supergroup)
    }
}

/// A member of a chat as seen by the connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: UserId,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl ChatUser {
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }

    /// Username when the user has one, first name otherwise
    pub fn handle(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.first_name)
    }

    /// Inline mention usable with `TextFormat::Markdown`
    pub fn mention_markdown(&self) -> String {
        format!("[{}](tg://user?id={})", escape_markdown(&self.full_name()), self.id)
    }
}

/// Escape the characters that legacy Markdown treats as markup
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Inbound text message from a group member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub chat_id: ChatId,
    pub chat_kind: ChatKind,
    pub message_id: i64,
    pub from: ChatUser,
    pub text: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ChatMessage {
    pub fn handle(&self) -> MessageHandle {
        MessageHandle {
            chat_id: self.chat_id,
            message_id: self.message_id,
        }
    }
}

/// Reference to a message already posted on the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    pub chat_id: ChatId,
    pub message_id: i64,
}

/// Membership status of the bot itself or of a member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
}

impl MemberStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "creator" | "owner" => Some(Self::Creator),
            "administrator" => Some(Self::Administrator),
            "member" => Some(Self::Member),
            "restricted" => Some(Self::Restricted),
            "left" => Some(Self::Left),
            "kicked" | "banned" => Some(Self::Kicked),
            _ => None,
        }
    }
}

/// Button pressed on an inline keyboard
#[derive(Debug, Clone)]
pub struct CallbackQuery {
    pub id: String,
    pub from: ChatUser,
    pub message: Option<MessageHandle>,
    pub data: String,
}

/// Everything the connector can hand to the bot
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Message(ChatMessage),
    MembersJoined {
        chat_id: ChatId,
        members: Vec<ChatUser>,
    },
    /// The bot's own membership in a chat changed
    MembershipChanged {
        chat_id: ChatId,
        title: String,
        kind: ChatKind,
        status: MemberStatus,
    },
    CallbackQuery(CallbackQuery),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextFormat {
    #[default]
    Plain,
    Markdown,
}

/// Inline keyboard button
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Button {
    Url { label: String, url: String },
    Callback { label: String, data: String },
}

/// Rows of inline keyboard buttons
pub type Keyboard = Vec<Vec<Button>>;

/// A labelled link shown under a creative
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLink {
    pub label: String,
    pub url: String,
}

impl From<&ActionLink> for Button {
    fn from(link: &ActionLink) -> Self {
        Button::Url {
            label: link.label.clone(),
            url: link.url.clone(),
        }
    }
}

/// One promotional unit of the broadcast catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creative {
    pub image: String,
    pub caption: String,
    #[serde(default)]
    pub actions: Vec<ActionLink>,
}

impl Creative {
    /// All actions on a single keyboard row
    pub fn keyboard(&self) -> Keyboard {
        if self.actions.is_empty() {
            return Vec::new();
        }
        vec![self.actions.iter().map(Button::from).collect()]
    }
}

/// Registered broadcast target, stored as `{"title": .., "type": ..}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ChatKind,
}

/// Classification of one inspected message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Greeting,
    Thanks,
    BannedContent,
    RateViolation,
    DuplicateViolation,
    Clean,
}

impl Verdict {
    /// Whether this verdict counted as a warning against the sender
    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            Verdict::BannedContent | Verdict::RateViolation | Verdict::DuplicateViolation
        )
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Greeting => write!(f, "greeting"),
            Verdict::Thanks => write!(f, "thanks"),
            Verdict::BannedContent => write!(f, "banned content"),
            Verdict::RateViolation => write!(f, "rate violation"),
            Verdict::DuplicateViolation => write!(f, "duplicate violation"),
            Verdict::Clean => write!(f, "clean"),
        }
    }
}

/// Step of the penalty ladder decided for a user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenaltyAction {
    None,
    Mute { duration_seconds: u64 },
    Ban,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    OutOfSchedule,
    EmptyCatalog,
}

/// Result of asking the broadcast pool for the next creative
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawOutcome {
    Creative(Creative),
    Empty(EmptyReason),
}

/// Failures reported by a platform connection
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("asset not found: {0}")]
    AssetNotFound(String),

    #[error("{method} rejected: {description}")]
    Api { method: String, description: String },

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not connected")]
    NotConnected,
}

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Startup configuration failures; all of them are fatal
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required credential {0}")]
    MissingCredential(&'static str),

    #[error("invalid value for {name}: {value}")]
    InvalidCredential { name: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Destination registry failures
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("registry key is not a chat id: {0}")]
    InvalidKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(first: &str, last: Option<&str>, username: Option<&str>) -> ChatUser {
        ChatUser {
            id: 42,
            first_name: first.to_string(),
            last_name: last.map(String::from),
            username: username.map(String::from),
        }
    }

    #[test]
    fn test_mention_escapes_markup() {
        let u = user("ana_maria", Some("*x*"), None);
        assert_eq!(u.mention_markdown(), "[ana\\_maria \\*x\\*](tg://user?id=42)");
    }

    #[test]
    fn test_handle_prefers_username() {
        assert_eq!(user("Ana", None, Some("ana99")).handle(), "ana99");
        assert_eq!(user("Ana", None, None).handle(), "Ana");
    }

    #[test]
    fn test_destination_json_shape() {
        let dest = Destination { title: "Ventas".to_string(), kind: ChatKind::Supergroup };
        let json = serde_json::to_value(&dest).unwrap();
        assert_eq!(json, serde_json::json!({"title": "Ventas", "type": "supergroup"}));
    }

    #[test]
    fn test_violation_verdicts() {
        assert!(Verdict::BannedContent.is_violation());
        assert!(Verdict::RateViolation.is_violation());
        assert!(Verdict::DuplicateViolation.is_violation());
        assert!(!Verdict::Greeting.is_violation());
        assert!(!Verdict::Thanks.is_violation());
        assert!(!Verdict::Clean.is_violation());
    }

    #[test]
    fn test_creative_keyboard_is_single_row() {
        let creative = Creative {
            image: "a.jpg".to_string(),
            caption: "A".to_string(),
            actions: vec![
                ActionLink { label: "Buy".to_string(), url: "https://x.test/buy".to_string() },
                ActionLink { label: "Share".to_string(), url: "https://x.test/share".to_string() },
            ],
        };
        let keyboard = creative.keyboard();
        assert_eq!(keyboard.len(), 1);
        assert_eq!(keyboard[0].len(), 2);
    }
}
