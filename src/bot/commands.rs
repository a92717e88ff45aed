use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::bot::ledger::ViolationLedger;
use crate::bot::registry::DestinationRegistry;
use crate::config::{render, MessageTemplates};
use crate::platforms::PlatformConnection;
use crate::types::{escape_markdown, ActionLink, Button, ChatMessage, Keyboard, PlatformError, TextFormat, UserId};

const STATS_LIMIT: usize = 10;

/// Commands understood by the bot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Groups,
    Stats,
}

impl Command {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "start" => Some(Self::Start),
            "grupos" => Some(Self::Groups),
            "estadisticas" => Some(Self::Stats),
            _ => None,
        }
    }
}

/// Extract the command name from `/name@botname args`, lowercased
pub fn parse_command(text: &str) -> Option<String> {
    let rest = text.trim_start().strip_prefix('/')?;
    let word = rest.split_whitespace().next()?;
    let name = word.split('@').next().unwrap_or(word);
    if name.is_empty() {
        return None;
    }
    Some(name.to_lowercase())
}

pub struct CommandSystem {
    connection: Arc<dyn PlatformConnection>,
    registry: Arc<dyn DestinationRegistry>,
    ledger: Arc<RwLock<ViolationLedger>>,
    templates: MessageTemplates,
    admin_id: UserId,
    logo_path: PathBuf,
    social_keyboard: Keyboard,
}

impl CommandSystem {
    pub fn new(
        connection: Arc<dyn PlatformConnection>,
        registry: Arc<dyn DestinationRegistry>,
        ledger: Arc<RwLock<ViolationLedger>>,
        templates: MessageTemplates,
        admin_id: UserId,
        logo_path: PathBuf,
        social_links: &[Vec<ActionLink>],
    ) -> Self {
        let social_keyboard = social_links
            .iter()
            .map(|row| row.iter().map(Button::from).collect())
            .collect();
        Self {
            connection,
            registry,
            ledger,
            templates,
            admin_id,
            logo_path,
            social_keyboard,
        }
    }

    /// Process a message starting with `/`. Returns whether a known command ran.
    pub async fn process_message(&self, message: &ChatMessage) -> Result<bool> {
        let Some(name) = parse_command(&message.text) else {
            return Ok(false);
        };
        let Some(command) = Command::from_name(&name) else {
            debug!("Ignoring unknown command /{} from {}", name, message.from.id);
            return Ok(false);
        };

        info!("Command /{} from {} in chat {}", name, message.from.handle(), message.chat_id);

        match command {
            Command::Start => self.start(message).await?,
            Command::Groups => self.groups(message).await?,
            Command::Stats => self.stats(message).await?,
        }
        Ok(true)
    }

    async fn start(&self, message: &ChatMessage) -> Result<()> {
        let caption = render(&self.templates.start_caption, &[("name", &message.from.first_name)]);
        let logo = self.logo_path.to_string_lossy();

        match self.connection.send_photo(message.chat_id, &logo, &caption, &[]).await {
            Ok(_) => {}
            Err(PlatformError::AssetNotFound(path)) => {
                warn!("Logo {} not found, sending caption as text", path);
                self.connection
                    .send_text(message.chat_id, &caption, TextFormat::Plain)
                    .await
                    .context("Failed to send /start greeting")?;
            }
            Err(e) => return Err(e).context("Failed to send /start logo"),
        }

        if !self.social_keyboard.is_empty() {
            self.connection
                .send_keyboard(message.chat_id, &self.templates.social_prompt, &self.social_keyboard)
                .await
                .context("Failed to send social links")?;
        }
        Ok(())
    }

    async fn groups(&self, message: &ChatMessage) -> Result<()> {
        if message.from.id != self.admin_id {
            warn!("Non-admin {} tried /grupos", message.from.id);
            self.connection
                .send_text(message.chat_id, &self.templates.restricted_command, TextFormat::Plain)
                .await?;
            return Ok(());
        }

        let destinations = self.registry.load().await.context("Failed to load destination registry")?;
        let text = if destinations.is_empty() {
            self.templates.no_groups.clone()
        } else {
            let mut lines = vec![self.templates.groups_header.clone()];
            for (chat_id, destination) in &destinations {
                lines.push(format!(
                    "• {} (`{}`) - {}",
                    escape_markdown(&destination.title),
                    chat_id,
                    destination.kind.as_str()
                ));
            }
            lines.join("\n")
        };

        self.connection
            .send_text(message.chat_id, &text, TextFormat::Markdown)
            .await?;
        Ok(())
    }

    async fn stats(&self, message: &ChatMessage) -> Result<()> {
        let top = self.ledger.read().await.top_active(STATS_LIMIT);

        if top.is_empty() {
            self.connection
                .send_text(message.chat_id, &self.templates.no_stats, TextFormat::Plain)
                .await?;
            return Ok(());
        }

        let mut lines = vec![self.templates.stats_header.clone()];
        for (rank, (user_id, count)) in top.into_iter().enumerate() {
            let name = match self.connection.member_name(message.chat_id, user_id).await {
                Ok(name) => name,
                Err(e) => {
                    debug!("Could not resolve name of {}: {}", user_id, e);
                    format!("Usuario {}", user_id)
                }
            };
            lines.push(format!("{}. {}: {} mensajes", rank + 1, escape_markdown(&name), count));
        }

        self.connection
            .send_text(message.chat_id, &lines.join("\n"), TextFormat::Markdown)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::registry::JsonFileRegistry;
    use crate::platforms::testing::{Call, RecordingConnection};
    use crate::types::{ChatKind, ChatUser, Destination};
    use chrono::{TimeZone, Utc};
    use tempfile::{tempdir, TempDir};

    const ADMIN: i64 = 42;

    fn message(user_id: i64, chat_id: i64, text: &str) -> ChatMessage {
        ChatMessage {
            chat_id,
            chat_kind: ChatKind::Group,
            message_id: 1,
            from: ChatUser {
                id: user_id,
                first_name: "Ana".to_string(),
                last_name: None,
                username: Some("ana".to_string()),
            },
            text: text.to_string(),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    struct Fixture {
        _dir: TempDir,
        registry: Arc<JsonFileRegistry>,
        ledger: Arc<RwLock<ViolationLedger>>,
        connection: Arc<RecordingConnection>,
        commands: CommandSystem,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let registry = Arc::new(JsonFileRegistry::new(dir.path().join("grupos.json")));
        let ledger = Arc::new(RwLock::new(ViolationLedger::new(100)));
        let connection = Arc::new(RecordingConnection::new());
        let commands = CommandSystem::new(
            connection.clone(),
            registry.clone(),
            ledger.clone(),
            MessageTemplates::default(),
            ADMIN,
            PathBuf::from("logo.png"),
            &[vec![ActionLink {
                label: "Instagram".to_string(),
                url: "https://instagram.com/tienda".to_string(),
            }]],
        );
        Fixture {
            _dir: dir,
            registry,
            ledger,
            connection,
            commands,
        }
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("/start"), Some("start".to_string()));
        assert_eq!(parse_command("/Grupos@TiendaBot extra"), Some("grupos".to_string()));
        assert_eq!(parse_command("hola /start"), None);
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command("/@bot"), None);
    }

    #[tokio::test]
    async fn test_start_sends_logo_and_socials() {
        let f = fixture();
        assert!(f.commands.process_message(&message(1, 1, "/start")).await.unwrap());

        let calls = f.connection.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], Call::Photo { image, caption, .. }
            if image == "logo.png" && caption == "🌟 ¡Bienvenido Ana!"));
        assert!(matches!(&calls[1], Call::Keyboard { keyboard, .. } if keyboard[0].len() == 1));
    }

    #[tokio::test]
    async fn test_start_without_logo_falls_back_to_text() {
        let f = fixture();
        f.connection.remove_asset("logo.png");
        f.commands.process_message(&message(1, 1, "/start")).await.unwrap();
        assert_eq!(f.connection.texts_to(1), vec!["🌟 ¡Bienvenido Ana!".to_string()]);
    }

    #[tokio::test]
    async fn test_groups_is_admin_only() {
        let f = fixture();
        f.commands.process_message(&message(7, -5, "/grupos")).await.unwrap();
        assert_eq!(f.connection.texts_to(-5), vec![MessageTemplates::default().restricted_command]);
    }

    #[tokio::test]
    async fn test_groups_lists_destinations() {
        let f = fixture();
        f.commands.process_message(&message(ADMIN, ADMIN, "/grupos")).await.unwrap();
        assert_eq!(f.connection.texts_to(ADMIN), vec![MessageTemplates::default().no_groups]);

        f.registry
            .insert(-100, Destination { title: "Ventas_VIP".to_string(), kind: ChatKind::Supergroup })
            .await
            .unwrap();
        f.commands.process_message(&message(ADMIN, ADMIN, "/grupos")).await.unwrap();
        let texts = f.connection.texts_to(ADMIN);
        assert!(texts[1].contains("Ventas\\_VIP (`-100`) - supergroup"));
    }

    #[tokio::test]
    async fn test_stats_ranks_and_falls_back_to_id() {
        let f = fixture();
        f.commands.process_message(&message(1, -5, "/estadisticas")).await.unwrap();
        assert_eq!(f.connection.texts_to(-5), vec![MessageTemplates::default().no_stats]);

        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        {
            let mut ledger = f.ledger.write().await;
            for _ in 0..3 {
                ledger.record_message(10, now);
            }
            ledger.record_message(20, now);
        }
        f.connection.set_member_name(10, "Carla Ruiz");

        f.commands.process_message(&message(1, -5, "/estadisticas")).await.unwrap();
        let text = &f.connection.texts_to(-5)[1];
        assert!(text.contains("1. Carla Ruiz: 3 mensajes"));
        assert!(text.contains("2. Usuario 20: 1 mensajes"));
    }

    #[tokio::test]
    async fn test_unknown_command_is_ignored() {
        let f = fixture();
        assert!(!f.commands.process_message(&message(1, 1, "/ayuda")).await.unwrap());
        assert!(f.connection.calls().is_empty());
    }
}
