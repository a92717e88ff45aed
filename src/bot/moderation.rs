// src/bot/moderation.rs - Turns verdicts and penalties into platform actions

use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};

use crate::bot::escalation::PenaltyEscalator;
use crate::bot::ledger::ViolationLedger;
use crate::bot::rules::RuleEngine;
use crate::config::{render, MessageTemplates, ModerationConfig};
use crate::platforms::PlatformConnection;
use crate::types::{ChatMessage, MessageHandle, PenaltyAction, TextFormat, UserId, Verdict};

/// Result of moderating one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModerationOutcome {
    pub verdict: Verdict,
    pub penalty: PenaltyAction,
}

pub struct ModerationSystem {
    ledger: Arc<RwLock<ViolationLedger>>,
    rules: RuleEngine,
    escalator: PenaltyEscalator,
    templates: MessageTemplates,
    admin_id: UserId,
    notice_ttl: Duration,
    connection: Arc<dyn PlatformConnection>,
}

impl ModerationSystem {
    pub fn new(
        config: &ModerationConfig,
        templates: MessageTemplates,
        admin_id: UserId,
        connection: Arc<dyn PlatformConnection>,
    ) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(ViolationLedger::new(config.duplicate_tracking_capacity))),
            rules: RuleEngine::new(config),
            escalator: PenaltyEscalator::new(config),
            templates,
            admin_id,
            notice_ttl: Duration::from_secs(config.warning_notice_ttl_seconds),
            connection,
        }
    }

    /// Shared handle to the ledger, read by the statistics command
    pub fn ledger(&self) -> Arc<RwLock<ViolationLedger>> {
        Arc::clone(&self.ledger)
    }

    /// Classify a group message and carry out the response.
    ///
    /// Platform failures are logged and never stop the remaining steps.
    pub async fn handle_message(&self, message: &ChatMessage) -> ModerationOutcome {
        let verdict = {
            let mut ledger = self.ledger.write().await;
            self.rules
                .classify(&mut ledger, message.from.id, message.chat_id, &message.text, message.timestamp)
        };

        let penalty = match verdict {
            Verdict::Greeting => {
                self.reply(message, &self.templates.greeting_reply).await;
                PenaltyAction::None
            }
            Verdict::Thanks => {
                self.reply(message, &self.templates.thanks_reply).await;
                PenaltyAction::None
            }
            Verdict::BannedContent | Verdict::RateViolation | Verdict::DuplicateViolation => {
                self.respond_to_violation(message, verdict).await
            }
            Verdict::Clean => PenaltyAction::None,
        };

        ModerationOutcome { verdict, penalty }
    }

    async fn reply(&self, message: &ChatMessage, template: &str) {
        let text = render(template, &[("name", &message.from.first_name)]);
        if let Err(e) = self.connection.send_text(message.chat_id, &text, TextFormat::Plain).await {
            error!("Failed to reply in chat {}: {}", message.chat_id, e);
        }
    }

    async fn respond_to_violation(&self, message: &ChatMessage, verdict: Verdict) -> PenaltyAction {
        let user = &message.from;
        info!(
            "Removing message {} from {} ({}) in chat {}: {}",
            message.message_id,
            user.handle(),
            user.id,
            message.chat_id,
            verdict
        );

        if let Err(e) = self.connection.delete_message(message.handle()).await {
            error!("Failed to delete message {} in chat {}: {}", message.message_id, message.chat_id, e);
        }

        let template = match verdict {
            Verdict::BannedContent => &self.templates.banned_content_notice,
            Verdict::RateViolation => &self.templates.rate_notice,
            _ => &self.templates.duplicate_notice,
        };
        let notice = render(
            template,
            &[("mention", &user.mention_markdown()), ("name", &user.first_name)],
        );

        match self
            .connection
            .send_text(message.chat_id, &notice, TextFormat::Markdown)
            .await
        {
            Ok(handle) => self.schedule_notice_removal(handle),
            Err(e) => error!("Failed to post warning notice in chat {}: {}", message.chat_id, e),
        }

        let penalty = {
            let mut ledger = self.ledger.write().await;
            self.escalator.evaluate(&mut ledger, user.id)
        };

        match penalty {
            PenaltyAction::None => {}
            PenaltyAction::Mute { duration_seconds } => self.mute(message, duration_seconds).await,
            PenaltyAction::Ban => self.ban(message).await,
        }

        penalty
    }

    /// Fire-and-forget deletion of a warning notice
    fn schedule_notice_removal(&self, handle: MessageHandle) {
        let connection = Arc::clone(&self.connection);
        let ttl = self.notice_ttl;
        tokio::spawn(async move {
            sleep(ttl).await;
            if let Err(e) = connection.delete_message(handle).await {
                debug!("Warning notice {} in chat {} not removed: {}", handle.message_id, handle.chat_id, e);
            }
        });
    }

    async fn mute(&self, message: &ChatMessage, duration_seconds: u64) {
        let user = &message.from;
        let Some(until) = i64::try_from(duration_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|d| Utc::now().checked_add_signed(d))
        else {
            error!("Mute of {}s for {} is out of range, not muting", duration_seconds, user.id);
            return;
        };

        match self.connection.restrict_member(message.chat_id, user.id, until).await {
            Ok(()) => {
                info!("Muted {} in chat {} for {}s", user.id, message.chat_id, duration_seconds);
                let text = render(&self.templates.mute_announcement, &[("name", &user.first_name)]);
                if let Err(e) = self.connection.send_text(message.chat_id, &text, TextFormat::Plain).await {
                    error!("Failed to announce mute in chat {}: {}", message.chat_id, e);
                }
            }
            Err(e) => error!("Failed to mute {} in chat {}: {}", user.id, message.chat_id, e),
        }
    }

    async fn ban(&self, message: &ChatMessage) {
        let user = &message.from;

        match self.connection.ban_member(message.chat_id, user.id).await {
            Ok(()) => {
                info!("Banned {} from chat {}", user.id, message.chat_id);
                let text = render(&self.templates.ban_announcement, &[("name", &user.first_name)]);
                if let Err(e) = self.connection.send_text(message.chat_id, &text, TextFormat::Plain).await {
                    error!("Failed to announce ban in chat {}: {}", message.chat_id, e);
                }
            }
            Err(e) => {
                error!("Failed to ban {} from chat {}: {}", user.id, message.chat_id, e);
                return;
            }
        }

        let user_id = user.id.to_string();
        let notice = render(
            &self.templates.admin_ban_notice,
            &[("user_id", &user_id), ("name", &user.first_name)],
        );
        if let Err(e) = self.connection.send_text(self.admin_id, &notice, TextFormat::Plain).await {
            warn!("Failed to notify administrator of ban: {}", e);
        }
    }
}
