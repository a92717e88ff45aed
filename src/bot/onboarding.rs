// src/bot/onboarding.rs - Welcome for new members and policy acceptance

use log::{debug, error, info};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{render, MessageTemplates};
use crate::platforms::PlatformConnection;
use crate::types::{Button, CallbackQuery, ChatId, ChatUser, PlatformError, PlatformResult, TextFormat, UserId};

const POLICY_PREFIX: &str = "accept_policy_";

pub fn policy_callback_data(user_id: UserId) -> String {
    format!("{}{}", POLICY_PREFIX, user_id)
}

/// User id carried by an `accept_policy_{id}` callback
pub fn parse_policy_callback(data: &str) -> Option<UserId> {
    data.strip_prefix(POLICY_PREFIX)?.parse().ok()
}

pub struct OnboardingSystem {
    connection: Arc<dyn PlatformConnection>,
    templates: MessageTemplates,
    welcome_image: PathBuf,
}

impl OnboardingSystem {
    pub fn new(connection: Arc<dyn PlatformConnection>, templates: MessageTemplates, welcome_image: PathBuf) -> Self {
        Self {
            connection,
            templates,
            welcome_image,
        }
    }

    /// Greet each new member and ask them to accept the group policies
    pub async fn welcome(&self, chat_id: ChatId, members: &[ChatUser]) {
        for member in members {
            info!("New member {} ({}) in chat {}", member.handle(), member.id, chat_id);
            if let Err(e) = self.welcome_member(chat_id, member).await {
                error!("Failed to welcome {} in chat {}: {}", member.id, chat_id, e);
            }
        }
    }

    async fn welcome_member(&self, chat_id: ChatId, member: &ChatUser) -> PlatformResult<()> {
        let caption = render(&self.templates.welcome_caption, &[("name", &member.first_name)]);
        let image = self.welcome_image.to_string_lossy();

        match self.connection.send_photo(chat_id, &image, &caption, &[]).await {
            Ok(_) => {}
            Err(PlatformError::AssetNotFound(_)) => {
                debug!("Welcome image missing, sending caption as text");
                self.connection.send_text(chat_id, &caption, TextFormat::Plain).await?;
            }
            Err(e) => return Err(e),
        }

        let keyboard = vec![vec![Button::Callback {
            label: self.templates.policy_button.clone(),
            data: policy_callback_data(member.id),
        }]];
        self.connection
            .send_keyboard(chat_id, &self.templates.policy_prompt, &keyboard)
            .await?;
        Ok(())
    }

    /// Handle a button press. Returns false for callbacks that are not policy acceptances.
    pub async fn handle_callback(&self, query: &CallbackQuery) -> bool {
        let Some(expected_user) = parse_policy_callback(&query.data) else {
            return false;
        };

        if let Err(e) = self.connection.answer_callback(&query.id).await {
            error!("Failed to answer callback {}: {}", query.id, e);
        }

        let text = if query.from.id == expected_user {
            info!("User {} accepted the policies", query.from.id);
            render(&self.templates.policy_accepted, &[("name", &query.from.first_name)])
        } else {
            debug!("User {} pressed the policy button of {}", query.from.id, expected_user);
            render(&self.templates.policy_not_yours, &[("name", &query.from.first_name)])
        };

        if let Some(message) = query.message {
            if let Err(e) = self.connection.edit_message_text(message, &text).await {
                error!("Failed to update policy message in chat {}: {}", message.chat_id, e);
            }
        }
        true
    }
}
