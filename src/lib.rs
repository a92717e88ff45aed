//! # Group Chat Moderation and Broadcast Bot
//!
//! Moderates group chats with keyword, rate and duplicate rules, escalating repeat
//! offenders from warnings to a temporary mute and finally a ban. Alongside moderation
//! it rotates a catalog of promotional creatives across every group the bot belongs to.
//!
//! ## Features
//!
//! - **Ordered rule engine**: greeting, thanks, banned content, rate and duplicate checks
//! - **Penalty ladder**: warnings accumulate per user, mute at the warn threshold, ban at the ban threshold
//! - **Broadcast rotation**: shuffled catalog with no repeats inside a cycle, gated by a daily window
//! - **Per-destination isolation**: one unreachable group never blocks delivery to the others
//! - **Telegram connector**: long-polling Bot API client
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modcast::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let credentials = Credentials::from_env()?;
//!     let config = BotConfig::load_or_create("config/bot.yaml").await?;
//!
//!     let connection = Arc::new(TelegramConnection::new(TelegramConfig::new(credentials.token.clone())));
//!     let mut bot = ChatBot::new(config, &credentials, connection)?;
//!     bot.start().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     bot.shutdown().await
//! }
//! ```

pub mod types;
pub mod config;
pub mod platforms;
pub mod bot;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::ChatBot;
    pub use crate::bot::broadcast::{BroadcastPool, ScheduleWindow};
    pub use crate::bot::escalation::PenaltyEscalator;
    pub use crate::bot::ledger::ViolationLedger;
    pub use crate::bot::registry::{DestinationRegistry, JsonFileRegistry};
    pub use crate::bot::rules::RuleEngine;
    pub use crate::bot::scheduler::{BroadcastScheduler, CycleReport};
    pub use crate::config::{BotConfig, Credentials};
    pub use crate::platforms::{
        PlatformConnection,
        telegram::{TelegramConnection, TelegramConfig},
    };
    pub use crate::types::{
        ChatMessage, Creative, Destination, DrawOutcome, EmptyReason, InboundEvent, PenaltyAction, Verdict,
    };
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
