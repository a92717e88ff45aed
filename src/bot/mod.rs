use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::config::{BotConfig, Credentials};
use crate::platforms::PlatformConnection;
use crate::types::{ChatId, ChatKind, ChatMessage, Destination, InboundEvent, MemberStatus};

pub mod broadcast;
pub mod commands;
pub mod escalation;
pub mod ledger;
pub mod moderation;
pub mod onboarding;
pub mod registry;
pub mod rules;
pub mod scheduler;

use broadcast::BroadcastPool;
use commands::CommandSystem;
use moderation::ModerationSystem;
use onboarding::OnboardingSystem;
use registry::{DestinationRegistry, JsonFileRegistry};
use scheduler::BroadcastScheduler;

/// How long shutdown waits for the event being handled to finish
const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Routes every inbound event to the system responsible for it
pub struct EventRouter {
    moderation: ModerationSystem,
    commands: CommandSystem,
    onboarding: OnboardingSystem,
    registry: Arc<dyn DestinationRegistry>,
}

impl EventRouter {
    /// Process one event to completion
    pub async fn handle_event(&self, event: InboundEvent) {
        match event {
            InboundEvent::Message(message) => self.handle_message(&message).await,
            InboundEvent::MembersJoined { chat_id, members } => self.onboarding.welcome(chat_id, &members).await,
            InboundEvent::MembershipChanged {
                chat_id,
                title,
                kind,
                status,
            } => self.track_membership(chat_id, title, kind, status).await,
            InboundEvent::CallbackQuery(query) => {
                if !self.onboarding.handle_callback(&query).await {
                    debug!("Ignoring callback '{}' from {}", query.data, query.from.id);
                }
            }
        }
    }

    async fn handle_message(&self, message: &ChatMessage) {
        // Commands never go through moderation
        if message.text.trim_start().starts_with('/') {
            if let Err(e) = self.commands.process_message(message).await {
                error!("Command from {} in chat {} failed: {:#}", message.from.id, message.chat_id, e);
            }
            return;
        }

        if !message.chat_kind.is_group() {
            debug!("Ignoring {} message from {}", message.chat_kind.as_str(), message.from.id);
            return;
        }

        self.moderation.handle_message(message).await;
    }

    async fn track_membership(&self, chat_id: ChatId, title: String, kind: ChatKind, status: MemberStatus) {
        if !kind.is_group() {
            return;
        }

        let result = match status {
            MemberStatus::Member | MemberStatus::Administrator | MemberStatus::Creator => {
                info!("Added to {} '{}' ({})", kind.as_str(), title, chat_id);
                self.registry.insert(chat_id, Destination { title, kind }).await
            }
            MemberStatus::Left | MemberStatus::Kicked => {
                info!("Removed from '{}' ({})", title, chat_id);
                self.registry.remove(chat_id).await.map(|_| ())
            }
            MemberStatus::Restricted => Ok(()),
        };

        if let Err(e) = result {
            error!("Failed to update destination registry for {}: {}", chat_id, e);
        }
    }
}

/// Core bot engine: one connection, a sequential event loop and the broadcast scheduler
pub struct ChatBot {
    connection: Arc<dyn PlatformConnection>,
    router: Arc<EventRouter>,
    registry: Arc<dyn DestinationRegistry>,
    scheduler: Arc<BroadcastScheduler>,
    home_chat: Option<ChatId>,
    shutdown: Arc<Notify>,
    event_loop: Option<JoinHandle<()>>,
    broadcasts: Option<JoinHandle<()>>,
}

impl ChatBot {
    pub fn new(config: BotConfig, credentials: &Credentials, connection: Arc<dyn PlatformConnection>) -> Result<Self> {
        let registry: Arc<dyn DestinationRegistry> = Arc::new(JsonFileRegistry::new(&config.registry_path));

        let moderation = ModerationSystem::new(
            &config.moderation,
            config.messages.clone(),
            credentials.admin_id,
            Arc::clone(&connection),
        );
        let commands = CommandSystem::new(
            Arc::clone(&connection),
            Arc::clone(&registry),
            moderation.ledger(),
            config.messages.clone(),
            credentials.admin_id,
            config.logo_path.clone(),
            &config.social_links,
        );
        let onboarding = OnboardingSystem::new(
            Arc::clone(&connection),
            config.messages.clone(),
            config.logo_path.clone(),
        );

        let window = config
            .broadcast
            .schedule_window()
            .context("Invalid broadcast schedule")?;
        let pool = BroadcastPool::new(config.broadcast.catalog.clone(), window);
        let scheduler = Arc::new(BroadcastScheduler::new(
            pool,
            Arc::clone(&registry),
            Arc::clone(&connection),
            Duration::from_secs(config.broadcast.interval_seconds),
            Duration::from_secs(config.broadcast.initial_delay_seconds),
        ));

        let router = Arc::new(EventRouter {
            moderation,
            commands,
            onboarding,
            registry: Arc::clone(&registry),
        });

        Ok(Self {
            connection,
            router,
            registry,
            scheduler,
            home_chat: credentials.home_chat,
            shutdown: Arc::new(Notify::new()),
            event_loop: None,
            broadcasts: None,
        })
    }

    pub fn router(&self) -> Arc<EventRouter> {
        Arc::clone(&self.router)
    }

    /// Connect, start the event loop and the broadcast scheduler. Returns immediately.
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting chat bot on {}...", self.connection.platform_name());

        self.seed_home_chat().await?;

        self.connection
            .connect()
            .await
            .with_context(|| format!("Failed to connect to {}", self.connection.platform_name()))?;

        let receiver = self
            .connection
            .get_event_receiver()
            .context("Connection does not provide an event receiver")?;
        let event_loop = self.start_event_loop(receiver);
        self.event_loop = Some(event_loop);
        self.broadcasts = Some(self.scheduler.start());

        info!("Chat bot started successfully");
        Ok(())
    }

    async fn seed_home_chat(&self) -> Result<()> {
        let Some(chat_id) = self.home_chat else {
            return Ok(());
        };

        let destinations = self
            .registry
            .load()
            .await
            .context("Failed to load destination registry")?;
        if !destinations.contains_key(&chat_id) {
            info!("Seeding home chat {} into the destination registry", chat_id);
            self.registry
                .insert(
                    chat_id,
                    Destination {
                        title: "home".to_string(),
                        kind: ChatKind::Supergroup,
                    },
                )
                .await
                .context("Failed to seed home chat")?;
        }
        Ok(())
    }

    /// Events are handled one at a time, each to completion
    fn start_event_loop(&self, mut receiver: tokio::sync::broadcast::Receiver<InboundEvent>) -> JoinHandle<()> {
        let router = Arc::clone(&self.router);
        let shutdown = Arc::clone(&self.shutdown);

        tokio::spawn(async move {
            info!("Event loop started");
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.notified() => {
                        info!("Event loop received shutdown signal");
                        break;
                    }
                    received = receiver.recv() => match received {
                        Ok(event) => router.handle_event(event).await,
                        Err(RecvError::Lagged(n)) => {
                            warn!("Event loop lagged behind, skipped {} events", n);
                        }
                        Err(RecvError::Closed) => {
                            info!("Event channel closed");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Stop the scheduler, let the event in progress finish, then disconnect.
    /// Events still queued when the loop notices the signal are dropped.
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down chat bot...");

        self.scheduler.shutdown();
        if let Some(task) = self.broadcasts.take() {
            // may be sleeping until its next tick
            task.abort();
            let _ = task.await;
        }

        self.shutdown.notify_one();
        if let Some(mut task) = self.event_loop.take() {
            match tokio::time::timeout(EVENT_DRAIN_TIMEOUT, &mut task).await {
                Ok(Ok(())) => debug!("Event loop drained"),
                Ok(Err(e)) => error!("Event loop task failed: {}", e),
                Err(_) => {
                    warn!("Event loop did not stop within {:?}, aborting", EVENT_DRAIN_TIMEOUT);
                    task.abort();
                    let _ = task.await;
                }
            }
        }

        if let Err(e) = self.connection.disconnect().await {
            error!("Failed to disconnect from {}: {}", self.connection.platform_name(), e);
        }

        info!("Chat bot shutdown complete");
        Ok(())
    }
}
