// src/bot/registry.rs - Persistent set of chats the bot broadcasts to

use async_trait::async_trait;
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::types::{ChatId, Destination, RegistryError};

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Enumerate-all access for fan-out plus the updates driven by membership events
#[async_trait]
pub trait DestinationRegistry: Send + Sync {
    async fn load(&self) -> RegistryResult<BTreeMap<ChatId, Destination>>;

    /// Insert or replace a destination
    async fn insert(&self, chat_id: ChatId, destination: Destination) -> RegistryResult<()>;

    /// Returns whether the destination was present
    async fn remove(&self, chat_id: ChatId) -> RegistryResult<bool>;
}

/// Registry stored as a pretty-printed JSON object keyed by chat id string
pub struct JsonFileRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read(&self) -> RegistryResult<BTreeMap<ChatId, Destination>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Registry {} does not exist yet", self.path.display());
                return Ok(BTreeMap::new());
            }
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        let raw: HashMap<String, Destination> = serde_json::from_str(&content)?;
        raw.into_iter()
            .map(|(key, destination)| {
                key.trim()
                    .parse::<ChatId>()
                    .map(|id| (id, destination))
                    .map_err(|_| RegistryError::InvalidKey(key))
            })
            .collect()
    }

    async fn write(&self, destinations: &BTreeMap<ChatId, Destination>) -> RegistryResult<()> {
        let raw: BTreeMap<String, &Destination> = destinations.iter().map(|(id, d)| (id.to_string(), d)).collect();
        let content = serde_json::to_string_pretty(&raw)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl DestinationRegistry for JsonFileRegistry {
    async fn load(&self) -> RegistryResult<BTreeMap<ChatId, Destination>> {
        self.read().await
    }

    async fn insert(&self, chat_id: ChatId, destination: Destination) -> RegistryResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut destinations = self.read().await?;
        info!("Registering destination {} ({})", destination.title, chat_id);
        destinations.insert(chat_id, destination);
        self.write(&destinations).await
    }

    async fn remove(&self, chat_id: ChatId) -> RegistryResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut destinations = self.read().await?;
        let removed = destinations.remove(&chat_id).is_some();
        if removed {
            info!("Unregistering destination {}", chat_id);
            self.write(&destinations).await?;
        }
        Ok(removed)
    }
}
