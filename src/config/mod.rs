// src/config/mod.rs - Bot configuration: YAML behaviour file plus environment credentials

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::bot::broadcast::ScheduleWindow;
use crate::types::{ActionLink, ChatId, ConfigError, Creative, UserId};

/// Secrets and identities taken from the environment
#[derive(Debug, Clone)]
pub struct Credentials {
    pub token: String,
    pub admin_id: UserId,
    /// Chat seeded into the destination registry at startup
    pub home_chat: Option<ChatId>,
}

impl Credentials {
    /// Load credentials from environment variables (`TOKEN`, `ADMIN_ID`, optional `CHAT_ID`)
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> std::result::Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingCredential("TOKEN"))?;

        let admin_raw = lookup("ADMIN_ID").ok_or(ConfigError::MissingCredential("ADMIN_ID"))?;
        let admin_id: UserId = admin_raw.trim().parse().map_err(|_| ConfigError::InvalidCredential {
            name: "ADMIN_ID",
            value: admin_raw.clone(),
        })?;
        if admin_id == 0 {
            return Err(ConfigError::MissingCredential("ADMIN_ID"));
        }

        let home_chat = match lookup("CHAT_ID") {
            Some(raw) if !raw.trim().is_empty() => {
                let id: ChatId = raw.trim().parse().map_err(|_| ConfigError::InvalidCredential {
                    name: "CHAT_ID",
                    value: raw.clone(),
                })?;
                if id == 0 { None } else { Some(id) }
            }
            _ => None,
        };

        Ok(Self {
            token,
            admin_id,
            home_chat,
        })
    }
}

/// Longest mute Telegram honours as temporary; anything beyond is permanent
pub const MAX_MUTE_SECONDS: u64 = 366 * 24 * 3600;
pub const MAX_RATE_WINDOW_SECONDS: u64 = 24 * 3600;

/// Penalty ladder, rate limiting and keyword lists
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    pub ban_threshold: u32,
    pub warn_threshold: u32,
    pub mute_duration_seconds: u64,
    pub rate_window_seconds: u64,
    pub rate_limit_count: usize,
    pub duplicate_limit: u32,
    /// Upper bound on distinct texts tracked by the duplicate counter
    pub duplicate_tracking_capacity: usize,
    pub warning_notice_ttl_seconds: u64,
    pub banned_words: Vec<String>,
    pub greeting_words: Vec<String>,
    pub thanks_words: Vec<String>,
    pub spam_links: Vec<String>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            ban_threshold: 5,
            warn_threshold: 3,
            mute_duration_seconds: 600,
            rate_window_seconds: 60,
            rate_limit_count: 5,
            duplicate_limit: 3,
            duplicate_tracking_capacity: 10_000,
            warning_notice_ttl_seconds: 30,
            banned_words: strings(&["puto", "puta", "palabrota1", "spam", "scam"]),
            greeting_words: strings(&["hola", "buenas", "saludos", "hey"]),
            thanks_words: strings(&["gracias", "thanks", "thx", "agradecido"]),
            spam_links: strings(&["bit.ly", "tinyurl", "spam.com"]),
        }
    }
}

/// Promotional rotation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// `HH:MM`, inclusive
    pub schedule_start: String,
    /// `HH:MM`, inclusive
    pub schedule_end: String,
    pub interval_seconds: u64,
    pub initial_delay_seconds: u64,
    pub catalog: Vec<Creative>,
}

impl BroadcastConfig {
    pub fn schedule_window(&self) -> std::result::Result<ScheduleWindow, ConfigError> {
        ScheduleWindow::parse(&self.schedule_start, &self.schedule_end)
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        let product = |n: u32, caption: &str| Creative {
            image: format!("producto{}.jpg", n),
            caption: caption.to_string(),
            actions: vec![
                link("💲 Precio", &format!("https://tuweb.com/producto{}", n)),
                link("🛒 Comprar", &format!("https://tuweb.com/comprar{}", n)),
                link("📤 Compartir", &format!("https://tuweb.com/compartir{}", n)),
            ],
        };

        Self {
            schedule_start: "07:00".to_string(),
            schedule_end: "21:00".to_string(),
            interval_seconds: 1800,
            initial_delay_seconds: 10,
            catalog: vec![
                product(1, "🔥 Producto 1 en oferta 🔥"),
                product(2, "🎉 Producto 2 exclusivo 🎉"),
                product(3, "🚀 Producto 3 con envío gratis 🚀"),
                product(4, "📦 Producto 4: última oportunidad 📦"),
                Creative {
                    image: "producto5.jpg".to_string(),
                    caption: "🌟 Contratá nuestro servicio ahora 🌟".to_string(),
                    actions: vec![
                        link("💲 Contratar + Info", "https://wa.me/5491161051718"),
                        link("📤 Compartir", "https://edgarglienke.com.ar/bot"),
                    ],
                },
            ],
        }
    }
}

/// User-facing texts. Placeholders: `{name}`, `{mention}`, `{user_id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageTemplates {
    pub greeting_reply: String,
    pub thanks_reply: String,
    pub banned_content_notice: String,
    pub rate_notice: String,
    pub duplicate_notice: String,
    pub mute_announcement: String,
    pub ban_announcement: String,
    pub admin_ban_notice: String,
    pub start_caption: String,
    pub social_prompt: String,
    pub restricted_command: String,
    pub no_groups: String,
    pub groups_header: String,
    pub no_stats: String,
    pub stats_header: String,
    pub welcome_caption: String,
    pub policy_prompt: String,
    pub policy_button: String,
    pub policy_accepted: String,
    pub policy_not_yours: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            greeting_reply: "¡Hola {name}! 👋".to_string(),
            thanks_reply: "¡De nada {name}! 😊".to_string(),
            banned_content_notice: "⚠️ {mention}, lenguaje inapropiado.".to_string(),
            rate_notice: "⚠️ {mention}, estás spameando.".to_string(),
            duplicate_notice: "⚠️ {mention}, mensaje repetido.".to_string(),
            mute_announcement: "🔇 Usuario silenciado temporalmente.".to_string(),
            ban_announcement: "🚫 Usuario baneado.".to_string(),
            admin_ban_notice: "🚨 Usuario {user_id} baneado.".to_string(),
            start_caption: "🌟 ¡Bienvenido {name}!".to_string(),
            social_prompt: "📲 ¡Sígueme en mis redes sociales!".to_string(),
            restricted_command: "🔒 Comando restringido.".to_string(),
            no_groups: "❌ No estoy en ningún grupo.".to_string(),
            groups_header: "📋 *Grupos activos:*".to_string(),
            no_stats: "📉 Sin datos aún.".to_string(),
            stats_header: "📊 *Top 10 usuarios activos:*".to_string(),
            welcome_caption: "👋 ¡Hola {name}! Bienvenido 🎉\n\nAceptá nuestras políticas para participar.".to_string(),
            policy_prompt: "Haz clic abajo para continuar:".to_string(),
            policy_button: "✅ Acepto políticas".to_string(),
            policy_accepted: "✅ ¡Gracias {name}! Políticas aceptadas.".to_string(),
            policy_not_yours: "🚫 Este botón es solo para vos.".to_string(),
        }
    }
}

/// Substitute `{key}` placeholders in a template
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut rendered = template.to_string();
    for (key, value) in vars {
        rendered = rendered.replace(&format!("{{{}}}", key), value);
    }
    rendered
}

/// Complete behaviour configuration, stored as YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub moderation: ModerationConfig,
    pub broadcast: BroadcastConfig,
    pub messages: MessageTemplates,
    pub registry_path: PathBuf,
    pub logo_path: PathBuf,
    /// Keyboard rows shown by `/start`
    pub social_links: Vec<Vec<ActionLink>>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            moderation: ModerationConfig::default(),
            broadcast: BroadcastConfig::default(),
            messages: MessageTemplates::default(),
            registry_path: PathBuf::from("grupos.json"),
            logo_path: PathBuf::from("logo.png"),
            social_links: vec![
                vec![
                    link("🌍 Facebook", "https://facebook.com/tu_pagina"),
                    link("🐦 Twitter", "https://twitter.com/tu_perfil"),
                    link("📸 Instagram", "https://instagram.com/tu_perfil"),
                    link("🎥 YouTube", "https://youtube.com/tu_canal"),
                ],
                vec![
                    link("💻 Web", "https://edgarglienke.com.ar"),
                    link("📱 WhatsApp", "https://wa.me/5491161051718"),
                ],
            ],
        }
    }
}

impl BotConfig {
    /// Load configuration from a YAML file, writing the defaults first if it does not exist.
    /// Environment overrides are applied and the result is validated.
    pub async fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Config file not found, creating default: {}", path.display());
            Self::create_default(path).await?;
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        let mut config: BotConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        config.apply_overrides(|name| env::var(name).ok())?;
        config.validate()?;

        info!(
            "Loaded configuration from {} ({} creatives, {} banned words)",
            path.display(),
            config.broadcast.catalog.len(),
            config.moderation.banned_words.len()
        );
        Ok(config)
    }

    async fn create_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
            }
        }

        let yaml = serde_yaml::to_string(&BotConfig::default()).context("Failed to serialize default config")?;
        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write default config to: {}", path.display()))?;

        info!("Created default configuration at: {}", path.display());
        Ok(())
    }

    /// Apply the recognised environment overrides on top of the file values
    pub fn apply_overrides<F>(&mut self, lookup: F) -> std::result::Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let m = &mut self.moderation;
        override_num(&lookup, "BAN_THRESHOLD", &mut m.ban_threshold)?;
        override_num(&lookup, "WARN_THRESHOLD", &mut m.warn_threshold)?;
        override_num(&lookup, "MUTE_DURATION_SECONDS", &mut m.mute_duration_seconds)?;
        override_num(&lookup, "RATE_WINDOW_SECONDS", &mut m.rate_window_seconds)?;
        override_num(&lookup, "RATE_LIMIT_COUNT", &mut m.rate_limit_count)?;
        override_num(&lookup, "DUPLICATE_LIMIT", &mut m.duplicate_limit)?;

        let b = &mut self.broadcast;
        override_num(&lookup, "AD_INTERVAL_SECONDS", &mut b.interval_seconds)?;
        if let Some(start) = lookup("AD_SCHEDULE_START") {
            debug!("AD_SCHEDULE_START override: {}", start);
            b.schedule_start = start.trim().to_string();
        }
        if let Some(end) = lookup("AD_SCHEDULE_END") {
            debug!("AD_SCHEDULE_END override: {}", end);
            b.schedule_end = end.trim().to_string();
        }
        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let m = &self.moderation;
        if m.warn_threshold == 0 || m.ban_threshold == 0 {
            return Err(ConfigError::Invalid("penalty thresholds must be at least 1".to_string()));
        }
        if m.warn_threshold > m.ban_threshold {
            return Err(ConfigError::Invalid(format!(
                "warn_threshold {} exceeds ban_threshold {}",
                m.warn_threshold, m.ban_threshold
            )));
        }
        if m.mute_duration_seconds == 0 || m.mute_duration_seconds > MAX_MUTE_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "mute_duration_seconds must be between 1 and {}",
                MAX_MUTE_SECONDS
            )));
        }
        if m.rate_window_seconds == 0 || m.rate_window_seconds > MAX_RATE_WINDOW_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "rate_window_seconds must be between 1 and {}",
                MAX_RATE_WINDOW_SECONDS
            )));
        }
        if m.duplicate_tracking_capacity == 0 {
            return Err(ConfigError::Invalid("duplicate_tracking_capacity must be positive".to_string()));
        }

        let b = &self.broadcast;
        if b.interval_seconds == 0 {
            return Err(ConfigError::Invalid("broadcast interval_seconds must be positive".to_string()));
        }
        b.schedule_window()?;
        if b.catalog.is_empty() {
            return Err(ConfigError::Invalid("broadcast catalog is empty".to_string()));
        }

        let links = b
            .catalog
            .iter()
            .flat_map(|c| c.actions.iter())
            .chain(self.social_links.iter().flatten());
        for action in links {
            url::Url::parse(&action.url).map_err(|e| {
                ConfigError::Invalid(format!("action '{}' has invalid url '{}': {}", action.label, action.url, e))
            })?;
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}

fn override_num<F, T>(lookup: &F, name: &'static str, target: &mut T) -> std::result::Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(name) {
        *target = raw.trim().parse().map_err(|_| ConfigError::InvalidCredential { name, value: raw.clone() })?;
        debug!("{} overridden from environment", name);
    }
    Ok(())
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn link(label: &str, url: &str) -> ActionLink {
    ActionLink {
        label: label.to_string(),
        url: url.to_string(),
    }
}
