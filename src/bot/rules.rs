// src/bot/rules.rs - Ordered first-match classification of inbound messages

use chrono::{DateTime, Utc};
use log::debug;

use crate::bot::ledger::ViolationLedger;
use crate::config::ModerationConfig;
use crate::types::{ChatId, UserId, Verdict};

/// Literal, case-insensitive keyword rules plus rate and duplicate limits
#[derive(Debug, Clone)]
pub struct RuleEngine {
    greeting_words: Vec<String>,
    thanks_words: Vec<String>,
    blocked_terms: Vec<String>,
    rate_window_seconds: u64,
    rate_limit_count: usize,
    duplicate_limit: u32,
}

impl RuleEngine {
    pub fn new(config: &ModerationConfig) -> Self {
        Self {
            greeting_words: keywords(&config.greeting_words),
            thanks_words: keywords(&config.thanks_words),
            blocked_terms: keywords(config.banned_words.iter().chain(config.spam_links.iter())),
            rate_window_seconds: config.rate_window_seconds,
            rate_limit_count: config.rate_limit_count,
            duplicate_limit: config.duplicate_limit,
        }
    }

    /// Key under which a text is counted for duplicate detection
    pub fn normalize(text: &str) -> String {
        text.to_lowercase()
    }

    /// Classify one message, first matching rule wins:
    /// greeting, thanks, banned content, rate, duplicate, clean.
    ///
    /// The three violating verdicts add exactly one warning to the sender; the others
    /// leave warnings untouched. Greeting, thanks and banned content return before the
    /// message is recorded in the rate window or the duplicate counter.
    pub fn classify(
        &self,
        ledger: &mut ViolationLedger,
        user_id: UserId,
        chat_id: ChatId,
        text: &str,
        now: DateTime<Utc>,
    ) -> Verdict {
        let normalized = Self::normalize(text);

        let verdict = if contains_any(&normalized, &self.greeting_words) {
            Verdict::Greeting
        } else if contains_any(&normalized, &self.thanks_words) {
            Verdict::Thanks
        } else if contains_any(&normalized, &self.blocked_terms) {
            Verdict::BannedContent
        } else {
            ledger.record_message(user_id, now);
            ledger.prune_older_than(user_id, now, self.rate_window_seconds);

            if ledger.recent_count(user_id) > self.rate_limit_count {
                Verdict::RateViolation
            } else if ledger.bump_duplicate(&normalized) > self.duplicate_limit {
                Verdict::DuplicateViolation
            } else {
                Verdict::Clean
            }
        };

        if verdict.is_violation() {
            let warnings = ledger.increment_warning(user_id);
            debug!("User {} in chat {}: {} (warnings: {})", user_id, chat_id, verdict, warnings);
        } else {
            debug!("User {} in chat {}: {}", user_id, chat_id, verdict);
        }

        verdict
    }
}

fn keywords<'a, I>(words: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    words
        .into_iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn contains_any(text: &str, needles: &[String]) -> bool {
    needles.iter().any(|needle| text.contains(needle.as_str()))
}
