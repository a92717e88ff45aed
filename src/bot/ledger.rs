// src/bot/ledger.rs - Per-user message windows, warning tallies and the shared duplicate counter

use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::collections::{HashMap, VecDeque};

use crate::types::UserId;

#[derive(Debug, Default)]
struct UserRecord {
    warnings: u32,
    recent: VecDeque<DateTime<Utc>>,
}

/// Occurrence counts keyed by normalized text, evicting the oldest key once full
#[derive(Debug)]
struct DuplicateCounter {
    counts: HashMap<String, u32>,
    insertion_order: VecDeque<String>,
    capacity: usize,
}

impl DuplicateCounter {
    fn new(capacity: usize) -> Self {
        Self {
            counts: HashMap::new(),
            insertion_order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn bump(&mut self, key: &str) -> u32 {
        if let Some(count) = self.counts.get_mut(key) {
            *count += 1;
            return *count;
        }

        while self.counts.len() >= self.capacity {
            match self.insertion_order.pop_front() {
                Some(oldest) => {
                    self.counts.remove(&oldest);
                    debug!("Duplicate counter full, evicted oldest text");
                }
                None => break,
            }
        }

        self.counts.insert(key.to_string(), 1);
        self.insertion_order.push_back(key.to_string());
        1
    }

    fn get(&self, key: &str) -> u32 {
        self.counts.get(key).copied().unwrap_or(0)
    }
}

/// Process-lifetime moderation state. Each operation touches a single user or a single text.
#[derive(Debug)]
pub struct ViolationLedger {
    users: HashMap<UserId, UserRecord>,
    duplicates: DuplicateCounter,
}

impl ViolationLedger {
    pub fn new(duplicate_capacity: usize) -> Self {
        Self {
            users: HashMap::new(),
            duplicates: DuplicateCounter::new(duplicate_capacity),
        }
    }

    /// Append a message timestamp to the user's recent sequence
    pub fn record_message(&mut self, user_id: UserId, now: DateTime<Utc>) {
        self.users.entry(user_id).or_default().recent.push_back(now);
    }

    /// Drop timestamps that are `window_seconds` or more older than `now`
    pub fn prune_older_than(&mut self, user_id: UserId, now: DateTime<Utc>, window_seconds: u64) {
        // a window too large to represent keeps everything
        let Some(window) = i64::try_from(window_seconds).ok().and_then(Duration::try_seconds) else {
            return;
        };
        if let Some(record) = self.users.get_mut(&user_id) {
            record.recent.retain(|t| now.signed_duration_since(*t) < window);
        }
    }

    pub fn recent_count(&self, user_id: UserId) -> usize {
        self.users.get(&user_id).map(|r| r.recent.len()).unwrap_or(0)
    }

    /// Add one warning and return the new tally
    pub fn increment_warning(&mut self, user_id: UserId) -> u32 {
        let record = self.users.entry(user_id).or_default();
        record.warnings += 1;
        record.warnings
    }

    pub fn reset_warning(&mut self, user_id: UserId) {
        if let Some(record) = self.users.get_mut(&user_id) {
            record.warnings = 0;
        }
    }

    pub fn warning_count(&self, user_id: UserId) -> u32 {
        self.users.get(&user_id).map(|r| r.warnings).unwrap_or(0)
    }

    /// Count one more occurrence of a normalized text and return the new total
    pub fn bump_duplicate(&mut self, normalized_text: &str) -> u32 {
        self.duplicates.bump(normalized_text)
    }

    pub fn duplicate_count(&self, normalized_text: &str) -> u32 {
        self.duplicates.get(normalized_text)
    }

    /// Distinct texts currently tracked by the duplicate counter
    pub fn tracked_texts(&self) -> usize {
        self.duplicates.counts.len()
    }

    /// Users with the most messages in their current window, busiest first
    pub fn top_active(&self, limit: usize) -> Vec<(UserId, usize)> {
        let mut ranking: Vec<(UserId, usize)> = self
            .users
            .iter()
            .filter(|(_, r)| !r.recent.is_empty())
            .map(|(id, r)| (*id, r.recent.len()))
            .collect();
        ranking.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranking.truncate(limit);
        ranking
    }
}
