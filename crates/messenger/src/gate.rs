use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use famcal_core::domain::conversation::SenderId;
use famcal_core::domain::family::FamilyWhitelist;

const DEFAULT_CACHE_CAPACITY: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    /// Unknown sender that should be told once per cooldown window.
    Rejected,
    /// Unknown sender already notified within the cooldown window.
    Silenced,
}

impl GateDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Rejected => "rejected",
            Self::Silenced => "silenced",
        }
    }
}

/// Remembers when unknown senders were last sent a rejection notice.
///
/// Capacity is bounded: entries outside the cooldown are evicted first, then the oldest.
pub struct RejectionCache {
    cooldown: Duration,
    capacity: usize,
    notified: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl RejectionCache {
    pub fn new(cooldown: Duration, capacity: usize) -> Self {
        Self { cooldown, capacity: capacity.max(1), notified: Mutex::new(HashMap::new()) }
    }

    /// True when `sender` has not been notified within the cooldown; records `now` if so.
    pub async fn should_notify(&self, sender: &str, now: DateTime<Utc>) -> bool {
        let mut notified = self.notified.lock().await;
        if let Some(last) = notified.get(sender) {
            if now - *last < self.cooldown {
                return false;
            }
        }

        notified.insert(sender.to_owned(), now);
        if notified.len() > self.capacity {
            let cooldown = self.cooldown;
            notified.retain(|_, last| now - *last < cooldown);
        }
        while notified.len() > self.capacity {
            let oldest = notified.iter().min_by_key(|(_, last)| **last).map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    notified.remove(&key);
                }
                None => break,
            }
        }
        true
    }

    pub async fn len(&self) -> usize {
        self.notified.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.notified.lock().await.is_empty()
    }
}

/// Family whitelist check in front of the agent.
pub struct AccessGate {
    whitelist: Arc<FamilyWhitelist>,
    rejections: RejectionCache,
}

impl AccessGate {
    pub fn new(whitelist: Arc<FamilyWhitelist>, cooldown: Duration) -> Self {
        Self { whitelist, rejections: RejectionCache::new(cooldown, DEFAULT_CACHE_CAPACITY) }
    }

    pub async fn check(&self, sender: &SenderId, now: DateTime<Utc>) -> GateDecision {
        if self.whitelist.is_allowed(&sender.0) {
            return GateDecision::Allowed;
        }
        if self.rejections.should_notify(&sender.0, now).await {
            GateDecision::Rejected
        } else {
            GateDecision::Silenced
        }
    }
}
