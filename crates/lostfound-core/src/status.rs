//! Status Tracker: ephemeral ingestion state keyed by item id.
//!
//! Clients poll [`StatusTracker::get`] until a terminal state. Entries are
//! pruned a grace period after reaching a terminal state, once polled more
//! than the attempt ceiling, or once they outlive the maximum lifetime
//! without finishing, so abandoned items never accumulate.

use std::{fmt::Display, future::Future, time::Duration};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::{
    config::StatusConfig,
    models::{IngestionState, IngestionStatus, ItemId},
};

/// Process-wide map from item id to ingestion status.
#[derive(Debug)]
pub struct StatusTracker {
    entries: DashMap<ItemId, IngestionStatus>,
    grace: chrono::Duration,
    max_poll_attempts: u32,
    max_lifetime: chrono::Duration,
}

/// Lifetime of unfinished entries unless configured otherwise.
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(3600);

impl StatusTracker {
    pub fn new(grace: Duration, max_poll_attempts: u32) -> Self {
        Self {
            entries: DashMap::new(),
            grace: to_chrono(grace),
            max_poll_attempts,
            max_lifetime: to_chrono(DEFAULT_MAX_LIFETIME),
        }
    }

    /// Bound how long an entry may stay pending or processing.
    pub fn with_max_lifetime(mut self, max_lifetime: Duration) -> Self {
        self.max_lifetime = to_chrono(max_lifetime);
        self
    }

    pub fn from_config(config: &StatusConfig) -> Self {
        Self::new(
            Duration::from_secs(config.grace_seconds),
            config.max_poll_attempts,
        )
        .with_max_lifetime(Duration::from_secs(config.max_lifetime_seconds))
    }

    /// Register a new ingestion in `Pending`.
    pub fn start(&self, id: &ItemId) {
        let now = Utc::now();
        self.entries.insert(
            id.clone(),
            IngestionStatus {
                state: IngestionState::Pending,
                message: "Queued for processing".to_string(),
                attempt_count: 0,
                last_checked_at: None,
                created_at: now,
                finished_at: None,
            },
        );
        debug!("Tracking ingestion {}", id);
    }

    /// Read the status on behalf of a polling client.
    ///
    /// Each call counts as one poll attempt.
    pub fn get(&self, id: &ItemId) -> Option<IngestionStatus> {
        let mut entry = self.entries.get_mut(id)?;
        entry.attempt_count = entry.attempt_count.saturating_add(1);
        entry.last_checked_at = Some(Utc::now());
        Some(entry.clone())
    }

    /// Read the status without touching poll bookkeeping.
    pub fn peek(&self, id: &ItemId) -> Option<IngestionStatus> {
        self.entries.get(id).map(|entry| entry.clone())
    }

    /// Move an entry to `state`.
    ///
    /// Returns false when the id is unknown or the entry is already terminal;
    /// terminal states never change.
    pub fn mark(&self, id: &ItemId, state: IngestionState, message: impl Into<String>) -> bool {
        let Some(mut entry) = self.entries.get_mut(id) else {
            return false;
        };
        if entry.state.is_terminal() {
            debug!(
                "Ignoring {} for {}: already {}",
                state.as_str(),
                id,
                entry.state.as_str()
            );
            return false;
        }
        entry.state = state;
        entry.message = message.into();
        if state.is_terminal() {
            entry.finished_at = Some(Utc::now());
        }
        true
    }

    /// Prune stale entries as of now.
    pub fn prune(&self) -> usize {
        self.prune_at(Utc::now())
    }

    /// Remove entries past the grace window, over the poll ceiling, or
    /// unfinished past the maximum lifetime.
    pub fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id, status| {
            let expired = status
                .finished_at
                .is_some_and(|finished| now - finished > self.grace);
            let over_polled = status.attempt_count > self.max_poll_attempts;
            let stale = !status.state.is_terminal() && now - status.created_at > self.max_lifetime;
            if stale {
                warn!(
                    "Dropping ingestion {} stuck in {} since {}",
                    id,
                    status.state.as_str(),
                    status.created_at
                );
            }
            !(expired || over_polled || stale)
        });
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            info!("Pruned {} ingestion status entries", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Client-side bounded exponential backoff for status polling.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            multiplier: 1.5,
            max_interval: Duration::from_secs(10),
            max_attempts: 30,
        }
    }
}

impl PollPolicy {
    /// Delay before poll number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let delay = self.initial_interval.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_interval.as_secs_f64()))
    }
}

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The ingestion reached `Indexed` or `Failed`.
    Finished {
        state: IngestionState,
        message: String,
        attempts: u32,
    },
    /// The server no longer knows the id.
    Unknown { attempts: u32 },
    /// The attempt budget ran out first.
    Exhausted {
        last_state: Option<IngestionState>,
        attempts: u32,
    },
}

/// Poll `fetch` until a terminal state, an unknown id, or the attempt budget.
///
/// `fetch` yields `Ok(None)` for an unknown id. Fetch errors are logged and
/// count as an attempt; the next tick retries.
pub async fn poll_until_terminal<F, Fut, E>(policy: &PollPolicy, mut fetch: F) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<(IngestionState, String)>, E>>,
    E: Display,
{
    let mut last_state = None;
    for attempt in 0..policy.max_attempts {
        if attempt > 0 {
            tokio::time::sleep(policy.delay_for(attempt - 1)).await;
        }
        match fetch().await {
            Ok(Some((state, message))) if state.is_terminal() => {
                return PollOutcome::Finished {
                    state,
                    message,
                    attempts: attempt + 1,
                };
            }
            Ok(Some((state, _))) => last_state = Some(state),
            Ok(None) => {
                return PollOutcome::Unknown {
                    attempts: attempt + 1,
                }
            }
            Err(e) => debug!("Status poll {} failed: {}", attempt + 1, e),
        }
    }
    PollOutcome::Exhausted {
        last_state,
        attempts: policy.max_attempts,
    }
}
