use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub(crate) type UserId = i64;

/// Per-window limit for users with an active subscription.
pub(crate) const ELEVATED_DAILY_LIMIT: u32 = 100;

const QUOTA_WINDOW_HOURS: i64 = 24;
const SUBSCRIPTION_DAYS: i64 = 30;

#[derive(Debug, Default)]
struct UserSlot {
    count: u32,
    // None until the first admission, which behaves as an expired window.
    reset_time: Option<DateTime<Utc>>,
    delivered: HashSet<String>,
}

#[derive(Debug, PartialEq)]
pub(crate) enum Admission {
    /// Admitted; `remaining` is what is left after this delivery commits.
    Granted { remaining: u32 },
    Denied { retry_after: Duration },
}

/// In-memory quota and subscription state for all users.
///
/// Each user owns a mutex around their quota slot; `begin` hands out a
/// session holding that mutex, so admission, selection and reservation
/// for one user form a single critical section. Slow work (download,
/// Telegram send) must happen after the session is dropped.
pub(crate) struct QuotaStore {
    users: DashMap<UserId, Arc<Mutex<UserSlot>>>,
    subscriptions: DashMap<UserId, DateTime<Utc>>,
    base_limit: u32,
}

impl QuotaStore {
    pub(crate) fn new(base_limit: u32) -> Self {
        Self {
            users: DashMap::new(),
            subscriptions: DashMap::new(),
            base_limit,
        }
    }

    pub(crate) async fn begin(&self, user: UserId) -> UserSession<'_> {
        let slot = self.users.entry(user).or_default().value().clone();
        let slot = slot.lock_owned().await;
        UserSession {
            store: self,
            user,
            slot,
        }
    }

    /// Undo a reservation whose delivery failed. Safe to call with an id
    /// that was never reserved or was wiped by a reset in the meantime.
    pub(crate) async fn rollback(&self, user: UserId, item_id: &str) {
        let slot = match self.users.get(&user) {
            Some(entry) => entry.value().clone(),
            None => return,
        };
        let mut slot = slot.lock_owned().await;
        if slot.delivered.remove(item_id) {
            slot.count = slot.count.saturating_sub(1);
        }
    }

    /// Payment confirmed: (re)start a 30-day subscription from `now`,
    /// overwriting whatever horizon was there before.
    pub(crate) fn activate_subscription(&self, user: UserId, now: DateTime<Utc>) -> DateTime<Utc> {
        let expires_at = now + Duration::days(SUBSCRIPTION_DAYS);
        self.subscriptions.insert(user, expires_at);
        expires_at
    }

    #[cfg(test)]
    pub(crate) fn subscription_expiry(&self, user: UserId) -> Option<DateTime<Utc>> {
        self.subscriptions.get(&user).map(|expires_at| *expires_at)
    }

    fn effective_limit(&self, user: UserId, now: DateTime<Utc>) -> u32 {
        match self.subscriptions.get(&user) {
            Some(expires_at) if *expires_at > now => ELEVATED_DAILY_LIMIT,
            _ => self.base_limit,
        }
    }
}

pub(crate) struct UserSession<'a> {
    store: &'a QuotaStore,
    user: UserId,
    slot: OwnedMutexGuard<UserSlot>,
}

impl UserSession<'_> {
    pub(crate) fn admit(&mut self, now: DateTime<Utc>) -> Admission {
        let reset_time = match self.slot.reset_time {
            Some(reset_time) if now < reset_time => reset_time,
            _ => {
                self.slot.count = 0;
                self.slot.delivered.clear();
                let reset_time = now + Duration::hours(QUOTA_WINDOW_HOURS);
                self.slot.reset_time = Some(reset_time);
                reset_time
            }
        };
        let limit = self.store.effective_limit(self.user, now);
        if self.slot.count >= limit {
            Admission::Denied {
                retry_after: reset_time - now,
            }
        } else {
            Admission::Granted {
                remaining: limit - self.slot.count - 1,
            }
        }
    }

    /// Item identifiers already sent within the current window.
    pub(crate) fn delivered(&self) -> &HashSet<String> {
        &self.slot.delivered
    }

    /// Counts `item_id` against the quota before the delivery is attempted.
    /// A failed delivery must be compensated with `QuotaStore::rollback`.
    pub(crate) fn reserve(&mut self, item_id: &str) {
        if self.slot.delivered.insert(item_id.to_string()) {
            self.slot.count += 1;
        }
    }

    #[cfg(test)]
    fn count(&self) -> u32 {
        self.slot.count
    }
}
