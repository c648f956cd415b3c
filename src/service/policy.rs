//! Reconciliation policy
//!
//! Decides who gets unfollowed and whether follows happen today. Pure set
//! arithmetic over the ledgers and the graph snapshot; no I/O.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc, Weekday};

use crate::config::PolicyConfig;
use crate::data::{AccountRecord, GraphSnapshot, LedgerEntry};
use crate::error::AppError;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Retention and scheduling rules for one run
#[derive(Debug, Clone)]
pub struct ReconciliationPolicy {
    retention_days: f64,
    purge_day: Option<Weekday>,
    purge_retention_days: f64,
    follow_on_purge_day: bool,
    max_follows_per_run: usize,
}

impl ReconciliationPolicy {
    pub fn from_config(config: &PolicyConfig) -> Result<Self, AppError> {
        Ok(Self {
            retention_days: config.retention_days,
            purge_day: config.purge_weekday()?,
            purge_retention_days: config.purge_retention_days,
            follow_on_purge_day: config.follow_on_purge_day,
            max_follows_per_run: config.max_follows_per_run,
        })
    }

    fn is_purge_day(&self, weekday: Weekday) -> bool {
        self.purge_day == Some(weekday)
    }

    /// Retention window that applies on `weekday`
    pub fn retention_days(&self, weekday: Weekday) -> f64 {
        if self.is_purge_day(weekday) {
            self.purge_retention_days
        } else {
            self.retention_days
        }
    }

    /// Whether follows are skipped on `weekday`
    pub fn is_light_day(&self, weekday: Weekday) -> bool {
        self.is_purge_day(weekday) && !self.follow_on_purge_day
    }

    pub fn follow_quota(&self) -> usize {
        self.max_follows_per_run
    }

    /// Compute the accounts to unfollow
    ///
    /// Engine-added accounts older than the retention window plus every
    /// manual-removal entry, limited to accounts currently followed and
    /// never including a DoNotRemove handle. First occurrence of a DID wins.
    pub fn unfollow_set(
        &self,
        added_by_engine: &[LedgerEntry],
        manual_remove: &[LedgerEntry],
        do_not_remove: &HashSet<String>,
        snapshot: &GraphSnapshot,
        now: DateTime<Utc>,
        retention_days: f64,
    ) -> Vec<AccountRecord> {
        let threshold = retention_threshold(now, retention_days);

        let expired = added_by_engine.iter().filter(|entry| {
            match (entry.added_at, threshold) {
                (Some(added_at), Some(threshold)) => added_at < threshold,
                _ => false,
            }
        });

        let mut seen = HashSet::new();
        expired
            .chain(manual_remove.iter())
            .filter(|entry| snapshot.is_following(&entry.did))
            .filter(|entry| !do_not_remove.contains(&entry.handle))
            .filter(|entry| seen.insert(entry.did.clone()))
            .map(|entry| {
                let mut account = entry.to_account();
                account.follows_me = snapshot.is_following_me(&account.did);
                account
            })
            .collect()
    }
}

/// `now - days`, or `None` when the window is not representable
fn retention_threshold(now: DateTime<Utc>, days: f64) -> Option<DateTime<Utc>> {
    let millis = days * MILLIS_PER_DAY;
    if !millis.is_finite() || millis < 0.0 || millis >= i64::MAX as f64 {
        return None;
    }
    let window = Duration::try_milliseconds(millis as i64)?;
    now.checked_sub_signed(window)
}
