//! Reconciliation cycle
//!
//! One run of the engine: snapshot the graph, persist the snapshot ledgers,
//! decide both mutation sets, then unfollow before following.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc, Weekday};

use super::candidates::CandidateSelector;
use super::mutation::MutationApplier;
use super::policy::ReconciliationPolicy;
use crate::atproto::{MutationLimiter, PaginatedFetcher, SocialGraph};
use crate::config::AppConfig;
use crate::data::{
    AccountRecord, Direction, GraphSnapshot, Ledger, LedgerEntry, LedgerStore, load_entries,
    load_handles,
};
use crate::error::AppError;

/// Outcome of one cycle
#[derive(Debug, Default)]
pub struct RunReport {
    pub unfollowed: Vec<AccountRecord>,
    pub followed: Vec<AccountRecord>,
    /// Follows were skipped because today is a light day
    pub light_day: bool,
}

/// Identity of the operator's account
#[derive(Debug, Clone)]
pub struct Operator {
    pub handle: String,
    pub did: String,
}

/// Runs reconciliation cycles against one remote and one ledger store
pub struct Reconciler<'a, C, L> {
    client: &'a C,
    store: &'a L,
    config: &'a AppConfig,
    policy: ReconciliationPolicy,
}

impl<'a, C: SocialGraph, L: LedgerStore> Reconciler<'a, C, L> {
    pub fn new(client: &'a C, store: &'a L, config: &'a AppConfig) -> Result<Self, AppError> {
        Ok(Self {
            client,
            store,
            config,
            policy: ReconciliationPolicy::from_config(&config.policy)?,
        })
    }

    /// Run one cycle
    ///
    /// # Errors
    /// Only snapshot construction is fatal. Mutation and ledger failures
    /// are logged and the cycle carries on.
    pub async fn run_cycle(
        &self,
        operator: &Operator,
        now: DateTime<Utc>,
        weekday: Weekday,
    ) -> Result<RunReport, AppError> {
        let policy_config = &self.config.policy;
        let fetcher = PaginatedFetcher::new(
            self.client,
            self.config.remote.page_limit,
            policy_config.testing_mode,
        );

        let mut snapshot = GraphSnapshot::build(&fetcher, &operator.handle, &operator.did).await?;
        tracing::info!(
            followers = snapshot.my_followers().len(),
            following = snapshot.accounts_i_follow().len(),
            "Graph snapshot built"
        );

        let added_by_engine = load_entries(self.store, Ledger::AddedByEngine).await;
        let added_dids: HashSet<String> = added_by_engine
            .iter()
            .map(|entry| entry.did.clone())
            .filter(|did| !did.is_empty())
            .collect();
        self.persist_snapshot(&snapshot, &added_dids).await;

        let manual_remove = load_entries(self.store, Ledger::ManualRemove).await;
        let do_not_remove = load_handles(self.store, Ledger::DoNotRemove).await;
        let retention_days = self.policy.retention_days(weekday);
        let unfollows = self.policy.unfollow_set(
            &added_by_engine,
            &manual_remove,
            &do_not_remove,
            &snapshot,
            now,
            retention_days,
        );
        tracing::info!(
            count = unfollows.len(),
            retention_days,
            %weekday,
            "Unfollow set computed"
        );

        let light_day = self.policy.is_light_day(weekday);
        let follows = if light_day {
            tracing::info!(%weekday, "Light day; skipping follows");
            Vec::new()
        } else {
            let seeds = self.seed_handles().await;
            let selector = CandidateSelector::new(&fetcher, &snapshot, &added_dids);
            let follows = selector
                .build_follow_list(&seeds, self.policy.follow_quota())
                .await;
            tracing::info!(
                seeds = seeds.len(),
                count = follows.len(),
                quota = self.policy.follow_quota(),
                "Follow set computed"
            );
            follows
        };

        let limiter = MutationLimiter::new(Some(Duration::from_secs(
            policy_config.mutation_interval_seconds,
        )));
        let mut applier =
            MutationApplier::new(self.client, self.store, limiter, policy_config.testing_mode);

        let unfollowed = applier
            .apply(&mut snapshot, &unfollows, Direction::Unfollow)
            .await;
        let followed = applier
            .apply(&mut snapshot, &follows, Direction::Follow)
            .await;

        Ok(RunReport {
            unfollowed,
            followed,
            light_day,
        })
    }

    /// Rewrite the per-run snapshot ledgers
    async fn persist_snapshot(&self, snapshot: &GraphSnapshot, added_dids: &HashSet<String>) {
        let to_entries = |accounts: &[AccountRecord]| -> Vec<LedgerEntry> {
            accounts
                .iter()
                .map(|account| LedgerEntry::from_account(account, None))
                .collect()
        };

        let outputs = [
            (Ledger::MyFollowers, to_entries(snapshot.followers())),
            (Ledger::AccountsIFollow, to_entries(snapshot.follows())),
            (
                Ledger::FollowedManually,
                to_entries(&snapshot.followed_manually(added_dids)),
            ),
        ];

        for (ledger, entries) in outputs {
            match self.store.replace_all(ledger, &entries).await {
                Ok(()) => tracing::debug!(%ledger, rows = entries.len(), "Ledger rewritten"),
                Err(error) => {
                    tracing::error!(%ledger, %error, "Failed to write ledger");
                    crate::metrics::LEDGER_ERRORS_TOTAL
                        .with_label_values(&[ledger.as_str(), "write"])
                        .inc();
                }
            }
        }
    }

    /// Seed handles in ledger order, first occurrence kept
    async fn seed_handles(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        load_entries(self.store, Ledger::FollowbackSources)
            .await
            .into_iter()
            .map(|entry| entry.handle)
            .filter(|handle| !handle.is_empty() && seen.insert(handle.clone()))
            .collect()
    }
}
