//! Mutation applier
//!
//! Executes follows and unfollows one account at a time. Each account is a
//! unit of work: wait for the limiter, call the remote service, then update
//! the snapshot and ledgers before the next account starts.

use std::collections::HashSet;

use chrono::Utc;

use crate::atproto::{MutationLimiter, SocialGraph};
use crate::data::{AccountRecord, Direction, GraphSnapshot, Ledger, LedgerEntry, LedgerStore};
use crate::error::AppError;

/// Accounts handled per batch in testing mode
pub const TESTING_MAX_MUTATIONS: usize = 200;

/// Applies graph mutations and records them
pub struct MutationApplier<'a, C, L> {
    client: &'a C,
    ledger: &'a L,
    limiter: MutationLimiter,
    testing: bool,
}

impl<'a, C: SocialGraph, L: LedgerStore> MutationApplier<'a, C, L> {
    pub fn new(client: &'a C, ledger: &'a L, limiter: MutationLimiter, testing: bool) -> Self {
        Self {
            client,
            ledger,
            limiter,
            testing,
        }
    }

    /// Apply `direction` to each account in order
    ///
    /// # Returns
    /// The accounts actually mutated, in attempt order
    pub async fn apply(
        &mut self,
        snapshot: &mut GraphSnapshot,
        accounts: &[AccountRecord],
        direction: Direction,
    ) -> Vec<AccountRecord> {
        let accounts = if self.testing && accounts.len() > TESTING_MAX_MUTATIONS {
            &accounts[..TESTING_MAX_MUTATIONS]
        } else {
            accounts
        };

        tracing::info!(
            direction = direction.as_str(),
            count = accounts.len(),
            "Applying mutations"
        );

        let mut mutated = Vec::new();
        for account in accounts {
            if direction == Direction::Unfollow && !snapshot.is_following(&account.did) {
                tracing::debug!(
                    handle = %account.handle,
                    did = %account.did,
                    "Not following; nothing to unfollow"
                );
                continue;
            }

            self.limiter.until_ready().await;

            let outcome = match direction {
                Direction::Follow => self.follow(snapshot, account).await,
                Direction::Unfollow => self.unfollow(snapshot, account).await,
            };

            let result = if outcome.is_ok() { "success" } else { "failure" };
            crate::metrics::MUTATIONS_TOTAL
                .with_label_values(&[direction.as_str(), result])
                .inc();

            match outcome {
                Ok(()) => mutated.push(account.clone()),
                Err(error) => {
                    tracing::warn!(
                        direction = direction.as_str(),
                        handle = %account.handle,
                        did = %account.did,
                        %error,
                        "Mutation failed; skipping account"
                    );
                }
            }
        }

        tracing::info!(
            direction = direction.as_str(),
            attempted = accounts.len(),
            succeeded = mutated.len(),
            "Mutations applied"
        );
        mutated
    }

    async fn follow(
        &self,
        snapshot: &mut GraphSnapshot,
        account: &AccountRecord,
    ) -> Result<(), AppError> {
        let record_uri = self.client.follow(&account.did).await?;
        snapshot.record_follow(&account.did);
        tracing::info!(handle = %account.handle, did = %account.did, uri = %record_uri, "Followed account");

        let mut followed = account.clone();
        followed.follows_me = snapshot.is_following_me(&account.did);
        let added = LedgerEntry::from_account(&followed, Some(Utc::now()));
        let current = LedgerEntry::from_account(&followed, None);

        self.record(Ledger::AddedByEngine, self.ledger.append_if_absent(Ledger::AddedByEngine, &[added]).await);
        self.record(Ledger::AccountsIFollow, self.ledger.append_if_absent(Ledger::AccountsIFollow, &[current]).await);

        Ok(())
    }

    async fn unfollow(
        &self,
        snapshot: &mut GraphSnapshot,
        account: &AccountRecord,
    ) -> Result<(), AppError> {
        let record_uri = self
            .client
            .resolve_follow_record(&account.did)
            .await?
            .ok_or_else(|| {
                AppError::Mutation(format!("no follow record found for {}", account.did))
            })?;
        self.client.unfollow(&record_uri).await?;
        snapshot.record_unfollow(&account.did);
        tracing::info!(handle = %account.handle, did = %account.did, "Unfollowed account");

        let handles: HashSet<String> = [account.handle.clone()].into_iter().collect();
        let mut removed = account.clone();
        removed.follows_me = snapshot.is_following_me(&account.did);
        let removed = LedgerEntry::from_account(&removed, Some(Utc::now()));

        self.record(
            Ledger::AccountsIFollow,
            self.ledger.remove_by_handle(Ledger::AccountsIFollow, &handles).await,
        );
        self.record(Ledger::Removed, self.ledger.append_if_absent(Ledger::Removed, &[removed]).await);

        Ok(())
    }

    /// Log a ledger write failure; the remote mutation already happened
    fn record(&self, ledger: Ledger, result: Result<usize, AppError>) {
        if let Err(error) = result {
            tracing::error!(%ledger, %error, "Ledger write failed after remote mutation");
            crate::metrics::LEDGER_ERRORS_TOTAL
                .with_label_values(&[ledger.as_str(), "write"])
                .inc();
        }
    }
}
