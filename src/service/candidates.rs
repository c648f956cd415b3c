//! Candidate selection
//!
//! Turns seed accounts into a bounded list of accounts to follow.

use std::collections::HashSet;

use crate::atproto::{PaginatedFetcher, SocialGraph};
use crate::data::{AccountRecord, GraphSnapshot, RelationshipKind};

/// Selects follow candidates from the followers of seed accounts
pub struct CandidateSelector<'a, 'c, C> {
    fetcher: &'a PaginatedFetcher<'c, C>,
    snapshot: &'a GraphSnapshot,
    /// DIDs the engine has followed at any point
    added_by_engine: &'a HashSet<String>,
}

impl<'a, 'c, C: SocialGraph> CandidateSelector<'a, 'c, C> {
    pub fn new(
        fetcher: &'a PaginatedFetcher<'c, C>,
        snapshot: &'a GraphSnapshot,
        added_by_engine: &'a HashSet<String>,
    ) -> Self {
        Self {
            fetcher,
            snapshot,
            added_by_engine,
        }
    }

    /// Whether an account is already related to the operator
    fn is_excluded(&self, did: &str) -> bool {
        did == self.snapshot.owner_did()
            || self.snapshot.is_following(did)
            || self.snapshot.is_following_me(did)
            || self.added_by_engine.contains(did)
    }

    /// Build the follow list
    ///
    /// Seeds are visited in order and their followers in listing order.
    /// Selection stops as soon as `quota` accounts are chosen; remaining
    /// seeds are not fetched. A seed whose listing fails is skipped.
    pub async fn build_follow_list(&self, seeds: &[String], quota: usize) -> Vec<AccountRecord> {
        let mut selected = Vec::new();
        if quota == 0 {
            return selected;
        }

        let mut chosen = HashSet::new();
        for seed in seeds {
            let prospects = match self.fetcher.fetch(seed, RelationshipKind::Followers).await {
                Ok(prospects) => prospects,
                Err(error) => {
                    tracing::warn!(seed = %seed, %error, "Skipping seed account");
                    continue;
                }
            };

            let before = selected.len();
            for mut prospect in prospects {
                if self.is_excluded(&prospect.did) || !chosen.insert(prospect.did.clone()) {
                    continue;
                }
                prospect.follows_me = false;
                selected.push(prospect);

                if selected.len() >= quota {
                    break;
                }
            }
            tracing::info!(
                seed = %seed,
                selected = selected.len() - before,
                total = selected.len(),
                quota,
                "Selected candidates from seed"
            );

            if selected.len() >= quota {
                break;
            }
        }

        selected
    }
}
