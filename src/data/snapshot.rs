//! In-memory graph snapshot
//!
//! Mirrors "who follows me" and "who I follow" for the duration of one
//! run. Built from a full fetch at start-up, then kept current by the
//! mutation applier through `record_follow` / `record_unfollow`.

use std::collections::HashSet;

use super::models::{AccountRecord, RelationshipKind};
use crate::atproto::{PaginatedFetcher, SocialGraph};
use crate::error::AppError;

/// Follower/follow sets of the operator's account
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    owner_did: String,
    my_followers: HashSet<String>,
    accounts_i_follow: HashSet<String>,
    /// Follower records as fetched (all tagged `follows_me`)
    followers: Vec<AccountRecord>,
    /// Followed records as fetched, tagged by follower membership
    follows: Vec<AccountRecord>,
}

impl GraphSnapshot {
    /// Fetch both sides of the operator's graph
    ///
    /// # Errors
    /// Any fetch failure; a partial snapshot is never returned.
    pub async fn build<C: SocialGraph>(
        fetcher: &PaginatedFetcher<'_, C>,
        handle: &str,
        owner_did: &str,
    ) -> Result<Self, AppError> {
        let followers = fetcher.fetch(handle, RelationshipKind::Followers).await?;
        let follows = fetcher.fetch(handle, RelationshipKind::Follows).await?;
        Ok(Self::from_parts(owner_did, followers, follows))
    }

    /// Assemble a snapshot from already-fetched listings
    pub fn from_parts(
        owner_did: &str,
        mut followers: Vec<AccountRecord>,
        mut follows: Vec<AccountRecord>,
    ) -> Self {
        for follower in &mut followers {
            follower.follows_me = true;
        }
        let my_followers: HashSet<String> =
            followers.iter().map(|account| account.did.clone()).collect();

        for followed in &mut follows {
            followed.follows_me = my_followers.contains(&followed.did);
        }
        let accounts_i_follow = follows.iter().map(|account| account.did.clone()).collect();

        let snapshot = Self {
            owner_did: owner_did.to_string(),
            my_followers,
            accounts_i_follow,
            followers,
            follows,
        };
        snapshot.publish_gauges();
        snapshot
    }

    fn publish_gauges(&self) {
        use crate::metrics::{FOLLOWERS_TOTAL, FOLLOWING_TOTAL};
        FOLLOWERS_TOTAL.set(self.my_followers.len() as i64);
        FOLLOWING_TOTAL.set(self.accounts_i_follow.len() as i64);
    }

    pub fn owner_did(&self) -> &str {
        &self.owner_did
    }

    pub fn is_following_me(&self, did: &str) -> bool {
        self.my_followers.contains(did)
    }

    pub fn is_following(&self, did: &str) -> bool {
        self.accounts_i_follow.contains(did)
    }

    /// DIDs of accounts following the operator
    pub fn my_followers(&self) -> &HashSet<String> {
        &self.my_followers
    }

    /// DIDs of accounts the operator follows
    pub fn accounts_i_follow(&self) -> &HashSet<String> {
        &self.accounts_i_follow
    }

    /// Follower records from the initial fetch
    pub fn followers(&self) -> &[AccountRecord] {
        &self.followers
    }

    /// Followed records from the initial fetch
    pub fn follows(&self) -> &[AccountRecord] {
        &self.follows
    }

    /// Record a successful follow
    pub fn record_follow(&mut self, did: &str) {
        self.accounts_i_follow.insert(did.to_string());
        self.publish_gauges();
    }

    /// Record a successful unfollow
    ///
    /// # Returns
    /// Whether `did` was followed before the call
    pub fn record_unfollow(&mut self, did: &str) -> bool {
        let removed = self.accounts_i_follow.remove(did);
        self.publish_gauges();
        removed
    }

    /// Followers the engine did not add
    pub fn followed_manually(&self, added_by_engine_dids: &HashSet<String>) -> Vec<AccountRecord> {
        self.followers
            .iter()
            .filter(|account| !added_by_engine_dids.contains(&account.did))
            .cloned()
            .collect()
    }
}
