//! Paginated relationship fetcher
//!
//! Walks a cursor-paginated listing to the end. Timeouts retry the same
//! page; anything else aborts the whole fetch with no partial result.

use std::collections::HashSet;

use super::client::SocialGraph;
use crate::data::{AccountRecord, RelationshipKind};
use crate::error::AppError;

/// Pages fetched per listing in testing mode
pub const TESTING_MAX_PAGES: usize = 2;

/// Fetches complete follower/follow listings
pub struct PaginatedFetcher<'a, C> {
    client: &'a C,
    page_limit: u32,
    max_pages: Option<usize>,
}

impl<'a, C: SocialGraph> PaginatedFetcher<'a, C> {
    /// Create a fetcher
    ///
    /// # Arguments
    /// * `page_limit` - Accounts requested per page
    /// * `testing` - Stop after [`TESTING_MAX_PAGES`] pages
    pub fn new(client: &'a C, page_limit: u32, testing: bool) -> Self {
        Self {
            client,
            page_limit,
            max_pages: testing.then_some(TESTING_MAX_PAGES),
        }
    }

    /// Fetch every account related to `handle`
    ///
    /// # Errors
    /// Returns `AppError::Fetch` on the first non-timeout failure
    pub async fn fetch(
        &self,
        handle: &str,
        kind: RelationshipKind,
    ) -> Result<Vec<AccountRecord>, AppError> {
        use crate::metrics::{FETCH_PAGES_TOTAL, FETCH_RETRIES_TOTAL};

        tracing::info!(%handle, relationship = kind.as_str(), "Fetching relationships");

        let mut accounts = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = match self
                .client
                .list_relationships(handle, kind, cursor.as_deref(), self.page_limit)
                .await
            {
                Ok(page) => page,
                Err(error) if error.is_timeout() => {
                    tracing::warn!(
                        %handle,
                        relationship = kind.as_str(),
                        %error,
                        "Listing page timed out; retrying"
                    );
                    FETCH_RETRIES_TOTAL.with_label_values(&[kind.as_str()]).inc();
                    continue;
                }
                Err(error) => {
                    tracing::error!(
                        %handle,
                        relationship = kind.as_str(),
                        %error,
                        "Failed to fetch relationships"
                    );
                    return Err(AppError::Fetch(format!(
                        "{} of {}: {}",
                        kind.as_str(),
                        handle,
                        error
                    )));
                }
            };

            pages += 1;
            FETCH_PAGES_TOTAL.with_label_values(&[kind.as_str()]).inc();

            for account in page.accounts {
                if seen.insert(account.did.clone()) {
                    accounts.push(account);
                }
            }
            tracing::debug!(%handle, relationship = kind.as_str(), fetched = accounts.len(), "Fetched page");

            let next = page.cursor.filter(|next| !next.is_empty());
            match next {
                None => break,
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    tracing::error!(%handle, cursor = %next, "Cursor did not advance");
                    return Err(AppError::Fetch(format!(
                        "{} of {}: cursor {} did not advance",
                        kind.as_str(),
                        handle,
                        next
                    )));
                }
                Some(next) => cursor = Some(next),
            }

            if self.max_pages.is_some_and(|max| pages >= max) {
                tracing::debug!(%handle, pages, "Page cap reached in testing mode");
                break;
            }
        }

        tracing::info!(
            %handle,
            relationship = kind.as_str(),
            count = accounts.len(),
            "Fetched relationships"
        );
        Ok(accounts)
    }
}
