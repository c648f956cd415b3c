//! AT Protocol remote boundary
//!
//! Handles:
//! - XRPC session login and refresh
//! - Follower/follow listing with cursor pagination
//! - Follow record creation and deletion
//! - Mutation rate limiting

mod client;
mod fetcher;
mod rate_limit;

pub use client::{RecordRef, RelationshipPage, Session, SocialGraph, XrpcClient};
pub use fetcher::{PaginatedFetcher, TESTING_MAX_PAGES};
pub use rate_limit::MutationLimiter;
