//! Integration tests for candidate selection

mod common;

use std::collections::HashSet;

use common::{FakeGraph, OWNER_DID, account, accounts};
use followtide::atproto::PaginatedFetcher;
use followtide::data::{AccountRecord, GraphSnapshot, RelationshipKind};
use followtide::service::CandidateSelector;

fn dids(accounts: &[AccountRecord]) -> Vec<&str> {
    accounts.iter().map(|account| account.did.as_str()).collect()
}

fn seeds(handles: &[&str]) -> Vec<String> {
    handles.iter().map(|handle| handle.to_string()).collect()
}

#[tokio::test]
async fn test_already_followed_accounts_are_excluded() {
    let a = account("a");
    let b = account("b");
    let graph = FakeGraph::new().with_pages(
        "alice.bsky.social",
        RelationshipKind::Followers,
        vec![vec![a.clone(), b.clone()]],
    );
    let fetcher = PaginatedFetcher::new(&graph, 100, false);
    let snapshot = GraphSnapshot::from_parts(OWNER_DID, Vec::new(), vec![b]);
    let added = HashSet::new();

    let selected = CandidateSelector::new(&fetcher, &snapshot, &added)
        .build_follow_list(&seeds(&["alice.bsky.social"]), 10)
        .await;

    assert_eq!(selected, vec![a]);
}

#[tokio::test]
async fn test_followers_and_engine_added_accounts_are_excluded() {
    let graph = FakeGraph::new().with_pages(
        "seed.bsky.social",
        RelationshipKind::Followers,
        vec![accounts(&["fan", "old", "new", "me"])],
    );
    let fetcher = PaginatedFetcher::new(&graph, 100, false);
    let snapshot = GraphSnapshot::from_parts(OWNER_DID, accounts(&["fan"]), Vec::new());
    let added: HashSet<String> = ["did:plc:old".to_string()].into_iter().collect();

    let selector = CandidateSelector::new(&fetcher, &snapshot, &added);
    let first = selector
        .build_follow_list(&seeds(&["seed.bsky.social"]), 10)
        .await;
    let second = selector
        .build_follow_list(&seeds(&["seed.bsky.social"]), 10)
        .await;

    assert_eq!(dids(&first), vec!["did:plc:new"]);
    assert_eq!(first, second);
    assert!(first.iter().all(|account| !account.follows_me));
}

#[tokio::test]
async fn test_zero_quota_fetches_nothing() {
    let graph = FakeGraph::new().with_pages(
        "seed.bsky.social",
        RelationshipKind::Followers,
        vec![accounts(&["x", "y"])],
    );
    let fetcher = PaginatedFetcher::new(&graph, 100, false);
    let snapshot = GraphSnapshot::from_parts(OWNER_DID, Vec::new(), Vec::new());
    let added = HashSet::new();

    let selected = CandidateSelector::new(&fetcher, &snapshot, &added)
        .build_follow_list(&seeds(&["seed.bsky.social"]), 0)
        .await;

    assert!(selected.is_empty());
    assert!(graph.listings().is_empty());
}

#[tokio::test]
async fn test_quota_stops_before_later_seeds() {
    let graph = FakeGraph::new()
        .with_pages(
            "first.bsky.social",
            RelationshipKind::Followers,
            vec![accounts(&["p1", "p2", "p3"])],
        )
        .with_pages(
            "second.bsky.social",
            RelationshipKind::Followers,
            vec![accounts(&["q1"])],
        );
    let fetcher = PaginatedFetcher::new(&graph, 100, false);
    let snapshot = GraphSnapshot::from_parts(OWNER_DID, Vec::new(), Vec::new());
    let added = HashSet::new();

    let selected = CandidateSelector::new(&fetcher, &snapshot, &added)
        .build_follow_list(&seeds(&["first.bsky.social", "second.bsky.social"]), 2)
        .await;

    assert_eq!(dids(&selected), vec!["did:plc:p1", "did:plc:p2"]);
    assert!(
        graph
            .listings()
            .iter()
            .all(|call| call.actor == "first.bsky.social")
    );
}

#[tokio::test]
async fn test_seeds_are_merged_in_order_without_duplicates() {
    let graph = FakeGraph::new()
        .with_pages(
            "first.bsky.social",
            RelationshipKind::Followers,
            vec![accounts(&["r1", "shared"])],
        )
        .with_pages(
            "second.bsky.social",
            RelationshipKind::Followers,
            vec![accounts(&["shared", "r2"])],
        );
    let fetcher = PaginatedFetcher::new(&graph, 100, false);
    let snapshot = GraphSnapshot::from_parts(OWNER_DID, Vec::new(), Vec::new());
    let added = HashSet::new();

    let selected = CandidateSelector::new(&fetcher, &snapshot, &added)
        .build_follow_list(&seeds(&["first.bsky.social", "second.bsky.social"]), 10)
        .await;

    assert_eq!(
        dids(&selected),
        vec!["did:plc:r1", "did:plc:shared", "did:plc:r2"]
    );
}

#[tokio::test]
async fn test_failing_seed_is_skipped() {
    let graph = FakeGraph::new()
        .with_failing_listing("broken.bsky.social", RelationshipKind::Followers)
        .with_pages(
            "working.bsky.social",
            RelationshipKind::Followers,
            vec![accounts(&["s1"])],
        );
    let fetcher = PaginatedFetcher::new(&graph, 100, false);
    let snapshot = GraphSnapshot::from_parts(OWNER_DID, Vec::new(), Vec::new());
    let added = HashSet::new();

    let selected = CandidateSelector::new(&fetcher, &snapshot, &added)
        .build_follow_list(&seeds(&["broken.bsky.social", "working.bsky.social"]), 10)
        .await;

    assert_eq!(dids(&selected), vec!["did:plc:s1"]);
}
